//! Comment Parser (spec §4.3): interprets OPI 1.3 (`%ALD*`) and OPI 2.0
//! (`%%Image*`, `%%TIFFASCIITag`, …) directives.
//!
//! Rather than regex soup, tokenisation is a small hand-written scan that
//! recognises `% | %% | %ALD | key: rest-of-line` and hands `rest-of-line`
//! to typed converters (spec §9 design note).

use crate::model::{ColorType, FixedRect, ImageColor, ImagePlacementRecord, IntRect, OpiVersion};

/// Bytes considered "safe" to emit literally in a PostScript string or bare
/// token (spec §6 "Path safe-byte set").
pub fn is_path_safe_byte(b: u8) -> bool {
    matches!(b,
        0x20 | 0x21 | 0x23..=0x29 | 0x2B..=0x3E | 0x40..=0x7B | 0x7D | 0x7E)
}

/// Filename-safe additionally excludes `" * ? | / : \`.
pub fn is_filename_safe_byte(b: u8) -> bool {
    is_path_safe_byte(b) && !matches!(b, b'"' | b'*' | b'?' | b'|' | b'/' | b':' | b'\\')
}

/// Decode a PostScript parenthesised string's *inner* bytes (the caller has
/// already stripped the surrounding `(` `)`), applying the escape rules of
/// spec §4.3: `\\` -> `\`, `\(`/`\)` un-escape, octal `\ddd` escapes and
/// `<hh...>` hex tags decode to `?`, and any other byte outside the
/// printable-ASCII safe set decodes to `?`.
pub fn decode_ps_string(raw: &[u8]) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        match raw[i] {
            b'\\' => {
                if let Some(&next) = raw.get(i + 1) {
                    match next {
                        b'\\' => {
                            out.push('\\');
                            i += 2;
                        }
                        b'(' => {
                            out.push('(');
                            i += 2;
                        }
                        b')' => {
                            out.push(')');
                            i += 2;
                        }
                        b'0'..=b'7' => {
                            // Octal escape: consume up to 3 octal digits.
                            let mut j = i + 1;
                            let mut n = 0;
                            while j < raw.len() && n < 3 && matches!(raw[j], b'0'..=b'7') {
                                j += 1;
                                n += 1;
                            }
                            out.push('?');
                            i = j;
                        }
                        _ => {
                            out.push('?');
                            i += 2;
                        }
                    }
                } else {
                    out.push('?');
                    i += 1;
                }
            }
            b'<' => {
                // Hex character tag: scan to closing '>'.
                if let Some(end) = raw[i..].iter().position(|&b| b == b'>') {
                    out.push('?');
                    i += end + 1;
                } else {
                    out.push('?');
                    i += 1;
                }
            }
            b if is_path_safe_byte(b) => {
                out.push(b as char);
                i += 1;
            }
            _ => {
                out.push('?');
                i += 1;
            }
        }
    }
    out
}

/// Re-encode a string for emission: safe bytes pass through, anything else
/// becomes a `<hh>` hex escape (spec §4.3 last sentence).
pub fn encode_ps_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if is_path_safe_byte(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("<{b:02x}>"));
        }
    }
    out
}

/// Extract the contents of the first `(...)` group in `s`, honoring
/// backslash-escaped parens, and decode it.
pub fn parse_paren_string(s: &[u8]) -> Option<String> {
    let start = s.iter().position(|&b| b == b'(')?;
    let mut depth = 0i32;
    let mut i = start;
    let mut escaped = false;
    let mut end = None;
    while i < s.len() {
        match s[i] {
            b'\\' if !escaped => escaped = true,
            b'(' if !escaped => depth += 1,
            b')' if !escaped => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => escaped = false,
        }
        if s[i] != b'\\' {
            escaped = false;
        }
        i += 1;
    }
    let end = end?;
    Some(decode_ps_string(&s[start + 1..end]))
}

pub fn parse_floats(s: &str) -> Vec<f64> {
    s.split_whitespace().filter_map(|t| t.parse::<f64>().ok()).collect()
}

pub fn parse_ints(s: &str) -> Vec<i64> {
    s.split_whitespace().filter_map(|t| t.parse::<i64>().ok()).collect()
}

/// A `key: rest-of-line` directive split out of a comment, before typed
/// conversion.
#[derive(Debug, Clone)]
pub struct RawDirective<'a> {
    pub key: &'a str,
    pub rest: &'a str,
}

/// `%%+` is the OPI continuation-line marker for multi-line directives
/// (gray maps, ASCII tags).
pub fn is_continuation_line(comment: &[u8]) -> bool {
    comment.starts_with(b"%%+")
}

pub fn continuation_payload(comment: &[u8]) -> &[u8] {
    comment.strip_prefix(b"%%+").unwrap_or(comment)
}

/// Split a raw `%...` comment line into a directive key and the rest of the
/// line. Handles both `%ALDKey: rest` (OPI 1.3) and `%%Key: rest` / `%%Key
/// rest` (OPI 2.0 / envelope tokens).
pub fn tokenize(comment: &[u8]) -> Option<RawDirective<'_>> {
    let s = std::str::from_utf8(comment).ok()?;
    let s = s.trim_end_matches(['\r', '\n']);
    let body = s.strip_prefix("%%").or_else(|| s.strip_prefix('%'))?;
    let body = body.trim_start();
    if body.is_empty() {
        return None;
    }
    match body.find(':') {
        Some(idx) => Some(RawDirective {
            key: body[..idx].trim(),
            rest: body[idx + 1..].trim(),
        }),
        None => {
            // Envelope tokens like "BeginObject: image" always carry a
            // colon; bare tokens like "EndOPI" do not.
            let idx = body.find(char::is_whitespace).unwrap_or(body.len());
            Some(RawDirective {
                key: &body[..idx],
                rest: body[idx..].trim(),
            })
        }
    }
}

/// Applies one already-tokenised directive to an in-progress IPR. Returns
/// `true` if the key was recognised (even if the value was malformed and
/// ignored), `false` for a key this parser doesn't know about at all.
pub fn apply_directive(ipr: &mut ImagePlacementRecord, directive: &RawDirective<'_>) -> bool {
    match directive.key {
        "ALDImageFileName" => {
            if let Some(name) = parse_paren_string(directive.rest.as_bytes()) {
                ipr.image_file_name = name;
            }
            ipr.version_markers.insert(OpiVersion::V1_3);
        }
        "ALDImageID" => {
            ipr.image_id = parse_paren_string(directive.rest.as_bytes());
        }
        "ALDObjectComments" => {
            ipr.object_comments = directive.rest.split_whitespace().map(|s| s.to_string()).collect();
        }
        "ALDImageDimensions" => {
            let v = parse_floats(directive.rest);
            if v.len() >= 2 {
                ipr.image_dimensions = Some((v[0], v[1]));
            }
        }
        "ALDImageCropRect" => {
            let v = parse_ints(directive.rest);
            if v.len() >= 4 {
                ipr.image_crop_rect = Some(IntRect::new(v[0], v[1], v[2], v[3]));
                ipr.reconcile_crop_rects();
            }
        }
        "ALDImageCropFixed" => {
            let v = parse_floats(directive.rest);
            if v.len() >= 4 {
                ipr.image_crop_fixed = Some(FixedRect::new(v[0], v[1], v[2], v[3]));
                ipr.reconcile_crop_rects();
            }
        }
        "ALDImagePosition" => {
            let v = parse_floats(directive.rest);
            if v.len() >= 8 {
                let mut pos = [0.0; 8];
                pos.copy_from_slice(&v[..8]);
                ipr.image_position = Some(pos);
            }
        }
        "ALDImageResolution" => {
            let v = parse_floats(directive.rest);
            if v.len() >= 2 {
                ipr.image_resolution = Some((v[0], v[1]));
            }
        }
        "ALDImageColorType" => {
            ipr.image_color_type = match directive.rest.trim() {
                "Process" => ColorType::Process,
                "Spot" => ColorType::Spot,
                _ => ColorType::Unspecified,
            };
            if ipr.image_color_type == ColorType::Process {
                if let Some(color) = &mut ipr.image_color {
                    if let Some(name) = color.infer_process_ink_name() {
                        color.ink_name = name.to_string();
                    }
                }
            }
        }
        "ALDImageColor" => {
            let floats = parse_floats(directive.rest);
            let name = parse_paren_string(directive.rest.as_bytes()).unwrap_or_default();
            if floats.len() >= 4 {
                ipr.image_color = Some(ImageColor {
                    c: floats[0],
                    m: floats[1],
                    y: floats[2],
                    k: floats[3],
                    ink_name: name,
                });
            }
        }
        "ALDImageTint" => {
            if let Ok(v) = directive.rest.trim().parse::<f64>() {
                ipr.image_tint = Some(v);
            }
        }
        "ALDImageOverprint" => {
            ipr.image_overprint = parse_bool(directive.rest).into();
        }
        "ALDImageType" => {
            let v = parse_ints(directive.rest);
            if v.len() >= 2 {
                ipr.image_type = Some((v[0] as u8, v[1] as u8));
            }
        }
        "ALDImageGrayMap" => {
            let row = parse_ints(directive.rest);
            if !row.is_empty() {
                ipr.image_gray_map.push(row);
            }
        }
        "ALDImageTransparency" => {
            ipr.image_transparency = parse_bool(directive.rest).into();
        }
        key if key.starts_with("ALDImageAsciiTag") => {
            let tag = key.trim_start_matches("ALDImageAsciiTag").to_string();
            let values = collect_paren_strings(directive.rest);
            ipr.tiff_ascii_tags.entry(tag).or_default().extend(values);
        }
        "Distilled" => {
            ipr.distilled = true;
        }
        "BeginOPI" => {
            if directive.rest.trim().starts_with("2.0") {
                ipr.version_markers.insert(OpiVersion::V2_0);
            }
        }
        "ImageFileName" => {
            if let Some(name) = parse_paren_string(directive.rest.as_bytes()) {
                ipr.image_file_name = name;
            }
            ipr.version_markers.insert(OpiVersion::V2_0);
        }
        "MainImage" => {
            ipr.main_image = parse_paren_string(directive.rest.as_bytes());
        }
        "TIFFASCIITag" => {
            let mut parts = directive.rest.splitn(2, char::is_whitespace);
            if let Some(tag) = parts.next() {
                let values = collect_paren_strings(parts.next().unwrap_or(""));
                ipr.tiff_ascii_tags
                    .entry(tag.to_string())
                    .or_default()
                    .extend(values);
            }
        }
        "ImageDimensions" => {
            let v = parse_floats(directive.rest);
            if v.len() >= 2 {
                ipr.image_dimensions = Some((v[0], v[1]));
            }
        }
        "ImageCropRect" => {
            let v = parse_floats(directive.rest);
            if v.len() >= 4 {
                ipr.image_crop_fixed = Some(FixedRect::new(v[0], v[1], v[2], v[3]));
                ipr.reconcile_crop_rects();
            }
        }
        "ImageOverprint" => {
            ipr.image_overprint = parse_bool(directive.rest).into();
        }
        "ImageInks" => {
            ipr.image_inks = Some(directive.rest.trim().to_string());
        }
        _ => return false,
    }
    true
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Collect every `(...)` group on a line (used for `%%+`-continued string
/// lists: TIFF ASCII tags, object comments).
fn collect_paren_strings(s: &str) -> Vec<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'(' {
            if let Some(v) = parse_paren_string(&bytes[i..]) {
                // Find matching close to advance past it.
                let mut depth = 0i32;
                let mut j = i;
                let mut escaped = false;
                while j < bytes.len() {
                    match bytes[j] {
                        b'\\' if !escaped => escaped = true,
                        b'(' if !escaped => depth += 1,
                        b')' if !escaped => {
                            depth -= 1;
                            if depth == 0 {
                                j += 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                    if bytes[j] != b'\\' {
                        escaped = false;
                    }
                    j += 1;
                }
                out.push(v);
                i = j;
                continue;
            }
        }
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_escapes() {
        assert_eq!(decode_ps_string(b"foo\\(bar\\)"), "foo(bar)");
        assert_eq!(decode_ps_string(b"back\\\\slash"), "back\\slash");
    }

    #[test]
    fn decodes_octal_and_hex_to_question_mark() {
        assert_eq!(decode_ps_string(b"a\\101b"), "a?b");
        assert_eq!(decode_ps_string(b"a<4a>b"), "a?b");
    }

    #[test]
    fn encode_roundtrips_safe_bytes() {
        let encoded = encode_ps_string("hello world!");
        assert_eq!(encoded, "hello world!");
    }

    #[test]
    fn encode_hex_escapes_unsafe_bytes() {
        let encoded = encode_ps_string("a\u{0}b");
        assert_eq!(encoded, "a<00>b");
    }

    #[test]
    fn tokenize_ald_directive() {
        let d = tokenize(b"%ALDImageFileName: (foo.tif)\n").unwrap();
        assert_eq!(d.key, "ALDImageFileName");
        assert_eq!(d.rest, "(foo.tif)");
    }

    #[test]
    fn tokenize_envelope_token_without_colon() {
        let d = tokenize(b"%%EndOPI\n").unwrap();
        assert_eq!(d.key, "EndOPI");
        assert_eq!(d.rest, "");
    }

    #[test]
    fn apply_image_file_name() {
        let mut ipr = ImagePlacementRecord::default();
        let d = tokenize(b"%ALDImageFileName: (Macintosh HD:foo.tif)\n").unwrap();
        apply_directive(&mut ipr, &d);
        assert_eq!(ipr.image_file_name, "Macintosh HD:foo.tif");
        assert!(ipr.version_markers.contains(OpiVersion::V1_3));
    }

    #[test]
    fn infers_process_ink_from_single_channel() {
        let mut color = ImageColor {
            c: 0.0,
            m: 1.0,
            y: 0.0,
            k: 0.0,
            ink_name: "weird".into(),
        };
        assert_eq!(color.infer_process_ink_name(), Some("Magenta"));
        color.ink_name = "Magenta".into();
        assert_eq!(color.infer_process_ink_name(), None);
    }

    #[test]
    fn collects_multiple_paren_strings() {
        let values = collect_paren_strings("(a) (b) (c)");
        assert_eq!(values, vec!["a", "b", "c"]);
    }
}
