//! PostScript Emitter (spec §4.7): OPI metadata re-emission, graphics-state
//! preamble, transformation matrix, and the bracketed image data block.

use std::io::{self, Write};

use crate::comment_parser::encode_ps_string;
use crate::config::EngineConfig;
use crate::model::{ColorType, ConditionedImage, EpsfImage, ImageColor, ImagePlacementRecord, OpiVersion, PixelMode, RasterImage};
use crate::state_machine::GfxStateBuffer;

const DEFAULT_PROCSET: &str = "\
%%BeginResource: procset OPISubstitution
/B { bind def } bind def
/X { exch def } B
/ImageDict 12 dict def
/CreateImageDict {
  ImageDict begin
    /ImageType 1 X /Width X /Height X /BitsPerComponent X
    /Decode X /ImageMatrix X /DataSource X
  end ImageDict
} B
/inkmul { 3 -1 roll mul 3 1 roll } B
%%EndResource";

const DEVICEN_PROCSET: &str = "\
%%BeginResource: procset OPIDeviceN
/scs { setcolorspace } B
/sc { setcolor } B
/dntocmykf { dup length 1 sub -1 0 { } for } B
/gendn {
  [ /DeviceN 3 -1 roll /DeviceCMYK { dntocmykf } ] scs sc
} B
/gendncs {
  [ /Indexed 4 -1 roll 255 3 -1 roll ] scs
} B
%%EndResource";

fn write_line(w: &mut impl Write, newline: &[u8], line: &str) -> io::Result<()> {
    w.write_all(line.as_bytes())?;
    w.write_all(newline)
}

fn fmt_bool(v: bool) -> &'static str {
    if v {
        "true"
    } else {
        "false"
    }
}

fn fmt_ps_string(s: &str) -> String {
    format!("({})", encode_ps_string(s))
}

/// Spec §4.7 step 2: `%%ImageInks` derivation when not supplied verbatim.
pub fn derive_image_inks(ipr: &ImagePlacementRecord, channels: u8) -> String {
    if let Some(inks) = &ipr.image_inks {
        return inks.clone();
    }
    if channels > 1 {
        return "full_color".to_string();
    }
    match (&ipr.image_color_type, &ipr.image_color) {
        (ColorType::Process, Some(color)) => format!("monochrome 1 ({}) {}", color.ink_name, fmt_tint(color)),
        (ColorType::Spot, Some(color)) => format!("monochrome 1 ({}) {}", color.ink_name, fmt_tint(color)),
        _ => "full_color".to_string(),
    }
}

fn fmt_tint(color: &ImageColor) -> String {
    let strongest = color.c.max(color.m).max(color.y).max(color.k);
    format!("{strongest:.3}")
}

fn emit_opi_1_3(w: &mut impl Write, ipr: &ImagePlacementRecord, image: &ConditionedImage, nl: &[u8]) -> io::Result<()> {
    write_line(w, nl, &format!("%ALDImageFileName: {}", fmt_ps_string(&ipr.image_file_name)))?;
    if let Some(id) = &ipr.image_id {
        write_line(w, nl, &format!("%ALDImageID: {}", fmt_ps_string(id)))?;
    }
    if !ipr.object_comments.is_empty() {
        write_line(w, nl, &format!("%ALDObjectComments: {}", ipr.object_comments.join(" ")))?;
    }
    if let Some((w_, h_)) = ipr.image_dimensions {
        write_line(w, nl, &format!("%ALDImageDimensions: {w_} {h_}"))?;
    }
    if let Some(r) = &ipr.image_crop_rect {
        write_line(w, nl, &format!("%ALDImageCropRect: {} {} {} {}", r.x1, r.y1, r.x2, r.y2))?;
    }
    if let Some(r) = &ipr.image_crop_fixed {
        write_line(w, nl, &format!("%ALDImageCropFixed: {:.3} {:.3} {:.3} {:.3}", r.x1, r.y1, r.x2, r.y2))?;
    }
    if let Some(p) = &ipr.image_position {
        write_line(w, nl, &format!("%ALDImagePosition: {} {} {} {} {} {} {} {}", p[0], p[1], p[2], p[3], p[4], p[5], p[6], p[7]))?;
    }
    if let Some((x, y)) = ipr.image_resolution {
        write_line(w, nl, &format!("%ALDImageResolution: {x} {y}"))?;
    }
    write_line(w, nl, &format!("%ALDImageColorType: {}", match ipr.image_color_type {
        ColorType::Process => "Process",
        ColorType::Spot => "Spot",
        ColorType::Unspecified => "Unspecified",
    }))?;
    if let Some(color) = &ipr.image_color {
        write_line(w, nl, &format!("%ALDImageColor: {} {} {} {} ({})", color.c, color.m, color.y, color.k, color.ink_name))?;
    }
    if let Some(tint) = ipr.image_tint {
        write_line(w, nl, &format!("%ALDImageTint: {tint}"))?;
    }
    if let Some(v) = ipr.image_overprint.as_bool() {
        write_line(w, nl, &format!("%ALDImageOverprint: {}", fmt_bool(v)))?;
    }
    let (channels, bpp) = image_mode_info(image);
    write_line(w, nl, &format!("%ALDImageType: {channels} {bpp}"))?;
    let mut rows = ipr.image_gray_map.iter();
    if let Some(first) = rows.next() {
        write_line(w, nl, &format!("%ALDImageGrayMap: {}", join_ints(first)))?;
        for row in rows {
            write_line(w, nl, &format!("%%+ {}", join_ints(row)))?;
        }
    }
    if let Some(v) = ipr.image_transparency.as_bool() {
        write_line(w, nl, &format!("%ALDImageTransparency: {}", fmt_bool(v)))?;
    }
    for (tag, values) in &ipr.tiff_ascii_tags {
        write_line(w, nl, &format!("%ALDImageAsciiTag{tag}: {}", join_parens(&values[..values.len().min(4)])))?;
        for chunk in values[values.len().min(4)..].chunks(4) {
            write_line(w, nl, &format!("%%+ {}", join_parens(chunk)))?;
        }
    }
    write_line(w, nl, "%%BeginObject: image")
}

fn emit_opi_2_0(w: &mut impl Write, ipr: &ImagePlacementRecord, image: &ConditionedImage, nl: &[u8]) -> io::Result<()> {
    write_line(w, nl, "%%BeginOPI: 2.0")?;
    write_line(w, nl, &format!("%%ImageFileName: {}", fmt_ps_string(&ipr.image_file_name)))?;
    if let Some(main) = &ipr.main_image {
        write_line(w, nl, &format!("%%MainImage: {}", fmt_ps_string(main)))?;
    }
    for (tag, values) in &ipr.tiff_ascii_tags {
        write_line(w, nl, &format!("%%TIFFASCIITag: {tag} {}", join_parens(values)))?;
    }
    if let Some((w_, h_)) = ipr.image_dimensions {
        write_line(w, nl, &format!("%%ImageDimensions: {w_} {h_}"))?;
    }
    if let Some(r) = &ipr.image_crop_fixed {
        write_line(w, nl, &format!("%%ImageCropRect: {:.3} {:.3} {:.3} {:.3}", r.x1, r.y1, r.x2, r.y2))?;
    }
    if let Some(v) = ipr.image_overprint.as_bool() {
        write_line(w, nl, &format!("%%ImageOverprint: {}", fmt_bool(v)))?;
    }
    let (channels, _) = image_mode_info(image);
    write_line(w, nl, &format!("%%ImageInks: {}", derive_image_inks(ipr, channels)))?;

    write_line(w, nl, "%%BeginIncludedImage")?;
    if let Some((w_, h_)) = ipr.included_image_dimensions {
        write_line(w, nl, &format!("%%IncludedImageDimensions: {w_} {h_}"))?;
    }
    if let Some(q) = ipr.included_image_quality {
        write_line(w, nl, &format!("%%IncludedImageQuality: {q}"))?;
    }
    Ok(())
}

fn join_ints(v: &[i64]) -> String {
    v.iter().map(i64::to_string).collect::<Vec<_>>().join(" ")
}

fn join_parens(values: &[String]) -> String {
    values.iter().map(|s| fmt_ps_string(s)).collect::<Vec<_>>().join(" ")
}

fn image_mode_info(image: &ConditionedImage) -> (u8, u8) {
    match image {
        ConditionedImage::Raster(r) => (r.mode.channels(), r.mode.bits_per_component()),
        ConditionedImage::Epsf(_) => (0, 0),
    }
}

struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    tx: f64,
    ty: f64,
}

/// Spec §4.7 step 4: `[a b c d tx ty]` from the four placement corners.
fn placement_matrix(position: &[f64; 8], w: f64, h: f64) -> Matrix {
    let (llx, lly, ulx, uly, _urx, _ury, lrx, lry) = (
        position[0], position[1], position[2], position[3], position[4], position[5], position[6], position[7],
    );
    Matrix {
        a: if w != 0.0 { (lrx - llx) / w } else { 0.0 },
        b: if w != 0.0 { (lry - lly) / w } else { 0.0 },
        c: if h != 0.0 { (ulx - llx) / h } else { 0.0 },
        d: if h != 0.0 { (uly - lly) / h } else { 0.0 },
        tx: llx,
        ty: lly,
    }
}

fn emit_colorization_procset(w: &mut impl Write, ipr: &ImagePlacementRecord, nl: &[u8]) -> io::Result<()> {
    match (&ipr.image_color_type, &ipr.image_color) {
        (ColorType::Process, Some(color)) => {
            write_line(w, nl, &format!("{} {} {} {} setcmykcolor", color.c, color.m, color.y, color.k))
        }
        (_, Some(color)) => {
            write_line(w, nl, DEVICEN_PROCSET)?;
            let tint = ipr.image_tint.unwrap_or(1.0);
            write_line(
                w,
                nl,
                &format!(
                    "{tint} 1 [[{} {} {} {}]] [({})] gendn",
                    color.c, color.m, color.y, color.k, color.ink_name
                ),
            )
        }
        _ => write_line(w, nl, "0 0 0 1 setcmykcolor"),
    }
}

/// Spec §4.7 step 3 (`L` branch): DeviceN-based indexed colour space
/// mapping 0..255 grayscale through every contributing ink.
fn build_devicen_lut(fg: &ImageColor, bg: Option<&ImageColor>) -> Vec<u8> {
    let mut out = Vec::with_capacity(256 * 4);
    for n in 0..256u32 {
        let nf = n as f64;
        let fg_sample = |channel: f64| (nf * channel).round().clamp(0.0, 255.0) as u8;
        let bg_sample = |channel: f64| ((255.0 - nf) * channel).round().clamp(0.0, 255.0) as u8;
        let combine = |fg_ch: f64, bg_ch: Option<f64>| {
            let f = fg_sample(fg_ch);
            match bg_ch {
                Some(b) => f.max(bg_sample(b)),
                None => f,
            }
        };
        out.push(combine(fg.c, bg.map(|b| b.c)));
        out.push(combine(fg.m, bg.map(|b| b.m)));
        out.push(combine(fg.y, bg.map(|b| b.y)));
        out.push(combine(fg.k, bg.map(|b| b.k)));
    }
    out
}

fn emit_gray_colorspace(w: &mut impl Write, ipr: &ImagePlacementRecord, config: &EngineConfig, nl: &[u8]) -> io::Result<()> {
    let fg = ipr.image_color.clone().unwrap_or(ImageColor { c: 0.0, m: 0.0, y: 0.0, k: 1.0, ink_name: "Black".into() });
    if fg.c == 0.0 && fg.m == 0.0 && fg.y == 0.0 && fg.k == 1.0 && !config.detect_qxp_background {
        // Pure K: plain DeviceGray, no indexed colour space needed.
        return write_line(w, nl, "/DeviceGray setcolorspace");
    }
    write_line(w, nl, DEVICEN_PROCSET)?;
    let lut = build_devicen_lut(&fg, None);
    let hex: String = lut.iter().map(|b| format!("{b:02x}")).collect();
    if ipr.image_color_type == ColorType::Spot {
        write_line(w, nl, &format!("[/Indexed [/DeviceN [({})] /DeviceCMYK {{}}] 255 <{hex}>] gendncs", fg.ink_name))
    } else {
        write_line(w, nl, &format!("[/Indexed /DeviceCMYK 255 <{hex}>] setcolorspace"))
    }
}

fn emit_raster(w: &mut impl Write, ipr: &ImagePlacementRecord, raster: &RasterImage, config: &EngineConfig, nl: &[u8]) -> io::Result<()> {
    write_line(w, nl, DEFAULT_PROCSET)?;

    match raster.mode {
        PixelMode::Mono => emit_colorization_procset(w, ipr, nl)?,
        PixelMode::Gray => emit_gray_colorspace(w, ipr, config, nl)?,
        PixelMode::Rgb | PixelMode::Cmyk => {}
    }

    if let Some(position) = &ipr.image_position {
        let m = placement_matrix(position, raster.width as f64, raster.height as f64);
        write_line(w, nl, &format!("[{} {} {} {} {} {}] concat", m.a, m.b, m.c, m.d, m.tx, m.ty))?;
        write_line(w, nl, &format!("[{} 0 0 {} 0 0] concat", raster.width, raster.height))?;
        if let (Some(full), Some(crop)) = (ipr.image_dimensions, ipr.real_crop_rect) {
            let is_interior = crop.x1 > 0 || crop.y1 > 0 || (crop.x2 as f64) < full.0 || (crop.y2 as f64) < full.1;
            if is_interior {
                write_line(w, nl, &format!("[1 0 0 1 {} {}] concat", -crop.x1, -crop.y1))?;
            }
        }
    }

    write_line(w, nl, "/rdstr 0 string def")?;
    write_line(w, nl, "/imagedata 0 string def")?;
    write_line(w, nl, &format!("[{} 0 0 -{} 0 {}] concat", raster.width, raster.height, raster.height))?;

    match raster.mode {
        PixelMode::Mono | PixelMode::Gray => {
            write_line(w, nl, &format!("{} {} {} CreateImageDict", raster.width, raster.height, raster.mode.bits_per_component()))?;
        }
        PixelMode::Rgb => write_line(w, nl, &format!("{} {} 8 [{} 0 0 -{} 0 {}] false 3 colorimage", raster.width, raster.height, raster.width, raster.height, raster.height))?,
        PixelMode::Cmyk => write_line(w, nl, &format!("{} {} 8 [{} 0 0 -{} 0 {}] false 4 colorimage", raster.width, raster.height, raster.width, raster.height, raster.height))?,
    }

    let bytes = raster.byte_size();
    let mode_label = if config.binary_mode { "Binary" } else { "Hex" };
    write_line(w, nl, &format!("%%BeginData: {bytes} {mode_label} Bytes"))?;
    if config.binary_mode {
        w.write_all(&raster.data)?;
    } else {
        let row_bytes = if raster.height == 0 { bytes } else { bytes / raster.height as usize };
        write_hex_lines(w, &raster.data, row_bytes, nl)?;
    }
    write_line(w, nl, "%%EndData")
}

fn write_hex_lines(w: &mut impl Write, data: &[u8], row_bytes: usize, nl: &[u8]) -> io::Result<()> {
    for chunk in data.chunks(row_bytes.max(1)) {
        let hex: String = chunk.iter().map(|b| format!("{b:02x}")).collect();
        write_line(w, nl, &hex)?;
    }
    Ok(())
}

fn emit_epsf(w: &mut impl Write, ipr: &ImagePlacementRecord, epsf: &EpsfImage, nl: &[u8]) -> io::Result<()> {
    write_line(w, nl, DEFAULT_PROCSET)?;
    if let Some(position) = &ipr.image_position {
        let m = placement_matrix(position, epsf.bbox.0, epsf.bbox.1);
        write_line(w, nl, &format!("[{} {} {} {} {} {}] concat", m.a, m.b, m.c, m.d, m.tx, m.ty))?;
    }
    let doc_name = fmt_ps_string(&ipr.image_file_name);
    write_line(w, nl, &format!("%%BeginDocument: {doc_name}"))?;
    w.write_all(&epsf.payload)?;
    write_line(w, nl, "%%EndDocument")
}

/// Full per-object emission: replay the buffered preamble, re-emit OPI
/// metadata per the requested dialect(s), then the substitution body.
pub fn emit(w: &mut impl Write, ipr: &ImagePlacementRecord, gfx: &GfxStateBuffer, image: &ConditionedImage, config: &EngineConfig) -> io::Result<()> {
    let nl = config.newline.as_bytes();
    w.write_all(&gfx.raw)?;
    for line in &gfx.procset_lines {
        write_line(w, nl, line)?;
    }

    if config.emit_opi_1_3 {
        emit_opi_1_3(w, ipr, image, nl)?;
    }
    if config.emit_opi_2_0 {
        emit_opi_2_0(w, ipr, image, nl)?;
    }

    match image {
        ConditionedImage::Raster(raster) => emit_raster(w, ipr, raster, config, nl)?,
        ConditionedImage::Epsf(epsf) => emit_epsf(w, ipr, epsf, nl)?,
    }

    if config.emit_opi_2_0 {
        write_line(w, nl, "%%EndIncludedImage")?;
        write_line(w, nl, "%%EndOPI")?;
    }
    if config.emit_opi_1_3 {
        write_line(w, nl, "%%EndObject")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntRect, OptionalFlag};

    fn minimal_ipr() -> ImagePlacementRecord {
        let mut ipr = ImagePlacementRecord::new("foo.tif");
        ipr.image_position = Some([0.0, 0.0, 0.0, 72.0, 72.0, 72.0, 72.0, 0.0]);
        ipr.image_dimensions = Some((300.0, 300.0));
        ipr.real_crop_rect = Some(IntRect::new(0, 0, 300, 300));
        ipr.included_image_dimensions = Some((300, 300));
        ipr.included_image_quality = Some(3.0);
        ipr.version_markers.insert(OpiVersion::V2_0);
        ipr
    }

    #[test]
    fn emits_rgb_colorimage_block_with_expected_byte_count() {
        let ipr = minimal_ipr();
        let raster = RasterImage { mode: PixelMode::Rgb, width: 300, height: 300, data: vec![0u8; 300 * 300 * 3], dpi: None };
        let image = ConditionedImage::Raster(raster);
        let config = EngineConfig::default();
        let gfx = GfxStateBuffer::default();
        let mut out = Vec::new();
        emit(&mut out, &ipr, &gfx, &image, &config).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("%%BeginData: 270000 Binary Bytes"));
        assert!(text.contains("colorimage"));
        assert!(text.contains("%%BeginIncludedImage"));
        assert!(text.contains("%%IncludedImageDimensions: 300 300"));
        assert!(text.contains("%%IncludedImageQuality: 3"));
        assert!(text.contains("%%EndIncludedImage"));
    }

    #[test]
    fn derive_image_inks_single_channel_process() {
        let mut ipr = minimal_ipr();
        ipr.image_color_type = ColorType::Process;
        ipr.image_color = Some(ImageColor { c: 0.0, m: 0.0, y: 0.0, k: 1.0, ink_name: "Black".into() });
        assert_eq!(derive_image_inks(&ipr, 1), "monochrome 1 (Black) 1.000");
    }

    #[test]
    fn derive_image_inks_multi_channel_is_full_color() {
        let ipr = minimal_ipr();
        assert_eq!(derive_image_inks(&ipr, 4), "full_color");
    }

    #[test]
    fn epsf_wraps_payload_in_begin_end_document() {
        let ipr = minimal_ipr();
        let epsf = EpsfImage { payload: b"%!PS-Adobe\nshowpage\n".to_vec(), bbox: (72.0, 72.0) };
        let image = ConditionedImage::Epsf(epsf);
        let config = EngineConfig::default();
        let gfx = GfxStateBuffer::default();
        let mut out = Vec::new();
        emit(&mut out, &ipr, &gfx, &image, &config).unwrap();
        let text = String::from_utf8_lossy(&out);
        assert!(text.contains("%%BeginDocument:"));
        assert!(text.contains("%%EndDocument"));
    }
}
