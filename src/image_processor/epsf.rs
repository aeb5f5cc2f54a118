//! EPSF payload extraction (spec §4.5 step 2): DOS-EPS binary header
//! layout, or a bare `%!` ASCII EPS file used as-is.

use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::model::EpsfImage;

const DOS_EPS_MAGIC: [u8; 4] = [0xC5, 0xD0, 0xD3, 0xC6];

pub fn extract(bytes: &[u8], path: &Path) -> EngineResult<EpsfImage> {
    let payload = if bytes.len() >= 4 && bytes[0..4] == DOS_EPS_MAGIC {
        if bytes.len() < 12 {
            return Err(EngineError::UnsupportedImageMode {
                path: path.display().to_string(),
                mode: "truncated DOS EPS header".into(),
            });
        }
        let ps_offset = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        let ps_length = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
        bytes
            .get(ps_offset..ps_offset + ps_length)
            .ok_or_else(|| EngineError::UnsupportedImageMode {
                path: path.display().to_string(),
                mode: "DOS EPS ps_offset/ps_length out of range".into(),
            })?
            .to_vec()
    } else {
        bytes.to_vec()
    };

    let bbox = parse_bbox(&payload).unwrap_or((0.0, 0.0));
    Ok(EpsfImage { payload, bbox })
}

fn parse_bbox(payload: &[u8]) -> Option<(f64, f64)> {
    let text = String::from_utf8_lossy(payload);
    let line = find_bbox_line(&text, "%%HiResBoundingBox:").or_else(|| find_bbox_line(&text, "%%BoundingBox:"))?;
    let nums: Vec<f64> = line.split_whitespace().filter_map(|t| t.parse::<f64>().ok()).collect();
    if nums.len() >= 4 {
        Some((nums[2] - nums[0], nums[3] - nums[1]))
    } else {
        None
    }
}

fn find_bbox_line<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.lines().find_map(|l| l.trim_start().strip_prefix(prefix)).map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_ascii_epsf_verbatim() {
        let bytes = b"%!PS-Adobe-3.0 EPSF-3.0\n%%BoundingBox: 0 0 100 200\n";
        let epsf = extract(bytes, Path::new("foo.eps")).unwrap();
        assert_eq!(epsf.payload, bytes);
        assert_eq!(epsf.bbox, (100.0, 200.0));
    }

    #[test]
    fn extracts_dos_eps_payload_window() {
        let mut bytes = DOS_EPS_MAGIC.to_vec();
        bytes.extend_from_slice(&30u32.to_le_bytes()); // ps_offset
        bytes.extend_from_slice(&20u32.to_le_bytes()); // ps_length
        bytes.extend_from_slice(&[0u8; 16]); // padding up to offset 30
        let payload = b"%%BoundingBox: 0 0 10 5";
        bytes.extend_from_slice(&payload[..20]);
        let epsf = extract(&bytes, Path::new("foo.eps")).unwrap();
        assert_eq!(epsf.payload, payload[..20]);
    }

    #[test]
    fn prefers_hires_bounding_box() {
        let bytes = b"%!PS\n%%BoundingBox: 0 0 10 10\n%%HiResBoundingBox: 0 0 10.5 20.25\n";
        let epsf = extract(bytes, Path::new("foo.eps")).unwrap();
        assert_eq!(epsf.bbox, (10.5, 20.25));
    }
}
