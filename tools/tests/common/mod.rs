//! Fixture helpers shared by the scenario tests: a hand-rolled minimal TIFF
//! writer (the counterpart of `tiff_raw`'s private `le_ifd` test helper,
//! which isn't reachable from here), an EPSF fixture, and a resolver that
//! always answers with one fixed path.

use std::path::{Path, PathBuf};

use opi_engine::engine::ImageResolver;
use opi_engine::error::{EngineError, EngineResult};

pub struct FixedResolver(pub PathBuf);

impl ImageResolver for FixedResolver {
    fn resolve(&self, _image_file_name: &str) -> EngineResult<PathBuf> {
        Ok(self.0.clone())
    }
}

fn le_ifd(entries: &[(u16, u16, u32, u32)], extra: &[u8]) -> Vec<u8> {
    let mut buf = vec![b'I', b'I', 42, 0];
    buf.extend_from_slice(&8u32.to_le_bytes()); // IFD offset
    buf.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, ftype, count, value) in entries {
        buf.extend_from_slice(&tag.to_le_bytes());
        buf.extend_from_slice(&ftype.to_le_bytes());
        buf.extend_from_slice(&count.to_le_bytes());
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf.extend_from_slice(&0u32.to_le_bytes()); // next IFD offset
    buf.extend_from_slice(extra);
    buf
}

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;

/// A 2x1 uncompressed CMYK TIFF with C=M=Y=0 everywhere and the given K
/// bytes, i.e. the `is_cmyk_gray` detector's exact trigger shape.
pub fn minimal_cmyk_gray_tiff(k: [u8; 2]) -> Vec<u8> {
    let strip_off = 200u32;
    let entries = [
        (TAG_IMAGE_WIDTH, 3, 1, 2),
        (TAG_IMAGE_LENGTH, 3, 1, 1),
        (TAG_BITS_PER_SAMPLE, 3, 1, 8),
        (TAG_COMPRESSION, 3, 1, 1),
        (TAG_PHOTOMETRIC, 3, 1, 5),
        (TAG_SAMPLES_PER_PIXEL, 3, 1, 4),
        (TAG_STRIP_OFFSETS, 4, 1, strip_off),
        (TAG_STRIP_BYTE_COUNTS, 4, 1, 8),
    ];
    let mut buf = le_ifd(&entries, &[]);
    buf.resize(strip_off as usize, 0);
    buf.extend_from_slice(&[0, 0, 0, k[0], 0, 0, 0, k[1]]);
    buf
}

pub fn minimal_epsf(bbox: (i32, i32, i32, i32)) -> Vec<u8> {
    format!(
        "%!PS-Adobe-3.0 EPSF-3.0\n%%BoundingBox: {} {} {} {}\n0 0 moveto\nshowpage\n",
        bbox.0, bbox.1, bbox.2, bbox.3
    )
    .into_bytes()
}

pub fn write_fixture(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
