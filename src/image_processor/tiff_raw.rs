//! Minimal uncompressed-TIFF IFD reader (spec §4.5 steps 1/3): `image`'s
//! TIFF decoder has no CMYK or true 1-bit-per-sample pixel buffer, so those
//! two layouts are read directly off the tag directory, in the same
//! explicit-byte-order style the EPSF DOS header is parsed in.

use crate::model::{PixelMode, RasterImage};

#[derive(Debug, Clone, Copy)]
enum ByteOrder {
    Little,
    Big,
}

struct Reader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

impl<'a> Reader<'a> {
    fn u16(&self, off: usize) -> Option<u16> {
        let b = self.buf.get(off..off + 2)?;
        Some(match self.order {
            ByteOrder::Little => u16::from_le_bytes(b.try_into().unwrap()),
            ByteOrder::Big => u16::from_be_bytes(b.try_into().unwrap()),
        })
    }

    fn u32(&self, off: usize) -> Option<u32> {
        let b = self.buf.get(off..off + 4)?;
        Some(match self.order {
            ByteOrder::Little => u32::from_le_bytes(b.try_into().unwrap()),
            ByteOrder::Big => u32::from_be_bytes(b.try_into().unwrap()),
        })
    }
}

struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: u32,
    value_or_offset: u32,
}

fn read_ifd_entries(r: &Reader, ifd_off: usize) -> Option<Vec<IfdEntry>> {
    let count = r.u16(ifd_off)? as usize;
    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let base = ifd_off + 2 + i * 12;
        entries.push(IfdEntry {
            tag: r.u16(base)?,
            field_type: r.u16(base + 2)?,
            count: r.u32(base + 4)?,
            value_or_offset: r.u32(base + 8)?,
        });
    }
    Some(entries)
}

/// SHORT values that fit inline are left-justified within the 4-byte slot
/// on big-endian streams; little-endian streams put them first.
fn scalar_value(r: &Reader, e: &IfdEntry) -> u32 {
    match (e.field_type, r.order) {
        (3, ByteOrder::Big) => (e.value_or_offset >> 16) & 0xFFFF,
        _ => e.value_or_offset,
    }
}

fn rational_at(r: &Reader, offset: usize) -> Option<f64> {
    let num = r.u32(offset)? as f64;
    let den = r.u32(offset + 4)? as f64;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

fn read_array(r: &Reader, e: &IfdEntry) -> Vec<u32> {
    let count = e.count as usize;
    let elem_size: usize = if e.field_type == 3 { 2 } else { 4 };
    if elem_size * count <= 4 {
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let v = match (elem_size, r.order) {
                (2, ByteOrder::Big) if i == 0 => (e.value_or_offset >> 16) & 0xFFFF,
                (2, ByteOrder::Big) => e.value_or_offset & 0xFFFF,
                (2, ByteOrder::Little) if i == 0 => e.value_or_offset & 0xFFFF,
                (2, ByteOrder::Little) => (e.value_or_offset >> 16) & 0xFFFF,
                _ => e.value_or_offset,
            };
            out.push(v);
        }
        return out;
    }
    let mut out = Vec::with_capacity(count);
    let mut off = e.value_or_offset as usize;
    for _ in 0..count {
        let v = if elem_size == 2 { r.u16(off).map(u32::from) } else { r.u32(off) };
        match v {
            Some(v) => out.push(v),
            None => break,
        }
        off += elem_size;
    }
    out
}

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_BITS_PER_SAMPLE: u16 = 258;
const TAG_COMPRESSION: u16 = 259;
const TAG_PHOTOMETRIC: u16 = 262;
const TAG_STRIP_OFFSETS: u16 = 273;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_STRIP_BYTE_COUNTS: u16 = 279;
const TAG_X_RESOLUTION: u16 = 282;
const TAG_Y_RESOLUTION: u16 = 283;

/// Returns `Some(image)` only for uncompressed CMYK or true bilevel TIFFs —
/// the two pixel layouts `image::DynamicImage` can't represent. Anything
/// else returns `None` so the caller falls back to the `image` crate.
pub fn try_decode_special_mode(bytes: &[u8]) -> Option<RasterImage> {
    let order = match bytes.get(0..2)? {
        b"II" => ByteOrder::Little,
        b"MM" => ByteOrder::Big,
        _ => return None,
    };
    let r = Reader { buf: bytes, order };
    if r.u16(2)? != 42 {
        return None;
    }
    let ifd_off = r.u32(4)? as usize;
    let entries = read_ifd_entries(&r, ifd_off)?;

    let mut width = None;
    let mut height = None;
    let mut bits_per_sample = 1u32;
    let mut compression = 1u32;
    let mut photometric = None;
    let mut samples_per_pixel = 1u32;
    let mut strip_offsets = Vec::new();
    let mut strip_byte_counts = Vec::new();
    let mut x_res = None;
    let mut y_res = None;

    for e in &entries {
        match e.tag {
            TAG_IMAGE_WIDTH => width = Some(scalar_value(&r, e)),
            TAG_IMAGE_LENGTH => height = Some(scalar_value(&r, e)),
            TAG_BITS_PER_SAMPLE => bits_per_sample = scalar_value(&r, e),
            TAG_COMPRESSION => compression = scalar_value(&r, e),
            TAG_PHOTOMETRIC => photometric = Some(scalar_value(&r, e)),
            TAG_SAMPLES_PER_PIXEL => samples_per_pixel = scalar_value(&r, e),
            TAG_STRIP_OFFSETS => strip_offsets = read_array(&r, e),
            TAG_STRIP_BYTE_COUNTS => strip_byte_counts = read_array(&r, e),
            TAG_X_RESOLUTION => x_res = rational_at(&r, e.value_or_offset as usize),
            TAG_Y_RESOLUTION => y_res = rational_at(&r, e.value_or_offset as usize),
            _ => {}
        }
    }

    if compression != 1 {
        return None; // only uncompressed strips are handled here
    }
    let width = width?;
    let height = height?;
    let photometric = photometric?;

    let mode = match (photometric, samples_per_pixel, bits_per_sample) {
        (5, 4, 8) => PixelMode::Cmyk,
        (0 | 1, 1, 1) => PixelMode::Mono,
        _ => return None,
    };

    let mut data = Vec::new();
    for (off, len) in strip_offsets.iter().zip(strip_byte_counts.iter()) {
        data.extend_from_slice(bytes.get(*off as usize..(*off + *len) as usize)?);
    }
    if photometric == 0 {
        // "WhiteIsZero": invert to this crate's black-is-zero bit sense.
        for b in data.iter_mut() {
            *b = !*b;
        }
    }

    let dpi = match (x_res, y_res) {
        (Some(x), Some(y)) => Some((x, y)),
        _ => None,
    };

    Some(RasterImage { mode, width, height, data, dpi })
}
