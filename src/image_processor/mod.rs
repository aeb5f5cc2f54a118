//! Image Processor (spec §4.5): opens the hi-res file, classifies mode,
//! detects CMYK-gray, crops, resamples, invokes the ICC transform.

pub mod cmyk_gray;
pub mod epsf;
pub mod tiff_raw;

use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::{imageops, DynamicImage, GenericImageView};

use crate::config::{EngineConfig, ResampleFilter};
use crate::error::{EngineError, EngineResult};
use crate::model::{ConditionedImage, EpsfImage, IntRect, PixelMode, RasterImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Jpeg,
    Png,
    Psd,
    Tiff,
    Epsf,
    Unknown,
}

const DOS_EPS_MAGIC: [u8; 4] = [0xC5, 0xD0, 0xD3, 0xC6];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Format sniffing by magic bytes (spec §4.5 step 1).
pub fn sniff_format(bytes: &[u8]) -> SniffedFormat {
    if bytes.starts_with(&DOS_EPS_MAGIC) || bytes.starts_with(b"%!") {
        return SniffedFormat::Epsf;
    }
    if bytes.starts_with(&[0xFF, 0xD8]) {
        return SniffedFormat::Jpeg;
    }
    if bytes.starts_with(&PNG_MAGIC) {
        return SniffedFormat::Png;
    }
    if bytes.starts_with(b"8BPS") {
        return SniffedFormat::Psd;
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return SniffedFormat::Tiff;
    }
    SniffedFormat::Unknown
}

pub enum OpenedSource {
    Raster(RasterImage),
    Epsf(EpsfImage),
}

/// Step 1-2: read the file, sniff it, and decode/extract it.
pub fn open_source_image(path: &Path) -> EngineResult<OpenedSource> {
    let display = path.display().to_string();
    let bytes = fs::read(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            EngineError::ImageNotFound { path: display.clone() }
        } else {
            EngineError::Io { path: display.clone(), source: e }
        }
    })?;

    match sniff_format(&bytes) {
        SniffedFormat::Epsf => epsf::extract(&bytes, path).map(OpenedSource::Epsf),
        SniffedFormat::Jpeg | SniffedFormat::Png => decode_with_image_crate(&bytes, &display).map(OpenedSource::Raster),
        SniffedFormat::Tiff => decode_tiff(&bytes, &display).map(OpenedSource::Raster),
        SniffedFormat::Psd | SniffedFormat::Unknown => Err(EngineError::UnsupportedImageFormat { path: display }),
    }
}

fn decode_tiff(bytes: &[u8], display: &str) -> EngineResult<RasterImage> {
    if let Some(special) = tiff_raw::try_decode_special_mode(bytes) {
        return Ok(special);
    }
    decode_with_image_crate(bytes, display)
}

fn decode_with_image_crate(bytes: &[u8], display: &str) -> EngineResult<RasterImage> {
    let reader = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EngineError::Io { path: display.to_string(), source: e })?;
    let dynamic = reader.decode().map_err(|e| EngineError::UnsupportedImageMode {
        path: display.to_string(),
        mode: e.to_string(),
    })?;
    raster_from_dynamic(&dynamic)
}

fn raster_from_dynamic(dynamic: &DynamicImage) -> EngineResult<RasterImage> {
    let (width, height) = dynamic.dimensions();
    let (mode, data) = match dynamic {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLuma16(_) | DynamicImage::ImageLumaA16(_) => {
            (PixelMode::Gray, dynamic.to_luma8().into_raw())
        }
        _ => (PixelMode::Rgb, dynamic.to_rgb8().into_raw()),
    };
    Ok(RasterImage { mode, width, height, data, dpi: None })
}

/// Step 5: crop only when the area ratio clears `image_crop_threshold`.
pub fn maybe_crop(img: &RasterImage, rect: &IntRect, threshold: f64) -> (RasterImage, IntRect) {
    let full_area = (img.width as f64) * (img.height as f64);
    let crop_area = (rect.width().max(0) as f64) * (rect.height().max(0) as f64);
    if crop_area <= 0.0 || full_area / crop_area < threshold {
        let full = IntRect::new(0, 0, img.width as i64, img.height as i64);
        return (img.clone(), full);
    }
    (crop(img, rect), *rect)
}

fn crop(img: &RasterImage, rect: &IntRect) -> RasterImage {
    let x0 = rect.x1.clamp(0, img.width as i64) as u32;
    let y0 = rect.y1.clamp(0, img.height as i64) as u32;
    let w = (rect.width().max(0) as u32).min(img.width.saturating_sub(x0));
    let h = (rect.height().max(0) as u32).min(img.height.saturating_sub(y0));

    if img.mode == PixelMode::Mono {
        return crop_bilevel(img, x0, y0, w, h);
    }

    let channels = img.mode.channels() as usize;
    let mut data = Vec::with_capacity(w as usize * h as usize * channels);
    for y in y0..y0 + h {
        let row_start = (y as usize * img.width as usize + x0 as usize) * channels;
        let row_end = row_start + w as usize * channels;
        data.extend_from_slice(&img.data[row_start..row_end]);
    }
    RasterImage { mode: img.mode, width: w, height: h, data, dpi: img.dpi }
}

fn get_bit(row: &[u8], x: u32) -> bool {
    row[(x / 8) as usize] & (0x80 >> (x % 8)) != 0
}

fn set_bit(row: &mut [u8], x: u32, value: bool) {
    if value {
        row[(x / 8) as usize] |= 0x80 >> (x % 8);
    }
}

fn crop_bilevel(img: &RasterImage, x0: u32, y0: u32, w: u32, h: u32) -> RasterImage {
    let src_row_bytes = (img.width as usize + 7) / 8;
    let dst_row_bytes = (w as usize + 7) / 8;
    let mut data = vec![0u8; dst_row_bytes * h as usize];
    for dy in 0..h {
        let src_row = &img.data[(y0 + dy) as usize * src_row_bytes..(y0 + dy) as usize * src_row_bytes + src_row_bytes];
        let dst_row = &mut data[dy as usize * dst_row_bytes..(dy as usize + 1) * dst_row_bytes];
        for dx in 0..w {
            set_bit(dst_row, dx, get_bit(src_row, x0 + dx));
        }
    }
    RasterImage { mode: PixelMode::Mono, width: w, height: h, data, dpi: img.dpi }
}

/// Step 6: resample to `dims`, using one grayscale resize per channel for
/// modes `image::imageops` doesn't natively resize (CMYK, bilevel).
pub fn downsample(img: &RasterImage, dims: (u32, u32), filter: ResampleFilter) -> RasterImage {
    if (img.width, img.height) == dims {
        return img.clone();
    }
    let filter: imageops::FilterType = filter.into();
    match img.mode {
        PixelMode::Rgb => {
            let buf = image::RgbImage::from_raw(img.width, img.height, img.data.clone()).expect("raster invariant");
            let resized = imageops::resize(&buf, dims.0, dims.1, filter);
            RasterImage { mode: PixelMode::Rgb, width: dims.0, height: dims.1, data: resized.into_raw(), dpi: img.dpi }
        }
        PixelMode::Gray => {
            let buf = image::GrayImage::from_raw(img.width, img.height, img.data.clone()).expect("raster invariant");
            let resized = imageops::resize(&buf, dims.0, dims.1, filter);
            RasterImage { mode: PixelMode::Gray, width: dims.0, height: dims.1, data: resized.into_raw(), dpi: img.dpi }
        }
        PixelMode::Cmyk => downsample_planar(img, dims, filter, 4),
        PixelMode::Mono => downsample_bilevel(img, dims, filter),
    }
}

fn downsample_planar(img: &RasterImage, dims: (u32, u32), filter: imageops::FilterType, channels: usize) -> RasterImage {
    let pixels = img.width as usize * img.height as usize;
    let mut planes = vec![vec![0u8; pixels]; channels];
    for p in 0..pixels {
        for c in 0..channels {
            planes[c][p] = img.data[p * channels + c];
        }
    }
    let mut resized_planes = Vec::with_capacity(channels);
    for plane in &planes {
        let buf = image::GrayImage::from_raw(img.width, img.height, plane.clone()).expect("raster invariant");
        resized_planes.push(imageops::resize(&buf, dims.0, dims.1, filter).into_raw());
    }
    let out_pixels = dims.0 as usize * dims.1 as usize;
    let mut data = vec![0u8; out_pixels * channels];
    for p in 0..out_pixels {
        for c in 0..channels {
            data[p * channels + c] = resized_planes[c][p];
        }
    }
    RasterImage { mode: PixelMode::Cmyk, width: dims.0, height: dims.1, data, dpi: img.dpi }
}

fn downsample_bilevel(img: &RasterImage, dims: (u32, u32), filter: imageops::FilterType) -> RasterImage {
    let row_bytes = (img.width as usize + 7) / 8;
    let mut gray = vec![0u8; img.width as usize * img.height as usize];
    for y in 0..img.height {
        let row = &img.data[y as usize * row_bytes..(y as usize + 1) * row_bytes];
        for x in 0..img.width {
            gray[(y * img.width + x) as usize] = if get_bit(row, x) { 255 } else { 0 };
        }
    }
    let buf = image::GrayImage::from_raw(img.width, img.height, gray).expect("raster invariant");
    let resized = imageops::resize(&buf, dims.0, dims.1, filter);
    let resized = resized.into_raw();

    let dst_row_bytes = (dims.0 as usize + 7) / 8;
    let mut data = vec![0u8; dst_row_bytes * dims.1 as usize];
    for y in 0..dims.1 {
        let dst_row = &mut data[y as usize * dst_row_bytes..(y as usize + 1) * dst_row_bytes];
        for x in 0..dims.0 {
            let sample = resized[(y * dims.0 + x) as usize];
            set_bit(dst_row, x, sample >= 128);
        }
    }
    RasterImage { mode: PixelMode::Mono, width: dims.0, height: dims.1, data, dpi: img.dpi }
}

/// Full per-object conditioning pipeline (spec §4.5 steps 1-6; the ICC
/// transform of step 7 is invoked separately by the engine once source and
/// destination profiles are resolved).
pub fn open_and_condition(
    path: &Path,
    config: &EngineConfig,
    crop_rect: &IntRect,
    downsample_dims: (u32, u32),
) -> EngineResult<(ConditionedImage, IntRect)> {
    let opened = open_source_image(path)?;
    condition_opened(opened, config, crop_rect, downsample_dims)
}

/// Steps 3-6 on an already-opened source, so the engine can derive
/// geometry from the same decode it conditions instead of reopening the
/// file.
pub fn condition_opened(
    opened: OpenedSource,
    config: &EngineConfig,
    crop_rect: &IntRect,
    downsample_dims: (u32, u32),
) -> EngineResult<(ConditionedImage, IntRect)> {
    match opened {
        OpenedSource::Epsf(epsf) => Ok((ConditionedImage::Epsf(epsf), *crop_rect)),
        OpenedSource::Raster(mut raster) => {
            if raster.mode == PixelMode::Cmyk && config.detect_cmyk_gray_images && cmyk_gray::is_cmyk_gray(&raster) {
                if config.cmyk_gray_images_strip_cmy {
                    raster = cmyk_gray::strip_cmy_to_gray(&raster);
                }
            }
            let (cropped, used_rect) = maybe_crop(&raster, crop_rect, config.image_crop_threshold);
            let settings = config.mode_settings(cropped.mode);
            let resized = downsample(&cropped, downsample_dims, settings.downsample_filter);
            Ok((ConditionedImage::Raster(resized), used_rect))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_and_jpeg_and_epsf() {
        assert_eq!(sniff_format(&PNG_MAGIC), SniffedFormat::Png);
        assert_eq!(sniff_format(&[0xFF, 0xD8, 0xFF]), SniffedFormat::Jpeg);
        assert_eq!(sniff_format(b"%!PS-Adobe"), SniffedFormat::Epsf);
        assert_eq!(sniff_format(&DOS_EPS_MAGIC), SniffedFormat::Epsf);
        assert_eq!(sniff_format(b"8BPS-blob"), SniffedFormat::Psd);
        assert_eq!(sniff_format(b"garbage"), SniffedFormat::Unknown);
    }

    #[test]
    fn crop_below_threshold_keeps_full_image() {
        let img = RasterImage { mode: PixelMode::Rgb, width: 10, height: 10, data: vec![0; 300], dpi: None };
        let rect = IntRect::new(0, 0, 10, 9); // ratio 100/90 < 1.1
        let (out, used) = maybe_crop(&img, &rect, 1.1);
        assert_eq!((out.width, out.height), (10, 10));
        assert_eq!(used, IntRect::new(0, 0, 10, 10));
    }

    #[test]
    fn crop_above_threshold_shrinks_image() {
        let mut data = Vec::new();
        for _ in 0..100 {
            data.extend_from_slice(&[1, 2, 3]);
        }
        let img = RasterImage { mode: PixelMode::Rgb, width: 10, height: 10, data, dpi: None };
        let rect = IntRect::new(2, 2, 6, 6);
        let (out, used) = maybe_crop(&img, &rect, 1.1);
        assert_eq!((out.width, out.height), (4, 4));
        assert_eq!(used, rect);
    }

    #[test]
    fn downsample_noop_when_dims_match() {
        let img = RasterImage { mode: PixelMode::Gray, width: 4, height: 4, data: vec![0; 16], dpi: None };
        let out = downsample(&img, (4, 4), ResampleFilter::Antialias);
        assert_eq!((out.width, out.height), (4, 4));
    }

    #[test]
    fn downsample_gray_shrinks() {
        let img = RasterImage { mode: PixelMode::Gray, width: 4, height: 4, data: vec![128; 16], dpi: None };
        let out = downsample(&img, (2, 2), ResampleFilter::Nearest);
        assert_eq!((out.width, out.height), (2, 2));
        assert_eq!(out.data.len(), 4);
    }
}
