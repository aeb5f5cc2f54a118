//! CMYK-gray detection and CMY-stripping (spec §4.5 step 4).

use crate::model::{PixelMode, RasterImage};

fn pixel_cmy(img: &RasterImage, x: u32, y: u32) -> (u8, u8, u8) {
    let idx = (y as usize * img.width as usize + x as usize) * 4;
    (img.data[idx], img.data[idx + 1], img.data[idx + 2])
}

/// Five-point sample, then full-channel confirmation.
pub fn is_cmyk_gray(img: &RasterImage) -> bool {
    debug_assert_eq!(img.mode, PixelMode::Cmyk);
    if img.width == 0 || img.height == 0 {
        return false;
    }
    let w = img.width as i64;
    let h = img.height as i64;
    let points = [(w / 4, h / 4), (3 * w / 4, h / 4), (w / 2, h / 2), (w / 4, 3 * h / 4), (3 * w / 4, 3 * h / 4)];
    for (x, y) in points {
        let (c, m, y_) = pixel_cmy(img, x.clamp(0, w - 1) as u32, y.clamp(0, h - 1) as u32);
        if c != 0 || m != 0 || y_ != 0 {
            return false;
        }
    }
    let pixels = img.width as usize * img.height as usize;
    for i in 0..pixels {
        let base = i * 4;
        if img.data[base] != 0 || img.data[base + 1] != 0 || img.data[base + 2] != 0 {
            return false;
        }
    }
    true
}

/// Replace the image by its inverted K channel as single-channel gray.
pub fn strip_cmy_to_gray(img: &RasterImage) -> RasterImage {
    debug_assert_eq!(img.mode, PixelMode::Cmyk);
    let pixels = img.width as usize * img.height as usize;
    let mut data = Vec::with_capacity(pixels);
    for i in 0..pixels {
        let k = img.data[i * 4 + 3];
        data.push(255u8.saturating_sub(k));
    }
    RasterImage {
        mode: PixelMode::Gray,
        width: img.width,
        height: img.height,
        data,
        dpi: img.dpi,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmyk_gray_image(k_values: &[u8], w: u32, h: u32) -> RasterImage {
        let mut data = Vec::with_capacity(k_values.len() * 4);
        for &k in k_values {
            data.extend_from_slice(&[0, 0, 0, k]);
        }
        RasterImage { mode: PixelMode::Cmyk, width: w, height: h, data, dpi: None }
    }

    #[test]
    fn detects_all_zero_cmy_as_gray() {
        let img = cmyk_gray_image(&[0, 50, 100, 255], 2, 2);
        assert!(is_cmyk_gray(&img));
    }

    #[test]
    fn rejects_when_any_cmy_channel_nonzero() {
        let mut img = cmyk_gray_image(&[0, 50, 100, 255], 2, 2);
        img.data[0] = 10; // set C at pixel 0
        assert!(!is_cmyk_gray(&img));
    }

    #[test]
    fn strip_cmy_inverts_k() {
        let img = cmyk_gray_image(&[0, 255], 2, 1);
        let gray = strip_cmy_to_gray(&img);
        assert_eq!(gray.mode, PixelMode::Gray);
        assert_eq!(gray.data, vec![255, 0]);
    }
}
