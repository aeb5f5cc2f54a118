//! Geometry Engine (spec §4.4): real placement dimensions, effective dpi,
//! crop rectangle, downsample factors.

use crate::config::{CropRounding, EngineConfig};
use crate::model::{FixedRect, ImagePlacementRecord, IntRect, PixelMode};

#[derive(Debug, Clone, Copy)]
pub struct OpenedImageInfo {
    pub width: u32,
    pub height: u32,
    pub mode: PixelMode,
    pub dpi: Option<(f64, f64)>,
}

fn dist(ax: f64, ay: f64, bx: f64, by: f64) -> f64 {
    ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt()
}

/// Step 1: `real_dimensions` from the `image_position` corners — max of the
/// two possible diagonals per axis.
pub fn real_dimensions(position: &[f64; 8]) -> (f64, f64) {
    let (llx, lly, ulx, uly, urx, ury, lrx, lry) = (
        position[0],
        position[1],
        position[2],
        position[3],
        position[4],
        position[5],
        position[6],
        position[7],
    );
    let width = dist(llx, lly, lrx, lry).max(dist(ulx, uly, urx, ury));
    let height = dist(llx, lly, ulx, uly).max(dist(lrx, lry, urx, ury));
    (width, height)
}

/// Step 2: scale `image_crop_fixed` from declared `image_dimensions` into
/// real opened-image pixels, applying OPI-2.0 ceil/pad rounding per spec
/// §4.4 and §9 Open Question #2.
pub fn real_crop_rect(
    crop_fixed: &FixedRect,
    declared_dimensions: (f64, f64),
    opened: (u32, u32),
    rounding: CropRounding,
) -> IntRect {
    let (decl_w, decl_h) = declared_dimensions;
    let (img_w, img_h) = (opened.0 as f64, opened.1 as f64);
    let sx = if decl_w != 0.0 { img_w / decl_w } else { 1.0 };
    let sy = if decl_h != 0.0 { img_h / decl_h } else { 1.0 };

    let (sx1, sy1, sx2, sy2) = (
        crop_fixed.x1 * sx,
        crop_fixed.y1 * sy,
        crop_fixed.x2 * sx,
        crop_fixed.y2 * sy,
    );

    let mut rect = match rounding {
        CropRounding::Standard => IntRect::new(
            sx1.floor() as i64,
            sy1.floor() as i64,
            sx2.floor() as i64,
            sy2.floor() as i64,
        ),
        CropRounding::Opi2CeilPad => IntRect::new(
            sx1.floor() as i64,
            sy1.floor() as i64,
            sx2.ceil() as i64,
            sy2.ceil() as i64,
        ),
    };

    if rounding == CropRounding::Opi2CeilPad {
        if sx2.ceil() as i64 != img_w as i64 && rect.x1 != 0 {
            rect.x1 -= 1;
            rect.x2 += 1;
        }
        if sy2.ceil() as i64 != img_h as i64 && rect.y1 != 0 {
            rect.y1 -= 1;
            rect.y2 += 1;
        }
    }

    rect.x1 = rect.x1.clamp(0, img_w as i64);
    rect.y1 = rect.y1.clamp(0, img_h as i64);
    rect.x2 = rect.x2.clamp(0, img_w as i64);
    rect.y2 = rect.y2.clamp(0, img_h as i64);
    rect
}

/// Step 3: effective dpi from cropped pixel extent over placement size.
pub fn real_res(crop: &IntRect, real_dim_pt: (f64, f64)) -> (f64, f64) {
    let w = crop.width().max(0) as f64;
    let h = crop.height().max(0) as f64;
    let x = if real_dim_pt.0 != 0.0 { w / (real_dim_pt.0 / 72.0) } else { 0.0 };
    let y = if real_dim_pt.1 != 0.0 { h / (real_dim_pt.1 / 72.0) } else { 0.0 };
    (x, y)
}

/// Steps 4-6: pick the target dpi for each axis, honoring embedded
/// resolution and the tiny/small halftone size multipliers.
pub fn target_dpi(
    config: &EngineConfig,
    mode: PixelMode,
    opened_dpi: Option<(f64, f64)>,
    real_dim_pt: (f64, f64),
) -> (f64, f64) {
    let settings = config.mode_settings(mode);
    let base = |axis_resolution: f64, embedded: Option<f64>| -> f64 {
        if settings.use_embedded_resolution {
            if let Some(dpi) = embedded {
                if dpi > settings.resolution {
                    return dpi;
                }
            }
        }
        axis_resolution
    };
    let tx = base(settings.resolution, opened_dpi.map(|d| d.0));
    let ty = base(settings.resolution, opened_dpi.map(|d| d.1));

    if mode == PixelMode::Mono {
        return (tx, ty);
    }

    let size_factor = |dim_pt: f64| -> f64 {
        if dim_pt <= config.tiny_halftone_size {
            config.tiny_halftone_factor
        } else if dim_pt <= config.small_halftone_size {
            config.small_halftone_factor
        } else {
            1.0
        }
    };
    (tx * size_factor(real_dim_pt.0), ty * size_factor(real_dim_pt.1))
}

/// Step 7: downsample dimensions and per-axis factor. An axis only shrinks
/// when its effective dpi exceeds `target_dpi × downsample_threshold ×
/// size_factor` (the size factor is already folded into `target` here).
pub fn downsample(
    config: &EngineConfig,
    mode: PixelMode,
    crop: &IntRect,
    effective_dpi: (f64, f64),
    target: (f64, f64),
) -> ((u32, u32), (f64, f64)) {
    let settings = config.mode_settings(mode);
    let crop_w = crop.width().max(0) as f64;
    let crop_h = crop.height().max(0) as f64;

    let factor_axis = |eff: f64, tgt: f64| -> f64 {
        if !settings.downsample {
            return 1.0;
        }
        if eff > tgt * settings.downsample_threshold {
            (tgt / eff).min(1.0)
        } else {
            1.0
        }
    };

    let fx = factor_axis(effective_dpi.0, target.0);
    let fy = factor_axis(effective_dpi.1, target.1);

    let w = (crop_w * fx).round().max(1.0) as u32;
    let h = (crop_h * fy).round().max(1.0) as u32;
    ((w, h), (fx, fy))
}

/// Step 8: `included_image_quality` from the final effective dpi.
pub fn included_image_quality(config: &EngineConfig, mode: PixelMode, final_res: (f64, f64)) -> f64 {
    let settings = config.mode_settings(mode);
    let min_axis = final_res.0.min(final_res.1);
    if min_axis >= settings.resolution {
        3.0
    } else if min_axis >= settings.min_resolution {
        2.0
    } else {
        1.0
    }
}

/// Runs the full pipeline in order and writes the derived fields back onto
/// the IPR.
pub fn compute(config: &EngineConfig, ipr: &mut ImagePlacementRecord, opened: OpenedImageInfo, opi2_active: bool) {
    let position = match ipr.image_position {
        Some(p) => p,
        None => return,
    };
    let real_dim = real_dimensions(&position);
    ipr.real_dimensions = Some(real_dim);

    let crop_fixed = ipr.image_crop_fixed.unwrap_or(FixedRect::new(
        0.0,
        0.0,
        ipr.image_dimensions.map_or(opened.width as f64, |d| d.0),
        ipr.image_dimensions.map_or(opened.height as f64, |d| d.1),
    ));
    let declared_dims = ipr.image_dimensions.unwrap_or((opened.width as f64, opened.height as f64));
    let rounding = config.crop_rounding(opi2_active);
    let crop = real_crop_rect(&crop_fixed, declared_dims, (opened.width, opened.height), rounding);
    ipr.real_crop_rect = Some(crop);

    let effective = real_res(&crop, real_dim);
    ipr.real_res = Some(effective);

    let tgt = target_dpi(config, opened.mode, opened.dpi, real_dim);
    let (dims, factor) = downsample(config, opened.mode, &crop, effective, tgt);
    ipr.downsample_dimensions = Some(dims);
    ipr.downsample_factor = Some(factor);
    let downsample_res = (effective.0 * factor.0, effective.1 * factor.1);
    ipr.downsample_res = Some(downsample_res);
    ipr.included_image_quality = Some(included_image_quality(config, opened.mode, downsample_res));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_dimensions_picks_max_diagonal() {
        let position = [0.0, 0.0, 0.0, 72.0, 72.0, 72.0, 72.0, 0.0];
        assert_eq!(real_dimensions(&position), (72.0, 72.0));
    }

    #[test]
    fn standard_rounding_floors_all_corners() {
        let crop = FixedRect::new(0.0, 0.0, 99.9, 49.9);
        let rect = real_crop_rect(&crop, (100.0, 50.0), (100, 50), CropRounding::Standard);
        assert_eq!(rect, IntRect::new(0, 0, 99, 49));
    }

    #[test]
    fn opi2_ceil_pad_rounds_up_and_pads() {
        let crop = FixedRect::new(1.0, 1.0, 99.1, 49.1);
        let rect = real_crop_rect(&crop, (100.0, 50.0), (100, 50), CropRounding::Opi2CeilPad);
        // ceil(99.1) = 100 == img_w so no x-pad; y2 ceil(49.1)=50 == img_h so no y-pad.
        assert_eq!(rect.x2, 100);
        assert_eq!(rect.y2, 50);
    }

    #[test]
    fn real_res_divides_pixels_by_inches() {
        let crop = IntRect::new(0, 0, 600, 600);
        let res = real_res(&crop, (72.0, 72.0));
        assert_eq!(res, (600.0, 600.0));
    }

    #[test]
    fn quality_tiers() {
        let config = EngineConfig::default();
        assert_eq!(included_image_quality(&config, PixelMode::Rgb, (300.0, 300.0)), 3.0);
        assert_eq!(included_image_quality(&config, PixelMode::Rgb, (250.0, 250.0)), 2.0);
        assert_eq!(included_image_quality(&config, PixelMode::Rgb, (50.0, 50.0)), 1.0);
    }

    #[test]
    fn downsample_skips_axis_below_threshold() {
        let config = EngineConfig::default();
        let crop = IntRect::new(0, 0, 400, 400);
        let ((w, h), (fx, fy)) = downsample(&config, PixelMode::Rgb, &crop, (300.0, 300.0), (300.0, 300.0));
        assert_eq!((w, h), (400, 400));
        assert_eq!((fx, fy), (1.0, 1.0));
    }
}
