//! ICC transform collaborator (spec §4.5 step 7, §6). Treated as an
//! external service: given source/destination/proof profile bytes, two
//! rendering intents, and a flag mask, it returns a pixel buffer in the
//! destination profile's colour space.

use std::collections::HashMap;

use crate::config::{IccFlags, RenderingIntent};
use crate::error::{EngineError, EngineResult};
use crate::model::PixelMode;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransformKey {
    pub src_path: String,
    pub intent: RenderingIntentKey,
    pub dst_path: String,
    pub proof_intent: RenderingIntentKey,
    pub proof_path: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderingIntentKey {
    Absolute,
    RelativeBpc,
    Perceptual,
    Relative,
    Saturation,
}

impl From<RenderingIntent> for RenderingIntentKey {
    fn from(i: RenderingIntent) -> Self {
        match i {
            RenderingIntent::Absolute => RenderingIntentKey::Absolute,
            RenderingIntent::RelativeBpc => RenderingIntentKey::RelativeBpc,
            RenderingIntent::Perceptual => RenderingIntentKey::Perceptual,
            RenderingIntent::Relative => RenderingIntentKey::Relative,
            RenderingIntent::Saturation => RenderingIntentKey::Saturation,
        }
    }
}

pub struct TransformRequest<'a> {
    pub src_path: &'a str,
    pub src_profile: Option<&'a [u8]>,
    pub dst_path: &'a str,
    pub dst_profile: &'a [u8],
    pub proof_path: Option<&'a str>,
    pub proof_profile: Option<&'a [u8]>,
    pub intent: RenderingIntent,
    pub proof_intent: RenderingIntent,
    pub flags: IccFlags,
    pub src_mode: PixelMode,
    pub width: u32,
    pub height: u32,
    pub pixels: &'a [u8],
}

/// Groups of profile descriptions/MD5s the config treats as identical, for
/// stage elision (spec §4.5 "Stage elision").
pub fn profiles_equivalent(a: &str, b: &str, same_profiles_sets: &[Vec<String>]) -> bool {
    if a == b {
        return true;
    }
    same_profiles_sets.iter().any(|set| set.iter().any(|s| s == a) && set.iter().any(|s| s == b))
}

/// Memoizes the (src, intent, dst, proof_intent, proof) stage-elision
/// decision so repeated placements sharing a profile configuration don't
/// redo the comparison (spec §4.5: "Transforms are memoized by …").
#[derive(Default)]
pub struct IccEngine {
    elision_cache: HashMap<TransformKey, bool>,
}

impl IccEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn should_elide(&mut self, key: TransformKey, src_path: &str, dst_path: &str, same_profiles_sets: &[Vec<String>]) -> bool {
        *self
            .elision_cache
            .entry(key)
            .or_insert_with(|| profiles_equivalent(src_path, dst_path, same_profiles_sets))
    }

    pub fn transform(&mut self, req: &TransformRequest<'_>) -> EngineResult<(PixelMode, Vec<u8>)> {
        run_transform(req)
    }
}

#[cfg(feature = "icc")]
fn run_transform(req: &TransformRequest<'_>) -> EngineResult<(PixelMode, Vec<u8>)> {
    use lcms2::{ColorSpaceSignature, Intent as LcmsIntent, PixelFormat, Profile, Transform};

    let fail = |reason: String| EngineError::ColorTransformFailure {
        path: req.src_path.to_string(),
        reason,
    };

    let in_profile = match req.src_profile {
        Some(bytes) => Profile::new_icc(bytes).map_err(|e| fail(format!("source profile: {e}")))?,
        None => Profile::new_srgb(),
    };
    let out_profile = Profile::new_icc(req.dst_profile).map_err(|e| fail(format!("destination profile: {e}")))?;

    let intent = match req.intent {
        RenderingIntent::Absolute => LcmsIntent::AbsoluteColorimetric,
        RenderingIntent::RelativeBpc | RenderingIntent::Relative => LcmsIntent::RelativeColorimetric,
        RenderingIntent::Perceptual => LcmsIntent::Perceptual,
        RenderingIntent::Saturation => LcmsIntent::Saturation,
    };

    let in_format = match req.src_mode {
        PixelMode::Gray | PixelMode::Mono => PixelFormat::GRAY_8,
        PixelMode::Rgb => PixelFormat::RGB_8,
        PixelMode::Cmyk => PixelFormat::CMYK_8,
    };

    let out_space = out_profile.color_space();
    let (out_format, out_mode) = match out_space {
        ColorSpaceSignature::GrayData => (PixelFormat::GRAY_8, PixelMode::Gray),
        ColorSpaceSignature::RgbData => (PixelFormat::RGB_8, PixelMode::Rgb),
        ColorSpaceSignature::CmykData => (PixelFormat::CMYK_8, PixelMode::Cmyk),
        other => return Err(fail(format!("unsupported destination colour space: {other:?}"))),
    };

    let transform = Transform::new(&in_profile, in_format, &out_profile, out_format, intent)
        .map_err(|e| fail(format!("constructing transform: {e}")))?;

    let out_channels = out_mode.channels() as usize;
    let pixel_count = req.width as usize * req.height as usize;
    let mut out = vec![0u8; pixel_count * out_channels];
    transform.transform_pixels(req.pixels, &mut out);
    Ok((out_mode, out))
}

#[cfg(not(feature = "icc"))]
fn run_transform(req: &TransformRequest<'_>) -> EngineResult<(PixelMode, Vec<u8>)> {
    Err(EngineError::ColorTransformFailure {
        path: req.src_path.to_string(),
        reason: "ICC support not compiled in (build with the `icc` feature)".to_string(),
    })
}
