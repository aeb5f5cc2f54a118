//! Engine-facing configuration: the processing knobs from spec §6, without
//! the `-in`/`-out`/`-log` path handling that belongs to the CLI crate.

use std::str::FromStr;

bitflags::bitflags! {
    /// Flag mask passed to the ICC transform collaborator (spec §6).
    pub struct IccFlags: u8 {
        const BLACK_POINT_COMPENSATION = 0b001;
        const SOFTPROOFING             = 0b010;
        const PRESERVE_BLACK           = 0b100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderingIntent {
    Absolute,
    RelativeBpc,
    Perceptual,
    Relative,
    Saturation,
}

impl Default for RenderingIntent {
    fn default() -> Self {
        RenderingIntent::Perceptual
    }
}

impl FromStr for RenderingIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a" => Ok(RenderingIntent::Absolute),
            "b" => Ok(RenderingIntent::RelativeBpc),
            "p" => Ok(RenderingIntent::Perceptual),
            "r" => Ok(RenderingIntent::Relative),
            "s" => Ok(RenderingIntent::Saturation),
            other => Err(format!("unknown rendering intent: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleFilter {
    Nearest,
    Bilinear,
    Bicubic,
    Antialias,
}

impl Default for ResampleFilter {
    fn default() -> Self {
        ResampleFilter::Antialias
    }
}

impl FromStr for ResampleFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nearest" => Ok(ResampleFilter::Nearest),
            "bilinear" => Ok(ResampleFilter::Bilinear),
            "bicubic" => Ok(ResampleFilter::Bicubic),
            "antialias" => Ok(ResampleFilter::Antialias),
            other => Err(format!("unknown downsample filter: {other}")),
        }
    }
}

impl From<ResampleFilter> for image::imageops::FilterType {
    fn from(f: ResampleFilter) -> Self {
        match f {
            ResampleFilter::Nearest => image::imageops::FilterType::Nearest,
            ResampleFilter::Bilinear => image::imageops::FilterType::Triangle,
            ResampleFilter::Bicubic => image::imageops::FilterType::CatmullRom,
            ResampleFilter::Antialias => image::imageops::FilterType::Lanczos3,
        }
    }
}

/// Spec §9 Open Question #2: the OPI-2.0 ceil/pad rounding behavior must be
/// an explicit, overridable gate rather than a silent version check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropRounding {
    Standard,
    Opi2CeilPad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Newline {
    Lf,
    Cr,
    CrLf,
}

impl Default for Newline {
    fn default() -> Self {
        Newline::Lf
    }
}

impl Newline {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Newline::Lf => b"\n",
            Newline::Cr => b"\r",
            Newline::CrLf => b"\r\n",
        }
    }
}

impl FromStr for Newline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "\\n" | "\n" => Ok(Newline::Lf),
            "\\r" | "\r" => Ok(Newline::Cr),
            "\\r\\n" | "\r\n" => Ok(Newline::CrLf),
            other => Err(format!("unknown newline spec: {other}")),
        }
    }
}

/// Per image-category resampling policy (spec §4.4 step 4): one of these
/// applies depending on the opened image's pixel mode.
#[derive(Debug, Clone)]
pub struct ModeSettings {
    pub downsample: bool,
    pub min_resolution: f64,
    pub resolution: f64,
    pub downsample_threshold: f64,
    pub use_embedded_resolution: bool,
    pub downsample_filter: ResampleFilter,
}

impl ModeSettings {
    fn mono_default() -> Self {
        Self {
            downsample: true,
            min_resolution: 800.0,
            resolution: 1200.0,
            downsample_threshold: 2.0,
            use_embedded_resolution: true,
            downsample_filter: ResampleFilter::Antialias,
        }
    }

    fn gray_default() -> Self {
        Self {
            downsample: true,
            min_resolution: 200.0,
            resolution: 300.0,
            downsample_threshold: 2.0,
            use_embedded_resolution: true,
            downsample_filter: ResampleFilter::Antialias,
        }
    }

    fn color_default() -> Self {
        Self {
            downsample: true,
            min_resolution: 200.0,
            resolution: 300.0,
            downsample_threshold: 2.0,
            use_embedded_resolution: true,
            downsample_filter: ResampleFilter::Antialias,
        }
    }
}

/// Destination (and optional proof) ICC profile bytes per image category,
/// loaded by the CLI from the `-*outprofile*` family of flags (spec §6).
/// `None` for a category means images of that mode pass through unconverted.
#[derive(Debug, Clone, Default)]
pub struct IccProfiles {
    pub mono_profile: Option<Vec<u8>>,
    pub mono_path: Option<String>,
    pub gray_profile: Option<Vec<u8>>,
    pub gray_path: Option<String>,
    pub color_profile: Option<Vec<u8>>,
    pub color_path: Option<String>,
    pub proof_profile: Option<Vec<u8>>,
    pub proof_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mono: ModeSettings,
    pub gray: ModeSettings,
    pub color: ModeSettings,

    pub image_crop_threshold: f64,
    /// `None` means "derive from the active OPI dialect" (OPI 2.0 active ->
    /// `Opi2CeilPad`); `Some` is an explicit CLI override.
    pub crop_rounding_override: Option<CropRounding>,

    pub tiny_halftone_size: f64,
    pub tiny_halftone_factor: f64,
    pub small_halftone_size: f64,
    pub small_halftone_factor: f64,

    pub convert_cmyk_images: bool,
    pub convert_gray_images: bool,
    pub detect_cmyk_gray_images: bool,
    pub cmyk_gray_images_strip_cmy: bool,

    pub abort_on_error: bool,
    pub abort_on_file_not_found: bool,

    pub use_cache: bool,
    pub use_disk_cache: bool,
    pub cache_megs: f64,

    pub intent: RenderingIntent,
    pub proof_intent: RenderingIntent,
    pub preserve_black: bool,
    pub black_point_compensation: bool,
    pub softproofing: bool,
    /// Groups of profile descriptions/MD5s considered identical for the
    /// purpose of stage elision (spec §4.5 "Stage elision").
    pub same_profiles_sets: Vec<Vec<String>>,

    pub detect_qxp_background: bool,
    pub icc_profiles: IccProfiles,

    pub emit_opi_1_3: bool,
    pub emit_opi_2_0: bool,

    pub binary_mode: bool,
    pub newline: Newline,
}

impl EngineConfig {
    pub fn icc_flags(&self) -> IccFlags {
        let mut flags = IccFlags::empty();
        if self.black_point_compensation {
            flags |= IccFlags::BLACK_POINT_COMPENSATION;
        }
        if self.softproofing {
            flags |= IccFlags::SOFTPROOFING;
        }
        if self.preserve_black {
            flags |= IccFlags::PRESERVE_BLACK;
        }
        flags
    }

    /// Resolve the effective crop-rounding mode for an object carrying the
    /// given version markers (spec §4.4 step 2, §9 Open Question #2).
    pub fn crop_rounding(&self, opi2_active: bool) -> CropRounding {
        self.crop_rounding_override.unwrap_or(if opi2_active {
            CropRounding::Opi2CeilPad
        } else {
            CropRounding::Standard
        })
    }

    pub fn mode_settings(&self, mode: crate::model::PixelMode) -> &ModeSettings {
        use crate::model::PixelMode;
        match mode {
            PixelMode::Mono => &self.mono,
            PixelMode::Gray => &self.gray,
            PixelMode::Rgb | PixelMode::Cmyk => &self.color,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mono: ModeSettings::mono_default(),
            gray: ModeSettings::gray_default(),
            color: ModeSettings::color_default(),
            image_crop_threshold: 1.1,
            crop_rounding_override: None,
            tiny_halftone_size: 80.0,
            tiny_halftone_factor: 1.0,
            small_halftone_size: 160.0,
            small_halftone_factor: 1.0,
            convert_cmyk_images: false,
            convert_gray_images: false,
            detect_cmyk_gray_images: true,
            cmyk_gray_images_strip_cmy: false,
            abort_on_error: true,
            abort_on_file_not_found: true,
            use_cache: true,
            use_disk_cache: false,
            cache_megs: 256.0,
            intent: RenderingIntent::Perceptual,
            proof_intent: RenderingIntent::Perceptual,
            preserve_black: false,
            black_point_compensation: false,
            softproofing: false,
            same_profiles_sets: Vec::new(),
            detect_qxp_background: false,
            icc_profiles: IccProfiles::default(),
            emit_opi_1_3: true,
            emit_opi_2_0: true,
            binary_mode: true,
            newline: Newline::Lf,
        }
    }
}
