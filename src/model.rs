//! The Image Placement Record (IPR) and the small value types it is built
//! from — spec §3.

use std::collections::HashMap;

/// Three-valued flag: emit a PostScript comment only when not `Unset`
/// (spec §3 invariants, §9 design note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionalFlag {
    #[default]
    Unset,
    False,
    True,
}

impl From<Option<bool>> for OptionalFlag {
    fn from(v: Option<bool>) -> Self {
        match v {
            None => OptionalFlag::Unset,
            Some(false) => OptionalFlag::False,
            Some(true) => OptionalFlag::True,
        }
    }
}

impl OptionalFlag {
    pub fn as_bool(self) -> Option<bool> {
        match self {
            OptionalFlag::Unset => None,
            OptionalFlag::False => Some(false),
            OptionalFlag::True => Some(true),
        }
    }

    pub fn is_set(self) -> bool {
        !matches!(self, OptionalFlag::Unset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorType {
    Process,
    Spot,
    #[default]
    Unspecified,
}

/// The four process-ink tints plus the ink name (spec §3 `image_color`).
#[derive(Debug, Clone, PartialEq)]
pub struct ImageColor {
    pub c: f64,
    pub m: f64,
    pub y: f64,
    pub k: f64,
    pub ink_name: String,
}

impl ImageColor {
    pub const PROCESS_INKS: [&'static str; 4] = ["Cyan", "Magenta", "Yellow", "Black"];

    /// Spec §4.3: if the ink name isn't one of the four process inks and
    /// exactly one channel is 1.0 with the rest 0.0, infer the name from
    /// that channel.
    pub fn infer_process_ink_name(&self) -> Option<&'static str> {
        if Self::PROCESS_INKS.contains(&self.ink_name.as_str()) {
            return None;
        }
        let channels = [self.c, self.m, self.y, self.k];
        let ones: Vec<usize> = channels
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == 1.0)
            .map(|(i, _)| i)
            .collect();
        let zeros_elsewhere = channels.iter().filter(|&&v| v == 0.0).count() == 3;
        if ones.len() == 1 && zeros_elsewhere {
            Some(Self::PROCESS_INKS[ones[0]])
        } else {
            None
        }
    }
}

/// Integer or fixed-precision axis-aligned box; spec §3 uses both an
/// integer `image_crop_rect` and a high-precision `image_crop_fixed`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect<T> {
    pub x1: T,
    pub y1: T,
    pub x2: T,
    pub y2: T,
}

impl<T: Copy> Rect<T> {
    pub fn new(x1: T, y1: T, x2: T, y2: T) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl Rect<f64> {
    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }
    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn to_int_floor(&self) -> Rect<i64> {
        Rect::new(
            self.x1.floor() as i64,
            self.y1.floor() as i64,
            self.x2.floor() as i64,
            self.y2.floor() as i64,
        )
    }
}

impl Rect<i64> {
    pub fn width(&self) -> i64 {
        self.x2 - self.x1
    }
    pub fn height(&self) -> i64 {
        self.y2 - self.y1
    }

    pub fn to_fixed(&self) -> Rect<f64> {
        Rect::new(self.x1 as f64, self.y1 as f64, self.x2 as f64, self.y2 as f64)
    }
}

pub type IntRect = Rect<i64>;
pub type FixedRect = Rect<f64>;

/// Which OPI dialect(s) contributed to this object. Kept as an ordered,
/// de-duplicated set (spec §3: "set ⊆ {1.3, 2.0}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpiVersion {
    V1_3,
    V2_0,
}

#[derive(Debug, Clone, Default)]
pub struct VersionMarkers(Vec<OpiVersion>);

impl VersionMarkers {
    pub fn insert(&mut self, v: OpiVersion) {
        if !self.0.contains(&v) {
            self.0.push(v);
            self.0.sort();
        }
    }

    pub fn contains(&self, v: OpiVersion) -> bool {
        self.0.contains(&v)
    }

    pub fn iter(&self) -> impl Iterator<Item = &OpiVersion> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One placement record per OPI object being substituted (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ImagePlacementRecord {
    pub image_file_name: String,
    pub image_id: Option<String>,
    pub distilled: bool,
    pub object_comments: Vec<String>,
    pub image_dimensions: Option<(f64, f64)>,
    pub image_crop_rect: Option<IntRect>,
    pub image_crop_fixed: Option<FixedRect>,
    /// Eight numbers: ll, ul, ur, lr corners, in page points.
    pub image_position: Option<[f64; 8]>,
    pub image_resolution: Option<(f64, f64)>,
    pub image_color_type: ColorType,
    pub image_color: Option<ImageColor>,
    pub image_tint: Option<f64>,
    pub image_overprint: OptionalFlag,
    pub image_inks: Option<String>,
    /// (channels, bits-per-component)
    pub image_type: Option<(u8, u8)>,
    pub image_gray_map: Vec<Vec<i64>>,
    pub image_transparency: OptionalFlag,
    pub tiff_ascii_tags: HashMap<String, Vec<String>>,
    pub included_image_dimensions: Option<(u32, u32)>,
    pub main_image: Option<String>,
    pub version_markers: VersionMarkers,

    // --- Derived, set by the Geometry Engine (spec §4.4) ---
    pub real_dimensions: Option<(f64, f64)>,
    pub real_crop_rect: Option<IntRect>,
    pub real_res: Option<(f64, f64)>,
    pub downsample_dimensions: Option<(u32, u32)>,
    pub downsample_factor: Option<(f64, f64)>,
    pub downsample_res: Option<(f64, f64)>,
    pub included_image_quality: Option<f64>,
}

impl ImagePlacementRecord {
    pub fn new(image_file_name: impl Into<String>) -> Self {
        Self {
            image_file_name: image_file_name.into(),
            ..Default::default()
        }
    }

    /// Spec §3 invariant: an integer rect is promoted to fixed when only
    /// the integer form was supplied, and vice versa by rounding.
    pub fn reconcile_crop_rects(&mut self) {
        match (self.image_crop_rect, self.image_crop_fixed) {
            (Some(int_rect), None) => self.image_crop_fixed = Some(int_rect.to_fixed()),
            (None, Some(fixed)) => self.image_crop_rect = Some(fixed.to_int_floor()),
            _ => {}
        }
    }
}

/// Pixel payload for a conditioned image, tagged by mode (spec §9: "model
/// as a tagged variant").
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum PixelMode {
    Mono,
    Gray,
    Rgb,
    Cmyk,
}

impl PixelMode {
    pub fn channels(self) -> u8 {
        match self {
            PixelMode::Mono | PixelMode::Gray => 1,
            PixelMode::Rgb => 3,
            PixelMode::Cmyk => 4,
        }
    }

    pub fn bits_per_component(self) -> u8 {
        match self {
            PixelMode::Mono => 1,
            _ => 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RasterImage {
    pub mode: PixelMode,
    pub width: u32,
    pub height: u32,
    /// Packed samples, `channels()` bytes per pixel except `Mono`, which is
    /// packed 1-bit-per-pixel, MSB first, row-padded to a byte boundary.
    pub data: Vec<u8>,
    pub dpi: Option<(f64, f64)>,
}

impl RasterImage {
    pub fn byte_size(&self) -> usize {
        match self.mode {
            PixelMode::Mono => {
                let row_bytes = (self.width as usize + 7) / 8;
                row_bytes * self.height as usize
            }
            _ => self.width as usize * self.height as usize * self.mode.channels() as usize,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EpsfImage {
    pub payload: Vec<u8>,
    /// Width/height in points, from `%%HiResBoundingBox` or `%%BoundingBox`.
    pub bbox: (f64, f64),
}

#[derive(Debug, Clone)]
pub enum ConditionedImage {
    Raster(RasterImage),
    Epsf(EpsfImage),
}

impl ConditionedImage {
    pub fn byte_size(&self) -> usize {
        match self {
            ConditionedImage::Raster(r) => r.byte_size(),
            ConditionedImage::Epsf(e) => e.payload.len(),
        }
    }
}
