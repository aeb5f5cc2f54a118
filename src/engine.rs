//! Top-level streaming driver (spec §5): Stream Lexer → OPI State Machine
//! → Geometry Engine → Image Processor → ICC Engine → Image Cache →
//! PostScript Emitter, wired together with the spec §7 error-handling
//! policy (abort gates, error counting, placeholder substitution).

use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::{cache_key, DiskCache, ImageCache};
use crate::config::EngineConfig;
use crate::emitter;
use crate::error::{EngineError, EngineResult};
use crate::geometry::{self, OpenedImageInfo};
use crate::icc::{IccEngine, TransformKey, TransformRequest};
use crate::image_processor::{self, OpenedSource};
use crate::lexer::{split_line, StreamLexer};
use crate::model::{ConditionedImage, ImagePlacementRecord, IntRect, OpiVersion, PixelMode, RasterImage};
use crate::placeholder;
use crate::state_machine::{Event, GfxStateBuffer, StateMachine};

/// Locates the hi-res file backing an OPI object's `image_file_name`
/// (spec §6: case-insensitive, closest-match fallback). Implemented by the
/// CLI crate, which knows about `-hires`/`-lores` search roots.
pub trait ImageResolver {
    fn resolve(&self, image_file_name: &str) -> EngineResult<PathBuf>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunStats {
    pub objects_substituted: u64,
    pub error_count: u64,
}

pub struct Engine {
    config: EngineConfig,
    cache: ImageCache,
    disk_cache: Option<DiskCache>,
    icc: IccEngine,
    error_count: u64,
}

impl Engine {
    pub fn new(config: EngineConfig, disk_cache_dir: Option<PathBuf>) -> Self {
        let cache = ImageCache::new(config.cache_megs);
        let disk_cache = disk_cache_dir.map(DiskCache::new);
        Self {
            config,
            cache,
            disk_cache,
            icc: IccEngine::new(),
            error_count: 0,
        }
    }

    /// Drives the whole substitution pass. `cancel` is polled at each OPI
    /// object boundary so a host application can stop mid-stream (spec §5
    /// "single-threaded cooperative" cancellation).
    pub fn run(&mut self, input: &[u8], resolver: &dyn ImageResolver, out: &mut impl Write, cancel: &AtomicBool) -> EngineResult<RunStats> {
        let mut machine = StateMachine::new();
        let mut stats = RunStats::default();

        for raw in StreamLexer::new(input) {
            let split = split_line(&raw);
            if let Some(event) = machine.feed(&split) {
                self.handle_event(event, out, resolver, &mut stats)?;
                if cancel.load(Ordering::Relaxed) {
                    log::info!("substitution cancelled at object boundary");
                    return Ok(stats);
                }
            }
        }
        if let Some(event) = machine.finish() {
            self.handle_event(event, out, resolver, &mut stats)?;
        }

        stats.error_count = self.error_count;
        if self.error_count > 0 {
            log::warn!("{} ERROR(s) occurred", self.error_count);
        }
        Ok(stats)
    }

    fn handle_event(&mut self, event: Event, out: &mut impl Write, resolver: &dyn ImageResolver, stats: &mut RunStats) -> EngineResult<()> {
        match event {
            Event::PassThrough(bytes) => out.write_all(&bytes).map_err(io_err),
            Event::ObjectReady { mut ipr, gfx } => {
                ipr.reconcile_crop_rects();
                match self.condition_object(&mut ipr, resolver) {
                    Ok(image) => {
                        emitter::emit(out, &ipr, &gfx, &image, &self.config).map_err(io_err)?;
                        stats.objects_substituted += 1;
                        Ok(())
                    }
                    Err(err) => self.handle_object_error(err, &mut ipr, &gfx, out),
                }
            }
        }
    }

    /// Spec §7: `unsupported_image_format` passes the buffered bytes through
    /// unsubstituted and isn't counted; everything else is gated by
    /// `abort_on_file_not_found` or `abort_on_error` and, if not fatal,
    /// replaced by the placeholder image.
    fn handle_object_error(&mut self, err: EngineError, ipr: &mut ImagePlacementRecord, gfx: &GfxStateBuffer, out: &mut impl Write) -> EngineResult<()> {
        if !err.counts_as_error() {
            log::debug!("{}: unsupported image format, passing buffered region through", ipr.image_file_name);
            return out.write_all(&gfx.raw).map_err(io_err);
        }

        let should_abort = if err.is_image_not_found() || err.is_name_resolution() {
            self.config.abort_on_file_not_found
        } else {
            self.config.abort_on_error
        };
        if should_abort {
            return Err(err);
        }

        self.error_count += 1;
        log::error!("{err}; substituting placeholder for {}", ipr.image_file_name);
        let placeholder = ConditionedImage::Raster(placeholder::synthesize());
        set_included_image_dimensions(ipr, &placeholder);
        ipr.included_image_quality = Some(1.0);
        emitter::emit(out, ipr, gfx, &placeholder, &self.config).map_err(io_err)
    }

    fn condition_object(&mut self, ipr: &mut ImagePlacementRecord, resolver: &dyn ImageResolver) -> EngineResult<ConditionedImage> {
        let path = resolver.resolve(&ipr.image_file_name)?;
        let opened = image_processor::open_source_image(&path)?;
        let opi2_active = ipr.version_markers.contains(OpiVersion::V2_0);

        let mut native_dims = None;
        match &opened {
            OpenedSource::Raster(raster) => {
                native_dims = Some((raster.width, raster.height));
                let info = OpenedImageInfo {
                    width: raster.width,
                    height: raster.height,
                    mode: raster.mode,
                    dpi: raster.dpi,
                };
                geometry::compute(&self.config, ipr, info, opi2_active);
            }
            OpenedSource::Epsf(epsf) => {
                if ipr.image_dimensions.is_none() {
                    ipr.image_dimensions = Some(epsf.bbox);
                }
            }
        }

        let descriptor = self.descriptor_for(ipr);
        let path_str = path.to_string_lossy().into_owned();
        let key = cache_key(&path_str, &descriptor);
        if self.config.use_cache {
            if let Some(entry) = self.cache.get(&key) {
                set_included_image_dimensions(ipr, &entry.image);
                return Ok(entry.image.clone());
            }
        }

        let crop_rect = ipr.real_crop_rect.unwrap_or_else(|| {
            let (w, h) = native_dims.unwrap_or((0, 0));
            IntRect::new(0, 0, w as i64, h as i64)
        });
        let downsample_dims = ipr.downsample_dimensions.unwrap_or_else(|| native_dims.unwrap_or((0, 0)));

        let (image, _used_rect) = image_processor::condition_opened(opened, &self.config, &crop_rect, downsample_dims)?;
        let image = self.apply_icc(ipr, image)?;
        set_included_image_dimensions(ipr, &image);

        if self.config.use_cache {
            self.cache.insert(key, image.clone(), path_str);
        }
        Ok(image)
    }

    /// Spec §4.5 step 7: skip the transform entirely for categories with no
    /// configured destination profile, then elide identical source/dest
    /// pairs before invoking the collaborator.
    fn apply_icc(&mut self, ipr: &ImagePlacementRecord, image: ConditionedImage) -> EngineResult<ConditionedImage> {
        let ConditionedImage::Raster(raster) = image else {
            return Ok(image);
        };
        let profiles = &self.config.icc_profiles;
        let (dst_profile, dst_path) = match raster.mode {
            PixelMode::Mono => (profiles.mono_profile.as_deref(), profiles.mono_path.as_deref()),
            PixelMode::Gray => (profiles.gray_profile.as_deref(), profiles.gray_path.as_deref()),
            PixelMode::Rgb | PixelMode::Cmyk => (profiles.color_profile.as_deref(), profiles.color_path.as_deref()),
        };
        let (Some(dst_profile), Some(dst_path)) = (dst_profile, dst_path) else {
            return Ok(ConditionedImage::Raster(raster));
        };

        let src_path = &ipr.image_file_name;
        let key = TransformKey {
            src_path: src_path.clone(),
            intent: self.config.intent.into(),
            dst_path: dst_path.to_string(),
            proof_intent: self.config.proof_intent.into(),
            proof_path: profiles.proof_path.clone(),
        };
        if self.icc.should_elide(key, src_path, dst_path, &self.config.same_profiles_sets) {
            return Ok(ConditionedImage::Raster(raster));
        }

        let req = TransformRequest {
            src_path,
            src_profile: None,
            dst_path,
            dst_profile,
            proof_path: profiles.proof_path.as_deref(),
            proof_profile: profiles.proof_profile.as_deref(),
            intent: self.config.intent,
            proof_intent: self.config.proof_intent,
            flags: self.config.icc_flags(),
            src_mode: raster.mode,
            width: raster.width,
            height: raster.height,
            pixels: &raster.data,
        };
        let (out_mode, out_data) = self.icc.transform(&req)?;
        Ok(ConditionedImage::Raster(RasterImage {
            mode: out_mode,
            width: raster.width,
            height: raster.height,
            data: out_data,
            dpi: raster.dpi,
        }))
    }

    /// Everything the conditioning pipeline's output depends on besides the
    /// source path, folded into the cache key (spec §4.6 "Cache key").
    fn descriptor_for(&self, ipr: &ImagePlacementRecord) -> String {
        let p = &self.config.icc_profiles;
        format!(
            "crop={:?};dims={:?};intent={:?};proof_intent={:?};preserve_black={};bpc={};softproof={};mono={:?};gray={:?};color={:?};proof={:?};strip_cmy={}",
            ipr.real_crop_rect,
            ipr.downsample_dimensions,
            self.config.intent,
            self.config.proof_intent,
            self.config.preserve_black,
            self.config.black_point_compensation,
            self.config.softproofing,
            p.mono_path,
            p.gray_path,
            p.color_path,
            p.proof_path,
            self.config.cmyk_gray_images_strip_cmy,
        )
    }

    pub fn disk_cache(&self) -> Option<&DiskCache> {
        self.disk_cache.as_ref()
    }
}

/// Spec §8 invariant: `%%IncludedImageDimensions` equals the post-downsample
/// pixel size actually emitted, not the source file's native size.
fn set_included_image_dimensions(ipr: &mut ImagePlacementRecord, image: &ConditionedImage) {
    ipr.included_image_dimensions = Some(match image {
        ConditionedImage::Raster(r) => (r.width, r.height),
        ConditionedImage::Epsf(e) => (e.bbox.0.round() as u32, e.bbox.1.round() as u32),
    });
}

fn io_err(source: std::io::Error) -> EngineError {
    EngineError::Io {
        path: "<output>".to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    struct FixedResolver(PathBuf);

    impl ImageResolver for FixedResolver {
        fn resolve(&self, _image_file_name: &str) -> EngineResult<PathBuf> {
            Ok(self.0.clone())
        }
    }

    struct NeverFoundResolver;

    impl ImageResolver for NeverFoundResolver {
        fn resolve(&self, image_file_name: &str) -> EngineResult<PathBuf> {
            Err(EngineError::ImageNotFound { path: image_file_name.to_string() })
        }
    }

    fn write_temp_png() -> PathBuf {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("opi_engine_test_{:p}.png", &dir));
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn passes_through_a_stream_with_no_opi_markup() {
        let mut engine = Engine::new(EngineConfig::default(), None);
        let input = b"1 0 0 1 0 0 cm\nshowpage\n";
        let mut out = Vec::new();
        let cancel = AtomicBool::new(false);
        let stats = engine.run(input, &NeverFoundResolver, &mut out, &cancel).unwrap();
        assert_eq!(out, input.to_vec());
        assert_eq!(stats.objects_substituted, 0);
    }

    #[test]
    fn missing_file_with_abort_disabled_increments_error_count_and_substitutes_placeholder() {
        let mut config = EngineConfig::default();
        config.abort_on_file_not_found = false;
        let mut engine = Engine::new(config, None);
        let input = b"%%ImageFileName: (missing.tif)\n1 0 0 1 0 0 cm\n%%BeginObject: image\nfoo\n%%EndObject\n";
        let mut out = Vec::new();
        let cancel = AtomicBool::new(false);
        let stats = engine.run(input, &NeverFoundResolver, &mut out, &cancel).unwrap();
        assert_eq!(stats.error_count, 1);
        assert!(String::from_utf8_lossy(&out).contains("%%BeginData"));
    }

    #[test]
    fn missing_file_with_abort_enabled_propagates_error() {
        let config = EngineConfig::default(); // abort_on_file_not_found defaults true
        let mut engine = Engine::new(config, None);
        let input = b"%%ImageFileName: (missing.tif)\n1 0 0 1 0 0 cm\n%%BeginObject: image\nfoo\n%%EndObject\n";
        let mut out = Vec::new();
        let cancel = AtomicBool::new(false);
        let result = engine.run(input, &NeverFoundResolver, &mut out, &cancel);
        assert!(result.is_err());
    }

    #[test]
    fn resolves_and_substitutes_a_real_raster_object() {
        let path = write_temp_png();
        let mut engine = Engine::new(EngineConfig::default(), None);
        let resolver = FixedResolver(path.clone());
        let input = b"%%ImageFileName: (ok.png)\n%%ImageDimensions: 4 4\n1 0 0 1 0 0 cm\n%%BeginObject: image\nfoo\n%%EndObject\n";
        let mut out = Vec::new();
        let cancel = AtomicBool::new(false);
        let stats = engine.run(input, &resolver, &mut out, &cancel).unwrap();
        assert_eq!(stats.objects_substituted, 1);
        assert_eq!(stats.error_count, 0);
        let _ = Path::new(&path); // keep path alive through assertions above
        std::fs::remove_file(path).ok();
    }
}
