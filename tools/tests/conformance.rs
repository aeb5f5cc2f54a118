//! End-to-end scenarios driven through the public `Engine` API: CMYK-gray
//! stripping, placeholder substitution, and EPSF placement.

mod common;

use std::sync::atomic::AtomicBool;

use common::{minimal_cmyk_gray_tiff, minimal_epsf, write_fixture, FixedResolver};
use opi_engine::engine::ImageResolver;
use opi_engine::error::{EngineError, EngineResult};
use opi_engine::{Engine, EngineConfig};

struct NeverFoundResolver;

impl ImageResolver for NeverFoundResolver {
    fn resolve(&self, image_file_name: &str) -> EngineResult<std::path::PathBuf> {
        Err(EngineError::ImageNotFound { path: image_file_name.to_string() })
    }
}

#[test]
fn cmyk_gray_tiff_is_stripped_to_single_channel_gray() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "strip.tif", &minimal_cmyk_gray_tiff([10, 240]));

    let mut config = EngineConfig::default();
    config.cmyk_gray_images_strip_cmy = true;
    let mut engine = Engine::new(config, None);
    let resolver = FixedResolver(path);
    let input = b"%%ImageFileName: (strip.tif)\n1 0 0 1 0 0 cm\n%%BeginObject: image\nfoo\n%%EndObject\n";
    let mut out = Vec::new();
    let stats = engine.run(input, &resolver, &mut out, &AtomicBool::new(false)).unwrap();

    assert_eq!(stats.objects_substituted, 1);
    let text = String::from_utf8_lossy(&out);
    // 2x1 single-channel gray: one byte per pixel, not the 4-channel CMYK original.
    assert!(text.contains("%%BeginData: 2 Binary Bytes"));
    assert!(text.contains("/DeviceGray setcolorspace"));
    assert!(!text.contains("colorimage"));
}

#[test]
fn missing_file_substitutes_the_magenta_placeholder() {
    let mut config = EngineConfig::default();
    config.abort_on_file_not_found = false;
    let mut engine = Engine::new(config, None);
    let input = b"%%ImageFileName: (gone.tif)\n1 0 0 1 0 0 cm\n%%BeginObject: image\nfoo\n%%EndObject\n";
    let mut out = Vec::new();
    let stats = engine.run(input, &NeverFoundResolver, &mut out, &AtomicBool::new(false)).unwrap();

    assert_eq!(stats.error_count, 1);
    assert_eq!(stats.objects_substituted, 1);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("%%IncludedImageDimensions: 320 240"));
    assert!(text.contains("%%IncludedImageQuality: 1"));
    // 320*240 CMYK pixels, 4 bytes each.
    assert!(text.contains("%%BeginData: 307200 Binary Bytes"));
}

#[test]
fn epsf_placement_emits_one_matrix_concat_and_no_pixel_normalizing_concat() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "art.eps", &minimal_epsf((0, 0, 100, 50)));

    let mut engine = Engine::new(EngineConfig::default(), None);
    let resolver = FixedResolver(path);
    let input = b"%%ImageFileName: (art.eps)\n\
%ALDImagePosition: 0 0 0 50 100 50 100 0\n\
1 0 0 1 0 0 cm\n\
%%BeginObject: image\nfoo\n%%EndObject\n";
    let mut out = Vec::new();
    let stats = engine.run(input, &resolver, &mut out, &AtomicBool::new(false)).unwrap();

    assert_eq!(stats.objects_substituted, 1);
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("%%BeginDocument:"));
    assert!(text.contains("%%EndDocument"));
    // Raster placement emits a placement-matrix concat *and* a separate
    // pixel-normalizing `[w 0 0 h 0 0] concat`; EPSF only ever emits the
    // first one.
    assert_eq!(text.matches(" concat").count(), 1);
}
