//! Regression guards for behavior that's easy to silently break: nested
//! `%%BeginObject` counting, and cache-key sensitivity to the processing
//! configuration rather than just the source path.

mod common;

use std::sync::atomic::AtomicBool;

use common::{minimal_cmyk_gray_tiff, write_fixture, FixedResolver};
use opi_engine::cache::cache_key;
use opi_engine::{Engine, EngineConfig};

#[test]
fn nested_begin_object_fires_only_one_substitution() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "nested.tif", &minimal_cmyk_gray_tiff([5, 5]));

    let mut engine = Engine::new(EngineConfig::default(), None);
    let resolver = FixedResolver(path);
    let input = b"%%ImageFileName: (nested.tif)\n\
%%BeginObject: image\n\
%%BeginObject: image\n\
inner FPO junk\n\
%%EndObject\n\
outer FPO junk\n\
%%EndObject\n";
    let mut out = Vec::new();
    let stats = engine.run(input, &resolver, &mut out, &AtomicBool::new(false)).unwrap();

    assert_eq!(stats.objects_substituted, 1);
    assert_eq!(stats.error_count, 0);
    let text = String::from_utf8_lossy(&out);
    assert!(!text.contains("FPO junk"));
}

#[test]
fn repeated_placement_of_the_same_image_yields_identical_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_fixture(dir.path(), "twice.tif", &minimal_cmyk_gray_tiff([30, 30]));

    let mut engine = Engine::new(EngineConfig::default(), None);
    let resolver = FixedResolver(path);
    let placement = "%ALDImagePosition: 0 0 0 72 72 72 72 0\n";
    let input = format!(
        "%%ImageFileName: (twice.tif)\n{placement}%%BeginObject: image\na\n%%EndObject\n\
%%ImageFileName: (twice.tif)\n{placement}%%BeginObject: image\nb\n%%EndObject\n"
    );
    let mut out = Vec::new();
    let stats = engine.run(input.as_bytes(), &resolver, &mut out, &AtomicBool::new(false)).unwrap();

    assert_eq!(stats.objects_substituted, 2);
    let text = String::from_utf8_lossy(&out);
    // The second placement is served from the in-memory cache (same path,
    // same descriptor); its emitted dimensions/quality must match the first
    // conditioning exactly, not just the first one filling them in.
    assert_eq!(text.matches("%%IncludedImageDimensions: 2 1").count(), 2);
    assert_eq!(text.matches("%%IncludedImageQuality: 1").count(), 2);
}

#[test]
fn cache_key_is_stable_for_the_same_descriptor_but_sensitive_to_icc_config() {
    // Same path, same downsample size, differing only in the destination
    // profile folded into the descriptor (spec "Cache key" coordinates):
    // a cache keyed only on size would wrongly reuse the first entry.
    let same_size_swop = "dims=(300, 300);color=Some(\"swop.icc\")";
    let same_size_gracol = "dims=(300, 300);color=Some(\"gracol.icc\")";

    let a = cache_key("/art/photo.tif", same_size_swop);
    let b = cache_key("/art/photo.tif", same_size_swop);
    let c = cache_key("/art/photo.tif", same_size_gracol);

    assert_eq!(a, b);
    assert_ne!(a, c);
}
