//! Image Cache (spec §4.6): keyed memory+disk cache of conditioned images,
//! occurrence-based eviction under a byte budget.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::model::ConditionedImage;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub image: ConditionedImage,
    pub bytes: usize,
    pub occurrences: u64,
    pub path: String,
}

/// MD5 of the canonical path string for the image *after* crop/downsample/
/// ICC configuration has been folded in (spec §3 "Cache Key").
pub fn cache_key(original_path: &str, config_descriptor: &str) -> String {
    let canonical = format!("{original_path}|{config_descriptor}");
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

pub struct ImageCache {
    entries: HashMap<String, CacheEntry>,
    total_bytes: usize,
    budget_bytes: usize,
    max_occurrences: u64,
}

impl ImageCache {
    pub fn new(budget_megs: f64) -> Self {
        Self {
            entries: HashMap::new(),
            total_bytes: 0,
            budget_bytes: (budget_megs * 1024.0 * 1024.0) as usize,
            max_occurrences: 0,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<&CacheEntry> {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.occurrences += 1;
            self.max_occurrences = self.max_occurrences.max(entry.occurrences);
        }
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Admits a freshly conditioned image, evicting by ascending
    /// `occurrences` until the budget fits (spec §4.6 "Eviction").
    pub fn insert(&mut self, key: String, image: ConditionedImage, path: String) {
        let bytes = image.byte_size();
        self.evict_for(bytes);
        self.total_bytes += bytes;
        self.max_occurrences = self.max_occurrences.max(1);
        self.entries.insert(key, CacheEntry { image, bytes, occurrences: 1, path });
    }

    fn evict_for(&mut self, incoming_bytes: usize) {
        if self.total_bytes + incoming_bytes <= self.budget_bytes {
            return;
        }
        let mut threshold = 1u64;
        while self.total_bytes + incoming_bytes > self.budget_bytes && !self.entries.is_empty() {
            let victims: Vec<String> = self
                .entries
                .iter()
                .filter(|(_, e)| e.occurrences < threshold)
                .map(|(k, _)| k.clone())
                .collect();
            for k in victims {
                if let Some(e) = self.entries.remove(&k) {
                    self.total_bytes -= e.bytes;
                }
            }
            if self.total_bytes + incoming_bytes <= self.budget_bytes {
                break;
            }
            if threshold > self.max_occurrences {
                break; // nothing left to evict at any threshold
            }
            threshold += 1;
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

/// Which processing stages a disk-cache hit lets the caller skip (spec
/// §4.6 "Cache key coordinates").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageHit {
    pub size_mod: bool,
    pub color_mod: bool,
}

pub struct DiskCache {
    root: PathBuf,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<sanitized_original>.<crc32_of_image_config>.<ext>`.
    pub fn artifact_path(&self, original: &Path, descriptor: &str, ext: &str) -> PathBuf {
        let sanitized = sanitize_for_filename(&original.to_string_lossy());
        let crc = crc32fast::hash(descriptor.as_bytes());
        self.root.join(format!("{sanitized}.{crc:08x}.{ext}"))
    }

    /// A hit counts only when the cached file's integer mtime equals the
    /// original's (spec §4.6 "Freshness").
    pub fn is_fresh(&self, artifact: &Path, original: &Path) -> bool {
        let (Some(a), Some(o)) = (mtime_secs(artifact), mtime_secs(original)) else {
            return false;
        };
        a == o
    }

    pub fn read(&self, artifact: &Path) -> Option<Vec<u8>> {
        fs::read(artifact).ok()
    }

    pub fn write(&self, artifact: &Path, data: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(artifact, data)
    }
}

fn mtime_secs(path: &Path) -> Option<i64> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    let secs = modified.duration_since(SystemTime::UNIX_EPOCH).ok()?.as_secs();
    Some(secs as i64)
}

fn sanitize_for_filename(s: &str) -> String {
    s.bytes()
        .map(|b| if crate::comment_parser::is_filename_safe_byte(b) { b as char } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PixelMode, RasterImage};

    fn sample_image(bytes: usize) -> ConditionedImage {
        ConditionedImage::Raster(RasterImage {
            mode: PixelMode::Gray,
            width: bytes as u32,
            height: 1,
            data: vec![0; bytes],
            dpi: None,
        })
    }

    #[test]
    fn occurrences_increment_on_get() {
        let mut cache = ImageCache::new(256.0);
        cache.insert("k".into(), sample_image(10), "p".into());
        cache.get("k");
        cache.get("k");
        assert_eq!(cache.entries.get("k").unwrap().occurrences, 3);
    }

    #[test]
    fn eviction_frees_low_occurrence_entries_first() {
        let mut cache = ImageCache::new(0.0002); // ~200 bytes budget
        cache.insert("a".into(), sample_image(100), "pa".into());
        cache.get("a");
        cache.get("a"); // occurrences = 3
        cache.insert("b".into(), sample_image(100), "pb".into()); // occurrences = 1
        cache.insert("c".into(), sample_image(100), "pc".into()); // forces eviction
        assert!(cache.contains("a"));
        assert!(cache.total_bytes() <= 210);
    }

    #[test]
    fn cache_key_is_stable_md5() {
        let k1 = cache_key("/foo/bar.tif", "intent=p");
        let k2 = cache_key("/foo/bar.tif", "intent=p");
        let k3 = cache_key("/foo/bar.tif", "intent=a");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1.len(), 32);
    }
}
