//! Resolves an OPI object's `image_file_name` to a hi-res path on disk,
//! trying `-hires` roots before `-lores` ones and falling back to a
//! case-insensitive directory scan when the exact name isn't present
//! (spec §6).

use std::fs;
use std::path::PathBuf;

use opi_engine::engine::ImageResolver;
use opi_engine::error::{EngineError, EngineResult};

pub struct FileResolver {
    pub hires_roots: Vec<PathBuf>,
    pub lores_roots: Vec<PathBuf>,
}

impl FileResolver {
    pub fn new(hires_roots: Vec<PathBuf>, lores_roots: Vec<PathBuf>) -> Self {
        Self { hires_roots, lores_roots }
    }

    fn find_in(&self, roots: &[PathBuf], name: &str) -> EngineResult<Option<PathBuf>> {
        let base = base_name(name);
        for root in roots {
            let exact = root.join(&base);
            if exact.is_file() {
                return Ok(Some(exact));
            }
        }

        let mut candidates = Vec::new();
        for root in roots {
            let Ok(entries) = fs::read_dir(root) else { continue };
            for entry in entries.flatten() {
                let entry_name = entry.file_name().to_string_lossy().into_owned();
                if entry_name.eq_ignore_ascii_case(&base) {
                    candidates.push(entry.path());
                }
            }
        }
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.pop()),
            _ => Err(EngineError::NameResolutionAmbiguous {
                path: name.to_string(),
                candidates: candidates.into_iter().map(|p| p.display().to_string()).collect(),
            }),
        }
    }
}

/// OPI filenames may carry a platform path (`Macintosh HD:foo.tif`, a
/// Windows path, a POSIX path) — only the final component is looked up.
fn base_name(name: &str) -> String {
    name.rsplit(['/', '\\', ':']).next().unwrap_or(name).to_string()
}

impl ImageResolver for FileResolver {
    fn resolve(&self, image_file_name: &str) -> EngineResult<PathBuf> {
        if let Some(path) = self.find_in(&self.hires_roots, image_file_name)? {
            return Ok(path);
        }
        if let Some(path) = self.find_in(&self.lores_roots, image_file_name)? {
            return Ok(path);
        }
        Err(EngineError::NameResolutionExhausted { path: image_file_name.to_string() })
    }
}
