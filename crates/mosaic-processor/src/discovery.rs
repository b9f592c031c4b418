//! Input tile discovery.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::error::{MosaicError, Result};

/// Find input tiles under `dir`.
///
/// One pass per extension, in the given order; each pass is sorted by path
/// and appended, and a path already found by an earlier pass is dropped.
/// Extension matching ignores case and a leading dot.
pub fn discover_tiles(dir: &Path, extensions: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(MosaicError::configuration(format!(
            "input directory {} does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut seen = HashSet::new();
    let mut tiles = Vec::new();

    for ext in extensions {
        let ext = ext.trim_start_matches('.').to_lowercase();
        let mut walker = WalkDir::new(dir).follow_links(true);
        if !recursive {
            walker = walker.max_depth(1);
        }

        let mut pass: Vec<PathBuf> = walker
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_lowercase() == ext)
                    .unwrap_or(false)
            })
            .collect();
        pass.sort();

        debug!(dir = %dir.display(), ext = %ext, count = pass.len(), "Discovery pass");

        for path in pass {
            if seen.insert(path.clone()) {
                tiles.push(path);
            }
        }
    }

    if tiles.is_empty() {
        let exts: Vec<String> = extensions.iter().map(|e| format!(".{}", e.trim_start_matches('.'))).collect();
        return Err(MosaicError::configuration(format!(
            "no {} files found under {}{}; check the input path and the configured extensions",
            exts.join("/"),
            dir.display(),
            if recursive { "" } else { " (non-recursive scan)" }
        )));
    }

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts() -> Vec<String> {
        vec!["tif".to_string(), "tiff".to_string()]
    }

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_passes_sorted_and_ordered_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.tif"));
        touch(&dir.path().join("a.tiff"));
        touch(&dir.path().join("a.tif"));
        touch(&dir.path().join("notes.txt"));

        let tiles = discover_tiles(dir.path(), &exts(), true).unwrap();
        let names: Vec<_> = tiles
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.tif", "b.tif", "a.tiff"]);
    }

    #[test]
    fn test_recursive_flag() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("top.tif"));
        touch(&dir.path().join("nested/CA/tile.TIF"));

        assert_eq!(discover_tiles(dir.path(), &exts(), true).unwrap().len(), 2);
        assert_eq!(discover_tiles(dir.path(), &exts(), false).unwrap().len(), 1);
    }

    #[test]
    fn test_overlapping_extensions_deduplicate() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("x.tif"));
        let exts = vec!["tif".to_string(), ".TIF".to_string()];
        assert_eq!(discover_tiles(dir.path(), &exts, true).unwrap().len(), 1);
    }

    #[test]
    fn test_no_files_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("readme.md"));
        let err = discover_tiles(dir.path(), &exts(), true).unwrap_err();
        assert!(matches!(err, MosaicError::Configuration(_)));
        let msg = err.to_string();
        assert!(msg.contains(".tif/.tiff"), "{msg}");
        assert!(msg.contains(&dir.path().display().to_string()), "{msg}");
    }

    #[test]
    fn test_missing_directory() {
        let err = discover_tiles(Path::new("/nonexistent/inputs"), &exts(), true).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/inputs"));
    }
}
