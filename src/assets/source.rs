use crate::foundation::error::{CamflowError, CamflowResult};
use std::collections::HashMap;
use std::path::PathBuf;

/// Read-only asset provider handed to [`crate::Engine::create`].
///
/// Paths are relative, `/`-separated keys (`"luts/default.png"`). On Android this is backed by
/// the APK asset manager; the crate ships a directory-backed and an in-memory implementation.
pub trait AssetSource: Send + Sync {
    /// Read the complete asset named by `path`.
    fn read(&self, path: &str) -> CamflowResult<Vec<u8>>;
}

/// Assets resolved against a root directory on disk.
#[derive(Clone, Debug)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetSource for DirAssets {
    fn read(&self, path: &str) -> CamflowResult<Vec<u8>> {
        let rel = normalize_rel_path(path)?;
        let full = self.root.join(&rel);
        std::fs::read(&full)
            .map_err(|e| CamflowError::asset(format!("read '{}': {e}", full.display())))
    }
}

/// Assets held in memory, keyed by normalized path.
#[derive(Clone, Debug, Default)]
pub struct MemoryAssets {
    files: HashMap<String, Vec<u8>>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) an asset. Invalid paths are rejected.
    pub fn insert(&mut self, path: &str, bytes: Vec<u8>) -> CamflowResult<()> {
        let key = normalize_rel_path(path)?;
        self.files.insert(key, bytes);
        Ok(())
    }

    pub fn with(mut self, path: &str, bytes: Vec<u8>) -> CamflowResult<Self> {
        self.insert(path, bytes)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl AssetSource for MemoryAssets {
    fn read(&self, path: &str) -> CamflowResult<Vec<u8>> {
        let key = normalize_rel_path(path)?;
        self.files
            .get(&key)
            .cloned()
            .ok_or_else(|| CamflowError::asset(format!("asset '{key}' not found")))
    }
}

pub(crate) fn normalize_rel_path(source: &str) -> CamflowResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(CamflowError::validation("asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(CamflowError::validation("asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(CamflowError::validation("asset paths must not contain '..'"));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(CamflowError::validation(
            "asset path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rel_path_cleans_and_rejects() {
        assert_eq!(
            normalize_rel_path("./luts//grade.png").unwrap(),
            "luts/grade.png"
        );
        assert_eq!(normalize_rel_path("luts\\a.png").unwrap(), "luts/a.png");
        assert!(normalize_rel_path("/abs.png").is_err());
        assert!(normalize_rel_path("../up.png").is_err());
        assert!(normalize_rel_path("").is_err());
        assert!(normalize_rel_path("./").is_err());
    }

    #[test]
    fn memory_assets_lookup_uses_normalized_keys() {
        let assets = MemoryAssets::new()
            .with("luts/grade.png", vec![1, 2, 3])
            .unwrap();
        assert_eq!(assets.read("./luts/grade.png").unwrap(), vec![1, 2, 3]);
        let err = assets.read("luts/missing.png").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn dir_assets_reports_missing_files() {
        let dir = std::env::temp_dir().join(format!("camflow_assets_{}", std::process::id()));
        std::fs::create_dir_all(dir.join("luts")).unwrap();
        std::fs::write(dir.join("luts").join("a.bin"), [9u8]).unwrap();

        let assets = DirAssets::new(&dir);
        assert_eq!(assets.read("luts/a.bin").unwrap(), vec![9]);
        assert!(matches!(
            assets.read("luts/b.bin"),
            Err(CamflowError::Asset(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
