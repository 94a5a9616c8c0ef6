//! Watch file registration
//!
//! Each build pass registers the crate sources of a manifest once. The set of
//! manifests seen in the current pass lives in [`BuildState`] and is cleared
//! on build start.

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Module ids seen during the current build pass
#[derive(Debug, Default)]
pub struct BuildState {
    file_ids: Mutex<FxHashSet<String>>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every id; called at build start
    pub fn clear(&self) {
        self.file_ids.lock().clear();
    }

    /// Record `id`, returning `true` if it was not seen yet in this pass
    pub fn insert(&self, id: &str) -> bool {
        self.file_ids.lock().insert(id.to_string())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.file_ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.file_ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.file_ids.lock().is_empty()
    }
}

/// Expand gitignore-style `patterns` relative to `crate_dir` into files
///
/// Invalid patterns are skipped with a warning. The result is sorted.
pub fn expand_watch_patterns(crate_dir: &Path, patterns: &[String]) -> Vec<PathBuf> {
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut builder = OverrideBuilder::new(crate_dir);
    for pattern in patterns {
        if let Err(err) = builder.add(pattern) {
            warn!("[fob-wasm-pack] Ignoring invalid watch pattern {:?}: {}", pattern, err);
        }
    }

    let overrides = match builder.build() {
        Ok(overrides) => overrides,
        Err(err) => {
            warn!("[fob-wasm-pack] Failed to build watch patterns: {}", err);
            return Vec::new();
        }
    };

    if overrides.num_whitelists() == 0 {
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = WalkBuilder::new(crate_dir)
        .overrides(overrides)
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    debug!(
        "[fob-wasm-pack] {} watch file(s) under {}",
        files.len(),
        crate_dir.display()
    );
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_build_state_set_semantics() {
        let state = BuildState::new();
        assert!(state.is_empty());
        assert!(state.insert("/a/Cargo.toml"));
        assert!(!state.insert("/a/Cargo.toml"));
        assert!(state.insert("/b/Cargo.toml"));
        assert_eq!(state.len(), 2);
        assert!(state.contains("/a/Cargo.toml"));

        state.clear();
        assert!(state.is_empty());
        assert!(state.insert("/a/Cargo.toml"));
    }

    #[test]
    fn test_expand_default_pattern() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();
        fs::write(dir.path().join("src/nested/mod.rs"), "").unwrap();
        fs::write(dir.path().join("build.rs"), "").unwrap();

        let files = expand_watch_patterns(dir.path(), &["src/**".to_string()]);

        assert_eq!(
            files,
            vec![
                dir.path().join("src/lib.rs"),
                dir.path().join("src/nested/mod.rs"),
            ]
        );
    }

    #[test]
    fn test_expand_no_patterns() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("lib.rs"), "").unwrap();
        assert!(expand_watch_patterns(dir.path(), &[]).is_empty());
    }
}
