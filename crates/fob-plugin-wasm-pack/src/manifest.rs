//! Cargo manifest parsing

use crate::error::{Result, WasmPackError};
use serde::Deserialize;
use std::path::Path;

/// File name that triggers a wasm-pack build
pub const MANIFEST_FILE_NAME: &str = "Cargo.toml";

/// The subset of `Cargo.toml` the plugin reads
#[derive(Debug, Clone, Deserialize)]
pub struct CargoManifest {
    pub package: Package,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Package {
    pub name: String,
}

impl CargoManifest {
    /// Parse manifest text; `path` is only used for error messages
    pub fn parse(source: &str, path: &Path) -> Result<Self> {
        let manifest: Self =
            toml::from_str(source).map_err(|e| WasmPackError::manifest_parse(path, e))?;

        if manifest.package.name.trim().is_empty() {
            return Err(WasmPackError::MissingPackageName {
                path: path.to_path_buf(),
            });
        }

        Ok(manifest)
    }

    pub fn name(&self) -> &str {
        &self.package.name
    }
}

/// Whether a module id points at a Cargo manifest
pub fn is_manifest_id(id: &str) -> bool {
    Path::new(id)
        .file_name()
        .is_some_and(|name| name == MANIFEST_FILE_NAME)
}
