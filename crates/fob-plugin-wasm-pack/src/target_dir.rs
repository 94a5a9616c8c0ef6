//! Cargo target directory resolution
//!
//! The default is a fixed `target` directory under the project root (the
//! current working directory unless `rootDir` is set). Asking
//! cargo is accurate for workspaces and custom `CARGO_TARGET_DIR`s but costs
//! a `cargo metadata` run per build, so it is opt-in.

use crate::config::WasmPackOptions;
use crate::error::{Result, WasmPackError};
use crate::process::ProcessRunner;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default target directory name, relative to the project root
pub const DEFAULT_TARGET_DIR: &str = "target";

/// Subdirectory of the target directory holding wasm-pack output
pub const WASM_PACK_SUBDIR: &str = "wasm-pack";

#[derive(Debug, Deserialize)]
struct CargoMetadata {
    target_directory: PathBuf,
}

/// Resolve the target directory for the crate in `crate_dir`
///
/// The fixed default and relative overrides resolve against the project
/// root, not the crate, so imported crates never get output written next to
/// their sources. `crate_dir` is only used to run `cargo metadata`.
pub async fn resolve_target_dir(options: &WasmPackOptions, crate_dir: &Path) -> Result<PathBuf> {
    if options.target_dir.is_none() && options.use_cargo_metadata {
        return query_cargo_metadata(crate_dir).await;
    }

    let root = project_root(options)?;
    let target = options
        .target_dir
        .as_deref()
        .unwrap_or(Path::new(DEFAULT_TARGET_DIR));
    Ok(root.join(target))
}

/// `rootDir` if set, the current working directory otherwise
pub fn project_root(options: &WasmPackOptions) -> Result<PathBuf> {
    match &options.root_dir {
        Some(root) => Ok(root.clone()),
        None => std::env::current_dir().map_err(|err| WasmPackError::filesystem(".", err)),
    }
}

/// Output directory for a package: `<target>/wasm-pack/<name>`
pub fn out_dir_for(target_dir: &Path, package_name: &str) -> PathBuf {
    target_dir.join(WASM_PACK_SUBDIR).join(package_name)
}

async fn query_cargo_metadata(crate_dir: &Path) -> Result<PathBuf> {
    let args: Vec<String> = ["metadata", "--no-deps", "--format-version", "1"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let stdout = ProcessRunner::new().output("cargo", &args, crate_dir).await?;
    let target_dir = parse_metadata(&stdout)?;
    debug!(
        "[fob-wasm-pack] cargo metadata target directory: {}",
        target_dir.display()
    );
    Ok(target_dir)
}

fn parse_metadata(stdout: &str) -> Result<PathBuf> {
    serde_json::from_str::<CargoMetadata>(stdout)
        .map(|metadata| metadata.target_directory)
        .map_err(|e| WasmPackError::metadata(e.to_string()))
}
