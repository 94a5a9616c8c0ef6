//! wasm-pack build orchestration
//!
//! One [`BuildTransaction`] per imported `Cargo.toml`:
//!
//! ```text
//! parse manifest → out dir → rm -rf out dir → args
//!     → [SingleFlight: wasm-pack build] → read index.js → rewrite loader
//! ```
//!
//! Only the wasm-pack invocation is serialized; transactions for different
//! packages clear their own output directories concurrently.

use crate::config::WasmPackOptions;
use crate::error::{Result, WasmPackError};
use crate::lock::SingleFlight;
use crate::manifest::CargoManifest;
use crate::process::{wasm_pack_command, ProcessRunner};
use crate::rewrite::{LoaderRewriter, RenderMode, LOADER_FILE_NAME, WASM_FILE_NAME};
use crate::target_dir::{out_dir_for, resolve_target_dir};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Output of a successful build: the rewritten loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub code: String,
}

/// State of one manifest build
#[derive(Debug, Clone)]
pub struct BuildTransaction {
    /// Crate directory, the wasm-pack working directory
    pub crate_dir: PathBuf,

    /// `<target>/wasm-pack/<package name>`
    pub out_dir: PathBuf,

    /// Arguments passed to wasm-pack
    pub args: Vec<String>,

    pub ssr: bool,
}

impl BuildTransaction {
    pub fn loader_path(&self) -> PathBuf {
        self.out_dir.join(LOADER_FILE_NAME)
    }

    pub fn wasm_path(&self) -> PathBuf {
        self.out_dir.join(WASM_FILE_NAME)
    }
}

/// Assemble the wasm-pack argument list
///
/// User `cargo_args` always come last, after `--`, untouched.
pub fn build_args(options: &WasmPackOptions, out_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--log-level".to_string(),
        if options.verbose { "info" } else { "error" }.to_string(),
        "build".to_string(),
        "--out-dir".to_string(),
        out_dir.to_string_lossy().into_owned(),
        "--out-name".to_string(),
        "index".to_string(),
        "--target".to_string(),
        "web".to_string(),
        if options.debug { "--dev" } else { "--release" }.to_string(),
        "--".to_string(),
    ];
    args.extend(options.cargo_args.iter().cloned());
    args
}

/// Recursively delete `path`; a missing directory is not an error
pub async fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WasmPackError::filesystem(path, err)),
    }
}

/// Builds crates with wasm-pack, one at a time
#[derive(Debug, Clone)]
pub struct WasmPackBuilder {
    lock: Arc<SingleFlight>,
}

impl Default for WasmPackBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WasmPackBuilder {
    pub fn new() -> Self {
        Self::with_lock(Arc::new(SingleFlight::new()))
    }

    /// Share `lock` with other builders
    pub fn with_lock(lock: Arc<SingleFlight>) -> Self {
        Self { lock }
    }

    pub fn lock(&self) -> &Arc<SingleFlight> {
        &self.lock
    }

    /// Plan the build for `manifest_source` located at `manifest_path`
    pub async fn prepare(
        &self,
        manifest_source: &str,
        manifest_path: &Path,
        options: &WasmPackOptions,
        ssr: bool,
    ) -> Result<BuildTransaction> {
        let manifest = CargoManifest::parse(manifest_source, manifest_path)?;
        let crate_dir = manifest_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        let target_dir = resolve_target_dir(options, &crate_dir).await?;
        let out_dir = out_dir_for(&target_dir, manifest.name());
        let args = build_args(options, &out_dir);

        Ok(BuildTransaction {
            crate_dir,
            out_dir,
            args,
            ssr,
        })
    }

    /// Build the crate of `manifest_path` and return the rewritten loader
    ///
    /// # Errors
    ///
    /// Any failure aborts the build. A missing wasm-pack becomes
    /// `ToolchainMissing`; other process failures become `CompilationFailed`
    /// unless `options.verbose` is set.
    pub async fn build(
        &self,
        manifest_source: &str,
        manifest_path: &Path,
        options: &WasmPackOptions,
        ssr: bool,
    ) -> Result<TransformOutput> {
        let transaction = self
            .prepare(manifest_source, manifest_path, options, ssr)
            .await?;

        remove_dir_if_exists(&transaction.out_dir).await?;

        let command = options
            .wasm_pack_path
            .as_ref()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| wasm_pack_command().to_string());
        let runner = ProcessRunner::new().with_timeout_secs(options.timeout_secs);

        let started = Instant::now();
        self.lock
            .run(|| async {
                info!(
                    "[fob-wasm-pack] Building {} ({})",
                    transaction.crate_dir.display(),
                    if options.debug { "dev" } else { "release" }
                );
                runner
                    .run(&command, &transaction.args, &transaction.crate_dir)
                    .await
            })
            .await
            .map_err(|err| translate_error(err, options.verbose))?;
        info!(
            "[fob-wasm-pack] Built {} in {:?}",
            transaction.out_dir.display(),
            started.elapsed()
        );

        let loader_path = transaction.loader_path();
        let loader = tokio::fs::read_to_string(&loader_path)
            .await
            .map_err(|err| WasmPackError::filesystem(&loader_path, err))?;
        debug!(
            "[fob-wasm-pack] Read loader {} ({} bytes)",
            loader_path.display(),
            loader.len()
        );

        let rewritten = LoaderRewriter::new(RenderMode::from_ssr(transaction.ssr))
            .with_import_hook(options.import_hook.clone())
            .rewrite(&loader, &transaction.wasm_path());

        Ok(TransformOutput {
            code: rewritten.code,
        })
    }
}

/// Map compiler errors onto user-facing ones
fn translate_error(err: WasmPackError, verbose: bool) -> WasmPackError {
    match err {
        WasmPackError::CommandNotFound { .. } => WasmPackError::ToolchainMissing,
        WasmPackError::InvalidLockState => WasmPackError::InvalidLockState,
        err if verbose => err,
        _ => WasmPackError::CompilationFailed,
    }
}
