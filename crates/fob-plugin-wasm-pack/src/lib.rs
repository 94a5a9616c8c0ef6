//! Rolldown plugin implementation for wasm-pack
//!
//! This module provides a Rolldown plugin that compiles Rust crates to
//! WebAssembly when a `Cargo.toml` is imported from JavaScript:
//!
//! ```js
//! import init, { greet } from "./crates/hello/Cargo.toml";
//! await init();
//! greet();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Cargo.toml → transform() → parse manifest → rm -rf out dir
//!                                ↓
//!               SingleFlight lock → wasm-pack build (one at a time)
//!                                ↓
//!               read index.js → rewrite wasm URL → JS module
//! ```
//!
//! Client builds import the `.wasm` file as an explicit asset URL; server
//! builds read it from disk with `fs.readFileSync` and compile from bytes.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use fob_plugin_wasm_pack::{FobWasmPackPlugin, HostConfig, WasmPackOptions};
//! use std::sync::Arc;
//!
//! let plugin = FobWasmPackPlugin::new(WasmPackOptions::default().with_cargo_arg("--locked"));
//! plugin.config_resolved(HostConfig::new("production"));
//! // Use with your Rolldown bundler configuration
//! let plugin = Arc::new(plugin);
//! ```

use anyhow::Context;
use parking_lot::RwLock;
use rolldown_common::ModuleType;
use rolldown_plugin::{
    HookBuildStartArgs, HookNoopReturn, HookTransformArgs, HookTransformOutput,
    HookTransformReturn, HookUsage, Plugin, PluginContext, SharedTransformPluginContext,
};
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

mod builder;
mod config;
mod error;
mod lock;
#[cfg(feature = "logging")]
pub mod logging;
mod manifest;
mod process;
mod rewrite;
mod target_dir;
mod watch;

pub use builder::{
    build_args, remove_dir_if_exists, BuildTransaction, TransformOutput, WasmPackBuilder,
};
pub use config::{HostConfig, ImportHook, WasmPackOptions, ENV_PREFIX};
pub use error::{Result, WasmPackError};
pub use lock::{SingleFlight, SingleFlightGuard};
pub use manifest::{is_manifest_id, CargoManifest, MANIFEST_FILE_NAME};
pub use process::{wasm_pack_command, ProcessRunner};
pub use rewrite::{
    rewrite_loader, LoaderRewriter, RenderMode, RewriteRule, RewrittenLoader, LOADER_FILE_NAME,
    WASM_FILE_NAME,
};
pub use target_dir::{
    out_dir_for, project_root, resolve_target_dir, DEFAULT_TARGET_DIR, WASM_PACK_SUBDIR,
};
pub use watch::{expand_watch_patterns, BuildState};

/// Rolldown plugin that builds imported `Cargo.toml` files with wasm-pack
///
/// Clones share options, build state and the build lock, so a plugin can be
/// handed to the bundler while the caller keeps a handle for lifecycle calls.
/// Separate `new()` instances are fully independent.
#[derive(Clone, Debug)]
pub struct FobWasmPackPlugin {
    /// Plugin options; `debug` and `watch` are settled during lifecycle hooks
    options: Arc<RwLock<WasmPackOptions>>,

    /// Host configuration captured by `config_resolved`
    host: Arc<RwLock<HostConfig>>,

    /// Manifest ids seen in the current build pass
    state: Arc<BuildState>,

    /// Serializes wasm-pack runs
    builder: WasmPackBuilder,
}

impl FobWasmPackPlugin {
    /// Create a new FobWasmPackPlugin with the given options
    ///
    /// # Example
    ///
    /// ```rust
    /// use fob_plugin_wasm_pack::{FobWasmPackPlugin, WasmPackOptions};
    ///
    /// let plugin = FobWasmPackPlugin::new(WasmPackOptions::default());
    /// ```
    pub fn new(options: WasmPackOptions) -> Self {
        Self {
            options: Arc::new(RwLock::new(options)),
            host: Arc::new(RwLock::new(HostConfig::default())),
            state: Arc::new(BuildState::new()),
            builder: WasmPackBuilder::new(),
        }
    }

    /// Snapshot of the current options
    pub fn options(&self) -> WasmPackOptions {
        self.options.read().clone()
    }

    pub fn host_config(&self) -> HostConfig {
        self.host.read().clone()
    }

    pub fn build_state(&self) -> &BuildState {
        &self.state
    }

    pub fn builder(&self) -> &WasmPackBuilder {
        &self.builder
    }

    /// Capture the host's resolved configuration
    ///
    /// Every mode other than "production" builds with `--dev`.
    pub fn config_resolved(&self, host: HostConfig) {
        self.options.write().debug = host.is_debug();
        debug!(
            "[fob-wasm-pack] Config resolved: mode={}, watch={}, ssr={}",
            host.mode, host.watch_mode, host.ssr
        );
        *self.host.write() = host;
    }

    /// Reset per-build state
    ///
    /// In watch mode `watch` defaults to true unless it was set explicitly.
    pub fn on_build_start(&self, watch_mode: bool) {
        self.state.clear();

        if watch_mode {
            let mut options = self.options.write();
            if options.watch.is_none() {
                options.watch = Some(true);
            }
        }
    }

    /// Build `id` if it is a `Cargo.toml`; other modules pass through
    pub async fn transform_module(
        &self,
        source: &str,
        id: &str,
        ssr: bool,
    ) -> Result<Option<TransformOutput>> {
        if !is_manifest_id(id) {
            return Ok(None);
        }

        let options = self.options();
        let output = self
            .builder
            .build(source, Path::new(id), &options, ssr)
            .await?;
        Ok(Some(output))
    }

    /// Files to register as watch files for the manifest `id`
    ///
    /// Empty unless watching is enabled, and for every repeat of `id` within
    /// one build pass.
    pub fn watch_files(&self, id: &str) -> Vec<PathBuf> {
        let options = self.options.read();
        if options.watch != Some(true) || !is_manifest_id(id) || !self.state.insert(id) {
            return Vec::new();
        }

        let manifest_path = Path::new(id);
        let crate_dir = manifest_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut files = vec![manifest_path.to_path_buf()];
        files.extend(expand_watch_patterns(crate_dir, &options.watch_patterns));
        files
    }
}

impl Default for FobWasmPackPlugin {
    fn default() -> Self {
        Self::new(WasmPackOptions::default())
    }
}

impl Plugin for FobWasmPackPlugin {
    /// Returns the plugin name for debugging and logging
    fn name(&self) -> Cow<'static, str> {
        "fob-wasm-pack".into()
    }

    fn register_hook_usage(&self) -> HookUsage {
        HookUsage::BuildStart | HookUsage::Transform
    }

    /// Build start hook - clears the seen-manifest set
    fn build_start(
        &self,
        _ctx: &PluginContext,
        _args: &HookBuildStartArgs<'_>,
    ) -> impl std::future::Future<Output = HookNoopReturn> + Send {
        let watch_mode = self.host.read().watch_mode;
        self.on_build_start(watch_mode);
        async { Ok(()) }
    }

    /// Transform hook - builds `Cargo.toml` modules into their JS loader
    ///
    /// # Returns
    ///
    /// - `Ok(Some(output))` - The rewritten wasm-pack loader
    /// - `Ok(None)` - Not a Cargo manifest
    /// - `Err(e)` - Manifest, wasm-pack or filesystem error
    fn transform(
        &self,
        ctx: SharedTransformPluginContext,
        args: &HookTransformArgs<'_>,
    ) -> impl std::future::Future<Output = HookTransformReturn> + Send {
        let id = args.id.to_string();
        let code = args.code.to_string();
        let plugin = self.clone();

        async move {
            if !is_manifest_id(&id) {
                return Ok(None);
            }

            for file in plugin.watch_files(&id) {
                ctx.add_watch_file(&file.to_string_lossy());
            }

            let ssr = plugin.host.read().ssr;
            debug!("[fob-wasm-pack] Transform hook called for {} (ssr={})", id, ssr);

            let output = plugin
                .transform_module(&code, &id, ssr)
                .await
                .with_context(|| format!("Failed to build Rust crate: {}", id))?;

            Ok(output.map(|output| HookTransformOutput {
                code: Some(output.code),
                map: None,
                side_effects: None,
                module_type: Some(ModuleType::Js),
            }))
        }
    }
}
