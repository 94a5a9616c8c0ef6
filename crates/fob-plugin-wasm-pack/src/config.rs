//! wasm-pack plugin configuration types
//!
//! Option names follow the camelCase keys used by JavaScript-side bundler
//! configs, so the same object can be passed through `from_value`.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Prefix for environment variable overrides (e.g. `FOB_WASM_PACK_VERBOSE=true`)
pub const ENV_PREFIX: &str = "FOB_WASM_PACK_";

/// Formats the module specifier for an imported asset path
///
/// The default encodes the path as a JSON string literal.
#[derive(Clone)]
pub struct ImportHook(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl ImportHook {
    pub fn new(hook: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(hook))
    }

    pub fn call(&self, path: &str) -> String {
        (self.0)(path)
    }
}

impl Default for ImportHook {
    fn default() -> Self {
        Self::new(|path| {
            serde_json::to_string(path).unwrap_or_else(|_| format!("\"{}\"", path))
        })
    }
}

impl fmt::Debug for ImportHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ImportHook(..)")
    }
}

/// Configuration for wasm-pack builds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WasmPackOptions {
    /// Glob patterns, relative to the crate directory, registered as watch files
    pub watch_patterns: Vec<String>,

    /// Specifier formatter for the explicit URL import of the `.wasm` file
    #[serde(skip)]
    pub import_hook: ImportHook,

    /// Server output path prefix
    pub server_path: String,

    /// Extra arguments passed to cargo after `--`
    pub cargo_args: Vec<String>,

    /// Inline the wasm binary into the loader (accepted, not used yet)
    pub inline_wasm: bool,

    /// Show wasm-pack's info logs and keep the original error on failure
    pub verbose: bool,

    /// Node.js output (accepted, the loader is always built with `--target web`)
    pub nodejs: bool,

    /// Register watch files; unset means "follow the host's watch mode"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watch: Option<bool>,

    /// Project root that relative target directories resolve against
    ///
    /// Defaults to the current working directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,

    /// Root of the cargo target directory, relative to `root_dir`
    ///
    /// Defaults to `target` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_dir: Option<PathBuf>,

    /// Ask `cargo metadata` for the target directory instead of assuming `target`
    pub use_cargo_metadata: bool,

    /// Explicit path of the wasm-pack executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wasm_pack_path: Option<PathBuf>,

    /// Kill wasm-pack after this many seconds; no timeout when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Development build (`--dev`) instead of `--release`
    ///
    /// Derived from the host mode in `config_resolved`.
    #[serde(skip)]
    pub debug: bool,
}

impl Default for WasmPackOptions {
    fn default() -> Self {
        Self {
            watch_patterns: vec!["src/**".to_string()],
            import_hook: ImportHook::default(),
            server_path: String::new(),
            cargo_args: Vec::new(),
            inline_wasm: false,
            verbose: false,
            nodejs: false,
            watch: None,
            root_dir: None,
            target_dir: None,
            use_cargo_metadata: false,
            wasm_pack_path: None,
            timeout_secs: None,
            debug: true,
        }
    }
}

impl WasmPackOptions {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a serde_json::Value (camelCase keys, missing keys use defaults)
    ///
    /// # Example
    ///
    /// ```
    /// use fob_plugin_wasm_pack::WasmPackOptions;
    /// use serde_json::json;
    ///
    /// let options = WasmPackOptions::from_value(json!({
    ///     "cargoArgs": ["--features", "simd"],
    ///     "verbose": true
    /// }))
    /// .unwrap();
    /// assert!(options.verbose);
    /// assert_eq!(options.watch_patterns, vec!["src/**".to_string()]);
    /// ```
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Load defaults overridden by `FOB_WASM_PACK_*` environment variables
    pub fn from_env() -> Result<Self, figment::Error> {
        Self::default().with_env_overrides()
    }

    /// Layer `FOB_WASM_PACK_*` environment variables on top of these options
    ///
    /// Keys are matched case-insensitively against the camelCase field names,
    /// e.g. `FOB_WASM_PACK_VERBOSE=true` or `FOB_WASM_PACK_TIMEOUT_SECS=120`.
    /// Lists use figment's array syntax: `FOB_WASM_PACK_CARGO_ARGS='["--locked"]'`.
    pub fn with_env_overrides(self) -> Result<Self, figment::Error> {
        let import_hook = self.import_hook.clone();
        let debug = self.debug;
        let mut merged: Self = Figment::from(Serialized::defaults(&self))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .map(|key| env_key_to_field(key.as_str()).into())
                    .lowercase(false),
            )
            .extract()?;
        merged.import_hook = import_hook;
        merged.debug = debug;
        Ok(merged)
    }

    pub fn with_watch_patterns(mut self, patterns: Vec<String>) -> Self {
        self.watch_patterns = patterns;
        self
    }

    pub fn with_import_hook(
        mut self,
        hook: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.import_hook = ImportHook::new(hook);
        self
    }

    pub fn with_cargo_arg(mut self, arg: impl Into<String>) -> Self {
        self.cargo_args.push(arg.into());
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch = Some(watch);
        self
    }

    pub fn with_root_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.root_dir = Some(dir.into());
        self
    }

    pub fn with_target_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.target_dir = Some(dir.into());
        self
    }

    pub fn with_cargo_metadata(mut self, enabled: bool) -> Self {
        self.use_cargo_metadata = enabled;
        self
    }

    pub fn with_wasm_pack_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wasm_pack_path = Some(path.into());
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Map an upper-cased env suffix onto the camelCase field it overrides
fn env_key_to_field(key: &str) -> String {
    const FIELDS: &[&str] = &[
        "watchPatterns",
        "serverPath",
        "cargoArgs",
        "inlineWasm",
        "verbose",
        "nodejs",
        "watch",
        "rootDir",
        "targetDir",
        "useCargoMetadata",
        "wasmPackPath",
        "timeoutSecs",
    ];

    let normalized: String = key.chars().filter(|c| *c != '_').collect();
    FIELDS
        .iter()
        .find(|field| field.eq_ignore_ascii_case(&normalized))
        .map(|field| field.to_string())
        .unwrap_or_else(|| key.to_string())
}

/// Resolved configuration reported by the host bundler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Build mode, e.g. "development" or "production"
    pub mode: String,

    /// Whether the host runs in watch / live-reload mode
    pub watch_mode: bool,

    /// Whether modules are transformed for server-side rendering
    pub ssr: bool,
}

impl HostConfig {
    pub fn new(mode: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            watch_mode: false,
            ssr: false,
        }
    }

    pub fn with_watch_mode(mut self, watch_mode: bool) -> Self {
        self.watch_mode = watch_mode;
        self
    }

    pub fn with_ssr(mut self, ssr: bool) -> Self {
        self.ssr = ssr;
        self
    }

    /// Every mode except "production" builds with `--dev`
    pub fn is_debug(&self) -> bool {
        self.mode != "production"
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::new("development")
    }
}
