//! Loader rewriting
//!
//! wasm-pack's `--target web` loader locates its binary with
//! `new URL('index_bg.wasm', import.meta.url)`. That expression is replaced
//! according to the render mode:
//!
//! ```text
//! Client: import wasmUrl from "<out>/index_bg.wasm?url";
//!         new URL(..., import.meta.url) → new URL(wasmUrl, window.location.origin)
//!
//! Server: fs.readFileSync("<out>/index_bg.wasm") compiled up front
//!         new URL(..., import.meta.url) → input
//! ```
//!
//! The rewrite is textual. A loader without the pattern passes through with
//! only the prologue added.

use crate::config::ImportHook;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, warn};

/// File name of the generated binary module
pub const WASM_FILE_NAME: &str = "index_bg.wasm";

/// File name of the generated loader
pub const LOADER_FILE_NAME: &str = "index.js";

/// `new URL(<string literal>, import.meta.url)`
static ASSET_URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bnew\s+URL\s*\(\s*('[^']+'|"[^"]+"|`[^`]+`)\s*,\s*import\.meta\.url\s*\)"#)
        .expect("asset URL pattern is valid")
});

/// The loader re-exports `init` as its default; server mode replaces it
static DEFAULT_EXPORT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"export default init;").expect("default export pattern is valid"));

/// Identifier of the compiled module handle in server mode
const SERVER_INPUT_IDENT: &str = "input";

/// Expression resolving the imported asset URL in client mode
const CLIENT_URL_EXPR: &str = "new URL(wasmUrl, window.location.origin)";

/// Where the rewritten loader will run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Browser: the binary is fetched from a bundler-managed asset URL
    Client,
    /// Server-side rendering: the binary is read from disk synchronously
    Server,
}

impl RenderMode {
    pub fn from_ssr(ssr: bool) -> Self {
        if ssr {
            Self::Server
        } else {
            Self::Client
        }
    }
}

/// A textual substitution applied to every match of `pattern`
#[derive(Debug, Clone)]
pub struct RewriteRule {
    pattern: &'static Regex,
    replacement: &'static str,
}

impl RewriteRule {
    /// Apply the rule, returning the new text and the number of matches
    pub fn apply<'a>(&self, text: &'a str) -> (Cow<'a, str>, usize) {
        let count = self.pattern.find_iter(text).count();
        if count == 0 {
            return (Cow::Borrowed(text), 0);
        }
        // NoExpand: replacements are literal, `$` has no meaning
        let replaced = self
            .pattern
            .replace_all(text, regex::NoExpand(self.replacement));
        (replaced, count)
    }
}

/// Result of rewriting a loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenLoader {
    pub code: String,
    /// Number of asset URL expressions replaced
    pub url_matches: usize,
}

/// Rewrites wasm-pack loaders for one render mode
#[derive(Debug, Clone)]
pub struct LoaderRewriter {
    mode: RenderMode,
    import_hook: ImportHook,
}

impl LoaderRewriter {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            import_hook: ImportHook::default(),
        }
    }

    /// Use `hook` to format the client-side asset import specifier
    pub fn with_import_hook(mut self, hook: ImportHook) -> Self {
        self.import_hook = hook;
        self
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    /// Rules applied, in order, to the loader body
    pub fn rules(&self) -> Vec<RewriteRule> {
        match self.mode {
            RenderMode::Server => vec![
                RewriteRule {
                    pattern: &DEFAULT_EXPORT_PATTERN,
                    replacement: "",
                },
                RewriteRule {
                    pattern: &ASSET_URL_PATTERN,
                    replacement: SERVER_INPUT_IDENT,
                },
            ],
            RenderMode::Client => vec![RewriteRule {
                pattern: &ASSET_URL_PATTERN,
                replacement: CLIENT_URL_EXPR,
            }],
        }
    }

    /// Code placed before the loader body
    pub fn prologue(&self, wasm_path: &Path) -> String {
        let wasm_path = wasm_path.to_string_lossy();
        match self.mode {
            RenderMode::Server => {
                let literal = serde_json::to_string(&*wasm_path)
                    .unwrap_or_else(|_| format!("\"{}\"", wasm_path));
                format!(
                    "import * as fs from 'fs';\n\
                     const bytes = fs.readFileSync({literal});\n\
                     export default () => init(WebAssembly.compile(bytes));\n"
                )
            }
            RenderMode::Client => {
                // Explicit URL import, resolved by the bundler's asset handling
                let specifier = self.import_hook.call(&format!("{}?url", wasm_path));
                format!("import wasmUrl from {specifier};\n")
            }
        }
    }

    /// Rewrite `loader`, the generated `index.js`, for `wasm_path`
    pub fn rewrite(&self, loader: &str, wasm_path: &Path) -> RewrittenLoader {
        let url_matches = ASSET_URL_PATTERN.find_iter(loader).count();

        let mut body = Cow::Borrowed(loader);
        for rule in self.rules() {
            let (next, _) = rule.apply(&body);
            body = Cow::Owned(next.into_owned());
        }

        if url_matches == 0 {
            warn!(
                "[fob-wasm-pack] No `new URL(..., import.meta.url)` found in loader for {}; the module may fail to load",
                wasm_path.display()
            );
        } else {
            debug!(
                "[fob-wasm-pack] Rewrote {} asset URL(s) for {:?} rendering",
                url_matches, self.mode
            );
        }

        let mut code = self.prologue(wasm_path);
        code.push_str(&body);

        RewrittenLoader { code, url_matches }
    }
}

/// Rewrite a loader for client or server rendering with the default import hook
pub fn rewrite_loader(loader: &str, wasm_path: &Path, ssr: bool) -> String {
    LoaderRewriter::new(RenderMode::from_ssr(ssr))
        .rewrite(loader, wasm_path)
        .code
}
