//! Error types for wasm-pack integration

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Message used when the compiler executable cannot be located
pub(crate) const WASM_PACK_MISSING_MESSAGE: &str = "Could not find wasm-pack, install it with `yarn add --dev wasm-pack` or `npm install --save-dev wasm-pack`";

/// Errors that can occur while building a crate through wasm-pack
#[derive(Error, Debug, Diagnostic)]
pub enum WasmPackError {
    /// The manifest text is not valid TOML or lacks a `[package]` table
    #[error("Failed to parse Cargo manifest {path}: {source}")]
    #[diagnostic(
        code(fob::wasm_pack::manifest_parse),
        help("Check the syntax of the Cargo.toml being imported")
    )]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The manifest has an empty `package.name`
    #[error("Cargo manifest {path} has an empty package name")]
    #[diagnostic(
        code(fob::wasm_pack::missing_package_name),
        help("Set `name` in the [package] table")
    )]
    MissingPackageName { path: PathBuf },

    /// The executable could not be located by the operating system
    #[error("Command `{command}` not found")]
    #[diagnostic(code(fob::wasm_pack::command_not_found))]
    CommandNotFound { command: String },

    /// The process ran and exited with a non-zero status
    #[error("Command `{command} {}` failed with error code: {exit_code}", .args.join(" "))]
    #[diagnostic(code(fob::wasm_pack::command_failed))]
    CommandFailed {
        command: String,
        args: Vec<String>,
        exit_code: i32,
    },

    /// Any other spawn-time failure
    #[error("Failed to spawn `{command}`: {source}")]
    #[diagnostic(
        code(fob::wasm_pack::spawn_failed),
        help("Check that the executable is installed and permissions are correct")
    )]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exceeded the configured timeout and was killed
    #[error("Command `{command}` timed out after {timeout_secs} seconds")]
    #[diagnostic(
        code(fob::wasm_pack::timeout),
        help("Increase `timeoutSecs` or check if the compiler is stuck")
    )]
    Timeout { command: String, timeout_secs: u64 },

    /// Deleting the output directory or reading a generated artifact failed
    #[error("Filesystem operation on {path} failed: {source}")]
    #[diagnostic(code(fob::wasm_pack::filesystem))]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `cargo metadata` produced output that could not be understood
    #[error("Failed to read target directory from cargo metadata: {message}")]
    #[diagnostic(
        code(fob::wasm_pack::metadata),
        help("Set `targetDir` explicitly or disable `useCargoMetadata`")
    )]
    Metadata { message: String },

    /// A waiter resumed while another build still held the lock
    #[error("Invalid lock state")]
    #[diagnostic(
        code(fob::wasm_pack::invalid_lock_state),
        help("This is a bug in the build queue, please report it")
    )]
    InvalidLockState,

    /// The wasm-pack executable is not installed
    #[error("{}", WASM_PACK_MISSING_MESSAGE)]
    #[diagnostic(code(fob::wasm_pack::toolchain_missing))]
    ToolchainMissing,

    /// Generic compiler failure reported when `verbose` is off
    #[error("Rust compilation failed")]
    #[diagnostic(
        code(fob::wasm_pack::compilation_failed),
        help("Enable `verbose` to see the underlying error")
    )]
    CompilationFailed,
}

impl WasmPackError {
    pub fn manifest_parse(path: impl Into<PathBuf>, source: toml::de::Error) -> Self {
        Self::ManifestParse {
            path: path.into(),
            source,
        }
    }

    pub fn command_not_found(command: impl Into<String>) -> Self {
        Self::CommandNotFound {
            command: command.into(),
        }
    }

    pub fn command_failed(command: impl Into<String>, args: Vec<String>, exit_code: i32) -> Self {
        Self::CommandFailed {
            command: command.into(),
            args,
            exit_code,
        }
    }

    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    pub fn timeout(command: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            command: command.into(),
            timeout_secs,
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    pub fn metadata(message: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
        }
    }

    /// Exit code of a failed command, if this is a `CommandFailed`
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }

    /// Whether this error comes from running the compiler process
    pub fn is_process_failure(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::Spawn { .. } | Self::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WasmPackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failed_message() {
        let err = WasmPackError::command_failed(
            "wasm-pack",
            vec!["build".to_string(), "--dev".to_string()],
            1,
        );
        assert_eq!(
            err.to_string(),
            "Command `wasm-pack build --dev` failed with error code: 1"
        );
        assert_eq!(err.exit_code(), Some(1));
        assert!(err.is_process_failure());
    }

    #[test]
    fn test_toolchain_missing_names_install_command() {
        let message = WasmPackError::ToolchainMissing.to_string();
        assert!(message.contains("wasm-pack"));
        assert!(message.contains("npm install --save-dev wasm-pack"));
    }

    #[test]
    fn test_not_found_is_not_process_failure() {
        let err = WasmPackError::command_not_found("wasm-pack");
        assert!(!err.is_process_failure());
        assert_eq!(err.exit_code(), None);
    }
}
