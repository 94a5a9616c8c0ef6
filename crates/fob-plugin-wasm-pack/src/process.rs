//! External process execution for wasm-pack

use crate::error::{Result, WasmPackError};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// Name of the wasm-pack executable on this platform
///
/// npm installs a `.cmd` shim on Windows.
pub fn wasm_pack_command() -> &'static str {
    if cfg!(windows) {
        "wasm-pack.cmd"
    } else {
        "wasm-pack"
    }
}

/// Runs external commands with inherited stdio
///
/// Output is streamed straight to the user's terminal; nothing is captured.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Kill the process after this many seconds
    timeout_secs: Option<u64>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout_secs(mut self, timeout_secs: Option<u64>) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Run `command` with `args` in `cwd` and wait for it to exit
    ///
    /// # Errors
    ///
    /// - `CommandNotFound` when the executable does not exist
    /// - `Spawn` for any other spawn or wait failure
    /// - `CommandFailed` when the process exits with a non-zero code
    /// - `Timeout` when a timeout is configured and exceeded
    pub async fn run(&self, command: &str, args: &[String], cwd: &Path) -> Result<()> {
        debug!(
            "[fob-wasm-pack] Running `{} {}` in {}",
            command,
            args.join(" "),
            cwd.display()
        );

        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => WasmPackError::command_not_found(command),
            _ => WasmPackError::spawn(command, err),
        })?;

        let status = match self.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), child.wait())
                .await
                .map_err(|_| WasmPackError::timeout(command, secs))?,
            None => child.wait().await,
        }
        .map_err(|err| WasmPackError::spawn(command, err))?;

        if !status.success() {
            // Killed by a signal on unix: no exit code
            let exit_code = status.code().unwrap_or(-1);
            return Err(WasmPackError::command_failed(
                command,
                args.to_vec(),
                exit_code,
            ));
        }

        Ok(())
    }

    /// Run `command` and capture its stdout as a string
    ///
    /// Stderr is still inherited. Used for `cargo metadata`.
    pub async fn output(&self, command: &str, args: &[String], cwd: &Path) -> Result<String> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        let output = cmd.output();

        let output = match self.timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), output)
                .await
                .map_err(|_| WasmPackError::timeout(command, secs))?,
            None => output.await,
        }
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => WasmPackError::command_not_found(command),
            _ => WasmPackError::spawn(command, err),
        })?;

        if !output.status.success() {
            return Err(WasmPackError::command_failed(
                command,
                args.to_vec(),
                output.status.code().unwrap_or(-1),
            ));
        }

        String::from_utf8(output.stdout).map_err(|err| WasmPackError::metadata(err.to_string()))
    }
}
