//! Utility functions for running external tools.

use std::{
    ffi::OsStr,
    process::{Output, Stdio},
};

use color_eyre::eyre::{self, Context};
use smol::process::Command;

/// Run a command and capture its output, whatever its exit status.
///
/// # Errors
/// - If the command cannot be spawned.
pub async fn run_command_output<I, A>(name: impl AsRef<OsStr>, args: I) -> eyre::Result<Output>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let name = name.as_ref();
    Command::new(name)
        .args(args)
        .kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .with_context(|| format!("failed to execute {}", name.to_string_lossy()))
}

/// Run a command with the specified name and arguments.
///
/// Return the standard output as a `String` if successful.
///
/// # Errors
/// - If the command fails to execute or returns a non-zero exit status.
pub async fn run_command<I, A>(name: impl AsRef<OsStr>, args: I) -> eyre::Result<String>
where
    I: IntoIterator<Item = A>,
    A: AsRef<OsStr>,
{
    let name = name.as_ref();
    let result = run_command_output(name, args).await?;

    if result.status.success() {
        Ok(String::from_utf8_lossy(&result.stdout).to_string())
    } else {
        Err(eyre::eyre!(
            "Command {} failed with status {}: {}",
            name.to_string_lossy(),
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        ))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_of_successful_command() {
        let output = smol::block_on(run_command("echo", ["hello"])).unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[test]
    fn reports_failing_status() {
        let err = smol::block_on(run_command("sh", ["-c", "echo boom >&2; exit 3"])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("failed with status"), "{message}");
        assert!(message.contains("boom"), "{message}");
    }
}
