//! Device log readers.
//!
//! A reader's identity is the log *source* it attaches to, not the device that created it.
//! Every iOS simulator reads the same system log, so their readers compare equal and a
//! `HashSet<AnyLogReader>` subscribes to that stream once.

use std::{
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    ops::Deref,
    path::PathBuf,
    pin::Pin,
    process::Stdio,
    sync::Arc,
    task::{Context, Poll},
};

use color_eyre::eyre::{self, Context as _};
use futures::{FutureExt, future::BoxFuture};
use pin_project_lite::pin_project;
use smol::{
    channel::{self, Receiver},
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    spawn,
    stream::{Stream, StreamExt},
};
use tracing::debug;

use crate::utils::run_command;

/// The physical log stream a reader attaches to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogSource {
    /// `adb logcat` of one Android device.
    Logcat {
        /// Serial of the device.
        serial: String,
    },
    /// The system log shared by every booted iOS simulator.
    SimulatorSystemLog,
    /// Syslog relay of one physical iOS device.
    DeviceSyslog {
        /// UDID of the device.
        udid: String,
    },
    /// The host machine's own log.
    Host,
}

/// Reads the log of a device.
pub trait DeviceLogReader: Send + Sync + 'static {
    /// Label shown next to log lines.
    fn name(&self) -> &str;

    /// Identity of the underlying stream.
    fn source(&self) -> LogSource;

    /// Attach to the log, clearing the existing backlog first when `clear` is set.
    fn logs(&self, clear: bool) -> BoxFuture<'_, eyre::Result<LogStream>>;
}

/// Shared handle to a log reader, compared and hashed by [`LogSource`].
#[derive(Clone)]
pub struct AnyLogReader(Arc<dyn DeviceLogReader>);

impl AnyLogReader {
    /// Wrap a concrete reader.
    pub fn new(reader: impl DeviceLogReader) -> Self {
        Self(Arc::new(reader))
    }
}

impl Deref for AnyLogReader {
    type Target = dyn DeviceLogReader;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for AnyLogReader {
    fn eq(&self, other: &Self) -> bool {
        self.source() == other.source()
    }
}

impl Eq for AnyLogReader {}

impl Hash for AnyLogReader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source().hash(state);
    }
}

impl Debug for AnyLogReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyLogReader")
            .field("name", &self.name())
            .field("source", &self.source())
            .finish()
    }
}

pin_project! {
    /// Lines read from a device log.
    ///
    /// Dropping the stream stops the underlying process once it emits its next line.
    #[derive(Debug)]
    pub struct LogStream {
        #[pin]
        lines: Receiver<String>,
    }
}

impl LogStream {
    /// Wrap a channel of log lines.
    #[must_use]
    pub const fn new(lines: Receiver<String>) -> Self {
        Self { lines }
    }
}

impl Stream for LogStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.project().lines.poll_next(cx)
    }
}

/// A log reader backed by a long-running command such as `adb logcat`.
#[derive(Debug, Clone)]
pub struct CommandLogReader {
    name: String,
    source: LogSource,
    program: PathBuf,
    args: Vec<String>,
    clear_args: Option<Vec<String>>,
}

impl CommandLogReader {
    /// Create a reader that streams the stdout of `program args...`.
    pub fn new<I, A>(
        name: impl Into<String>,
        source: LogSource,
        program: impl Into<PathBuf>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            name: name.into(),
            source,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            clear_args: None,
        }
    }

    /// Command arguments that clear the log backlog.
    #[must_use]
    pub fn with_clear_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.clear_args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    async fn stream(&self, clear: bool) -> eyre::Result<LogStream> {
        if clear {
            match &self.clear_args {
                Some(clear_args) => {
                    run_command(&self.program, clear_args).await?;
                }
                None => debug!(reader = %self.name, "log source cannot be cleared"),
            }
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start log reader `{}`", self.name))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| eyre::eyre!("log reader `{}` has no stdout", self.name))?;

        let (sender, receiver) = channel::unbounded();
        spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(Ok(line)) = lines.next().await {
                if sender.send(line).await.is_err() {
                    break;
                }
            }
            // Keep the child alive until the stream ends, dropping it kills the process.
            drop(child);
        })
        .detach();

        Ok(LogStream::new(receiver))
    }
}

impl DeviceLogReader for CommandLogReader {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> LogSource {
        self.source.clone()
    }

    fn logs(&self, clear: bool) -> BoxFuture<'_, eyre::Result<LogStream>> {
        self.stream(clear).boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn simulator_reader(name: &str) -> AnyLogReader {
        AnyLogReader::new(CommandLogReader::new(
            name,
            LogSource::SimulatorSystemLog,
            "xcrun",
            ["simctl", "spawn", "booted", "log", "stream"],
        ))
    }

    fn logcat_reader(serial: &str) -> AnyLogReader {
        AnyLogReader::new(CommandLogReader::new(
            serial,
            LogSource::Logcat {
                serial: serial.to_string(),
            },
            "adb",
            ["-s", serial, "logcat"],
        ))
    }

    #[test]
    fn readers_on_the_same_source_deduplicate() {
        let first = simulator_reader("iPhone 15");
        let second = simulator_reader("iPad Air");
        assert_eq!(first, second);

        let readers: HashSet<_> = [first, second].into_iter().collect();
        assert_eq!(readers.len(), 1);
    }

    #[test]
    fn readers_on_distinct_sources_are_kept() {
        let readers: HashSet<_> = [
            logcat_reader("emulator-5554"),
            logcat_reader("emulator-5556"),
            logcat_reader("emulator-5554"),
            simulator_reader("iPhone 15"),
        ]
        .into_iter()
        .collect();
        assert_eq!(readers.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn streams_command_output_line_by_line() {
        let reader = CommandLogReader::new(
            "echo",
            LogSource::Host,
            "sh",
            ["-c", "echo first; echo second"],
        );

        let lines: Vec<String> = smol::block_on(async {
            reader.logs(false).await.unwrap().collect().await
        });
        assert_eq!(lines, vec!["first", "second"]);
    }
}
