//! External command execution with lazily streamed, merged output.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{BuildError, Result};
use crate::profile::ShellConfig;

/// A command line to run in a working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub line: String,
    pub work_dir: PathBuf,
}

impl ShellCommand {
    pub fn new(line: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            line: line.into(),
            work_dir: work_dir.into(),
        }
    }
}

/// One item of a running command's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// A line from stdout or stderr, without its terminator.
    Line(String),
    /// Always the last item. `None` when killed by a signal.
    Exited(Option<i32>),
}

/// Lines are produced as the child writes them.
pub type OutputStream = BoxStream<'static, OutputEvent>;

/// Starts external commands.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Start `command`. Errors only when the process cannot be started.
    async fn spawn(&self, command: &ShellCommand) -> Result<OutputStream>;
}

/// Runs command lines through the host shell (`sh -c` / `cmd /C`).
#[derive(Debug, Clone)]
pub struct SystemShell {
    config: ShellConfig,
}

impl SystemShell {
    pub fn new(config: ShellConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ShellRunner for SystemShell {
    async fn spawn(&self, command: &ShellCommand) -> Result<OutputStream> {
        let spawn_error = |source: std::io::Error| BuildError::Spawn {
            command: command.line.clone(),
            work_dir: command.work_dir.clone(),
            source,
        };

        if !command.work_dir.is_dir() {
            return Err(spawn_error(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "working directory does not exist",
            )));
        }

        debug!(command = %command.line, work_dir = %command.work_dir.display(), "spawning");

        let mut child = Command::new(&self.config.program)
            .arg(&self.config.flag)
            .arg(&command.line)
            .current_dir(&command.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_error)?;

        let stdout = child.stdout.take().ok_or_else(|| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stdout not captured",
            ))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            spawn_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "stderr not captured",
            ))
        })?;

        let merged = stream::select(lines_of(stdout), lines_of(stderr)).map(OutputEvent::Line);
        let exit = stream::once(async move {
            let mut child = child;
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(error = %e, "failed to wait for child");
                    None
                }
            }
        })
        .map(OutputEvent::Exited);

        Ok(merged.chain(exit).boxed())
    }
}

/// Newline-split, lossily decoded lines of `reader`.
fn lines_of<R>(reader: R) -> BoxStream<'static, String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    stream::unfold(BufReader::new(reader).split(b'\n'), |mut segments| async move {
        match segments.next_segment().await {
            Ok(Some(bytes)) => {
                let line = String::from_utf8_lossy(&bytes)
                    .trim_end_matches('\r')
                    .to_string();
                Some((line, segments))
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "output read failed");
                None
            }
        }
    })
    .boxed()
}

/// Consume `output` to the end, handing each line to `on_line`.
///
/// Returns the exit code from the final [`OutputEvent::Exited`].
pub async fn drain<F>(mut output: OutputStream, mut on_line: F) -> Option<i32>
where
    F: FnMut(&str),
{
    let mut exit_code = None;
    while let Some(event) = output.next().await {
        match event {
            OutputEvent::Line(line) => on_line(&line),
            OutputEvent::Exited(code) => exit_code = code,
        }
    }
    exit_code
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::profile::Platform;

    fn shell() -> SystemShell {
        SystemShell::new(ShellConfig::for_platform(Platform::Linux))
    }

    #[tokio::test]
    async fn test_merges_stdout_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ShellCommand::new("echo out; echo err 1>&2; exit 3", dir.path());

        let output = shell().spawn(&cmd).await.expect("spawn failed");
        let mut lines = Vec::new();
        let code = drain(output, |l| lines.push(l.to_string())).await;

        assert_eq!(code, Some(3));
        assert!(lines.contains(&"out".to_string()));
        assert!(lines.contains(&"err".to_string()));
    }

    #[tokio::test]
    async fn test_runs_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let cmd = ShellCommand::new("ls", dir.path());

        let output = shell().spawn(&cmd).await.unwrap();
        let mut lines = Vec::new();
        drain(output, |l| lines.push(l.to_string())).await;
        assert_eq!(lines, vec!["marker.txt".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_work_dir_is_spawn_error() {
        let cmd = ShellCommand::new("true", "/nonexistent/dailybuild/workdir");
        let err = shell().spawn(&cmd).await.err().expect("should fail");
        assert!(matches!(err, BuildError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_exit_event_is_last() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ShellCommand::new("printf 'a\\nb\\n'", dir.path());
        let events: Vec<OutputEvent> = shell().spawn(&cmd).await.unwrap().collect().await;
        assert_eq!(
            events,
            vec![
                OutputEvent::Line("a".to_string()),
                OutputEvent::Line("b".to_string()),
                OutputEvent::Exited(Some(0)),
            ]
        );
    }
}
