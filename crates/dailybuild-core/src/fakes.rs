//! In-memory fakes for the shell and publishing seams (testing only)
//!
//! Provides `ScriptedShell`, `RecordingNotifier`, and `RecordingUploader`
//! that satisfy the trait contracts without spawning processes or touching
//! the network.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::{BuildError, Result};
use crate::publish::{ArtifactUploader, Notifier};
use crate::shell::{OutputEvent, OutputStream, ShellCommand, ShellRunner};

// ---------------------------------------------------------------------------
// ScriptedShell
// ---------------------------------------------------------------------------

type Hook = Arc<dyn Fn(&ShellCommand) + Send + Sync>;

#[derive(Clone)]
enum Reaction {
    Output { lines: Vec<String>, exit_code: i32 },
    SpawnFailure,
    Panic,
}

#[derive(Clone)]
struct Rule {
    needle: String,
    dir_fragment: Option<String>,
    reaction: Reaction,
}

impl Rule {
    fn matches(&self, command: &ShellCommand) -> bool {
        command.line.contains(&self.needle)
            && self
                .dir_fragment
                .as_ref()
                .map_or(true, |frag| command.work_dir.to_string_lossy().contains(frag.as_str()))
    }
}

/// Shell whose output is scripted per command substring.
///
/// The first matching rule decides the output. Commands matching no rule
/// produce no output and exit 0. Every spawn attempt is recorded.
#[derive(Default)]
pub struct ScriptedShell {
    rules: Vec<Rule>,
    hooks: Vec<(String, Hook)>,
    invocations: Mutex<Vec<ShellCommand>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands containing `needle` print `lines` and exit 0.
    pub fn on<I, S>(self, needle: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_with_exit(needle, lines, 0)
    }

    pub fn on_with_exit<I, S>(mut self, needle: &str, lines: I, exit_code: i32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(Rule {
            needle: needle.to_string(),
            dir_fragment: None,
            reaction: Reaction::Output {
                lines: lines.into_iter().map(Into::into).collect(),
                exit_code,
            },
        });
        self
    }

    /// Like [`on`](Self::on) but only for working dirs containing `dir_fragment`.
    pub fn on_in<I, S>(mut self, dir_fragment: &str, needle: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rules.push(Rule {
            needle: needle.to_string(),
            dir_fragment: Some(dir_fragment.to_string()),
            reaction: Reaction::Output {
                lines: lines.into_iter().map(Into::into).collect(),
                exit_code: 0,
            },
        });
        self
    }

    /// Commands containing `needle` cannot be started.
    pub fn fail_to_spawn(mut self, needle: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            dir_fragment: None,
            reaction: Reaction::SpawnFailure,
        });
        self
    }

    /// Commands containing `needle` panic inside `spawn`.
    pub fn panic_on(mut self, needle: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            dir_fragment: None,
            reaction: Reaction::Panic,
        });
        self
    }

    /// Run `hook` whenever a command containing `needle` is spawned, before its
    /// output is produced. Used to emulate side effects such as created files.
    pub fn on_run<F>(mut self, needle: &str, hook: F) -> Self
    where
        F: Fn(&ShellCommand) + Send + Sync + 'static,
    {
        self.hooks.push((needle.to_string(), Arc::new(hook)));
        self
    }

    /// Every command spawned so far, in order.
    pub fn invocations(&self) -> Vec<ShellCommand> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.invocations().into_iter().map(|c| c.line).collect()
    }

    /// Number of spawned commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.line.contains(needle))
            .count()
    }

    /// Number of spawned commands containing `needle` run under a working dir
    /// containing `dir_fragment`.
    pub fn count_in(&self, dir_fragment: &str, needle: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| {
                c.line.contains(needle) && c.work_dir.to_string_lossy().contains(dir_fragment)
            })
            .count()
    }
}

#[async_trait]
impl ShellRunner for ScriptedShell {
    async fn spawn(&self, command: &ShellCommand) -> Result<OutputStream> {
        self.invocations.lock().unwrap().push(command.clone());

        let reaction = self
            .rules
            .iter()
            .find(|rule| rule.matches(command))
            .map(|rule| rule.reaction.clone());

        match reaction {
            Some(Reaction::SpawnFailure) => {
                return Err(BuildError::Spawn {
                    command: command.line.clone(),
                    work_dir: command.work_dir.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
                })
            }
            Some(Reaction::Panic) => panic!("scripted panic for `{}`", command.line),
            _ => {}
        }

        for (needle, hook) in &self.hooks {
            if command.line.contains(needle.as_str()) {
                hook(command);
            }
        }

        let (lines, exit_code) = match reaction {
            Some(Reaction::Output { lines, exit_code }) => (lines, exit_code),
            _ => (Vec::new(), 0),
        };
        let events = lines
            .into_iter()
            .map(OutputEvent::Line)
            .chain(std::iter::once(OutputEvent::Exited(Some(exit_code))));
        Ok(stream::iter(events).boxed())
    }
}

// ---------------------------------------------------------------------------
// RecordingNotifier
// ---------------------------------------------------------------------------

/// Notifier that keeps every posted message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every post fails after being recorded.
    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn post(&self, message: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        if self.fail {
            return Err(anyhow!("channel unavailable"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingUploader
// ---------------------------------------------------------------------------

/// Uploader that records `(path, key)` pairs.
#[derive(Debug, Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<(PathBuf, String)>>,
    fail: bool,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn uploads(&self) -> Vec<(PathBuf, String)> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactUploader for RecordingUploader {
    async fn upload(&self, path: &Path, key: &str) -> anyhow::Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .push((path.to_path_buf(), key.to_string()));
        if self.fail {
            return Err(anyhow!("bucket unreachable"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::drain;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let shell = ScriptedShell::new()
            .on_in("libopenshot-audio", "git fetch", ["[up to date]"])
            .on("git fetch", ["new commits"]);

        let audio = ShellCommand::new("git fetch -v", "/apps/libopenshot-audio-git");
        let mut lines = Vec::new();
        drain(shell.spawn(&audio).await.unwrap(), |l| lines.push(l.to_string())).await;
        assert_eq!(lines, vec!["[up to date]".to_string()]);

        let lib = ShellCommand::new("git fetch -v", "/apps/libopenshot-git");
        let mut lines = Vec::new();
        drain(shell.spawn(&lib).await.unwrap(), |l| lines.push(l.to_string())).await;
        assert_eq!(lines, vec!["new commits".to_string()]);
        assert_eq!(shell.count("git fetch"), 2);
        assert_eq!(shell.count_in("audio", "git fetch"), 1);
    }

    #[tokio::test]
    async fn test_unmatched_command_exits_zero() {
        let shell = ScriptedShell::new();
        let code = drain(
            shell.spawn(&ShellCommand::new("make", "/tmp")).await.unwrap(),
            |_| {},
        )
        .await;
        assert_eq!(code, Some(0));
    }

    #[tokio::test]
    async fn test_hooks_run_on_spawn() {
        let hits = Arc::new(Mutex::new(0));
        let counter = hits.clone();
        let shell = ScriptedShell::new().on_run("freeze", move |_| {
            *counter.lock().unwrap() += 1;
        });
        shell
            .spawn(&ShellCommand::new("python3 freeze.py build", "/tmp"))
            .await
            .unwrap();
        shell.spawn(&ShellCommand::new("make", "/tmp")).await.unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recording_fakes() {
        let notifier = RecordingNotifier::failing();
        assert!(notifier.post("hello").await.is_err());
        assert_eq!(notifier.messages(), vec!["hello".to_string()]);

        let uploader = RecordingUploader::new();
        uploader
            .upload(Path::new("/tmp/a.AppImage"), "linux/a.AppImage")
            .await
            .unwrap();
        assert_eq!(uploader.uploads()[0].1, "linux/a.AppImage");
    }
}
