//! End-of-run upload and notification policy.

use dailybuild_core::{
    render_failure, ArtifactUploader, ErrorAggregator, ErrorKind, ErrorRecord, Notifier,
    Platform, UploadTarget,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::package::ArtifactDescriptor;

/// The final notification of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// `download_url` is `None` when the platform produced no artifact.
    Success { download_url: Option<String> },
    Failure { records: Vec<ErrorRecord> },
}

impl NotificationEvent {
    pub fn render(&self, platform: Platform) -> String {
        match self {
            NotificationEvent::Success {
                download_url: Some(url),
            } => format!("{platform}: Successful build: {url}"),
            NotificationEvent::Success { download_url: None } => {
                format!("{platform}: Successful build server run!")
            }
            NotificationEvent::Failure { records } => render_failure(platform.name(), records),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NotificationEvent::Success { .. })
    }
}

/// What reporting did.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub event: NotificationEvent,
    /// Rendered text, also logged when no channel is configured.
    pub message: String,
    pub uploaded: bool,
    pub posted: bool,
    /// Non-fatal `UploadError`s. Never part of the aggregator.
    pub warnings: Vec<ErrorRecord>,
}

/// Uploads the artifact of a clean run and posts exactly one message.
pub struct UploadNotifier<'a> {
    platform: Platform,
    target: &'a UploadTarget,
    notifier: Option<&'a dyn Notifier>,
    uploader: Option<&'a dyn ArtifactUploader>,
}

impl<'a> UploadNotifier<'a> {
    pub fn new(platform: Platform, target: &'a UploadTarget) -> Self {
        Self {
            platform,
            target,
            notifier: None,
            uploader: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Option<&'a dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_uploader(mut self, uploader: Option<&'a dyn ArtifactUploader>) -> Self {
        self.uploader = uploader;
        self
    }

    /// Decide the final event, upload if appropriate, then notify.
    ///
    /// Nothing here can change the outcome already fixed by `errors`.
    pub async fn report(
        &self,
        errors: &ErrorAggregator,
        artifact: Option<&ArtifactDescriptor>,
    ) -> ReportOutcome {
        let mut warnings = Vec::new();
        let mut uploaded = false;

        let event = if !errors.is_empty() {
            NotificationEvent::Failure {
                records: errors.snapshot().to_vec(),
            }
        } else if let Some(artifact) = artifact {
            let key = self.target.object_key(&artifact.file_name);
            if let Some(uploader) = self.uploader {
                info!(artifact = %artifact.path.display(), key = %key, "uploading artifact");
                match uploader.upload(&artifact.path, &key).await {
                    Ok(()) => uploaded = true,
                    Err(e) => {
                        warn!(key = %key, error = %format!("{e:#}"), "upload failed");
                        warnings.push(ErrorRecord::run_level(
                            ErrorKind::UploadError,
                            format!("upload of {key} failed: {e:#}"),
                        ));
                    }
                }
            } else {
                info!(key = %key, "no storage credentials, skipping upload");
            }
            NotificationEvent::Success {
                download_url: Some(self.target.public_url(&artifact.file_name)),
            }
        } else {
            NotificationEvent::Success { download_url: None }
        };

        let message = event.render(self.platform);
        info!(success = event.is_success(), "notify: {message}");

        let mut posted = false;
        if let Some(notifier) = self.notifier {
            match notifier.post(&message).await {
                Ok(()) => posted = true,
                Err(e) => warn!(error = %format!("{e:#}"), "notification failed"),
            }
        }

        ReportOutcome {
            event,
            message,
            uploaded,
            posted,
            warnings,
        }
    }
}
