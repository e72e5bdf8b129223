//! Seams to the notification channel and object storage.

use std::path::Path;

use async_trait::async_trait;

/// Posts a plain-text message to the team channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, message: &str) -> anyhow::Result<()>;
}

/// Stores a finished artifact under an object key with public-read access.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    async fn upload(&self, path: &Path, key: &str) -> anyhow::Result<()>;
}
