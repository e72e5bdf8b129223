//! dailybuild publish - outbound clients for finished runs
//!
//! Implements the `Notifier` and `ArtifactUploader` seams from
//! `dailybuild-core` against real services:
//! - [`SlackNotifier`] posts the run message with `chat.postMessage`
//! - [`S3Uploader`] stores the artifact with a SigV4-signed `PUT`
//!
//! Both are optional. Callers build them only when credentials exist.

pub mod error;
pub mod s3;
pub mod sigv4;
pub mod slack;

pub use error::{PublishError, Result};
pub use s3::{S3Config, S3Uploader, PUBLIC_READ_ACL};
pub use slack::{SlackConfig, SlackNotifier};

/// User agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("dailybuild/", env!("CARGO_PKG_VERSION"));
