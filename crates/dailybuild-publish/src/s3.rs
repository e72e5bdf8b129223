//! S3 object upload for finished artifacts.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dailybuild_core::{ArtifactUploader, UploadTarget};
use reqwest::{Client, Url};
use tracing::{debug, info, warn};

use crate::error::{PublishError, Result};
use crate::sigv4::{self, CanonicalRequest, Scope};
use crate::USER_AGENT;

/// Canned ACL applied to every upload so the public URL resolves.
pub const PUBLIC_READ_ACL: &str = "public-read";

/// Credentials plus destination for S3 uploads.
#[derive(Clone)]
pub struct S3Config {
    pub access_key: String,
    pub secret_key: String,
    pub target: UploadTarget,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("target", &self.target)
            .finish()
    }
}

impl S3Config {
    pub fn new(
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
        target: UploadTarget,
    ) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: secret_key.into(),
            target,
        }
    }

    /// `None` unless both keys are present and non-empty.
    pub fn from_keys(
        access_key: Option<String>,
        secret_key: Option<String>,
        target: &UploadTarget,
    ) -> Option<Self> {
        match (non_empty(access_key), non_empty(secret_key)) {
            (Some(access), Some(secret)) => Some(Self::new(access, secret, target.clone())),
            _ => None,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Signed path-style `PUT` client.
pub struct S3Uploader {
    config: S3Config,
    endpoint: Url,
    http_client: Client,
}

impl S3Uploader {
    pub fn new(config: S3Config) -> Result<Self> {
        if config.access_key.is_empty() {
            return Err(PublishError::NotConfigured("S3 access key"));
        }
        if config.secret_key.is_empty() {
            return Err(PublishError::NotConfigured("S3 secret key"));
        }
        let endpoint = Url::parse(&config.target.endpoint)
            .map_err(|e| PublishError::Endpoint(format!("{}: {e}", config.target.endpoint)))?;
        if endpoint.host_str().is_none() {
            return Err(PublishError::Endpoint(format!(
                "{} has no host",
                config.target.endpoint
            )));
        }
        let http_client = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            config,
            endpoint,
            http_client,
        })
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    /// URL path for `key`, bucket first.
    fn object_path(&self, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        sigv4::encode_path(&format!(
            "{base}/{}/{}",
            self.config.target.bucket,
            key.trim_start_matches('/')
        ))
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    /// Upload the file at `path` as `key` with a public-read ACL.
    pub async fn put_file(&self, path: &Path, key: &str) -> Result<()> {
        let body = tokio::fs::read(path).await?;
        info!(
            file = %path.display(),
            bucket = %self.config.target.bucket,
            key = %key,
            bytes = body.len(),
            "uploading to S3"
        );
        self.put_object(key, body, Utc::now()).await
    }

    /// Signed `PUT` of `body`, with `now` as the signing time.
    pub async fn put_object(&self, key: &str, body: Vec<u8>, now: DateTime<Utc>) -> Result<()> {
        let path = self.object_path(key);
        let payload_hash = sigv4::sha256_hex(&body);
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let scope = Scope::new(
            now.format("%Y%m%d").to_string(),
            &self.config.target.region,
            "s3",
        );

        let headers = [
            ("host", self.host_header()),
            ("x-amz-acl", PUBLIC_READ_ACL.to_string()),
            ("x-amz-content-sha256", payload_hash.clone()),
            ("x-amz-date", amz_date.clone()),
        ];
        let request = CanonicalRequest {
            method: "PUT",
            path: &path,
            query: "",
            headers: &headers,
            payload_hash: &payload_hash,
        };
        let authorization = sigv4::authorization(
            &self.config.access_key,
            &self.config.secret_key,
            &scope,
            &amz_date,
            &request,
        )?;

        let mut url = self.endpoint.clone();
        url.set_path(&path);
        debug!(url = %url, "S3 PUT");

        let response = self
            .http_client
            .put(url)
            .header("x-amz-acl", PUBLIC_READ_ACL)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header("authorization", authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, key = %key, "S3 rejected upload");
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!(key = %key, "upload complete");
        Ok(())
    }
}

#[async_trait]
impl ArtifactUploader for S3Uploader {
    async fn upload(&self, path: &Path, key: &str) -> anyhow::Result<()> {
        Ok(self.put_file(path, key).await?)
    }
}
