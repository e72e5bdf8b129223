//! AWS Signature Version 4 request signing.
//!
//! Only the pieces needed for single-shot S3 `PUT` requests: canonical
//! request, string to sign, signing key derivation and the final
//! `Authorization` header value.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::error::{PublishError, Result};

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| PublishError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Credential scope, e.g. `20150830/us-east-1/s3/aws4_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    /// `YYYYMMDD`
    pub date: String,
    pub region: String,
    pub service: String,
}

impl Scope {
    pub fn new(
        date: impl Into<String>,
        region: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            region: region.into(),
            service: service.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{}/{}/{}/aws4_request",
            self.date, self.region, self.service
        )
    }
}

/// Derive the per-day signing key.
pub fn signing_key(secret_key: &str, scope: &Scope) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), scope.date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, scope.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, scope.service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode a URI path, keeping `/` separators.
pub fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'/' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// A request reduced to what gets signed.
///
/// Header names must be lowercase and sorted; values are trimmed.
#[derive(Debug, Clone)]
pub struct CanonicalRequest<'a> {
    pub method: &'a str,
    /// Already encoded with [`encode_path`].
    pub path: &'a str,
    pub query: &'a str,
    pub headers: &'a [(&'a str, String)],
    pub payload_hash: &'a str,
}

impl CanonicalRequest<'_> {
    pub fn signed_headers(&self) -> String {
        self.headers
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn render(&self) -> String {
        let mut canonical_headers = String::new();
        for (name, value) in self.headers {
            canonical_headers.push_str(name);
            canonical_headers.push(':');
            canonical_headers.push_str(value.trim());
            canonical_headers.push('\n');
        }
        format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            self.method,
            self.path,
            self.query,
            canonical_headers,
            self.signed_headers(),
            self.payload_hash
        )
    }
}

pub fn string_to_sign(amz_date: &str, scope: &Scope, canonical_request: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{}\n{}",
        scope.render(),
        sha256_hex(canonical_request.as_bytes())
    )
}

/// Hex signature of `string_to_sign`.
pub fn signature(secret_key: &str, scope: &Scope, string_to_sign: &str) -> Result<String> {
    let key = signing_key(secret_key, scope)?;
    Ok(hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?))
}

/// Sign `request` and return the `Authorization` header value.
pub fn authorization(
    access_key: &str,
    secret_key: &str,
    scope: &Scope,
    amz_date: &str,
    request: &CanonicalRequest<'_>,
) -> Result<String> {
    let to_sign = string_to_sign(amz_date, scope, &request.render());
    let sig = signature(secret_key, scope, &to_sign)?;
    Ok(format!(
        "{ALGORITHM} Credential={access_key}/{}, SignedHeaders={}, Signature={sig}",
        scope.render(),
        request.signed_headers()
    ))
}
