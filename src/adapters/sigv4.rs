//! AWS Signature Version 4 for S3 requests.
//!
//! Covers the two forms the relay needs: `Authorization` header signing for
//! direct REST calls, and query-string presigning for retrieval URLs.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SERVICE: &str = "s3";

/// Payload hash used for presigned URLs
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Longest expiry SigV4 accepts for a presigned URL (7 days)
pub const MAX_PRESIGN_SECS: u64 = 604_800;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("presign expiry of {0}s is outside 1..=604800")]
    InvalidExpiry(u64),
}

/// Static AWS credentials
#[derive(Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("session_token", &self.session_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// A request to be signed. `headers` must not include `host`.
#[derive(Debug, Clone)]
pub struct SignableRequest<'a> {
    pub method: &'a str,
    pub host: &'a str,
    /// Already-encoded absolute path, e.g. `/bucket/build/run.zip`
    pub canonical_uri: &'a str,
    pub headers: BTreeMap<String, String>,
    pub payload_sha256: &'a str,
}

/// SigV4 signer for one region
#[derive(Debug, Clone)]
pub struct Signer {
    credentials: Credentials,
    region: String,
}

impl Signer {
    pub fn new(credentials: Credentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
        }
    }

    /// Sign a request, returning the headers to send alongside it
    /// (`x-amz-date`, `x-amz-content-sha256`, optional security token,
    /// and `authorization`).
    pub fn sign_headers(
        &self,
        request: &SignableRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, String)>, SigningError> {
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let mut headers = request.headers.clone();
        headers.insert("host".to_string(), request.host.to_string());
        headers.insert("x-amz-date".to_string(), amz_date.clone());
        headers.insert(
            "x-amz-content-sha256".to_string(),
            request.payload_sha256.to_string(),
        );
        if let Some(token) = &self.credentials.session_token {
            headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            request.method, request.canonical_uri, canonical_headers, signed_headers, request.payload_sha256
        );
        let signature = self.signature(&canonical_request, &amz_date, &date)?;

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM,
            self.credentials.access_key_id,
            self.scope(&date),
            signed_headers,
            signature
        );

        let mut out: Vec<(String, String)> = headers
            .into_iter()
            .filter(|(k, _)| k != "host" && !request.headers.contains_key(k))
            .collect();
        out.push(("authorization".to_string(), authorization));
        Ok(out)
    }

    /// Build the query string of a presigned `GET`, including the signature.
    pub fn presign_query(
        &self,
        host: &str,
        canonical_uri: &str,
        expires: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, SigningError> {
        let expires_secs = expires.as_secs();
        if expires_secs == 0 || expires_secs > MAX_PRESIGN_SECS {
            return Err(SigningError::InvalidExpiry(expires_secs));
        }

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let credential = format!("{}/{}", self.credentials.access_key_id, self.scope(&date));

        let mut params: BTreeMap<String, String> = BTreeMap::new();
        params.insert("X-Amz-Algorithm".into(), ALGORITHM.into());
        params.insert("X-Amz-Credential".into(), credential);
        params.insert("X-Amz-Date".into(), amz_date.clone());
        params.insert("X-Amz-Expires".into(), expires_secs.to_string());
        params.insert("X-Amz-SignedHeaders".into(), "host".into());
        if let Some(token) = &self.credentials.session_token {
            params.insert("X-Amz-Security-Token".into(), token.clone());
        }

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", uri_encode(k, true), uri_encode(v, true)))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_request = format!(
            "GET\n{}\n{}\nhost:{}\n\nhost\n{}",
            canonical_uri, query, host, UNSIGNED_PAYLOAD
        );
        let signature = self.signature(&canonical_request, &amz_date, &date)?;

        Ok(format!("{}&X-Amz-Signature={}", query, signature))
    }

    fn scope(&self, date: &str) -> String {
        format!("{}/{}/{}/aws4_request", date, self.region, SERVICE)
    }

    fn signature(
        &self,
        canonical_request: &str,
        amz_date: &str,
        date: &str,
    ) -> Result<String, SigningError> {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            self.scope(date),
            sha256_hex(canonical_request.as_bytes())
        );

        let secret = format!("AWS4{}", self.credentials.secret_access_key);
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, SERVICE.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;

        Ok(hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| SigningError::InvalidKey(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Hex-encoded SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Percent-encode per SigV4 rules: unreserved characters pass through,
/// `/` is kept only when `encode_slash` is false.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
