//! HMAC-signed, time-limited object URLs.
//!
//! URLs look like
//! `{base}/objects/{key}?op=get&expires=<unix>&disposition=inline&signature=<b64>`.
//! Write URLs use `op=put` and additionally bind the content type.

use super::object_store::{GatewayError, GatewayResult};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignedOp {
    Get,
    Put,
}

impl SignedOp {
    fn as_str(self) -> &'static str {
        match self {
            SignedOp::Get => "get",
            SignedOp::Put => "put",
        }
    }
}

/// Query parameters carried by a signed URL.
#[derive(Debug, Clone, Deserialize)]
pub struct SignedQuery {
    pub op: SignedOp,
    pub expires: i64,
    pub disposition: Option<String>,
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
    pub signature: String,
}

impl SignedQuery {
    pub fn force_download(&self) -> bool {
        self.disposition.as_deref() == Some("attachment")
    }
}

pub struct UrlSigner {
    base_url: String,
    secret: Vec<u8>,
}

impl UrlSigner {
    pub fn new(base_url: impl Into<String>, secret: impl AsRef<[u8]>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Unsigned location of an object, as reported by `put`.
    pub fn location(&self, key: &str) -> String {
        format!("{}/objects/{}", self.base_url, key)
    }

    pub fn sign_read(
        &self,
        key: &str,
        ttl: Duration,
        force_download: bool,
        now: DateTime<Utc>,
    ) -> GatewayResult<String> {
        let expires = expiry(now, ttl)?;
        let disposition = if force_download { "attachment" } else { "inline" };
        let signature = self.signature(SignedOp::Get, key, expires, disposition)?;
        Ok(format!(
            "{}?op=get&expires={}&disposition={}&signature={}",
            self.location(key),
            expires,
            disposition,
            signature
        ))
    }

    pub fn sign_write(
        &self,
        key: &str,
        content_type: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> GatewayResult<String> {
        let expires = expiry(now, ttl)?;
        let signature = self.signature(SignedOp::Put, key, expires, content_type)?;
        Ok(format!(
            "{}?op=put&expires={}&contentType={}&signature={}",
            self.location(key),
            expires,
            urlencoding::encode(content_type),
            signature
        ))
    }

    /// Check a presented query against `key` and `op` at time `now`.
    pub fn verify(
        &self,
        key: &str,
        op: SignedOp,
        query: &SignedQuery,
        now: DateTime<Utc>,
    ) -> GatewayResult<()> {
        if query.op != op {
            return Err(GatewayError::Signature("operation mismatch".into()));
        }
        if now.timestamp() > query.expires {
            return Err(GatewayError::Signature("url expired".into()));
        }
        let bound = match op {
            SignedOp::Get => query.disposition.as_deref().unwrap_or("inline"),
            SignedOp::Put => query.content_type.as_deref().unwrap_or(""),
        };
        let presented = general_purpose::URL_SAFE_NO_PAD
            .decode(&query.signature)
            .map_err(|_| GatewayError::Signature("malformed signature".into()))?;
        let mut mac = self.mac()?;
        mac.update(canonical(op, key, query.expires, bound).as_bytes());
        mac.verify_slice(&presented)
            .map_err(|_| GatewayError::Signature("signature mismatch".into()))
    }

    fn signature(
        &self,
        op: SignedOp,
        key: &str,
        expires: i64,
        bound: &str,
    ) -> GatewayResult<String> {
        let mut mac = self.mac()?;
        mac.update(canonical(op, key, expires, bound).as_bytes());
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> GatewayResult<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| GatewayError::Signature(e.to_string()))
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> GatewayResult<i64> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(|secs| now.timestamp().checked_add(secs))
        .ok_or_else(|| GatewayError::Signature("url lifetime out of range".into()))
}

fn canonical(op: SignedOp, key: &str, expires: i64, bound: &str) -> String {
    format!("{}\n{}\n{}\n{}", op.as_str(), key, expires, bound)
}
