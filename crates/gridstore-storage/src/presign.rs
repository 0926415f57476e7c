//! Presigned URL format shared by the bundled providers
//!
//! `{scheme}://{authority}/{get|put}?key={key}&expires={unix secs}&signature={b64 mac}`
//!
//! The signature is an HMAC-SHA256 over the operation, key and expiry, keyed
//! with the provider secret. Real object stores sign with their own scheme.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use gridstore_core::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use url::Url;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignedOperation {
    Get,
    Put,
}

impl PresignedOperation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
        }
    }
}

/// Parsed presigned URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    pub scheme: String,
    pub authority: String,
    pub operation: PresignedOperation,
    pub key: String,
    pub expires_at: i64,
    pub signature: String,
}

impl PresignedUrl {
    pub fn sign(
        scheme: &str,
        authority: &str,
        secret: &str,
        operation: PresignedOperation,
        key: &str,
        expires: Duration,
    ) -> Result<Self> {
        let ttl = gridstore_core::record::to_chrono(expires)?;
        let expires_at = (Utc::now() + ttl).timestamp();
        let mac = keyed_mac(secret, operation, key, expires_at)?;
        Ok(Self {
            scheme: scheme.to_string(),
            authority: authority.to_string(),
            operation,
            key: key.to_string(),
            expires_at,
            signature: URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()),
        })
    }

    pub fn parse(url: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::provider(format!("invalid presigned URL: {}", reason));

        let parsed = Url::parse(url).map_err(|err| invalid(&err.to_string()))?;
        let authority = parsed
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing authority"))?;
        let operation = match parsed.path() {
            "/get" => PresignedOperation::Get,
            "/put" => PresignedOperation::Put,
            _ => return Err(invalid("unknown operation")),
        };

        let mut key = None;
        let mut expires_at = None;
        let mut signature = None;
        for (name, value) in parsed.query_pairs() {
            match name.as_ref() {
                "key" => key = Some(value.into_owned()),
                "expires" => {
                    expires_at = Some(value.parse::<i64>().map_err(|_| invalid("bad expiry"))?);
                }
                "signature" => signature = Some(value.into_owned()),
                _ => return Err(invalid("unexpected query parameter")),
            }
        }

        Ok(Self {
            scheme: parsed.scheme().to_string(),
            authority: authority.to_string(),
            operation,
            key: key.ok_or_else(|| invalid("missing key"))?,
            expires_at: expires_at.ok_or_else(|| invalid("missing expiry"))?,
            signature: signature.ok_or_else(|| invalid("missing signature"))?,
        })
    }

    /// Check signature, operation and expiry against `now`
    pub fn verify(
        &self,
        secret: &str,
        operation: PresignedOperation,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.operation != operation {
            return Err(Error::provider("presigned URL was issued for another operation"));
        }
        let mismatch = || Error::provider("presigned URL signature mismatch");
        let provided = URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|_| mismatch())?;
        keyed_mac(secret, self.operation, &self.key, self.expires_at)?
            .verify_slice(&provided)
            .map_err(|_| mismatch())?;
        if now.timestamp() >= self.expires_at {
            return Err(Error::provider("presigned URL has expired"));
        }
        Ok(())
    }

    pub fn to_url(&self) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("key", &self.key)
            .append_pair("expires", &self.expires_at.to_string())
            .append_pair("signature", &self.signature)
            .finish();
        format!(
            "{}://{}/{}?{}",
            self.scheme,
            self.authority,
            self.operation.as_str(),
            query
        )
    }
}

fn keyed_mac(
    secret: &str,
    operation: PresignedOperation,
    key: &str,
    expires_at: i64,
) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| Error::provider(format!("invalid presign secret: {}", err)))?;
    mac.update(operation.as_str().as_bytes());
    mac.update(b"\n");
    mac.update(key.as_bytes());
    mac.update(b"\n");
    mac.update(expires_at.to_string().as_bytes());
    Ok(mac)
}
