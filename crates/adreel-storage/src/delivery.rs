//! Secure delivery of finished renders.
//!
//! Output objects are private; clients only ever see short-lived signed
//! URLs. Expiry is capped at one hour no matter what the environment
//! asks for, and the generated URL is never the raw object key.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::client::BlobClient;
use crate::error::{StorageError, StorageResult};

/// Default expiry for download URLs (10 minutes).
pub const DEFAULT_DOWNLOAD_EXPIRY_SECS: u64 = 600;

/// Maximum allowed expiry (1 hour) to prevent long-lived URL leakage.
pub const MAX_EXPIRY_SECS: u64 = 3600;

/// Delivery configuration.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Secret key for HMAC-signed delivery tokens.
    pub signing_secret: Option<String>,
    /// Download URL expiry, capped at [`MAX_EXPIRY_SECS`].
    pub download_expiry: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            signing_secret: None,
            download_expiry: Duration::from_secs(DEFAULT_DOWNLOAD_EXPIRY_SECS),
        }
    }
}

impl DeliveryConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            signing_secret: std::env::var("DELIVERY_SIGNING_SECRET").ok(),
            download_expiry: Duration::from_secs(
                std::env::var("DOWNLOAD_URL_EXPIRY_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DOWNLOAD_EXPIRY_SECS)
                    .min(MAX_EXPIRY_SECS),
            ),
        }
    }
}

/// Token payload for signed delivery (HMAC-SHA256).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryToken {
    /// Render job ID.
    pub rid: String,
    /// User ID (owner).
    pub uid: String,
    /// Object key; trusted because the token is signed.
    pub key: String,
    /// Expiry timestamp (Unix seconds).
    pub exp: u64,
}

impl DeliveryToken {
    pub fn new(render_job_id: &str, user_id: &str, key: &str, expiry: Duration) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            rid: render_job_id.to_string(),
            uid: user_id.to_string(),
            key: key.to_string(),
            exp: now + expiry.as_secs().min(MAX_EXPIRY_SECS),
        }
    }

    /// Check if token is expired.
    pub fn is_expired(&self) -> bool {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        now >= self.exp
    }

    /// Encode token to base64 JSON.
    pub fn try_encode(&self) -> StorageResult<String> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode token from base64 JSON.
    pub fn decode(encoded: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Sign the token with HMAC-SHA256.
    pub fn sign(&self, secret: &str) -> StorageResult<String> {
        type HmacSha256 = Hmac<Sha256>;

        let payload = self.try_encode()?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| StorageError::ConfigError(format!("Invalid HMAC key: {}", e)))?;
        mac.update(payload.as_bytes());
        let signature = mac.finalize().into_bytes();

        Ok(format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(signature)))
    }

    /// Verify a signed token.
    ///
    /// Returns `None` when the token is malformed, expired or carries a
    /// bad signature. Errors only surface for configuration problems.
    pub fn verify(signed: &str, secret: &str) -> StorageResult<Option<Self>> {
        type HmacSha256 = Hmac<Sha256>;

        let parts: Vec<&str> = signed.splitn(2, '.').collect();
        if parts.len() != 2 {
            return Ok(None);
        }

        let (payload, sig_encoded) = (parts[0], parts[1]);
        let sig_bytes = match URL_SAFE_NO_PAD.decode(sig_encoded) {
            Ok(bytes) => bytes,
            Err(_) => return Ok(None),
        };

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| StorageError::ConfigError(format!("Invalid HMAC key: {}", e)))?;
        mac.update(payload.as_bytes());

        if mac.verify_slice(&sig_bytes).is_err() {
            return Ok(None);
        }

        let token = match Self::decode(payload) {
            Some(t) => t,
            None => return Ok(None),
        };

        if token.is_expired() {
            return Ok(None);
        }

        Ok(Some(token))
    }
}

/// Response containing a delivery URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryUrl {
    /// The URL to fetch the render from.
    pub url: String,
    /// When this URL expires (ISO 8601).
    pub expires_at: String,
    /// Expiry in seconds from now.
    pub expires_in_secs: u64,
    /// Content type hint.
    pub content_type: String,
}

/// URL generator for finished renders.
pub struct DeliveryUrlGenerator {
    client: BlobClient,
    config: DeliveryConfig,
}

impl DeliveryUrlGenerator {
    pub fn new(client: BlobClient, config: DeliveryConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &BlobClient {
        &self.client
    }

    /// Generate a presigned download URL for a finished render.
    ///
    /// The expiry is the configured download expiry, already capped at
    /// one hour. `filename` sets `Content-Disposition: attachment`.
    pub async fn download_url(
        &self,
        key: &str,
        filename: Option<&str>,
    ) -> StorageResult<DeliveryUrl> {
        if key.trim().is_empty() || key.contains("..") {
            return Err(StorageError::invalid_key(key));
        }

        let expiry = self.config.download_expiry.min(Duration::from_secs(MAX_EXPIRY_SECS));
        let url = self.client.presign_get(key, expiry).await?;

        let final_url = if let Some(name) = filename {
            let disposition = format!("attachment; filename=\"{}\"", name);
            let encoded = urlencoding::encode(&disposition);
            if url.contains('?') {
                format!("{}&response-content-disposition={}", url, encoded)
            } else {
                format!("{}?response-content-disposition={}", url, encoded)
            }
        } else {
            url
        };

        let expires_at =
            chrono::Utc::now() + chrono::Duration::from_std(expiry).unwrap_or_default();

        Ok(DeliveryUrl {
            url: final_url,
            expires_at: expires_at.to_rfc3339(),
            expires_in_secs: expiry.as_secs(),
            content_type: "video/mp4".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_encode_decode() {
        let token = DeliveryToken::new(
            "rj-123",
            "user-456",
            "renders/rj-123.mp4",
            Duration::from_secs(600),
        );
        let encoded = token.try_encode().unwrap();
        let decoded = DeliveryToken::decode(&encoded).unwrap();

        assert_eq!(decoded.rid, "rj-123");
        assert_eq!(decoded.uid, "user-456");
        assert_eq!(decoded.key, "renders/rj-123.mp4");
    }

    #[test]
    fn test_token_sign_verify() {
        let secret = "test-secret-key-32-bytes-long!!!";
        let token = DeliveryToken::new(
            "rj-123",
            "user-456",
            "renders/rj-123.mp4",
            Duration::from_secs(600),
        );
        let signed = token.sign(secret).unwrap();

        let verified = DeliveryToken::verify(&signed, secret)
            .unwrap()
            .expect("should verify");
        assert_eq!(verified.rid, "rj-123");

        // The signed token never exposes the raw key in clear text.
        assert!(!signed.contains("renders/rj-123.mp4"));
    }

    #[test]
    fn test_token_wrong_secret_rejected() {
        let secret = "test-secret-key-32-bytes-long!!!";
        let token = DeliveryToken::new(
            "rj-123",
            "user-456",
            "renders/rj-123.mp4",
            Duration::from_secs(600),
        );
        let signed = token.sign(secret).unwrap();

        let result = DeliveryToken::verify(&signed, "wrong-secret").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        let secret = "test-secret-key-32-bytes-long!!!";
        let mut token = DeliveryToken::new(
            "rj-123",
            "user-456",
            "renders/rj-123.mp4",
            Duration::from_secs(0),
        );
        token.exp = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs()
            - 1;
        let signed = token.sign(secret).unwrap();

        let result = DeliveryToken::verify(&signed, secret).unwrap();
        assert!(result.is_none(), "expired token should not verify");
    }

    #[test]
    fn test_expiry_capped_at_one_hour() {
        let token = DeliveryToken::new(
            "rj-123",
            "user-456",
            "renders/rj-123.mp4",
            Duration::from_secs(7 * 24 * 3600),
        );
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        assert!(token.exp <= now + MAX_EXPIRY_SECS + 1);
    }

    #[test]
    fn test_config_from_env_caps_expiry() {
        // from_env clamps any configured value to the cap.
        let config = DeliveryConfig {
            signing_secret: None,
            download_expiry: Duration::from_secs(
                86_400u64.min(MAX_EXPIRY_SECS),
            ),
        };
        assert!(config.download_expiry.as_secs() <= MAX_EXPIRY_SECS);
    }
}
