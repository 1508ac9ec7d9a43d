//! Input validation and sanitization for user-supplied product URLs.
//!
//! Product URLs are fetched server-side by the content generator, so
//! anything targeting internal addresses or cloud metadata endpoints is
//! rejected before it reaches that layer.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;
use url::Url;

/// Maximum URL length to prevent DoS attacks.
const MAX_URL_LENGTH: usize = 2048;

/// Maximum project title length.
pub const MAX_TITLE_LENGTH: usize = 500;

/// Maximum checkpoint name length.
pub const MAX_CHECKPOINT_NAME_LENGTH: usize = 200;

/// Blocked URL patterns (internal IPs, metadata endpoints).
static BLOCKED_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"^https?://127\.").unwrap(),
        Regex::new(r"^https?://localhost").unwrap(),
        Regex::new(r"^https?://10\.").unwrap(),
        Regex::new(r"^https?://172\.(1[6-9]|2[0-9]|3[0-1])\.").unwrap(),
        Regex::new(r"^https?://192\.168\.").unwrap(),
        Regex::new(r"^https?://169\.254\.").unwrap(),
        Regex::new(r"^https?://\[::1\]").unwrap(),
        Regex::new(r"^https?://\[fd").unwrap(),
        Regex::new(r"^https?://\[fe80").unwrap(),
        Regex::new(r"^https?://metadata\.").unwrap(),
        Regex::new(r"^https?://169\.254\.169\.254").unwrap(),
        Regex::new(r"^https?://metadata\.google\.internal").unwrap(),
    ]
});

/// Result of product URL validation.
#[derive(Debug)]
pub enum UrlValidationResult {
    /// URL is valid.
    Valid(String),
    /// URL is malformed or uses an unsupported protocol.
    Invalid(String),
    /// URL matches a blocked pattern (e.g., internal IPs).
    Blocked(String),
    /// URL exceeds maximum length.
    TooLong,
}

impl UrlValidationResult {
    /// Convert to Result for easy error handling.
    pub fn into_result(self) -> Result<String, String> {
        match self {
            Self::Valid(url) => Ok(url),
            Self::Invalid(msg) => Err(msg),
            Self::Blocked(reason) => Err(reason),
            Self::TooLong => Err(format!(
                "URL exceeds maximum length of {} characters",
                MAX_URL_LENGTH
            )),
        }
    }
}

/// Validate a product page URL before handing it to the content generator.
///
/// This function performs:
/// - Length validation
/// - Protocol validation (only http/https)
/// - Blocked pattern check (internal IPs, metadata endpoints)
pub fn validate_product_url(url: &str) -> UrlValidationResult {
    // Check length
    if url.len() > MAX_URL_LENGTH {
        return UrlValidationResult::TooLong;
    }

    // Trim and normalize
    let url = url.trim();
    if url.is_empty() {
        return UrlValidationResult::Invalid("URL cannot be empty".to_string());
    }

    // Parse URL
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => return UrlValidationResult::Invalid(format!("Invalid URL format: {}", e)),
    };

    // Check protocol
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return UrlValidationResult::Invalid(format!(
                "Invalid protocol '{}'. Only HTTP and HTTPS are allowed.",
                scheme
            ))
        }
    }

    // Check for blocked patterns (internal IPs, metadata endpoints)
    for pattern in BLOCKED_PATTERNS.iter() {
        if pattern.is_match(url) {
            warn!(url = %url, "Blocked URL pattern detected");
            return UrlValidationResult::Blocked(
                "URL appears to target an internal or restricted endpoint".to_string(),
            );
        }
    }

    if parsed.host_str().is_none() {
        return UrlValidationResult::Invalid("URL must have a valid domain".to_string());
    }

    UrlValidationResult::Valid(url.to_string())
}

/// Sanitize a user-provided title for safe storage.
pub fn sanitize_title(input: &str) -> String {
    let trimmed = input.trim();
    trimmed
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_TITLE_LENGTH)
        .collect()
}

/// Sanitize a checkpoint name for safe storage.
pub fn sanitize_checkpoint_name(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_CHECKPOINT_NAME_LENGTH)
        .collect()
}
