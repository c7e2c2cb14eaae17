//! Small helpers for credential generation, hashing, and header parsing.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Hex characters produced for a session token (32 random bytes).
const SESSION_TOKEN_BYTES: usize = 32;
/// Random bytes behind the body of an API key (128 hex characters).
const API_KEY_BYTES: usize = 64;
/// Maximum length of the derived API key prefix.
pub(crate) const API_KEY_PREFIX_MAX: usize = 12;
/// How many characters of a token may appear in logs.
const TOKEN_LOG_PREFIX: usize = 8;

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Create a new session token.
///
/// The raw value is only returned to set the cookie; it doubles as the
/// storage key in the credential store.
pub(crate) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(hex::encode(bytes))
}

/// Generate the random body of an API key: 128 lowercase hex characters.
pub(crate) fn generate_api_key_body() -> Result<String> {
    let mut bytes = [0u8; API_KEY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate API key")?;
    Ok(hex::encode(bytes))
}

/// Derive the cosmetic key prefix from an email local part: lowercase
/// alphabetic characters only, truncated. Empty when nothing survives.
pub(crate) fn derive_key_prefix(email: &str) -> String {
    let local = email.split('@').next().unwrap_or_default();
    local
        .chars()
        .filter(char::is_ascii_alphabetic)
        .map(|ch| ch.to_ascii_lowercase())
        .take(API_KEY_PREFIX_MAX)
        .collect()
}

/// Cheap format check applied before any store access.
pub(crate) fn valid_api_key_format(plaintext: &str) -> bool {
    Regex::new(r"^([a-z]{1,12}_)?[0-9a-f]{128}$").is_ok_and(|regex| regex.is_match(plaintext))
}

/// Hash an API key plaintext (prefix included) for storage and lookup.
pub(crate) fn hash_api_key(plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plaintext.as_bytes());
    hex::encode(hasher.finalize())
}

/// Trailing characters of a key hash, shown for human identification.
pub(crate) fn key_fingerprint(key_hash: &str) -> String {
    let start = key_hash.len().saturating_sub(6);
    key_hash[start..].to_string()
}

/// Constant-time byte comparison; the result does not depend on where the
/// inputs first differ.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Safe-to-log portion of a session token or API key.
pub(crate) fn token_prefix(token: &str) -> &str {
    &token[..token.len().min(TOKEN_LOG_PREFIX)]
}

/// Extract a client IP for rate limiting and session metadata from common
/// proxy headers.
pub(crate) fn extract_client_ip(headers: &axum::http::HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Fingerprint metadata captured when issuing a session: client IP,
/// user agent, and the edge-provided country code when present.
pub(crate) fn session_metadata(headers: &axum::http::HeaderMap) -> super::sessions::SessionMetadata {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    super::sessions::SessionMetadata {
        ip: extract_client_ip(headers),
        user_agent: header_str("user-agent"),
        country: header_str("cf-ipcountry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn session_token_is_64_hex_chars() -> anyhow::Result<()> {
        let token = generate_session_token()?;
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|ch| ch.is_ascii_hexdigit()));
        Ok(())
    }

    #[test]
    fn api_key_body_is_128_hex_chars() -> anyhow::Result<()> {
        let body = generate_api_key_body()?;
        assert_eq!(body.len(), 128);
        assert!(valid_api_key_format(&body));
        Ok(())
    }

    #[test]
    fn derive_key_prefix_strips_and_truncates() {
        assert_eq!(derive_key_prefix("alice@example.com"), "alice");
        assert_eq!(derive_key_prefix("Bob.Smith42@example.com"), "bobsmith");
        assert_eq!(derive_key_prefix("1234@example.com"), "");
        assert_eq!(
            derive_key_prefix("extraordinarily-long@example.com"),
            "extraordinar"
        );
    }

    #[test]
    fn api_key_format_accepts_with_and_without_prefix() {
        let body = "a".repeat(128);
        assert!(valid_api_key_format(&body));
        assert!(valid_api_key_format(&format!("ci_{body}")));
        assert!(!valid_api_key_format(&format!("CI_{body}")));
        assert!(!valid_api_key_format(&format!("toolongprefixx_{body}")));
        assert!(!valid_api_key_format(&"a".repeat(127)));
        assert!(!valid_api_key_format(&format!("_{body}")));
    }

    #[test]
    fn hash_api_key_stable_and_hex() {
        let first = hash_api_key("token");
        let second = hash_api_key("token");
        let different = hash_api_key("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn key_fingerprint_is_hash_tail() {
        let hash = hash_api_key("token");
        let fingerprint = key_fingerprint(&hash);
        assert_eq!(fingerprint.len(), 6);
        assert!(hash.ends_with(&fingerprint));
    }

    #[test]
    fn ct_eq_compares_bytes() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"sane"));
        assert!(!ct_eq(b"short", b"longer"));
    }

    #[test]
    fn token_prefix_bounds_short_tokens() {
        assert_eq!(token_prefix("abcdefghij"), "abcdefgh");
        assert_eq!(token_prefix("abc"), "abc");
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn session_metadata_collects_fingerprint_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        headers.insert("user-agent", HeaderValue::from_static("curl/8.0"));
        headers.insert("cf-ipcountry", HeaderValue::from_static("NL"));
        let metadata = session_metadata(&headers);
        assert_eq!(metadata.ip.as_deref(), Some("9.9.9.9"));
        assert_eq!(metadata.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(metadata.country.as_deref(), Some("NL"));
    }

    #[test]
    fn session_metadata_tolerates_missing_headers() {
        let metadata = session_metadata(&HeaderMap::new());
        assert!(metadata.ip.is_none());
        assert!(metadata.user_agent.is_none());
        assert!(metadata.country.is_none());
    }
}
