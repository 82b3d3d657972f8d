//! Input validation utilities to prevent panics and security vulnerabilities:
//! panic-induced crashes on bad external input, OOM via unbounded strings,
//! and command injection through RTSP URLs handed to a decoder subprocess.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Maximum length for URIs (RTSP, HTTP, etc.)
pub const MAX_URI_LENGTH: usize = 4096;

/// Get current Unix timestamp in seconds, safely handling clock errors.
///
/// Returns `Ok(timestamp)` on success, or logs a warning and returns 0 on
/// clock issues.
pub fn safe_unix_timestamp() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_secs(),
        Err(e) => {
            tracing::warn!(
                error = %e,
                "System clock is before UNIX epoch (1970-01-01), using timestamp 0"
            );
            0
        }
    }
}

/// Get current Unix timestamp, returning Result for explicit error handling.
pub fn unix_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .context("System clock is before UNIX epoch")
}

/// Validate string length against a maximum.
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string.
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate URI (RTSP, HTTP, etc.) before it's handed to a subprocess or client.
pub fn validate_uri(uri: &str, field_name: &str) -> Result<()> {
    validate_non_empty(uri, field_name)?;
    validate_length(uri, MAX_URI_LENGTH, field_name)?;

    // Prevent shell metacharacters (command injection)
    let dangerous_chars = ['`', '$', ';', '|', '&', '\n', '\r'];
    if uri.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!(
            "{} contains dangerous shell metacharacters",
            field_name
        ));
    }

    Ok(())
}

/// Validate port number (1-65535).
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("Port number must be between 1 and 65535, got 0"));
    }
    Ok(())
}

/// Validate positive duration in seconds.
pub fn validate_duration_secs(secs: u64, field_name: &str) -> Result<()> {
    if secs == 0 {
        return Err(anyhow!("{} must be greater than 0", field_name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_unix_timestamp() {
        let ts = safe_unix_timestamp();
        assert!(ts > 1700000000); // After 2023
    }

    #[test]
    fn test_validate_uri() {
        assert!(validate_uri("rtsp://camera.local/stream", "uri").is_ok());
        assert!(validate_uri("http://example.com:8080/path", "uri").is_ok());

        assert!(validate_uri("rtsp://cam`whoami`.local", "uri").is_err());
        assert!(validate_uri("http://example.com;rm -rf /", "uri").is_err());
        assert!(validate_uri("rtsp://cam$(id).local", "uri").is_err());
        assert!(validate_uri(&"a".repeat(5000), "uri").is_err());
    }

    #[test]
    fn test_validate_port() {
        assert!(validate_port(80).is_ok());
        assert!(validate_port(65535).is_ok());
        assert!(validate_port(0).is_err());
    }

    #[test]
    fn test_validate_duration_secs() {
        assert!(validate_duration_secs(1, "frame_interval_secs").is_ok());
        assert!(validate_duration_secs(0, "frame_interval_secs").is_err());
    }
}
