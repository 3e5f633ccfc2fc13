//! Shared utility functions for the application

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;

/// Canonicalize a JSON value by sorting object keys recursively, then
/// return the first 12 hex characters of its MD5 digest.
///
/// Used to content-address tool invocations (`tool_name_<hash>.json`) and
/// to derive a stable id for a query string.
pub fn content_hash(value: &Value) -> String {
    let canonical = canonicalize_json(value);
    let digest = md5::compute(canonical.as_bytes());
    hex::encode(digest.0)[..12].to_string()
}

/// Hash a free-text query the same way tool arguments are hashed, so the
/// two id schemes stay interchangeable.
pub fn hash_query(query: &str) -> String {
    content_hash(&Value::String(query.trim().to_string()))
}

fn canonicalize_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap(), canonicalize_json(v)))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonicalize_json).collect();
            format!("[{}]", body.join(","))
        }
        other => other.to_string(),
    }
}

/// Sanitize a string value for safe use in HTTP headers
/// 
/// HTTP header values have restrictions:
/// - Cannot contain control characters (0x00-0x1F)
/// - Cannot contain DEL (0x7F)
/// - Cannot contain newlines, carriage returns, or null bytes
/// - Must be valid UTF-8
/// 
/// # Arguments
/// * `value` - The string to sanitize
/// * `field_name` - Name of the field for error messages
/// 
/// # Returns
/// The sanitized string, or an error if invalid characters are found
pub fn sanitize_for_header(value: &str, field_name: &str) -> Result<String> {
    if value.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    for (index, ch) in value.char_indices() {
        let byte = ch as u8;
        // Check for control characters, DEL, null, and line breaks
        if (byte <= 0x1F) || byte == 0x7F || ch == '\0' || ch == '\r' || ch == '\n' {
            bail!(
                "{} contains invalid character at position {} (byte value: {:#04x}). \
                Control characters, newlines, carriage returns, and null bytes are not allowed.",
                field_name,
                index,
                byte
            );
        }
    }

    Ok(value.to_string())
}

/// Validate an API key can be used in an Authorization header
/// 
/// This combines sanitization with an actual HeaderValue parse attempt
/// to catch any edge cases that simple character filtering might miss.
/// 
/// # Arguments
/// * `api_key` - The API key to validate
/// 
/// # Returns
/// The sanitized API key, or an error if validation fails
pub fn validate_api_key(api_key: &str) -> Result<String> {
    let trimmed = api_key.trim();
    
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        bail!("API key is empty or set to 'none'");
    }

    // First pass: check for obviously invalid characters
    sanitize_for_header(trimmed, "API key")?;

    // Second pass: validate the full header value can be parsed
    let header_value = format!("Bearer {}", trimmed);
    header_value.parse::<reqwest::header::HeaderValue>()
        .with_context(|| {
            format!(
                "API key results in invalid Authorization header. \
                This may indicate the key contains characters not valid for HTTP headers. \
                Key length: {} characters.",
                trimmed.len()
            )
        })?;

    Ok(trimmed.to_string())
}

/// Sanitize a base URL for API requests
/// 
/// Ensures the URL is properly formatted and doesn't contain
/// problematic characters that could cause request failures.
/// 
/// # Arguments
/// * `url` - The URL to sanitize
/// * `field_name` - Name of the field for error messages
/// 
/// # Returns
/// The sanitized URL, or an error if validation fails
pub fn sanitize_base_url(url: &str, field_name: &str) -> Result<String> {
    let trimmed = url.trim();
    
    if trimmed.is_empty() {
        bail!("{} cannot be empty", field_name);
    }

    // Check for URL-encoded characters that shouldn't be present
    // (indicates double-encoding or configuration corruption)
    if trimmed.contains("%2F") || trimmed.contains("%3D") || trimmed.contains("%20") {
        bail!(
            "{} appears to contain URL-encoded characters (e.g., %2F, %3D, %20). \
            This usually indicates double-encoding or configuration corruption. \
            Please verify the URL is not double-encoded.",
            field_name
        );
    }

    // Validate basic URL structure
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        bail!(
            "{} must start with 'http://' or 'https://'. Got: {}",
            field_name,
            trimmed
        );
    }

    Ok(trimmed.to_string())
}
