//! Credential-safe helpers for log output
//!
//! API keys travel in every request header, and backend error bodies sometimes
//! echo them back. Everything that ends up in a `tracing` event goes through
//! one of these helpers first.

/// Characters of a credential left visible by [`obscure_credential`]
const VISIBLE_PREFIX: usize = 5;

/// Default cap applied to response bodies before they are logged
pub const MAX_LOGGED_BODY_CHARS: usize = 512;

/// Obscures a credential string by showing only the first few characters
///
/// # Examples
///
/// ```rust
/// use mediagate::utils::logging::obscure_credential;
///
/// assert_eq!(obscure_credential("fal-0123456789abcdef"), "fal-0***");
/// assert_eq!(obscure_credential("key"), "***");
/// ```
pub fn obscure_credential(credential: &str) -> String {
    let char_count = credential.chars().count();
    if char_count <= VISIBLE_PREFIX {
        "*".repeat(char_count)
    } else {
        format!("{}***", truncate_string(credential, VISIBLE_PREFIX))
    }
}

/// Truncates to at most `max_chars` characters, respecting UTF-8 boundaries
pub fn truncate_string(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Replaces every occurrence of `credential` in `text` with its obscured form,
/// then caps the result at [`MAX_LOGGED_BODY_CHARS`]
///
/// ```rust
/// use mediagate::utils::logging::redact_for_log;
///
/// let body = r#"{"detail": "key fal-0123456789abcdef is invalid"}"#;
/// let safe = redact_for_log(body, "fal-0123456789abcdef");
/// assert!(safe.contains("fal-0***"));
/// assert!(!safe.contains("0123456789abcdef"));
/// ```
pub fn redact_for_log(text: &str, credential: &str) -> String {
    let redacted = if credential.is_empty() {
        text.to_string()
    } else {
        text.replace(credential, &obscure_credential(credential))
    };

    if redacted.chars().count() > MAX_LOGGED_BODY_CHARS {
        format!("{}...", truncate_string(&redacted, MAX_LOGGED_BODY_CHARS))
    } else {
        redacted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obscure_credential() {
        assert_eq!(obscure_credential("supersecretvalue"), "super***");
        assert_eq!(obscure_credential("short"), "*****");
        assert_eq!(obscure_credential(""), "");
        assert_eq!(obscure_credential("🔑🔑🔑🔑🔑🔑"), "🔑🔑🔑🔑🔑***");
    }

    #[test]
    fn test_truncate_string_respects_char_boundaries() {
        assert_eq!(truncate_string("Hello World", 5), "Hello");
        assert_eq!(truncate_string("日本語テキスト", 3), "日本語");
        assert_eq!(truncate_string("Short", 100), "Short");
    }

    #[test]
    fn test_redact_for_log_caps_length() {
        let long = "x".repeat(MAX_LOGGED_BODY_CHARS + 10);
        let safe = redact_for_log(&long, "");
        assert_eq!(safe.chars().count(), MAX_LOGGED_BODY_CHARS + 3);
        assert!(safe.ends_with("..."));
    }

    #[test]
    fn test_redact_for_log_hides_every_occurrence() {
        let safe = redact_for_log("abcdefgh and abcdefgh", "abcdefgh");
        assert_eq!(safe, "abcde*** and abcde***");
    }
}
