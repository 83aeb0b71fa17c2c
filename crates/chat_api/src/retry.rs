use std::sync::OnceLock;

use regex::Regex;

fn retryable_status_regex() -> &'static Regex {
    static CACHED: OnceLock<Regex> = OnceLock::new();
    CACHED.get_or_init(|| {
        Regex::new(r"(?i)rate.?limit|overloaded|service.?unavailable|upstream.?connect|connection.?refused|timed?.?out")
            .unwrap_or_else(|error| unreachable!("retry pattern: {error}"))
    })
}

/// Error text retry policy for transient failures and retryable statuses.
pub fn is_retryable_http_error(status: u16, error_text: &str) -> bool {
    matches!(status, 408 | 409 | 429 | 500 | 502 | 503 | 504)
        || retryable_status_regex().is_match(error_text)
}

/// Quota exhaustion is reported as 429 by most providers but never clears on retry.
pub fn is_quota_exhausted(error_text: &str) -> bool {
    let lowered = error_text.to_ascii_lowercase();
    lowered.contains("insufficient_quota") || lowered.contains("exceeded your current quota")
}
