use chat_api::retry::*;

#[test]
fn retry_http_status_is_retryable() {
    for status in [408, 409, 429, 500, 502, 503, 504] {
        assert!(is_retryable_http_error(status, ""), "status {status}");
    }
    assert!(!is_retryable_http_error(400, "invalid request"));
    assert!(!is_retryable_http_error(401, "bad key"));
}

#[test]
fn retry_http_error_pattern_is_retryable() {
    assert!(is_retryable_http_error(400, "rate limit exceeded"));
    assert!(is_retryable_http_error(400, "connection refused"));
    assert!(is_retryable_http_error(400, "The server is overloaded"));
}

#[test]
fn quota_exhaustion_is_detected() {
    assert!(is_quota_exhausted(r#"{"code":"insufficient_quota"}"#));
    assert!(is_quota_exhausted("You exceeded your current quota, please check your plan"));
    assert!(!is_quota_exhausted("rate limit reached"));
}
