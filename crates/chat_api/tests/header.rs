use chat_api::headers::{
    build_headers, HEADER_ACCEPT, HEADER_AUTHORIZATION, HEADER_CONTENT_TYPE, HEADER_USER_AGENT,
};
use chat_api::{ChatApiConfig, ChatApiError};

#[test]
fn header_map_contains_bearer_and_json_headers() {
    let config = ChatApiConfig::new("  secret-key ", "gpt-4o").insert_header("X-Extra", "value");

    let headers = build_headers(&config).expect("header construction");
    assert_eq!(
        headers.get(HEADER_AUTHORIZATION).expect("authorization header"),
        &"Bearer secret-key".to_owned()
    );
    assert_eq!(
        headers.get(HEADER_ACCEPT).expect("accept"),
        &"application/json".to_owned()
    );
    assert_eq!(
        headers.get(HEADER_CONTENT_TYPE).expect("content-type"),
        &"application/json".to_owned()
    );
    assert_eq!(headers.get("x-extra").expect("custom"), &"value".to_owned());
    assert!(headers
        .get(HEADER_USER_AGENT)
        .expect("user-agent")
        .starts_with("ide-copilot/"));
}

#[test]
fn header_map_prefers_configured_user_agent() {
    let config = ChatApiConfig::new("key", "gpt-4o").with_user_agent("test-agent");
    let headers = build_headers(&config).expect("header construction");
    assert_eq!(
        headers.get(HEADER_USER_AGENT).expect("user-agent"),
        &"test-agent".to_string()
    );
}

#[test]
fn header_map_requires_api_key() {
    let config = ChatApiConfig::new("   ", "gpt-4o");
    assert!(matches!(build_headers(&config), Err(ChatApiError::MissingApiKey)));
}
