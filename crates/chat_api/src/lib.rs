//! Transport-only client primitives for OpenAI-compatible chat completion endpoints.
//!
//! This crate owns request building, response parsing and failure
//! classification for one `POST .../chat/completions` exchange. It performs a
//! single attempt per call; callers own the retry loop and use
//! [`ChatApiError::is_retryable`] to decide whether another attempt is worthwhile.

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod payload;
pub mod retry;
pub mod url;

pub use client::{CancellationSignal, ChatApiClient};
pub use config::ChatApiConfig;
pub use error::ChatApiError;
pub use payload::{
    ChatFunction, ChatFunctionCall, ChatMessage, ChatRequest, ChatResponse, ChatTool,
    ChatToolCall,
};
pub use reqwest::StatusCode;
pub use url::normalize_chat_url;
