// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Quill
//!
//! This module defines all error types used throughout the engine.

use thiserror::Error;

/// Main error type for Quill operations
#[derive(Error, Debug)]
pub enum QuillError {
    /// Transport-level errors from the model stream
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Malformed or contradictory tool-call arguments
    #[error("Validation error: {0}")]
    Validation(String),

    /// Repeated identical failed/denied tool call
    #[error("Tool loop detected: {0}")]
    ToolLoop(String),

    /// Tool execution exceeded its deadline
    #[error("Tool timed out: {0}")]
    Timeout(String),

    /// Tool routed to a disabled integration
    #[error("Server disabled: {0}")]
    ServerDisabled(String),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Session-level errors (invalid state, exhausted retries)
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport error classes from the model stream
#[derive(Error, Debug)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Provider is overloaded
    #[error("Provider overloaded")]
    Overloaded,

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

impl ApiError {
    /// Rewrite a transport error into a message suitable for end users.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::AuthenticationFailed => {
                "The model provider rejected the configured API key.".to_string()
            }
            ApiError::RateLimited(secs) => {
                format!("The model provider is rate limiting requests. Try again in {secs} seconds.")
            }
            ApiError::Overloaded => {
                "The model provider is overloaded right now. Try again shortly.".to_string()
            }
            ApiError::Network(_) => {
                "Could not reach the model provider. Check your network connection.".to_string()
            }
            ApiError::Timeout => "The model took too long to respond.".to_string(),
            ApiError::InvalidResponse(_) | ApiError::StreamError(_) => {
                "The model returned an unexpected response.".to_string()
            }
        }
    }
}

/// Result type alias for Quill operations
pub type Result<T> = std::result::Result<T, QuillError>;

impl From<toml::de::Error> for QuillError {
    fn from(err: toml::de::Error) -> Self {
        QuillError::Config(err.to_string())
    }
}
