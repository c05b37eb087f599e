// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Conversation messages
//!
//! The ordered message history a turn controller owns, including tool-call
//! metadata on assistant messages and tool-result messages.

use serde::{Deserialize, Serialize};

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System prompt
    System,
    /// End-user input (including synthetic retry feedback)
    User,
    /// Model output
    Assistant,
    /// Tool execution result
    Tool,
}

/// A tool call proposed by the model, immutable once finalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Stream-assigned call id, sanitized and deduplicated
    pub id: String,
    /// Tool name as the model produced it (alias or fully qualified)
    pub name: String,
    /// Raw JSON arguments, parsed only at validation boundaries
    pub arguments: String,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// One message in the conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content (may be empty for pure tool-call messages)
    pub content: String,

    /// Tool calls proposed in this message (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Id of the tool call this message answers (tool messages only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message with plain text
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Create an assistant message carrying tool-call metadata
    pub fn assistant_with_tools(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Create a tool-result message answering one tool call
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Whether this message carries any tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are an editor.");
        assert_eq!(system.role, Role::System);
        assert!(system.tool_calls.is_empty());
        assert!(system.tool_call_id.is_none());

        let user = Message::user("Organize this note");
        assert_eq!(user.role, Role::User);

        let assistant = Message::assistant("Done.");
        assert_eq!(assistant.role, Role::Assistant);
        assert!(!assistant.has_tool_calls());
    }

    #[test]
    fn test_assistant_with_tools() {
        let call = ToolCallRequest::new("call-1", "read", r#"{"path":"notes.md"}"#);
        let msg = Message::assistant_with_tools("", vec![call]);

        assert_eq!(msg.role, Role::Assistant);
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls[0].name, "read");
    }

    #[test]
    fn test_tool_message_links_call_id() {
        let msg = Message::tool("call-7", "file contents here");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call-7"));
    }

    #[test]
    fn test_tool_call_request_equality() {
        let a = ToolCallRequest::new("id", "write", "{}");
        let b = ToolCallRequest::new("id", "write", "{}");
        assert_eq!(a, b);
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("tool_calls"));
        assert!(!json.contains("tool_call_id"));
    }

    #[test]
    fn test_message_deserialization_defaults() {
        let msg: Message = serde_json::from_str(r#"{"role":"user","content":"hi"}"#).unwrap();
        assert_eq!(msg.role, Role::User);
        assert!(msg.tool_calls.is_empty());
        assert!(msg.tool_call_id.is_none());
    }
}
