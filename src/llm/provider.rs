// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stream factory seam and streaming event types
//!
//! Defines the abstraction layer between the turn controller and any model
//! backend. The controller only ever sees a finite stream of [`StreamEvent`]s
//! per turn; wire formats live behind this trait.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::message::Message;

/// A finite, cancellable stream of model events for one turn
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// Opens one model stream per turn
#[async_trait]
pub trait StreamFactory: Send + Sync {
    /// Open a stream for the given conversation. The factory must stop
    /// yielding events promptly once `cancel` fires.
    async fn open(
        &self,
        messages: &[Message],
        model: &str,
        tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<EventStream>;
}

/// Phase of a streamed tool-call event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Partial fragment, accumulate by call id
    Delta,
    /// Fragments for this id are complete
    Final,
}

/// Partial tool-call content carried by one stream event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    /// Call id this fragment belongs to
    pub id: String,
    /// Name fragment to append (often complete on the first event)
    #[serde(default)]
    pub name: String,
    /// Raw JSON argument fragment to append
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallFragment {
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

/// Events from a streaming model response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Natural-language content delta
    Content { text: String },

    /// Reasoning/thinking delta (not committed to the conversation)
    Reasoning { text: String },

    /// Tool-call fragment or finalization
    ToolCall {
        phase: StreamPhase,
        call: ToolCallFragment,
    },
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Fully-qualified tool name
    pub name: String,

    /// Tool description
    pub description: String,

    /// Input schema (JSON Schema object)
    pub input_schema: serde_json::Value,
}
