// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Configuration for the Quill engine
//!
//! Handles engine and session settings with serde defaults and TOML loading.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// Configuration for the tool execution engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of simultaneously executing tool calls
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,

    /// Per-call execution deadline in milliseconds
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,

    /// Whether destructive (mutating) tools require confirmation
    #[serde(default = "default_confirm_destructive")]
    pub confirm_destructive: bool,

    /// Fully-qualified tool names exempt from destructive confirmation
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Server ids whose tools fail immediately instead of executing
    #[serde(default)]
    pub disabled_servers: Vec<String>,

    /// Server ids treated as external integrations (always require approval)
    #[serde(default)]
    pub external_servers: Vec<String>,

    /// Maximum number of terminal tool results kept visible to the model
    #[serde(default = "default_max_context_results")]
    pub max_context_results: usize,

    /// Maximum characters of a textual tool result before truncation
    #[serde(default = "default_max_result_chars")]
    pub max_result_chars: usize,
}

fn default_max_concurrent_tools() -> usize {
    2
}

fn default_tool_timeout_ms() -> u64 {
    30_000
}

fn default_confirm_destructive() -> bool {
    true
}

fn default_max_context_results() -> usize {
    20
}

fn default_max_result_chars() -> usize {
    8_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tools: default_max_concurrent_tools(),
            tool_timeout_ms: default_tool_timeout_ms(),
            confirm_destructive: default_confirm_destructive(),
            allowed_tools: Vec::new(),
            disabled_servers: Vec::new(),
            external_servers: Vec::new(),
            max_context_results: default_max_context_results(),
            max_result_chars: default_max_result_chars(),
        }
    }
}

impl EngineConfig {
    /// Parse engine configuration from a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// The per-call execution deadline as a [`Duration`].
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_millis(self.tool_timeout_ms)
    }
}
