// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turn context and readiness seams
//!
//! The inputs a session starts from, plus the injected capability checker
//! and prompt builder. Their implementations live with the embedder.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inputs for starting one editing session
#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Path of the file under edit
    pub file_path: String,
    /// Current content of the file under edit
    pub content: String,
    /// Natural-language instruction from the user
    pub instruction: String,
    /// Optional selection excerpt the instruction refers to
    pub selection: Option<String>,
    /// Model identifier to stream from
    pub model: String,
    /// Session id
    pub session_id: Uuid,
}

impl TurnRequest {
    pub fn new(
        file_path: impl Into<String>,
        content: impl Into<String>,
        instruction: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            content: content.into(),
            instruction: instruction.into(),
            selection: None,
            model: model.into(),
            session_id: Uuid::new_v4(),
        }
    }

    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }
}

/// Why a session cannot start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessIssue {
    /// Stable machine-readable code (e.g. `NO_MODEL`, `UNSUPPORTED_FILE`)
    pub code: String,
    /// Human-readable explanation
    pub message: String,
    /// Suggested remediation, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ReadinessIssue {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// Readiness verdict from the capability checker
#[derive(Debug, Clone, Default)]
pub struct Readiness {
    pub issues: Vec<ReadinessIssue>,
}

impl Readiness {
    pub fn ready() -> Self {
        Self::default()
    }

    pub fn blocked(issues: Vec<ReadinessIssue>) -> Self {
        Self { issues }
    }

    pub fn is_ready(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Pure readiness predicate, checked before any network call
pub trait CapabilityChecker: Send + Sync {
    fn check(&self, request: &TurnRequest) -> Readiness;
}

/// First-turn prompt content
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Builds the first turn's messages; composition is the embedder's concern
pub trait PromptBuilder: Send + Sync {
    fn build(&self, request: &TurnRequest) -> Prompt;
}
