// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Typed turn events
//!
//! A closed tagged union of everything a session emits to observers. No
//! dynamic listener maps; subscribers receive exactly these payloads.

use serde::{Deserialize, Serialize};

use crate::diff::Diff;
use crate::turn::context::ReadinessIssue;
use crate::turn::validate::{MoveOp, WriteOp};

/// State of one editing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnState {
    Idle,
    Checking,
    Streaming,
    AwaitingConfirmation,
    Responded,
    Completed,
    Failed,
    Cancelled,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// Human-readable progress tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
    Thinking,
    Exploring,
    Reading,
    Deciding,
    Proposing,
}

/// Everything a session emits to subscribers
#[derive(Debug, Clone)]
pub enum TurnEvent {
    /// Every state transition, with issues or an error where relevant
    State {
        state: TurnState,
        issues: Vec<ReadinessIssue>,
        error: Option<String>,
    },

    /// Progress tick for UI surfaces
    Activity { activity: Activity },

    /// Validated pending operations ready for confirmation
    Preview {
        write: Option<WriteOp>,
        move_op: Option<MoveOp>,
        diff: Option<Diff>,
    },

    /// Final natural-language answer when no file changes are proposed
    Response { text: String },
}

impl TurnEvent {
    pub fn state(state: TurnState) -> Self {
        Self::State {
            state,
            issues: Vec::new(),
            error: None,
        }
    }
}
