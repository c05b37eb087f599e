// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Session turn machinery: request context, the controller state machine,
//! typed events, and mutation validation.

pub mod context;
pub mod controller;
pub mod events;
pub mod validate;

pub use context::{CapabilityChecker, Prompt, PromptBuilder, Readiness, ReadinessIssue, TurnRequest};
pub use controller::{TurnController, MAX_ITERATIONS};
pub use events::{Activity, TurnEvent, TurnState};
pub use validate::{validate_mutations, MoveOp, PendingOps, WriteOp};
