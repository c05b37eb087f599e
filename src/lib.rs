// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Quill - embeddable agentic editing engine for document workflows.
//!
//! This crate exposes the session runtime an embedding application drives:
//! hand it a file, an instruction, and a model stream, and it runs the
//! model/tool loop until it has a confirmed change proposal or an answer.
//!
//! Architecture highlights:
//! - `turn`: the session controller state machine, events, and mutation
//!   validation
//! - `tools`: canonical tool naming, approval policy, the registry of
//!   executors, and the concurrency-limited execution engine
//! - `llm`: provider-neutral messages, streaming events, and the injected
//!   stream factory seam (plus a scriptable mock for tests)
//! - `diff`: line-level diff data for change previews
//! - `config`: engine tunables loadable from TOML

pub mod config;
pub mod diff;
pub mod error;
pub mod llm;
pub mod tools;
pub mod turn;

pub use config::EngineConfig;
pub use error::{ApiError, QuillError, Result};
