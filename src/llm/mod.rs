// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Model abstraction layer
//!
//! Conversation messages, the stream factory seam, and a scripted mock
//! factory for tests.

pub mod message;
pub mod mock_provider;
pub mod provider;

pub use message::*;
pub use mock_provider::*;
pub use provider::*;
