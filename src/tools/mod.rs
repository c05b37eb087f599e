// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for Quill
//!
//! Canonical naming, approval policy, the executor registry seam, and the
//! execution engine that owns every proposed call's lifecycle.

pub mod engine;
pub mod name;
pub mod policy;
pub mod registry;

pub use engine::*;
pub use name::*;
pub use policy::*;
pub use registry::*;
