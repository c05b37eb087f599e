// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Diff data for change previews
//!
//! The controller only needs line-level diff *data* to decide no-op versus
//! real change and to attach a preview; rendering is the embedder's concern.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

/// Kind of a diff line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Context,
    Added,
    Removed,
}

/// One line of a line-level diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

/// Addition/deletion counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
}

/// Line-level diff between old and new content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    pub lines: Vec<DiffLine>,
    pub stats: DiffStats,
}

impl Diff {
    /// Whether the diff carries no additions and no deletions
    pub fn is_noop(&self) -> bool {
        self.stats.additions == 0 && self.stats.deletions == 0
    }
}

/// Builds diff data from old and new content
pub trait DiffBuilder: Send + Sync {
    fn diff(&self, old: &str, new: &str) -> Diff;
}

/// Default line-level diff builder
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDiffBuilder;

impl DiffBuilder for LineDiffBuilder {
    fn diff(&self, old: &str, new: &str) -> Diff {
        let text_diff = TextDiff::from_lines(old, new);
        let mut lines = Vec::new();
        let mut stats = DiffStats::default();

        for change in text_diff.iter_all_changes() {
            let kind = match change.tag() {
                ChangeTag::Equal => DiffLineKind::Context,
                ChangeTag::Insert => {
                    stats.additions += 1;
                    DiffLineKind::Added
                }
                ChangeTag::Delete => {
                    stats.deletions += 1;
                    DiffLineKind::Removed
                }
            };
            lines.push(DiffLine {
                kind,
                text: change.value().trim_end_matches('\n').to_string(),
            });
        }

        Diff { lines, stats }
    }
}
