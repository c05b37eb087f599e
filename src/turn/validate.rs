// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Validation of proposed mutations
//!
//! Raw mutation tool calls are parsed at this boundary into typed operations
//! or rejected with a message the model can act on. Downstream code only
//! ever sees validated `WriteOp`/`MoveOp` values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::message::ToolCallRequest;
use crate::tools::name::{normalize_arguments, ToolName};

/// A validated whole-content write
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOp {
    pub path: String,
    pub content: String,
}

/// A validated file move
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOp {
    pub source: String,
    pub destination: String,
}

/// Validated pending operations for one turn: at most one of each
#[derive(Debug, Clone, Default)]
pub struct PendingOps {
    pub write: Option<WriteOp>,
    pub move_op: Option<MoveOp>,
}

impl PendingOps {
    pub fn is_empty(&self) -> bool {
        self.write.is_none() && self.move_op.is_none()
    }

    /// The path a write must target: the move destination when a move is
    /// pending, otherwise the file under edit.
    pub fn expected_write_path<'a>(&'a self, edited_path: &'a str) -> &'a str {
        self.move_op
            .as_ref()
            .map_or(edited_path, |m| m.destination.as_str())
    }

    pub fn clear(&mut self) {
        self.write = None;
        self.move_op = None;
    }
}

/// Validate the mutation calls proposed in one turn.
///
/// Returns the typed pending operations, or a violation message suitable for
/// feeding back to the model as a corrective user turn.
pub fn validate_mutations(
    calls: &[ToolCallRequest],
    edited_path: &str,
) -> Result<PendingOps, String> {
    let mut ops = PendingOps::default();

    for call in calls {
        let name = ToolName::parse(&call.name);
        match name.base_name.as_str() {
            "edit" => {
                return Err(format!(
                    "The '{}' tool is not supported here. Rewrite the full file with a single \
                     'write' tool call containing the complete new content.",
                    call.name
                ));
            }
            "move" => validate_move(call, edited_path, &mut ops)?,
            "write" => validate_write(call, &mut ops)?,
            other => {
                return Err(format!(
                    "The '{other}' tool cannot be applied to the file under edit. Use a single \
                     'write' tool call with the complete new content, plus an optional 'move'."
                ));
            }
        }
    }

    // The write target depends on whether a move is pending, so check it
    // only after every call has been parsed.
    if let Some(write) = &ops.write {
        let expected = ops
            .move_op
            .as_ref()
            .map_or(edited_path, |m| m.destination.as_str());
        if write.path != expected {
            return Err(format!(
                "The 'write' path '{}' does not match the expected path '{expected}'. \
                 Write the complete content to '{expected}'.",
                write.path
            ));
        }
    }

    Ok(ops)
}

fn validate_move(
    call: &ToolCallRequest,
    edited_path: &str,
    ops: &mut PendingOps,
) -> Result<(), String> {
    // Accept the `{from, to}` shape by normalizing it to `items` first.
    let Value::Object(args) = normalize_arguments(Value::Object(parse_object(call)?)) else {
        return Err(invalid_arguments(call, "expected a JSON object"));
    };

    let items = args
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid_arguments(call, "expected an 'items' array"))?;
    if items.len() != 1 {
        return Err(format!(
            "A 'move' call must contain exactly one source/destination pair, got {}.",
            items.len()
        ));
    }

    let item = &items[0];
    let source = item
        .get("source")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_arguments(call, "missing 'source'"))?;
    let destination = item
        .get("destination")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_arguments(call, "missing 'destination'"))?;

    if source != edited_path {
        return Err(format!(
            "The 'move' source '{source}' is not the file under edit ('{edited_path}'). \
             Only the current file may be moved."
        ));
    }

    // A move onto itself is dropped rather than rejected.
    if source == destination {
        return Ok(());
    }

    if ops.move_op.is_some() {
        return Err("Only one 'move' operation is allowed per turn.".to_string());
    }
    ops.move_op = Some(MoveOp {
        source: source.to_string(),
        destination: destination.to_string(),
    });
    Ok(())
}

fn validate_write(call: &ToolCallRequest, ops: &mut PendingOps) -> Result<(), String> {
    let args = parse_object(call)?;

    let path = args
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_arguments(call, "missing 'path'"))?;
    let content = args
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_arguments(call, "missing 'content'"))?;

    if ops.write.is_some() {
        return Err("Only one 'write' operation is allowed per turn.".to_string());
    }
    ops.write = Some(WriteOp {
        path: path.to_string(),
        content: content.to_string(),
    });
    Ok(())
}

fn parse_object(call: &ToolCallRequest) -> Result<serde_json::Map<String, Value>, String> {
    match serde_json::from_str::<Value>(&call.arguments) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(invalid_arguments(call, "expected a JSON object")),
        Err(err) => Err(invalid_arguments(call, &err.to_string())),
    }
}

fn invalid_arguments(call: &ToolCallRequest, detail: &str) -> String {
    format!(
        "The arguments for '{}' are invalid ({detail}). Provide well-formed JSON arguments.",
        call.name
    )
}
