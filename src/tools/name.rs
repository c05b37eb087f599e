// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Canonical tool identifiers
//!
//! Fully-qualified tool names have the shape `mcp-<server>_<base>`. Models
//! may also emit short aliases (`read`, `write`, `move`) which resolve to the
//! built-in filesystem server through a pure lookup table. Argument shapes
//! are normalized here as well, before dispatch to any executor.

use serde_json::{json, Value};

/// Server id of the built-in filesystem integration
pub const BUILTIN_SERVER: &str = "filesystem";

/// Prefix of fully-qualified tool names
const QUALIFIED_PREFIX: &str = "mcp-";

/// Short aliases and the fully-qualified names they resolve to
const ALIASES: &[(&str, &str)] = &[
    ("read", "mcp-filesystem_read"),
    ("write", "mcp-filesystem_write"),
    ("edit", "mcp-filesystem_edit"),
    ("move", "mcp-filesystem_move"),
    ("trash", "mcp-filesystem_trash"),
    ("search", "mcp-filesystem_search"),
    ("list", "mcp-filesystem_list"),
    ("find", "mcp-filesystem_find"),
    ("context", "mcp-filesystem_context"),
];

/// Base names of read-only exploration tools
const EXPLORATION_TOOLS: &[&str] = &["read", "search", "list", "find", "context"];

/// Base names of state-changing mutation tools
const MUTATION_TOOLS: &[&str] = &["edit", "write", "move", "trash"];

/// A parsed tool identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolName {
    /// Owning server id, if the name was qualified or an alias resolved
    pub server_id: Option<String>,
    /// Base tool name (`read`, `write`, ...)
    pub base_name: String,
}

impl ToolName {
    /// Parse a raw tool name, resolving short aliases to their
    /// fully-qualified form.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix(QUALIFIED_PREFIX) {
            if let Some((server, base)) = rest.split_once('_') {
                if !server.is_empty() && !base.is_empty() {
                    return Self {
                        server_id: Some(server.to_string()),
                        base_name: base.to_string(),
                    };
                }
            }
            // Malformed qualified name; treat the remainder as a bare base.
            return Self {
                server_id: None,
                base_name: rest.to_string(),
            };
        }

        if let Some(qualified) = resolve_alias(raw) {
            return Self::parse(qualified);
        }

        Self {
            server_id: None,
            base_name: raw.to_string(),
        }
    }

    /// The fully-qualified form, when a server is known
    pub fn qualified(&self) -> String {
        match &self.server_id {
            Some(server) => format!("{QUALIFIED_PREFIX}{server}_{}", self.base_name),
            None => self.base_name.clone(),
        }
    }

    /// Whether this tool belongs to the built-in server (or resolved there)
    pub fn is_builtin(&self) -> bool {
        matches!(self.server_id.as_deref(), Some(BUILTIN_SERVER) | None)
    }

    /// Read-only exploration tools are auto-executed inline
    pub fn is_exploration(&self) -> bool {
        EXPLORATION_TOOLS.contains(&self.base_name.as_str())
    }

    /// Mutation tools change external state and end the turn
    pub fn is_mutation(&self) -> bool {
        MUTATION_TOOLS.contains(&self.base_name.as_str())
    }
}

/// Look up a short alias. Pure table lookup, no string rewriting.
pub fn resolve_alias(name: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, qualified)| *qualified)
}

/// Normalize argument shapes before dispatch.
///
/// A bare `path` fans out to both `path` and a `paths` array; `{from, to}`
/// becomes an `items: [{source, destination}]` array.
pub fn normalize_arguments(arguments: Value) -> Value {
    let Value::Object(mut map) = arguments else {
        return arguments;
    };

    if let Some(path) = map.get("path").and_then(Value::as_str).map(String::from) {
        if !map.contains_key("paths") {
            map.insert("paths".to_string(), json!([path]));
        }
    }

    let from = map.get("from").and_then(Value::as_str).map(String::from);
    let to = map.get("to").and_then(Value::as_str).map(String::from);
    if let (Some(from), Some(to)) = (from, to) {
        if !map.contains_key("items") {
            map.insert(
                "items".to_string(),
                json!([{ "source": from, "destination": to }]),
            );
            map.remove("from");
            map.remove("to");
        }
    }

    Value::Object(map)
}
