// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Approval policy for tools
//!
//! Decides which tool calls execute without external confirmation and which
//! servers are gated or disabled outright.

use std::collections::HashSet;

use crate::config::EngineConfig;
use crate::tools::name::ToolName;

/// Policy deciding auto-approval and server gating
#[derive(Debug, Clone)]
pub struct ApprovalPolicy {
    /// Whether destructive tools require confirmation
    confirm_destructive: bool,
    /// Fully-qualified names exempt from destructive confirmation
    allowed_tools: HashSet<String>,
    /// Servers whose calls fail immediately
    disabled_servers: HashSet<String>,
    /// External integrations; their calls always require approval
    external_servers: HashSet<String>,
}

impl ApprovalPolicy {
    pub fn new(
        confirm_destructive: bool,
        allowed_tools: impl IntoIterator<Item = String>,
        disabled_servers: impl IntoIterator<Item = String>,
        external_servers: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            confirm_destructive,
            allowed_tools: allowed_tools.into_iter().collect(),
            disabled_servers: disabled_servers.into_iter().collect(),
            external_servers: external_servers.into_iter().collect(),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.confirm_destructive,
            config.allowed_tools.iter().cloned(),
            config.disabled_servers.iter().cloned(),
            config.external_servers.iter().cloned(),
        )
    }

    /// Whether the owning server is explicitly disabled
    pub fn is_server_disabled(&self, name: &ToolName) -> bool {
        name.server_id
            .as_deref()
            .is_some_and(|server| self.disabled_servers.contains(server))
    }

    /// Whether the owning server is an external (non-built-in) integration
    pub fn is_external(&self, name: &ToolName) -> bool {
        !name.is_builtin()
            || name
                .server_id
                .as_deref()
                .is_some_and(|server| self.external_servers.contains(server))
    }

    /// Whether a call to this tool executes without external confirmation.
    ///
    /// Exploration tools auto-approve unconditionally; mutation tools require
    /// approval unless destructive confirmation is off or the qualified name
    /// is allow-listed. External servers always require approval.
    pub fn should_auto_approve(&self, name: &ToolName) -> bool {
        if self.is_external(name) {
            return false;
        }
        if name.is_exploration() {
            return true;
        }
        if name.is_mutation() {
            return !self.confirm_destructive || self.allowed_tools.contains(&name.qualified());
        }
        // Unknown base names stay conservative.
        false
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ApprovalPolicy {
        ApprovalPolicy::default()
    }

    #[test]
    fn test_exploration_tools_auto_approve() {
        let policy = policy();
        for raw in ["read", "search", "list", "find", "context"] {
            assert!(
                policy.should_auto_approve(&ToolName::parse(raw)),
                "{raw} should auto-approve"
            );
        }
    }

    #[test]
    fn test_mutation_tools_require_approval() {
        let policy = policy();
        for raw in ["write", "edit", "move", "trash"] {
            assert!(
                !policy.should_auto_approve(&ToolName::parse(raw)),
                "{raw} should require approval"
            );
        }
    }

    #[test]
    fn test_confirm_destructive_disabled_auto_approves_mutations() {
        let policy = ApprovalPolicy::new(false, [], [], []);
        assert!(policy.should_auto_approve(&ToolName::parse("write")));
        assert!(policy.should_auto_approve(&ToolName::parse("trash")));
    }

    #[test]
    fn test_allow_listed_mutation_auto_approves() {
        let policy =
            ApprovalPolicy::new(true, ["mcp-filesystem_write".to_string()], [], []);
        assert!(policy.should_auto_approve(&ToolName::parse("write")));
        // Only the listed name is exempt
        assert!(!policy.should_auto_approve(&ToolName::parse("move")));
    }

    #[test]
    fn test_external_server_always_requires_approval() {
        let policy = ApprovalPolicy::new(false, [], [], []);
        // Even exploration tools on a non-built-in server require approval.
        assert!(!policy.should_auto_approve(&ToolName::parse("mcp-web_search")));
        assert!(!policy.should_auto_approve(&ToolName::parse("mcp-web_read")));
    }

    #[test]
    fn test_builtin_server_marked_external_requires_approval() {
        let policy =
            ApprovalPolicy::new(false, [], [], ["filesystem".to_string()]);
        assert!(!policy.should_auto_approve(&ToolName::parse("read")));
    }

    #[test]
    fn test_disabled_server_detection() {
        let policy = ApprovalPolicy::new(true, [], ["web".to_string()], []);
        assert!(policy.is_server_disabled(&ToolName::parse("mcp-web_search")));
        assert!(!policy.is_server_disabled(&ToolName::parse("read")));
    }

    #[test]
    fn test_unknown_tool_requires_approval() {
        let policy = ApprovalPolicy::new(false, [], [], []);
        assert!(!policy.should_auto_approve(&ToolName::parse("frobnicate")));
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig {
            confirm_destructive: false,
            disabled_servers: vec!["calendar".to_string()],
            ..Default::default()
        };
        let policy = ApprovalPolicy::from_config(&config);
        assert!(policy.should_auto_approve(&ToolName::parse("write")));
        assert!(policy.is_server_disabled(&ToolName::parse("mcp-calendar_list")));
    }
}
