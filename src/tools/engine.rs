// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool execution engine
//!
//! Owns the full lifecycle of proposed tool calls: policy-gated approval,
//! FIFO admission under a concurrency limit, per-call timeout, loop-guard
//! short-circuiting, and a bounded view of terminal results for model
//! context. One engine instance is scoped to one session; nothing here is
//! shared across sessions.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{QuillError, Result};
use crate::llm::message::ToolCallRequest;
use crate::tools::name::{normalize_arguments, ToolName};
use crate::tools::policy::ApprovalPolicy;
use crate::tools::registry::ToolRegistry;

/// Lifecycle state of a tracked tool call.
///
/// Transitions are monotonic: `Pending → Approved → Executing →
/// {Completed | Failed}`, or `Pending → Denied`. Terminal states are never
/// re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Pending,
    Approved,
    Executing,
    Completed,
    Failed,
    Denied,
}

impl ToolCallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Denied)
    }
}

/// Structured error code attached to failed calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolErrorCode {
    Timeout,
    ToolLoop,
    ServerDisabled,
    Denied,
    UnknownTool,
    ExecutionFailed,
}

impl ToolErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "TIMEOUT",
            Self::ToolLoop => "TOOL_LOOP",
            Self::ServerDisabled => "SERVER_DISABLED",
            Self::Denied => "DENIED",
            Self::UnknownTool => "UNKNOWN_TOOL",
            Self::ExecutionFailed => "EXECUTION_FAILED",
        }
    }
}

/// Structured error captured on a failed call
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: ToolErrorCode,
    pub message: String,
}

/// Terminal result of a tool call
#[derive(Debug, Clone, Default)]
pub struct ToolCallResult {
    /// Success payload, possibly truncated
    pub output: Option<String>,
    /// Structured error for failed calls
    pub error: Option<ToolError>,
    /// Original character count when the output was truncated
    pub original_len: Option<usize>,
}

/// Lifecycle timestamps
#[derive(Debug, Clone)]
pub struct ToolCallTimestamps {
    pub created: DateTime<Utc>,
    pub approved: Option<DateTime<Utc>>,
    pub execution_started: Option<DateTime<Utc>>,
    pub execution_completed: Option<DateTime<Utc>>,
}

impl ToolCallTimestamps {
    fn now() -> Self {
        Self {
            created: Utc::now(),
            approved: None,
            execution_started: None,
            execution_completed: None,
        }
    }
}

/// A tracked tool call, owned exclusively by one engine instance
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub session_message_id: Uuid,
    pub request: ToolCallRequest,
    /// Parsed canonical identifier
    pub name: ToolName,
    pub state: ToolCallState,
    pub timestamps: ToolCallTimestamps,
    pub result: Option<ToolCallResult>,
    pub auto_approved: bool,
    pub origin_server: Option<String>,
}

impl ToolCall {
    /// Render this call's terminal result as text for a tool-role message.
    pub fn result_text(&self) -> String {
        match &self.result {
            Some(result) => {
                if let Some(err) = &result.error {
                    format!("Error [{}]: {}", err.code.as_str(), err.message)
                } else {
                    result.output.clone().unwrap_or_default()
                }
            }
            None => String::new(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.state == ToolCallState::Failed
    }
}

/// Observable lifecycle transition
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    pub id: String,
    pub state: ToolCallState,
}

struct EngineState {
    calls: HashMap<String, ToolCall>,
    /// Creation order, for stable iteration and recency
    order: Vec<String>,
    /// Approved calls awaiting an execution slot, FIFO by approval time
    queue: VecDeque<String>,
    executing: usize,
    /// Canonical signatures of calls that failed or were denied this turn
    blocked_signatures: HashSet<String>,
}

struct EngineInner {
    config: EngineConfig,
    policy: ApprovalPolicy,
    registry: ToolRegistry,
    state: Mutex<EngineState>,
    /// Wakes waiters whenever any call reaches a terminal state
    terminal: Notify,
    observers: Mutex<Vec<mpsc::UnboundedSender<ToolCallEvent>>>,
}

/// The tool execution engine, scoped to one session
#[derive(Clone)]
pub struct ToolEngine {
    inner: Arc<EngineInner>,
}

impl ToolEngine {
    /// Build an engine for one session. The approval policy is derived from
    /// the config so gating fields like `disabled_servers` cannot drift from
    /// what the engine enforces.
    pub fn new(registry: ToolRegistry, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                policy: ApprovalPolicy::from_config(&config),
                config,
                registry,
                state: Mutex::new(EngineState {
                    calls: HashMap::new(),
                    order: Vec::new(),
                    queue: VecDeque::new(),
                    executing: 0,
                    blocked_signatures: HashSet::new(),
                }),
                terminal: Notify::new(),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Subscribe to lifecycle transitions
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ToolCallEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.observers.lock().expect("observers lock").push(tx);
        rx
    }

    /// Whether a tool by this (raw) name executes without confirmation
    pub fn should_auto_approve(&self, raw_name: &str) -> bool {
        self.inner
            .policy
            .should_auto_approve(&ToolName::parse(raw_name))
    }

    /// Begin a new logical turn: identical signatures may be retried again.
    pub fn begin_turn(&self) {
        self.inner
            .state
            .lock()
            .expect("engine state lock")
            .blocked_signatures
            .clear();
    }

    /// Create a tracked call. Auto-approved calls (by policy or
    /// `pre_approved`) are queued for execution immediately; the rest wait
    /// for [`approve_tool_call`](Self::approve_tool_call) or
    /// [`deny_tool_call`](Self::deny_tool_call).
    ///
    /// Returns the tracked call id, re-keyed if it collides with an
    /// already-tracked call.
    pub fn create_tool_call(
        &self,
        request: ToolCallRequest,
        session_message_id: Uuid,
        pre_approved: bool,
    ) -> String {
        let name = ToolName::parse(&request.name);
        let signature = canonical_signature(&name.base_name, &request.arguments);

        // A reused id must not overwrite an earlier record; a collision with
        // a still-executing call would even let its completion mutate the
        // wrong entry.
        let id = {
            let state = self.inner.state.lock().expect("engine state lock");
            let mut id = request.id.clone();
            let mut n = 2;
            while state.calls.contains_key(&id) {
                id = format!("{}-{n}", request.id);
                n += 1;
            }
            id
        };
        if id != request.id {
            warn!(original = %request.id, rekeyed = %id, "re-keyed colliding tool call id");
        }

        let mut call = ToolCall {
            id: id.clone(),
            session_message_id,
            origin_server: name.server_id.clone(),
            request,
            name: name.clone(),
            state: ToolCallState::Pending,
            timestamps: ToolCallTimestamps::now(),
            result: None,
            auto_approved: false,
        };

        // Disabled servers fail before ever entering the pending queue.
        if self.inner.policy.is_server_disabled(&name) {
            let server = name.server_id.clone().unwrap_or_default();
            call.state = ToolCallState::Failed;
            call.result = Some(ToolCallResult {
                error: Some(ToolError {
                    code: ToolErrorCode::ServerDisabled,
                    message: format!("server '{server}' is disabled"),
                }),
                ..Default::default()
            });
            call.timestamps.execution_completed = Some(Utc::now());
            self.insert_terminal(call, signature);
            return id;
        }

        // Loop guard: an identical signature that already failed or was
        // denied this turn fails without touching the executor.
        let blocked = {
            let state = self.inner.state.lock().expect("engine state lock");
            state.blocked_signatures.contains(&signature)
        };
        if blocked {
            warn!(tool = %name.qualified(), "loop guard rejected repeated tool call");
            call.state = ToolCallState::Failed;
            call.result = Some(ToolCallResult {
                error: Some(ToolError {
                    code: ToolErrorCode::ToolLoop,
                    message: format!(
                        "identical call to '{}' already failed this turn",
                        name.qualified()
                    ),
                }),
                ..Default::default()
            });
            call.timestamps.execution_completed = Some(Utc::now());
            self.insert_terminal(call, signature);
            return id;
        }

        let auto = pre_approved || self.inner.policy.should_auto_approve(&name);
        {
            let mut state = self.inner.state.lock().expect("engine state lock");
            state.order.push(id.clone());
            state.calls.insert(id.clone(), call);
        }
        self.emit(&id, ToolCallState::Pending);

        if auto {
            // Internal approval cannot fail: the call is pending by construction.
            let _ = self.approve_internal(&id, true);
        }
        id
    }

    /// Approve a pending call (external confirmation surface)
    pub fn approve_tool_call(&self, id: &str) -> Result<()> {
        self.approve_internal(id, false)
    }

    fn approve_internal(&self, id: &str, auto: bool) -> Result<()> {
        {
            let mut state = self.inner.state.lock().expect("engine state lock");
            let call = state
                .calls
                .get_mut(id)
                .ok_or_else(|| QuillError::Session(format!("unknown tool call: {id}")))?;
            if call.state != ToolCallState::Pending {
                return Err(QuillError::Session(format!(
                    "tool call {id} is not pending"
                )));
            }
            call.state = ToolCallState::Approved;
            call.auto_approved = auto;
            call.timestamps.approved = Some(Utc::now());
            state.queue.push_back(id.to_string());
        }
        self.emit(id, ToolCallState::Approved);
        self.pump();
        Ok(())
    }

    /// Deny a pending call. The denial is recorded in the loop-guard history.
    pub fn deny_tool_call(&self, id: &str) -> Result<()> {
        let signature;
        {
            let mut state = self.inner.state.lock().expect("engine state lock");
            let call = state
                .calls
                .get_mut(id)
                .ok_or_else(|| QuillError::Session(format!("unknown tool call: {id}")))?;
            if call.state != ToolCallState::Pending {
                return Err(QuillError::Session(format!(
                    "tool call {id} is not pending"
                )));
            }
            call.state = ToolCallState::Denied;
            call.timestamps.execution_completed = Some(Utc::now());
            call.result = Some(ToolCallResult {
                error: Some(ToolError {
                    code: ToolErrorCode::Denied,
                    message: "denied by user".to_string(),
                }),
                ..Default::default()
            });
            signature = canonical_signature(&call.name.base_name, &call.request.arguments);
            state.blocked_signatures.insert(signature);
        }
        self.emit(id, ToolCallState::Denied);
        self.inner.terminal.notify_waiters();
        Ok(())
    }

    /// Snapshot of one call
    pub fn call(&self, id: &str) -> Option<ToolCall> {
        self.inner
            .state
            .lock()
            .expect("engine state lock")
            .calls
            .get(id)
            .cloned()
    }

    /// Snapshots of all tracked calls, in creation order
    pub fn calls(&self) -> Vec<ToolCall> {
        let state = self.inner.state.lock().expect("engine state lock");
        state
            .order
            .iter()
            .filter_map(|id| state.calls.get(id).cloned())
            .collect()
    }

    /// Number of calls currently executing
    pub fn executing_count(&self) -> usize {
        self.inner.state.lock().expect("engine state lock").executing
    }

    /// Wait until the call reaches a terminal state, returning its snapshot.
    pub async fn wait_for_terminal(&self, id: &str) -> Result<ToolCall> {
        loop {
            let notified = self.inner.terminal.notified();
            match self.call(id) {
                Some(call) if call.state.is_terminal() => return Ok(call),
                Some(_) => {}
                None => {
                    return Err(QuillError::Session(format!("unknown tool call: {id}")));
                }
            }
            notified.await;
        }
    }

    /// Create a pre-approved call and wait for its terminal snapshot.
    pub async fn execute_and_wait(
        &self,
        request: ToolCallRequest,
        session_message_id: Uuid,
    ) -> Result<ToolCall> {
        let id = self.create_tool_call(request, session_message_id, true);
        self.wait_for_terminal(&id).await
    }

    /// Terminal (completed/failed) calls, most-recent first, bounded by
    /// `max_context_results`. Failed calls are always retained, evicting
    /// older completed calls first, so the model keeps seeing its failures.
    pub fn tool_results_for_context(&self) -> Vec<ToolCall> {
        let max = self.inner.config.max_context_results;
        let terminal: Vec<ToolCall> = {
            let state = self.inner.state.lock().expect("engine state lock");
            state
                .order
                .iter()
                .rev()
                .filter_map(|id| state.calls.get(id))
                .filter(|c| {
                    matches!(c.state, ToolCallState::Completed | ToolCallState::Failed)
                })
                .cloned()
                .collect()
        };

        if terminal.len() <= max {
            return terminal;
        }

        // Pick all failed calls first (newest first), then fill with the
        // newest completed ones, and restore recency order.
        let mut keep: Vec<usize> = Vec::with_capacity(max);
        for (idx, call) in terminal.iter().enumerate() {
            if call.is_failed() && keep.len() < max {
                keep.push(idx);
            }
        }
        for (idx, call) in terminal.iter().enumerate() {
            if !call.is_failed() && keep.len() < max {
                keep.push(idx);
            }
        }
        keep.sort_unstable();
        keep.into_iter().map(|idx| terminal[idx].clone()).collect()
    }

    fn insert_terminal(&self, call: ToolCall, signature: String) {
        let id = call.id.clone();
        let state = call.state;
        {
            let mut engine_state = self.inner.state.lock().expect("engine state lock");
            engine_state.order.push(id.clone());
            if state == ToolCallState::Failed {
                engine_state.blocked_signatures.insert(signature);
            }
            engine_state.calls.insert(id.clone(), call);
        }
        self.emit(&id, state);
        self.inner.terminal.notify_waiters();
    }

    fn emit(&self, id: &str, state: ToolCallState) {
        debug!(call = id, state = ?state, "tool call transition");
        let event = ToolCallEvent {
            id: id.to_string(),
            state,
        };
        self.inner
            .observers
            .lock()
            .expect("observers lock")
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Admit queued calls while execution slots are free.
    fn pump(&self) {
        loop {
            let job = {
                let mut state = self.inner.state.lock().expect("engine state lock");
                if state.executing >= self.inner.config.max_concurrent_tools {
                    None
                } else if let Some(id) = state.queue.pop_front() {
                    state.executing += 1;
                    let call = state.calls.get_mut(&id).expect("queued call exists");
                    call.state = ToolCallState::Executing;
                    call.timestamps.execution_started = Some(Utc::now());
                    let args = parse_arguments(&call.request.arguments);
                    Some((id, call.name.base_name.clone(), args))
                } else {
                    None
                }
            };

            let Some((id, base_name, args)) = job else {
                break;
            };
            self.emit(&id, ToolCallState::Executing);

            let engine = self.clone();
            tokio::spawn(async move {
                engine.run_one(id, base_name, args).await;
            });
        }
    }

    async fn run_one(self, id: String, base_name: String, args: Value) {
        let timeout = self.inner.config.tool_timeout();
        let outcome: std::result::Result<Value, ToolError> =
            match self.inner.registry.get(&base_name) {
                None => Err(ToolError {
                    code: ToolErrorCode::UnknownTool,
                    message: format!("Unknown tool: {base_name}"),
                }),
                Some(executor) => {
                    let args = normalize_arguments(args);
                    // Race the executor against the deadline; a late
                    // resolution is dropped with the future.
                    match tokio::time::timeout(timeout, executor.execute(args)).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(err)) => Err(ToolError {
                            code: ToolErrorCode::ExecutionFailed,
                            message: err.to_string(),
                        }),
                        Err(_) => Err(ToolError {
                            code: ToolErrorCode::Timeout,
                            message: format!(
                                "execution exceeded {} ms",
                                timeout.as_millis()
                            ),
                        }),
                    }
                }
            };

        let final_state;
        {
            let mut state = self.inner.state.lock().expect("engine state lock");
            let max_chars = self.inner.config.max_result_chars;
            let call = state.calls.get_mut(&id).expect("executing call exists");
            match outcome {
                Ok(value) => {
                    let (output, original_len) =
                        truncate_result(&render_output(&value), max_chars);
                    call.state = ToolCallState::Completed;
                    call.result = Some(ToolCallResult {
                        output: Some(output),
                        error: None,
                        original_len,
                    });
                }
                Err(error) => {
                    call.state = ToolCallState::Failed;
                    call.result = Some(ToolCallResult {
                        error: Some(error),
                        ..Default::default()
                    });
                }
            }
            call.timestamps.execution_completed = Some(Utc::now());
            final_state = call.state;
            if final_state == ToolCallState::Failed {
                let signature =
                    canonical_signature(&call.name.base_name, &call.request.arguments);
                state.blocked_signatures.insert(signature);
            }
            state.executing -= 1;
        }

        self.emit(&id, final_state);
        self.inner.terminal.notify_waiters();
        // A slot just freed; admit the next queued call.
        self.pump();
    }
}

/// Parse raw JSON arguments, treating unparseable input as null.
fn parse_arguments(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or(Value::Null)
}

/// Canonical `(base_name, normalized_arguments)` signature for the loop guard.
pub fn canonical_signature(base_name: &str, raw_arguments: &str) -> String {
    match serde_json::from_str::<Value>(raw_arguments) {
        Ok(value) => format!("{base_name}:{}", canonical_json(&normalize_arguments(value))),
        Err(_) => format!("{base_name}:{}", raw_arguments.trim()),
    }
}

/// Serialize a value with recursively sorted object keys.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", k, canonical_json(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// Render an executor payload as text for the conversation.
fn render_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Truncate a textual result, marking the cut and the original length.
fn truncate_result(text: &str, max_chars: usize) -> (String, Option<usize>) {
    let total = text.chars().count();
    if total <= max_chars {
        return (text.to_string(), None);
    }
    let kept: String = text.chars().take(max_chars).collect();
    (
        format!("{kept}\n[output truncated, {total} chars total]"),
        Some(total),
    )
}
