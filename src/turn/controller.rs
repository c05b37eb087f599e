// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Turn controller
//!
//! The session-scoped state machine that drives one editing session: runs
//! the capability check, opens model streams, aggregates tool-call
//! fragments, executes exploration tools inline, validates proposed
//! mutations, and gates real changes behind external confirmation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::diff::DiffBuilder;
use crate::error::{QuillError, Result};
use crate::llm::message::{Message, ToolCallRequest};
use crate::llm::provider::{StreamEvent, StreamFactory, StreamPhase, ToolDefinition};
use crate::tools::engine::ToolEngine;
use crate::tools::name::ToolName;
use crate::turn::context::{CapabilityChecker, PromptBuilder, ReadinessIssue, TurnRequest};
use crate::turn::events::{Activity, TurnEvent, TurnState};
use crate::turn::validate::{validate_mutations, PendingOps};

/// Maximum model turns per session before giving up
pub const MAX_ITERATIONS: usize = 4;

struct ControllerState {
    turn_state: TurnState,
    messages: Vec<Message>,
    pending: PendingOps,
    request: Option<TurnRequest>,
    /// Every call id claimed this session, across resumed streams
    call_ids: Vec<String>,
}

/// Outcome of consuming one model stream
enum StreamOutcome {
    /// An exploration tool ran; open a fresh stream
    Resume,
    /// The session was cancelled mid-stream
    Cancelled,
    /// The stream ended; resolve text and proposed mutations
    Finished {
        text: String,
        mutations: Vec<ToolCallRequest>,
    },
}

/// Drives one editing session from prompt to terminal state
pub struct TurnController {
    capability: Arc<dyn CapabilityChecker>,
    prompts: Arc<dyn PromptBuilder>,
    streams: Arc<dyn StreamFactory>,
    diff_builder: Arc<dyn DiffBuilder>,
    engine: ToolEngine,
    tools: Vec<ToolDefinition>,
    state: Mutex<ControllerState>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<TurnEvent>>>,
    cancel: CancellationToken,
}

impl TurnController {
    pub fn new(
        capability: Arc<dyn CapabilityChecker>,
        prompts: Arc<dyn PromptBuilder>,
        streams: Arc<dyn StreamFactory>,
        diff_builder: Arc<dyn DiffBuilder>,
        engine: ToolEngine,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            capability,
            prompts,
            streams,
            diff_builder,
            engine,
            tools,
            state: Mutex::new(ControllerState {
                turn_state: TurnState::Idle,
                messages: Vec::new(),
                pending: PendingOps::default(),
                request: None,
                call_ids: Vec::new(),
            }),
            subscribers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TurnEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().expect("subscribers lock").push(tx);
        rx
    }

    /// Current session state
    pub fn state(&self) -> TurnState {
        self.state.lock().expect("controller state lock").turn_state
    }

    /// Snapshot of the conversation history
    pub fn messages(&self) -> Vec<Message> {
        self.state
            .lock()
            .expect("controller state lock")
            .messages
            .clone()
    }

    /// Validated operations awaiting confirmation, if any
    pub fn pending_ops(&self) -> PendingOps {
        self.state
            .lock()
            .expect("controller state lock")
            .pending
            .clone()
    }

    /// The engine executing this session's tool calls
    pub fn engine(&self) -> &ToolEngine {
        &self.engine
    }

    /// Run the session to its first resting point: `AwaitingConfirmation`,
    /// `Responded`, or a terminal state. Errors are surfaced through state
    /// events; `Err` is returned only for API misuse.
    pub async fn start(&self, request: TurnRequest) -> Result<()> {
        {
            let state = self.state.lock().expect("controller state lock");
            if state.turn_state != TurnState::Idle {
                return Err(QuillError::Session(
                    "session has already been started".to_string(),
                ));
            }
        }

        self.set_state(TurnState::Checking);
        let readiness = self.capability.check(&request);
        if !readiness.is_ready() {
            info!(issues = readiness.issues.len(), "session not ready");
            self.fail_with_issues(readiness.issues);
            return Ok(());
        }

        let prompt = self.prompts.build(&request);
        let file_path = request.file_path.clone();
        let file_content = request.content.clone();
        {
            let mut state = self.state.lock().expect("controller state lock");
            state.messages = vec![
                Message::system(prompt.system),
                Message::user(prompt.user),
            ];
            state.request = Some(request);
        }
        self.engine.begin_turn();

        for iteration in 1..=MAX_ITERATIONS {
            if self.cancel.is_cancelled() {
                return Ok(());
            }
            debug!(iteration, "opening model stream");
            if !self.set_state(TurnState::Streaming) {
                return Ok(());
            }
            self.emit_activity(Activity::Thinking);

            let outcome = match self.run_stream().await {
                Ok(outcome) => outcome,
                Err(QuillError::Api(api)) => {
                    warn!(error = %api, "model stream failed");
                    self.fail(api.user_message());
                    return Ok(());
                }
                Err(err) => {
                    self.fail(err.to_string());
                    return Ok(());
                }
            };

            let (text, mutations) = match outcome {
                StreamOutcome::Resume => continue,
                StreamOutcome::Cancelled => return Ok(()),
                StreamOutcome::Finished { text, mutations } => (text, mutations),
            };

            if mutations.is_empty() {
                if !text.trim().is_empty() {
                    self.emit(TurnEvent::Response { text });
                    self.set_state(TurnState::Responded);
                    return Ok(());
                }
                if iteration == MAX_ITERATIONS {
                    break;
                }
                self.push_feedback(
                    "The previous turn produced neither a tool call nor an answer. \
                     Respond with at least one valid tool call, or answer the user \
                     directly in text.",
                );
                continue;
            }

            self.emit_activity(Activity::Deciding);
            let ops = match validate_mutations(&mutations, &file_path) {
                Ok(ops) => ops,
                Err(violation) => {
                    warn!(%violation, "mutation validation failed");
                    if iteration == MAX_ITERATIONS {
                        self.fail(violation);
                        return Ok(());
                    }
                    self.push_feedback(&violation);
                    continue;
                }
            };

            // Everything the model proposed collapsed to nothing (a no-op
            // move); there is no change to confirm.
            if ops.is_empty() {
                self.set_state(TurnState::Completed);
                return Ok(());
            }

            let diff = ops
                .write
                .as_ref()
                .map(|write| self.diff_builder.diff(&file_content, &write.content));

            // Identical content with no pending move needs no confirmation.
            if ops.move_op.is_none() && diff.as_ref().is_some_and(|d| d.is_noop()) {
                info!("proposed write is a no-op; completing without confirmation");
                self.set_state(TurnState::Completed);
                return Ok(());
            }

            {
                let mut state = self.state.lock().expect("controller state lock");
                state.pending = ops.clone();
            }
            self.emit(TurnEvent::Preview {
                write: ops.write,
                move_op: ops.move_op,
                diff,
            });
            self.set_state(TurnState::AwaitingConfirmation);
            return Ok(());
        }

        self.fail("exceeded the maximum number of tool iterations".to_string());
        Ok(())
    }

    /// Apply accepted: finish a session awaiting confirmation. No-op on
    /// terminal states.
    pub fn complete(&self) -> Result<()> {
        let transition = {
            let mut state = self.state.lock().expect("controller state lock");
            if state.turn_state.is_terminal() {
                return Ok(());
            }
            if state.turn_state != TurnState::AwaitingConfirmation {
                return Err(QuillError::Session(format!(
                    "cannot complete a session in state {:?}",
                    state.turn_state
                )));
            }
            state.pending.clear();
            true
        };
        if transition {
            self.set_state(TurnState::Completed);
        }
        Ok(())
    }

    /// Abort the session from any non-terminal state. Idempotent.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock().expect("controller state lock");
            if state.turn_state.is_terminal() {
                return;
            }
            state.pending.clear();
        }
        self.cancel.cancel();
        self.set_state(TurnState::Cancelled);
    }

    /// Consume one model stream, executing exploration tools inline.
    async fn run_stream(&self) -> Result<StreamOutcome> {
        let (messages, model) = {
            let state = self.state.lock().expect("controller state lock");
            let model = state
                .request
                .as_ref()
                .map(|r| r.model.clone())
                .unwrap_or_default();
            (state.messages.clone(), model)
        };

        let mut stream = self
            .streams
            .open(&messages, &model, &self.tools, self.cancel.clone())
            .await?;

        let session_message_id = Uuid::new_v4();
        let mut assistant_text = String::new();
        // Per-id fragment accumulation for delta-phase events.
        let mut fragments: HashMap<String, (String, String)> = HashMap::new();
        let mut mutations: Vec<ToolCallRequest> = Vec::new();

        loop {
            let event = tokio::select! {
                () = self.cancel.cancelled() => return Ok(StreamOutcome::Cancelled),
                event = stream.next() => event,
            };
            let Some(event) = event else {
                break;
            };

            match event? {
                StreamEvent::Content { text } => assistant_text.push_str(&text),
                StreamEvent::Reasoning { .. } => {}
                StreamEvent::ToolCall { phase, call } => match phase {
                    StreamPhase::Delta => {
                        let entry = fragments.entry(call.id.clone()).or_default();
                        entry.0.push_str(&call.name);
                        entry.1.push_str(&call.arguments);
                    }
                    StreamPhase::Final => {
                        let (mut name, mut arguments) =
                            fragments.remove(&call.id).unwrap_or_default();
                        name.push_str(&call.name);
                        arguments.push_str(&call.arguments);

                        let id = self.claim_call_id(&call.id);
                        let request = ToolCallRequest::new(id, name.clone(), arguments);
                        let tool = ToolName::parse(&name);

                        if tool.is_exploration() {
                            self.emit_activity(if tool.base_name == "read" {
                                Activity::Reading
                            } else {
                                Activity::Exploring
                            });
                            self.run_exploration(
                                assistant_text,
                                mutations,
                                request,
                                session_message_id,
                            )
                            .await?;
                            return Ok(StreamOutcome::Resume);
                        }

                        self.emit_activity(Activity::Proposing);
                        mutations.push(request);
                    }
                },
            }
        }

        // Commit the assistant message so later tool-result messages can
        // legally follow it.
        if !assistant_text.is_empty() || !mutations.is_empty() {
            let mut state = self.state.lock().expect("controller state lock");
            state.messages.push(Message::assistant_with_tools(
                assistant_text.clone(),
                mutations.clone(),
            ));
        }

        Ok(StreamOutcome::Finished {
            text: assistant_text,
            mutations,
        })
    }

    /// Execute one exploration call inline and append its result, abandoning
    /// the rest of the current stream.
    async fn run_exploration(
        &self,
        assistant_text: String,
        mut earlier_calls: Vec<ToolCallRequest>,
        request: ToolCallRequest,
        session_message_id: Uuid,
    ) -> Result<()> {
        let call_id = request.id.clone();
        earlier_calls.push(request.clone());
        {
            let mut state = self.state.lock().expect("controller state lock");
            state
                .messages
                .push(Message::assistant_with_tools(assistant_text, earlier_calls));
        }

        // Policy decides whether this runs immediately; calls on external
        // servers park as pending until approved or denied through the
        // engine's confirmation surface.
        let tracked = self
            .engine
            .create_tool_call(request, session_message_id, false);
        let call = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            call = self.engine.wait_for_terminal(&tracked) => call?,
        };
        let result_text = call.result_text();
        {
            let mut state = self.state.lock().expect("controller state lock");
            state.messages.push(Message::tool(call_id, result_text));
        }
        Ok(())
    }

    /// Sanitize and claim a stream-assigned call id, deduplicating against
    /// every id already used this session. Resumed streams may legally reuse
    /// an id the model already spent.
    fn claim_call_id(&self, raw: &str) -> String {
        let mut state = self.state.lock().expect("controller state lock");
        let id = sanitize_id(raw, &state.call_ids);
        state.call_ids.push(id.clone());
        id
    }

    fn push_feedback(&self, feedback: &str) {
        let mut state = self.state.lock().expect("controller state lock");
        state.messages.push(Message::user(feedback.to_string()));
    }

    /// Transition states, refusing to leave a terminal state. Returns
    /// whether the transition happened.
    fn set_state(&self, next: TurnState) -> bool {
        {
            let mut state = self.state.lock().expect("controller state lock");
            if state.turn_state.is_terminal() {
                return false;
            }
            state.turn_state = next;
        }
        debug!(state = ?next, "session transition");
        self.emit(TurnEvent::state(next));
        true
    }

    fn fail(&self, error: String) {
        {
            let mut state = self.state.lock().expect("controller state lock");
            if state.turn_state.is_terminal() {
                return;
            }
            state.pending.clear();
            state.turn_state = TurnState::Failed;
        }
        self.emit(TurnEvent::State {
            state: TurnState::Failed,
            issues: Vec::new(),
            error: Some(error),
        });
    }

    fn fail_with_issues(&self, issues: Vec<ReadinessIssue>) {
        {
            let mut state = self.state.lock().expect("controller state lock");
            if state.turn_state.is_terminal() {
                return;
            }
            state.turn_state = TurnState::Failed;
        }
        self.emit(TurnEvent::State {
            state: TurnState::Failed,
            issues,
            error: None,
        });
    }

    fn emit_activity(&self, activity: Activity) {
        self.emit(TurnEvent::Activity { activity });
    }

    fn emit(&self, event: TurnEvent) {
        self.subscribers
            .lock()
            .expect("subscribers lock")
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Sanitize a stream-assigned call id: trim it, synthesize one when empty,
/// and deduplicate against ids already finalized this stream.
fn sanitize_id(raw: &str, used: &[String]) -> String {
    let trimmed = raw.trim();
    let base = if trimmed.is_empty() {
        format!("call-{}", used.len() + 1)
    } else {
        trimmed.to_string()
    };
    if !used.iter().any(|id| id == &base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !used.iter().any(|id| id == &candidate) {
            return candidate;
        }
        n += 1;
    }
}
