// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! End-to-end session flows through the turn controller: answer-only turns,
//! explore-then-edit turns, validation retries, confirmation gating, and
//! cancellation.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use quill::config::EngineConfig;
use quill::diff::LineDiffBuilder;
use quill::llm::message::Role;
use quill::llm::mock_provider::{MockScript, MockStreamFactory};
use quill::llm::provider::{StreamEvent, StreamFactory, StreamPhase, ToolCallFragment};
use quill::tools::engine::{ToolCallState, ToolEngine};
use quill::tools::registry::{FnExecutor, ToolExecutor, ToolRegistry};
use quill::turn::{
    CapabilityChecker, Prompt, PromptBuilder, Readiness, ReadinessIssue, TurnController,
    TurnEvent, TurnRequest, TurnState,
};

const FILE: &str = "notes/today.md";
const CONTENT: &str = "- beta\n- alpha\n";

/// Opt-in logging for debugging these flows: RUST_LOG=quill=debug
fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

struct AlwaysReady;

impl CapabilityChecker for AlwaysReady {
    fn check(&self, _request: &TurnRequest) -> Readiness {
        Readiness::ready()
    }
}

struct Blocked;

impl CapabilityChecker for Blocked {
    fn check(&self, _request: &TurnRequest) -> Readiness {
        Readiness::blocked(vec![
            ReadinessIssue::new("NO_MODEL", "No model selected").with_action("Pick a model"),
        ])
    }
}

struct BasicPrompts;

impl PromptBuilder for BasicPrompts {
    fn build(&self, request: &TurnRequest) -> Prompt {
        Prompt {
            system: "You edit one document at a time.".to_string(),
            user: format!("{}\n\n{}", request.instruction, request.content),
        }
    }
}

fn content(text: &str) -> StreamEvent {
    StreamEvent::Content {
        text: text.to_string(),
    }
}

fn final_call(id: &str, name: &str, args: serde_json::Value) -> StreamEvent {
    StreamEvent::ToolCall {
        phase: StreamPhase::Final,
        call: ToolCallFragment::new(id, name, args.to_string()),
    }
}

fn request() -> TurnRequest {
    TurnRequest::new(FILE, CONTENT, "Sort the bullets", "test-model")
}

fn build_controller(scripts: Vec<MockScript>) -> (Arc<TurnController>, Arc<MockStreamFactory>) {
    let factory = Arc::new(MockStreamFactory::new(scripts));

    let mut registry = ToolRegistry::new();
    registry.register(
        "read",
        Arc::new(FnExecutor::new(|args| async move {
            Ok(json!(format!(
                "contents of {}",
                args["paths"][0].as_str().unwrap_or("?")
            )))
        })) as Arc<dyn ToolExecutor>,
    );
    registry.register(
        "list",
        Arc::new(FnExecutor::new(|_| async { Ok(json!(["notes/today.md"])) }))
            as Arc<dyn ToolExecutor>,
    );
    let engine = ToolEngine::new(registry, EngineConfig::default());

    let controller = Arc::new(TurnController::new(
        Arc::new(AlwaysReady),
        Arc::new(BasicPrompts),
        factory.clone() as Arc<dyn StreamFactory>,
        Arc::new(LineDiffBuilder),
        engine,
        Vec::new(),
    ));
    (controller, factory)
}

fn drain(events: &mut mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

#[tokio::test]
async fn answer_only_turn_reaches_responded() {
    let (controller, factory) = build_controller(vec![MockScript::Events(vec![
        content("The bullets are "),
        content("already explained above."),
    ])]);
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::Responded);
    assert_eq!(factory.streams_opened(), 1);

    let events = drain(&mut events);
    let response = events.iter().find_map(|e| match e {
        TurnEvent::Response { text } => Some(text.clone()),
        _ => None,
    });
    assert_eq!(
        response.as_deref(),
        Some("The bullets are already explained above.")
    );
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::Preview { .. })));
}

#[tokio::test]
async fn explore_then_write_awaits_confirmation() {
    init_logs();
    let (controller, factory) = build_controller(vec![
        // First stream: reads the file; the trailing content is abandoned.
        MockScript::Events(vec![
            content("Let me check the note."),
            final_call("c1", "read", json!({"path": FILE})),
            content("this text is never consumed"),
        ]),
        // Second stream: proposes the sorted rewrite.
        MockScript::Events(vec![final_call(
            "c2",
            "write",
            json!({"path": FILE, "content": "- alpha\n- beta\n"}),
        )]),
    ]);
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::AwaitingConfirmation);
    assert_eq!(factory.streams_opened(), 2);

    // The read executed through the engine.
    let calls = controller.engine().calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].state, ToolCallState::Completed);
    assert!(calls[0].auto_approved);

    // History: system, user, assistant+read, tool result, assistant+write.
    let messages = controller.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].tool_calls[0].name, "read");
    assert_eq!(messages[3].role, Role::Tool);
    assert!(messages[3].content.contains("contents of"));
    assert_eq!(messages[4].tool_calls[0].name, "write");
    assert!(!messages
        .iter()
        .any(|m| m.content.contains("never consumed")));

    let events = drain(&mut events);
    let preview = events.iter().find_map(|e| match e {
        TurnEvent::Preview { write, diff, .. } => Some((write.clone(), diff.clone())),
        _ => None,
    });
    let (write, diff) = preview.expect("preview event");
    assert_eq!(write.unwrap().content, "- alpha\n- beta\n");
    let diff = diff.unwrap();
    assert!(!diff.is_noop());
    assert!(diff.stats.additions > 0);

    // Apply accepted.
    controller.complete().unwrap();
    assert_eq!(controller.state(), TurnState::Completed);
    assert!(controller.pending_ops().is_empty());

    // Completing again is a no-op, not an error.
    controller.complete().unwrap();
    assert_eq!(controller.state(), TurnState::Completed);
}

#[tokio::test]
async fn rejected_edit_gets_feedback_then_succeeds() {
    let (controller, factory) = build_controller(vec![
        MockScript::Events(vec![final_call(
            "c1",
            "edit",
            json!({"path": FILE, "old_string": "beta", "new_string": "gamma"}),
        )]),
        MockScript::Events(vec![final_call(
            "c2",
            "write",
            json!({"path": FILE, "content": "- gamma\n- alpha\n"}),
        )]),
    ]);

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::AwaitingConfirmation);
    assert_eq!(factory.streams_opened(), 2);

    // The retry stream saw a corrective user message telling the model to
    // use a whole-content write.
    let requests = factory.recorded_requests();
    let feedback = requests[1].last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert!(feedback.content.contains("'write'"));
    assert!(feedback.content.contains("complete"));
}

#[tokio::test]
async fn identical_write_completes_without_confirmation() {
    let (controller, _factory) = build_controller(vec![MockScript::Events(vec![final_call(
        "c1",
        "write",
        json!({"path": FILE, "content": CONTENT}),
    )])]);
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::Completed);
    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|e| matches!(e, TurnEvent::Preview { .. })));
}

#[tokio::test]
async fn noop_move_alone_completes() {
    let (controller, _factory) = build_controller(vec![MockScript::Events(vec![final_call(
        "c1",
        "move",
        json!({"items": [{"source": FILE, "destination": FILE}]}),
    )])]);

    controller.start(request()).await.unwrap();
    assert_eq!(controller.state(), TurnState::Completed);
}

#[tokio::test]
async fn move_and_write_preview_together() {
    let (controller, _factory) = build_controller(vec![MockScript::Events(vec![
        final_call(
            "c1",
            "move",
            json!({"items": [{"source": FILE, "destination": "notes/sorted.md"}]}),
        ),
        final_call(
            "c2",
            "write",
            json!({"path": "notes/sorted.md", "content": "- alpha\n- beta\n"}),
        ),
    ])]);
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::AwaitingConfirmation);
    let pending = controller.pending_ops();
    assert_eq!(pending.move_op.unwrap().destination, "notes/sorted.md");
    assert_eq!(pending.write.unwrap().path, "notes/sorted.md");

    let events = drain(&mut events);
    assert!(events.iter().any(|e| matches!(
        e,
        TurnEvent::Preview {
            move_op: Some(_),
            write: Some(_),
            ..
        }
    )));
}

#[tokio::test]
async fn write_assembled_from_delta_fragments() {
    let args = json!({"path": FILE, "content": "- alpha\n- beta\n"}).to_string();
    let (head, tail) = args.split_at(args.len() / 2);
    let (controller, _factory) = build_controller(vec![MockScript::Events(vec![
        StreamEvent::ToolCall {
            phase: StreamPhase::Delta,
            call: ToolCallFragment::new("c1", "wri", head),
        },
        StreamEvent::ToolCall {
            phase: StreamPhase::Delta,
            call: ToolCallFragment::new("c1", "te", tail),
        },
        StreamEvent::ToolCall {
            phase: StreamPhase::Final,
            call: ToolCallFragment::new("c1", "", ""),
        },
    ])]);

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::AwaitingConfirmation);
    assert_eq!(
        controller.pending_ops().write.unwrap().content,
        "- alpha\n- beta\n"
    );
}

#[tokio::test]
async fn empty_streams_exhaust_iterations() {
    let (controller, factory) = build_controller(vec![
        MockScript::Events(vec![]),
        MockScript::Events(vec![]),
        MockScript::Events(vec![]),
        MockScript::Events(vec![]),
    ]);
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::Failed);
    assert_eq!(factory.streams_opened(), 4);

    let events = drain(&mut events);
    let error = events.iter().find_map(|e| match e {
        TurnEvent::State {
            state: TurnState::Failed,
            error,
            ..
        } => error.clone(),
        _ => None,
    });
    assert_eq!(
        error.as_deref(),
        Some("exceeded the maximum number of tool iterations")
    );
}

#[tokio::test]
async fn open_error_surfaces_user_message() {
    let (controller, _factory) = build_controller(vec![MockScript::OpenError(
        quill::ApiError::AuthenticationFailed,
    )]);
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::Failed);
    let events = drain(&mut events);
    let error = events.iter().find_map(|e| match e {
        TurnEvent::State {
            state: TurnState::Failed,
            error,
            ..
        } => error.clone(),
        _ => None,
    });
    let error = error.unwrap();
    assert!(error.contains("API key"));
    // No raw transport detail leaks through.
    assert!(!error.contains("401"));
}

#[tokio::test]
async fn mid_stream_error_fails_the_session() {
    let (controller, _factory) = build_controller(vec![MockScript::EventsThenError(
        vec![content("partial answer")],
        quill::ApiError::Overloaded,
    )]);

    controller.start(request()).await.unwrap();
    assert_eq!(controller.state(), TurnState::Failed);
}

#[tokio::test]
async fn readiness_issues_block_before_any_stream() {
    let factory = Arc::new(MockStreamFactory::new(vec![]));
    let engine = ToolEngine::new(ToolRegistry::new(), EngineConfig::default());
    let controller = Arc::new(TurnController::new(
        Arc::new(Blocked),
        Arc::new(BasicPrompts),
        factory.clone() as Arc<dyn StreamFactory>,
        Arc::new(LineDiffBuilder),
        engine,
        Vec::new(),
    ));
    let mut events = controller.subscribe();

    controller.start(request()).await.unwrap();

    assert_eq!(controller.state(), TurnState::Failed);
    assert_eq!(factory.streams_opened(), 0);

    let events = drain(&mut events);
    let issues = events.iter().find_map(|e| match e {
        TurnEvent::State {
            state: TurnState::Failed,
            issues,
            ..
        } => Some(issues.clone()),
        _ => None,
    });
    let issues = issues.unwrap();
    assert_eq!(issues[0].code, "NO_MODEL");
    assert_eq!(issues[0].action.as_deref(), Some("Pick a model"));
}

#[tokio::test]
async fn external_exploration_waits_for_approval() {
    let (controller, factory) = build_controller(vec![
        MockScript::Events(vec![final_call(
            "c1",
            "mcp-web_search",
            json!({"query": "rust"}),
        )]),
        MockScript::Events(vec![content("I could not search the web.")]),
    ]);

    let runner = controller.clone();
    let handle = tokio::spawn(async move { runner.start(request()).await });

    // A non-built-in server never auto-executes; the call parks as pending.
    let mut pending_id = None;
    for _ in 0..50 {
        tokio::task::yield_now().await;
        let calls = controller.engine().calls();
        if let Some(call) = calls.first() {
            if call.state == ToolCallState::Pending {
                pending_id = Some(call.id.clone());
                break;
            }
        }
    }
    let pending_id = pending_id.expect("external call should park as pending");
    assert_eq!(controller.engine().executing_count(), 0);
    assert_eq!(controller.state(), TurnState::Streaming);
    assert_eq!(factory.streams_opened(), 1);

    controller.engine().deny_tool_call(&pending_id).unwrap();
    handle.await.unwrap().unwrap();

    // The denial fed back as a tool result and the model answered in text.
    assert_eq!(controller.state(), TurnState::Responded);
    let messages = controller.messages();
    let denial = messages.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(denial.content.contains("DENIED"));
}

#[tokio::test]
async fn call_ids_stay_unique_across_resumed_streams() {
    let (controller, _factory) = build_controller(vec![
        MockScript::Events(vec![final_call("c1", "read", json!({"path": FILE}))]),
        // The model reuses the id it already spent on the read.
        MockScript::Events(vec![final_call(
            "c1",
            "write",
            json!({"path": FILE, "content": "- alpha\n- beta\n"}),
        )]),
    ]);

    controller.start(request()).await.unwrap();
    assert_eq!(controller.state(), TurnState::AwaitingConfirmation);

    let messages = controller.messages();
    let read_id = &messages[2].tool_calls[0].id;
    let write_id = &messages[4].tool_calls[0].id;
    assert_eq!(read_id, "c1");
    assert_ne!(read_id, write_id);
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("c1"));
}

#[tokio::test]
async fn cancel_is_idempotent_and_wins_over_complete() {
    init_logs();
    let (controller, _factory) = build_controller(vec![MockScript::Hang]);

    let runner = controller.clone();
    let handle = tokio::spawn(async move { runner.start(request()).await });

    // Let the session reach the hung stream.
    for _ in 0..20 {
        tokio::task::yield_now().await;
        if controller.state() == TurnState::Streaming {
            break;
        }
    }
    assert_eq!(controller.state(), TurnState::Streaming);

    controller.cancel();
    handle.await.unwrap().unwrap();
    assert_eq!(controller.state(), TurnState::Cancelled);

    // Repeated cancel and late complete are both no-ops.
    controller.cancel();
    controller.complete().unwrap();
    assert_eq!(controller.state(), TurnState::Cancelled);
}

#[tokio::test]
async fn starting_twice_is_an_error() {
    let (controller, _factory) =
        build_controller(vec![MockScript::Events(vec![content("done")])]);

    controller.start(request()).await.unwrap();
    assert_eq!(controller.state(), TurnState::Responded);

    let err = controller.start(request()).await.unwrap_err();
    assert!(err.to_string().contains("already"));
}

#[tokio::test]
async fn complete_before_preview_is_an_error() {
    let (controller, _factory) = build_controller(vec![]);
    assert!(controller.complete().is_err());
    assert_eq!(controller.state(), TurnState::Idle);
}
