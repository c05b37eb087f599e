// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Scripted stream factory for testing
//!
//! Yields pre-programmed event sequences, one script per opened stream, so
//! turn-controller behavior can be tested without a real provider.

use async_stream::stream;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{ApiError, QuillError, Result};
use crate::llm::message::Message;
use crate::llm::provider::{EventStream, StreamEvent, StreamFactory, ToolDefinition};

/// One scripted stream: either a sequence of events or a transport failure.
#[derive(Debug)]
pub enum MockScript {
    /// Yield these events, then end the stream
    Events(Vec<StreamEvent>),
    /// Fail when the stream is opened
    OpenError(ApiError),
    /// Yield events, then surface a mid-stream transport error
    EventsThenError(Vec<StreamEvent>, ApiError),
    /// Never yield; only resolves via cancellation
    Hang,
}

/// Stream factory that replays scripts in order
pub struct MockStreamFactory {
    scripts: Mutex<VecDeque<MockScript>>,
    opened: AtomicUsize,
    /// Message history snapshots captured at each open
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockStreamFactory {
    pub fn new(scripts: Vec<MockScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            opened: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of streams opened so far
    pub fn streams_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Message histories the factory was called with, in order
    pub fn recorded_requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl StreamFactory for MockStreamFactory {
    async fn open(
        &self,
        messages: &[Message],
        _model: &str,
        _tools: &[ToolDefinition],
        cancel: CancellationToken,
    ) -> Result<EventStream> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(messages.to_vec());

        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .ok_or_else(|| {
                QuillError::Api(ApiError::InvalidResponse(
                    "mock factory exhausted its scripts".to_string(),
                ))
            })?;

        match script {
            MockScript::OpenError(err) => Err(QuillError::Api(err)),
            MockScript::Events(events) => Ok(scripted_stream(events, None, cancel)),
            MockScript::EventsThenError(events, err) => {
                Ok(scripted_stream(events, Some(err), cancel))
            }
            MockScript::Hang => {
                let s = stream! {
                    cancel.cancelled().await;
                    // Cancelled streams stop yielding; nothing to emit.
                    if false {
                        yield Ok(StreamEvent::Content { text: String::new() });
                    }
                };
                Ok(Box::pin(s))
            }
        }
    }
}

fn scripted_stream(
    events: Vec<StreamEvent>,
    trailing_error: Option<ApiError>,
    cancel: CancellationToken,
) -> EventStream {
    let s = stream! {
        for event in events {
            if cancel.is_cancelled() {
                return;
            }
            yield Ok(event);
        }
        if let Some(err) = trailing_error {
            if !cancel.is_cancelled() {
                yield Err(QuillError::Api(err));
            }
        }
    };
    Box::pin(s)
}
