//! Session controller: the single-flight query pipeline. Owns the streaming
//! state machine, drives the decoder and interpreter over one open request,
//! and commits the finished exchange into the conversation store.

use futures_util::StreamExt;
use std::sync::Mutex;

use crate::api::ApiClient;
use crate::decoder::LineDecoder;
use crate::events::{StreamAccumulator, StreamUpdate};
use crate::store::{ConversationStore, Message};

/// Shown in place of an answer when the transport fails mid-query.
const TRANSPORT_ERROR_TEXT: &str = "Sorry, an error occurred. Please try again.";

/// Session state machine: `Idle --submit--> Streaming --(success|error)--> Idle`.
/// Errors are message-level and never persist past a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
}

/// Result of one `submit` call. All failures are recoverable; the session is
/// always back at `Idle` when this is returned.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Stream drained and the assistant message was committed to the store.
    Completed(Message),
    /// Transport or persistence failure; a synthetic error message was
    /// appended in place of the answer.
    Failed(String),
    /// Empty query, or another stream was already in flight. Nothing was
    /// sent and nothing was stored.
    Rejected,
}

/// Listener for incremental updates while a stream is open. Any rendering
/// layer (terminal, web view, test harness) can implement this.
pub trait StreamObserver {
    fn on_update(&mut self, update: &StreamUpdate);
}

impl<F: FnMut(&StreamUpdate)> StreamObserver for F {
    fn on_update(&mut self, update: &StreamUpdate) {
        self(update)
    }
}

/// One client session: at most one streaming query in flight at a time,
/// client-wide, regardless of which conversation is active.
pub struct Session {
    api: ApiClient,
    state: Mutex<SessionState>,
    store: Mutex<ConversationStore>,
}

impl Session {
    pub fn new(api: ApiClient, store: ConversationStore) -> Self {
        Self {
            api,
            state: Mutex::new(SessionState::Idle),
            store: Mutex::new(store),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` against the conversation store.
    pub fn with_store<T>(&self, f: impl FnOnce(&mut ConversationStore) -> T) -> T {
        f(&mut self.store.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Change the active conversation. Silent no-op while a stream is open,
    /// to prevent cross-conversation races with the in-flight accumulation.
    pub fn switch_conversation(&self, id: &str) {
        if self.state() == SessionState::Streaming {
            return;
        }
        self.with_store(|store| store.switch_to(id));
    }

    /// Submit a query against the active conversation. Fails fast with
    /// `Rejected` (no network call) when a stream is already open or the
    /// query is empty. The streaming flag is cleared on every return path.
    pub async fn submit<O: StreamObserver>(
        &self,
        query: &str,
        observer: &mut O,
    ) -> SubmitOutcome {
        let query = query.trim();
        if query.is_empty() || !self.try_begin() {
            return SubmitOutcome::Rejected;
        }
        let outcome = self.run_query(query, observer).await;
        self.release();
        outcome
    }

    fn try_begin(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SessionState::Streaming {
            return false;
        }
        *state = SessionState::Streaming;
        true
    }

    fn release(&self) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = SessionState::Idle;
    }

    async fn run_query<O: StreamObserver>(&self, query: &str, observer: &mut O) -> SubmitOutcome {
        let active_id = self.with_store(|store| store.active_id().to_string());
        if let Err(err) = self.with_store(|store| store.append_message(&active_id, Message::user(query)))
        {
            return SubmitOutcome::Failed(err.to_string());
        }

        let response = match self.api.open_query_stream(query).await {
            Ok(response) => response,
            Err(err) => return self.fail(&active_id, format!("request failed: {}", err)),
        };
        if !response.status().is_success() {
            return self.fail(&active_id, format!("HTTP {}", response.status()));
        }

        let mut fragments = response.bytes_stream();
        let mut decoder = LineDecoder::new();
        let mut accumulator = StreamAccumulator::new();

        while let Some(fragment) = fragments.next().await {
            match fragment {
                Ok(bytes) => {
                    for line in decoder.push(&bytes) {
                        if let Some(update) = accumulator.feed_line(&line) {
                            observer.on_update(&update);
                        }
                    }
                }
                Err(err) => return self.fail(&active_id, format!("stream failed: {}", err)),
            }
        }
        if let Some(remainder) = decoder.finish() {
            tracing::debug!(
                "discarding {} bytes of unterminated trailing line",
                remainder.len()
            );
        }

        let outcome = accumulator.finish();
        tracing::debug!(
            chars = outcome.content.len(),
            citations = outcome.citations.len(),
            errored = outcome.errored,
            "stream drained"
        );
        let sources = (!outcome.citations.is_empty()).then_some(outcome.citations);
        let message = Message::assistant(outcome.content, sources, outcome.timing);
        match self.with_store(|store| store.append_message(&active_id, message.clone())) {
            Ok(()) => SubmitOutcome::Completed(message),
            Err(err) => SubmitOutcome::Failed(err.to_string()),
        }
    }

    /// The in-progress accumulation is discarded; a synthetic assistant error
    /// message takes its place so the conversation records the failure.
    fn fail(&self, active_id: &str, reason: String) -> SubmitOutcome {
        let message = Message::assistant(TRANSPORT_ERROR_TEXT, None, None);
        if let Err(err) = self.with_store(|store| store.append_message(active_id, message)) {
            tracing::warn!("could not record error message: {}", err);
        }
        SubmitOutcome::Failed(reason)
    }
}
