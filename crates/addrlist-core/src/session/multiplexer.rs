//! Waits on every live session's event source at once and routes each event
//! to its session.

use std::future::poll_fn;
use std::task::Poll;

use tracing::{Instrument, Span};

use super::controller::{SessionController, SessionPhase, SessionStatus};
use crate::book::SightingSink;
use crate::config::Config;
use crate::worker::{self, EventSource, WorkerEvent};

/// Totals for one multiplexer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sessions that fetched every header.
    pub completed: usize,
    /// Sessions that ended on an error or lost their worker.
    pub failed: usize,
    /// Events dispatched.
    pub events: usize,
}

/// Set of live sessions.
#[derive(Debug)]
pub struct Multiplexer {
    live: Vec<(SessionController, EventSource)>,
    cursor: usize,
    span: Span,
}

impl Multiplexer {
    /// Creates an empty multiplexer logging under `span`.
    #[must_use]
    pub const fn new(span: Span) -> Self {
        Self {
            live: Vec::new(),
            cursor: 0,
            span,
        }
    }

    /// Adds a started session.
    pub fn register(&mut self, session: SessionController, events: EventSource) {
        self.live.push((session, events));
    }

    /// Starts a session for every scannable account.
    ///
    /// Accounts whose source has no backend are logged and skipped. Must be
    /// called from within a Tokio runtime.
    pub fn register_accounts(&mut self, config: &Config) {
        for (account, folder) in config.scannable_accounts() {
            let backend = match worker::open_backend(&account.source) {
                Ok(backend) => backend,
                Err(e) => {
                    self.span.in_scope(|| {
                        tracing::warn!(account = %account.name, error = %e, "skipping account");
                    });
                    continue;
                }
            };
            let (session, events) =
                SessionController::start(account, folder, backend, &self.span);
            self.register(session, events);
        }
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` when no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Dispatches events until every session has terminated.
    pub async fn run(&mut self, sink: &mut dyn SightingSink) -> RunSummary {
        let span = self.span.clone();
        self.run_inner(sink).instrument(span).await
    }

    async fn run_inner(&mut self, sink: &mut dyn SightingSink) -> RunSummary {
        let mut summary = RunSummary::default();
        tracing::info!(sessions = self.live.len(), "waiting for sessions");

        while !self.live.is_empty() {
            let (index, event) = self.next_event().await;
            let Some(event) = event else {
                let (session, _) = self.live.swap_remove(index);
                tracing::warn!(
                    account = session.account(),
                    phase = ?session.phase(),
                    "event source closed before session ended"
                );
                summary.failed += 1;
                continue;
            };

            summary.events += 1;
            let session = &mut self.live[index].0;
            if session.handle_event(event, sink) == SessionStatus::Terminated {
                let (session, _) = self.live.swap_remove(index);
                if session.phase() == SessionPhase::Done {
                    summary.completed += 1;
                } else {
                    summary.failed += 1;
                }
                tracing::debug!(account = session.account(), remaining = self.live.len(), "session retired");
            }
        }

        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            events = summary.events,
            "all sessions finished"
        );
        summary
    }

    /// Waits for the next event from any live session.
    ///
    /// Returns the session's index and its event, or `None` if that
    /// session's source has closed. Scanning starts one past the last ready
    /// session so a busy source cannot starve the rest.
    async fn next_event(&mut self) -> (usize, Option<WorkerEvent>) {
        poll_fn(|cx| {
            let count = self.live.len();
            for offset in 0..count {
                let index = (self.cursor + offset) % count;
                if let Poll::Ready(event) = self.live[index].1.poll_recv(cx) {
                    self.cursor = index + 1;
                    return Poll::Ready((index, event));
                }
            }
            Poll::Pending
        })
        .await
    }
}
