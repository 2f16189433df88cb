//! Backend worker runtime.
//!
//! Each worker runs its [`Backend`] on a dedicated blocking thread. Actions
//! arrive over one channel and are served strictly in order; events go back
//! over another. After every action the runtime emits `Done` or `Error`
//! naming it, so backends only emit the data events themselves.

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::types::{Action, ActionKind, WorkerError, WorkerEvent};

/// A mail source driven by actions.
pub trait Backend: Send + 'static {
    /// Serves one action, emitting any data events through `events`.
    ///
    /// # Errors
    ///
    /// Returns the fault to report for this action.
    fn handle(&mut self, action: Action, events: &EventSink) -> Result<(), WorkerError>;
}

/// Outgoing event channel handed to a backend.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<WorkerEvent>,
}

impl EventSink {
    /// Wraps an event channel.
    #[must_use]
    pub const fn new(tx: UnboundedSender<WorkerEvent>) -> Self {
        Self { tx }
    }

    /// Emits an event. Events sent after the receiver is gone are dropped.
    pub fn emit(&self, event: WorkerEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver closed, dropping event");
        }
    }
}

/// Receiving end of a worker's events.
pub type EventSource = UnboundedReceiver<WorkerEvent>;

/// Handle used to post actions to a worker.
///
/// Dropping the last handle stops the worker once it finishes the action in
/// progress.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: UnboundedSender<Action>,
}

impl WorkerHandle {
    /// Creates a handle over an existing action channel.
    #[must_use]
    pub const fn new(tx: UnboundedSender<Action>) -> Self {
        Self { tx }
    }

    /// Queues an action and returns its kind.
    ///
    /// # Errors
    ///
    /// Returns the action back if the worker has shut down.
    pub fn post(&self, action: Action) -> Result<ActionKind, Action> {
        let kind = action.kind();
        self.tx.send(action).map_err(|e| e.0)?;
        Ok(kind)
    }
}

/// Starts a worker for `backend` and returns its action handle and event
/// source.
///
/// Must be called from within a Tokio runtime.
pub fn spawn(mut backend: Box<dyn Backend>) -> (WorkerHandle, EventSource) {
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let sink = EventSink::new(event_tx);

    tokio::task::spawn_blocking(move || {
        while let Some(action) = action_rx.blocking_recv() {
            let in_response_to = action.kind();
            tracing::trace!(?in_response_to, "serving action");
            match backend.handle(action, &sink) {
                Ok(()) => sink.emit(WorkerEvent::Done { in_response_to }),
                Err(error) => sink.emit(WorkerEvent::Error {
                    in_response_to,
                    error,
                }),
            }
        }
        tracing::trace!("worker stopped");
    });

    (WorkerHandle::new(action_tx), event_rx)
}
