//! Per-account session state machine.
//!
//! A session walks its backend through a fixed sequence:
//!
//! ```text
//! Configure, Connect ─▶ Done(Connect) ─▶ OpenDirectory
//!   DirectoryInfo ─▶ FetchDirectoryContents
//!   DirectoryContents ─▶ FetchMessageHeaders
//!   MessageInfo* ─▶ Done(FetchMessageHeaders) ─▶ terminated
//! ```
//!
//! An `Error` event at any point ends the session.

use std::collections::BTreeMap;

use tracing::Span;

use super::store::MessageStore;
use crate::book::SightingSink;
use crate::config::AccountConfig;
use crate::worker::{
    self, Action, ActionKind, Backend, DirectoryInfo, EventSource, MessageId, MessageInfo,
    WorkerError, WorkerEvent, WorkerHandle,
};

/// Where a session is in its protocol sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Nothing posted yet.
    #[default]
    Created,
    /// Waiting for the connection.
    Connecting,
    /// Connected, folder not requested yet.
    Connected,
    /// Waiting for the folder to open.
    OpeningFolder,
    /// Folder described, message store created.
    DirectoryKnown,
    /// Waiting for the folder listing.
    FetchingContents,
    /// Waiting for message headers.
    FetchingHeaders,
    /// Every header was fetched.
    Done,
    /// The backend reported a fault.
    Failed,
}

impl SessionPhase {
    /// Returns `true` for `Done` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Outcome of handling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SessionStatus {
    /// The session expects more events.
    Live,
    /// The session is finished and can be dropped.
    Terminated,
}

/// Drives one account's backend and reports the addresses it sees.
#[derive(Debug)]
pub struct SessionController {
    account: String,
    folder: String,
    worker: WorkerHandle,
    store: Option<MessageStore>,
    pending: Option<ActionKind>,
    phase: SessionPhase,
    sightings: usize,
    span: Span,
}

impl SessionController {
    /// Spawns a worker for `backend` and starts a session on it.
    ///
    /// Returns the controller together with the worker's event source.
    pub fn start(
        account: &AccountConfig,
        folder: &str,
        backend: Box<dyn Backend>,
        parent: &Span,
    ) -> (Self, EventSource) {
        let (worker, events) = worker::spawn(backend);
        let controller = Self::new(
            &account.name,
            folder,
            account.settings.clone(),
            worker,
            parent,
        );
        (controller, events)
    }

    /// Starts a session on an existing worker: pushes `settings` and
    /// connects.
    pub fn new(
        account: &str,
        folder: &str,
        settings: BTreeMap<String, String>,
        worker: WorkerHandle,
        parent: &Span,
    ) -> Self {
        let span = tracing::info_span!(parent: parent, "session", account = %account);
        let mut session = Self {
            account: account.to_string(),
            folder: folder.to_string(),
            worker,
            store: None,
            pending: None,
            phase: SessionPhase::Created,
            sightings: 0,
            span,
        };

        if session.post(Action::Configure(settings)) && session.post(Action::Connect) {
            session.span.in_scope(|| tracing::info!("connecting"));
        }
        session
    }

    /// Handles one event from the worker, merging any sightings into `sink`.
    pub fn handle_event(
        &mut self,
        event: WorkerEvent,
        sink: &mut dyn SightingSink,
    ) -> SessionStatus {
        let span = self.span.clone();
        let _entered = span.enter();
        tracing::debug!(event = event.name(), phase = ?self.phase, "event");

        if self.phase.is_terminal() {
            tracing::warn!(event = event.name(), "event after session ended");
            return SessionStatus::Terminated;
        }

        match event {
            WorkerEvent::Error {
                in_response_to,
                error,
            } => self.failed(in_response_to, &error),
            WorkerEvent::DirectoryInfo(info) => self.directory_info(info),
            WorkerEvent::DirectoryContents(ids) => self.directory_contents(ids),
            WorkerEvent::MessageInfo(info) => {
                self.message_info(&info, sink);
                SessionStatus::Live
            }
            WorkerEvent::Done { in_response_to } => self.done(in_response_to),
        }
    }

    fn failed(&mut self, in_response_to: ActionKind, error: &WorkerError) -> SessionStatus {
        tracing::warn!(?in_response_to, %error, "backend error, ending session");
        self.phase = SessionPhase::Failed;
        self.pending = None;
        SessionStatus::Terminated
    }

    fn directory_info(&mut self, info: DirectoryInfo) -> SessionStatus {
        if let Some(store) = self.store.as_mut() {
            store.apply_info(info);
            return SessionStatus::Live;
        }

        tracing::debug!(directory = %info.name, exists = info.exists, "creating message store");
        let store = MessageStore::newest_first(info);
        let request = store.contents_request();
        self.store = Some(store);
        self.phase = SessionPhase::DirectoryKnown;
        self.post_or_fail(request)
    }

    fn directory_contents(&mut self, ids: Vec<MessageId>) -> SessionStatus {
        let Some(store) = self.store.as_mut() else {
            tracing::warn!(count = ids.len(), "listing arrived before the directory was described");
            return SessionStatus::Live;
        };

        tracing::debug!(count = ids.len(), "received directory contents");
        store.update_contents(ids);
        let request = store.headers_request();
        self.post_or_fail(request)
    }

    fn message_info(&mut self, info: &MessageInfo, sink: &mut dyn SightingSink) {
        for address in info.envelope.addresses() {
            sink.receive(&address.email, &address.name, info.arrived_at);
            self.sightings += 1;
        }
    }

    fn done(&mut self, in_response_to: ActionKind) -> SessionStatus {
        if self.pending == Some(in_response_to) {
            self.pending = None;
        }

        match in_response_to {
            ActionKind::Connect => {
                tracing::info!("connected");
                self.phase = SessionPhase::Connected;
                let folder = self.folder.clone();
                self.post_or_fail(Action::OpenDirectory(folder))
            }
            ActionKind::OpenDirectory => {
                tracing::debug!(folder = %self.folder, "opened directory");
                SessionStatus::Live
            }
            ActionKind::FetchDirectoryContents => {
                tracing::debug!("directory contents complete");
                SessionStatus::Live
            }
            ActionKind::FetchMessageHeaders => {
                tracing::info!(sightings = self.sightings, "all headers fetched");
                self.phase = SessionPhase::Done;
                SessionStatus::Terminated
            }
            ActionKind::Configure => {
                tracing::debug!(?in_response_to, "unexpected completion");
                SessionStatus::Live
            }
        }
    }

    /// Posts an action, moving to the phase it starts. Returns `false` if
    /// the worker is gone, after marking the session failed.
    fn post(&mut self, action: Action) -> bool {
        match self.worker.post(action) {
            Ok(kind) => {
                self.pending = Some(kind);
                self.phase = match kind {
                    ActionKind::Configure => self.phase,
                    ActionKind::Connect => SessionPhase::Connecting,
                    ActionKind::OpenDirectory => SessionPhase::OpeningFolder,
                    ActionKind::FetchDirectoryContents => SessionPhase::FetchingContents,
                    ActionKind::FetchMessageHeaders => SessionPhase::FetchingHeaders,
                };
                true
            }
            Err(action) => {
                self.span.in_scope(|| {
                    tracing::warn!(action = ?action.kind(), "worker has shut down");
                });
                self.phase = SessionPhase::Failed;
                false
            }
        }
    }

    fn post_or_fail(&mut self, action: Action) -> SessionStatus {
        if self.post(action) {
            SessionStatus::Live
        } else {
            SessionStatus::Terminated
        }
    }

    /// Account name.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Folder being scanned.
    #[must_use]
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Most recently posted action that has not completed.
    #[must_use]
    pub const fn pending(&self) -> Option<ActionKind> {
        self.pending
    }

    /// Message store, once the directory has been described.
    #[must_use]
    pub const fn store(&self) -> Option<&MessageStore> {
        self.store.as_ref()
    }

    /// Number of sightings reported so far.
    #[must_use]
    pub const fn sightings(&self) -> usize {
        self.sightings
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    use super::*;
    use crate::worker::{Address, Envelope};

    #[derive(Default)]
    struct Collected(Vec<(String, String, DateTime<Utc>)>);

    impl SightingSink for Collected {
        fn receive(&mut self, email: &str, name: &str, used_at: DateTime<Utc>) {
            self.0.push((email.to_string(), name.to_string(), used_at));
        }
    }

    fn session() -> (SessionController, UnboundedReceiver<Action>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = SessionController::new(
            "work",
            "Sent",
            BTreeMap::from([("key".to_string(), "value".to_string())]),
            WorkerHandle::new(tx),
            &Span::none(),
        );
        (controller, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<Action>) -> Vec<Action> {
        std::iter::from_fn(|| rx.try_recv().ok()).collect()
    }

    fn done(kind: ActionKind) -> WorkerEvent {
        WorkerEvent::Done {
            in_response_to: kind,
        }
    }

    fn directory_info() -> WorkerEvent {
        WorkerEvent::DirectoryInfo(DirectoryInfo {
            name: "Sent".to_string(),
            exists: 3,
        })
    }

    fn message(id: u32, to: &[(&str, &str)]) -> WorkerEvent {
        WorkerEvent::MessageInfo(MessageInfo {
            id: MessageId(id),
            envelope: Envelope {
                from: vec![Address::new("Me", "me@example.com")],
                to: to.iter().map(|(n, e)| Address::new(*n, *e)).collect(),
                ..Envelope::default()
            },
            arrived_at: Utc.timestamp_opt(1_700_000_000 + i64::from(id), 0).unwrap(),
        })
    }

    #[test]
    fn test_start_configures_and_connects() {
        let (session, mut rx) = session();
        assert_eq!(session.phase(), SessionPhase::Connecting);
        assert_eq!(session.pending(), Some(ActionKind::Connect));
        assert_eq!(
            drain(&mut rx),
            vec![
                Action::Configure(BTreeMap::from([("key".to_string(), "value".to_string())])),
                Action::Connect,
            ]
        );
    }

    #[test]
    fn test_full_sequence() {
        let (mut session, mut rx) = session();
        drain(&mut rx);
        let mut sink = Collected::default();

        let events = vec![
            done(ActionKind::Configure),
            done(ActionKind::Connect),
            directory_info(),
            done(ActionKind::OpenDirectory),
            WorkerEvent::DirectoryContents(vec![MessageId(3), MessageId(2), MessageId(1)]),
            done(ActionKind::FetchDirectoryContents),
            message(3, &[("Alice", "alice@acme.com")]),
            message(1, &[("", "bob@other.com"), ("Carol", "carol@sub.acme.com")]),
            message(2, &[]),
        ];

        for event in events {
            assert_eq!(session.handle_event(event, &mut sink), SessionStatus::Live);
        }
        assert_eq!(session.phase(), SessionPhase::FetchingHeaders);
        assert_eq!(
            session.handle_event(done(ActionKind::FetchMessageHeaders), &mut sink),
            SessionStatus::Terminated
        );
        assert_eq!(session.phase(), SessionPhase::Done);

        let posted = drain(&mut rx);
        assert_eq!(
            posted,
            vec![
                Action::OpenDirectory("Sent".to_string()),
                Action::FetchDirectoryContents {
                    sort: vec![crate::worker::SortCriterion::NEWEST_FIRST]
                },
                Action::FetchMessageHeaders(vec![MessageId(3), MessageId(2), MessageId(1)]),
            ]
        );

        // One From per message plus every To.
        assert_eq!(sink.0.len(), 6);
        assert_eq!(session.sightings(), 6);
        assert!(
            sink.0
                .iter()
                .any(|(email, name, _)| email == "carol@sub.acme.com" && name == "Carol")
        );
    }

    #[test]
    fn test_store_created_once() {
        let (mut session, mut rx) = session();
        let mut sink = Collected::default();
        let _ = session.handle_event(done(ActionKind::Connect), &mut sink);
        let _ = session.handle_event(directory_info(), &mut sink);
        let _ = session.handle_event(
            WorkerEvent::DirectoryInfo(DirectoryInfo {
                name: "Sent".to_string(),
                exists: 4,
            }),
            &mut sink,
        );

        assert_eq!(session.store().unwrap().info().exists, 4);
        let fetches = drain(&mut rx)
            .into_iter()
            .filter(|a| a.kind() == ActionKind::FetchDirectoryContents)
            .count();
        assert_eq!(fetches, 1);
    }

    #[test]
    fn test_contents_without_store_are_ignored() {
        let (mut session, mut rx) = session();
        drain(&mut rx);
        let mut sink = Collected::default();
        assert_eq!(
            session.handle_event(WorkerEvent::DirectoryContents(vec![MessageId(1)]), &mut sink),
            SessionStatus::Live
        );
        assert!(drain(&mut rx).is_empty());
        assert!(session.store().is_none());
    }

    #[test]
    fn test_error_terminates() {
        let (mut session, _rx) = session();
        let mut sink = Collected::default();
        let status = session.handle_event(
            WorkerEvent::Error {
                in_response_to: ActionKind::Connect,
                error: WorkerError::Connection("refused".to_string()),
            },
            &mut sink,
        );
        assert_eq!(status, SessionStatus::Terminated);
        assert_eq!(session.phase(), SessionPhase::Failed);
    }

    #[test]
    fn test_events_after_end_are_absorbed() {
        let (mut session, _rx) = session();
        let mut sink = Collected::default();
        let _ = session.handle_event(
            WorkerEvent::Error {
                in_response_to: ActionKind::Connect,
                error: WorkerError::NotConnected,
            },
            &mut sink,
        );
        let status = session.handle_event(message(1, &[("", "late@x.org")]), &mut sink);
        assert_eq!(status, SessionStatus::Terminated);
        assert!(sink.0.is_empty());
    }

    #[test]
    fn test_worker_gone_fails_session() {
        let (mut session, rx) = session();
        drop(rx);
        let mut sink = Collected::default();
        let status = session.handle_event(done(ActionKind::Connect), &mut sink);
        assert_eq!(status, SessionStatus::Terminated);
        assert_eq!(session.phase(), SessionPhase::Failed);
    }
}
