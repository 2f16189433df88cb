//! Actions, events and payloads exchanged with a backend worker.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

/// Identifier of a message within an opened directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u32);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key a directory listing is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Time the message arrived in the folder.
    Arrival,
}

/// One sort criterion for a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortCriterion {
    /// What to sort by.
    pub key: SortKey,
    /// Descending order when set.
    pub reverse: bool,
}

impl SortCriterion {
    /// Newest arrivals first.
    pub const NEWEST_FIRST: Self = Self {
        key: SortKey::Arrival,
        reverse: true,
    };
}

/// Request posted to a backend worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Hand the account's connection settings to the backend.
    Configure(BTreeMap<String, String>),
    /// Connect to the mail source.
    Connect,
    /// Open the named directory (folder).
    OpenDirectory(String),
    /// List the messages in the open directory.
    FetchDirectoryContents {
        /// Ordering of the listing.
        sort: Vec<SortCriterion>,
    },
    /// Fetch envelopes for the given messages.
    FetchMessageHeaders(Vec<MessageId>),
}

impl Action {
    /// Returns the kind of this action.
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::Configure(_) => ActionKind::Configure,
            Self::Connect => ActionKind::Connect,
            Self::OpenDirectory(_) => ActionKind::OpenDirectory,
            Self::FetchDirectoryContents { .. } => ActionKind::FetchDirectoryContents,
            Self::FetchMessageHeaders(_) => ActionKind::FetchMessageHeaders,
        }
    }
}

/// Payload-free tag naming an [`Action`], used to pair responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// [`Action::Configure`].
    Configure,
    /// [`Action::Connect`].
    Connect,
    /// [`Action::OpenDirectory`].
    OpenDirectory,
    /// [`Action::FetchDirectoryContents`].
    FetchDirectoryContents,
    /// [`Action::FetchMessageHeaders`].
    FetchMessageHeaders,
}

/// Summary of an opened directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryInfo {
    /// Directory name as requested.
    pub name: String,
    /// Number of messages it holds.
    pub exists: usize,
}

/// A mailbox address with its display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name (may be empty).
    pub name: String,
    /// Email address as written.
    pub email: String,
}

impl Address {
    /// Creates an address.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Sender and recipient metadata of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// `From` addresses.
    pub from: Vec<Address>,
    /// `Reply-To` addresses.
    pub reply_to: Vec<Address>,
    /// `To` addresses.
    pub to: Vec<Address>,
    /// `Cc` addresses.
    pub cc: Vec<Address>,
    /// `Bcc` addresses.
    pub bcc: Vec<Address>,
}

impl Envelope {
    /// Iterates over every address in From, Reply-To, To, Cc and Bcc order.
    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.from
            .iter()
            .chain(&self.reply_to)
            .chain(&self.to)
            .chain(&self.cc)
            .chain(&self.bcc)
    }
}

/// Header information for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageInfo {
    /// Message identifier.
    pub id: MessageId,
    /// Parsed envelope.
    pub envelope: Envelope,
    /// When the message arrived.
    pub arrived_at: DateTime<Utc>,
}

/// Fault reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The source could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// An action needed a connection first.
    #[error("Not connected")]
    NotConnected,

    /// An action needed an open directory first.
    #[error("No directory open")]
    NoDirectory,

    /// The requested directory does not exist.
    #[error("No such directory: {0}")]
    NoSuchDirectory(String),

    /// The backend cannot perform this action.
    #[error("Unsupported action: {0:?}")]
    Unsupported(ActionKind),

    /// I/O failure while serving an action.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for WorkerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Event emitted by a backend worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// The open directory was described.
    DirectoryInfo(DirectoryInfo),
    /// The open directory was listed.
    DirectoryContents(Vec<MessageId>),
    /// One message's headers arrived.
    MessageInfo(MessageInfo),
    /// An action finished successfully.
    Done {
        /// Which action finished.
        in_response_to: ActionKind,
    },
    /// An action failed.
    Error {
        /// Which action failed.
        in_response_to: ActionKind,
        /// Why.
        error: WorkerError,
    },
}

impl WorkerEvent {
    /// Short name of the event variant, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DirectoryInfo(_) => "DirectoryInfo",
            Self::DirectoryContents(_) => "DirectoryContents",
            Self::MessageInfo(_) => "MessageInfo",
            Self::Done { .. } => "Done",
            Self::Error { .. } => "Error",
        }
    }
}
