//! Local Maildir backend.
//!
//! The source root holds one maildir per folder (`ROOT/NAME/{cur,new}`).
//! `INBOX` also resolves to the root itself when the root is a maildir.
//! Message ids are assigned per listing, starting at 1.

mod envelope;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

pub use envelope::{Headers, decode_encoded_words, parse_address_list};

use super::runtime::{Backend, EventSink};
use super::types::{
    Action, DirectoryInfo, MessageId, MessageInfo, SortCriterion, SortKey, WorkerError,
    WorkerEvent,
};

/// Subdirectories that hold delivered messages.
const MESSAGE_DIRS: [&str; 2] = ["new", "cur"];

/// Serves actions from a tree of maildirs on local disk.
#[derive(Debug)]
pub struct MaildirBackend {
    root: PathBuf,
    settings: BTreeMap<String, String>,
    connected: bool,
    folder: Option<PathBuf>,
    messages: Vec<MessageFile>,
}

#[derive(Debug, Clone)]
struct MessageFile {
    path: PathBuf,
    arrived_at: DateTime<Utc>,
}

impl MaildirBackend {
    /// Creates a backend rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            settings: BTreeMap::new(),
            connected: false,
            folder: None,
            messages: Vec::new(),
        }
    }

    fn connect(&mut self) -> Result<(), WorkerError> {
        if !self.root.is_dir() {
            return Err(WorkerError::Connection(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        self.connected = true;
        tracing::debug!(root = %self.root.display(), settings = self.settings.len(), "maildir connected");
        Ok(())
    }

    fn open_directory(&mut self, name: String, events: &EventSink) -> Result<(), WorkerError> {
        if !self.connected {
            return Err(WorkerError::NotConnected);
        }

        let folder = self
            .resolve_folder(&name)
            .ok_or_else(|| WorkerError::NoSuchDirectory(name.clone()))?;
        let exists = list_messages(&folder)?.len();

        self.folder = Some(folder);
        self.messages.clear();
        events.emit(WorkerEvent::DirectoryInfo(DirectoryInfo { name, exists }));
        Ok(())
    }

    fn fetch_contents(
        &mut self,
        sort: &[SortCriterion],
        events: &EventSink,
    ) -> Result<(), WorkerError> {
        let folder = self.folder.as_ref().ok_or(WorkerError::NoDirectory)?;
        let mut messages = list_messages(folder)?;

        // Stable sorts applied last-to-first leave the first criterion
        // dominant.
        messages.sort_by(|a, b| a.path.cmp(&b.path));
        for criterion in sort.iter().rev() {
            match criterion.key {
                SortKey::Arrival => messages.sort_by(|a, b| {
                    let ord = a.arrived_at.cmp(&b.arrived_at);
                    if criterion.reverse { ord.reverse() } else { ord }
                }),
            }
        }

        let ids = (1..=messages.len())
            .map(|n| MessageId(u32::try_from(n).unwrap_or(u32::MAX)))
            .collect();
        self.messages = messages;
        events.emit(WorkerEvent::DirectoryContents(ids));
        Ok(())
    }

    fn fetch_headers(&self, ids: &[MessageId], events: &EventSink) -> Result<(), WorkerError> {
        if self.folder.is_none() {
            return Err(WorkerError::NoDirectory);
        }

        for &id in ids {
            let Some(message) = id
                .0
                .checked_sub(1)
                .and_then(|index| self.messages.get(index as usize))
            else {
                tracing::warn!(%id, "unknown message id");
                continue;
            };

            match read_envelope(&message.path) {
                Ok(headers) => events.emit(WorkerEvent::MessageInfo(MessageInfo {
                    id,
                    envelope: headers.envelope(),
                    arrived_at: message.arrived_at,
                })),
                Err(e) => {
                    tracing::warn!(path = %message.path.display(), error = %e, "skipping unreadable message");
                }
            }
        }
        Ok(())
    }

    fn resolve_folder(&self, name: &str) -> Option<PathBuf> {
        let candidate = self.root.join(name);
        if is_maildir(&candidate) {
            return Some(candidate);
        }
        if name.eq_ignore_ascii_case("INBOX") && is_maildir(&self.root) {
            return Some(self.root.clone());
        }
        None
    }
}

impl Backend for MaildirBackend {
    fn handle(&mut self, action: Action, events: &EventSink) -> Result<(), WorkerError> {
        match action {
            Action::Configure(settings) => {
                self.settings = settings;
                Ok(())
            }
            Action::Connect => self.connect(),
            Action::OpenDirectory(name) => self.open_directory(name, events),
            Action::FetchDirectoryContents { sort } => self.fetch_contents(&sort, events),
            Action::FetchMessageHeaders(ids) => self.fetch_headers(&ids, events),
        }
    }
}

fn is_maildir(path: &Path) -> bool {
    MESSAGE_DIRS.iter().all(|sub| path.join(sub).is_dir())
}

fn list_messages(folder: &Path) -> Result<Vec<MessageFile>, WorkerError> {
    let mut messages = Vec::new();
    for sub in MESSAGE_DIRS {
        for entry in fs::read_dir(folder.join(sub))? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            // Dot files are not deliveries.
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            messages.push(MessageFile {
                path: entry.path(),
                arrived_at: DateTime::<Utc>::from(modified),
            });
        }
    }
    Ok(messages)
}

fn read_envelope(path: &Path) -> std::io::Result<Headers> {
    Headers::read(BufReader::new(File::open(path)?))
}
