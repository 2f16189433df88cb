//! In-memory address book with import/export to the store file.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Months, Utc};
use tracing::Span;

use super::model::{AddressKey, AddressRecord};
use super::search;
use super::store::{read_records, write_records};
use crate::Result;

/// Receiver for addresses seen in message envelopes.
pub trait SightingSink {
    /// Records that `email` (shown as `name`) was used at `used_at`.
    fn receive(&mut self, email: &str, name: &str, used_at: DateTime<Utc>);
}

/// Merged contact records keyed by normalized email.
#[derive(Debug)]
pub struct AddressBook {
    records: HashMap<AddressKey, AddressRecord>,
    last_updated: DateTime<Utc>,
    span: Span,
}

impl AddressBook {
    /// Creates an empty book that logs under `span`.
    #[must_use]
    pub fn new(span: Span) -> Self {
        let now = Utc::now();
        Self {
            records: HashMap::new(),
            last_updated: now.checked_sub_months(Months::new(60)).unwrap_or(now),
            span,
        }
    }

    /// Merges one sighting into the book.
    ///
    /// A newer sighting moves `last_used` forward and replaces the name when
    /// it carries one. An older or equal sighting only fills in a missing
    /// name.
    pub fn receive_record(
        &mut self,
        email: &str,
        name: &str,
        used_at: DateTime<Utc>,
    ) -> &AddressRecord {
        let incoming = AddressRecord::from_sighting(email, name, used_at);
        let key = incoming.key();

        self.records
            .entry(key)
            .and_modify(|existing| {
                if existing.last_used < incoming.last_used {
                    existing.last_used = incoming.last_used;
                    if !incoming.name.is_empty() {
                        existing.name.clone_from(&incoming.name);
                    }
                } else if existing.name.is_empty() && !incoming.name.is_empty() {
                    existing.name.clone_from(&incoming.name);
                }
            })
            .or_insert(incoming)
    }

    /// Merges every row of the store at `path` into the book.
    ///
    /// The ignore flag of each row overrides whatever the book held. A
    /// missing file leaves the book unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or the first malformed row; rows
    /// before it stay merged.
    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _entered = self.span.clone().entered();
        tracing::info!(path = %path.display(), "importing address store");

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("no store yet, starting empty");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut rows = 0_usize;
        for row in read_records(BufReader::new(file)) {
            let row = row?;
            let key = self.receive_record(&row.email, &row.name, row.last_used).key();
            if let Some(record) = self.records.get_mut(&key) {
                record.ignore = row.ignore;
            }
            rows += 1;
        }

        tracing::info!(rows, records = self.records.len(), "import complete");
        Ok(())
    }

    /// Writes the whole book to `path`, most recently used first.
    ///
    /// An existing file is first moved to `path~`, replacing any older
    /// backup. The new contents go to a temporary file in the same
    /// directory that is renamed over `path` once complete. The replaced
    /// file's permissions carry over; a new store is readable by its owner
    /// only.
    ///
    /// # Errors
    ///
    /// Returns an error if the new file cannot be written or moved into
    /// place.
    pub fn export(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let _entered = self.span.clone().entered();
        tracing::info!(path = %path.display(), records = self.records.len(), "exporting address store");

        let permissions = fs::metadata(path).ok().map(|meta| meta.permissions());
        if permissions.is_some() {
            backup(path);
        }

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            write_records(&mut writer, self.sorted_by_recency())?;
            writer.flush()?;
        }
        if let Some(permissions) = permissions {
            tmp.as_file().set_permissions(permissions)?;
        }
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;

        Ok(())
    }

    /// Scans the store at `path` for records matching `query`.
    ///
    /// This is a separate read path: it never looks at an in-memory book.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or has a malformed row.
    pub fn find_matches(
        query: &str,
        path: impl AsRef<Path>,
        max_results: usize,
    ) -> Result<Vec<AddressRecord>> {
        search::find_matches(query, path, max_results)
    }

    /// Looks up the record for an email address.
    #[must_use]
    pub fn get(&self, email: &str) -> Option<&AddressRecord> {
        self.records.get(&AddressKey::new(email))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the book holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates over all records in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &AddressRecord> {
        self.records.values()
    }

    /// Book-level update marker.
    #[must_use]
    pub const fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Records ordered by `last_used` descending, then by email.
    fn sorted_by_recency(&self) -> Vec<&AddressRecord> {
        let mut sorted: Vec<_> = self.records.values().collect();
        sorted.sort_by(|a, b| {
            b.last_used
                .cmp(&a.last_used)
                .then_with(|| a.email.cmp(&b.email))
        });
        sorted
    }
}

impl SightingSink for AddressBook {
    fn receive(&mut self, email: &str, name: &str, used_at: DateTime<Utc>) {
        let span = self.span.clone();
        let record = self.receive_record(email, name, used_at);
        tracing::trace!(parent: &span, email = %record.email, name = %record.name, "sighting");
    }
}

/// Moves `path` to `path~`, logging instead of failing.
fn backup(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push("~");
    let backup = PathBuf::from(backup);

    // A stale backup may or may not exist.
    let _ = fs::remove_file(&backup);
    if let Err(e) = fs::rename(path, &backup) {
        tracing::warn!(
            path = %path.display(),
            backup = %backup.display(),
            error = %e,
            "could not back up address store"
        );
    }
}
