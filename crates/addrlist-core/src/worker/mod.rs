//! Backend workers: the action/event contract and the built-in backends.

pub mod maildir;
mod runtime;
mod types;

pub use maildir::MaildirBackend;
pub use runtime::{Backend, EventSink, EventSource, WorkerHandle, spawn};
pub use types::{
    Action, ActionKind, Address, DirectoryInfo, Envelope, MessageId, MessageInfo, SortCriterion,
    SortKey, WorkerError, WorkerEvent,
};

use crate::config::expand_home;
use crate::{Error, Result};

/// Creates the backend for an account source URI.
///
/// Supported: `maildir://PATH`.
///
/// # Errors
///
/// Returns [`Error::UnsupportedSource`] for any other scheme.
pub fn open_backend(source: &str) -> Result<Box<dyn Backend>> {
    let (scheme, rest) = source
        .split_once("://")
        .ok_or_else(|| Error::UnsupportedSource(source.to_string()))?;

    match scheme.to_ascii_lowercase().as_str() {
        "maildir" => Ok(Box::new(MaildirBackend::new(expand_home(rest)))),
        _ => Err(Error::UnsupportedSource(source.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_backend_schemes() {
        assert!(open_backend("maildir:///var/mail/me").is_ok());
        assert!(open_backend("Maildir://~/Mail").is_ok());
        assert!(matches!(
            open_backend("imaps://mail.example.com"),
            Err(Error::UnsupportedSource(_))
        ));
        assert!(matches!(
            open_backend("/no/scheme"),
            Err(Error::UnsupportedSource(_))
        ));
    }
}
