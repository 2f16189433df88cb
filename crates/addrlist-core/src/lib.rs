//! # addrlist-core
//!
//! Builds a personal address book from the envelopes of messages in one or
//! more mail folders.
//!
//! This crate provides:
//! - **Address book** - merged records keyed by normalized email, persisted
//!   as delimited text, with fuzzy lookup over the stored file
//! - **Backend workers** - an action/event contract and a local Maildir backend
//! - **Sessions** - a per-account state machine and a multiplexer that drives
//!   every account concurrently
//! - **Configuration** - JSON account and store settings

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod book;
pub mod config;
mod error;
pub mod session;
pub mod worker;

pub use book::{AddressBook, AddressKey, AddressRecord, SightingSink};
pub use config::{AccountConfig, Config};
pub use error::{Error, Result};
pub use session::{Multiplexer, RunSummary, SessionController, SessionPhase, SessionStatus};
pub use worker::{Backend, EventSink, WorkerError, WorkerEvent};
