//! Address book: merged contact records, store import/export and lookup.

mod address_book;
mod model;
pub mod search;
pub mod store;

pub use address_book::{AddressBook, SightingSink};
pub use model::{AddressKey, AddressRecord, IGNORE_MARKER};
