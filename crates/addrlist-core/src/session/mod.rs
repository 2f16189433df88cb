//! Account sessions and the multiplexer that drives them.

mod controller;
mod multiplexer;
mod store;

pub use controller::{SessionController, SessionPhase, SessionStatus};
pub use multiplexer::{Multiplexer, RunSummary};
pub use store::MessageStore;
