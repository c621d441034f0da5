//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O or external
//! dependencies.

mod account;
pub mod event;
pub mod result;
mod session;

pub use account::AccountId;
pub use event::{EventKind, RecordedEvent, TransactionEvent};
pub use session::SessionState;
