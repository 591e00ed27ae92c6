//! Umbra core
//!
//! Shielded commitment transfers: the orchestrator that drives mint,
//! transfer, batch, consolidation and burn workflows against the ledger, the
//! per-user commitment store, and the listener that accepts incoming
//! openings after checking them on chain.

pub mod channel;
pub mod clients;
pub mod error;
pub mod listener;
pub mod orchestrator;
pub mod store;

pub use error::{ListenerError, Step, TransferError, ValidationError};
pub use listener::{ListenerOutcome, NotificationListener};
pub use orchestrator::{Orchestrator, SpendOutcome, Timeouts, UserSession};

#[cfg(test)]
mod tests;
