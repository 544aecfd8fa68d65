//! One-way calendar mirroring.
//!
//! calsync copies the events of one source calendar into any number of
//! destination calendars and keeps them converged: new source events are
//! inserted, changed ones updated, and anything the source no longer has is
//! deleted. Destinations are reached through `calsync-provider-*` binaries
//! implementing the [`client::CalendarClient`] contract.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod orchestrator;
pub mod provider;
pub mod reconcile;
pub mod reminder;
pub mod safety;
pub mod window;

#[cfg(test)]
mod testing;

pub use error::{SyncError, SyncResult};
pub use event::Event;
