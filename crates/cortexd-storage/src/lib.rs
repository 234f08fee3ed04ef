//! SQLite persistence for alerts.
//!
//! A single [`store::AlertStore`] owns the database connection and exposes
//! indexed query access over one `alerts` table. The store never propagates
//! storage failures through its public interface: errors are logged and
//! surface as `false`, empty collections, or zero counts, so a broken
//! database degrades the daemon instead of crashing it.

pub mod error;
pub mod store;


pub use store::AlertStore;
