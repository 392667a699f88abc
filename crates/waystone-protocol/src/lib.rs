//! Waystone Protocol — the synchronization message handlers.
//!
//! Four independently-retriable, idempotent endpoints consume the
//! control-plane topics: campaign→character pushes, character→campaign
//! pushes, subscription control, and version queries. Every handler
//! wraps its body in a uniform retry policy and converts unrecoverable
//! failure into a correlated error message on the bus instead of
//! propagating past the handler boundary.

pub mod context;
pub mod handlers;
pub mod messages;
pub mod retry;

pub use context::SyncContext;
pub use retry::{RetryPolicy, with_retry};
