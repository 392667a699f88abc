//! Waystone Store — PostgreSQL system of record.
//!
//! Implements the `SyncRepository` port over sqlx. Every operation is
//! one statement; cross-record consistency is the resolver's business,
//! not the store's.

pub mod pg_sync_repository;
pub mod schema;

pub use pg_sync_repository::PgSyncRepository;
