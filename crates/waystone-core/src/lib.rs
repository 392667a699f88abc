//! Waystone Core — shared domain abstractions.
//!
//! This crate defines the fundamental traits and types the
//! synchronization pipeline depends on: the error taxonomy, durable
//! sync records, transient state changes, the outbound message
//! envelope, and the repository and bus ports. It contains no
//! infrastructure code.

pub mod bus;
pub mod clock;
pub mod error;
pub mod message;
pub mod record;
pub mod repository;
pub mod state;
