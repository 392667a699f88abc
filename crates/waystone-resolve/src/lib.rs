//! Waystone Resolve — three-way diffing and conflict resolution.
//!
//! Given the last mutually-agreed base state, the local state, and an
//! incoming remote state, [`ConflictResolver`] computes both structural
//! diffs, dispatches each doubly-changed field to a resolution strategy
//! chosen by a prioritized path table, and records every conflict in
//! the durable store. Strategies are pure functions of
//! `(field_path, base, local, remote)`.

pub mod diff;
pub mod resolver;
pub mod strategy;
pub mod table;

pub use diff::{FieldChange, diff_states, set_value_at, value_at};
pub use resolver::{ConflictResolver, LockConfig, PendingOutcome, ResolutionOutcome};
pub use strategy::{
    IncrementalStrategy, Resolution, ResolutionStrategy, Rule, RuleBasedStrategy,
    StructuralMergeStrategy,
};
pub use table::{PathMatcher, StrategyKind, StrategyTable};
