//! Strategy dispatch table.
//!
//! A prioritized first-match predicate table maps field paths to
//! strategies. Matching is on segment boundaries, so the chosen
//! strategy is a deterministic pure function of the path.

use waystone_core::state::FieldPath;

/// Which strategy handles a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Domain-precedence rules for combat and resource fields.
    RuleBased,
    /// Delta accumulation for progress fields.
    Incremental,
    /// Structural merge for everything else.
    Structural,
}

/// A path predicate in the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatcher {
    /// Matches one exact path.
    Exact(&'static str),
    /// Matches a path or anything nested under it.
    Prefix(&'static str),
}

impl PathMatcher {
    /// Whether this predicate matches a path.
    #[must_use]
    pub fn matches(&self, path: &FieldPath) -> bool {
        match self {
            Self::Exact(exact) => path.as_str() == *exact,
            Self::Prefix(prefix) => path.starts_with(prefix),
        }
    }
}

/// Prioritized (predicate, strategy) table; the first match wins and
/// unmatched paths use the structural merge.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    entries: Vec<(PathMatcher, StrategyKind)>,
}

impl StrategyTable {
    /// Creates a table from explicit entries.
    #[must_use]
    pub fn new(entries: Vec<(PathMatcher, StrategyKind)>) -> Self {
        Self { entries }
    }

    /// Picks the strategy for a path.
    #[must_use]
    pub fn kind_for(&self, path: &FieldPath) -> StrategyKind {
        self.entries
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map_or(StrategyKind::Structural, |(_, kind)| *kind)
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        use PathMatcher::Prefix;
        Self::new(vec![
            (Prefix("progress.experience_points"), StrategyKind::Incremental),
            (Prefix("progress.level"), StrategyKind::Incremental),
            (Prefix("progress.proficiency_bonus"), StrategyKind::Incremental),
            (Prefix("combat"), StrategyKind::RuleBased),
            (Prefix("resources"), StrategyKind::RuleBased),
            (Prefix("inventory"), StrategyKind::RuleBased),
            (Prefix("equipment"), StrategyKind::RuleBased),
        ])
    }
}
