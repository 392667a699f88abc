//! Per-field resolution strategies.
//!
//! Each strategy is a pure function of `(field_path, base, local,
//! remote)` returning the merged value plus the name of the strategy
//! actually applied. A strategy that cannot resolve raises
//! [`SyncError::Conflict`]; the resolver records the conflict and keeps
//! the local value.

use serde_json::{Map, Value};

use waystone_core::error::SyncError;
use waystone_core::state::FieldPath;

/// The outcome of one strategy application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// The merged value.
    pub value: Value,
    /// Name of the strategy that produced it.
    pub strategy: &'static str,
}

/// A pure per-field merge function.
pub trait ResolutionStrategy: Send + Sync {
    /// The strategy name recorded in conflict metadata.
    fn name(&self) -> &'static str;

    /// Merges one field's local and remote values over their base.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Conflict`] when no resolved value can be
    /// produced for these inputs.
    fn resolve(
        &self,
        path: &FieldPath,
        base: Option<&Value>,
        local: &Value,
        remote: &Value,
    ) -> Result<Resolution, SyncError>;
}

/// Precedence applied by the rule-based strategy to one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Take the lower numeric value (depleting resources).
    LowestWins,
    /// Take the higher numeric value (accumulating totals).
    HighestWins,
    /// Union-merge lists and maps (conditions, inventory).
    UnionMerge,
    /// Take the remote value.
    RemoteWins,
}

/// Domain-precedence strategy for combat and resource fields.
///
/// The precedence per path comes from a pluggable first-match rule
/// table; unmatched paths fall back to remote-wins.
pub struct RuleBasedStrategy {
    rules: Vec<(crate::table::PathMatcher, Rule)>,
}

impl RuleBasedStrategy {
    /// Creates a strategy with an explicit rule table.
    #[must_use]
    pub fn new(rules: Vec<(crate::table::PathMatcher, Rule)>) -> Self {
        Self { rules }
    }

    fn rule_for(&self, path: &FieldPath) -> Rule {
        self.rules
            .iter()
            .find(|(matcher, _)| matcher.matches(path))
            .map_or(Rule::RemoteWins, |(_, rule)| *rule)
    }
}

impl Default for RuleBasedStrategy {
    fn default() -> Self {
        use crate::table::PathMatcher::Prefix;
        Self::new(vec![
            (Prefix("combat.hit_points"), Rule::LowestWins),
            (Prefix("combat.temporary_hit_points"), Rule::LowestWins),
            (Prefix("combat.conditions"), Rule::UnionMerge),
            (Prefix("combat.death_saves"), Rule::UnionMerge),
            (Prefix("resources.spell_slots"), Rule::LowestWins),
            (Prefix("resources"), Rule::LowestWins),
            (Prefix("inventory"), Rule::UnionMerge),
            (Prefix("equipment"), Rule::UnionMerge),
        ])
    }
}

impl ResolutionStrategy for RuleBasedStrategy {
    fn name(&self) -> &'static str {
        "rule_based"
    }

    fn resolve(
        &self,
        path: &FieldPath,
        _base: Option<&Value>,
        local: &Value,
        remote: &Value,
    ) -> Result<Resolution, SyncError> {
        let value = match self.rule_for(path) {
            Rule::LowestWins => numeric_extremum(path, local, remote, true)?,
            Rule::HighestWins => numeric_extremum(path, local, remote, false)?,
            Rule::UnionMerge => union_merge(path, local, remote)?,
            Rule::RemoteWins => remote.clone(),
        };
        Ok(Resolution {
            value,
            strategy: self.name(),
        })
    }
}

/// Recursively applies numeric precedence: numbers pick the extremum,
/// objects merge per key, equal-length arrays merge elementwise.
fn numeric_extremum(
    path: &FieldPath,
    local: &Value,
    remote: &Value,
    pick_lower: bool,
) -> Result<Value, SyncError> {
    match (local, remote) {
        (Value::Number(l), Value::Number(r)) => {
            let (Some(lf), Some(rf)) = (l.as_f64(), r.as_f64()) else {
                return Err(SyncError::conflict(path.as_str(), "non-finite number"));
            };
            let take_local = if pick_lower { lf <= rf } else { lf >= rf };
            Ok(if take_local { local.clone() } else { remote.clone() })
        }
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = Map::new();
            for key in l.keys().chain(r.keys().filter(|k| !l.contains_key(*k))) {
                let value = match (l.get(key), r.get(key)) {
                    (Some(lv), Some(rv)) => {
                        numeric_extremum(&path.child(key), lv, rv, pick_lower)?
                    }
                    (Some(lv), None) => lv.clone(),
                    (None, Some(rv)) => rv.clone(),
                    (None, None) => unreachable!("key came from one of the maps"),
                };
                merged.insert(key.clone(), value);
            }
            Ok(Value::Object(merged))
        }
        (Value::Array(l), Value::Array(r)) if l.len() == r.len() => {
            let merged = l
                .iter()
                .zip(r)
                .map(|(lv, rv)| numeric_extremum(path, lv, rv, pick_lower))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(merged))
        }
        _ if local == remote => Ok(local.clone()),
        _ => Err(SyncError::conflict(
            path.as_str(),
            "numeric precedence needs matching numeric shapes",
        )),
    }
}

/// Union-merges lists (local order, remote extras appended) and maps
/// (key union, recursing where both sides hold a key).
fn union_merge(path: &FieldPath, local: &Value, remote: &Value) -> Result<Value, SyncError> {
    match (local, remote) {
        (Value::Array(l), Value::Array(r)) => {
            let mut merged = l.clone();
            for item in r {
                if !merged.contains(item) {
                    merged.push(item.clone());
                }
            }
            Ok(Value::Array(merged))
        }
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            for (key, rv) in r {
                let value = match l.get(key) {
                    Some(lv) => union_merge(&path.child(key), lv, rv)?,
                    None => rv.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Ok(Value::Object(merged))
        }
        _ if local == remote => Ok(local.clone()),
        // Scalar collision inside a union-merged container: remote wins.
        (l, r) if !l.is_array() && !l.is_object() && !r.is_array() && !r.is_object() => {
            Ok(r.clone())
        }
        _ => Err(SyncError::conflict(
            path.as_str(),
            "union merge needs matching container shapes",
        )),
    }
}

/// Delta strategy for progress fields: both sides' deltas from base
/// apply, so independently earned progress accumulates instead of one
/// side overwriting the other.
#[derive(Debug, Default)]
pub struct IncrementalStrategy;

impl ResolutionStrategy for IncrementalStrategy {
    fn name(&self) -> &'static str {
        "incremental"
    }

    fn resolve(
        &self,
        path: &FieldPath,
        base: Option<&Value>,
        local: &Value,
        remote: &Value,
    ) -> Result<Resolution, SyncError> {
        let base = base.filter(|v| !v.is_null());
        let all_integers = base.is_none_or(|v| v.as_i64().is_some())
            && local.as_i64().is_some()
            && remote.as_i64().is_some();

        let value = if all_integers {
            let b = base.and_then(Value::as_i64).unwrap_or(0);
            let l = local.as_i64().expect("checked integer");
            let r = remote.as_i64().expect("checked integer");
            Value::from(l + r - b)
        } else {
            let b = match base {
                Some(v) => v.as_f64().ok_or_else(|| {
                    SyncError::conflict(path.as_str(), "non-numeric base for incremental field")
                })?,
                None => 0.0,
            };
            let l = local.as_f64().ok_or_else(|| {
                SyncError::conflict(path.as_str(), "non-numeric local value for incremental field")
            })?;
            let r = remote.as_f64().ok_or_else(|| {
                SyncError::conflict(path.as_str(), "non-numeric remote value for incremental field")
            })?;
            Value::from(l + r - b)
        };

        Ok(Resolution {
            value,
            strategy: self.name(),
        })
    }
}

/// Default strategy: recursive merge of maps and lists, remote wins on
/// scalar collision. Never fails.
#[derive(Debug, Default)]
pub struct StructuralMergeStrategy;

fn structural_merge(local: &Value, remote: &Value) -> Value {
    match (local, remote) {
        (Value::Object(l), Value::Object(r)) => {
            let mut merged = l.clone();
            for (key, rv) in r {
                let value = match l.get(key) {
                    Some(lv) => structural_merge(lv, rv),
                    None => rv.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        (Value::Array(l), Value::Array(r)) => {
            let len = l.len().max(r.len());
            let merged = (0..len)
                .map(|i| match (l.get(i), r.get(i)) {
                    (Some(lv), Some(rv)) => structural_merge(lv, rv),
                    (Some(lv), None) => lv.clone(),
                    (None, Some(rv)) => rv.clone(),
                    (None, None) => unreachable!("index below max length"),
                })
                .collect();
            Value::Array(merged)
        }
        (_, remote) => remote.clone(),
    }
}

impl ResolutionStrategy for StructuralMergeStrategy {
    fn name(&self) -> &'static str {
        "structural"
    }

    fn resolve(
        &self,
        _path: &FieldPath,
        _base: Option<&Value>,
        local: &Value,
        remote: &Value,
    ) -> Result<Resolution, SyncError> {
        Ok(Resolution {
            value: structural_merge(local, remote),
            strategy: self.name(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(p: &str) -> FieldPath {
        FieldPath::new(p)
    }

    #[test]
    fn test_lowest_wins_on_hit_points() {
        let strategy = RuleBasedStrategy::default();

        let resolution = strategy
            .resolve(&path("combat.hit_points"), Some(&json!(20)), &json!(15), &json!(12))
            .unwrap();

        assert_eq!(resolution.value, json!(12));
        assert_eq!(resolution.strategy, "rule_based");
    }

    #[test]
    fn test_lowest_wins_recurses_into_spell_slots() {
        let strategy = RuleBasedStrategy::default();

        let resolution = strategy
            .resolve(
                &path("resources.spell_slots"),
                None,
                &json!({"level_1": 2, "level_2": 1}),
                &json!({"level_1": 1, "level_2": 3}),
            )
            .unwrap();

        assert_eq!(resolution.value, json!({"level_1": 1, "level_2": 1}));
    }

    #[test]
    fn test_conditions_union_merge() {
        let strategy = RuleBasedStrategy::default();

        let resolution = strategy
            .resolve(
                &path("combat.conditions"),
                Some(&json!([])),
                &json!(["poisoned"]),
                &json!(["prone", "poisoned"]),
            )
            .unwrap();

        assert_eq!(resolution.value, json!(["poisoned", "prone"]));
    }

    #[test]
    fn test_rule_based_rejects_non_numeric_for_numeric_rule() {
        let strategy = RuleBasedStrategy::default();

        let err = strategy
            .resolve(
                &path("combat.hit_points"),
                None,
                &json!("fifteen"),
                &json!(12),
            )
            .unwrap_err();

        assert!(matches!(err, SyncError::Conflict { .. }));
    }

    #[test]
    fn test_rule_based_falls_back_to_remote_wins() {
        let strategy = RuleBasedStrategy::default();

        let resolution = strategy
            .resolve(&path("combat.stance"), None, &json!("defensive"), &json!("reckless"))
            .unwrap();

        assert_eq!(resolution.value, json!("reckless"));
    }

    #[test]
    fn test_incremental_applies_both_deltas() {
        let strategy = IncrementalStrategy;

        let resolution = strategy
            .resolve(
                &path("progress.experience_points"),
                Some(&json!(100)),
                &json!(150),
                &json!(130),
            )
            .unwrap();

        assert_eq!(resolution.value, json!(180));
        assert_eq!(resolution.strategy, "incremental");
    }

    #[test]
    fn test_incremental_treats_missing_base_as_zero() {
        let strategy = IncrementalStrategy;

        let resolution = strategy
            .resolve(&path("progress.level"), None, &json!(2), &json!(3))
            .unwrap();

        assert_eq!(resolution.value, json!(5));
    }

    #[test]
    fn test_incremental_is_order_independent() {
        let strategy = IncrementalStrategy;
        let p = path("progress.experience_points");

        let a = strategy
            .resolve(&p, Some(&json!(100)), &json!(150), &json!(130))
            .unwrap();
        let b = strategy
            .resolve(&p, Some(&json!(100)), &json!(130), &json!(150))
            .unwrap();

        assert_eq!(a.value, b.value);
    }

    #[test]
    fn test_incremental_rejects_non_numeric() {
        let strategy = IncrementalStrategy;

        let err = strategy
            .resolve(&path("progress.level"), Some(&json!(3)), &json!("four"), &json!(5))
            .unwrap_err();

        assert!(matches!(err, SyncError::Conflict { .. }));
    }

    #[test]
    fn test_structural_merge_recurses_and_prefers_remote_scalars() {
        let strategy = StructuralMergeStrategy;

        let resolution = strategy
            .resolve(
                &path("appearance"),
                None,
                &json!({"hair": "black", "scars": {"left_arm": true}}),
                &json!({"hair": "silver", "eyes": "green"}),
            )
            .unwrap();

        assert_eq!(
            resolution.value,
            json!({"hair": "silver", "eyes": "green", "scars": {"left_arm": true}})
        );
        assert_eq!(resolution.strategy, "structural");
    }

    #[test]
    fn test_structural_merge_merges_lists_elementwise() {
        let strategy = StructuralMergeStrategy;

        let resolution = strategy
            .resolve(&path("journal"), None, &json!(["day 1", "day 2"]), &json!(["day 1"]))
            .unwrap();

        assert_eq!(resolution.value, json!(["day 1", "day 2"]));
    }
}
