//! Public and private game state, and the deltas that mutate them.
//!
//! State is only ever changed by applying a [`StateDelta`]. Application is
//! a pure function of the current state and the delta, so replaying the
//! same ordered sequence of deltas over the same initial state always
//! reproduces the same final state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{MetaMap, MetaSchema, SchemaViolation};
use crate::participant::RoleAssignment;

/// State every participant can see.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublicState {
    /// Tag of the phase currently executing.
    pub phase: String,
    /// Turn counter. Strictly increasing, never repeats.
    pub turn: u64,
    /// Living players in seating order.
    pub alive: Vec<String>,
    /// Ruleset counters, decks, and flags.
    pub meta: MetaMap,
}

impl PublicState {
    /// Whether `name` is among the living.
    pub fn is_alive(&self, name: &str) -> bool {
        self.alive.iter().any(|n| n == name)
    }
}

/// Secret attributes of one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateRecord {
    /// The dealt role.
    pub assignment: RoleAssignment,
    /// Role-specific secrets (e.g. inspection results).
    #[serde(default)]
    pub secrets: MetaMap,
}

/// State only authority-class participants see in full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrivateState {
    /// Per-player secret records.
    pub records: BTreeMap<String, PrivateRecord>,
    /// Ruleset-private notes (e.g. the secret location).
    pub meta: MetaMap,
}

impl PrivateState {
    /// The team of `name`, if they hold a role.
    pub fn team_of(&self, name: &str) -> Option<&str> {
        self.records.get(name).map(|r| r.assignment.team.as_str())
    }

    /// The role assignment of `name`.
    pub fn assignment(&self, name: &str) -> Option<&RoleAssignment> {
        self.records.get(name).map(|r| &r.assignment)
    }
}

/// A requested change to game state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    /// Entries merged into public meta (overwrite by key).
    #[serde(default)]
    pub public: MetaMap,
    /// Entries merged into private meta (overwrite by key).
    #[serde(default)]
    pub private: MetaMap,
    /// Players to remove from the living roster.
    #[serde(default)]
    pub eliminate: Vec<String>,
    /// Per-player secret entries to merge.
    #[serde(default)]
    pub secrets: BTreeMap<String, MetaMap>,
}

impl StateDelta {
    /// Whether applying this delta would change nothing.
    pub fn is_empty(&self) -> bool {
        self.public.is_empty()
            && self.private.is_empty()
            && self.eliminate.is_empty()
            && self.secrets.is_empty()
    }

    /// Fold `later` into `self`; entries of `later` win on key collision.
    pub fn merge(&mut self, later: Self) {
        self.public.extend(later.public);
        self.private.extend(later.private);
        for name in later.eliminate {
            if !self.eliminate.contains(&name) {
                self.eliminate.push(name);
            }
        }
        for (name, entries) in later.secrets {
            self.secrets.entry(name).or_default().extend(entries);
        }
    }
}

/// What a delta application actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedDelta {
    /// Players actually removed from the roster.
    pub eliminated: Vec<String>,
    /// Entries refused because they violate the meta schema.
    pub rejected: Vec<SchemaViolation>,
}

/// Public and private state together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Visible to everyone.
    pub public: PublicState,
    /// Visible to authorities only.
    pub private: PrivateState,
}

impl GameState {
    /// Apply `delta`, refusing entries that violate `schema`.
    ///
    /// Eliminating a player who is already dead is a no-op. Secrets for
    /// names without a private record are ignored.
    pub fn apply(&mut self, delta: &StateDelta, schema: &MetaSchema) -> AppliedDelta {
        let mut applied = AppliedDelta::default();

        for (key, value) in &delta.public {
            match schema.check(key, value) {
                Ok(()) => {
                    self.public.meta.insert(key.clone(), value.clone());
                }
                Err(violation) => applied.rejected.push(violation),
            }
        }
        for (key, value) in &delta.private {
            self.private.meta.insert(key.clone(), value.clone());
        }
        for name in &delta.eliminate {
            let before = self.public.alive.len();
            self.public.alive.retain(|n| n != name);
            if self.public.alive.len() != before {
                applied.eliminated.push(name.clone());
            }
        }
        for (name, entries) in &delta.secrets {
            if let Some(record) = self.private.records.get_mut(name) {
                record
                    .secrets
                    .extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }

        applied
    }

    /// Number of living players per team.
    ///
    /// Every team that was dealt at least one role appears, with `0` once
    /// all its members are dead.
    pub fn living_team_counts(&self) -> BTreeMap<String, i64> {
        let mut counts: BTreeMap<String, i64> = self
            .private
            .records
            .values()
            .map(|r| (r.assignment.team.clone(), 0))
            .collect();
        for name in &self.public.alive {
            if let Some(team) = self.private.team_of(name) {
                let slot = counts.entry(team.to_owned()).or_insert(0);
                *slot = slot.saturating_add(1);
            }
        }
        counts
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::meta::{MetaKind, MetaValue};

    fn record(team: &str) -> PrivateRecord {
        PrivateRecord {
            assignment: RoleAssignment {
                role: team.to_lowercase(),
                team: team.to_owned(),
                abilities: Vec::new(),
            },
            secrets: MetaMap::new(),
        }
    }

    fn sample_state() -> GameState {
        let mut state = GameState::default();
        state.public.alive = vec!["P1".into(), "P2".into(), "P3".into()];
        state.private.records.insert("P1".into(), record("Town"));
        state.private.records.insert("P2".into(), record("Town"));
        state.private.records.insert("P3".into(), record("Evil"));
        state
    }

    fn delta_killing(name: &str, counter: i64) -> StateDelta {
        let mut delta = StateDelta::default();
        delta.eliminate.push(name.to_owned());
        delta.public.insert("nights".into(), MetaValue::Int(counter));
        delta
    }

    #[test]
    fn apply_eliminates_and_merges() {
        let mut state = sample_state();
        let applied = state.apply(&delta_killing("P3", 1), &MetaSchema::new());

        assert_eq!(applied.eliminated, vec!["P3".to_owned()]);
        assert_eq!(state.public.alive, vec!["P1".to_owned(), "P2".to_owned()]);
        assert_eq!(state.public.meta.get("nights"), Some(&MetaValue::Int(1)));
    }

    #[test]
    fn eliminating_the_dead_is_a_noop() {
        let mut state = sample_state();
        state.apply(&delta_killing("P3", 1), &MetaSchema::new());
        let applied = state.apply(&delta_killing("P3", 2), &MetaSchema::new());
        assert!(applied.eliminated.is_empty());
        assert_eq!(state.public.alive.len(), 2);
    }

    #[test]
    fn replaying_the_same_deltas_is_deterministic() {
        let deltas = vec![delta_killing("P1", 1), delta_killing("P3", 2), delta_killing("P1", 3)];
        let mut a = sample_state();
        let mut b = sample_state();
        for d in &deltas {
            a.apply(d, &MetaSchema::new());
        }
        for d in &deltas {
            b.apply(d, &MetaSchema::new());
        }
        assert_eq!(a, b);
    }

    #[test]
    fn schema_violations_are_refused_individually() {
        let schema = MetaSchema::new().field("slayer_used", MetaKind::Bool);
        let mut delta = StateDelta::default();
        delta.public.insert("slayer_used".into(), MetaValue::Int(1));
        delta.public.insert("timer".into(), MetaValue::Int(5));

        let mut state = sample_state();
        let applied = state.apply(&delta, &schema);

        assert_eq!(applied.rejected.len(), 1);
        assert!(!state.public.meta.contains_key("slayer_used"));
        assert_eq!(state.public.meta.get("timer"), Some(&MetaValue::Int(5)));
    }

    #[test]
    fn merge_keeps_later_values_and_dedups_eliminations() {
        let mut first = delta_killing("P1", 1);
        first.merge(delta_killing("P1", 7));
        assert_eq!(first.eliminate, vec!["P1".to_owned()]);
        assert_eq!(first.public.get("nights"), Some(&MetaValue::Int(7)));
    }

    #[test]
    fn team_counts_only_living() {
        let mut state = sample_state();
        state.apply(&delta_killing("P3", 0), &MetaSchema::new());
        let counts = state.living_team_counts();
        assert_eq!(counts.get("Town"), Some(&2));
        assert_eq!(counts.get("Evil"), Some(&0));
    }
}
