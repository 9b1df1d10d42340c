//! The request/response vocabulary exchanged with the reasoning oracle.
//!
//! The engine sends an [`OracleRequest`] and receives either an
//! [`ActionDecision`] (players and the GM bidding, voting, or targeting) or a
//! [`Directive`] (authorities steering the game). Bids are
//! [`Decimal`] so speaker selection compares them exactly.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::meta::MetaMap;
use crate::participant::{CapabilityRole, MemoryEntry, Recipients, RoleAssignment};
use crate::state::{PrivateState, PublicState, StateDelta};

/// Rationale attached to every substituted safe default.
pub const DECISION_FAILURE: &str = "decision failure";

/// A participant's per-round output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDecision {
    /// Desire to speak, clamped to `[0, 1]`.
    pub bid: Decimal,
    /// Text to send; empty means silence.
    pub message: String,
    /// Who the text is for.
    pub recipients: Recipients,
    /// Free-form reasoning, logged only.
    pub rationale: String,
    /// Player named by vote and ability phases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ActionDecision {
    /// The substitute used whenever the oracle fails or times out.
    pub fn safe_default() -> Self {
        Self {
            bid: Decimal::ZERO,
            message: String::new(),
            recipients: Recipients::none(),
            rationale: DECISION_FAILURE.to_owned(),
            target: None,
        }
    }

    /// Whether this decision is the failure substitute.
    pub fn is_failure(&self) -> bool {
        self.rationale == DECISION_FAILURE
    }
}

/// A closed set of collection operations an authority may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineCommand {
    /// Create (or replace) a deck.
    InitDeck {
        /// Deck name (public meta key).
        deck: String,
        /// Deck contents, top first.
        items: Vec<String>,
        /// Shuffle after creation.
        #[serde(default = "default_true")]
        shuffle: bool,
    },
    /// Move the top `count` items of `deck` onto the `into` list.
    Draw {
        /// Source deck.
        deck: String,
        /// Items to draw.
        count: u32,
        /// Destination list (created if missing).
        into: String,
    },
    /// Shuffle a deck in place.
    Shuffle {
        /// Deck to shuffle.
        deck: String,
    },
}

const fn default_true() -> bool {
    true
}

/// An authority's steering output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    /// Public announcement; empty means none.
    pub message: String,
    /// State changes to commit.
    pub delta: StateDelta,
    /// Phase to run next instead of the static successor.
    pub next_phase: Option<String>,
    /// Team declared the winner.
    pub winner: Option<String>,
    /// Collection operations to execute at commit.
    pub commands: Vec<EngineCommand>,
    /// Free-form reasoning, logged only.
    pub rationale: String,
}

impl Directive {
    /// The do-nothing directive used when an authority call fails.
    pub fn safe_default() -> Self {
        Self {
            rationale: DECISION_FAILURE.to_owned(),
            ..Self::default()
        }
    }
}

/// What the oracle is being asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestKind {
    /// Bid for the floor and optionally speak.
    Bid,
    /// Name one of `candidates` (votes, ability targets).
    Target {
        /// What the target is for.
        prompt: String,
        /// Acceptable names.
        candidates: Vec<String>,
    },
    /// GM directive: announce, mutate, steer the phase order.
    Directive,
    /// System bookkeeping after each round.
    StateUpdate,
}

impl RequestKind {
    /// Whether the answer is a [`Directive`] rather than an [`ActionDecision`].
    pub const fn expects_directive(&self) -> bool {
        matches!(self, Self::Directive | Self::StateUpdate)
    }
}

/// Everything the oracle may see when deciding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleRequest {
    /// Turn being played.
    pub turn: u64,
    /// Tag of the phase being played.
    pub phase: String,
    /// Who is deciding.
    pub participant: String,
    /// Their capability class.
    pub capability: CapabilityRole,
    /// Their dealt role (players only).
    pub role: Option<RoleAssignment>,
    /// Their own secrets, such as inspection results (players only).
    #[serde(default)]
    pub secrets: MetaMap,
    /// What is being asked.
    pub kind: RequestKind,
    /// Ruleset-built briefing (rules, role text, language).
    pub briefing: String,
    /// Most recent visible messages, oldest first.
    pub memory: Vec<MemoryEntry>,
    /// Public state snapshot.
    pub public: PublicState,
    /// Private state snapshot (authorities only).
    pub private: Option<PrivateState>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_decision_is_marked_as_failure() {
        let d = ActionDecision::safe_default();
        assert_eq!(d.bid, Decimal::ZERO);
        assert!(d.message.is_empty());
        assert_eq!(d.recipients, Recipients::none());
        assert!(d.is_failure());
    }

    #[test]
    fn commands_are_tagged_by_op() {
        let cmds: Vec<EngineCommand> = serde_json::from_str(
            r#"[{"op": "init_deck", "deck": "loc", "items": ["a", "b"]},
                {"op": "draw", "deck": "loc", "count": 1, "into": "hand"},
                {"op": "shuffle", "deck": "loc"}]"#,
        )
        .unwrap();
        assert_eq!(
            cmds.first(),
            Some(&EngineCommand::InitDeck {
                deck: "loc".into(),
                items: vec!["a".into(), "b".into()],
                shuffle: true,
            })
        );
        assert_eq!(cmds.len(), 3);
        assert!(serde_json::from_str::<EngineCommand>(r#"{"op": "delete_all"}"#).is_err());
    }

    #[test]
    fn directive_kinds() {
        assert!(RequestKind::Directive.expects_directive());
        assert!(RequestKind::StateUpdate.expects_directive());
        assert!(!RequestKind::Bid.expects_directive());
    }
}
