//! Append-only event records.
//!
//! Every observable step of a game is written as one [`EventRecord`]:
//! setup (role assignment, initial state), each round (bids, speaker,
//! delivered message, committed delta), recoverable failures, and the end.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::participant::RoleAssignment;
use crate::state::{GameState, StateDelta};

/// How a game ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum GameOutcome {
    /// A team won.
    Winner {
        /// The winning team.
        team: String,
        /// `declared` (by an authority) or `expression` (victory check).
        decided_by: String,
    },
    /// The turn cap was reached without a winner.
    Stalemate {
        /// The cap that was hit.
        turn_limit: u64,
    },
}

impl GameOutcome {
    /// The winning team, if any.
    pub fn winner(&self) -> Option<&str> {
        match self {
            Self::Winner { team, .. } => Some(team),
            Self::Stalemate { .. } => None,
        }
    }
}

/// One thing that happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    /// Roles dealt at setup.
    RoleAssignment {
        /// Player name to role.
        roles: BTreeMap<String, RoleAssignment>,
    },
    /// State after setup.
    InitialState {
        /// The full initial state.
        state: GameState,
    },
    /// A phase began.
    PhaseStarted {
        /// Phase tag.
        phase: String,
        /// Whether this phase came from a directive override.
        overridden: bool,
    },
    /// One participant's decision for the round.
    Bid {
        /// Who decided.
        participant: String,
        /// Their bid.
        bid: Decimal,
        /// Their message.
        message: String,
        /// Recipient label.
        to: String,
        /// Their target, if any.
        target: Option<String>,
        /// Their rationale.
        rationale: String,
    },
    /// An oracle call failed and a safe default was substituted.
    DecisionFailure {
        /// Whose call failed.
        participant: String,
        /// Why.
        error: String,
    },
    /// The floor was given to a speaker.
    SpeakerSelected {
        /// The chosen speaker.
        speaker: String,
        /// The winning bid.
        max_bid: Decimal,
        /// Everyone who tied on the maximum.
        tied: Vec<String>,
    },
    /// A message reached its audience.
    MessageDelivered {
        /// Sender.
        speaker: String,
        /// Recipient label.
        to: String,
        /// Whether it was a direct message.
        is_dm: bool,
        /// Text.
        text: String,
    },
    /// The round's state mutation was committed.
    DeltaApplied {
        /// The combined delta.
        delta: StateDelta,
        /// Authority reasoning, if any.
        reason: String,
        /// State before the commit.
        before: GameState,
        /// State after the commit.
        after: GameState,
    },
    /// An engine command was refused.
    CommandRejected {
        /// The command, as JSON.
        command: serde_json::Value,
        /// Why.
        error: String,
    },
    /// A delta or directive field was refused.
    DeltaRejected {
        /// Why.
        error: String,
    },
    /// A victory expression could not be evaluated.
    ExpressionSkipped {
        /// Team whose expression failed.
        team: String,
        /// Why.
        error: String,
    },
    /// The game is over.
    GameEnd {
        /// How it ended.
        outcome: GameOutcome,
    },
}

/// A timestamped, turn-tagged event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Turn the event belongs to (`0` during setup).
    pub turn: u64,
    /// Wall-clock time of recording.
    pub at: DateTime<Utc>,
    /// The event itself.
    #[serde(flatten)]
    pub event: GameEvent,
}

impl EventRecord {
    /// Stamp `event` with `turn` and the current time.
    pub fn now(turn: u64, event: GameEvent) -> Self {
        Self {
            turn,
            at: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn records_flatten_the_event_tag() {
        let record = EventRecord::now(
            4,
            GameEvent::GameEnd {
                outcome: GameOutcome::Stalemate { turn_limit: 4 },
            },
        );
        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["turn"], 4);
        assert_eq!(json["event"], "game_end");
        assert_eq!(json["outcome"]["reason"], "stalemate");
    }

    #[test]
    fn outcome_winner() {
        let won = GameOutcome::Winner {
            team: "Town".into(),
            decided_by: "expression".into(),
        };
        assert_eq!(won.winner(), Some("Town"));
        assert_eq!(GameOutcome::Stalemate { turn_limit: 3 }.winner(), None);
    }
}
