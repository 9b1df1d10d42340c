//! Participants, messages, and recipient sets.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Reserved name of the game-master authority.
pub const GM_NAME: &str = "GM";

/// Reserved name of the state-tracking system authority.
pub const SYSTEM_NAME: &str = "SYSTEM";

/// Recipient token meaning "everyone".
pub const BROADCAST_TOKEN: &str = "ALL";

/// What a participant is allowed to do in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityRole {
    /// A regular player.
    Player,
    /// The game master: bids alongside players, wins ties, issues directives.
    AuthorityGm,
    /// The state tracker: never bids, applies one state update per round.
    AuthoritySystem,
}

impl CapabilityRole {
    /// Whether this role belongs to the authority class (sees everything).
    pub const fn is_authority(self) -> bool {
        matches!(self, Self::AuthorityGm | Self::AuthoritySystem)
    }

    /// Short label for logs and prompts.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::AuthorityGm => "gm",
            Self::AuthoritySystem => "system",
        }
    }
}

/// The game role dealt to a player at setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Role name from the spec (e.g. `"Imp"`).
    pub role: String,
    /// Team label used by victory counters (e.g. `"Evil"`).
    pub team: String,
    /// Abilities granted by the role.
    pub abilities: Vec<String>,
}

impl RoleAssignment {
    /// Whether the role grants `ability`.
    pub fn grants(&self, ability: &str) -> bool {
        self.abilities.iter().any(|a| a == ability)
    }
}

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipients {
    /// Every participant.
    All,
    /// A named subset. An empty set means "nobody" (the safe default).
    Named(BTreeSet<String>),
}

impl Recipients {
    /// The empty recipient set.
    pub const fn none() -> Self {
        Self::Named(BTreeSet::new())
    }

    /// Parse the oracle's `to` field: `"ALL"`, `"GM"`, `"P1,P2"`.
    ///
    /// Any `ALL` token makes the whole set a broadcast. Blank tokens are
    /// dropped; a field with no names at all is read as a broadcast, the
    /// same as a missing `to`.
    pub fn parse(spec: &str) -> Self {
        if spec.split(',').all(|token| token.trim().is_empty()) {
            return Self::All;
        }
        Self::from_tokens(spec.split(','))
    }

    /// Build from individual name tokens.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names = BTreeSet::new();
        for token in tokens {
            let token = token.trim();
            if token.eq_ignore_ascii_case(BROADCAST_TOKEN) {
                return Self::All;
            }
            if !token.is_empty() {
                names.insert(token.to_owned());
            }
        }
        Self::Named(names)
    }

    /// Whether this is a broadcast.
    pub const fn is_broadcast(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Render as the log-friendly `to` string.
    pub fn label(&self) -> String {
        match self {
            Self::All => BROADCAST_TOKEN.to_owned(),
            Self::Named(names) => names.iter().cloned().collect::<Vec<_>>().join(","),
        }
    }
}

/// A message committed to the game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Turn the message was sent on.
    pub turn: u64,
    /// Sender name.
    pub sender: String,
    /// Normalized recipients.
    pub recipients: Recipients,
    /// Message text.
    pub text: String,
}

/// One line of a participant's memory log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Turn the message was sent on.
    pub turn: u64,
    /// Sender name.
    pub sender: String,
    /// Recipient label as seen by this participant.
    pub to: String,
    /// Message text.
    pub text: String,
}

impl MemoryEntry {
    /// `<turn>: <sender>▶<to>: <text>`, the transcript line format.
    pub fn transcript_line(&self) -> String {
        format!("{}: {}▶{}: {}", self.turn, self.sender, self.to, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_broadcast_and_named() {
        assert_eq!(Recipients::parse("ALL"), Recipients::All);
        assert_eq!(Recipients::parse("all"), Recipients::All);
        assert_eq!(Recipients::parse("P1, ALL"), Recipients::All);

        let named = Recipients::parse("P2, P1,,");
        assert_eq!(named.label(), "P1,P2");
        assert!(!named.is_broadcast());
    }

    #[test]
    fn blank_to_is_a_broadcast() {
        assert_eq!(Recipients::parse(""), Recipients::All);
        assert_eq!(Recipients::parse("   "), Recipients::All);
        assert_eq!(Recipients::parse(" , ,"), Recipients::All);
        assert_eq!(Recipients::none().label(), "");
    }

    #[test]
    fn authority_roles() {
        assert!(CapabilityRole::AuthorityGm.is_authority());
        assert!(CapabilityRole::AuthoritySystem.is_authority());
        assert!(!CapabilityRole::Player.is_authority());
    }

    #[test]
    fn transcript_line_format() {
        let entry = MemoryEntry {
            turn: 3,
            sender: "P1".to_owned(),
            to: "ALL".to_owned(),
            text: "hello".to_owned(),
        };
        assert_eq!(entry.transcript_line(), "3: P1▶ALL: hello");
    }
}
