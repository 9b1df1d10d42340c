//! Engine configuration.
//!
//! The canonical configuration lives in `parley-config.yaml`. Every field
//! has a default, so an empty file (or no file at all) yields a playable
//! setup:
//!
//! ```yaml
//! seed: 42
//! decision_timeout_ms: 30000
//! max_concurrent_calls: 8
//! max_turns: 50
//! memory_capacity: 30
//! system_authority: true
//! game:
//!   spec_path: crates/parley-rules/specs/werewolf.json
//!   ruleset: werewolf
//!   player_count: 7
//!   language: en
//!   log_path: game_log.jsonl
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of its allowed range.
    #[error("invalid config: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Seed for tie-breaks, role shuffles and deck shuffles.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Per-call oracle deadline in milliseconds.
    #[serde(default = "default_decision_timeout_ms")]
    pub decision_timeout_ms: u64,

    /// Maximum oracle calls in flight at once.
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,

    /// Stalemate cap in rounds. `0` defers to the spec's own limit.
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,

    /// Entries kept in each participant's memory.
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: usize,

    /// Whether a System authority is seated and consulted once per round.
    #[serde(default = "default_true")]
    pub system_authority: bool,

    /// What to play.
    #[serde(default)]
    pub game: GameConfig,
}

/// Which game to play and where to log it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameConfig {
    /// Spec file (JSON or YAML). Falls back to the ruleset's bundled spec.
    #[serde(default)]
    pub spec_path: Option<PathBuf>,

    /// Ruleset name. Falls back to the spec's `ruleset`, then `standard`.
    #[serde(default)]
    pub ruleset: Option<String>,

    /// Seats at the table; absorbs into the spec's `fill` role.
    #[serde(default)]
    pub player_count: Option<u32>,

    /// Language tag players are told to speak in.
    #[serde(default = "default_language")]
    pub language: String,

    /// Append-only JSON-lines event log.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            decision_timeout_ms: default_decision_timeout_ms(),
            max_concurrent_calls: default_max_concurrent_calls(),
            max_turns: default_max_turns(),
            memory_capacity: default_memory_capacity(),
            system_authority: true,
            game: GameConfig::default(),
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            spec_path: None,
            ruleset: None,
            player_count: None,
            language: default_language(),
            log_path: default_log_path(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.decision_timeout_ms == 0 {
            return Err(invalid("decision_timeout_ms must be positive"));
        }
        if self.max_concurrent_calls == 0 {
            return Err(invalid("max_concurrent_calls must be positive"));
        }
        if self.memory_capacity == 0 {
            return Err(invalid("memory_capacity must be positive"));
        }
        Ok(())
    }

    /// The per-call oracle deadline.
    pub const fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    /// The stalemate cap: the smaller non-zero of `max_turns` and the spec's
    /// `turn_limit`.
    pub fn turn_cap(&self, spec_limit: Option<u64>) -> Result<u64, ConfigError> {
        let candidates = [Some(self.max_turns), spec_limit];
        candidates
            .into_iter()
            .flatten()
            .filter(|&n| n > 0)
            .min()
            .ok_or_else(|| invalid("no turn cap: max_turns and the spec's turn_limit are both 0"))
    }
}

fn invalid(reason: &str) -> ConfigError {
    ConfigError::Invalid {
        reason: reason.to_owned(),
    }
}

const fn default_seed() -> u64 {
    42
}

const fn default_decision_timeout_ms() -> u64 {
    30_000
}

const fn default_max_concurrent_calls() -> usize {
    8
}

const fn default_max_turns() -> u64 {
    50
}

const fn default_memory_capacity() -> usize {
    30
}

const fn default_true() -> bool {
    true
}

fn default_language() -> String {
    "en".to_owned()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("game_log.jsonl")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_yields_defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.seed, 42);
        assert_eq!(config.memory_capacity, 30);
        assert!(config.system_authority);
        assert_eq!(config.game.language, "en");
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config = EngineConfig::parse(
            "seed: 7\nmax_turns: 3\ngame:\n  ruleset: clocktower\n  player_count: 9\n",
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.max_turns, 3);
        assert_eq!(config.decision_timeout(), Duration::from_secs(30));
        assert_eq!(config.game.ruleset.as_deref(), Some("clocktower"));
        assert_eq!(config.game.player_count, Some(9));
        assert_eq!(config.game.log_path, PathBuf::from("game_log.jsonl"));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(matches!(
            EngineConfig::parse("max_concurrent_calls: 0"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            EngineConfig::parse("seed: [1, 2]"),
            Err(ConfigError::Yaml { .. })
        ));
    }

    #[test]
    fn turn_cap_takes_the_smaller_positive_limit() {
        let mut config = EngineConfig::default();
        assert_eq!(config.turn_cap(None).unwrap(), 50);
        assert_eq!(config.turn_cap(Some(20)).unwrap(), 20);
        assert_eq!(config.turn_cap(Some(0)).unwrap(), 50);

        config.max_turns = 0;
        assert_eq!(config.turn_cap(Some(12)).unwrap(), 12);
        assert!(config.turn_cap(None).is_err());
        assert!(config.turn_cap(Some(0)).is_err());
    }
}
