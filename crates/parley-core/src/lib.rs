//! Turn-orchestration core for Parley, an engine for LLM-played social
//! deduction games.
//!
//! A game is a cycle of phases played in rounds. Each round:
//!
//! - **scheduler**: fans decision requests out to the oracle, picks a
//!   speaker, commits one message and one state change
//! - **mailbox**: routes the message and keeps bounded memories
//! - **phase**: advances the phase cycle, honoring directive overrides
//! - **expr**: evaluates the victory expressions
//!
//! Game-specific behavior lives behind [`ruleset::Ruleset`] and the
//! [`registry::Registry`] it fills; [`builtin`] provides the standard
//! phases and abilities. [`game::run_game`] ties it all together.

pub mod builtin;
pub mod commands;
pub mod config;
pub mod contract;
pub mod error;
pub mod events;
pub mod expr;
pub mod game;
pub mod mailbox;
pub mod phase;
pub mod registry;
pub mod ruleset;
pub mod scheduler;

pub use config::{ConfigError, EngineConfig, GameConfig};
pub use contract::{Oracle, OracleError, StubOracle};
pub use error::{GameError, RegistryError};
pub use events::{EventSink, JsonlSink, MemorySink, SinkError};
pub use game::{GameReport, run_game};
pub use registry::Registry;
pub use ruleset::{BriefingContext, Ruleset, StandardRuleset};
pub use scheduler::{RoundResult, Scheduler, Selection, Table};
