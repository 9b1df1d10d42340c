//! Fatal error types for the engine core.
//!
//! Only configuration problems are fatal. Oracle failures, unevaluable
//! victory expressions and rejected engine commands are recovered where
//! they happen and surface as events, never as [`GameError`].

use parley_types::{SchemaViolation, SpecError};

use crate::config::ConfigError;
use crate::events::SinkError;

/// Errors raised while registering or resolving handlers.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A phase tag has no registered handler.
    #[error("no phase handler registered for `{tag}`")]
    MissingPhase {
        /// The unhandled phase tag.
        tag: String,
    },

    /// An ability has no registered capability handler.
    #[error("no capability handler registered for ability `{ability}`")]
    MissingCapability {
        /// The unhandled ability.
        ability: String,
    },

    /// A name was registered twice.
    #[error("`{name}` is already registered as a {kind}")]
    Duplicate {
        /// `phase` or `capability`.
        kind: &'static str,
        /// The name.
        name: String,
    },

    /// The initial meta does not conform to the declared schema.
    #[error("initial meta violates the ruleset schema: {source}")]
    Schema {
        /// The first violation found.
        #[from]
        source: SchemaViolation,
    },
}

/// Top-level error of a game session.
///
/// Every variant aborts the game; `main` reports it and exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    /// The game spec could not be loaded or is unplayable.
    #[error("spec error: {source}")]
    Spec {
        /// The underlying spec error.
        #[from]
        source: SpecError,
    },

    /// The engine configuration is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A phase or capability handler is missing.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// The event log could not be written.
    #[error("event log error: {source}")]
    EventLog {
        /// The underlying sink error.
        #[from]
        source: SinkError,
    },

    /// No ruleset with the requested name exists.
    #[error("unknown ruleset `{name}`")]
    UnknownRuleset {
        /// The requested name.
        name: String,
    },
}
