//! Shared type definitions for the Parley turn-orchestration engine.
//!
//! This crate is the single source of truth for the data that flows between
//! the engine core, the rulesets, and the reasoning oracle. It holds data and
//! pure functions only; orchestration lives in `parley-core`.
//!
//! # Modules
//!
//! - [`meta`] -- Typed key-value store with per-ruleset schemas
//! - [`participant`] -- Capability roles, role assignments, messages, recipients
//! - [`state`] -- Public/private state and the deltas that mutate them
//! - [`spec`] -- The declarative [`GameSpec`]
//! - [`decision`] -- Oracle requests, action decisions, directives, engine commands
//! - [`events`] -- Append-only event records

pub mod decision;
pub mod events;
pub mod meta;
pub mod participant;
pub mod spec;
pub mod state;

// Re-export all public types at crate root for convenience.
pub use decision::{
    ActionDecision, DECISION_FAILURE, Directive, EngineCommand, OracleRequest, RequestKind,
};
pub use events::{EventRecord, GameEvent, GameOutcome};
pub use meta::{MetaKind, MetaMap, MetaSchema, MetaValue, SchemaViolation};
pub use participant::{
    BROADCAST_TOKEN, CapabilityRole, GM_NAME, MemoryEntry, Message, Recipients, RoleAssignment,
    SYSTEM_NAME,
};
pub use spec::{
    ABILITY_PHASE, GameSpec, PhaseSpec, RoleCount, RoleTemplate, SpecError, VictoryRule,
};
pub use state::{AppliedDelta, GameState, PrivateRecord, PrivateState, PublicState, StateDelta};
