//! The ruleset boundary.
//!
//! A [`Ruleset`] supplies everything game-specific: handlers, the meta
//! schema, initial state, role dealing, and participant briefings. Rulesets
//! are plain values chosen by name at startup; the engine never loads code.

use parley_types::{
    CapabilityRole, GameSpec, MetaMap, MetaSchema, PrivateState, RoleAssignment, SpecError,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::builtin::register_builtins;
use crate::error::RegistryError;
use crate::registry::Registry;

/// What a briefing is built from.
#[derive(Debug, Clone, Copy)]
pub struct BriefingContext<'a> {
    /// The game being played.
    pub spec: &'a GameSpec,
    /// Who is being briefed.
    pub name: &'a str,
    /// Their capability class.
    pub capability: CapabilityRole,
    /// Their dealt role, for players.
    pub assignment: Option<&'a RoleAssignment>,
    /// Private state after setup.
    pub private: &'a PrivateState,
    /// Language to speak.
    pub language: &'a str,
}

/// A named set of game behaviors.
pub trait Ruleset: Send + Sync {
    /// Catalog name.
    fn name(&self) -> &str;

    /// Declared shapes of public meta keys.
    fn meta_schema(&self) -> MetaSchema {
        MetaSchema::new()
    }

    /// Register phase and capability handlers.
    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        register_builtins(registry)
    }

    /// Public meta at turn 0.
    fn initial_public_meta(&self, spec: &GameSpec, _rng: &mut StdRng) -> MetaMap {
        spec.meta.clone()
    }

    /// Private meta at turn 0.
    fn initial_private_meta(&self, _spec: &GameSpec, _rng: &mut StdRng) -> MetaMap {
        MetaMap::new()
    }

    /// Deal one role per seat, shuffled.
    fn assign_roles(
        &self,
        spec: &GameSpec,
        player_count: Option<u32>,
        rng: &mut StdRng,
    ) -> Result<Vec<RoleAssignment>, SpecError> {
        let mut seats = spec.deal(player_count)?;
        seats.shuffle(rng);
        Ok(seats)
    }

    /// Static context sent with every request of one participant.
    fn briefing(&self, ctx: &BriefingContext<'_>) -> String {
        default_briefing(ctx)
    }

    /// A registry with this ruleset's schema and handlers.
    fn registry(&self) -> Result<Registry, RegistryError> {
        let mut registry = Registry::with_schema(self.meta_schema());
        self.register(&mut registry)?;
        Ok(registry)
    }
}

/// Rules text plus a capability-specific identity paragraph.
pub fn default_briefing(ctx: &BriefingContext<'_>) -> String {
    let rules = ctx.spec.render_rules();
    let identity = match (ctx.capability, ctx.assignment) {
        (CapabilityRole::Player, Some(role)) => {
            let abilities = if role.abilities.is_empty() {
                "none".to_owned()
            } else {
                role.abilities.join(", ")
            };
            format!(
                "You are {}. Your secret role is {} (team {}). Abilities: {abilities}.\n\
                 Speak only as yourself.",
                ctx.name, role.role, role.team
            )
        }
        (CapabilityRole::Player, None) => format!("You are {}.", ctx.name),
        (CapabilityRole::AuthorityGm, _) => "You are the GM, an impartial game master. \
             You see every message, public or direct, and every secret role. \
             Announce phases, enforce the rules, and steer the game."
            .to_owned(),
        (CapabilityRole::AuthoritySystem, _) => "You are the SYSTEM agent. \
             You never speak to players. After each round, return the state \
             updates the round implies and declare a winner when one exists."
            .to_owned(),
    };
    format!("{rules}\n\n{identity}\nSpeak in {}.", ctx.language)
}

/// The built-in phases and abilities with no extra state.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRuleset;

impl Ruleset for StandardRuleset {
    fn name(&self) -> &str {
        "standard"
    }
}
