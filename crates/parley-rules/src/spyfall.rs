//! Spyfall: everyone but the Spy knows the secret location.
//!
//! The location lives in private meta so only authorities see it in their
//! requests; locals get it through their briefing. After the discussion
//! rounds the table accuses one player, whose role is revealed. The Spy may
//! instead guess the location on their own turn.

use parley_core::builtin::{self, plurality, vote_handler};
use parley_core::error::RegistryError;
use parley_core::registry::{Ask, CapabilityHandler, PhasePipeline, Registry};
use parley_core::ruleset::{BriefingContext, Ruleset, default_briefing};
use parley_types::{CapabilityRole, GameSpec, MetaKind, MetaMap, MetaSchema, MetaValue};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::info;

/// Accusation phase.
pub const VOTE_REVEAL: &str = "vote_reveal";
/// The Spy's location guess.
pub const GUESS_LOCATION: &str = "guess_location";

const SPY_TEAM: &str = "Spy";
const LOCALS_TEAM: &str = "Locals";
const LOCATION_KEY: &str = "location";

/// Locations the secret one is drawn from.
pub const LOCATIONS: [&str; 12] = [
    "Airplane",
    "Bank",
    "Beach",
    "Casino",
    "Cathedral",
    "Circus",
    "Embassy",
    "Hospital",
    "Hotel",
    "Movie Studio",
    "Submarine",
    "University",
];

/// Find the spy before they find the location.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpyfallRuleset;

impl Ruleset for SpyfallRuleset {
    fn name(&self) -> &str {
        "spyfall"
    }

    fn meta_schema(&self) -> MetaSchema {
        MetaSchema::new()
            .field("locations", MetaKind::List)
            .field("wrong_guesses", MetaKind::Int)
    }

    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        builtin::register_builtins(registry)?;
        registry.register_phase(VOTE_REVEAL, vote_handler(reveal_accused()))?;
        registry.register_capability(
            GUESS_LOCATION,
            CapabilityHandler {
                ask: Some(Ask::Bid),
                pipeline: guess_location(),
            },
        )
    }

    fn initial_public_meta(&self, spec: &GameSpec, _rng: &mut StdRng) -> MetaMap {
        let mut meta = spec.meta.clone();
        meta.insert(
            "locations".to_owned(),
            MetaValue::List(LOCATIONS.iter().map(|l| (*l).to_owned()).collect()),
        );
        meta
    }

    fn initial_private_meta(&self, _spec: &GameSpec, rng: &mut StdRng) -> MetaMap {
        let location = LOCATIONS.choose(rng).copied().unwrap_or_default();
        MetaMap::from([(LOCATION_KEY.to_owned(), MetaValue::from(location))])
    }

    fn briefing(&self, ctx: &BriefingContext<'_>) -> String {
        let location = ctx
            .private
            .meta
            .get(LOCATION_KEY)
            .and_then(MetaValue::as_str)
            .unwrap_or("unknown");
        let is_spy = ctx.assignment.is_some_and(|a| a.team == SPY_TEAM);
        let note = match ctx.capability {
            CapabilityRole::Player if is_spy => format!(
                "You do not know the location. Blend in. In the {GUESS_LOCATION} phase, \
                 bid above 0 and put your guess in msg to guess now, or bid 0 to wait. \
                 Possible locations: {}.",
                LOCATIONS.join(", ")
            ),
            CapabilityRole::Player => format!(
                "The location is {location}. Prove you know it without giving it away."
            ),
            CapabilityRole::AuthorityGm | CapabilityRole::AuthoritySystem => {
                format!("The secret location is {location}.")
            }
        };
        format!("{}\n{note}", default_briefing(ctx))
    }
}

/// Reveal the accused player's role and decide the game on it.
pub fn reveal_accused() -> PhasePipeline {
    PhasePipeline::new().then("reveal_accused", |input, out, rng| {
        let targets = input.targets();
        let Some(accused) = plurality(targets.iter().map(|(_, t)| *t), rng) else {
            out.announce(input.turn, "Nobody was accused.");
            return;
        };
        let Some(assignment) = input.state.private.assignment(&accused) else {
            return;
        };
        out.announce(
            input.turn,
            &format!("{accused} is accused and revealed as the {}.", assignment.role),
        );
        out.eliminate(&accused);
        let winner = if assignment.team == SPY_TEAM {
            LOCALS_TEAM
        } else {
            SPY_TEAM
        };
        out.winner = Some(winner.to_owned());
    })
}

/// Let the Spy name the location; a right guess wins outright.
pub fn guess_location() -> PhasePipeline {
    PhasePipeline::new().then("guess_location", |input, out, _| {
        let Some(spy) = input.actors.first() else {
            return;
        };
        let Some(decision) = input.decisions.get(spy) else {
            return;
        };
        let guess = decision.message.trim();
        if decision.bid.is_zero() || guess.is_empty() {
            return;
        }
        let location = input
            .state
            .private
            .meta
            .get(LOCATION_KEY)
            .and_then(MetaValue::as_str)
            .unwrap_or_default();
        info!(turn = input.turn, %spy, guess, "location guessed");
        if guess.eq_ignore_ascii_case(location) {
            out.announce(
                input.turn,
                &format!("{spy} is the Spy and named the location: {location}."),
            );
            out.winner = Some(SPY_TEAM.to_owned());
        } else {
            let wrong = input
                .meta("wrong_guesses")
                .and_then(MetaValue::as_counter)
                .unwrap_or(0);
            out.set_public("wrong_guesses", wrong.saturating_add(1));
            out.announce(input.turn, "A location guess was made, and it was wrong.");
        }
    })
}
