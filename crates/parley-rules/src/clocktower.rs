//! A Trouble Brewing style script.
//!
//! Night abilities share state through public meta:
//!
//! - `poisoned`: map of player to nights of poison left
//! - `last_executed` / `last_killed_night`: feeds the Undertaker
//! - `slayer_used`: the Slayer fires once per game
//!
//! A poisoned information role still gets an answer, only a random one.

use std::collections::BTreeMap;

use parley_core::builtin::{self, vote_handler};
use parley_core::error::RegistryError;
use parley_core::registry::{Ask, CapabilityHandler, PhaseInput, PhasePipeline, Registry};
use parley_core::ruleset::{BriefingContext, Ruleset, default_briefing};
use parley_types::{CapabilityRole, MetaKind, MetaSchema, MetaValue};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::debug;

/// Phase that votes and records who was executed.
pub const VOTE_RECORD: &str = "vote_record";
/// The Demon's night kill.
pub const DEMON_KILL: &str = "demon_kill";
/// The Poisoner's night action.
pub const POISON: &str = "poison";
/// The Empath's neighbour count.
pub const EMPATH_PING: &str = "empath_ping";
/// The Undertaker's look at the executed player.
pub const UNDERTAKER_REVEAL: &str = "undertaker_reveal";
/// The Slayer's single shot.
pub const SLAYER_SHOT: &str = "slayer_shot";

const EVIL_TEAM: &str = "Evil";
const DEFAULT_POISON_NIGHTS: i64 = 2;

/// Blood on the Clocktower, Trouble Brewing flavoured.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClocktowerRuleset;

impl Ruleset for ClocktowerRuleset {
    fn name(&self) -> &str {
        "clocktower"
    }

    fn meta_schema(&self) -> MetaSchema {
        MetaSchema::new()
            .field("poisoned", MetaKind::Map)
            .field("last_executed", MetaKind::Str)
            .field("last_killed_night", MetaKind::Str)
            .field("slayer_used", MetaKind::Bool)
            .field("night_order", MetaKind::List)
    }

    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        builtin::register_builtins(registry)?;
        registry.register_phase(
            VOTE_RECORD,
            vote_handler(builtin::vote().followed_by(&record_last_executed())),
        )?;
        registry.register_capability(
            DEMON_KILL,
            CapabilityHandler {
                ask: Some(Ask::target("Choose a player to kill tonight.", false, true)),
                pipeline: demon_kill(),
            },
        )?;
        registry.register_capability(
            POISON,
            CapabilityHandler {
                ask: Some(Ask::target("Choose a player to poison.", false, true)),
                pipeline: poison(),
            },
        )?;
        registry.register_capability(
            EMPATH_PING,
            CapabilityHandler {
                ask: None,
                pipeline: empath_ping(),
            },
        )?;
        registry.register_capability(
            UNDERTAKER_REVEAL,
            CapabilityHandler {
                ask: None,
                pipeline: undertaker_reveal(),
            },
        )?;
        registry.register_capability(
            SLAYER_SHOT,
            CapabilityHandler {
                ask: Some(Ask::target(
                    "You may fire once per game. Name a player to slay, or skip.",
                    false,
                    true,
                )),
                pipeline: slayer_shot(),
            },
        )?;
        Ok(())
    }

    fn briefing(&self, ctx: &BriefingContext<'_>) -> String {
        let note = match ctx.capability {
            CapabilityRole::Player => {
                "If you are poisoned, your ability may give you false information. \
                 Nobody will tell you."
            }
            CapabilityRole::AuthorityGm => {
                "You are the Storyteller. Night abilities resolve in night order; \
                 use the gm_directive phase for anything they do not cover."
            }
            CapabilityRole::AuthoritySystem => {
                "Keep poisoned, last_executed and slayer_used consistent with what happened."
            }
        };
        format!("{}\n{note}", default_briefing(ctx))
    }
}

/// Nights of poison left on `name`.
fn poison_left(input: &PhaseInput<'_>, name: &str) -> i64 {
    match input.meta("poisoned") {
        Some(MetaValue::Map(entries)) => entries
            .get(name)
            .and_then(MetaValue::as_counter)
            .unwrap_or(0),
        _ => 0,
    }
}

/// The first holder and the living target they named.
fn holder_target<'i>(input: &PhaseInput<'i>) -> Option<(&'i str, &'i str)> {
    let holder = input.actors.first()?;
    let target = input.decisions.get(holder)?.target.as_deref()?;
    (target != holder.as_str() && input.state.public.is_alive(target)).then_some((holder.as_str(), target))
}

/// Living neighbours of `name` around the table, without repeats.
fn neighbours<'a>(alive: &'a [String], name: &str) -> Vec<&'a str> {
    let Some(idx) = alive.iter().position(|n| n == name) else {
        return Vec::new();
    };
    let len = alive.len();
    let left = idx.checked_sub(1).unwrap_or_else(|| len.saturating_sub(1));
    let right = idx.saturating_add(1).checked_rem(len).unwrap_or(0);
    let mut out: Vec<&str> = [left, right]
        .iter()
        .filter_map(|&i| alive.get(i))
        .map(String::as_str)
        .filter(|n| *n != name)
        .collect();
    out.dedup();
    out
}

/// Store the vote's victim as `last_executed`.
pub fn record_last_executed() -> PhasePipeline {
    PhasePipeline::new().then("record_last_executed", |_, out, _| {
        if let Some(victim) = out.delta.eliminate.first().cloned() {
            out.set_public("last_executed", victim);
        }
    })
}

/// The Demon kills one player, possibly a minion.
pub fn demon_kill() -> PhasePipeline {
    PhasePipeline::new().then("demon_kill", |input, out, _| {
        let Some((demon, victim)) = holder_target(input) else {
            return;
        };
        out.announce(input.turn, &format!("{victim} was killed by the Demon."));
        out.eliminate(victim);
        out.set_public("last_killed_night", victim);
        out.reason = format!("{demon} chose {victim}");
    })
}

/// Tick existing poison down and poison the new target.
pub fn poison() -> PhasePipeline {
    PhasePipeline::new().then("poison_target", |input, out, _| {
        let mut poisoned: BTreeMap<String, MetaValue> = match input.meta("poisoned") {
            Some(MetaValue::Map(entries)) => entries
                .iter()
                .filter_map(|(name, left)| {
                    let left = left.as_counter()?.saturating_sub(1);
                    (left > 0).then(|| (name.clone(), MetaValue::Int(left)))
                })
                .collect(),
            _ => BTreeMap::new(),
        };
        if let Some((poisoner, target)) = holder_target(input) {
            let nights = input.param_i64("nights").unwrap_or(DEFAULT_POISON_NIGHTS);
            poisoned.insert(target.to_owned(), MetaValue::Int(nights));
            out.set_secret(poisoner, "last_poisoned", target);
            debug!(turn = input.turn, target, nights, "player poisoned");
        }
        out.set_public("poisoned", MetaValue::Map(poisoned));
    })
}

/// Tell the Empath how many living neighbours are evil.
pub fn empath_ping() -> PhasePipeline {
    PhasePipeline::new().then("empath_ping", |input, out, rng| {
        let Some(empath) = input.actors.first() else {
            return;
        };
        let count = if poison_left(input, empath) > 0 {
            rng.random_range(0..=2_i64)
        } else {
            let evil = neighbours(&input.state.public.alive, empath)
                .into_iter()
                .filter(|n| input.state.private.team_of(n) == Some(EVIL_TEAM))
                .count();
            i64::try_from(evil).unwrap_or(0)
        };
        out.set_secret(empath, "evil_neighbours", count);
    })
}

/// Show the Undertaker the role of the last executed player.
pub fn undertaker_reveal() -> PhasePipeline {
    PhasePipeline::new().then("undertaker_reveal", |input, out, rng| {
        let Some(undertaker) = input.actors.first() else {
            return;
        };
        let Some(executed) = input
            .meta("last_executed")
            .and_then(MetaValue::as_str)
            .filter(|name| !name.is_empty())
        else {
            return;
        };
        let role = if poison_left(input, undertaker) > 0 {
            let dealt: Vec<&str> = input
                .state
                .private
                .records
                .values()
                .map(|r| r.assignment.role.as_str())
                .collect();
            dealt.choose(rng).map(|r| (*r).to_owned())
        } else {
            input
                .state
                .private
                .assignment(executed)
                .map(|a| a.role.clone())
        };
        if let Some(role) = role {
            out.set_secret(undertaker, &format!("role_of:{executed}"), role);
        }
    })
}

/// Once per game: a shot at the Demon.
pub fn slayer_shot() -> PhasePipeline {
    PhasePipeline::new().then("slayer_shot", |input, out, _| {
        let used = input
            .meta("slayer_used")
            .and_then(MetaValue::as_counter)
            .is_some_and(|n| n > 0);
        if used {
            return;
        }
        let Some((_, target)) = holder_target(input) else {
            return;
        };
        out.set_public("slayer_used", true);
        let is_demon = input
            .state
            .private
            .assignment(target)
            .is_some_and(|a| a.grants(DEMON_KILL));
        if is_demon {
            out.announce(input.turn, &format!("The Slayer shot {target}. The Demon is dead!"));
            out.eliminate(target);
        } else {
            out.announce(input.turn, &format!("The Slayer shot {target}. Nothing happened."));
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use parley_types::{ActionDecision, GameState, PhaseSpec, PrivateRecord, RoleAssignment};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::bundled_spec;

    const SEATS: [(&str, &str, &str, &str); 5] = [
        ("P1", "Imp", "Evil", DEMON_KILL),
        ("P2", "Empath", "Town", EMPATH_PING),
        ("P3", "Poisoner", "Evil", POISON),
        ("P4", "Slayer", "Town", SLAYER_SHOT),
        ("P5", "Undertaker", "Town", UNDERTAKER_REVEAL),
    ];

    fn state() -> GameState {
        let mut state = GameState::default();
        for (name, role, team, ability) in SEATS {
            state.public.alive.push(name.to_owned());
            state.private.records.insert(
                name.to_owned(),
                PrivateRecord {
                    assignment: RoleAssignment {
                        role: role.to_owned(),
                        team: team.to_owned(),
                        abilities: vec![ability.to_owned()],
                    },
                    secrets: parley_types::MetaMap::new(),
                },
            );
        }
        state
    }

    fn run(
        pipeline: &PhasePipeline,
        state: &GameState,
        phase: &PhaseSpec,
        actor: &str,
        target: Option<&str>,
    ) -> parley_core::registry::PhaseOutcome {
        let actors = vec![actor.to_owned()];
        let mut decision = ActionDecision::safe_default();
        decision.target = target.map(str::to_owned);
        let decisions = [(actor.to_owned(), decision)].into_iter().collect();
        let input = PhaseInput {
            turn: 3,
            phase,
            state,
            actors: &actors,
            decisions: &decisions,
            directive: None,
            ability: None,
        };
        pipeline.run(&input, &mut StdRng::seed_from_u64(11))
    }

    #[test]
    fn bundled_spec_validates_against_the_registry() {
        let spec = bundled_spec("clocktower").unwrap().unwrap();
        ClocktowerRuleset.registry().unwrap().validate(&spec).unwrap();
    }

    #[test]
    fn neighbours_wrap_around_the_table() {
        let alive: Vec<String> = ["P1", "P2", "P3"].iter().map(|s| (*s).to_owned()).collect();
        assert_eq!(neighbours(&alive, "P1"), vec!["P3", "P2"]);
        assert_eq!(neighbours(&alive[..2], "P1"), vec!["P2"]);
        assert!(neighbours(&alive[..1], "P1").is_empty());
    }

    #[test]
    fn empath_counts_evil_neighbours() {
        let state = state();
        let out = run(&empath_ping(), &state, &PhaseSpec::ability(EMPATH_PING), "P2", None);
        let secrets = out.delta.secrets.get("P2").unwrap();
        assert_eq!(secrets.get("evil_neighbours"), Some(&MetaValue::Int(2)));
    }

    #[test]
    fn poison_ticks_down_and_expires() {
        let mut state = state();
        let earlier: BTreeMap<String, MetaValue> =
            [("P4".to_owned(), MetaValue::Int(1)), ("P5".to_owned(), MetaValue::Int(2))]
                .into_iter()
                .collect();
        state.public.meta.insert("poisoned".into(), MetaValue::Map(earlier));
        let phase = PhaseSpec::ability(POISON);
        let out = run(&poison(), &state, &phase, "P3", Some("P2"));
        let Some(MetaValue::Map(poisoned)) = out.delta.public.get("poisoned") else {
            panic!("poisoned map missing");
        };
        assert_eq!(poisoned.get("P2"), Some(&MetaValue::Int(DEFAULT_POISON_NIGHTS)));
        assert_eq!(poisoned.get("P5"), Some(&MetaValue::Int(1)));
        assert!(!poisoned.contains_key("P4"));
        assert_eq!(
            out.delta.secrets.get("P3").unwrap().get("last_poisoned"),
            Some(&MetaValue::Str("P2".into()))
        );
    }

    #[test]
    fn undertaker_sees_the_executed_role() {
        let mut state = state();
        state.public.meta.insert("last_executed".into(), "P3".into());
        let phase = PhaseSpec::ability(UNDERTAKER_REVEAL);
        let out = run(&undertaker_reveal(), &state, &phase, "P5", None);
        assert_eq!(
            out.delta.secrets.get("P5").unwrap().get("role_of:P3"),
            Some(&MetaValue::Str("Poisoner".into()))
        );
    }

    #[test]
    fn slayer_fires_once_and_only_kills_the_demon() {
        let mut state = state();
        let phase = PhaseSpec::ability(SLAYER_SHOT);

        let miss = run(&slayer_shot(), &state, &phase, "P4", Some("P3"));
        assert!(miss.delta.eliminate.is_empty());
        assert_eq!(miss.delta.public.get("slayer_used"), Some(&MetaValue::Bool(true)));

        let hit = run(&slayer_shot(), &state, &phase, "P4", Some("P1"));
        assert_eq!(hit.delta.eliminate, vec!["P1".to_owned()]);

        state.public.meta.insert("slayer_used".into(), true.into());
        let spent = run(&slayer_shot(), &state, &phase, "P4", Some("P1"));
        assert!(spent.delta.eliminate.is_empty());
        assert!(spent.message.is_none());
    }

    #[test]
    fn demon_kill_records_the_night_death() {
        let state = state();
        let out = run(&demon_kill(), &state, &PhaseSpec::ability(DEMON_KILL), "P1", Some("P3"));
        assert_eq!(out.delta.eliminate, vec!["P3".to_owned()]);
        assert_eq!(
            out.delta.public.get("last_killed_night"),
            Some(&MetaValue::Str("P3".into()))
        );
    }

    #[test]
    fn vote_record_keeps_the_executed_name() {
        let registry = ClocktowerRuleset.registry().unwrap();
        let resolved = registry.resolve(&PhaseSpec::of_kind(VOTE_RECORD)).unwrap();
        assert_eq!(
            resolved.pipeline.step_names(),
            vec!["tally_votes", "record_last_executed"]
        );
    }
}
