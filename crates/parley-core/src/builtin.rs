//! Built-in phases and abilities.
//!
//! | Name | Kind | Asks | Effect |
//! |------|------|------|--------|
//! | `discussion` | phase | living players + GM bid | highest bidder speaks |
//! | `vote` | phase | living players name a target | plurality is eliminated |
//! | `gm_directive` | phase | GM directive | announce, mutate, steer |
//! | `kill` / `eliminate` | ability | holders name a non-holder | plurality is eliminated |
//! | `inspect` | ability | holders name a target | first holder learns the team |
//!
//! Each handler is built from the pipeline functions below so rulesets can
//! reuse and extend them.

use std::collections::BTreeMap;

use parley_types::{Message, MetaValue};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

use crate::error::RegistryError;
use crate::registry::{Ask, Audience, CapabilityHandler, PhaseHandler, PhasePipeline, Registry};
use crate::scheduler::select_speaker;

/// The bidding phase.
pub const DISCUSSION: &str = "discussion";
/// The elimination vote.
pub const VOTE: &str = "vote";
/// The GM directive phase.
pub const GM_DIRECTIVE: &str = "gm_directive";
/// Night kill by plurality of holders.
pub const KILL: &str = "kill";
/// Alias of [`KILL`].
pub const ELIMINATE: &str = "eliminate";
/// Team inspection.
pub const INSPECT: &str = "inspect";

/// Secret key under which an inspection result is stored.
pub fn inspection_key(target: &str) -> String {
    format!("team_of:{target}")
}

/// The most named entry; ties are broken by `rng` among the tied names.
pub fn plurality<'n>(names: impl IntoIterator<Item = &'n str>, rng: &mut StdRng) -> Option<String> {
    let mut tally: BTreeMap<&str, usize> = BTreeMap::new();
    for name in names {
        let count = tally.entry(name).or_insert(0);
        *count = count.saturating_add(1);
    }
    let top = tally.values().copied().max()?;
    let tied: Vec<&str> = tally
        .into_iter()
        .filter(|(_, n)| *n == top)
        .map(|(name, _)| name)
        .collect();
    tied.choose(rng).map(|name| (*name).to_owned())
}

/// Select the speaker and commit their message.
pub fn discussion() -> PhasePipeline {
    PhasePipeline::new().then("select_speaker", |input, out, rng| {
        let Some(selection) = select_speaker(input.decisions, rng) else {
            return;
        };
        if let Some(decision) = input.decisions.get(&selection.speaker) {
            out.message = Some(Message {
                turn: input.turn,
                sender: selection.speaker.clone(),
                recipients: decision.recipients.clone(),
                text: decision.message.clone(),
            });
            out.reason.clone_from(&decision.rationale);
        }
        out.selection = Some(selection);
    })
}

/// Eliminate the plurality vote target and announce it.
pub fn vote() -> PhasePipeline {
    PhasePipeline::new().then("tally_votes", |input, out, rng| {
        let targets = input.targets();
        match plurality(targets.iter().map(|(_, t)| *t), rng) {
            Some(victim) => {
                let verb = input.param_str("verb").unwrap_or("eliminated");
                out.announce(input.turn, &format!("{victim} is {verb} by vote."));
                out.reason = format!("{} of {} votes cast", targets.len(), input.actors.len());
                out.eliminate(&victim);
            }
            None => out.announce(input.turn, "No valid votes. Nobody is eliminated."),
        }
    })
}

/// Carry the GM's directive into the outcome.
pub fn apply_directive() -> PhasePipeline {
    PhasePipeline::new().then("apply_directive", |input, out, _| {
        let Some(directive) = input.directive else {
            return;
        };
        if !directive.message.trim().is_empty() {
            out.announce(input.turn, directive.message.trim());
        }
        out.delta.merge(directive.delta.clone());
        out.commands.extend(directive.commands.iter().cloned());
        out.next_phase.clone_from(&directive.next_phase);
        out.winner.clone_from(&directive.winner);
        out.reason.clone_from(&directive.rationale);
    })
}

/// Eliminate the holders' plurality target, never a holder.
pub fn night_kill(announcement: &'static str) -> PhasePipeline {
    PhasePipeline::new().then("kill_target", move |input, out, rng| {
        let targets = input.targets();
        let victims = targets
            .iter()
            .map(|(_, t)| *t)
            .filter(|t| !input.actors.iter().any(|a| a == t));
        if let Some(victim) = plurality(victims, rng) {
            out.announce(input.turn, &announcement.replace("{victim}", &victim));
            out.eliminate(&victim);
        }
    })
}

/// Record the target's team in the first holder's secrets.
pub fn inspect() -> PhasePipeline {
    PhasePipeline::new().then("inspect_target", |input, out, _| {
        let Some(holder) = input.actors.first() else {
            return;
        };
        let Some(target) = input
            .decisions
            .get(holder)
            .and_then(|d| d.target.as_deref())
        else {
            return;
        };
        let team = input
            .state
            .private
            .team_of(target)
            .unwrap_or("unknown")
            .to_owned();
        out.reason = format!("{holder} inspected {target}");
        out.set_secret(holder, &inspection_key(target), MetaValue::Str(team));
    })
}

/// A phase asking every living player to name another.
pub fn vote_handler(pipeline: PhasePipeline) -> PhaseHandler {
    PhaseHandler {
        audience: Audience::LivingPlayers,
        ask: Some(Ask::target("Vote to eliminate one player.", false, true)),
        pipeline,
    }
}

/// Register every built-in phase and ability.
pub fn register_builtins(registry: &mut Registry) -> Result<(), RegistryError> {
    registry.register_phase(
        DISCUSSION,
        PhaseHandler {
            audience: Audience::Floor,
            ask: Some(Ask::Bid),
            pipeline: discussion(),
        },
    )?;
    registry.register_phase(VOTE, vote_handler(vote()))?;
    registry.register_phase(
        GM_DIRECTIVE,
        PhaseHandler {
            audience: Audience::Gm,
            ask: Some(Ask::Directive),
            pipeline: apply_directive(),
        },
    )?;

    for ability in [KILL, ELIMINATE] {
        registry.register_capability(
            ability,
            CapabilityHandler {
                ask: Some(Ask::target(
                    "Choose a victim. You cannot choose yourself or a partner.",
                    false,
                    false,
                )),
                pipeline: night_kill("{victim} was killed during the night."),
            },
        )?;
    }
    registry.register_capability(
        INSPECT,
        CapabilityHandler {
            ask: Some(Ask::target("Choose a player to inspect.", false, true)),
            pipeline: inspect(),
        },
    )?;
    Ok(())
}
