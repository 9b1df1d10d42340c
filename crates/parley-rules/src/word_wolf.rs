//! Word wolf: a one-day game of near-identical keywords.
//!
//! Citizens share a keyword; the wolves hold a slightly different one. The
//! pair is drawn into private meta at setup and each player learns only
//! their own word through the briefing. A single vote settles the game:
//! executing any wolf wins it for the citizens.

use parley_core::builtin::{self, vote, vote_handler};
use parley_core::error::RegistryError;
use parley_core::registry::{PhasePipeline, Registry};
use parley_core::ruleset::{BriefingContext, Ruleset};
use parley_types::{
    CapabilityRole, GameSpec, MetaMap, MetaValue, RoleAssignment, RoleCount, SpecError,
};
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};

/// The deciding vote.
pub const VOTE_WOLF: &str = "vote_wolf";

const WOLVES_TEAM: &str = "Wolves";
const CITIZENS_TEAM: &str = "Citizens";
const CITIZEN_WORD: &str = "citizen_word";
const WOLF_WORD: &str = "wolf_word";

/// Tables this large get a second wolf.
const SECOND_WOLF_AT: u32 = 8;

/// `(citizen word, wolf word)` pairs.
pub const WORD_PAIRS: [(&str, &str); 8] = [
    ("apple", "pear"),
    ("soccer", "basketball"),
    ("cat", "dog"),
    ("sea", "river"),
    ("sushi", "tempura"),
    ("coffee", "tea"),
    ("train", "bus"),
    ("violin", "cello"),
];

const RULEBOOK: &str = "\
===================== Word Wolf - Public Rulebook =====================
OVERVIEW
  * Everyone holds a secret keyword.
  * Most players (Citizens) share the SAME keyword.
  * One or two players (Wolves) hold a SLIGHTLY different keyword.

VICTORY
  * Citizens win if at least one Wolf is voted out.
  * Wolves win if no Wolf is voted out.

PHASE SEQUENCE (single day)
  1. Discussion - talk about your keyword without ever saying it.
  2. Vote - every living player names ONE player. Most votes is executed,
     ties are broken at random.
=======================================================================";

const GM_GUIDELINE: &str = "\
====================== GM Procedural Guideline ======================
  * Never reveal either keyword.
  * Moderate the discussion; call the vote once everyone has spoken.
  * Announce the executed player, then the winning side.
=====================================================================";

/// Word wolf with a random keyword pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct WordWolfRuleset;

impl Ruleset for WordWolfRuleset {
    fn name(&self) -> &str {
        "word_wolf"
    }

    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        builtin::register_builtins(registry)?;
        registry.register_phase(VOTE_WOLF, vote_handler(vote().followed_by(&settle_day())))
    }

    fn initial_private_meta(&self, _spec: &GameSpec, rng: &mut StdRng) -> MetaMap {
        let (citizen, wolf) = WORD_PAIRS.choose(rng).copied().unwrap_or_default();
        MetaMap::from([
            (CITIZEN_WORD.to_owned(), MetaValue::from(citizen)),
            (WOLF_WORD.to_owned(), MetaValue::from(wolf)),
        ])
    }

    fn assign_roles(
        &self,
        spec: &GameSpec,
        player_count: Option<u32>,
        rng: &mut StdRng,
    ) -> Result<Vec<RoleAssignment>, SpecError> {
        let mut spec = spec.clone();
        if player_count.is_some_and(|n| n >= SECOND_WOLF_AT) {
            for role in spec.roles.iter_mut().filter(|r| r.team == WOLVES_TEAM) {
                if role.count == RoleCount::Fixed(1) {
                    role.count = RoleCount::Fixed(2);
                }
            }
        }
        let mut seats = spec.deal(player_count)?;
        seats.shuffle(rng);
        Ok(seats)
    }

    fn briefing(&self, ctx: &BriefingContext<'_>) -> String {
        let word = |key: &str| {
            ctx.private
                .meta
                .get(key)
                .and_then(MetaValue::as_str)
                .unwrap_or("???")
                .to_owned()
        };
        let body = match (ctx.capability, ctx.assignment) {
            (CapabilityRole::Player, Some(a)) if a.team == WOLVES_TEAM => format!(
                "You are a Wolf. Your keyword is DIFFERENT from the majority. \
                 Blend in and avoid the vote.\nYour secret keyword: {}\nYou are {}.",
                word(WOLF_WORD),
                ctx.name
            ),
            (CapabilityRole::Player, _) => format!(
                "You are a Citizen. Most players share your keyword.\n\
                 Your secret keyword: {}\nYou are {}.",
                word(CITIZEN_WORD),
                ctx.name
            ),
            (CapabilityRole::AuthorityGm, _) => format!(
                "GM-only info:\n  * Citizen word: {}\n  * Wolf word: {}\n{GM_GUIDELINE}\n\
                 You are the GM.",
                word(CITIZEN_WORD),
                word(WOLF_WORD)
            ),
            (CapabilityRole::AuthoritySystem, _) => "You are the SYSTEM agent. Record the \
                 execution the GM announces. The citizens win if a Wolf was executed."
                .to_owned(),
        };
        format!("{RULEBOOK}\n{body}\nSpeak in {}.", ctx.language)
    }
}

/// Decide the game on the day's execution.
pub fn settle_day() -> PhasePipeline {
    PhasePipeline::new().then("settle_day", |input, out, _| {
        let wolf_out = out
            .delta
            .eliminate
            .iter()
            .any(|name| input.state.private.team_of(name) == Some(WOLVES_TEAM));
        let winner = if wolf_out { CITIZENS_TEAM } else { WOLVES_TEAM };
        out.announce(input.turn, &format!("The {winner} win."));
        out.winner = Some(winner.to_owned());
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_core::registry::{PhaseInput, PhaseOutcome};
    use parley_types::{ActionDecision, GameState, PhaseSpec, PrivateRecord};
    use rand::SeedableRng;

    use super::*;
    use crate::bundled_spec;

    fn state() -> GameState {
        let mut state = GameState::default();
        for (name, team) in [("P1", CITIZENS_TEAM), ("P2", WOLVES_TEAM), ("P3", CITIZENS_TEAM)] {
            state.public.alive.push(name.to_owned());
            state.private.records.insert(
                name.to_owned(),
                PrivateRecord {
                    assignment: RoleAssignment {
                        role: if team == WOLVES_TEAM { "Wolf" } else { "Citizen" }.to_owned(),
                        team: team.to_owned(),
                        abilities: Vec::new(),
                    },
                    secrets: MetaMap::new(),
                },
            );
        }
        state.private.meta.insert(CITIZEN_WORD.into(), "coffee".into());
        state.private.meta.insert(WOLF_WORD.into(), "cocoa".into());
        state
    }

    fn day_vote(state: &GameState, votes: [(&str, &str); 3]) -> PhaseOutcome {
        let actors: Vec<String> = votes.iter().map(|(n, _)| (*n).to_owned()).collect();
        let decisions = votes
            .iter()
            .map(|(voter, target)| {
                let mut d = ActionDecision::safe_default();
                d.target = Some((*target).to_owned());
                ((*voter).to_owned(), d)
            })
            .collect();
        let phase = PhaseSpec::of_kind(VOTE_WOLF);
        let input = PhaseInput {
            turn: 5,
            phase: &phase,
            state,
            actors: &actors,
            decisions: &decisions,
            directive: None,
            ability: None,
        };
        vote()
            .followed_by(&settle_day())
            .run(&input, &mut StdRng::seed_from_u64(4))
    }

    fn brief(spec: &GameSpec, state: &GameState, name: &str, capability: CapabilityRole) -> String {
        WordWolfRuleset.briefing(&BriefingContext {
            spec,
            name,
            capability,
            assignment: state.private.assignment(name),
            private: &state.private,
            language: "en",
        })
    }

    #[test]
    fn bundled_spec_validates_against_the_registry() {
        let spec = bundled_spec("word_wolf").unwrap().unwrap();
        WordWolfRuleset.registry().unwrap().validate(&spec).unwrap();
    }

    #[test]
    fn executing_a_wolf_wins_for_the_citizens() {
        let out = day_vote(&state(), [("P1", "P2"), ("P2", "P1"), ("P3", "P2")]);
        assert_eq!(out.delta.eliminate, vec!["P2".to_owned()]);
        assert_eq!(out.winner.as_deref(), Some(CITIZENS_TEAM));
    }

    #[test]
    fn executing_a_citizen_hands_the_wolves_the_game() {
        let out = day_vote(&state(), [("P1", "P3"), ("P2", "P3"), ("P3", "P1")]);
        assert_eq!(out.winner.as_deref(), Some(WOLVES_TEAM));
        assert!(out.message.unwrap().text.contains("The Wolves win."));
    }

    #[test]
    fn large_tables_get_a_second_wolf() {
        let spec = bundled_spec("word_wolf").unwrap().unwrap();
        let wolves = |n: u32| {
            WordWolfRuleset
                .assign_roles(&spec, Some(n), &mut StdRng::seed_from_u64(1))
                .unwrap()
                .iter()
                .filter(|a| a.team == WOLVES_TEAM)
                .count()
        };
        assert_eq!(wolves(5), 1);
        assert_eq!(wolves(8), 2);
    }

    #[test]
    fn each_side_learns_only_its_own_word() {
        let spec = bundled_spec("word_wolf").unwrap().unwrap();
        let state = state();
        let citizen = brief(&spec, &state, "P1", CapabilityRole::Player);
        let wolf = brief(&spec, &state, "P2", CapabilityRole::Player);
        let gm = brief(&spec, &state, "GM", CapabilityRole::AuthorityGm);

        assert!(citizen.contains("keyword: coffee") && !citizen.contains("cocoa"));
        assert!(wolf.contains("keyword: cocoa") && !wolf.contains("coffee"));
        assert!(gm.contains("coffee") && gm.contains("cocoa"));
    }
}
