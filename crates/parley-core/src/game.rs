//! Game session: setup, the round loop, and the end of the game.

use std::collections::BTreeMap;

use parley_types::{
    CapabilityRole, EventRecord, GM_NAME, GameEvent, GameOutcome, GameSpec, GameState,
    PrivateRecord, PrivateState, PublicState, SYSTEM_NAME,
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::contract::Oracle;
use crate::error::{GameError, RegistryError};
use crate::events::EventSink;
use crate::phase::PhaseMachine;
use crate::registry::Registry;
use crate::ruleset::{BriefingContext, Ruleset};
use crate::scheduler::{Participant, Scheduler, Table};

/// How a finished game looks.
#[derive(Debug, Clone, PartialEq)]
pub struct GameReport {
    /// Winner or stalemate.
    pub outcome: GameOutcome,
    /// Rounds played.
    pub turns: u64,
    /// Final state.
    pub state: GameState,
}

/// A dealt table, ready for its first round.
#[derive(Debug)]
pub struct Setup {
    /// Seated participants and initial state.
    pub table: Table,
    /// The setup events (turn 0).
    pub events: Vec<EventRecord>,
    /// The engine RNG after dealing.
    pub rng: StdRng,
}

/// Player seat names `P1..Pn`.
pub fn player_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("P{i}")).collect()
}

/// Deal roles, build the initial state, and seat everyone.
pub fn setup(
    spec: &GameSpec,
    ruleset: &dyn Ruleset,
    registry: &Registry,
    config: &EngineConfig,
) -> Result<Setup, GameError> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let assignments = ruleset.assign_roles(spec, config.game.player_count, &mut rng)?;
    let names = player_names(assignments.len());

    let public_meta = ruleset.initial_public_meta(spec, &mut rng);
    if let Some(violation) = registry.schema().validate(&public_meta).into_iter().next() {
        return Err(RegistryError::from(violation).into());
    }
    let records: BTreeMap<String, PrivateRecord> = names
        .iter()
        .cloned()
        .zip(assignments)
        .map(|(name, assignment)| {
            let record = PrivateRecord {
                assignment,
                secrets: parley_types::MetaMap::new(),
            };
            (name, record)
        })
        .collect();
    let state = GameState {
        public: PublicState {
            phase: String::new(),
            turn: 0,
            alive: names.clone(),
            meta: public_meta,
        },
        private: PrivateState {
            records,
            meta: ruleset.initial_private_meta(spec, &mut rng),
        },
    };

    let mut table = Table::new(state.clone(), config.memory_capacity);
    let mut seats: Vec<(String, CapabilityRole)> = names
        .iter()
        .map(|n| (n.clone(), CapabilityRole::Player))
        .collect();
    seats.push((GM_NAME.to_owned(), CapabilityRole::AuthorityGm));
    if config.system_authority {
        seats.push((SYSTEM_NAME.to_owned(), CapabilityRole::AuthoritySystem));
    }
    for (name, capability) in seats {
        let assignment = state.private.assignment(&name).cloned();
        let briefing = ruleset.briefing(&BriefingContext {
            spec,
            name: &name,
            capability,
            assignment: assignment.as_ref(),
            private: &state.private,
            language: &config.game.language,
        });
        table.seat(Participant {
            name,
            capability,
            assignment,
            briefing,
        });
    }

    let roles = state
        .private
        .records
        .iter()
        .map(|(name, record)| (name.clone(), record.assignment.clone()))
        .collect();
    info!(
        ruleset = ruleset.name(),
        players = names.len(),
        seed = config.seed,
        "roles dealt"
    );
    let events = vec![
        EventRecord::now(0, GameEvent::RoleAssignment { roles }),
        EventRecord::now(0, GameEvent::InitialState { state }),
    ];
    Ok(Setup { table, events, rng })
}

/// Play one game to the end, writing every event to `sink`.
///
/// Only configuration problems and sink failures return an error.
pub async fn run_game<O: Oracle>(
    oracle: &O,
    ruleset: &dyn Ruleset,
    spec: &GameSpec,
    config: &EngineConfig,
    sink: &mut dyn EventSink,
) -> Result<GameReport, GameError> {
    config.validate()?;
    let registry = ruleset.registry()?;
    registry.validate(spec)?;
    let turn_cap = config.turn_cap(spec.turn_limit)?;

    let Setup {
        mut table,
        events,
        rng,
    } = setup(spec, ruleset, &registry, config)?;
    for record in &events {
        sink.record(record)?;
    }

    let mut machine = PhaseMachine::new(spec.phases.clone());
    let mut scheduler = Scheduler::new(oracle, &registry, spec, config, turn_cap, rng);
    info!(game = %spec.name, turn_cap, "game started");

    let outcome = loop {
        let Some((phase, overridden)) = machine.next_phase() else {
            warn!("phase cycle is empty, ending in stalemate");
            break GameOutcome::Stalemate {
                turn_limit: turn_cap,
            };
        };
        let round = scheduler.run_round(&mut table, &phase, overridden).await?;
        for record in &round.events {
            sink.record(record)?;
        }
        if let Some(outcome) = round.outcome {
            break outcome;
        }
        if let Some(target) = round.next_phase.as_deref() {
            machine.request(target, &registry);
        }
    };

    let turns = table.state.public.turn;
    match outcome.winner() {
        Some(team) => info!(turns, team, "game over"),
        None => info!(turns, "game over without a winner"),
    }
    sink.record(&EventRecord::now(
        turns,
        GameEvent::GameEnd {
            outcome: outcome.clone(),
        },
    ))?;
    sink.flush()?;

    Ok(GameReport {
        outcome,
        turns,
        state: table.state,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::GameConfig;
    use crate::ruleset::StandardRuleset;

    fn seats(players: u32, system_authority: bool) -> EngineConfig {
        EngineConfig {
            system_authority,
            game: GameConfig {
                player_count: Some(players),
                ..GameConfig::default()
            },
            ..EngineConfig::default()
        }
    }

    fn spec() -> GameSpec {
        GameSpec::from_json(
            r#"{"roles": [{"name": "Wolf", "team": "Wolves", "abilities": ["kill"], "count": 1},
                          {"name": "Villager", "team": "Village", "count": "fill"}],
                "phases": [{"type": "discussion"}],
                "victory": {"Village": "Wolves == 0"}}"#,
        )
        .unwrap()
    }

    #[test]
    fn seats_players_and_authorities() {
        let config = seats(4, true);
        let registry = StandardRuleset.registry().unwrap();
        let setup = setup(&spec(), &StandardRuleset, &registry, &config).unwrap();

        let names: Vec<&str> = setup
            .table
            .participants
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["P1", "P2", "P3", "P4", GM_NAME, SYSTEM_NAME]);
        assert_eq!(setup.table.state.public.alive.len(), 4);
        assert_eq!(setup.events.len(), 2);
        assert!(matches!(
            setup.events.first().map(|r| &r.event),
            Some(GameEvent::RoleAssignment { .. })
        ));
    }

    #[test]
    fn system_seat_is_optional() {
        let config = seats(3, false);
        let registry = StandardRuleset.registry().unwrap();
        let setup = setup(&spec(), &StandardRuleset, &registry, &config).unwrap();
        assert!(setup.table.participant(SYSTEM_NAME).is_none());
        assert!(setup.table.participant(GM_NAME).is_some());
    }
}
