//! Turn scheduler.
//!
//! [`Scheduler::run_round`] plays one round of one phase:
//!
//! 1. Bump the turn and snapshot the state.
//! 2. Ask every member of the phase's audience concurrently, each call
//!    bounded by the decision timeout; failures become safe defaults.
//! 3. Run the phase pipeline over the collected decisions.
//! 4. Route the round's single message, if it has text.
//! 5. Consult the System authority exactly once.
//! 6. Commit the combined delta and engine commands in one pass.
//! 7. Check victory, then the turn cap.
//!
//! Shared state is only touched in steps 1, 4 and 6, all after the fan-out
//! for the round has finished.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use parley_types::{
    ActionDecision, CapabilityRole, Directive, EngineCommand, EventRecord, GM_NAME, GameEvent, GameOutcome,
    GameSpec, GameState, MetaMap, OracleRequest, PhaseSpec, RequestKind, RoleAssignment,
    SYSTEM_NAME, StateDelta,
};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rust_decimal::Decimal;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::commands::{self, RejectedCommand};
use crate::config::EngineConfig;
use crate::contract::{Oracle, OracleError, parse_action, parse_directive};
use crate::error::GameError;
use crate::expr::{check_victory, counters_for};
use crate::mailbox::{Delivery, Mailbox};
use crate::registry::{Ask, Audience, PhaseInput, Registry, ResolvedPhase};

/// The outcome of a bidding contest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Who gets the floor.
    pub speaker: String,
    /// The winning bid.
    pub max_bid: Decimal,
    /// Everyone on the winning bid, in name order.
    pub tied: Vec<String>,
}

/// Pick the speaker among `bids`.
///
/// The highest bid wins. The GM wins any tie it is part of; other ties are
/// broken uniformly at random by `rng`. A round where everyone bids zero
/// still selects a speaker.
pub fn select_speaker(
    bids: &BTreeMap<String, ActionDecision>,
    rng: &mut StdRng,
) -> Option<Selection> {
    let max_bid = bids.values().map(|d| d.bid).max()?;
    let tied: Vec<String> = bids
        .iter()
        .filter(|(_, d)| d.bid == max_bid)
        .map(|(name, _)| name.clone())
        .collect();

    let speaker = if tied.iter().any(|n| n == GM_NAME) {
        GM_NAME.to_owned()
    } else {
        tied.choose(rng)?.clone()
    };
    Some(Selection {
        speaker,
        max_bid,
        tied,
    })
}

/// Someone seated at the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Unique name (`P1`.., `GM`, `SYSTEM`).
    pub name: String,
    /// What the participant may do.
    pub capability: CapabilityRole,
    /// Dealt role, for players.
    pub assignment: Option<RoleAssignment>,
    /// Static context sent with every request.
    pub briefing: String,
}

/// Everything a round mutates: state and memories.
#[derive(Debug, Clone)]
pub struct Table {
    /// Public and private state.
    pub state: GameState,
    /// Seated participants in seating order.
    pub participants: Vec<Participant>,
    /// Per-participant memories.
    pub mailbox: Mailbox,
}

impl Table {
    /// An empty table with memories of `memory_capacity` entries.
    pub fn new(state: GameState, memory_capacity: usize) -> Self {
        Self {
            state,
            participants: Vec::new(),
            mailbox: Mailbox::new(memory_capacity),
        }
    }

    /// Seat a participant and give them a memory.
    pub fn seat(&mut self, participant: Participant) {
        self.mailbox
            .register(&participant.name, participant.capability);
        self.participants.push(participant);
    }

    /// Look a participant up by name.
    pub fn participant(&self, name: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.name == name)
    }

    /// Whether an authority with `capability` is seated.
    pub fn has_authority(&self, capability: CapabilityRole) -> bool {
        self.participants.iter().any(|p| p.capability == capability)
    }

    /// Living players who hold `ability`, in name order.
    pub fn holders(&self, ability: &str) -> Vec<String> {
        let mut holders: Vec<String> = self
            .state
            .public
            .alive
            .iter()
            .filter(|name| {
                self.state
                    .private
                    .assignment(name)
                    .is_some_and(|a| a.grants(ability))
            })
            .cloned()
            .collect();
        holders.sort();
        holders
    }
}

/// What one round did.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    /// The turn that was played.
    pub turn: u64,
    /// Tag of the phase that ran.
    pub phase: String,
    /// Speaker selection, for bidding phases.
    pub selection: Option<Selection>,
    /// The delivered message, if any.
    pub delivered: Option<Delivery>,
    /// Players eliminated by the commit.
    pub eliminated: Vec<String>,
    /// Phase override requested for the next round.
    pub next_phase: Option<String>,
    /// Set when the game is over.
    pub outcome: Option<GameOutcome>,
    /// Events produced, in order.
    pub events: Vec<EventRecord>,
}

/// Drives rounds against one oracle and one registry.
pub struct Scheduler<'a, O> {
    oracle: &'a O,
    registry: &'a Registry,
    spec: &'a GameSpec,
    config: &'a EngineConfig,
    turn_cap: u64,
    rng: StdRng,
}

impl<'a, O: Oracle> Scheduler<'a, O> {
    /// Build a scheduler. `rng` must be seeded for reproducible games.
    pub const fn new(
        oracle: &'a O,
        registry: &'a Registry,
        spec: &'a GameSpec,
        config: &'a EngineConfig,
        turn_cap: u64,
        rng: StdRng,
    ) -> Self {
        Self {
            oracle,
            registry,
            spec,
            config,
            turn_cap,
            rng,
        }
    }

    /// The stalemate cap in force.
    pub const fn turn_cap(&self) -> u64 {
        self.turn_cap
    }

    /// Play one round of `phase`.
    ///
    /// Only a missing handler is an error; everything the oracle does wrong
    /// is recovered inside the round.
    pub async fn run_round(
        &mut self,
        table: &mut Table,
        phase: &PhaseSpec,
        overridden: bool,
    ) -> Result<RoundResult, GameError> {
        let resolved = self.registry.resolve(phase)?;
        let turn = table.state.public.turn.saturating_add(1);
        table.state.public.turn = turn;
        table.state.public.phase.clone_from(&resolved.tag);

        let mut events = Vec::new();
        info!(turn, phase = %resolved.tag, overridden, "round started");
        events.push(EventRecord::now(
            turn,
            GameEvent::PhaseStarted {
                phase: resolved.tag.clone(),
                overridden,
            },
        ));

        // Fan-out over an immutable snapshot.
        let snapshot = table.state.clone();
        let actors = audience(table, &resolved);
        let requests = actors
            .iter()
            .filter_map(|name| {
                let kind = request_kind(table, &resolved, name)?;
                Some(build_request(table, &snapshot, name, kind))
            })
            .collect();
        let answers = self.fan_out(requests).await;

        let mut decisions = BTreeMap::new();
        let mut directive = None;
        for (request, answer) in answers {
            if request.kind.expects_directive() {
                directive = Some(interpret_directive(turn, &request, answer, &mut events));
            } else {
                let decision = interpret_action(turn, &request, answer, &mut events);
                decisions.insert(request.participant, decision);
            }
        }

        let input = PhaseInput {
            turn,
            phase,
            state: &snapshot,
            actors: &actors,
            decisions: &decisions,
            directive: directive.as_ref(),
            ability: resolved.ability.as_deref(),
        };
        let mut outcome = resolved.pipeline.run(&input, &mut self.rng);

        if let Some(selection) = &outcome.selection {
            info!(
                turn,
                speaker = %selection.speaker,
                max_bid = %selection.max_bid,
                tied = selection.tied.len(),
                "speaker selected"
            );
            events.push(EventRecord::now(
                turn,
                GameEvent::SpeakerSelected {
                    speaker: selection.speaker.clone(),
                    max_bid: selection.max_bid,
                    tied: selection.tied.clone(),
                },
            ));
        }

        let delivered = outcome
            .message
            .take()
            .filter(|m| !m.text.trim().is_empty())
            .map(|message| {
                let delivery = table.mailbox.post(&message, &table.state.public.alive);
                info!(
                    turn,
                    sender = %delivery.message.sender,
                    to = %delivery.message.recipients.label(),
                    "message delivered"
                );
                events.push(EventRecord::now(
                    turn,
                    GameEvent::MessageDelivered {
                        speaker: delivery.message.sender.clone(),
                        to: delivery.message.recipients.label(),
                        is_dm: delivery.is_direct(),
                        text: delivery.message.text.clone(),
                    },
                ));
                delivery
            });

        let authority = self.consult_system(turn, table, &outcome.delta, &mut events).await;

        // Commit: the only mutation pass of the round.
        let mut delta = std::mem::take(&mut outcome.delta);
        let mut commands = std::mem::take(&mut outcome.commands);
        let mut reason = std::mem::take(&mut outcome.reason);
        let mut winner = outcome.winner.take();
        let mut next_phase = outcome.next_phase.take();
        if let Some(update) = authority {
            delta.merge(update.delta);
            commands.extend(update.commands);
            // The System never speaks; its text is kept as the commit reason.
            if !update.message.trim().is_empty() {
                if !reason.is_empty() {
                    reason.push('\n');
                }
                reason.push_str(update.message.trim());
            }
            winner = winner.or(update.winner);
            next_phase = next_phase.or(update.next_phase);
        }
        let eliminated = self.commit(turn, table, &delta, &commands, reason, &mut events);
        let verdict = self.judge(turn, table, winner, &mut events);

        Ok(RoundResult {
            turn,
            phase: resolved.tag,
            selection: outcome.selection,
            delivered,
            eliminated,
            next_phase,
            outcome: verdict,
            events,
        })
    }

    async fn fan_out(
        &self,
        requests: Vec<OracleRequest>,
    ) -> Vec<(OracleRequest, Result<String, OracleError>)> {
        let deadline = self.config.decision_timeout();
        let after_ms = self.config.decision_timeout_ms;
        let oracle = self.oracle;

        let mut answers: Vec<(OracleRequest, Result<String, OracleError>)> = stream::iter(requests)
            .map(|request| async move {
                let answer = match timeout(deadline, oracle.complete(&request)).await {
                    Ok(answer) => answer,
                    Err(_elapsed) => Err(OracleError::Timeout { after_ms }),
                };
                (request, answer)
            })
            .buffer_unordered(self.config.max_concurrent_calls.max(1))
            .collect()
            .await;
        answers.sort_by(|a, b| a.0.participant.cmp(&b.0.participant));
        answers
    }

    /// Ask the System authority for this round's bookkeeping, once.
    async fn consult_system(
        &self,
        turn: u64,
        table: &Table,
        pending: &StateDelta,
        events: &mut Vec<EventRecord>,
    ) -> Option<Directive> {
        if !self.config.system_authority || !table.has_authority(CapabilityRole::AuthoritySystem) {
            return None;
        }
        let mut projected = table.state.clone();
        projected.apply(pending, self.registry.schema());

        let request = build_request(table, &projected, SYSTEM_NAME, RequestKind::StateUpdate);
        let (request, answer) = self.fan_out(vec![request]).await.into_iter().next()?;
        Some(interpret_directive(turn, &request, answer, events))
    }

    fn commit(
        &mut self,
        turn: u64,
        table: &mut Table,
        delta: &StateDelta,
        queued: &[EngineCommand],
        reason: String,
        events: &mut Vec<EventRecord>,
    ) -> Vec<String> {
        if delta.is_empty() && queued.is_empty() {
            return Vec::new();
        }
        let schema = self.registry.schema();
        let before = table.state.clone();

        let applied = table.state.apply(delta, schema);
        for violation in &applied.rejected {
            warn!(turn, error = %violation, "delta entry rejected");
            events.push(EventRecord::now(
                turn,
                GameEvent::DeltaRejected {
                    error: violation.to_string(),
                },
            ));
        }
        for command in queued {
            match commands::execute(command, &mut table.state.public.meta, schema, &mut self.rng) {
                Ok(effect) => debug!(turn, ?command, ?effect, "engine command executed"),
                Err(e) => {
                    warn!(turn, ?command, error = %e, "engine command rejected");
                    events.push(EventRecord::now(
                        turn,
                        GameEvent::CommandRejected {
                            command: command_json(command),
                            error: e.to_string(),
                        },
                    ));
                }
            }
        }
        for name in &applied.eliminated {
            info!(turn, player = %name, "player eliminated");
        }

        events.push(EventRecord::now(
            turn,
            GameEvent::DeltaApplied {
                delta: delta.clone(),
                reason,
                before,
                after: table.state.clone(),
            },
        ));
        applied.eliminated
    }

    /// Declared winner first, then the victory expressions, then the cap.
    fn judge(
        &self,
        turn: u64,
        table: &Table,
        declared: Option<String>,
        events: &mut Vec<EventRecord>,
    ) -> Option<GameOutcome> {
        if let Some(team) = declared {
            if self.spec.teams().contains(&team) {
                info!(turn, team = %team, "winner declared by authority");
                return Some(GameOutcome::Winner {
                    team,
                    decided_by: "declared".to_owned(),
                });
            }
            warn!(turn, team = %team, "authority declared an unknown team, ignoring");
            events.push(EventRecord::now(
                turn,
                GameEvent::DeltaRejected {
                    error: format!("unknown winning team `{team}`"),
                },
            ));
        }

        let check = check_victory(&self.spec.victory, &counters_for(&table.state));
        for (team, error) in check.skipped {
            debug!(turn, team = %team, error = %error, "victory expression skipped");
            events.push(EventRecord::now(
                turn,
                GameEvent::ExpressionSkipped {
                    team,
                    error: error.to_string(),
                },
            ));
        }
        if let Some(team) = check.winner {
            info!(turn, team = %team, "victory condition met");
            return Some(GameOutcome::Winner {
                team,
                decided_by: "expression".to_owned(),
            });
        }

        if turn >= self.turn_cap {
            info!(turn, turn_cap = self.turn_cap, "turn cap reached, stalemate");
            return Some(GameOutcome::Stalemate {
                turn_limit: self.turn_cap,
            });
        }
        None
    }
}

/// Who the resolved phase asks, in name order.
fn audience(table: &Table, resolved: &ResolvedPhase<'_>) -> Vec<String> {
    let living = &table.state.public.alive;
    let mut actors: Vec<String> = match resolved.audience {
        Audience::Floor => living
            .iter()
            .cloned()
            .chain(
                table
                    .has_authority(CapabilityRole::AuthorityGm)
                    .then(|| GM_NAME.to_owned()),
            )
            .collect(),
        Audience::LivingPlayers => living.clone(),
        Audience::Gm => table
            .has_authority(CapabilityRole::AuthorityGm)
            .then(|| vec![GM_NAME.to_owned()])
            .unwrap_or_default(),
        Audience::Holders => resolved
            .ability
            .as_deref()
            .map(|ability| table.holders(ability))
            .unwrap_or_default(),
        Audience::Nobody => Vec::new(),
    };
    actors.sort();
    actors.dedup();
    actors
}

fn request_kind(table: &Table, resolved: &ResolvedPhase<'_>, actor: &str) -> Option<RequestKind> {
    match resolved.ask.as_ref()? {
        Ask::Bid => Some(RequestKind::Bid),
        Ask::Directive => Some(RequestKind::Directive),
        Ask::Target {
            prompt,
            allow_self,
            allow_holders,
        } => {
            let holders = resolved
                .ability
                .as_deref()
                .map(|a| table.holders(a))
                .unwrap_or_default();
            let candidates = table
                .state
                .public
                .alive
                .iter()
                .filter(|n| *allow_self || n.as_str() != actor)
                .filter(|n| *allow_holders || !holders.contains(n))
                .cloned()
                .collect();
            Some(RequestKind::Target {
                prompt: prompt.clone(),
                candidates,
            })
        }
    }
}

fn build_request(table: &Table, view: &GameState, name: &str, kind: RequestKind) -> OracleRequest {
    let participant = table.participant(name);
    let capability = participant.map_or(CapabilityRole::Player, |p| p.capability);
    let secrets = if capability.is_authority() {
        MetaMap::new()
    } else {
        view.private
            .records
            .get(name)
            .map(|r| r.secrets.clone())
            .unwrap_or_default()
    };
    OracleRequest {
        turn: view.public.turn,
        phase: view.public.phase.clone(),
        participant: name.to_owned(),
        capability,
        role: participant.and_then(|p| p.assignment.clone()),
        secrets,
        kind,
        briefing: participant.map(|p| p.briefing.clone()).unwrap_or_default(),
        memory: table.mailbox.memory(name),
        public: view.public.clone(),
        private: capability.is_authority().then(|| view.private.clone()),
    }
}

fn interpret_action(
    turn: u64,
    request: &OracleRequest,
    answer: Result<String, OracleError>,
    events: &mut Vec<EventRecord>,
) -> ActionDecision {
    let decision = match answer.and_then(|raw| parse_action(&raw, &request.kind)) {
        Ok(decision) => decision,
        Err(e) => {
            warn!(
                turn,
                participant = %request.participant,
                error = %e,
                "decision failure, substituting safe default"
            );
            events.push(EventRecord::now(
                turn,
                GameEvent::DecisionFailure {
                    participant: request.participant.clone(),
                    error: e.to_string(),
                },
            ));
            ActionDecision::safe_default()
        }
    };
    debug!(turn, participant = %request.participant, bid = %decision.bid, "decision collected");
    events.push(EventRecord::now(
        turn,
        GameEvent::Bid {
            participant: request.participant.clone(),
            bid: decision.bid,
            message: decision.message.clone(),
            to: decision.recipients.label(),
            target: decision.target.clone(),
            rationale: decision.rationale.clone(),
        },
    ));
    decision
}

fn interpret_directive(
    turn: u64,
    request: &OracleRequest,
    answer: Result<String, OracleError>,
    events: &mut Vec<EventRecord>,
) -> Directive {
    match answer.and_then(|raw| parse_directive(&raw)) {
        Ok(parsed) => {
            for RejectedCommand { command, error } in parsed.rejected {
                warn!(turn, participant = %request.participant, error = %error, "unreadable engine command");
                events.push(EventRecord::now(
                    turn,
                    GameEvent::CommandRejected { command, error },
                ));
            }
            parsed.directive
        }
        Err(e) => {
            warn!(
                turn,
                participant = %request.participant,
                error = %e,
                "directive failure, substituting empty directive"
            );
            events.push(EventRecord::now(
                turn,
                GameEvent::DecisionFailure {
                    participant: request.participant.clone(),
                    error: e.to_string(),
                },
            ));
            Directive::safe_default()
        }
    }
}

/// A command as JSON for the event log, falling back to its debug text.
fn command_json(command: &EngineCommand) -> serde_json::Value {
    serde_json::to_value(command).unwrap_or_else(|e| {
        warn!(?command, error = %e, "failed to serialize engine command");
        serde_json::Value::String(format!("{command:?}"))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn bids(entries: &[(&str, i64)]) -> BTreeMap<String, ActionDecision> {
        entries
            .iter()
            .map(|(name, tenths)| {
                let mut d = ActionDecision::safe_default();
                d.bid = Decimal::new(*tenths, 1);
                ((*name).to_owned(), d)
            })
            .collect()
    }

    #[test]
    fn highest_bid_wins() {
        let mut rng = StdRng::seed_from_u64(3);
        let sel = select_speaker(&bids(&[("P1", 2), ("P2", 9), ("P3", 5)]), &mut rng).unwrap();
        assert_eq!(sel.speaker, "P2");
        assert_eq!(sel.tied, vec!["P2".to_owned()]);
        assert_eq!(sel.max_bid, Decimal::new(9, 1));
    }

    #[test]
    fn gm_wins_ties() {
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sel = select_speaker(&bids(&[("P1", 7), ("GM", 7), ("P2", 7)]), &mut rng).unwrap();
            assert_eq!(sel.speaker, GM_NAME);
        }
    }

    #[test]
    fn player_ties_break_within_the_tied_set() {
        let table = bids(&[("P1", 5), ("P2", 5), ("P3", 1)]);
        let mut first = StdRng::seed_from_u64(11);
        let mut second = StdRng::seed_from_u64(11);
        let a = select_speaker(&table, &mut first).unwrap();
        let b = select_speaker(&table, &mut second).unwrap();
        assert_eq!(a, b);
        assert!(a.speaker == "P1" || a.speaker == "P2");
    }

    #[test]
    fn all_zero_still_selects() {
        let mut rng = StdRng::seed_from_u64(1);
        let sel = select_speaker(&bids(&[("P1", 0), ("P2", 0)]), &mut rng).unwrap();
        assert_eq!(sel.max_bid, Decimal::ZERO);
        assert_eq!(sel.tied.len(), 2);
        assert!(select_speaker(&BTreeMap::new(), &mut rng).is_none());
    }

    #[test]
    fn rejected_commands_are_logged_in_full() {
        let command = EngineCommand::Draw {
            deck: "roles".into(),
            count: 0,
            into: "hand".into(),
        };
        let json = command_json(&command);
        let field = |key: &str| json.get(key).and_then(serde_json::Value::as_str);
        assert_eq!(field("op"), Some("draw"));
        assert_eq!(field("deck"), Some("roles"));
    }
}
