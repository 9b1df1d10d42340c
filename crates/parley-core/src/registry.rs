//! Capability registry.
//!
//! Maps symbolic phase tags and ability names to handlers. A [`Registry`]
//! is built once at startup by the selected ruleset and passed by reference
//! into the scheduler; nothing is registered globally.
//!
//! A handler is a [`PhasePipeline`]: an ordered list of named steps fixed at
//! registration time. Rulesets compose behavior by building a new pipeline
//! from existing steps plus their own, e.g. `vote` followed by
//! `record_last_executed`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parley_types::{
    ABILITY_PHASE, ActionDecision, Directive, EngineCommand, GM_NAME, GameSpec, GameState,
    Message, MetaKind, MetaSchema, MetaValue, PhaseSpec, Recipients, StateDelta,
};
use rand::rngs::StdRng;
use tracing::debug;

use crate::error::RegistryError;
use crate::scheduler::Selection;

/// Who is asked for a decision when a phase runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    /// Living players plus the GM.
    Floor,
    /// Living players only.
    LivingPlayers,
    /// The GM only.
    Gm,
    /// Living holders of the phase's ability.
    Holders,
    /// Nobody; the pipeline runs on state alone.
    Nobody,
}

/// What each member of the audience is asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ask {
    /// Bid for the floor.
    Bid,
    /// Name a living player.
    Target {
        /// What the target is for.
        prompt: String,
        /// Whether the asker may name themselves.
        allow_self: bool,
        /// Whether fellow ability holders may be named.
        allow_holders: bool,
    },
    /// Produce a directive.
    Directive,
}

impl Ask {
    /// A target request.
    pub fn target(prompt: &str, allow_self: bool, allow_holders: bool) -> Self {
        Self::Target {
            prompt: prompt.to_owned(),
            allow_self,
            allow_holders,
        }
    }
}

/// Read-only view handed to every pipeline step.
#[derive(Debug, Clone, Copy)]
pub struct PhaseInput<'a> {
    /// Turn being played.
    pub turn: u64,
    /// The phase entry being executed.
    pub phase: &'a PhaseSpec,
    /// State snapshot taken at the start of the round.
    pub state: &'a GameState,
    /// Participants who were asked, in name order.
    pub actors: &'a [String],
    /// Their decisions (safe defaults for failures).
    pub decisions: &'a BTreeMap<String, ActionDecision>,
    /// The GM's directive, for directive phases.
    pub directive: Option<&'a Directive>,
    /// The ability being resolved, for ability phases.
    pub ability: Option<&'a str>,
}

impl PhaseInput<'_> {
    /// `(actor, target)` pairs naming a living player, in actor order.
    pub fn targets(&self) -> Vec<(&str, &str)> {
        self.actors
            .iter()
            .filter_map(|actor| {
                let target = self.decisions.get(actor)?.target.as_deref()?;
                self.state
                    .public
                    .is_alive(target)
                    .then_some((actor.as_str(), target))
            })
            .collect()
    }

    /// A string parameter of the phase entry.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.phase.params.get(key).and_then(serde_json::Value::as_str)
    }

    /// An integer parameter of the phase entry.
    pub fn param_i64(&self, key: &str) -> Option<i64> {
        self.phase.params.get(key).and_then(serde_json::Value::as_i64)
    }

    /// The current value of a public meta entry.
    pub fn meta(&self, key: &str) -> Option<&MetaValue> {
        self.state.public.meta.get(key)
    }
}

/// What a phase produced. Committed by the scheduler in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseOutcome {
    /// Speaker selection, for bidding phases.
    pub selection: Option<Selection>,
    /// The single message this round commits.
    pub message: Option<Message>,
    /// State changes.
    pub delta: StateDelta,
    /// Phase override requested by the handler.
    pub next_phase: Option<String>,
    /// Team declared the winner by the handler.
    pub winner: Option<String>,
    /// Engine commands to run at commit.
    pub commands: Vec<EngineCommand>,
    /// Reasoning recorded with the committed delta.
    pub reason: String,
}

impl PhaseOutcome {
    /// Add a GM broadcast. Several announcements join into one message.
    pub fn announce(&mut self, turn: u64, text: &str) {
        match &mut self.message {
            Some(msg) if msg.sender == GM_NAME && msg.recipients.is_broadcast() => {
                msg.text.push('\n');
                msg.text.push_str(text);
            }
            _ => {
                self.message = Some(Message {
                    turn,
                    sender: GM_NAME.to_owned(),
                    recipients: Recipients::All,
                    text: text.to_owned(),
                });
            }
        }
    }

    /// Queue the elimination of `name`.
    pub fn eliminate(&mut self, name: &str) {
        if !self.delta.eliminate.iter().any(|n| n == name) {
            self.delta.eliminate.push(name.to_owned());
        }
    }

    /// Queue a public meta write.
    pub fn set_public(&mut self, key: &str, value: impl Into<MetaValue>) {
        self.delta.public.insert(key.to_owned(), value.into());
    }

    /// Queue a secret for `player`.
    pub fn set_secret(&mut self, player: &str, key: &str, value: impl Into<MetaValue>) {
        self.delta
            .secrets
            .entry(player.to_owned())
            .or_default()
            .insert(key.to_owned(), value.into());
    }
}

/// Signature of a pipeline step.
pub type StepFn = dyn Fn(&PhaseInput<'_>, &mut PhaseOutcome, &mut StdRng) + Send + Sync;

/// One named step of a pipeline.
#[derive(Clone)]
pub struct PhaseStep {
    name: String,
    run: Arc<StepFn>,
}

impl PhaseStep {
    /// Wrap `run` under `name`.
    pub fn new(
        name: &str,
        run: impl Fn(&PhaseInput<'_>, &mut PhaseOutcome, &mut StdRng) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.to_owned(),
            run: Arc::new(run),
        }
    }

    /// The step's name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for PhaseStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PhaseStep").field(&self.name).finish()
    }
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default)]
pub struct PhasePipeline {
    steps: Vec<PhaseStep>,
}

impl PhasePipeline {
    /// An empty pipeline.
    pub const fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    #[must_use]
    pub fn then(
        mut self,
        name: &str,
        run: impl Fn(&PhaseInput<'_>, &mut PhaseOutcome, &mut StdRng) + Send + Sync + 'static,
    ) -> Self {
        self.steps.push(PhaseStep::new(name, run));
        self
    }

    /// Append every step of `other`, after this pipeline's own.
    #[must_use]
    pub fn followed_by(mut self, other: &Self) -> Self {
        self.steps.extend(other.steps.iter().cloned());
        self
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(PhaseStep::name).collect()
    }

    /// Run every step in order against one outcome.
    pub fn run(&self, input: &PhaseInput<'_>, rng: &mut StdRng) -> PhaseOutcome {
        let mut outcome = PhaseOutcome::default();
        for step in &self.steps {
            debug!(turn = input.turn, step = step.name(), "running phase step");
            (step.run)(input, &mut outcome, rng);
        }
        outcome
    }
}

/// A registered phase.
#[derive(Debug, Clone)]
pub struct PhaseHandler {
    /// Who is asked.
    pub audience: Audience,
    /// What they are asked.
    pub ask: Option<Ask>,
    /// What happens with the answers.
    pub pipeline: PhasePipeline,
}

/// A registered ability, run by `ability` phases with its living holders.
#[derive(Debug, Clone)]
pub struct CapabilityHandler {
    /// What holders are asked; `None` resolves on state alone.
    pub ask: Option<Ask>,
    /// Resolution steps.
    pub pipeline: PhasePipeline,
}

/// A phase entry bound to its handler.
#[derive(Debug, Clone)]
pub struct ResolvedPhase<'r> {
    /// The phase tag.
    pub tag: String,
    /// Who is asked.
    pub audience: Audience,
    /// What they are asked.
    pub ask: Option<Ask>,
    /// Steps to run.
    pub pipeline: &'r PhasePipeline,
    /// Ability being resolved, for ability phases.
    pub ability: Option<String>,
}

/// Handlers by name plus the ruleset's meta schema.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    phases: BTreeMap<String, PhaseHandler>,
    capabilities: BTreeMap<String, CapabilityHandler>,
    schema: MetaSchema,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry enforcing `schema` on public meta.
    pub fn with_schema(schema: MetaSchema) -> Self {
        Self {
            schema,
            ..Self::default()
        }
    }

    /// Register a phase handler under `name`.
    pub fn register_phase(&mut self, name: &str, handler: PhaseHandler) -> Result<(), RegistryError> {
        if name == ABILITY_PHASE || self.phases.contains_key(name) {
            return Err(RegistryError::Duplicate {
                kind: "phase",
                name: name.to_owned(),
            });
        }
        debug!(phase = name, steps = ?handler.pipeline.step_names(), "phase registered");
        self.phases.insert(name.to_owned(), handler);
        Ok(())
    }

    /// Register a capability handler for `ability`.
    pub fn register_capability(
        &mut self,
        ability: &str,
        handler: CapabilityHandler,
    ) -> Result<(), RegistryError> {
        if self.capabilities.contains_key(ability) {
            return Err(RegistryError::Duplicate {
                kind: "capability",
                name: ability.to_owned(),
            });
        }
        debug!(ability, steps = ?handler.pipeline.step_names(), "capability registered");
        self.capabilities.insert(ability.to_owned(), handler);
        Ok(())
    }

    /// Declare the shape of a public meta key.
    pub fn declare_meta(&mut self, key: &str, kind: MetaKind) {
        self.schema.declare(key, kind);
    }

    /// The declared meta schema.
    pub const fn schema(&self) -> &MetaSchema {
        &self.schema
    }

    /// Bind a phase entry to its handler. A missing handler is fatal.
    pub fn resolve<'r>(&'r self, phase: &PhaseSpec) -> Result<ResolvedPhase<'r>, RegistryError> {
        if phase.kind == ABILITY_PHASE {
            let ability = phase.ability.clone().unwrap_or_default();
            let handler =
                self.capabilities
                    .get(&ability)
                    .ok_or_else(|| RegistryError::MissingCapability {
                        ability: ability.clone(),
                    })?;
            return Ok(ResolvedPhase {
                tag: phase.tag(),
                audience: Audience::Holders,
                ask: handler.ask.clone(),
                pipeline: &handler.pipeline,
                ability: Some(ability),
            });
        }

        let handler = self
            .phases
            .get(&phase.kind)
            .ok_or_else(|| RegistryError::MissingPhase {
                tag: phase.kind.clone(),
            })?;
        Ok(ResolvedPhase {
            tag: phase.tag(),
            audience: handler.audience,
            ask: handler.ask.clone(),
            pipeline: &handler.pipeline,
            ability: None,
        })
    }

    /// Build a phase entry for an override target that is not in the
    /// static order, if some handler answers to it.
    pub fn detour(&self, target: &str) -> Option<PhaseSpec> {
        match target.split_once(':') {
            Some((ABILITY_PHASE, ability)) if self.capabilities.contains_key(ability) => {
                Some(PhaseSpec::ability(ability))
            }
            None if self.phases.contains_key(target) => Some(PhaseSpec::of_kind(target)),
            _ => None,
        }
    }

    /// Check that every phase of `spec` resolves and its initial meta fits
    /// the schema.
    pub fn validate(&self, spec: &GameSpec) -> Result<(), RegistryError> {
        for phase in &spec.phases {
            self.resolve(phase)?;
        }
        if let Some(violation) = self.schema.validate(&spec.meta).into_iter().next() {
            return Err(violation.into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn noop_handler() -> PhaseHandler {
        PhaseHandler {
            audience: Audience::Nobody,
            ask: None,
            pipeline: PhasePipeline::new(),
        }
    }

    fn noop_capability() -> CapabilityHandler {
        CapabilityHandler {
            ask: Some(Ask::target("pick", false, true)),
            pipeline: PhasePipeline::new(),
        }
    }

    #[test]
    fn missing_handlers_are_fatal() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve(&PhaseSpec::of_kind("vote")),
            Err(RegistryError::MissingPhase { .. })
        ));
        assert!(matches!(
            registry.resolve(&PhaseSpec::ability("kill")),
            Err(RegistryError::MissingCapability { .. })
        ));
    }

    #[test]
    fn duplicate_registration_is_refused() {
        let mut registry = Registry::new();
        registry.register_phase("vote", noop_handler()).unwrap();
        assert!(registry.register_phase("vote", noop_handler()).is_err());
        assert!(registry.register_phase(ABILITY_PHASE, noop_handler()).is_err());
        registry.register_capability("kill", noop_capability()).unwrap();
        assert!(registry.register_capability("kill", noop_capability()).is_err());
    }

    #[test]
    fn ability_phases_resolve_to_capabilities() {
        let mut registry = Registry::new();
        registry.register_capability("kill", noop_capability()).unwrap();
        let resolved = registry.resolve(&PhaseSpec::ability("kill")).unwrap();
        assert_eq!(resolved.tag, "ability:kill");
        assert_eq!(resolved.audience, Audience::Holders);
        assert_eq!(resolved.ability.as_deref(), Some("kill"));
    }

    #[test]
    fn detours_need_a_handler() {
        let mut registry = Registry::new();
        registry.register_phase("vote", noop_handler()).unwrap();
        registry.register_capability("kill", noop_capability()).unwrap();
        assert_eq!(registry.detour("vote"), Some(PhaseSpec::of_kind("vote")));
        assert_eq!(registry.detour("ability:kill"), Some(PhaseSpec::ability("kill")));
        assert_eq!(registry.detour("ability:heal"), None);
        assert_eq!(registry.detour("banquet"), None);
    }

    #[test]
    fn pipelines_run_in_declared_order() {
        let first = PhasePipeline::new().then("a", |input, out, _| out.announce(input.turn, "a"));
        let composed = first.followed_by(&PhasePipeline::new().then("b", |input, out, _| out.announce(input.turn, "b")));
        assert_eq!(composed.step_names(), vec!["a", "b"]);

        let phase = PhaseSpec::of_kind("x");
        let state = GameState::default();
        let decisions = BTreeMap::new();
        let input = PhaseInput {
            turn: 1,
            phase: &phase,
            state: &state,
            actors: &[],
            decisions: &decisions,
            directive: None,
            ability: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let outcome = composed.run(&input, &mut rng);
        assert_eq!(outcome.message.unwrap().text, "a\nb");
    }

    #[test]
    fn validate_checks_initial_meta() {
        let mut registry = Registry::new();
        registry.register_phase("discussion", noop_handler()).unwrap();
        registry.declare_meta("nights", MetaKind::Int);
        let spec = GameSpec::from_json(
            r#"{"roles": [{"name": "A", "team": "A", "count": 1}],
                "phases": [{"type": "discussion"}],
                "victory": {"A": "A == 0"},
                "meta": {"nights": "zero"}}"#,
        )
        .unwrap();
        assert!(matches!(registry.validate(&spec), Err(RegistryError::Schema { .. })));
    }
}
