//! Game runner for Parley.
//!
//! Plays one social deduction game with LLM-backed participants and writes
//! every event to a JSON-lines log.
//!
//! # Flow
//!
//! ```text
//! PARLEY_CONFIG --> ruleset + spec --> LlmOracle --> run_game --> game_log.jsonl
//! ```
//!
//! With `LLM_BACKEND` unset or `stub`, every participant passes; useful for
//! checking a spec end to end without spending tokens.

mod config;
mod error;
mod llm;
mod oracle;
mod prompt;
mod session;

use anyhow::Context;
use parley_core::{EngineConfig, JsonlSink, Oracle, StubOracle, run_game};
use parley_rules::RulesetCatalog;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::RunnerConfig;
use crate::llm::LlmBackend;
use crate::oracle::LlmOracle;
use crate::prompt::PromptEngine;
use crate::session::select_game;

/// Application entry point.
///
/// # Errors
///
/// Returns an error on any fatal configuration, spec or event log problem;
/// the process then exits non-zero.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    info!("parley-runner starting");

    let runner = RunnerConfig::from_env()?;
    let engine = if runner.config_path.exists() {
        EngineConfig::from_file(&runner.config_path)
            .with_context(|| format!("loading {}", runner.config_path.display()))?
    } else {
        warn!(path = %runner.config_path.display(), "config file not found, using defaults");
        EngineConfig::default()
    };
    info!(
        seed = engine.seed,
        decision_timeout_ms = engine.decision_timeout_ms,
        max_concurrent_calls = engine.max_concurrent_calls,
        max_turns = engine.max_turns,
        system_authority = engine.system_authority,
        "configuration loaded"
    );

    let catalog = RulesetCatalog::builtin();
    let (spec, ruleset) = select_game(&engine.game, &catalog)?;
    info!(game = %spec.name, ruleset = ruleset.name(), "game selected");

    let Some(backends) = runner.backends else {
        info!("no LLM backend configured, playing with the stub oracle");
        return play(&StubOracle, ruleset, &spec, &engine).await;
    };

    let prompts = PromptEngine::new(&runner.templates_dir)?;
    info!(templates_dir = runner.templates_dir, "prompt templates loaded");

    let players = LlmBackend::new(backends.players);
    let authorities = LlmBackend::new(backends.authorities);
    for (seat, backend) in [("players", &players), ("authorities", &authorities)] {
        info!(
            seat,
            backend = backend.name(),
            model = backend.model(),
            temperature = backend.temperature(),
            "LLM backend configured"
        );
    }

    let oracle = LlmOracle::new(prompts, players, authorities);
    play(&oracle, ruleset, &spec, &engine).await
}

/// Run the game and log the result.
async fn play<O: Oracle>(
    oracle: &O,
    ruleset: &dyn parley_core::Ruleset,
    spec: &parley_types::GameSpec,
    engine: &EngineConfig,
) -> anyhow::Result<()> {
    let log_path = &engine.game.log_path;
    let mut sink = JsonlSink::open(log_path)
        .with_context(|| format!("opening event log {}", log_path.display()))?;
    let report = run_game(oracle, ruleset, spec, engine, &mut sink).await?;
    info!(
        turns = report.turns,
        outcome = ?report.outcome,
        log = %log_path.display(),
        "game finished"
    );
    Ok(())
}
