//! Runner configuration.
//!
//! Engine settings live in the YAML file named by `PARLEY_CONFIG`; LLM
//! backend settings come from environment variables so keys never touch
//! the config file.

use std::path::PathBuf;

use crate::error::RunnerError;

/// Default engine config file, used when `PARLEY_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "parley-config.yaml";

/// Players improvise; a lively default keeps table talk varied.
const DEFAULT_PLAYER_TEMPERATURE: f64 = 0.8;
/// The GM and System keep the books and should answer consistently.
const DEFAULT_AUTHORITY_TEMPERATURE: f64 = 0.2;

/// Complete runner configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Engine config file. Missing files yield engine defaults.
    pub config_path: PathBuf,
    /// Path to the templates directory.
    pub templates_dir: String,
    /// LLM seats; `None` plays with the stub oracle.
    pub backends: Option<SeatBackends>,
}

/// Backend settings for each side of the table.
#[derive(Debug, Clone)]
pub struct SeatBackends {
    /// Used for player decisions.
    pub players: LlmBackendConfig,
    /// Used for GM and System calls.
    pub authorities: LlmBackendConfig,
}

/// Configuration for a single LLM backend.
#[derive(Debug, Clone)]
pub struct LlmBackendConfig {
    /// The backend type.
    pub backend_type: BackendType,
    /// Base API URL (e.g. `https://api.openai.com/v1`).
    pub api_url: String,
    /// API key for authentication.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature for every call on this backend.
    pub temperature: f64,
}

/// Supported LLM backend types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendType {
    /// `OpenAI`-compatible API (works with `OpenAI`, `DeepSeek`, Ollama).
    OpenAi,
    /// Anthropic Messages API (different request format).
    Anthropic,
}

impl BackendType {
    /// Parse a backend name. `stub` (or empty) selects no backend.
    pub fn parse(name: &str) -> Result<Option<Self>, RunnerError> {
        match name.trim().to_lowercase().as_str() {
            "" | "stub" => Ok(None),
            "openai" | "deepseek" | "ollama" => Ok(Some(Self::OpenAi)),
            "anthropic" | "claude" => Ok(Some(Self::Anthropic)),
            other => Err(RunnerError::Config(format!("unknown backend type: {other}"))),
        }
    }
}

impl RunnerConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `PARLEY_CONFIG` -- engine config file (default `parley-config.yaml`)
    /// - `TEMPLATES_DIR` -- prompt templates (default `templates`)
    /// - `LLM_BACKEND` -- `openai`, `anthropic` or `stub` (default `stub`)
    /// - `LLM_API_URL`, `LLM_API_KEY`, `LLM_MODEL` -- required unless stub
    /// - `LLM_AUTHORITY_MODEL` -- separate model for GM and System calls
    /// - `LLM_TEMPERATURE` -- player temperature (default `0.8`)
    /// - `LLM_AUTHORITY_TEMPERATURE` -- GM and System temperature (default `0.2`)
    pub fn from_env() -> Result<Self, RunnerError> {
        let config_path = std::env::var("PARLEY_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned())
            .into();
        let templates_dir =
            std::env::var("TEMPLATES_DIR").unwrap_or_else(|_| "templates".to_owned());

        let backend_name = std::env::var("LLM_BACKEND").unwrap_or_default();
        let backends = match BackendType::parse(&backend_name)? {
            Some(backend_type) => {
                let players = LlmBackendConfig {
                    backend_type,
                    api_url: env_var("LLM_API_URL")?,
                    api_key: env_var("LLM_API_KEY")?,
                    model: env_var("LLM_MODEL")?,
                    temperature: temperature_var("LLM_TEMPERATURE", DEFAULT_PLAYER_TEMPERATURE)?,
                };
                let authorities = authority_backend(
                    &players,
                    std::env::var("LLM_AUTHORITY_MODEL").ok(),
                    temperature_var("LLM_AUTHORITY_TEMPERATURE", DEFAULT_AUTHORITY_TEMPERATURE)?,
                );
                Some(SeatBackends {
                    players,
                    authorities,
                })
            }
            None => None,
        };

        Ok(Self {
            config_path,
            templates_dir,
            backends,
        })
    }
}

/// The player backend re-tuned for authority seats.
fn authority_backend(
    player: &LlmBackendConfig,
    model: Option<String>,
    temperature: f64,
) -> LlmBackendConfig {
    let model = model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| player.model.clone());
    LlmBackendConfig {
        model,
        temperature,
        ..player.clone()
    }
}

/// Parse a temperature in `0.0..=2.0`.
fn parse_temperature(name: &str, raw: &str) -> Result<f64, RunnerError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|e| RunnerError::Config(format!("{name} must be a number: {e}")))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(RunnerError::Config(format!("{name} must be within 0.0..=2.0, got {value}")))
    }
}

/// Read an optional temperature variable.
fn temperature_var(name: &str, default: f64) -> Result<f64, RunnerError> {
    std::env::var(name).map_or(Ok(default), |raw| parse_temperature(name, &raw))
}

/// Read a required environment variable.
fn env_var(name: &str) -> Result<String, RunnerError> {
    std::env::var(name)
        .map_err(|e| RunnerError::Config(format!("missing required env var {name}: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn backend_type_parsing() {
        assert_eq!(BackendType::parse("OpenAI").unwrap(), Some(BackendType::OpenAi));
        assert_eq!(BackendType::parse("ollama").unwrap(), Some(BackendType::OpenAi));
        assert_eq!(BackendType::parse("claude").unwrap(), Some(BackendType::Anthropic));
        assert_eq!(BackendType::parse("stub").unwrap(), None);
        assert_eq!(BackendType::parse("").unwrap(), None);
        assert!(BackendType::parse("carrier-pigeon").is_err());
    }

    #[test]
    fn authorities_get_their_own_model_and_temperature() {
        let player = LlmBackendConfig {
            backend_type: BackendType::Anthropic,
            api_url: "https://api.anthropic.com/v1".to_owned(),
            api_key: "test-key".to_owned(),
            model: "small".to_owned(),
            temperature: DEFAULT_PLAYER_TEMPERATURE,
        };
        let gm = authority_backend(&player, Some("large".to_owned()), 0.1);
        assert_eq!(gm.model, "large");
        assert_eq!(gm.api_url, player.api_url);
        assert!((gm.temperature - 0.1).abs() < f64::EPSILON);

        let same_model = authority_backend(&player, Some(" ".to_owned()), 0.1);
        assert_eq!(same_model.model, "small");
        assert!((same_model.temperature - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn temperatures_are_range_checked() {
        assert!((parse_temperature("T", " 1.5 ").unwrap() - 1.5).abs() < f64::EPSILON);
        assert!(parse_temperature("T", "2.5").is_err());
        assert!(parse_temperature("T", "-0.1").is_err());
        assert!(parse_temperature("T", "warm").is_err());
    }
}
