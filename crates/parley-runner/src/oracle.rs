//! The LLM-backed oracle.

use parley_core::{Oracle, OracleError};
use parley_types::OracleRequest;
use tracing::debug;

use crate::llm::LlmBackend;
use crate::prompt::PromptEngine;

/// Renders a prompt per request and sends it to the right model.
pub struct LlmOracle {
    prompts: PromptEngine,
    players: LlmBackend,
    authorities: LlmBackend,
}

impl LlmOracle {
    /// Players use `players`; GM and System use `authorities`.
    pub const fn new(prompts: PromptEngine, players: LlmBackend, authorities: LlmBackend) -> Self {
        Self {
            prompts,
            players,
            authorities,
        }
    }

    fn backend_for(&self, request: &OracleRequest) -> &LlmBackend {
        if request.capability.is_authority() {
            &self.authorities
        } else {
            &self.players
        }
    }
}

impl Oracle for LlmOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let prompt = self.prompts.render(request)?;
        let backend = self.backend_for(request);
        let profile = backend.profile(&request.kind);
        debug!(
            turn = request.turn,
            participant = %request.participant,
            backend = backend.name(),
            model = backend.model(),
            max_tokens = profile.max_tokens,
            temperature = profile.temperature,
            "calling LLM"
        );
        backend.complete(&prompt, &request.kind).await.map_err(OracleError::from)
    }
}
