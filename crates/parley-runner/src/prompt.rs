//! Prompt template loading and rendering via `minijinja`.
//!
//! Templates are loaded from the filesystem (default: `templates/`) so
//! prompts can be tuned without recompiling. There is one template per
//! capability class; the participant's briefing becomes the system message
//! and the rendered template the user message.

use minijinja::Environment;
use parley_types::{CapabilityRole, OracleRequest};

use crate::error::RunnerError;

/// Template names, one per capability class.
const TEMPLATES: [(CapabilityRole, &str); 3] = [
    (CapabilityRole::Player, "player"),
    (CapabilityRole::AuthorityGm, "gm"),
    (CapabilityRole::AuthoritySystem, "system"),
];

/// Manages prompt template loading and rendering.
pub struct PromptEngine {
    env: Environment<'static>,
}

/// The complete rendered prompt ready to send to an LLM backend.
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// System message: the participant's briefing.
    pub system: String,
    /// User message: state, transcript, and the question being asked.
    pub user: String,
}

impl PromptEngine {
    /// Load `player.j2`, `gm.j2` and `system.j2` from `templates_dir`.
    pub fn new(templates_dir: &str) -> Result<Self, RunnerError> {
        let mut env = Environment::new();
        for (_, name) in TEMPLATES {
            let source = load_template(templates_dir, &format!("{name}.j2"))?;
            env.add_template_owned(name, source).map_err(|e| {
                RunnerError::Template(format!("failed to add {name} template: {e}"))
            })?;
        }
        Ok(Self { env })
    }

    /// Render the prompt for one oracle request.
    ///
    /// The template sees every request field plus `transcript`, the
    /// participant's memory as preformatted lines.
    pub fn render(&self, request: &OracleRequest) -> Result<RenderedPrompt, RunnerError> {
        let name = TEMPLATES
            .iter()
            .find(|(capability, _)| *capability == request.capability)
            .map_or("player", |(_, name)| *name);

        let mut context = serde_json::to_value(request)?;
        if let Some(fields) = context.as_object_mut() {
            let transcript: Vec<String> =
                request.memory.iter().map(|m| m.transcript_line()).collect();
            fields.insert("transcript".to_owned(), transcript.into());
        }

        let user = self
            .env
            .get_template(name)
            .map_err(|e| RunnerError::Template(format!("missing {name} template: {e}")))?
            .render(&context)
            .map_err(|e| RunnerError::Template(format!("{name} render failed: {e}")))?;

        Ok(RenderedPrompt {
            system: request.briefing.clone(),
            user,
        })
    }
}

/// Read a template file from disk.
fn load_template(dir: &str, filename: &str) -> Result<String, RunnerError> {
    let path = format!("{dir}/{filename}");
    std::fs::read_to_string(&path)
        .map_err(|e| RunnerError::Template(format!("failed to read {path}: {e}")))
}
