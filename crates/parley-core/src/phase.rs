//! Phase cursor over the static phase cycle.
//!
//! Phases cycle in declaration order. A handler or authority may name the
//! next phase: a listed phase moves the cursor there, while a phase that
//! is not listed but has a registered handler runs once as a detour before
//! the static order resumes.

use parley_types::PhaseSpec;
use tracing::{info, warn};

use crate::registry::Registry;

/// How an override request was honored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override {
    /// The cursor jumped to a listed phase.
    Jump {
        /// Index of the phase in the cycle.
        index: usize,
    },
    /// An unlisted phase runs once.
    Detour {
        /// Its tag.
        tag: String,
    },
    /// No handler answers to the target.
    Ignored,
}

/// Walks the phase cycle.
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phases: Vec<PhaseSpec>,
    cursor: usize,
    jumped: bool,
    detour: Option<PhaseSpec>,
}

impl PhaseMachine {
    /// Start before the first phase of `phases`.
    pub const fn new(phases: Vec<PhaseSpec>) -> Self {
        Self {
            phases,
            cursor: 0,
            jumped: false,
            detour: None,
        }
    }

    /// The phase to run next and whether it was reached by an override.
    /// Advances the cursor.
    pub fn next_phase(&mut self) -> Option<(PhaseSpec, bool)> {
        if let Some(detour) = self.detour.take() {
            return Some((detour, true));
        }
        let phase = self.phases.get(self.cursor)?.clone();
        let overridden = std::mem::take(&mut self.jumped);
        self.cursor = self
            .cursor
            .saturating_add(1)
            .checked_rem(self.phases.len())
            .unwrap_or(0);
        Some((phase, overridden))
    }

    /// Honor a `next_phase` request made by the round that just ran.
    pub fn request(&mut self, target: &str, registry: &Registry) -> Override {
        let target = target.trim();
        if let Some(index) = self.phases.iter().position(|p| p.answers_to(target)) {
            info!(target, index, "phase override");
            self.cursor = index;
            self.jumped = true;
            self.detour = None;
            return Override::Jump { index };
        }
        if let Some(phase) = registry.detour(target) {
            let tag = phase.tag();
            info!(target, tag = %tag, "phase detour");
            self.detour = Some(phase);
            return Override::Detour { tag };
        }
        warn!(target, "no handler answers to requested phase, ignoring");
        Override::Ignored
    }
}
