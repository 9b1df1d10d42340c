//! Built-in rulesets for Parley.
//!
//! Each ruleset is a plain value implementing [`Ruleset`]; the
//! [`RulesetCatalog`] maps names to them so a game file or config can pick
//! one with `ruleset: clocktower`. Every game here ships a bundled spec
//! that runs without any file on disk.

pub mod clocktower;
pub mod insider;
pub mod spyfall;
pub mod werewolf;
pub mod word_wolf;

use std::collections::BTreeMap;
use std::fmt;

use parley_core::{GameError, Ruleset, StandardRuleset};
use parley_types::{GameSpec, SpecError};

pub use clocktower::ClocktowerRuleset;
pub use insider::InsiderRuleset;
pub use spyfall::SpyfallRuleset;
pub use werewolf::WerewolfRuleset;
pub use word_wolf::WordWolfRuleset;

const WEREWOLF_SPEC: &str = include_str!("../specs/werewolf.json");
const CLOCKTOWER_SPEC: &str = include_str!("../specs/clocktower.json");
const SPYFALL_SPEC: &str = include_str!("../specs/spyfall.json");
const WORD_WOLF_SPEC: &str = include_str!("../specs/word_wolf.json");
const INSIDER_SPEC: &str = include_str!("../specs/insider.json");

/// Parse the spec bundled with the named ruleset, if there is one.
pub fn bundled_spec(name: &str) -> Option<Result<GameSpec, SpecError>> {
    let text = match name {
        "werewolf" => WEREWOLF_SPEC,
        "clocktower" => CLOCKTOWER_SPEC,
        "spyfall" => SPYFALL_SPEC,
        "word_wolf" => WORD_WOLF_SPEC,
        "insider" => INSIDER_SPEC,
        _ => return None,
    };
    Some(GameSpec::from_json(text))
}

/// Rulesets by name.
#[derive(Default)]
pub struct RulesetCatalog {
    rulesets: BTreeMap<String, Box<dyn Ruleset>>,
}

impl fmt::Debug for RulesetCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.rulesets.keys()).finish()
    }
}

impl RulesetCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every ruleset shipped with Parley.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(Box::new(StandardRuleset));
        catalog.insert(Box::new(WerewolfRuleset));
        catalog.insert(Box::new(ClocktowerRuleset));
        catalog.insert(Box::new(SpyfallRuleset));
        catalog.insert(Box::new(WordWolfRuleset));
        catalog.insert(Box::new(InsiderRuleset));
        catalog
    }

    /// Add a ruleset under its own name, replacing any previous one.
    pub fn insert(&mut self, ruleset: Box<dyn Ruleset>) {
        self.rulesets.insert(ruleset.name().to_owned(), ruleset);
    }

    /// Look a ruleset up by name.
    pub fn get(&self, name: &str) -> Option<&dyn Ruleset> {
        self.rulesets.get(name).map(AsRef::as_ref)
    }

    /// Like [`Self::get`], failing with [`GameError::UnknownRuleset`].
    pub fn resolve(&self, name: &str) -> Result<&dyn Ruleset, GameError> {
        self.get(name).ok_or_else(|| GameError::UnknownRuleset {
            name: name.to_owned(),
        })
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.rulesets.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_lists_every_game() {
        let catalog = RulesetCatalog::builtin();
        assert_eq!(
            catalog.names(),
            vec!["clocktower", "insider", "spyfall", "standard", "werewolf", "word_wolf"]
        );
        assert!(matches!(
            catalog.resolve("mafia"),
            Err(GameError::UnknownRuleset { .. })
        ));
    }

    #[test]
    fn bundled_specs_name_their_ruleset() {
        let catalog = RulesetCatalog::builtin();
        for name in ["werewolf", "clocktower", "spyfall", "word_wolf", "insider"] {
            let spec = bundled_spec(name).unwrap().unwrap();
            assert_eq!(spec.ruleset.as_deref(), Some(name));
            let ruleset = catalog.resolve(name).unwrap();
            ruleset.registry().unwrap().validate(&spec).unwrap();
        }
        assert!(bundled_spec("standard").is_none());
    }
}
