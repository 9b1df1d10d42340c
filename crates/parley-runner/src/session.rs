//! Picking the game to play from configuration.
//!
//! With a spec file, the ruleset comes from the config, then the spec's own
//! `ruleset` field, then `standard`. Without one, the named ruleset (default
//! `werewolf`) must ship a bundled spec.

use parley_core::{ConfigError, GameConfig, GameError, Ruleset};
use parley_rules::{RulesetCatalog, bundled_spec};
use parley_types::GameSpec;

/// Ruleset played when the config names neither a ruleset nor a spec.
const DEFAULT_BUNDLED: &str = "werewolf";
/// Ruleset for spec files that do not name one.
const DEFAULT_RULESET: &str = "standard";

/// Resolve the spec and ruleset for one game.
pub fn select_game<'c>(
    game: &GameConfig,
    catalog: &'c RulesetCatalog,
) -> Result<(GameSpec, &'c dyn Ruleset), GameError> {
    let (spec, name) = match &game.spec_path {
        Some(path) => {
            let spec = GameSpec::from_path(path)?;
            let name = game
                .ruleset
                .clone()
                .or_else(|| spec.ruleset.clone())
                .unwrap_or_else(|| DEFAULT_RULESET.to_owned());
            (spec, name)
        }
        None => {
            let name = game
                .ruleset
                .clone()
                .unwrap_or_else(|| DEFAULT_BUNDLED.to_owned());
            let spec = bundled_spec(&name).ok_or_else(|| ConfigError::Invalid {
                reason: format!("ruleset `{name}` has no bundled spec; set game.spec_path"),
            })??;
            (spec, name)
        }
    };
    let ruleset = catalog.resolve(&name)?;
    Ok((spec, ruleset))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn game(ruleset: Option<&str>) -> GameConfig {
        GameConfig {
            ruleset: ruleset.map(str::to_owned),
            ..GameConfig::default()
        }
    }

    #[test]
    fn defaults_to_bundled_werewolf() {
        let catalog = RulesetCatalog::builtin();
        let (spec, ruleset) = select_game(&game(None), &catalog).unwrap();
        assert_eq!(ruleset.name(), "werewolf");
        assert_eq!(spec.ruleset.as_deref(), Some("werewolf"));
    }

    #[test]
    fn named_ruleset_brings_its_spec() {
        let catalog = RulesetCatalog::builtin();
        let (spec, ruleset) = select_game(&game(Some("spyfall")), &catalog).unwrap();
        assert_eq!(ruleset.name(), "spyfall");
        assert_eq!(spec.name, "Spyfall");
    }

    #[test]
    fn specless_rulesets_need_a_file() {
        let catalog = RulesetCatalog::builtin();
        assert!(matches!(
            select_game(&game(Some("standard")), &catalog),
            Err(GameError::Config { .. })
        ));
        assert!(matches!(
            select_game(&game(Some("mafia")), &catalog),
            Err(GameError::Config { .. })
        ));
    }

    #[test]
    fn spec_files_name_their_ruleset() {
        let dir = std::env::temp_dir().join(format!("parley_session_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("mini.yaml");
        std::fs::write(
            &path,
            "roles:\n  - {name: Wolf, team: Wolves, abilities: [kill], count: 1}\n  \
             - {name: Villager, team: Village, count: fill}\n\
             phases:\n  - {type: discussion}\n  - {type: vote}\n\
             victory:\n  Village: Wolves == 0\n  Wolves: Wolves >= Village\n",
        )
        .unwrap();

        let catalog = RulesetCatalog::builtin();
        let config = GameConfig {
            spec_path: Some(path.clone()),
            ..GameConfig::default()
        };
        let (spec, ruleset) = select_game(&config, &catalog).unwrap();
        assert_eq!(ruleset.name(), "standard");
        assert_eq!(spec.phases.len(), 2);

        let pinned = GameConfig {
            ruleset: Some("werewolf".to_owned()),
            ..config
        };
        assert_eq!(select_game(&pinned, &catalog).unwrap().1.name(), "werewolf");

        std::fs::remove_dir_all(&dir).ok();
    }
}
