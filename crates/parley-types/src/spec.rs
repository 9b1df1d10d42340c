//! Declarative game specification.
//!
//! A [`GameSpec`] is loaded once at start from a JSON or YAML file and never
//! mutated afterwards:
//!
//! ```json
//! {
//!   "name": "Werewolf",
//!   "roles":   [{"name": "Wolf", "team": "Wolves", "abilities": ["kill"], "count": 1}],
//!   "phases":  [{"type": "discussion"}, {"type": "vote"}, {"type": "ability", "ability": "kill"}],
//!   "victory": {"Village": "Wolves == 0", "Wolves": "Wolves >= Village"},
//!   "meta":    {"nights": 0}
//! }
//! ```
//!
//! Victory entries keep their declaration order, which decides who wins when
//! several expressions hold at once.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::meta::MetaMap;
use crate::participant::RoleAssignment;

/// Phase `type` whose tag is qualified by its ability name.
pub const ABILITY_PHASE: &str = "ability";

/// Errors raised while loading or validating a spec. Always fatal.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// The file could not be read.
    #[error("failed to read spec file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// The JSON content is malformed.
    #[error("failed to parse spec JSON: {source}")]
    Json {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// The YAML content is malformed.
    #[error("failed to parse spec YAML: {source}")]
    Yaml {
        /// The underlying YAML error.
        #[from]
        source: serde_yml::Error,
    },

    /// The spec parsed but is not playable.
    #[error("invalid spec: {reason}")]
    Invalid {
        /// What is wrong.
        reason: String,
    },
}

impl SpecError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// How many seats a role template takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleCount {
    /// Exactly this many seats.
    Fixed(u32),
    /// Whatever seats remain after every fixed role is dealt.
    Fill,
}

impl Serialize for RoleCount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Fixed(n) => serializer.serialize_u32(*n),
            Self::Fill => serializer.serialize_str("fill"),
        }
    }
}

impl<'de> Deserialize<'de> for RoleCount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Fixed(u32),
            Word(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Fixed(n) => Ok(Self::Fixed(n)),
            Raw::Word(w) if w.eq_ignore_ascii_case("fill") || w.eq_ignore_ascii_case("var") => {
                Ok(Self::Fill)
            }
            Raw::Word(w) => Err(de::Error::custom(format!(
                "role count must be an integer or \"fill\", got {w:?}"
            ))),
        }
    }
}

/// A role template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTemplate {
    /// Role name.
    pub name: String,
    /// Team label.
    pub team: String,
    /// Abilities granted to holders.
    #[serde(default)]
    pub abilities: Vec<String>,
    /// Seats dealt.
    pub count: RoleCount,
}

/// One entry of the ordered phase list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Handler type (`discussion`, `vote`, `ability`, `gm_directive`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Ability resolved by an `ability` phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability: Option<String>,
    /// Any further handler parameters.
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl PhaseSpec {
    /// A parameterless phase of the given type.
    pub fn of_kind(kind: &str) -> Self {
        Self {
            kind: kind.to_owned(),
            name: None,
            ability: None,
            params: BTreeMap::new(),
        }
    }

    /// An ability phase for `ability`.
    pub fn ability(ability: &str) -> Self {
        Self {
            ability: Some(ability.to_owned()),
            ..Self::of_kind(ABILITY_PHASE)
        }
    }

    /// The symbolic tag, e.g. `vote` or `ability:demon_kill`.
    pub fn tag(&self) -> String {
        match (&self.ability, self.kind.as_str()) {
            (Some(ability), ABILITY_PHASE) => format!("{ABILITY_PHASE}:{ability}"),
            _ => self.kind.clone(),
        }
    }

    /// Whether an override target names this phase (by tag or display name).
    pub fn answers_to(&self, target: &str) -> bool {
        self.tag() == target || self.name.as_deref() == Some(target)
    }
}

/// One team's victory expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VictoryRule {
    /// Team that wins when the expression holds.
    pub team: String,
    /// Expression over team counts and meta counters.
    pub expression: String,
}

/// The immutable game configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSpec {
    /// Display name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Language tag players speak in.
    #[serde(default = "default_lang")]
    pub lang: String,
    /// Role templates.
    pub roles: Vec<RoleTemplate>,
    /// Ordered phase cycle.
    pub phases: Vec<PhaseSpec>,
    /// Victory expressions in declaration order.
    #[serde(serialize_with = "ser_victory", deserialize_with = "de_victory")]
    pub victory: Vec<VictoryRule>,
    /// Initial public meta.
    #[serde(default)]
    pub meta: MetaMap,
    /// Optional turn cap declared by the game itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_limit: Option<u64>,
    /// Ruleset the spec is meant to be played with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset: Option<String>,
}

fn default_name() -> String {
    "Social Deduction Game".to_owned()
}

fn default_lang() -> String {
    "en".to_owned()
}

impl GameSpec {
    /// Parse and validate a JSON spec.
    pub fn from_json(text: &str) -> Result<Self, SpecError> {
        let spec: Self = serde_json::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse and validate a YAML spec.
    pub fn from_yaml(text: &str) -> Result<Self, SpecError> {
        let spec: Self = serde_yml::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Load a spec file, choosing the format by extension (`.yaml`/`.yml`
    /// are YAML, everything else is JSON).
    pub fn from_path(path: &Path) -> Result<Self, SpecError> {
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::from_yaml(&text),
            _ => Self::from_json(&text),
        }
    }

    /// Structural checks that do not depend on the handler registry.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.roles.is_empty() {
            return Err(SpecError::invalid("spec declares no roles"));
        }
        if self.phases.is_empty() {
            return Err(SpecError::invalid("spec declares no phases"));
        }
        if self.victory.is_empty() {
            return Err(SpecError::invalid("spec declares no victory conditions"));
        }

        let mut seen = std::collections::BTreeSet::new();
        for role in &self.roles {
            if !seen.insert(role.name.as_str()) {
                return Err(SpecError::invalid(format!("duplicate role `{}`", role.name)));
            }
        }

        let fills = self
            .roles
            .iter()
            .filter(|r| r.count == RoleCount::Fill)
            .count();
        if fills > 1 {
            return Err(SpecError::invalid("at most one role may use count \"fill\""));
        }

        for phase in &self.phases {
            if phase.kind == ABILITY_PHASE && phase.ability.is_none() {
                return Err(SpecError::invalid(
                    "an `ability` phase must name its ability",
                ));
            }
        }
        Ok(())
    }

    /// Seats taken by fixed-count roles.
    pub fn fixed_seats(&self) -> u32 {
        self.roles
            .iter()
            .filter_map(|r| match r.count {
                RoleCount::Fixed(n) => Some(n),
                RoleCount::Fill => None,
            })
            .fold(0_u32, u32::saturating_add)
    }

    /// Expand templates into one assignment per seat, in template order.
    ///
    /// With `player_count`, the fill role absorbs the remaining seats.
    /// Without it, the table size is the fixed seat total.
    pub fn deal(&self, player_count: Option<u32>) -> Result<Vec<RoleAssignment>, SpecError> {
        let fixed = self.fixed_seats();
        let total = player_count.unwrap_or(fixed);
        if total < fixed {
            return Err(SpecError::invalid(format!(
                "player count {total} is below the {fixed} fixed seats"
            )));
        }
        let has_fill = self.roles.iter().any(|r| r.count == RoleCount::Fill);
        if total > fixed && !has_fill {
            return Err(SpecError::invalid(format!(
                "player count {total} exceeds the {fixed} seats and no role uses \"fill\""
            )));
        }
        if total == 0 {
            return Err(SpecError::invalid("a game needs at least one player"));
        }

        let spare = total.saturating_sub(fixed);
        let mut seats = Vec::new();
        for role in &self.roles {
            let n = match role.count {
                RoleCount::Fixed(n) => n,
                RoleCount::Fill => spare,
            };
            for _ in 0..n {
                seats.push(RoleAssignment {
                    role: role.name.clone(),
                    team: role.team.clone(),
                    abilities: role.abilities.clone(),
                });
            }
        }
        Ok(seats)
    }

    /// Every team named by a role or a victory rule.
    pub fn teams(&self) -> Vec<String> {
        let mut teams: Vec<String> = Vec::new();
        let named = self
            .victory
            .iter()
            .map(|v| &v.team)
            .chain(self.roles.iter().map(|r| &r.team));
        for team in named {
            if !teams.contains(team) {
                teams.push(team.clone());
            }
        }
        teams
    }

    /// Every ability some role grants.
    pub fn abilities(&self) -> Vec<String> {
        let mut abilities: Vec<String> = Vec::new();
        for ability in self.roles.iter().flat_map(|r| &r.abilities) {
            if !abilities.contains(ability) {
                abilities.push(ability.clone());
            }
        }
        abilities
    }

    /// The public rulebook shown to every participant.
    pub fn render_rules(&self) -> String {
        let mut out = vec![format!("### {}", self.name), format!("Language: {}", self.lang)];
        out.push(String::new());
        out.push("#### Roles".to_owned());
        for role in &self.roles {
            let count = match role.count {
                RoleCount::Fixed(n) => n.to_string(),
                RoleCount::Fill => "var".to_owned(),
            };
            let abilities = if role.abilities.is_empty() {
                "none".to_owned()
            } else {
                role.abilities.join(", ")
            };
            out.push(format!(
                "* **{}** x {count} - team {} - abilities: {abilities}",
                role.name, role.team
            ));
        }
        out.push(String::new());
        out.push("#### Phase order".to_owned());
        for phase in &self.phases {
            let label = phase.name.clone().unwrap_or_else(|| phase.kind.clone());
            out.push(format!("* {label} [{}]", phase.tag()));
        }
        out.push(String::new());
        out.push("#### Victory".to_owned());
        for rule in &self.victory {
            out.push(format!("* {}: `{}`", rule.team, rule.expression));
        }
        out.join("\n")
    }
}

fn ser_victory<S: Serializer>(rules: &[VictoryRule], serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(rules.len()))?;
    for rule in rules {
        map.serialize_entry(&rule.team, &rule.expression)?;
    }
    map.end()
}

fn de_victory<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<VictoryRule>, D::Error> {
    struct OrderedVictory;

    impl<'de> Visitor<'de> for OrderedVictory {
        type Value = Vec<VictoryRule>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of team name to victory expression")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut rules = Vec::new();
            while let Some((team, expression)) = access.next_entry::<String, String>()? {
                rules.push(VictoryRule { team, expression });
            }
            Ok(rules)
        }
    }

    deserializer.deserialize_map(OrderedVictory)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    const SPEC: &str = r#"{
        "name": "Mini",
        "roles": [
            {"name": "Imp", "team": "Evil", "abilities": ["demon_kill"], "count": 1},
            {"name": "Villager", "team": "Town", "abilities": [], "count": "fill"}
        ],
        "phases": [
            {"type": "discussion"},
            {"type": "vote", "name": "day vote"},
            {"type": "ability", "ability": "demon_kill"}
        ],
        "victory": {"Town": "Evil == 0", "Evil": "Evil >= Town"},
        "meta": {"turn_limit": 20},
        "turn_limit": 20
    }"#;

    #[test]
    fn parses_and_keeps_victory_order() {
        let spec = GameSpec::from_json(SPEC).unwrap();
        assert_eq!(spec.victory[0].team, "Town");
        assert_eq!(spec.victory[1].team, "Evil");
        assert_eq!(spec.turn_limit, Some(20));
        assert_eq!(spec.lang, "en");
    }

    #[test]
    fn victory_order_survives_a_round_trip() {
        let spec = GameSpec::from_json(SPEC).unwrap();
        let text = serde_json::to_string(&spec).unwrap();
        let back = GameSpec::from_json(&text).unwrap();
        assert_eq!(back.victory, spec.victory);
    }

    #[test]
    fn phase_tags_qualify_abilities() {
        let spec = GameSpec::from_json(SPEC).unwrap();
        let tags: Vec<String> = spec.phases.iter().map(PhaseSpec::tag).collect();
        assert_eq!(tags, vec!["discussion", "vote", "ability:demon_kill"]);
        assert!(spec.phases[1].answers_to("day vote"));
        assert!(spec.phases[1].answers_to("vote"));
    }

    #[test]
    fn deal_fills_remaining_seats() {
        let spec = GameSpec::from_json(SPEC).unwrap();
        let seats = spec.deal(Some(5)).unwrap();
        assert_eq!(seats.len(), 5);
        assert_eq!(seats.iter().filter(|s| s.team == "Evil").count(), 1);

        assert!(spec.deal(Some(0)).is_err());
        assert_eq!(spec.deal(None).unwrap().len(), 1);
    }

    #[test]
    fn deal_refuses_extra_seats_without_fill() {
        let mut spec = GameSpec::from_json(SPEC).unwrap();
        spec.roles[1].count = RoleCount::Fixed(2);
        assert_eq!(spec.deal(None).unwrap().len(), 3);
        assert!(spec.deal(Some(4)).is_err());
    }

    #[test]
    fn validation_catches_unplayable_specs() {
        let no_roles = r#"{"roles": [], "phases": [{"type": "vote"}], "victory": {"A": "1 == 1"}}"#;
        assert!(matches!(GameSpec::from_json(no_roles), Err(SpecError::Invalid { .. })));

        let bare_ability = r#"{"roles": [{"name": "A", "team": "A", "count": 1}],
            "phases": [{"type": "ability"}], "victory": {"A": "1 == 1"}}"#;
        assert!(GameSpec::from_json(bare_ability).is_err());

        let bad_count = r#"{"roles": [{"name": "A", "team": "A", "count": "lots"}],
            "phases": [{"type": "vote"}], "victory": {"A": "1 == 1"}}"#;
        assert!(matches!(GameSpec::from_json(bad_count), Err(SpecError::Json { .. })));
    }

    #[test]
    fn yaml_specs_load_too() {
        let yaml = "roles:\n  - {name: A, team: A, count: 2}\nphases:\n  - {type: discussion}\nvictory:\n  A: \"A == 0\"\n";
        let spec = GameSpec::from_yaml(yaml).unwrap();
        assert_eq!(spec.fixed_seats(), 2);
        assert_eq!(spec.teams(), vec!["A".to_owned()]);
    }

    #[test]
    fn rules_text_lists_everything() {
        let spec = GameSpec::from_json(SPEC).unwrap();
        let rules = spec.render_rules();
        assert!(rules.contains("### Mini"));
        assert!(rules.contains("**Imp** x 1"));
        assert!(rules.contains("[ability:demon_kill]"));
        assert!(rules.contains("Town: `Evil == 0`"));
    }
}
