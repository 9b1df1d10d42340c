//! Classic werewolf: the built-in phases plus a table-talk rulebook.

use parley_core::ruleset::{BriefingContext, Ruleset};
use parley_types::CapabilityRole;

const RULEBOOK: &str = "\
===================== Werewolf - Public Rulebook =====================
VICTORY
  * Villagers win when every Werewolf is dead.
  * Werewolves win once Werewolves >= Villagers.

PHASE SEQUENCE
  1. Discussion - open conversation. The loudest bidder speaks.
  2. Vote - every living player names ONE player. Most votes is executed,
     ties are broken at random.
  3. Night - the Werewolves choose one victim, who dies immediately.
  4. The Seer secretly learns the team of one player.
======================================================================";

const GM_GUIDELINE: &str = "\
====================== GM Procedural Guideline ======================
Speak to players in plain language.
  * Open each discussion: \"Discussion phase begins. Feel free to talk.\"
  * Before a vote: \"Vote phase. Name exactly one player.\"
  * Remind players who vote in public chat or try to use abilities by day.
  * Never reveal a secret role before the game ends.
=====================================================================";

fn role_text(role: &str) -> &'static str {
    match role {
        "Werewolf" => "You are a Werewolf. At night you and any fellow wolves choose one victim.",
        "Seer" => "You are the Seer. Each night you learn the team of one player you choose.",
        _ => "You are a Villager. You have no special power. Find the wolves.",
    }
}

/// Werewolves against villagers.
#[derive(Debug, Clone, Copy, Default)]
pub struct WerewolfRuleset;

impl Ruleset for WerewolfRuleset {
    fn name(&self) -> &str {
        "werewolf"
    }

    fn briefing(&self, ctx: &BriefingContext<'_>) -> String {
        let body = match (ctx.capability, ctx.assignment) {
            (CapabilityRole::Player, Some(assignment)) => format!(
                "{}\nYou are {}. Speak only as yourself.",
                role_text(&assignment.role),
                ctx.name
            ),
            (CapabilityRole::Player, None) => format!("You are {}.", ctx.name),
            (CapabilityRole::AuthorityGm, _) => format!("{GM_GUIDELINE}\nYou are the GM."),
            (CapabilityRole::AuthoritySystem, _) => "You are the SYSTEM agent. Track phase \
                 changes and eliminations the GM announces, and declare a winner when \
                 the victory conditions hold."
                .to_owned(),
        };
        format!("{RULEBOOK}\n{body}\nSpeak in {}.", ctx.language)
    }
}
