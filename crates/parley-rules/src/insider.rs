//! Insider: guess the word, then find who already knew it.
//!
//! The Master answers yes/no questions about a secret word drawn into
//! private meta. The Insider knows the word too and steers the table
//! toward it. A fixed number of question rounds stands in for the timer:
//! naming the word jumps straight to the hunt for the Insider, running out
//! of rounds loses the game for everyone.

use parley_core::builtin::{self, discussion, plurality};
use parley_core::error::RegistryError;
use parley_core::registry::{Ask, Audience, PhaseHandler, PhasePipeline, Registry};
use parley_core::ruleset::{BriefingContext, Ruleset};
use parley_types::{CapabilityRole, GameSpec, MetaKind, MetaMap, MetaSchema, MetaValue};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use tracing::info;

/// Opening announcement of the Master.
pub const REVEAL_MASTER: &str = "reveal_master";
/// One question to the Master.
pub const QUESTION: &str = "question";
/// The question rounds ran out.
pub const TIME_UP: &str = "time_up";
/// Someone named the word.
pub const WORD_FOUND: &str = "word_found";
/// Who was the Insider?
pub const INSIDER_VOTE: &str = "insider_vote";

const MASTER_ROLE: &str = "Master";
const INSIDER_ROLE: &str = "Insider";
const COMMONS_TEAM: &str = "Commons";
const INSIDER_TEAM: &str = "Insider";
const SECRET_WORD: &str = "secret_word";

/// Words the secret one is drawn from.
pub const WORDS: [&str; 12] = [
    "lighthouse",
    "penguin",
    "volcano",
    "umbrella",
    "piano",
    "pyramid",
    "telescope",
    "pineapple",
    "glacier",
    "kangaroo",
    "bicycle",
    "library",
];

const RULEBOOK: &str = "\
==================== Insider - Public Rulebook ====================
GOAL
  * Guess the secret word before the question rounds run out.
  * Then identify the hidden Insider in the vote.
  * If the word is never guessed, everybody loses.

ROLES
  * Master - answers questions with Yes, No or I don't know only.
    Their identity is public.
  * Insider - knows the word but stays hidden, nudging the group.
  * Commoner - does not know the word. Find it, then expose the Insider.

PHASE SEQUENCE
  1. Question rounds - ask the Master yes/no questions. Say the word
     outright to guess it.
  2. Discussion - once the word is found, talk about who knew too much.
  3. Vote - everyone names ONE suspect.

VICTORY
  * Commons (Master included) win if the accused is the Insider.
  * The Insider wins if anyone else is accused.
====================================================================";

const GM_GUIDELINE: &str = "\
==================== GM Procedural Guideline =====================
  * Reject questions that cannot be answered Yes, No or I don't know.
  * Remind the Master to answer with those words only.
  * Never reveal the word before someone names it.
===================================================================";

/// Insider with a random secret word.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsiderRuleset;

impl Ruleset for InsiderRuleset {
    fn name(&self) -> &str {
        "insider"
    }

    fn meta_schema(&self) -> MetaSchema {
        MetaSchema::new()
            .field("word_guessed", MetaKind::Bool)
            .field("word_missed", MetaKind::Bool)
            .field("master", MetaKind::Str)
            .field("guessed_by", MetaKind::Str)
            .field("accused", MetaKind::Str)
    }

    fn register(&self, registry: &mut Registry) -> Result<(), RegistryError> {
        builtin::register_builtins(registry)?;
        for (name, pipeline) in [
            (REVEAL_MASTER, reveal_master()),
            (TIME_UP, time_up()),
            (WORD_FOUND, word_found()),
        ] {
            registry.register_phase(
                name,
                PhaseHandler {
                    audience: Audience::Nobody,
                    ask: None,
                    pipeline,
                },
            )?;
        }
        registry.register_phase(
            QUESTION,
            PhaseHandler {
                audience: Audience::Floor,
                ask: Some(Ask::Bid),
                pipeline: discussion().followed_by(&check_guess()),
            },
        )?;
        registry.register_phase(
            INSIDER_VOTE,
            PhaseHandler {
                audience: Audience::LivingPlayers,
                ask: Some(Ask::target("Name the player you believe is the Insider.", false, true)),
                pipeline: expose_insider(),
            },
        )
    }

    fn initial_public_meta(&self, spec: &GameSpec, _rng: &mut StdRng) -> MetaMap {
        let mut meta = spec.meta.clone();
        meta.insert("word_guessed".to_owned(), false.into());
        meta.insert("word_missed".to_owned(), false.into());
        meta
    }

    fn initial_private_meta(&self, _spec: &GameSpec, rng: &mut StdRng) -> MetaMap {
        let word = WORDS.choose(rng).copied().unwrap_or_default();
        MetaMap::from([(SECRET_WORD.to_owned(), MetaValue::from(word))])
    }

    fn briefing(&self, ctx: &BriefingContext<'_>) -> String {
        let word = ctx
            .private
            .meta
            .get(SECRET_WORD)
            .and_then(MetaValue::as_str)
            .unwrap_or("unknown");
        let role = ctx.assignment.map(|a| a.role.as_str());
        let body = match (ctx.capability, role) {
            (CapabilityRole::Player, Some(MASTER_ROLE)) => format!(
                "You are the Master. Answer ONLY \"Yes\", \"No\" or \"I don't know\" \
                 to questions about the word. Never say it yourself.\n\
                 The secret word is {word}.\nYou are {}.",
                ctx.name
            ),
            (CapabilityRole::Player, Some(INSIDER_ROLE)) => format!(
                "You are the Insider. Help the group find the word without \
                 being exposed in the vote.\nThe secret word is {word}.\nYou are {}.",
                ctx.name
            ),
            (CapabilityRole::Player, _) => format!(
                "You are a Commoner. You do not know the word. Guess it, then \
                 expose the Insider.\nYou are {}.",
                ctx.name
            ),
            (CapabilityRole::AuthorityGm, _) => {
                format!("{GM_GUIDELINE}\nThe secret word is {word}.\nYou are the GM.")
            }
            (CapabilityRole::AuthoritySystem, _) => "You are the SYSTEM agent. Track \
                 whether the word was guessed and who was accused."
                .to_owned(),
        };
        format!("{RULEBOOK}\n{body}\nSpeak in {}.", ctx.language)
    }
}

/// Whether `text` says `word` as a whole word, ignoring case and punctuation.
pub fn names_word(text: &str, word: &str) -> bool {
    let normalize = |s: &str| {
        let spaced: String = s
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { ' ' })
            .collect();
        spaced.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
    };
    let word = normalize(word);
    if word.is_empty() {
        return false;
    }
    format!(" {} ", normalize(text)).contains(&format!(" {word} "))
}

/// Announce the Master, whose role is public.
pub fn reveal_master() -> PhasePipeline {
    PhasePipeline::new().then("reveal_master", |input, out, _| {
        let master = input
            .state
            .private
            .records
            .iter()
            .find(|(_, r)| r.assignment.role == MASTER_ROLE)
            .map(|(name, _)| name.clone());
        if let Some(master) = master {
            out.announce(
                input.turn,
                &format!("{master} is the Master. Question rounds begin: ask yes/no questions."),
            );
            out.set_public("master", master);
        }
    })
}

/// Jump to the hunt when the speaker named the word.
pub fn check_guess() -> PhasePipeline {
    PhasePipeline::new().then("check_guess", |input, out, _| {
        let Some(message) = &out.message else {
            return;
        };
        let is_master = input
            .state
            .private
            .assignment(&message.sender)
            .is_none_or(|a| a.role == MASTER_ROLE);
        let word = input
            .state
            .private
            .meta
            .get(SECRET_WORD)
            .and_then(MetaValue::as_str)
            .unwrap_or_default();
        if is_master || !names_word(&message.text, word) {
            return;
        }
        let guesser = message.sender.clone();
        info!(turn = input.turn, %guesser, "secret word named");
        out.set_public("word_guessed", true);
        out.set_public("guessed_by", guesser);
        out.next_phase = Some(WORD_FOUND.to_owned());
    })
}

/// Nobody named the word in time; everyone loses.
pub fn time_up() -> PhasePipeline {
    PhasePipeline::new().then("time_up", |input, out, _| {
        if input.meta("word_guessed").and_then(MetaValue::as_counter) == Some(1) {
            return;
        }
        out.announce(input.turn, "Time is up. Nobody named the word, so everyone loses.");
        out.set_public("word_missed", true);
    })
}

/// Confirm the word and open the discussion.
pub fn word_found() -> PhasePipeline {
    PhasePipeline::new().then("word_found", |input, out, _| {
        let word = input
            .state
            .private
            .meta
            .get(SECRET_WORD)
            .and_then(MetaValue::as_str)
            .unwrap_or_default();
        let guesser = input
            .meta("guessed_by")
            .and_then(MetaValue::as_str)
            .unwrap_or("Someone");
        out.announce(
            input.turn,
            &format!("Correct! {guesser} named the word: {word}. Now find the Insider."),
        );
    })
}

/// Reveal whether the accused was the Insider and decide the game.
pub fn expose_insider() -> PhasePipeline {
    PhasePipeline::new().then("expose_insider", |input, out, rng| {
        let targets = input.targets();
        let insider = input
            .state
            .private
            .records
            .iter()
            .find(|(_, r)| r.assignment.role == INSIDER_ROLE)
            .map_or("nobody", |(name, _)| name.as_str());
        let Some(accused) = plurality(targets.iter().map(|(_, t)| *t), rng) else {
            out.announce(input.turn, &format!("Nobody was accused. {insider} was the Insider."));
            out.winner = Some(INSIDER_TEAM.to_owned());
            return;
        };
        let caught = accused == insider;
        let text = if caught {
            format!("{accused} is accused and WAS the Insider.")
        } else {
            format!("{accused} is accused but was not the Insider. {insider} was.")
        };
        out.announce(input.turn, &text);
        out.set_public("accused", accused);
        let winner = if caught { COMMONS_TEAM } else { INSIDER_TEAM };
        out.winner = Some(winner.to_owned());
    })
}
