//! Engine commands on named collections.
//!
//! The only mutation surface an authority has besides returning a delta.
//! Decks are [`MetaValue::List`] entries in public meta keyed by deck name;
//! the top of a deck is the front of the list.

use parley_types::{EngineCommand, MetaKind, MetaMap, MetaSchema, MetaValue};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Why a command was refused. Never fatal: the command is logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The named deck does not exist.
    #[error("unknown deck `{deck}`")]
    UnknownDeck {
        /// The requested deck.
        deck: String,
    },

    /// The key exists but does not hold a list.
    #[error("meta key `{key}` is not a list")]
    NotAList {
        /// The offending key.
        key: String,
    },

    /// The schema pins the key to a non-list shape.
    #[error("meta key `{key}` is declared as {declared:?}")]
    SchemaConflict {
        /// The offending key.
        key: String,
        /// The declared shape.
        declared: MetaKind,
    },

    /// A draw of zero items.
    #[error("draw count must be positive")]
    ZeroCount,

    /// A blank deck or destination name.
    #[error("collection names must not be empty")]
    EmptyName,
}

/// A command that never made it past parsing, or failed at commit.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCommand {
    /// The command as JSON.
    pub command: serde_json::Value,
    /// Why it was refused.
    pub error: String,
}

/// What a successful command did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandEffect {
    /// A deck was created or replaced with this many items.
    Initialized {
        /// Items in the new deck.
        size: usize,
    },
    /// Items moved from a deck to a destination list.
    Drawn {
        /// The items, in draw order.
        items: Vec<String>,
    },
    /// A deck was shuffled.
    Shuffled,
}

/// Run one command against `meta`.
///
/// A draw larger than the deck takes what is left.
pub fn execute(
    command: &EngineCommand,
    meta: &mut MetaMap,
    schema: &MetaSchema,
    rng: &mut StdRng,
) -> Result<CommandEffect, CommandError> {
    match command {
        EngineCommand::InitDeck {
            deck,
            items,
            shuffle,
        } => {
            check_name(deck, schema)?;
            let mut items = items.clone();
            if *shuffle {
                items.shuffle(rng);
            }
            let size = items.len();
            meta.insert(deck.clone(), MetaValue::List(items));
            Ok(CommandEffect::Initialized { size })
        }
        EngineCommand::Draw { deck, count, into } => {
            if *count == 0 {
                return Err(CommandError::ZeroCount);
            }
            check_name(deck, schema)?;
            check_name(into, schema)?;
            if let Some(existing) = meta.get(into)
                && existing.as_list().is_none()
            {
                return Err(CommandError::NotAList { key: into.clone() });
            }

            let source = deck_mut(meta, deck)?;
            let take = usize::try_from(*count).unwrap_or(usize::MAX).min(source.len());
            let drawn: Vec<String> = source.drain(..take).collect();

            if let MetaValue::List(dest) = meta
                .entry(into.clone())
                .or_insert_with(|| MetaValue::List(Vec::new()))
            {
                dest.extend(drawn.iter().cloned());
            }
            Ok(CommandEffect::Drawn { items: drawn })
        }
        EngineCommand::Shuffle { deck } => {
            deck_mut(meta, deck)?.shuffle(rng);
            Ok(CommandEffect::Shuffled)
        }
    }
}

fn check_name(key: &str, schema: &MetaSchema) -> Result<(), CommandError> {
    if key.trim().is_empty() {
        return Err(CommandError::EmptyName);
    }
    match schema.kind_of(key) {
        None | Some(MetaKind::List | MetaKind::Blob) => Ok(()),
        Some(declared) => Err(CommandError::SchemaConflict {
            key: key.to_owned(),
            declared,
        }),
    }
}

fn deck_mut<'m>(meta: &'m mut MetaMap, deck: &str) -> Result<&'m mut Vec<String>, CommandError> {
    match meta.get_mut(deck) {
        None => Err(CommandError::UnknownDeck {
            deck: deck.to_owned(),
        }),
        Some(MetaValue::List(items)) => Ok(items),
        Some(_) => Err(CommandError::NotAList {
            key: deck.to_owned(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn letters() -> Vec<String> {
        ["a", "b", "c", "d"].iter().map(|s| (*s).to_owned()).collect()
    }

    fn run(command: &EngineCommand, meta: &mut MetaMap) -> Result<CommandEffect, CommandError> {
        let mut rng = StdRng::seed_from_u64(9);
        execute(command, meta, &MetaSchema::new(), &mut rng)
    }

    fn init(meta: &mut MetaMap, shuffle: bool) {
        run(
            &EngineCommand::InitDeck {
                deck: "deck".into(),
                items: letters(),
                shuffle,
            },
            meta,
        )
        .unwrap();
    }

    #[test]
    fn draw_moves_from_the_top() {
        let mut meta = MetaMap::new();
        init(&mut meta, false);
        let effect = run(
            &EngineCommand::Draw {
                deck: "deck".into(),
                count: 2,
                into: "hand".into(),
            },
            &mut meta,
        )
        .unwrap();
        assert_eq!(
            effect,
            CommandEffect::Drawn {
                items: vec!["a".into(), "b".into()]
            }
        );
        assert_eq!(meta.get("deck").and_then(MetaValue::as_list).unwrap().len(), 2);
        assert_eq!(meta.get("hand").and_then(MetaValue::as_list).unwrap().len(), 2);
    }

    #[test]
    fn overdraw_takes_what_is_left() {
        let mut meta = MetaMap::new();
        init(&mut meta, false);
        let draw = EngineCommand::Draw {
            deck: "deck".into(),
            count: 10,
            into: "hand".into(),
        };
        run(&draw, &mut meta).unwrap();
        assert_eq!(
            run(&draw, &mut meta).unwrap(),
            CommandEffect::Drawn { items: Vec::new() }
        );
        assert_eq!(meta.get("hand").and_then(MetaValue::as_list).unwrap().len(), 4);
    }

    #[test]
    fn invalid_commands_are_refused() {
        let mut meta = MetaMap::new();
        meta.insert("score".into(), MetaValue::Int(3));
        init(&mut meta, false);

        let unknown = EngineCommand::Shuffle {
            deck: "nope".into(),
        };
        assert_eq!(
            run(&unknown, &mut meta),
            Err(CommandError::UnknownDeck {
                deck: "nope".into()
            })
        );

        let zero = EngineCommand::Draw {
            deck: "deck".into(),
            count: 0,
            into: "hand".into(),
        };
        assert_eq!(run(&zero, &mut meta), Err(CommandError::ZeroCount));

        let into_scalar = EngineCommand::Draw {
            deck: "deck".into(),
            count: 1,
            into: "score".into(),
        };
        assert!(matches!(run(&into_scalar, &mut meta), Err(CommandError::NotAList { .. })));
        assert_eq!(meta.get("deck").and_then(MetaValue::as_list).unwrap().len(), 4);
    }

    #[test]
    fn schema_pins_are_respected() {
        let schema = MetaSchema::new().field("nights", MetaKind::Int);
        let mut rng = StdRng::seed_from_u64(1);
        let result = execute(
            &EngineCommand::InitDeck {
                deck: "nights".into(),
                items: letters(),
                shuffle: true,
            },
            &mut MetaMap::new(),
            &schema,
            &mut rng,
        );
        assert!(matches!(result, Err(CommandError::SchemaConflict { .. })));
    }

    #[test]
    fn seeded_shuffles_repeat() {
        let mut a = MetaMap::new();
        let mut b = MetaMap::new();
        init(&mut a, true);
        init(&mut b, true);
        assert_eq!(a, b);
        let deck = a.get("deck").and_then(MetaValue::as_list).unwrap();
        assert_eq!(deck.len(), 4);
    }
}
