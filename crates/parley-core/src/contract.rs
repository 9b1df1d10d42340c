//! Decision contract with the reasoning oracle.
//!
//! The oracle is an external collaborator: it receives an [`OracleRequest`]
//! and answers with raw text, ideally a JSON object. This module turns that
//! text into a validated [`ActionDecision`] or [`Directive`]. Parsing
//! tolerates the usual model noise (markdown fences, trailing commas), but
//! field types are checked strictly: a `bid` of `"high"` or a `msg` of `3`
//! is a failure, and the caller substitutes the safe default.
//!
//! Accepted decision fields:
//!
//! | field | aliases | type |
//! |-------|---------|------|
//! | `bid` | | number or numeric string, clamped to `[0, 1]` |
//! | `msg` | `message` | string |
//! | `to` | `recipients` | `"ALL"`, `"GM"`, `"P1,P2"` or an array of names |
//! | `reason` | `rationale` | string |
//! | `target` | `vote` | string |
//!
//! Accepted directive fields: `public_msg`/`message`, `update_pub`/
//! `meta_update`, `update_priv`, `eliminate`, `secrets`, `next_phase`,
//! `winner`, `commands`, `reason`/`rationale`.

use std::future::Future;
use std::str::FromStr;

use parley_types::{
    ActionDecision, Directive, EngineCommand, MetaMap, OracleRequest, Recipients, RequestKind,
};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::commands::RejectedCommand;

/// Why an oracle call produced no usable answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    /// The call exceeded its deadline.
    #[error("decision timed out after {after_ms}ms")]
    Timeout {
        /// The deadline in milliseconds.
        after_ms: u64,
    },

    /// The backend failed (network, HTTP status, template).
    #[error("oracle backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },

    /// The answer did not have the required shape.
    #[error("malformed oracle response: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },
}

impl OracleError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// A source of decisions: an LLM, a script, a human, or a test stub.
///
/// Implementations must be pure with respect to game state: they see only
/// the request, and their answers are applied by the engine.
pub trait Oracle: Send + Sync {
    /// Answer one request with raw text.
    fn complete(
        &self,
        request: &OracleRequest,
    ) -> impl Future<Output = Result<String, OracleError>> + Send;
}

/// An oracle that always passes: bid 0, no message, empty directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubOracle;

impl StubOracle {
    /// Create a new stub oracle.
    pub const fn new() -> Self {
        Self
    }
}

impl Oracle for StubOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let reply = match &request.kind {
            RequestKind::Bid => serde_json::json!({"bid": 0, "msg": "", "to": "ALL"}),
            RequestKind::Target { candidates, .. } => {
                serde_json::json!({"target": candidates.first()})
            }
            RequestKind::Directive | RequestKind::StateUpdate => serde_json::json!({}),
        };
        Ok(reply.to_string())
    }
}

/// A validated directive plus the commands that could not be read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedDirective {
    /// The directive.
    pub directive: Directive,
    /// Commands dropped because they are not in the closed command set.
    pub rejected: Vec<RejectedCommand>,
}

/// Parse an oracle answer to a bid or target request.
///
/// A target request also accepts a bare player name. Targets outside the
/// request's candidates are dropped rather than failing the decision.
pub fn parse_action(raw: &str, kind: &RequestKind) -> Result<ActionDecision, OracleError> {
    let candidates: &[String] = match kind {
        RequestKind::Target { candidates, .. } => candidates,
        _ => &[],
    };

    let object = match extract_object(raw) {
        Ok(object) => object,
        Err(e) => {
            let bare = raw.trim().trim_matches('"');
            if candidates.iter().any(|c| c == bare) {
                return Ok(ActionDecision {
                    bid: Decimal::ZERO,
                    message: String::new(),
                    recipients: Recipients::All,
                    rationale: String::new(),
                    target: Some(bare.to_owned()),
                });
            }
            return Err(e);
        }
    };

    let bid = match (field(&object, &["bid"]), kind) {
        (Some(value), _) => parse_bid(value)?,
        (None, RequestKind::Bid) => return Err(OracleError::malformed("missing `bid`")),
        (None, _) => Decimal::ZERO,
    };
    let message = opt_string(&object, &["msg", "message"])?.unwrap_or_default();
    let recipients = match field(&object, &["to", "recipients"]) {
        None | Some(Value::Null) => Recipients::All,
        Some(value) => parse_recipients(value)?,
    };
    let rationale = opt_string(&object, &["reason", "rationale"])?.unwrap_or_default();
    let target = opt_string(&object, &["target", "vote"])?
        .map(|t| t.trim().to_owned())
        .filter(|t| candidates.iter().any(|c| c == t));

    Ok(ActionDecision {
        bid,
        message,
        recipients,
        rationale,
        target,
    })
}

/// Parse an authority's directive.
pub fn parse_directive(raw: &str) -> Result<ParsedDirective, OracleError> {
    let object = extract_object(raw)?;

    let message = opt_string(&object, &["public_msg", "message"])?.unwrap_or_default();
    let rationale = opt_string(&object, &["reason", "rationale"])?.unwrap_or_default();
    let next_phase = opt_string(&object, &["next_phase"])?.filter(|s| !s.trim().is_empty());
    let winner = opt_string(&object, &["winner"])?.filter(|s| !s.trim().is_empty());

    let mut directive = Directive {
        message,
        next_phase,
        winner,
        rationale,
        ..Directive::default()
    };
    directive.delta.public = opt_meta(&object, &["update_pub", "meta_update"])?;
    directive.delta.private = opt_meta(&object, &["update_priv"])?;
    directive.delta.eliminate = match field(&object, &["eliminate"]) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => vec![name.clone()],
        Some(value) => string_list(value, "eliminate")?,
    };
    if let Some(value) = field(&object, &["secrets"]).filter(|v| !v.is_null()) {
        directive.delta.secrets = serde_json::from_value(value.clone())
            .map_err(|e| OracleError::malformed(format!("`secrets` must map names to objects: {e}")))?;
    }

    let mut rejected = Vec::new();
    match field(&object, &["commands"]) {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                match serde_json::from_value::<EngineCommand>(item.clone()) {
                    Ok(command) => directive.commands.push(command),
                    Err(e) => rejected.push(RejectedCommand {
                        command: item.clone(),
                        error: e.to_string(),
                    }),
                }
            }
        }
        Some(_) => return Err(OracleError::malformed("`commands` must be an array")),
    }

    Ok(ParsedDirective {
        directive,
        rejected,
    })
}

fn field<'v>(object: &'v Map<String, Value>, names: &[&str]) -> Option<&'v Value> {
    names.iter().find_map(|n| object.get(*n))
}

fn opt_string(object: &Map<String, Value>, names: &[&str]) -> Result<Option<String>, OracleError> {
    match field(object, names) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(OracleError::malformed(format!(
            "`{}` must be a string, got {other}",
            names.first().copied().unwrap_or_default()
        ))),
    }
}

fn opt_meta(object: &Map<String, Value>, names: &[&str]) -> Result<MetaMap, OracleError> {
    match field(object, names) {
        None | Some(Value::Null) => Ok(MetaMap::new()),
        Some(value) if value.is_object() => serde_json::from_value(value.clone())
            .map_err(|e| OracleError::malformed(format!("bad meta update: {e}"))),
        Some(other) => Err(OracleError::malformed(format!(
            "`{}` must be an object, got {other}",
            names.first().copied().unwrap_or_default()
        ))),
    }
}

fn string_list(value: &Value, name: &str) -> Result<Vec<String>, OracleError> {
    let Value::Array(items) = value else {
        return Err(OracleError::malformed(format!("`{name}` must be a list of names")));
    };
    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(ToOwned::to_owned)
                .ok_or_else(|| OracleError::malformed(format!("`{name}` entries must be strings")))
        })
        .collect()
}

fn parse_bid(value: &Value) -> Result<Decimal, OracleError> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_owned(),
        other => return Err(OracleError::malformed(format!("`bid` must be a number, got {other}"))),
    };
    let bid = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| OracleError::malformed(format!("`bid` is not numeric ({text}): {e}")))?;
    Ok(bid.clamp(Decimal::ZERO, Decimal::ONE))
}

fn parse_recipients(value: &Value) -> Result<Recipients, OracleError> {
    match value {
        Value::String(s) => Ok(Recipients::parse(s)),
        Value::Array(_) => {
            let names = string_list(value, "to")?;
            if names.iter().all(|name| name.trim().is_empty()) {
                return Ok(Recipients::All);
            }
            Ok(Recipients::from_tokens(names.iter().map(String::as_str)))
        }
        other => Err(OracleError::malformed(format!(
            "`to` must be a string or list, got {other}"
        ))),
    }
}

/// Pull a JSON object out of raw model text.
///
/// Tries, in order: the text as-is, the first fenced code block, the text
/// with trailing commas removed, and the code block with trailing commas
/// removed.
pub fn extract_object(raw: &str) -> Result<Map<String, Value>, OracleError> {
    let trimmed = raw.trim();
    let block = extract_json_from_codeblock(trimmed);

    let attempts = [
        Some(trimmed.to_owned()),
        block.map(ToOwned::to_owned),
        Some(strip_trailing_commas(trimmed)),
        block.map(strip_trailing_commas),
    ];
    let mut last = None;
    for candidate in attempts.into_iter().flatten() {
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(object)) => return Ok(object),
            Ok(other) => last = Some(format!("expected a JSON object, got {other}")),
            Err(e) => last = Some(e.to_string()),
        }
    }
    Err(OracleError::malformed(
        last.unwrap_or_else(|| "empty response".to_owned()),
    ))
}

/// Extract JSON from a markdown code block.
fn extract_json_from_codeblock(text: &str) -> Option<&str> {
    let fence = text.find("```")?;
    let after_fence = text.get(fence.checked_add(3)?..)?;
    let body_start = after_fence.find('\n').and_then(|nl| nl.checked_add(1))?;
    let body = after_fence.get(body_start..)?;
    let end = body.find("```")?;
    body.get(..end).map(str::trim)
}

/// Strip trailing commas before closing braces and brackets.
fn strip_trailing_commas(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        }
        if c == ',' {
            let rest: String = chars.clone().skip_while(|n| n.is_whitespace()).take(1).collect();
            if rest == "}" || rest == "]" {
                continue;
            }
        }
        result.push(c);
    }
    result
}
