//! Victory condition evaluator.
//!
//! Each team carries one expression such as `Evil == 0` or
//! `Evil >= Town`. Expressions are parsed into a small [`Expr`] tree and
//! evaluated against a counter namespace built from living team sizes and
//! the scalar entries of public meta. The grammar admits nothing but
//! integer literals, counter names, parentheses, `+ - * /` and the six
//! comparisons, so a victory rule can never execute anything.
//!
//! ```text
//! expr    := sum (cmp sum)?
//! sum     := product (("+" | "-") product)*
//! product := unary (("*" | "/") unary)*
//! unary   := "-" unary | atom
//! atom    := INT | IDENT | "(" expr ")"
//! cmp     := "==" | "!=" | "<" | "<=" | ">" | ">="
//! ```

use std::collections::BTreeMap;
use std::fmt;

use parley_types::{GameState, VictoryRule};

/// Counter name to integer value.
pub type Counters = BTreeMap<String, i64>;

/// Why an expression could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// A character outside the grammar.
    #[error("unexpected character `{ch}` at offset {offset}")]
    UnexpectedChar {
        /// The character.
        ch: char,
        /// Byte offset in the source.
        offset: usize,
    },

    /// An integer literal that does not fit in `i64`.
    #[error("integer literal `{literal}` is out of range")]
    LiteralOverflow {
        /// The literal text.
        literal: String,
    },

    /// The token stream does not match the grammar.
    #[error("syntax error: {reason}")]
    Syntax {
        /// What was expected.
        reason: String,
    },

    /// A name with no counter behind it.
    #[error("unresolved identifier `{name}`")]
    Unresolved {
        /// The name.
        name: String,
    },

    /// Overflow or division by zero.
    #[error("arithmetic error in `{op}`")]
    Arithmetic {
        /// The operator that failed.
        op: ArithOp,
    },

    /// A comparison used where a number is required, or vice versa.
    #[error("type error: {reason}")]
    Type {
        /// What went wrong.
        reason: String,
    },
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/` (integer division, truncating toward zero)
    Div,
}

impl fmt::Display for ArithOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        })
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl CmpOp {
    const fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// A parsed victory expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// An integer literal.
    Literal(i64),
    /// A counter reference.
    Identifier(String),
    /// Arithmetic on two sub-expressions.
    BinaryOp {
        /// Operator.
        op: ArithOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
    /// A comparison of two arithmetic sub-expressions.
    Compare {
        /// Operator.
        op: CmpOp,
        /// Left operand.
        lhs: Box<Expr>,
        /// Right operand.
        rhs: Box<Expr>,
    },
}

/// The value an [`Expr`] reduces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// An arithmetic result.
    Int(i64),
    /// A comparison result.
    Bool(bool),
}

impl Value {
    /// Truthiness: comparisons as-is, integers when non-zero.
    pub const fn is_true(self) -> bool {
        match self {
            Self::Bool(b) => b,
            Self::Int(n) => n != 0,
        }
    }
}

impl Expr {
    /// Parse `source` into an expression tree.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(ExprError::Syntax {
                reason: format!("unexpected trailing {tok}"),
            }),
        }
    }

    /// Evaluate against `counters`.
    pub fn eval(&self, counters: &Counters) -> Result<Value, ExprError> {
        match self {
            Self::Literal(n) => Ok(Value::Int(*n)),
            Self::Identifier(name) => counters
                .get(name)
                .copied()
                .map(Value::Int)
                .ok_or_else(|| ExprError::Unresolved { name: name.clone() }),
            Self::BinaryOp { op, lhs, rhs } => {
                let a = lhs.eval(counters).and_then(int_operand)?;
                let b = rhs.eval(counters).and_then(int_operand)?;
                let result = match op {
                    ArithOp::Add => a.checked_add(b),
                    ArithOp::Sub => a.checked_sub(b),
                    ArithOp::Mul => a.checked_mul(b),
                    ArithOp::Div => a.checked_div(b),
                };
                result
                    .map(Value::Int)
                    .ok_or(ExprError::Arithmetic { op: *op })
            }
            Self::Compare { op, lhs, rhs } => {
                let a = lhs.eval(counters).and_then(int_operand)?;
                let b = rhs.eval(counters).and_then(int_operand)?;
                Ok(Value::Bool(op.holds(a, b)))
            }
        }
    }
}

fn int_operand(value: Value) -> Result<i64, ExprError> {
    match value {
        Value::Int(n) => Ok(n),
        Value::Bool(_) => Err(ExprError::Type {
            reason: "a comparison cannot be used as a number".to_owned(),
        }),
    }
}

/// Parse and evaluate `source` in one step, reporting truthiness.
pub fn evaluate(source: &str, counters: &Counters) -> Result<bool, ExprError> {
    Expr::parse(source)?.eval(counters).map(Value::is_true)
}

/// Build the counter namespace for `state`.
///
/// Living players per team first, then every scalar public meta entry.
/// A meta counter shadows a team of the same name.
pub fn counters_for(state: &GameState) -> Counters {
    let mut counters = state.living_team_counts();
    for (key, value) in &state.public.meta {
        if let Some(n) = value.as_counter() {
            counters.insert(key.clone(), n);
        }
    }
    counters
}

/// Outcome of checking every victory rule once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VictoryCheck {
    /// First team, in declaration order, whose expression holds.
    pub winner: Option<String>,
    /// Teams whose expressions could not be evaluated, checked before the winner.
    pub skipped: Vec<(String, ExprError)>,
}

/// Check `rules` in order. A failing expression is a non-match, never fatal.
pub fn check_victory(rules: &[VictoryRule], counters: &Counters) -> VictoryCheck {
    let mut check = VictoryCheck::default();
    for rule in rules {
        match evaluate(&rule.expression, counters) {
            Ok(true) => {
                check.winner = Some(rule.team.clone());
                break;
            }
            Ok(false) => {}
            Err(e) => check.skipped.push((rule.team.clone(), e)),
        }
    }
    check
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Int(i64),
    Ident(String),
    Arith(ArithOp),
    Cmp(CmpOp),
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "`{n}`"),
            Self::Ident(name) => write!(f, "`{name}`"),
            Self::Arith(op) => write!(f, "`{op}`"),
            Self::Cmp(op) => write!(f, "`{op:?}`"),
            Self::LParen => f.write_str("`(`"),
            Self::RParen => f.write_str("`)`"),
        }
    }
}

const fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        let token = match c {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '+' => Token::Arith(ArithOp::Add),
            '-' => Token::Arith(ArithOp::Sub),
            '*' => Token::Arith(ArithOp::Mul),
            '/' => Token::Arith(ArithOp::Div),
            '=' | '!' | '<' | '>' => {
                let followed_by_eq = chars.next_if(|&(_, n)| n == '=').is_some();
                match (c, followed_by_eq) {
                    ('=', true) => Token::Cmp(CmpOp::Eq),
                    ('!', true) => Token::Cmp(CmpOp::Ne),
                    ('<', true) => Token::Cmp(CmpOp::Le),
                    ('>', true) => Token::Cmp(CmpOp::Ge),
                    ('<', false) => Token::Cmp(CmpOp::Lt),
                    ('>', false) => Token::Cmp(CmpOp::Gt),
                    _ => return Err(ExprError::UnexpectedChar { ch: c, offset }),
                }
            }
            c if c.is_ascii_digit() => {
                let mut literal = String::from(c);
                while let Some((_, d)) = chars.next_if(|&(_, d)| d.is_ascii_digit()) {
                    literal.push(d);
                }
                if chars.peek().is_some_and(|&(_, n)| is_ident_char(n)) {
                    return Err(ExprError::Syntax {
                        reason: format!("identifier may not start with a digit near `{literal}`"),
                    });
                }
                match literal.parse::<i64>() {
                    Ok(value) => Token::Int(value),
                    Err(_) => return Err(ExprError::LiteralOverflow { literal }),
                }
            }
            c if is_ident_char(c) => {
                let mut name = String::from(c);
                while let Some((_, n)) = chars.next_if(|&(_, n)| is_ident_char(n)) {
                    name.push(n);
                }
                Token::Ident(name)
            }
            other => return Err(ExprError::UnexpectedChar { ch: other, offset }),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Recursive-descent parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos = self.pos.saturating_add(1);
        }
        token
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.sum()?;
        if let Some(&Token::Cmp(op)) = self.peek() {
            self.bump();
            let rhs = self.sum()?;
            if matches!(self.peek(), Some(Token::Cmp(_))) {
                return Err(ExprError::Syntax {
                    reason: "comparisons cannot be chained".to_owned(),
                });
            }
            return Ok(Expr::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn sum(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.product()?;
        while let Some(&Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            self.bump();
            let rhs = self.product()?;
            lhs = Expr::BinaryOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn product(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(&Token::Arith(op @ (ArithOp::Mul | ArithOp::Div))) = self.peek() {
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::BinaryOp {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if matches!(self.peek(), Some(Token::Arith(ArithOp::Sub))) {
            self.bump();
            let operand = self.unary()?;
            return Ok(Expr::BinaryOp {
                op: ArithOp::Sub,
                lhs: Box::new(Expr::Literal(0)),
                rhs: Box::new(operand),
            });
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Expr, ExprError> {
        match self.bump() {
            Some(Token::Int(n)) => Ok(Expr::Literal(n)),
            Some(Token::Ident(name)) => Ok(Expr::Identifier(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::Syntax {
                        reason: "missing `)`".to_owned(),
                    }),
                }
            }
            Some(tok) => Err(ExprError::Syntax {
                reason: format!("unexpected {tok}"),
            }),
            None => Err(ExprError::Syntax {
                reason: "unexpected end of expression".to_owned(),
            }),
        }
    }
}
