//! The host expression tree.
//!
//! Expressions arrive already structured: the calling layer builds them from
//! host syntax (or deserializes them from JSON) before anything in this crate
//! runs. Every literal carries its kind from construction onwards.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The semantic kind of a literal, ordered by host coercion rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Null,
    Logical,
    Integer,
    Double,
    String,
}

/// A scalar literal. `None` payloads are the host's typed missing values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Integer(Option<i64>),
    Double(Option<f64>),
    /// Tri-state: true, false or missing.
    Logical(Option<bool>),
    String(Option<String>),
    Null,
}

impl Literal {
    pub fn kind(&self) -> Kind {
        match self {
            Literal::Integer(_) => Kind::Integer,
            Literal::Double(_) => Kind::Double,
            Literal::Logical(_) => Kind::Logical,
            Literal::String(_) => Kind::String,
            Literal::Null => Kind::Null,
        }
    }

    /// The missing value of the given kind.
    pub fn missing(kind: Kind) -> Literal {
        match kind {
            Kind::Integer => Literal::Integer(None),
            Kind::Double => Literal::Double(None),
            Kind::Logical => Literal::Logical(None),
            Kind::String => Literal::String(None),
            Kind::Null => Literal::Null,
        }
    }

    pub fn is_missing(&self) -> bool {
        match self {
            Literal::Integer(v) => v.is_none(),
            Literal::Double(v) => v.is_none_or(|d| d.is_nan()),
            Literal::Logical(v) => v.is_none(),
            Literal::String(v) => v.is_none(),
            Literal::Null => true,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Literal::Integer(_) | Literal::Double(_))
    }

    /// Numeric view of the literal; logicals count as 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Literal::Integer(v) => v.map(|i| i as f64),
            Literal::Double(v) => *v,
            Literal::Logical(v) => v.map(|b| if b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(Some(s)) => Some(s),
            _ => None,
        }
    }
}

/// A function or operator application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
pub struct Call {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Expression>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub named: IndexMap<String, Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "arbitrary", derive(arbitrary::Arbitrary))]
#[serde(rename_all = "snake_case")]
pub enum Expression {
    Literal(Literal),
    /// A multi-element literal value, only ever produced by local folding or
    /// supplied directly by the calling layer.
    Vector(Vec<Literal>),
    Symbol(String),
    Call(Call),
}

impl Expression {
    pub fn as_call(&self) -> Option<&Call> {
        match self {
            Expression::Call(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expression::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expression::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    pub fn is_call_to(&self, name: &str) -> bool {
        self.as_call().is_some_and(|c| c.name == name)
    }

    /// Every symbol referenced anywhere in the tree.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expression::Symbol(name) => {
                out.insert(name.clone());
            }
            Expression::Call(call) => {
                for arg in call.args.iter().chain(call.named.values()) {
                    arg.collect_symbols(out);
                }
            }
            Expression::Literal(_) | Expression::Vector(_) => {}
        }
    }

    /// Rebuilds the tree with every symbol for which `f` returns a
    /// replacement swapped out.
    pub fn substitute(&self, f: &impl Fn(&str) -> Option<Expression>) -> Expression {
        match self {
            Expression::Symbol(name) => f(name).unwrap_or_else(|| self.clone()),
            Expression::Call(call) => Expression::Call(Call {
                name: call.name.clone(),
                args: call.args.iter().map(|a| a.substitute(f)).collect(),
                named: call
                    .named
                    .iter()
                    .map(|(k, v)| (k.clone(), v.substitute(f)))
                    .collect(),
            }),
            Expression::Literal(_) | Expression::Vector(_) => self.clone(),
        }
    }
}

// Constructors used by callers building trees by hand.

pub fn sym(name: impl Into<String>) -> Expression {
    Expression::Symbol(name.into())
}

pub fn int(v: i64) -> Expression {
    Expression::Literal(Literal::Integer(Some(v)))
}

pub fn dbl(v: f64) -> Expression {
    Expression::Literal(Literal::Double(Some(v)))
}

pub fn lgl(v: bool) -> Expression {
    Expression::Literal(Literal::Logical(Some(v)))
}

/// The host's bare `NA`, a missing logical.
pub fn na() -> Expression {
    Expression::Literal(Literal::Logical(None))
}

pub fn string(v: impl Into<String>) -> Expression {
    Expression::Literal(Literal::String(Some(v.into())))
}

pub fn call(name: impl Into<String>, args: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Call(Call {
        name: name.into(),
        args: args.into_iter().collect(),
        named: IndexMap::new(),
    })
}

pub fn call_named(
    name: impl Into<String>,
    args: impl IntoIterator<Item = Expression>,
    named: impl IntoIterator<Item = (&'static str, Expression)>,
) -> Expression {
    Expression::Call(Call {
        name: name.into(),
        args: args.into_iter().collect(),
        named: named.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    })
}

impl From<Literal> for Expression {
    fn from(lit: Literal) -> Self {
        Expression::Literal(lit)
    }
}
impl From<i64> for Expression {
    fn from(v: i64) -> Self {
        int(v)
    }
}
impl From<f64> for Expression {
    fn from(v: f64) -> Self {
        dbl(v)
    }
}
impl From<bool> for Expression {
    fn from(v: bool) -> Self {
        lgl(v)
    }
}

const INFIX: &[&str] = &[
    "+", "-", "*", "/", "^", "%%", "%/%", "%in%", "==", "!=", "<", "<=", ">", ">=", "&", "&&",
    "|", "||", "~",
];
const TIGHT_INFIX: &[&str] = &["$", "::", ":::", ":"];

fn is_syntactic(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '.')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Integer(Some(v)) => write!(f, "{v}L"),
            Literal::Integer(None) => f.write_str("NA_integer_"),
            Literal::Double(Some(v)) => write!(f, "{v}"),
            Literal::Double(None) => f.write_str("NA_real_"),
            Literal::Logical(Some(true)) => f.write_str("TRUE"),
            Literal::Logical(Some(false)) => f.write_str("FALSE"),
            Literal::Logical(None) => f.write_str("NA"),
            Literal::String(Some(s)) => write!(f, "{s:?}"),
            Literal::String(None) => f.write_str("NA_character_"),
            Literal::Null => f.write_str("NULL"),
        }
    }
}

impl Display for Expression {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal(lit) => lit.fmt(f),
            Expression::Vector(items) => {
                f.write_str("c(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str(")")
            }
            Expression::Symbol(name) if is_syntactic(name) => f.write_str(name),
            Expression::Symbol(name) => write!(f, "`{name}`"),
            Expression::Call(call) => call.fmt(f),
        }
    }
}

// Operands that are themselves operators get explicit parentheses so the
//  deparsed text is unambiguous without a precedence table.
fn write_operand(f: &mut Formatter<'_>, e: &Expression) -> fmt::Result {
    match e {
        Expression::Call(c)
            if c.named.is_empty()
                && (INFIX.contains(&c.name.as_str()) || c.name == "!" || c.name == "-") =>
        {
            write!(f, "({e})")
        }
        _ => write!(f, "{e}"),
    }
}

impl Display for Call {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match (self.name.as_str(), self.args.as_slice()) {
            (op, [l, r]) if self.named.is_empty() && INFIX.contains(&op) => {
                write_operand(f, l)?;
                write!(f, " {op} ")?;
                write_operand(f, r)
            }
            (op, [l, r]) if self.named.is_empty() && TIGHT_INFIX.contains(&op) => {
                write!(f, "{l}{op}{r}")
            }
            ("[", [x, i]) => write!(f, "{x}[{i}]"),
            ("[[", [x, i]) => write!(f, "{x}[[{i}]]"),
            ("(", [x]) => write!(f, "({x})"),
            (op @ ("-" | "+" | "!"), [x]) if self.named.is_empty() => {
                f.write_str(op)?;
                write_operand(f, x)
            }
            (name, args) => {
                if is_syntactic(name) {
                    f.write_str(name)?;
                } else {
                    write!(f, "`{name}`")?;
                }
                f.write_str("(")?;
                let mut first = true;
                for arg in args {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{arg}")?;
                }
                for (name, arg) in &self.named {
                    if !first {
                        f.write_str(", ")?;
                    }
                    first = false;
                    write!(f, "{name} = {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}
