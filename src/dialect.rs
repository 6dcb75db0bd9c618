//! Per-backend rendering rules.
//!
//! A [`Dialect`] is data, not behaviour: a table from host function names to
//! [`Rule`]s plus the quoting and literal conventions of one backend. Backends
//! start from the ANSI table and override only what differs, the same way a
//! custom translator would delegate everything it doesn't care about.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use crate::ast::Literal;
use crate::error::{Error, Result};
use crate::sql::Sql;
use crate::translate::BinaryOp;

mod ansi;
mod mssql;
mod mysql;
mod postgres;
mod sqlite;

/// How many arguments a rule accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Between(usize, usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, n: usize) -> bool {
        match *self {
            Arity::Exact(m) => n == m,
            Arity::Between(lo, hi) => (lo..=hi).contains(&n),
            Arity::AtLeast(lo) => n >= lo,
        }
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::Between(lo, hi) => write!(f, "{lo} to {hi}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// Where a two-argument logarithm puts its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// `LOG(base, x)`
    BaseFirst,
    /// `LOG(x, base)`
    BaseLast,
    /// `LN(x) / LN(base)` for backends without a two-argument form.
    Rewrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatStyle {
    /// `a || sep || b`
    Operator,
    /// `CONCAT_WS(sep, a, b)`
    ConcatWs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastTo {
    Integer,
    Double,
    Character,
    Logical,
    Date,
}

/// What a rule renders to. The translator owns the rendering of each kind;
///  the dialect only decides which kind a host name maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Infix(BinaryOp),
    Not,
    Negate,
    Identity,
    Scalar(&'static str),
    Aggregate(&'static str),
    CountAll,
    CountDistinct,
    /// `PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY x)`
    Median,
    Cumulative(&'static str),
    CumulativeProduct,
    Ranking(&'static str),
    Ntile,
    Offset(&'static str),
    Positional(&'static str),
    Cast(CastTo),
    Conditional,
    CaseWhen,
    Between,
    In,
    IsNull,
    Modulo,
    IntegerDivide,
    Power,
    LogBase(LogStyle),
    Regex(&'static str),
    Combine,
    Desc,
    Raw,
    Substr(&'static str),
    Round,
    Paste {
        sep: &'static str,
        style: ConcatStyle,
    },
    Unsupported(&'static str),
}

impl RuleKind {
    /// Kinds that only make sense over a set of rows.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            RuleKind::Aggregate(_)
                | RuleKind::CountAll
                | RuleKind::CountDistinct
                | RuleKind::Median
        )
    }

    /// Kinds that always render with an OVER clause.
    pub fn is_window(&self) -> bool {
        matches!(
            self,
            RuleKind::Cumulative(_)
                | RuleKind::CumulativeProduct
                | RuleKind::Ranking(_)
                | RuleKind::Ntile
                | RuleKind::Offset(_)
                | RuleKind::Positional(_)
        )
    }
}

/// One entry of a dialect's table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rule {
    pub kind: RuleKind,
    pub arity: Arity,
    /// Positional parameter names; named arguments matching one of these are
    ///  moved into that position before arity is checked.
    pub params: &'static [&'static str],
    /// Named-only parameters the rule consumes itself (e.g. `sep`).
    pub keywords: &'static [&'static str],
}

impl Rule {
    pub const fn new(kind: RuleKind, arity: Arity) -> Self {
        Self {
            kind,
            arity,
            params: &[],
            keywords: &[],
        }
    }

    pub const fn params(self, params: &'static [&'static str]) -> Self {
        Self { params, ..self }
    }

    pub const fn keywords(self, keywords: &'static [&'static str]) -> Self {
        Self { keywords, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitStyle {
    /// Trailing `LIMIT n`
    Limit,
    /// `SELECT TOP n ...`
    Top,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempTableStyle {
    /// `CREATE TEMPORARY TABLE name AS <select>`
    CreateAs,
    /// `SELECT * INTO #name FROM (<select>) AS q`
    SelectInto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastTypes {
    pub integer: &'static str,
    pub double: &'static str,
    pub character: &'static str,
    pub logical: &'static str,
    pub date: &'static str,
}

#[derive(Debug, Clone)]
pub struct Dialect {
    name: &'static str,
    identifier_quote: (char, char),
    string_quote: char,
    escape_backslash: bool,
    supports_windows: bool,
    modulo_function: Option<&'static str>,
    limit_style: LimitStyle,
    explain_prefix: Option<&'static str>,
    temp_table: TempTableStyle,
    cast_types: CastTypes,
    rules: HashMap<&'static str, Vec<Rule>>,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::ansi()
    }
}

impl Dialect {
    /// Standard SQL; the base every other backend derives from.
    pub fn ansi() -> Self {
        Self {
            name: "ansi",
            identifier_quote: ('"', '"'),
            string_quote: '\'',
            escape_backslash: false,
            supports_windows: true,
            modulo_function: Some("MOD"),
            limit_style: LimitStyle::Limit,
            explain_prefix: Some("EXPLAIN "),
            temp_table: TempTableStyle::CreateAs,
            cast_types: CastTypes {
                integer: "INTEGER",
                double: "DOUBLE PRECISION",
                character: "VARCHAR",
                logical: "BOOLEAN",
                date: "DATE",
            },
            rules: ansi::rules(),
        }
    }

    pub fn postgres() -> Self {
        postgres::dialect()
    }

    pub fn sqlite() -> Self {
        sqlite::dialect()
    }

    /// SQLite before 3.25, without window functions.
    pub fn sqlite_legacy() -> Self {
        Self {
            name: "sqlite_legacy",
            supports_windows: false,
            ..sqlite::dialect()
        }
    }

    pub fn mssql() -> Self {
        mssql::dialect()
    }

    pub fn mysql() -> Self {
        mysql::dialect()
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ansi" | "sql" => Ok(Self::ansi()),
            "postgres" | "postgresql" => Ok(Self::postgres()),
            "sqlite" => Ok(Self::sqlite()),
            "sqlite_legacy" => Ok(Self::sqlite_legacy()),
            "mssql" | "sqlserver" => Ok(Self::mssql()),
            "mysql" | "mariadb" => Ok(Self::mysql()),
            _ => Err(Error::UnknownDialect(name.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn supports_windows(&self) -> bool {
        self.supports_windows
    }

    pub fn modulo_function(&self) -> Option<&'static str> {
        self.modulo_function
    }

    pub fn limit_style(&self) -> LimitStyle {
        self.limit_style
    }

    pub fn cast_type(&self, to: CastTo) -> &'static str {
        match to {
            CastTo::Integer => self.cast_types.integer,
            CastTo::Double => self.cast_types.double,
            CastTo::Character => self.cast_types.character,
            CastTo::Logical => self.cast_types.logical,
            CastTo::Date => self.cast_types.date,
        }
    }

    pub fn rules_for(&self, name: &str) -> Option<&[Rule]> {
        self.rules.get(name).map(Vec::as_slice)
    }

    /// Replaces every rule registered under `name`.
    pub fn with_rule(mut self, name: &'static str, rule: Rule) -> Self {
        self.rules.insert(name, vec![rule]);
        self
    }

    pub fn with_rules(mut self, name: &'static str, rules: Vec<Rule>) -> Self {
        self.rules.insert(name, rules);
        self
    }

    pub fn with_identifier_quote(mut self, open: char, close: char) -> Self {
        self.identifier_quote = (open, close);
        self
    }

    pub fn with_string_quote(mut self, quote: char) -> Self {
        self.string_quote = quote;
        self
    }

    /// Quotes one identifier, doubling any closing quote inside it.
    pub fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quote;
        let mut out = String::with_capacity(name.len() + 2);
        out.push(open);
        for c in name.chars() {
            if c == close {
                out.push(close);
            }
            out.push(c);
        }
        out.push(close);
        out
    }

    /// Quotes each part of a qualified name separately.
    pub fn quote_qualified(&self, parts: &[&str]) -> String {
        parts
            .iter()
            .map(|p| self.quote_identifier(p))
            .collect::<Vec<_>>()
            .join(".")
    }

    pub fn quote_string(&self, s: &str) -> String {
        let q = self.string_quote;
        let mut out = String::with_capacity(s.len() + 2);
        out.push(q);
        for c in s.chars() {
            if c == q || (self.escape_backslash && c == '\\') {
                out.push(c);
            }
            out.push(c);
        }
        out.push(q);
        out
    }

    pub fn format_literal(&self, lit: &Literal) -> String {
        match lit {
            Literal::Integer(Some(i)) => i.to_string(),
            Literal::Double(Some(d)) => match format_double(*d) {
                DoubleText::Number(s) => s,
                DoubleText::Null => "NULL".to_string(),
                DoubleText::Infinite(s) => self.quote_string(s),
            },
            Literal::Logical(Some(true)) => "1".to_string(),
            Literal::Logical(Some(false)) => "0".to_string(),
            Literal::String(Some(s)) => self.quote_string(s),
            Literal::Integer(None)
            | Literal::Double(None)
            | Literal::Logical(None)
            | Literal::String(None)
            | Literal::Null => "NULL".to_string(),
        }
    }

    pub fn explain(&self, select: &Sql) -> Result<Sql> {
        match self.explain_prefix {
            Some(prefix) => Ok(Sql::raw(format!("{prefix}{select}"))),
            None => Err(self.unsupported("EXPLAIN")),
        }
    }

    /// The name a temporary table called `name` is referenced by afterwards.
    pub fn temporary_table_name(&self, name: &str) -> String {
        match self.temp_table {
            TempTableStyle::CreateAs => name.to_string(),
            TempTableStyle::SelectInto => format!("#{name}"),
        }
    }

    pub fn temporary_table(&self, name: &str, select: &Sql) -> Sql {
        let table = self.quote_identifier(&self.temporary_table_name(name));
        match self.temp_table {
            TempTableStyle::CreateAs => {
                Sql::raw(format!("CREATE TEMPORARY TABLE {table} AS\n{select}"))
            }
            TempTableStyle::SelectInto => Sql::raw(format!(
                "SELECT * INTO {table} FROM (\n{}\n) AS {}",
                crate::sql::indent(select.as_str()),
                self.quote_identifier("q01")
            )),
        }
    }

    pub(crate) fn unsupported(&self, feature: impl Into<String>) -> Error {
        Error::DialectUnsupportedFeature {
            dialect: self.name,
            feature: feature.into(),
        }
    }
}

pub enum DoubleText {
    Number(String),
    Null,
    Infinite(&'static str),
}

/// Renders a double so that it parses back to the same value: whole numbers
///  keep a `.0` so they stay doubles on the remote side, very small and very
///  large magnitudes use exponent notation.
pub fn format_double(d: f64) -> DoubleText {
    if d.is_nan() {
        return DoubleText::Null;
    }
    if d.is_infinite() {
        return DoubleText::Infinite(if d > 0.0 { "Infinity" } else { "-Infinity" });
    }
    let abs = d.abs();
    let text = if d.fract() == 0.0 && abs < 1e15 {
        format!("{d:.1}")
    } else if abs != 0.0 && (abs < 1e-4 || abs >= 1e15) {
        format!("{d:e}")
    } else {
        format!("{d}")
    };
    DoubleText::Number(text)
}
