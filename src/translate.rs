//! Translation of host expressions into a SQL AST.
//!
//! A host tree goes in, a SQL tree comes out; [`crate::to_sql`] turns the
//!  latter into text. What each host function becomes is decided by the
//!  [`Dialect`]'s rule table; everything in here is dialect independent.

use std::cell::RefCell;
use std::fmt::{self, Display, Formatter};
use std::ops::ControlFlow;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ast::{self, Literal};
use crate::dialect::{ConcatStyle, Dialect, LogStyle, Rule, RuleKind};
use crate::error::{Error, Expected, Result, Warning};
use crate::evaluate::{Environment, Scope, partial_eval};
use crate::sql::Sql;
use crate::to_sql::{Printer, PrinterConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
    /// A backend-specific infix token such as `~` or `REGEXP`.
    Custom(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(u64),
    CurrentRow,
    Following(u64),
    UnboundedFollowing,
}

impl FrameBound {
    /// Host offsets: `None` is unbounded, negative values precede the row.
    fn from_offset(offset: Option<i64>, start: bool) -> Self {
        match offset {
            None if start => FrameBound::UnboundedPreceding,
            None => FrameBound::UnboundedFollowing,
            Some(0) => FrameBound::CurrentRow,
            Some(n) if n < 0 => FrameBound::Preceding(n.unsigned_abs()),
            Some(n) => FrameBound::Following(n as u64),
        }
    }
}

impl Display for FrameBound {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FrameBound::UnboundedPreceding => f.write_str("UNBOUNDED PRECEDING"),
            FrameBound::Preceding(n) => write!(f, "{n} PRECEDING"),
            FrameBound::CurrentRow => f.write_str("CURRENT ROW"),
            FrameBound::Following(n) => write!(f, "{n} FOLLOWING"),
            FrameBound::UnboundedFollowing => f.write_str("UNBOUNDED FOLLOWING"),
        }
    }
}

/// A ROWS window frame. A frame without an end is the short form
///  `ROWS <start>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

impl Frame {
    pub fn rows(from: Option<i64>, to: Option<i64>) -> Self {
        Self {
            start: FrameBound::from_offset(from, true),
            end: Some(FrameBound::from_offset(to, false)),
        }
    }

    pub fn cumulative() -> Self {
        Self {
            start: FrameBound::UnboundedPreceding,
            end: None,
        }
    }

    pub fn full() -> Self {
        Self::rows(None, None)
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "ROWS BETWEEN {} AND {end}", self.start),
            None => write!(f, "ROWS {}", self.start),
        }
    }
}

/// A WHEN branch for CASE
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub cond: Expression,
    pub then: Expression,
}

/// This is the output type of translation: a host AST goes in, a SQL AST
///  comes out.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Formatted by the dialect at print time.
    Literal(Literal),
    Identifier {
        qualifier: Option<String>,
        name: String,
    },
    Star,
    List(Vec<Expression>),
    FunctionCall {
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    BinaryOperator(Box<Expression>, BinaryOp, Box<Expression>),
    UnaryOperator(UnaryOp, Box<Expression>),
    IsNull(Box<Expression>),
    Between {
        expr: Box<Expression>,
        low: Box<Expression>,
        high: Box<Expression>,
    },
    In {
        expr: Box<Expression>,
        list: Box<Expression>,
    },
    Case {
        branches: Vec<When>,
        r#else: Option<Box<Expression>>,
    },
    Cast(Box<Expression>, &'static str),
    Window {
        function: Box<Expression>,
        partition: Vec<Expression>,
        order: Vec<Expression>,
        frame: Option<Frame>,
    },
    WithinGroup {
        function: Box<Expression>,
        order: Vec<Expression>,
    },
    Desc(Box<Expression>),
    Raw(Sql),
}

impl Expression {
    pub fn ident(name: impl Into<String>) -> Self {
        Expression::Identifier {
            qualifier: None,
            name: name.into(),
        }
    }

    pub fn qualified(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        Expression::Identifier {
            qualifier: Some(qualifier.into()),
            name: name.into(),
        }
    }

    pub fn call(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name: name.into(),
            args,
            distinct: false,
        }
    }

    pub fn binary(l: Expression, op: BinaryOp, r: Expression) -> Self {
        Expression::BinaryOperator(Box::new(l), op, Box::new(r))
    }

    /// Whether the tree contains an `OVER` clause.
    pub fn is_windowed(&self) -> bool {
        match self {
            Expression::Window { .. } => true,
            Expression::FunctionCall { args, .. } | Expression::List(args) => {
                args.iter().any(Expression::is_windowed)
            }
            Expression::BinaryOperator(l, _, r) => l.is_windowed() || r.is_windowed(),
            Expression::UnaryOperator(_, e)
            | Expression::IsNull(e)
            | Expression::Cast(e, _)
            | Expression::Desc(e) => e.is_windowed(),
            Expression::Between { expr, low, high } => {
                expr.is_windowed() || low.is_windowed() || high.is_windowed()
            }
            Expression::In { expr, list } => expr.is_windowed() || list.is_windowed(),
            Expression::Case { branches, r#else } => {
                branches
                    .iter()
                    .any(|w| w.cond.is_windowed() || w.then.is_windowed())
                    || r#else.as_ref().is_some_and(|e| e.is_windowed())
            }
            Expression::WithinGroup { function, order } => {
                function.is_windowed() || order.iter().any(Expression::is_windowed)
            }
            Expression::Literal(_)
            | Expression::Identifier { .. }
            | Expression::Star
            | Expression::Raw(_) => false,
        }
    }

    /// Rebuilds the tree top-down. `f` either replaces a node outright
    ///  (`Break`) or hands it back to have its children visited (`Continue`).
    pub fn transform<F>(self, f: &mut F) -> Expression
    where
        F: FnMut(Expression) -> ControlFlow<Expression, Expression>,
    {
        let node = match f(self) {
            ControlFlow::Break(done) => return done,
            ControlFlow::Continue(node) => node,
        };
        let each = |items: Vec<Expression>, f: &mut F| -> Vec<Expression> {
            items.into_iter().map(|e| e.transform(f)).collect()
        };
        match node {
            Expression::List(items) => Expression::List(each(items, f)),
            Expression::FunctionCall {
                name,
                args,
                distinct,
            } => Expression::FunctionCall {
                name,
                args: each(args, f),
                distinct,
            },
            Expression::BinaryOperator(l, op, r) => {
                Expression::BinaryOperator(boxed(l, f), op, boxed(r, f))
            }
            Expression::UnaryOperator(op, e) => Expression::UnaryOperator(op, boxed(e, f)),
            Expression::IsNull(e) => Expression::IsNull(boxed(e, f)),
            Expression::Between { expr, low, high } => Expression::Between {
                expr: boxed(expr, f),
                low: boxed(low, f),
                high: boxed(high, f),
            },
            Expression::In { expr, list } => Expression::In {
                expr: boxed(expr, f),
                list: boxed(list, f),
            },
            Expression::Case { branches, r#else } => Expression::Case {
                branches: branches
                    .into_iter()
                    .map(|w| When {
                        cond: w.cond.transform(f),
                        then: w.then.transform(f),
                    })
                    .collect(),
                r#else: r#else.map(|e| boxed(e, f)),
            },
            Expression::Cast(e, to) => Expression::Cast(boxed(e, f), to),
            Expression::Window {
                function,
                partition,
                order,
                frame,
            } => Expression::Window {
                function: boxed(function, f),
                partition: each(partition, f),
                order: each(order, f),
                frame,
            },
            Expression::WithinGroup { function, order } => Expression::WithinGroup {
                function: boxed(function, f),
                order: each(order, f),
            },
            Expression::Desc(e) => Expression::Desc(boxed(e, f)),
            leaf @ (Expression::Literal(_)
            | Expression::Identifier { .. }
            | Expression::Star
            | Expression::Raw(_)) => leaf,
        }
    }

    /// Names of the unqualified column references in the tree.
    pub fn column_references(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.clone().transform(&mut |e| {
            if let Expression::Identifier {
                qualifier: None,
                name,
            } = &e
            {
                names.push(name.clone());
            }
            ControlFlow::Continue(e)
        });
        names
    }
}

fn boxed<F>(e: Box<Expression>, f: &mut F) -> Box<Expression>
where
    F: FnMut(Expression) -> ControlFlow<Expression, Expression>,
{
    Box::new(e.transform(f))
}

/// Everything a translation needs to know about where the expression sits.
///  Cloned per call, never shared mutably.
#[derive(Debug, Clone)]
pub struct TranslationContext<'a> {
    pub dialect: &'a Dialect,
    pub group_by: Vec<String>,
    /// Host ordering terms; `desc()` is allowed.
    pub order_by: Vec<ast::Expression>,
    pub frame: Option<Frame>,
    /// Aggregates render as window functions over the groups.
    pub windowed: bool,
    /// Unknown functions are errors instead of passthrough.
    pub strict: bool,
}

impl<'a> TranslationContext<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self {
            dialect,
            group_by: Vec::new(),
            order_by: Vec::new(),
            frame: None,
            windowed: false,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TranslateOptions {
    pub strict: bool,
    pub windowed: bool,
    pub group_by: Vec<String>,
    pub order_by: Vec<ast::Expression>,
    pub frame: Option<Frame>,
    /// Remote column names; they shadow local bindings.
    pub columns: Vec<String>,
    pub env: Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Translation {
    pub sql: Sql,
    pub warnings: Vec<Warning>,
}

/// Partially evaluates `expr` against the options' scope, then translates the
///  remainder for `dialect`.
pub fn translate(
    expr: &ast::Expression,
    dialect: &Dialect,
    options: &TranslateOptions,
) -> Result<Translation> {
    let scope = Scope::new(&options.columns, &options.env);
    let expr = partial_eval(expr, &scope)?;
    let translator = Translator::new(TranslationContext {
        dialect,
        group_by: options.group_by.clone(),
        order_by: options.order_by.clone(),
        frame: options.frame,
        windowed: options.windowed,
        strict: options.strict,
    });
    let tree = translator.translate_expr(&expr)?;
    let sql = Sql::raw(Printer::new(&tree, PrinterConfig::new(dialect)).to_string());
    let warnings = translator.into_warnings();
    for w in &warnings {
        log::warn!("{w}");
    }
    log::debug!("translated `{expr}` to {sql}");
    Ok(Translation { sql, warnings })
}

static FUNCTION_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
        .unwrap_or_else(|e| panic!("function name pattern: {e}"))
});

type Args<'e> = Vec<Option<&'e ast::Expression>>;
type Keywords<'e> = IndexMap<&'e str, &'e ast::Expression>;

/// Translates one host tree. Warnings collect locally and are handed back
///  with [`Translator::into_warnings`].
pub struct Translator<'a> {
    cx: TranslationContext<'a>,
    warnings: RefCell<Vec<Warning>>,
}

impl<'a> Translator<'a> {
    pub fn new(cx: TranslationContext<'a>) -> Self {
        Self {
            cx,
            warnings: RefCell::new(Vec::new()),
        }
    }

    pub fn context(&self) -> &TranslationContext<'a> {
        &self.cx
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings.into_inner()
    }

    fn warn(&self, warning: Warning) {
        self.warnings.borrow_mut().push(warning);
    }

    /// Translates an already partially evaluated host tree.
    pub fn translate_expr(&self, source: &ast::Expression) -> Result<Expression> {
        match source {
            ast::Expression::Literal(lit) => Ok(Expression::Literal(lit.clone())),
            ast::Expression::Vector(items) => Ok(Expression::List(
                items.iter().cloned().map(Expression::Literal).collect(),
            )),
            ast::Expression::Symbol(name) => Ok(Expression::ident(name)),
            ast::Expression::Call(call) => self.translate_call(source, call),
        }
    }

    /// Translates the context's ordering terms.
    pub fn order_terms(&self) -> Result<Vec<Expression>> {
        self.cx
            .order_by
            .iter()
            .map(|o| self.translate_expr(o))
            .collect()
    }

    fn partition(&self) -> Vec<Expression> {
        self.cx.group_by.iter().map(Expression::ident).collect()
    }

    fn translate_call(&self, source: &ast::Expression, call: &ast::Call) -> Result<Expression> {
        let Some(rules) = self.cx.dialect.rules_for(&call.name) else {
            return self.passthrough(call);
        };
        let (rule, args, keywords) = self.resolve(call, rules)?;
        self.apply(source, call, rule, args, keywords)
    }

    /// Unknown functions are emitted as written.
    fn passthrough(&self, call: &ast::Call) -> Result<Expression> {
        if self.cx.strict {
            return Err(Error::UnknownFunction(call.name.clone()));
        }
        if !FUNCTION_NAME.is_match(&call.name) {
            return Err(Error::InvalidFunctionName(call.name.clone()));
        }
        let args = call
            .args
            .iter()
            .chain(call.named.values())
            .map(|a| self.translate_expr(a))
            .collect::<Result<Vec<_>>>()?;
        Ok(Expression::call(call.name.clone(), args))
    }

    /// Picks the first rule whose arity accepts the call once named arguments
    ///  are placed into their positional slots.
    fn resolve<'r, 'e>(
        &self,
        call: &'e ast::Call,
        rules: &'r [Rule],
    ) -> Result<(&'r Rule, Args<'e>, Keywords<'e>)> {
        let mut first_count = None;
        for rule in rules {
            let (args, keywords, ignored) = place_arguments(call, rule);
            let count = args.len();
            first_count.get_or_insert(count);
            if rule.arity.accepts(count) {
                for argument in ignored {
                    self.warn(Warning::NamedArgumentIgnored {
                        function: call.name.clone(),
                        argument: argument.to_string(),
                    });
                }
                return Ok((rule, args, keywords));
            }
        }
        Err(Error::ArityMismatch {
            function: call.name.clone(),
            expected: Expected(rules.iter().map(|r| r.arity).collect()),
            actual: first_count.unwrap_or(call.args.len()),
        })
    }

    fn apply(
        &self,
        source: &ast::Expression,
        call: &ast::Call,
        rule: &Rule,
        args: Args,
        keywords: Keywords,
    ) -> Result<Expression> {
        let name = call.name.as_str();
        let nth = |i: usize| -> Result<&ast::Expression> {
            args.get(i)
                .copied()
                .flatten()
                .ok_or_else(|| Error::invalid_argument(name, i + 1, "is missing"))
        };
        let tr = |i: usize| -> Result<Expression> { self.translate_expr(nth(i)?) };
        let optional = |i: usize| -> Result<Option<Expression>> {
            args.get(i)
                .copied()
                .flatten()
                .map(|a| self.translate_expr(a))
                .transpose()
        };

        match rule.kind {
            RuleKind::Infix(op) => Ok(Expression::binary(tr(0)?, op, tr(1)?)),
            RuleKind::Not => Ok(Expression::UnaryOperator(UnaryOp::Not, Box::new(tr(0)?))),
            RuleKind::Negate => Ok(match tr(0)? {
                Expression::Literal(Literal::Integer(Some(i))) if i != i64::MIN => {
                    Expression::Literal(Literal::Integer(Some(-i)))
                }
                Expression::Literal(Literal::Double(Some(d))) => {
                    Expression::Literal(Literal::Double(Some(-d)))
                }
                other => Expression::UnaryOperator(UnaryOp::Neg, Box::new(other)),
            }),
            RuleKind::Identity => tr(0),
            RuleKind::Scalar(sql_name) => Ok(Expression::call(sql_name, self.all(name, &args)?)),
            RuleKind::Aggregate(sql_name) => {
                self.aggregate(Expression::call(sql_name, vec![tr(0)?]))
            }
            RuleKind::CountAll => self.aggregate(Expression::call("COUNT", vec![Expression::Star])),
            RuleKind::CountDistinct => self.aggregate(Expression::FunctionCall {
                name: "COUNT".into(),
                args: vec![tr(0)?],
                distinct: true,
            }),
            RuleKind::Median => self.aggregate(Expression::WithinGroup {
                function: Box::new(Expression::call(
                    "PERCENTILE_CONT",
                    vec![Expression::Literal(Literal::Double(Some(0.5)))],
                )),
                order: vec![tr(0)?],
            }),
            RuleKind::Cumulative(sql_name) => self.window(
                source,
                Expression::call(sql_name, vec![tr(0)?]),
                self.order_terms()?,
                Some(self.cx.frame.unwrap_or_else(Frame::cumulative)),
            ),
            RuleKind::CumulativeProduct => {
                let logs = Expression::call("SUM", vec![Expression::call("LN", vec![tr(0)?])]);
                let window = self.window(
                    source,
                    logs,
                    self.order_terms()?,
                    Some(self.cx.frame.unwrap_or_else(Frame::cumulative)),
                )?;
                Ok(Expression::call("EXP", vec![window]))
            }
            RuleKind::Ranking(sql_name) => {
                let order = match optional(0)? {
                    Some(by) => vec![by],
                    None => self.order_terms()?,
                };
                self.window(source, Expression::call(sql_name, vec![]), order, None)
            }
            RuleKind::Ntile => {
                let n = match nth(1)? {
                    ast::Expression::Literal(lit) => lit
                        .as_f64()
                        .filter(|n| n.is_finite())
                        .map(f64::round)
                        .filter(|n| *n >= 1.0)
                        .map(|n| n as i64)
                        .ok_or_else(|| {
                            Error::invalid_argument(name, 2, "must be a positive number")
                        })?,
                    _ => {
                        return Err(Error::invalid_argument(name, 2, "must be a literal number"));
                    }
                };
                let order = match optional(0)? {
                    Some(by) => vec![by],
                    None => self.order_terms()?,
                };
                let function =
                    Expression::call("NTILE", vec![Expression::Literal(Literal::Integer(Some(n)))]);
                self.window(source, function, order, None)
            }
            RuleKind::Offset(sql_name) => {
                let mut fn_args = vec![tr(0)?];
                let default = optional(2)?;
                match optional(1)? {
                    Some(n) => fn_args.push(whole_number(n)),
                    None if default.is_some() => {
                        fn_args.push(Expression::Literal(Literal::Integer(Some(1))))
                    }
                    None => {}
                }
                fn_args.extend(default);
                let order = self.keyword_order(&keywords)?;
                self.window(source, Expression::call(sql_name, fn_args), order, None)
            }
            RuleKind::Positional(sql_name) => {
                let mut fn_args = vec![tr(0)?];
                if let Some(n) = optional(1)? {
                    fn_args.push(whole_number(n));
                }
                let frame = match sql_name {
                    "FIRST_VALUE" => self.cx.frame,
                    _ => Some(self.cx.frame.unwrap_or_else(Frame::full)),
                };
                let order = self.keyword_order(&keywords)?;
                self.window(source, Expression::call(sql_name, fn_args), order, frame)
            }
            RuleKind::Cast(to) => Ok(Expression::Cast(
                Box::new(tr(0)?),
                self.cx.dialect.cast_type(to),
            )),
            RuleKind::Conditional => Ok(Expression::Case {
                branches: vec![When {
                    cond: tr(0)?,
                    then: tr(1)?,
                }],
                r#else: optional(2)?.map(Box::new),
            }),
            RuleKind::CaseWhen => self.case_when(call, &args, &keywords),
            RuleKind::Between => Ok(Expression::Between {
                expr: Box::new(tr(0)?),
                low: Box::new(tr(1)?),
                high: Box::new(tr(2)?),
            }),
            RuleKind::In => {
                let expr = tr(0)?;
                let list = match tr(1)? {
                    Expression::List(items) if items.is_empty() => {
                        return Ok(Expression::Literal(Literal::Logical(Some(false))));
                    }
                    list @ (Expression::List(_)
                    | Expression::Identifier { .. }
                    | Expression::Raw(_)) => list,
                    single => Expression::List(vec![single]),
                };
                Ok(Expression::In {
                    expr: Box::new(expr),
                    list: Box::new(list),
                })
            }
            RuleKind::IsNull => Ok(Expression::IsNull(Box::new(tr(0)?))),
            RuleKind::Modulo => {
                let double_operand = [nth(0)?, nth(1)?]
                    .iter()
                    .any(|a| matches!(a, ast::Expression::Literal(Literal::Double(_))));
                let (l, r) = (tr(0)?, tr(1)?);
                match self.cx.dialect.modulo_function() {
                    Some(f) if double_operand => Ok(Expression::call(f, vec![l, r])),
                    _ => Ok(Expression::binary(l, BinaryOp::Mod, r)),
                }
            }
            RuleKind::IntegerDivide => Ok(Expression::call(
                "FLOOR",
                vec![Expression::binary(tr(0)?, BinaryOp::Div, tr(1)?)],
            )),
            RuleKind::Power => Ok(Expression::call("POWER", vec![tr(0)?, tr(1)?])),
            RuleKind::LogBase(style) => {
                let (x, base) = (tr(0)?, tr(1)?);
                Ok(match style {
                    LogStyle::BaseFirst => Expression::call("LOG", vec![base, x]),
                    LogStyle::BaseLast => Expression::call("LOG", vec![x, base]),
                    LogStyle::Rewrite => Expression::binary(
                        Expression::call("LN", vec![x]),
                        BinaryOp::Div,
                        Expression::call("LN", vec![base]),
                    ),
                })
            }
            RuleKind::Regex(token) => {
                let (pattern, x) = (tr(0)?, tr(1)?);
                Ok(Expression::binary(x, BinaryOp::Custom(token), pattern))
            }
            RuleKind::Combine => Ok(Expression::List(self.all(name, &args)?)),
            RuleKind::Desc => Ok(Expression::Desc(Box::new(tr(0)?))),
            RuleKind::Raw => match nth(0)? {
                ast::Expression::Literal(Literal::String(Some(text))) => {
                    Ok(Expression::Raw(Sql::raw(text.clone())))
                }
                _ => Err(Error::invalid_argument(name, 1, "must be a string literal")),
            },
            RuleKind::Substr(sql_name) => {
                let (x, start, stop) = (tr(0)?, tr(1)?, tr(2)?);
                let length = match (nth(1)?.as_literal(), nth(2)?.as_literal()) {
                    (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
                        (Some(a), Some(b)) => Expression::Literal(Literal::Integer(Some(
                            (b - a + 1.0).max(0.0) as i64,
                        ))),
                        _ => return Err(Error::invalid_argument(name, 2, "must be a number")),
                    },
                    _ => Expression::binary(
                        Expression::binary(stop, BinaryOp::Sub, start.clone()),
                        BinaryOp::Add,
                        Expression::Literal(Literal::Integer(Some(1))),
                    ),
                };
                Ok(Expression::call(sql_name, vec![x, whole_number(start), length]))
            }
            RuleKind::Round => {
                let mut fn_args = vec![tr(0)?];
                if let Some(digits) = optional(1)? {
                    fn_args.push(whole_number(digits));
                }
                Ok(Expression::call("ROUND", fn_args))
            }
            RuleKind::Paste { sep, style } => {
                let sep = match keywords.get("sep") {
                    Some(ast::Expression::Literal(Literal::String(Some(s)))) => s.as_str(),
                    Some(_) => {
                        return Err(Error::invalid_argument(
                            name,
                            args.len() + 1,
                            "`sep` must be a string literal",
                        ));
                    }
                    None => sep,
                };
                let parts = self.all(name, &args)?;
                Ok(paste(parts, sep, style))
            }
            RuleKind::Unsupported(feature) => Err(self.cx.dialect.unsupported(feature)),
        }
    }

    fn all(&self, function: &str, args: &Args) -> Result<Vec<Expression>> {
        args.iter()
            .enumerate()
            .map(|(i, a)| match a {
                Some(a) => self.translate_expr(a),
                None => Err(Error::invalid_argument(function, i + 1, "is missing")),
            })
            .collect()
    }

    fn keyword_order(&self, keywords: &Keywords) -> Result<Vec<Expression>> {
        match keywords.get("order_by") {
            Some(by) => Ok(vec![self.translate_expr(by)?]),
            None => self.order_terms(),
        }
    }

    /// Aggregates are plain calls unless the context is windowed. Ordering is
    ///  irrelevant to an aggregate unless a frame is set.
    fn aggregate(&self, function: Expression) -> Result<Expression> {
        if !self.cx.windowed {
            return Ok(function);
        }
        if !self.cx.dialect.supports_windows() {
            return Err(self.cx.dialect.unsupported("window functions"));
        }
        let order = match self.cx.frame {
            Some(_) => self.order_terms()?,
            None => Vec::new(),
        };
        Ok(Expression::Window {
            function: Box::new(function),
            partition: self.partition(),
            order,
            frame: self.cx.frame,
        })
    }

    fn window(
        &self,
        source: &ast::Expression,
        function: Expression,
        order: Vec<Expression>,
        frame: Option<Frame>,
    ) -> Result<Expression> {
        if !self.cx.dialect.supports_windows() {
            return Err(self.cx.dialect.unsupported("window functions"));
        }
        if order.is_empty() {
            self.warn(Warning::MissingWindowOrder {
                expression: source.to_string(),
            });
        }
        Ok(Expression::Window {
            function: Box::new(function),
            partition: self.partition(),
            order,
            frame,
        })
    }

    fn case_when(&self, call: &ast::Call, args: &Args, keywords: &Keywords) -> Result<Expression> {
        let mut branches = Vec::new();
        let mut r#else = None;
        for (i, arg) in args.iter().enumerate() {
            let formula = arg
                .and_then(|a| a.as_call())
                .filter(|c| c.name == "~" && c.args.len() == 2)
                .ok_or_else(|| {
                    Error::invalid_argument(&call.name, i + 1, "must be a two-sided formula")
                })?;
            let (lhs, rhs) = (&formula.args[0], &formula.args[1]);
            if matches!(lhs, ast::Expression::Literal(Literal::Logical(Some(true)))) {
                r#else = Some(Box::new(self.translate_expr(rhs)?));
                break;
            }
            branches.push(When {
                cond: self.translate_expr(lhs)?,
                then: self.translate_expr(rhs)?,
            });
        }
        if let Some(default) = keywords.get(".default") {
            r#else = Some(Box::new(self.translate_expr(default)?));
        }
        if branches.is_empty() {
            return Err(Error::invalid_argument(
                &call.name,
                1,
                "needs at least one condition",
            ));
        }
        Ok(Expression::Case { branches, r#else })
    }
}

/// Places named arguments into the rule's positional slots. Returns the
///  slots (trailing gaps trimmed), the rule's keyword arguments and the names
///  that matched nothing.
fn place_arguments<'e>(call: &'e ast::Call, rule: &Rule) -> (Args<'e>, Keywords<'e>, Vec<&'e str>) {
    let mut keywords = IndexMap::new();
    let mut ignored = Vec::new();
    let mut by_name: IndexMap<usize, &'e ast::Expression> = IndexMap::new();
    let mut appended = Vec::new();
    for (key, value) in &call.named {
        if rule.keywords.contains(&key.as_str()) {
            keywords.insert(key.as_str(), value);
        } else if let Some(p) = rule.params.iter().position(|p| p == key) {
            by_name.insert(p, value);
        } else if rule.kind == RuleKind::Combine {
            appended.push(value);
        } else {
            ignored.push(key.as_str());
        }
    }

    let mut positional = call.args.iter();
    let mut slots: Args<'e> = Vec::new();
    let mut i = 0;
    loop {
        if let Some(value) = by_name.get(&i) {
            slots.push(Some(*value));
        } else if let Some(value) = positional.next() {
            slots.push(Some(value));
        } else if by_name.keys().any(|&p| p > i) {
            slots.push(None);
        } else {
            break;
        }
        i += 1;
    }
    slots.extend(appended.into_iter().map(Some));
    while slots.last().is_some_and(Option::is_none) {
        slots.pop();
    }
    (slots, keywords, ignored)
}

/// Whole double literals become integers (`lag(x, 2)` not `LAG(x, 2.0)`).
fn whole_number(e: Expression) -> Expression {
    match e {
        Expression::Literal(Literal::Double(Some(d))) if d.fract() == 0.0 && d.abs() < 1e15 => {
            Expression::Literal(Literal::Integer(Some(d as i64)))
        }
        other => other,
    }
}

fn paste(parts: Vec<Expression>, sep: &str, style: ConcatStyle) -> Expression {
    let separator = || Expression::Literal(Literal::String(Some(sep.to_string())));
    match style {
        ConcatStyle::ConcatWs if sep.is_empty() => Expression::call("CONCAT", parts),
        ConcatStyle::ConcatWs => {
            let mut args = vec![separator()];
            args.extend(parts);
            Expression::call("CONCAT_WS", args)
        }
        ConcatStyle::Operator => {
            let mut parts = parts.into_iter();
            let Some(first) = parts.next() else {
                return Expression::Literal(Literal::String(Some(String::new())));
            };
            parts.fold(first, |acc, part| {
                let acc = if sep.is_empty() {
                    acc
                } else {
                    Expression::binary(acc, BinaryOp::Concat, separator())
                };
                Expression::binary(acc, BinaryOp::Concat, part)
            })
        }
    }
}
