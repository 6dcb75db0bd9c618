//! Partial evaluation: everything that can be computed from local bindings is
//!  computed here, before translation, so the SQL only carries what the
//!  backend has to do.

use chrono::{Local, NaiveDate, NaiveDateTime};
use indexmap::IndexMap;
use regex::Regex;

use crate::ast::{Call, Expression, Kind, Literal};
use crate::error::{Error, Result};

/// A local value. Scalars are length-one atomic vectors.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Atomic(Vec<Literal>),
    List(IndexMap<String, Value>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Null,
}

impl Value {
    pub fn len(&self) -> usize {
        match self {
            Value::Atomic(v) => v.len(),
            Value::List(m) => m.len(),
            Value::Date(_) | Value::DateTime(_) => 1,
            Value::Null => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The literal form of the value as it should appear in SQL. Dates become
    ///  ISO-8601 strings.
    pub fn to_expression(&self) -> std::result::Result<Expression, String> {
        match self {
            Value::Atomic(v) => match v.as_slice() {
                [single] => Ok(Expression::Literal(single.clone())),
                _ => Ok(Expression::Vector(v.clone())),
            },
            Value::Date(d) => Ok(Expression::Literal(Literal::String(Some(
                d.format("%Y-%m-%d").to_string(),
            )))),
            Value::DateTime(t) => Ok(Expression::Literal(Literal::String(Some(
                t.format("%Y-%m-%d %H:%M:%S").to_string(),
            )))),
            Value::Null => Ok(Expression::Literal(Literal::Null)),
            Value::List(_) => Err("a list cannot be translated to SQL".to_string()),
        }
    }
}

impl From<Literal> for Value {
    fn from(lit: Literal) -> Self {
        match lit {
            Literal::Null => Value::Null,
            lit => Value::Atomic(vec![lit]),
        }
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Atomic(vec![Literal::Integer(Some(v))])
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Atomic(vec![Literal::Double(Some(v))])
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Atomic(vec![Literal::Logical(Some(v))])
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Atomic(vec![Literal::String(Some(v.to_string()))])
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Atomic(vec![Literal::String(Some(v))])
    }
}
impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::Atomic(v.into_iter().map(|i| Literal::Integer(Some(i))).collect())
    }
}
impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Atomic(v.into_iter().map(|d| Literal::Double(Some(d))).collect())
    }
}
impl From<Vec<&str>> for Value {
    fn from(v: Vec<&str>) -> Self {
        Value::Atomic(
            v.into_iter()
                .map(|s| Literal::String(Some(s.to_string())))
                .collect(),
        )
    }
}
impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}
impl From<IndexMap<String, Value>> for Value {
    fn from(v: IndexMap<String, Value>) -> Self {
        Value::List(v)
    }
}

/// Local bindings visible to an expression.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    bindings: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Which names are remote columns and which are local bindings. Remote
///  columns shadow local bindings of the same name.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    columns: &'a [String],
    env: &'a Environment,
}

impl<'a> Scope<'a> {
    pub fn new(columns: &'a [String], env: &'a Environment) -> Self {
        Self { columns, env }
    }

    fn is_remote(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

// Subsetting, namespace and sequence forms never reach the backend.
const ALWAYS_LOCAL: &[&str] = &["$", "[[", "[", "::", ":::", ":", "Sys.Date", "Sys.time"];

// Calls that are meaningful only on the remote side, even over local values.
const MUST_STAY_REMOTE: &[&str] = &[
    "sql",
    "desc",
    "n",
    "n_distinct",
    "case_when",
    "~",
    "row_number",
    "min_rank",
    "rank",
    "dense_rank",
    "percent_rank",
    "cume_dist",
    "ntile",
    "lead",
    "lag",
    "first",
    "last",
    "nth",
    "cumsum",
    "cummean",
    "cummin",
    "cummax",
    "cumprod",
    "cumall",
    "cumany",
];

// Longest vector a local sequence may produce.
const MAX_LOCAL_LEN: usize = 10_000_000;

/// Folds every locally computable part of `expr`.
///
/// A call is folded when all of its arguments are local and its subtree
///  referenced a local binding; calls over literals alone are pushed as
///  written. Symbols that are neither remote nor local are left alone and
///  assumed to be columns.
pub fn partial_eval(expr: &Expression, scope: &Scope) -> Result<Expression> {
    Evaluator { scope }.walk(expr)?.into_expression()
}

struct Partial {
    expr: Expression,
    value: Option<Value>,
    touched: bool,
}

impl Partial {
    fn remote(expr: Expression, touched: bool) -> Self {
        Self {
            expr,
            value: None,
            touched,
        }
    }

    fn local(expr: &Expression, value: Value) -> Self {
        Self {
            expr: expr.clone(),
            value: Some(value),
            touched: true,
        }
    }

    fn into_expression(self) -> Result<Expression> {
        match self.value {
            Some(value) if self.touched => value
                .to_expression()
                .map_err(|reason| Error::local(&self.expr, reason)),
            _ => Ok(self.expr),
        }
    }
}

struct Evaluator<'a> {
    scope: &'a Scope<'a>,
}

impl Evaluator<'_> {
    fn walk(&self, expr: &Expression) -> Result<Partial> {
        match expr {
            Expression::Literal(lit) => Ok(Partial {
                expr: expr.clone(),
                value: Some(Value::from(lit.clone())),
                touched: false,
            }),
            Expression::Vector(items) => Ok(Partial {
                expr: expr.clone(),
                value: Some(Value::Atomic(items.clone())),
                touched: false,
            }),
            Expression::Symbol(name) => {
                if self.scope.is_remote(name) {
                    return Ok(Partial::remote(expr.clone(), false));
                }
                match self.scope.env.get(name) {
                    Some(value) => {
                        log::trace!("binding `{name}` resolved locally");
                        Ok(Partial::local(expr, value.clone()))
                    }
                    None => Ok(Partial::remote(expr.clone(), false)),
                }
            }
            Expression::Call(call) => self.walk_call(expr, call),
        }
    }

    fn walk_call(&self, expr: &Expression, call: &Call) -> Result<Partial> {
        if let Some(partial) = self.pronoun(expr, call)? {
            return Ok(partial);
        }
        if ALWAYS_LOCAL.contains(&call.name.as_str()) {
            let value = self.eval_local(expr)?;
            log::trace!("evaluated `{expr}` locally");
            return Ok(Partial::local(expr, value));
        }

        let args = call
            .args
            .iter()
            .map(|a| self.walk(a))
            .collect::<Result<Vec<_>>>()?;
        let named = call
            .named
            .iter()
            .map(|(k, v)| Ok((k.clone(), self.walk(v)?)))
            .collect::<Result<IndexMap<_, _>>>()?;

        let touched = args.iter().chain(named.values()).any(|p| p.touched);
        let all_local = args.iter().chain(named.values()).all(|p| p.value.is_some());

        if all_local && !MUST_STAY_REMOTE.contains(&call.name.as_str()) {
            let values: Vec<Value> = args.iter().filter_map(|p| p.value.clone()).collect();
            let named_values: IndexMap<String, Value> = named
                .iter()
                .filter_map(|(k, p)| p.value.clone().map(|v| (k.clone(), v)))
                .collect();
            let result = call_local(&call.name, &values, &named_values);
            if touched {
                let value = result.map_err(|reason| Error::local(expr, reason))?;
                log::trace!("folded `{expr}` locally");
                return Ok(Partial::local(expr, value));
            }
            // Literal-only calls stay as written but keep their value, so
            //  an enclosing call over a local binding can still fold.
            if let Ok(value) = result {
                return Ok(Partial {
                    expr: expr.clone(),
                    value: Some(value),
                    touched: false,
                });
            }
        }

        let rebuilt = Call {
            name: call.name.clone(),
            args: args
                .into_iter()
                .map(Partial::into_expression)
                .collect::<Result<_>>()?,
            named: named
                .into_iter()
                .map(|(k, p)| Ok((k, p.into_expression()?)))
                .collect::<Result<_>>()?,
        };
        Ok(Partial::remote(Expression::Call(rebuilt), touched))
    }

    /// `.data$x` names the remote column `x`; `.env$x` forces a local lookup.
    fn pronoun(&self, expr: &Expression, call: &Call) -> Result<Option<Partial>> {
        let (pronoun, member) = match (call.name.as_str(), call.args.as_slice()) {
            ("$" | "[[", [Expression::Symbol(p), member]) if p == ".data" || p == ".env" => {
                (p.as_str(), member)
            }
            _ => return Ok(None),
        };
        let name = match member {
            Expression::Symbol(name) => name.clone(),
            Expression::Literal(Literal::String(Some(name))) => name.clone(),
            other => match self.eval_local(other)? {
                Value::Atomic(v) => match v.as_slice() {
                    [Literal::String(Some(name))] => name.clone(),
                    _ => return Err(Error::local(expr, "subscript must be a single string")),
                },
                _ => return Err(Error::local(expr, "subscript must be a single string")),
            },
        };
        if pronoun == ".data" {
            return Ok(Some(Partial::remote(Expression::Symbol(name), false)));
        }
        match self.scope.env.get(&name) {
            Some(value) => Ok(Some(Partial::local(expr, value.clone()))),
            None => Err(Error::local(expr, format!("object '{name}' not found"))),
        }
    }

    fn lookup(&self, name: &str) -> std::result::Result<Value, String> {
        if let Some(value) = self.scope.env.get(name) {
            return Ok(value.clone());
        }
        if self.scope.is_remote(name) {
            Err(format!("`{name}` is a remote column and cannot be used locally"))
        } else {
            Err(format!("object '{name}' not found"))
        }
    }

    /// Evaluates `expr` entirely in local scope.
    fn eval_local(&self, expr: &Expression) -> Result<Value> {
        match expr {
            Expression::Literal(lit) => Ok(Value::from(lit.clone())),
            Expression::Vector(items) => Ok(Value::Atomic(items.clone())),
            Expression::Symbol(name) => self.lookup(name).map_err(|r| Error::local(expr, r)),
            Expression::Call(call) => match (call.name.as_str(), call.args.as_slice()) {
                ("$" | "[[", [Expression::Symbol(p), _]) if p == ".env" || p == ".data" => {
                    match self.pronoun(expr, call)? {
                        Some(Partial {
                            value: Some(value), ..
                        }) => Ok(value),
                        _ => Err(Error::local(
                            expr,
                            "a remote column cannot be used in a local computation",
                        )),
                    }
                }
                ("$", [target, member]) => {
                    let target = self.eval_local(target)?;
                    let key = match member {
                        Expression::Symbol(s) => s.as_str(),
                        Expression::Literal(Literal::String(Some(s))) => s.as_str(),
                        _ => return Err(Error::local(expr, "invalid subscript type")),
                    };
                    member_of(&target, key).map_err(|r| Error::local(expr, r))
                }
                ("[[", [target, index]) => {
                    let target = self.eval_local(target)?;
                    let index = self.eval_local(index)?;
                    element_of(&target, &index).map_err(|r| Error::local(expr, r))
                }
                ("[", [target, index]) => {
                    let target = self.eval_local(target)?;
                    let index = self.eval_local(index)?;
                    subset(&target, &index).map_err(|r| Error::local(expr, r))
                }
                ("::" | ":::", [_, Expression::Symbol(name)]) => {
                    self.lookup(name).map_err(|r| Error::local(expr, r))
                }
                _ => {
                    let args = call
                        .args
                        .iter()
                        .map(|a| self.eval_local(a))
                        .collect::<Result<Vec<_>>>()?;
                    let named = call
                        .named
                        .iter()
                        .map(|(k, v)| Ok((k.clone(), self.eval_local(v)?)))
                        .collect::<Result<IndexMap<_, _>>>()?;
                    call_local(&call.name, &args, &named).map_err(|r| Error::local(expr, r))
                }
            },
        }
    }
}

type Eval<T> = std::result::Result<T, String>;

fn member_of(target: &Value, key: &str) -> Eval<Value> {
    match target {
        Value::List(m) => Ok(m.get(key).cloned().unwrap_or(Value::Null)),
        _ => Err("$ operator is invalid for atomic vectors".to_string()),
    }
}

fn index_position(index: &Value, len: usize) -> Eval<usize> {
    let i = match index {
        Value::Atomic(v) => match v.as_slice() {
            [lit] => lit.as_f64(),
            _ => None,
        },
        _ => None,
    }
    .ok_or("subscript must be a single number")?;
    if !i.is_finite() {
        return Err("subscript must be a finite number".to_string());
    }
    if i < 1.0 || i.trunc() as usize > len {
        return Err("subscript out of bounds".to_string());
    }
    Ok(i.trunc() as usize - 1)
}

fn element_of(target: &Value, index: &Value) -> Eval<Value> {
    if let Value::Atomic(v) = index {
        if let [Literal::String(Some(key))] = v.as_slice() {
            return match target {
                Value::List(m) => m
                    .get(key)
                    .cloned()
                    .ok_or_else(|| "subscript out of bounds".to_string()),
                _ => Err("subscript out of bounds".to_string()),
            };
        }
    }
    match target {
        Value::Atomic(v) => Ok(Value::from(v[index_position(index, v.len())?].clone())),
        Value::List(m) => {
            let pos = index_position(index, m.len())?;
            m.get_index(pos)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| "subscript out of bounds".to_string())
        }
        _ => Err("object is not subsettable".to_string()),
    }
}

fn subset(target: &Value, index: &Value) -> Eval<Value> {
    let items = literals(target)?;
    let mut out = Vec::new();
    for lit in literals(index)? {
        match lit {
            Literal::Logical(_) => {
                return Err("logical subscripts are not supported locally".to_string());
            }
            _ => match lit.as_f64() {
                Some(i) if i >= 1.0 => out.push(
                    items
                        .get(i.trunc() as usize - 1)
                        .cloned()
                        .unwrap_or_else(|| Literal::missing(kind_of(&items))),
                ),
                Some(_) => return Err("only positive subscripts are supported".to_string()),
                None => return Err("invalid subscript type".to_string()),
            },
        }
    }
    Ok(Value::Atomic(out))
}

fn literals(v: &Value) -> Eval<Vec<Literal>> {
    match v {
        Value::Atomic(items) => Ok(items.clone()),
        Value::Null => Ok(Vec::new()),
        Value::Date(d) => Ok(vec![Literal::String(Some(d.format("%Y-%m-%d").to_string()))]),
        Value::DateTime(t) => Ok(vec![Literal::String(Some(
            t.format("%Y-%m-%d %H:%M:%S").to_string(),
        ))]),
        Value::List(_) => Err("a list cannot be used here".to_string()),
    }
}

fn kind_of(items: &[Literal]) -> Kind {
    items.iter().map(Literal::kind).max().unwrap_or(Kind::Logical)
}

fn as_int(lit: &Literal) -> Option<i64> {
    match lit {
        Literal::Integer(v) => *v,
        Literal::Logical(v) => v.map(i64::from),
        _ => None,
    }
}

fn integer_like(items: &[Literal]) -> bool {
    items
        .iter()
        .all(|l| matches!(l, Literal::Integer(_) | Literal::Logical(_) | Literal::Null))
}

fn numeric(v: &Value, what: &str) -> Eval<Vec<Literal>> {
    let items = literals(v)?;
    if items.iter().any(|l| matches!(l, Literal::String(_))) {
        return Err(format!("non-numeric argument to {what}"));
    }
    Ok(items)
}

fn truth(lit: &Literal) -> Eval<Option<bool>> {
    match lit {
        Literal::Logical(b) => Ok(*b),
        Literal::Integer(i) => Ok(i.map(|i| i != 0)),
        Literal::Double(d) => Ok(d.filter(|d| !d.is_nan()).map(|d| d != 0.0)),
        Literal::Null => Ok(None),
        Literal::String(_) => Err("invalid 'x' type in logical operation".to_string()),
    }
}

fn scalar_truth(v: &Value) -> Eval<Option<bool>> {
    match literals(v)?.first() {
        Some(lit) => truth(lit),
        None => Err("argument is of length zero".to_string()),
    }
}

fn scalar_f64(v: &Value, what: &str) -> Eval<f64> {
    literals(v)?
        .first()
        .and_then(Literal::as_f64)
        .ok_or_else(|| format!("invalid '{what}' argument"))
}

fn scalar_string(v: &Value, what: &str) -> Eval<String> {
    literals(v)?
        .first()
        .and_then(text)
        .ok_or_else(|| format!("invalid '{what}' argument"))
}

/// The host's `as.character` rendering of one literal.
fn text(lit: &Literal) -> Option<String> {
    match lit {
        Literal::Integer(Some(i)) => Some(i.to_string()),
        Literal::Double(Some(d)) if d.is_nan() => None,
        Literal::Double(Some(d)) if d.is_infinite() => {
            Some(if *d > 0.0 { "Inf" } else { "-Inf" }.to_string())
        }
        Literal::Double(Some(d)) if d.fract() == 0.0 && d.abs() < 1e15 => {
            Some(format!("{}", *d as i64))
        }
        Literal::Double(Some(d)) => Some(d.to_string()),
        Literal::Logical(Some(b)) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Literal::String(Some(s)) => Some(s.clone()),
        _ => None,
    }
}

fn coerce(lit: &Literal, kind: Kind) -> Literal {
    match kind {
        Kind::String => Literal::String(text(lit)),
        Kind::Double => Literal::Double(lit.as_f64()),
        Kind::Integer => Literal::Integer(as_int(lit)),
        Kind::Logical => Literal::Logical(match lit {
            Literal::Logical(b) => *b,
            _ => None,
        }),
        Kind::Null => Literal::Null,
    }
}

fn recycle<'a>(
    a: &'a [Literal],
    b: &'a [Literal],
) -> impl Iterator<Item = (&'a Literal, &'a Literal)> {
    let n = if a.is_empty() || b.is_empty() {
        0
    } else {
        a.len().max(b.len())
    };
    (0..n).map(move |i| (&a[i % a.len()], &b[i % b.len()]))
}

fn overflow(op: &str) -> Option<i64> {
    log::warn!("integer overflow in `{op}`; result is NA");
    None
}

fn integer_op(op: &str, x: Option<i64>, y: Option<i64>) -> Literal {
    let (Some(x), Some(y)) = (x, y) else {
        return Literal::Integer(None);
    };
    Literal::Integer(match op {
        "+" => x.checked_add(y).or_else(|| overflow(op)),
        "-" => x.checked_sub(y).or_else(|| overflow(op)),
        "*" => x.checked_mul(y).or_else(|| overflow(op)),
        "%%" if y == 0 => None,
        // the remainder takes the sign of the divisor
        "%%" => match x.checked_rem(y) {
            Some(r) if r != 0 && (r < 0) != (y < 0) => Some(r + y),
            Some(r) => Some(r),
            None => overflow(op),
        },
        "%/%" if y == 0 => None,
        "%/%" => match (x.checked_div(y), x.checked_rem(y)) {
            (Some(q), Some(r)) if r != 0 && (x < 0) != (y < 0) => {
                q.checked_sub(1).or_else(|| overflow(op))
            }
            (Some(q), _) => Some(q),
            _ => overflow(op),
        },
        _ => None,
    })
}

fn double_op(op: &str, x: Option<f64>, y: Option<f64>) -> Literal {
    let (Some(x), Some(y)) = (x, y) else {
        return Literal::Double(None);
    };
    Literal::Double(Some(match op {
        "+" => x + y,
        "-" => x - y,
        "*" => x * y,
        "/" => x / y,
        "^" => x.powf(y),
        "%%" => x - (x / y).floor() * y,
        _ => (x / y).floor(),
    }))
}

fn arith(op: &str, l: &Value, r: &Value) -> Eval<Value> {
    let what = "binary operator";
    let (a, b) = (numeric(l, what)?, numeric(r, what)?);
    let integer = !matches!(op, "/" | "^") && integer_like(&a) && integer_like(&b);
    let out = recycle(&a, &b)
        .map(|(x, y)| {
            if integer {
                integer_op(op, as_int(x), as_int(y))
            } else {
                double_op(op, x.as_f64(), y.as_f64())
            }
        })
        .collect();
    Ok(Value::Atomic(out))
}

fn negate(v: &Value) -> Eval<Value> {
    let items = numeric(v, "unary operator")?;
    let out = items
        .iter()
        .map(|l| match l {
            Literal::Integer(_) | Literal::Logical(_) => Literal::Integer(
                as_int(l).and_then(|i| i.checked_neg().or_else(|| overflow("-"))),
            ),
            _ => Literal::Double(l.as_f64().map(|d| -d)),
        })
        .collect();
    Ok(Value::Atomic(out))
}

fn compare(op: &str, l: &Value, r: &Value) -> Eval<Value> {
    let (a, b) = (literals(l)?, literals(r)?);
    let textual = a.iter().chain(&b).any(|x| x.kind() == Kind::String);
    let out = recycle(&a, &b)
        .map(|(x, y)| {
            let ord = if textual {
                match (text(x), text(y)) {
                    (Some(x), Some(y)) => Some(x.cmp(&y)),
                    _ => None,
                }
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => None,
                }
            };
            Literal::Logical(ord.map(|o| match op {
                "==" => o.is_eq(),
                "!=" => o.is_ne(),
                "<" => o.is_lt(),
                "<=" => o.is_le(),
                ">" => o.is_gt(),
                _ => o.is_ge(),
            }))
        })
        .collect();
    Ok(Value::Atomic(out))
}

fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn logic(op: &str, l: &Value, r: &Value) -> Eval<Value> {
    let (a, b) = (literals(l)?, literals(r)?);
    let combine: fn(Option<bool>, Option<bool>) -> Option<bool> =
        if op == "&" { and3 } else { or3 };
    let out = recycle(&a, &b)
        .map(|(x, y)| Ok(Literal::Logical(combine(truth(x)?, truth(y)?))))
        .collect::<Eval<Vec<_>>>()?;
    Ok(Value::Atomic(out))
}

fn not(v: &Value) -> Eval<Value> {
    let out = literals(v)?
        .iter()
        .map(|l| Ok(Literal::Logical(truth(l)?.map(|b| !b))))
        .collect::<Eval<Vec<_>>>()?;
    Ok(Value::Atomic(out))
}

fn combine<'a>(values: impl Iterator<Item = &'a Value>) -> Eval<Value> {
    let mut items = Vec::new();
    for v in values {
        items.extend(literals(v)?.into_iter().filter(|l| *l != Literal::Null));
    }
    if items.is_empty() {
        return Ok(Value::Null);
    }
    let kind = kind_of(&items);
    Ok(Value::Atomic(items.iter().map(|l| coerce(l, kind)).collect()))
}

fn sequence(from: &Value, to: &Value) -> Eval<Value> {
    let (from, to) = (scalar_f64(from, "from")?, scalar_f64(to, "to")?);
    if !from.is_finite() || !to.is_finite() {
        return Err("NA/NaN argument".to_string());
    }
    let len = ((to - from).abs().floor() as usize).saturating_add(1);
    if len > MAX_LOCAL_LEN {
        return Err("sequence is too long to evaluate locally".to_string());
    }
    let step = if to >= from { 1.0 } else { -1.0 };
    let whole = from.fract() == 0.0 && from.abs() < 1e15;
    let out = (0..len)
        .map(|i| {
            let v = from + step * i as f64;
            if whole {
                Literal::Integer(Some(v as i64))
            } else {
                Literal::Double(Some(v))
            }
        })
        .collect();
    Ok(Value::Atomic(out))
}

fn map_double(v: &Value, f: impl Fn(f64) -> f64) -> Eval<Value> {
    let items = numeric(v, "mathematical function")?;
    Ok(Value::Atomic(
        items
            .iter()
            .map(|l| Literal::Double(l.as_f64().map(&f)))
            .collect(),
    ))
}

fn map_text(v: &Value, f: impl Fn(&str) -> Literal) -> Eval<Value> {
    Ok(Value::Atomic(
        literals(v)?
            .iter()
            .map(|l| match text(l) {
                Some(s) => f(&s),
                None => Literal::missing(Kind::String),
            })
            .collect(),
    ))
}

fn aggregate(name: &str, args: &[Value], named: &IndexMap<String, Value>) -> Eval<Value> {
    let na_rm = match named.get("na.rm") {
        Some(v) => scalar_truth(v)?.unwrap_or(false),
        None => false,
    };
    let mut items = Vec::new();
    for a in args {
        items.extend(numeric(a, &format!("{name}()"))?);
    }
    let integer = name != "mean" && integer_like(&items);
    if items.iter().any(Literal::is_missing) {
        if !na_rm {
            return Ok(Value::from(Literal::missing(if integer {
                Kind::Integer
            } else {
                Kind::Double
            })));
        }
        items.retain(|l| !l.is_missing());
    }
    let value = match name {
        "sum" if integer => items
            .iter()
            .filter_map(as_int)
            .try_fold(0i64, |acc, i| acc.checked_add(i))
            .map_or_else(|| Literal::Integer(overflow("sum")), |s| Literal::Integer(Some(s))),
        "sum" => Literal::Double(Some(items.iter().filter_map(Literal::as_f64).sum())),
        "mean" if items.is_empty() => Literal::Double(Some(f64::NAN)),
        "mean" => Literal::Double(Some(
            items.iter().filter_map(Literal::as_f64).sum::<f64>() / items.len() as f64,
        )),
        _ if items.is_empty() => {
            Literal::Double(Some(if name == "min" { f64::INFINITY } else { f64::NEG_INFINITY }))
        }
        _ if integer => {
            let ints = items.iter().filter_map(as_int);
            Literal::Integer(if name == "min" { ints.min() } else { ints.max() })
        }
        _ => {
            let doubles = items.iter().filter_map(Literal::as_f64);
            Literal::Double(Some(if name == "min" {
                doubles.fold(f64::INFINITY, f64::min)
            } else {
                doubles.fold(f64::NEG_INFINITY, f64::max)
            }))
        }
    };
    Ok(Value::from(value))
}

fn cast(name: &str, v: &Value) -> Eval<Value> {
    let items = literals(v)?;
    let out = items
        .iter()
        .map(|l| {
            let parsed = || l.as_str().and_then(|s| s.trim().parse::<f64>().ok());
            match name {
                "as.integer" => Literal::Integer(match l {
                    Literal::String(Some(_)) => parsed(),
                    _ => l.as_f64(),
                }
                .filter(|d| d.is_finite() && d.abs() < 9.2e18)
                .map(|d| d.trunc() as i64)),
                "as.numeric" | "as.double" => Literal::Double(match l {
                    Literal::String(Some(_)) => parsed(),
                    _ => l.as_f64(),
                }),
                "as.character" => Literal::String(text(l)),
                _ => Literal::Logical(match l {
                    Literal::String(Some(s)) => match s.as_str() {
                        "TRUE" | "true" | "True" | "T" => Some(true),
                        "FALSE" | "false" | "False" | "F" => Some(false),
                        _ => None,
                    },
                    other => truth(other).unwrap_or(None),
                }),
            }
        })
        .collect::<Vec<_>>();
    let introduced = out
        .iter()
        .zip(&items)
        .any(|(o, i)| o.is_missing() && !i.is_missing());
    if introduced {
        log::warn!("NAs introduced by coercion in {name}()");
    }
    Ok(Value::Atomic(out))
}

fn paste(args: &[Value], sep: &str, collapse: Option<String>) -> Eval<Value> {
    let columns = args
        .iter()
        .map(|a| {
            Ok(literals(a)?
                .iter()
                .map(|l| text(l).unwrap_or_else(|| "NA".to_string()))
                .collect::<Vec<_>>())
        })
        .collect::<Eval<Vec<_>>>()?;
    let columns: Vec<_> = columns.into_iter().filter(|c| !c.is_empty()).collect();
    let n = columns.iter().map(Vec::len).max().unwrap_or(0);
    let rows: Vec<String> = (0..n)
        .map(|i| {
            columns
                .iter()
                .map(|c| c[i % c.len()].as_str())
                .collect::<Vec<_>>()
                .join(sep)
        })
        .collect();
    Ok(match collapse {
        Some(c) => Value::from(rows.join(&c)),
        None => Value::Atomic(rows.into_iter().map(|s| Literal::String(Some(s))).collect()),
    })
}

fn regex_arg(pattern: &Value, named: &IndexMap<String, Value>) -> Eval<Regex> {
    let pattern = scalar_string(pattern, "pattern")?;
    let flag = |name: &str| match named.get(name) {
        Some(v) => scalar_truth(v).map(|b| b.unwrap_or(false)),
        None => Ok(false),
    };
    let mut source = if flag("fixed")? {
        regex::escape(&pattern)
    } else {
        pattern
    };
    if flag("ignore.case")? {
        source.insert_str(0, "(?i)");
    }
    Regex::new(&source).map_err(|e| e.to_string())
}

/// Converts `\\1` style back-references to the `${1}` form.
fn replacement(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek().copied()) {
            ('\\', Some(d)) if d.is_ascii_digit() => {
                out.push_str(&format!("${{{d}}}"));
                chars.next();
            }
            ('\\', Some('\\')) => {
                out.push('\\');
                chars.next();
            }
            ('$', _) => out.push_str("$$"),
            _ => out.push(c),
        }
    }
    out
}

fn substr(x: &Value, start: &Value, stop: &Value) -> Eval<Value> {
    let start = scalar_f64(start, "start")?;
    let stop = scalar_f64(stop, "stop")?;
    if start.is_nan() || stop.is_nan() {
        return map_text(x, |_| Literal::String(None));
    }
    let first = start.max(1.0).trunc();
    let last = stop.trunc();
    map_text(x, |s| {
        let taken = if last < first {
            String::new()
        } else {
            // float to usize casts saturate, so infinite bounds clamp
            s.chars()
                .skip(first as usize - 1)
                .take((last - first + 1.0) as usize)
                .collect()
        };
        Literal::String(Some(taken))
    })
}

fn as_date(x: &Value, named: &IndexMap<String, Value>) -> Eval<Value> {
    match x {
        Value::Date(_) => Ok(x.clone()),
        Value::DateTime(t) => Ok(Value::Date(t.date())),
        _ => match literals(x)?.as_slice() {
            [Literal::String(Some(s))] => {
                let format = match named.get("format") {
                    Some(f) => scalar_string(f, "format")?,
                    None => "%Y-%m-%d".to_string(),
                };
                NaiveDate::parse_from_str(s, &format)
                    .map(Value::Date)
                    .map_err(|e| format!("character string is not in a standard date format: {e}"))
            }
            [lit] if lit.is_numeric() => {
                let days = lit.as_f64().filter(|d| !d.is_nan()).ok_or("NA date")?;
                // day zero of the host is 1970-01-01
                (days.floor() as i64)
                    .checked_add(719_163)
                    .and_then(|n| i32::try_from(n).ok())
                    .and_then(NaiveDate::from_num_days_from_ce_opt)
                    .map(Value::Date)
                    .ok_or_else(|| "date out of range".to_string())
            }
            _ => Err("as.Date() folds only single values".to_string()),
        },
    }
}

fn if_else(test: &Value, yes: &Value, no: &Value) -> Eval<Value> {
    let (test, yes, no) = (literals(test)?, literals(yes)?, literals(no)?);
    if yes.is_empty() || no.is_empty() {
        return Err("'yes' and 'no' must not be empty".to_string());
    }
    let kind = kind_of(&yes).max(kind_of(&no));
    let out = test
        .iter()
        .enumerate()
        .map(|(i, t)| {
            Ok(match truth(t)? {
                Some(true) => coerce(&yes[i % yes.len()], kind),
                Some(false) => coerce(&no[i % no.len()], kind),
                None => Literal::missing(kind),
            })
        })
        .collect::<Eval<Vec<_>>>()?;
    Ok(Value::Atomic(out))
}

/// The local function table.
fn call_local(name: &str, args: &[Value], named: &IndexMap<String, Value>) -> Eval<Value> {
    match (name, args) {
        ("(" | "identity", [x]) => Ok(x.clone()),
        ("+", [x]) => numeric(x, "unary operator").map(Value::Atomic),
        ("-", [x]) => negate(x),
        (op @ ("+" | "-" | "*" | "/" | "^" | "%%" | "%/%"), [l, r]) => arith(op, l, r),
        (op @ ("==" | "!=" | "<" | "<=" | ">" | ">="), [l, r]) => compare(op, l, r),
        ("!", [x]) => not(x),
        (op @ ("&" | "|"), [l, r]) => logic(op, l, r),
        ("&&", [l, r]) => Ok(Value::from(Literal::Logical(and3(
            scalar_truth(l)?,
            scalar_truth(r)?,
        )))),
        ("||", [l, r]) => Ok(Value::from(Literal::Logical(or3(
            scalar_truth(l)?,
            scalar_truth(r)?,
        )))),
        ("c", _) => combine(args.iter().chain(named.values())),
        (":", [from, to]) => sequence(from, to),
        ("seq_len", [n]) => {
            let n = scalar_f64(n, "length.out")?;
            if n < 0.0 {
                return Err("argument of length 0".to_string());
            }
            if n == 0.0 {
                return Ok(Value::Atomic(Vec::new()));
            }
            sequence(&Value::from(1i64), &Value::from(n))
        }
        ("length", [x]) => Ok(Value::from(x.len() as i64)),
        ("abs", [x]) => {
            let items = numeric(x, "math function")?;
            if integer_like(&items) {
                Ok(Value::Atomic(
                    items
                        .iter()
                        .map(|l| Literal::Integer(as_int(l).and_then(i64::checked_abs)))
                        .collect(),
                ))
            } else {
                map_double(x, f64::abs)
            }
        }
        ("sqrt", [x]) => map_double(x, f64::sqrt),
        ("exp", [x]) => map_double(x, f64::exp),
        ("floor", [x]) => map_double(x, f64::floor),
        ("ceiling", [x]) => map_double(x, f64::ceil),
        ("log10", [x]) => map_double(x, f64::log10),
        ("log", [x]) => match named.get("base") {
            Some(base) => {
                let base = scalar_f64(base, "base")?;
                map_double(x, |d| d.ln() / base.ln())
            }
            None => map_double(x, f64::ln),
        },
        ("log", [x, base]) => {
            let base = scalar_f64(base, "base")?;
            map_double(x, |d| d.ln() / base.ln())
        }
        ("round", [x, ..]) if args.len() <= 2 => {
            let digits = match args.get(1).or_else(|| named.get("digits")) {
                Some(d) => scalar_f64(d, "digits")?,
                None => 0.0,
            };
            let items = numeric(x, "mathematical function")?;
            if integer_like(&items) && digits >= 0.0 {
                return Ok(x.clone());
            }
            let scale = 10f64.powi(digits as i32);
            map_double(x, |d| (d * scale).round_ties_even() / scale)
        }
        ("sum" | "mean" | "min" | "max", _) => aggregate(name, args, named),
        ("is.na", [x]) => Ok(Value::Atomic(match x {
            Value::Atomic(items) => items
                .iter()
                .map(|l| Literal::Logical(Some(l.is_missing())))
                .collect(),
            other => vec![Literal::Logical(Some(false)); other.len()],
        })),
        ("is.null", [x]) => Ok(Value::from(matches!(x, Value::Null))),
        ("as.integer" | "as.numeric" | "as.double" | "as.character" | "as.logical", [x]) => {
            cast(name, x)
        }
        ("paste" | "paste0", _) => {
            let sep = match named.get("sep") {
                Some(s) if name == "paste" => scalar_string(s, "sep")?,
                _ if name == "paste" => " ".to_string(),
                _ => String::new(),
            };
            let collapse = match named.get("collapse") {
                Some(Value::Null) | None => None,
                Some(c) => Some(scalar_string(c, "collapse")?),
            };
            paste(args, &sep, collapse)
        }
        ("toupper", [x]) => map_text(x, |s| Literal::String(Some(s.to_uppercase()))),
        ("tolower", [x]) => map_text(x, |s| Literal::String(Some(s.to_lowercase()))),
        ("nchar", [x]) => Ok(Value::Atomic(
            literals(x)?
                .iter()
                .map(|l| Literal::Integer(text(l).map(|s| s.chars().count() as i64)))
                .collect(),
        )),
        ("substr", [x, start, stop]) => substr(x, start, stop),
        ("grepl", [pattern, x]) => {
            let re = regex_arg(pattern, named)?;
            Ok(Value::Atomic(
                literals(x)?
                    .iter()
                    .map(|l| Literal::Logical(Some(text(l).is_some_and(|s| re.is_match(&s)))))
                    .collect(),
            ))
        }
        ("sub" | "gsub", [pattern, with, x]) => {
            let re = regex_arg(pattern, named)?;
            let with = replacement(&scalar_string(with, "replacement")?);
            map_text(x, |s| {
                let replaced = if name == "sub" {
                    re.replace(s, with.as_str())
                } else {
                    re.replace_all(s, with.as_str())
                };
                Literal::String(Some(replaced.into_owned()))
            })
        }
        ("Sys.Date", []) => Ok(Value::Date(Local::now().date_naive())),
        ("Sys.time", []) => Ok(Value::DateTime(Local::now().naive_local())),
        ("as.Date", [x]) => as_date(x, named),
        ("ifelse" | "if_else", [test, yes, no]) => if_else(test, yes, no),
        ("if", [cond, yes, rest @ ..]) if rest.len() <= 1 => match scalar_truth(cond)? {
            Some(true) => Ok(yes.clone()),
            Some(false) => Ok(rest.first().cloned().unwrap_or(Value::Null)),
            None => Err("missing value where TRUE/FALSE needed".to_string()),
        },
        _ if LOCAL_FUNCTIONS.contains(&name) => {
            Err(format!("invalid arguments to {name}() ({} given)", args.len()))
        }
        _ => Err(format!("could not find function \"{name}\"")),
    }
}

const LOCAL_FUNCTIONS: &[&str] = &[
    "(", "identity", "+", "-", "*", "/", "^", "%%", "%/%", "==", "!=", "<", "<=", ">", ">=",
    "!", "&", "|", "&&", "||", "c", ":", "seq_len", "length", "abs", "sqrt", "exp", "floor",
    "ceiling", "log", "log10", "round", "sum", "mean", "min", "max", "is.na", "is.null",
    "as.integer", "as.numeric", "as.double", "as.character", "as.logical", "paste", "paste0",
    "toupper", "tolower", "nchar", "substr", "grepl", "sub", "gsub", "Sys.Date", "Sys.time",
    "as.Date", "ifelse", "if_else", "if",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{call, call_named, dbl, int, string, sym};
    use pretty_assertions::assert_eq;

    fn eval(expr: &Expression, columns: &[&str], env: &Environment) -> Result<Expression> {
        let columns: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        partial_eval(expr, &Scope::new(&columns, env))
    }

    #[test]
    fn literal_only_calls_are_kept() {
        let e = call("+", [dbl(1.0), dbl(2.0)]);
        assert_eq!(eval(&e, &[], &Environment::new()).unwrap(), e);
    }

    #[test]
    fn local_only_reduces_to_one_literal() {
        let env = Environment::new().with("a", 2.0);
        let e = call("*", [call("+", [dbl(1.0), dbl(2.0)]), sym("a")]);
        assert_eq!(eval(&e, &[], &env).unwrap(), dbl(6.0));
    }

    #[test]
    fn mixed_keeps_column_and_folds_local_part() {
        let env = Environment::new().with("a", 2i64).with("b", 3i64);
        let e = call("+", [sym("x"), call("*", [sym("a"), sym("b")])]);
        assert_eq!(
            eval(&e, &["x"], &env).unwrap(),
            call("+", [sym("x"), int(6)])
        );
    }

    #[test]
    fn remote_columns_shadow_local_bindings() {
        let env = Environment::new().with("x", 10i64);
        let e = call("+", [sym("x"), int(1)]);
        assert_eq!(eval(&e, &["x"], &env).unwrap(), e);
        assert_eq!(eval(&e, &[], &env).unwrap(), int(11));
    }

    #[test]
    fn pronouns() {
        let env = Environment::new().with("x", 10i64);
        let data = call("$", [sym(".data"), sym("x")]);
        assert_eq!(eval(&data, &["x"], &env).unwrap(), sym("x"));
        let local = call("[[", [sym(".env"), string("x")]);
        assert_eq!(eval(&local, &["x"], &env).unwrap(), int(10));
        let missing = call("$", [sym(".env"), sym("nope")]);
        let err = eval(&missing, &[], &env).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to evaluate `.env$nope` locally: object 'nope' not found"
        );
    }

    #[test]
    fn subsetting_is_always_local() {
        let mut cfg = IndexMap::new();
        cfg.insert("limit".to_string(), Value::from(5i64));
        let env = Environment::new()
            .with("cfg", cfg)
            .with("v", vec![10i64, 20, 30]);
        let e = call(">", [sym("x"), call("$", [sym("cfg"), sym("limit")])]);
        assert_eq!(
            eval(&e, &["x"], &env).unwrap(),
            call(">", [sym("x"), int(5)])
        );
        let e = call("[[", [sym("v"), int(2)]);
        assert_eq!(eval(&e, &[], &env).unwrap(), int(20));
        let e = call("[[", [sym("v"), int(7)]);
        assert!(matches!(
            eval(&e, &[], &env),
            Err(Error::LocalEvalFailure { .. })
        ));
    }

    #[test]
    fn integer_division_follows_host_signs() {
        let env = Environment::new()
            .with("m", i64::MIN)
            .with("a", -7i64)
            .with("b", 7i64);
        let fold = |op: &str, l: &str, r: Expression| {
            eval(&call(op, [sym(l), r]), &[], &env).unwrap()
        };
        assert_eq!(fold("%%", "a", int(3)), int(2));
        assert_eq!(fold("%%", "b", int(-3)), int(-2));
        assert_eq!(fold("%/%", "a", int(2)), int(-4));
        assert_eq!(fold("%/%", "b", int(-3)), int(-3));

        let na = Expression::Literal(Literal::Integer(None));
        assert_eq!(fold("%%", "m", int(-1)), na);
        assert_eq!(fold("%/%", "m", int(-1)), na);
        assert_eq!(fold("%/%", "m", int(0)), na);

        // literal-only, so kept as written
        let e = call("%%", [int(i64::MIN), int(-1)]);
        assert_eq!(eval(&e, &[], &Environment::new()).unwrap(), e);
    }

    #[test]
    fn non_finite_subscripts_fail_locally() {
        let env = Environment::new().with("v", vec![1i64, 2, 3]);
        for index in [dbl(f64::NAN), dbl(f64::INFINITY), call("/", [dbl(0.0), dbl(0.0)])] {
            let e = call("[[", [sym("v"), index]);
            assert!(
                matches!(eval(&e, &[], &env), Err(Error::LocalEvalFailure { .. })),
                "{e}"
            );
        }
        let e = call("[", [sym("v"), dbl(f64::NAN)]);
        assert!(matches!(
            eval(&e, &[], &env),
            Err(Error::LocalEvalFailure { .. })
        ));
    }

    #[test]
    fn dates_out_of_range() {
        let env = Environment::new()
            .with("far", 1e10)
            .with("before", -1e300)
            .with("epoch", 0i64);
        for name in ["far", "before"] {
            let err = eval(&call("as.Date", [sym(name)]), &[], &env).unwrap_err();
            assert!(err.to_string().ends_with("date out of range"), "{err}");
        }
        assert_eq!(
            eval(&call("as.Date", [sym("epoch")]), &[], &env).unwrap(),
            string("1970-01-01")
        );
        // literal-only, so the failing fold is left for the backend
        let e = call("as.Date", [dbl(1e10)]);
        assert_eq!(eval(&e, &[], &Environment::new()).unwrap(), e);
    }

    #[test]
    fn substr_bounds() {
        let env = Environment::new().with("s", "abcdef");
        let cut = |start: Expression, stop: Expression| {
            eval(&call("substr", [sym("s"), start, stop]), &[], &env).unwrap()
        };
        assert_eq!(cut(int(2), int(4)), string("bcd"));
        assert_eq!(
            cut(int(3), dbl(f64::NAN)),
            Expression::Literal(Literal::String(None))
        );
        assert_eq!(cut(int(3), dbl(f64::INFINITY)), string("cdef"));
        assert_eq!(cut(int(5), int(2)), string(""));
    }

    #[test]
    fn huge_sequences_are_rejected() {
        let e = call(":", [dbl(-1e308), dbl(1e308)]);
        let err = eval(&e, &[], &Environment::new()).unwrap_err();
        assert!(err.to_string().ends_with("too long to evaluate locally"), "{err}");
    }

    #[test]
    fn sequences_become_vectors() {
        let e = call(":", [int(1), int(3)]);
        assert_eq!(
            eval(&e, &[], &Environment::new()).unwrap(),
            Expression::Vector(vec![
                Literal::Integer(Some(1)),
                Literal::Integer(Some(2)),
                Literal::Integer(Some(3)),
            ])
        );
    }

    #[test]
    fn failure_names_innermost_call() {
        let env = Environment::new().with("a", 1i64);
        let e = call("+", [sym("x"), call("*", [call("nope", [sym("a")]), int(2)])]);
        let err = eval(&e, &["x"], &env).unwrap_err();
        match err {
            Error::LocalEvalFailure { expression, reason } => {
                assert_eq!(expression, "nope(a)");
                assert_eq!(reason, "could not find function \"nope\"");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn must_stay_remote_calls_are_not_folded() {
        let env = Environment::new().with("a", 1i64);
        let e = call("desc", [sym("a")]);
        assert_eq!(eval(&e, &[], &env).unwrap(), call("desc", [int(1)]));
    }

    #[test]
    fn host_arithmetic_semantics() {
        let env = Environment::new()
            .with("big", i64::MAX)
            .with("na", Literal::Integer(None));
        let e = call("+", [sym("big"), int(1)]);
        assert_eq!(
            eval(&e, &[], &env).unwrap(),
            Expression::Literal(Literal::Integer(None))
        );
        let e = call("*", [sym("na"), dbl(2.0)]);
        assert_eq!(
            eval(&e, &[], &env).unwrap(),
            Expression::Literal(Literal::Double(None))
        );
        let env = Environment::new().with("a", 7i64);
        assert_eq!(
            eval(&call("%%", [sym("a"), int(-3)]), &[], &env).unwrap(),
            int(-2)
        );
        assert_eq!(
            eval(&call("%/%", [sym("a"), int(2)]), &[], &env).unwrap(),
            int(3)
        );
        assert_eq!(
            eval(&call("/", [sym("a"), int(2)]), &[], &env).unwrap(),
            dbl(3.5)
        );
    }

    #[test]
    fn strings_and_regex() {
        let env = Environment::new().with("who", "world");
        let e = call_named("paste", [string("hello"), sym("who")], [("sep", string("-"))]);
        assert_eq!(eval(&e, &[], &env).unwrap(), string("hello-world"));
        let e = call("gsub", [string("o"), string("0"), sym("who")]);
        assert_eq!(eval(&e, &[], &env).unwrap(), string("w0rld"));
        let e = call("sub", [string("(w)(o)"), string("\\2\\1"), sym("who")]);
        assert_eq!(eval(&e, &[], &env).unwrap(), string("owrld"));
        let e = call("toupper", [call("substr", [sym("who"), int(2), int(3)])]);
        assert_eq!(eval(&e, &[], &env).unwrap(), string("OR"));
    }

    #[test]
    fn dates_fold_to_iso_strings() {
        let env = Environment::new().with("day", "2024-02-29");
        let e = call(">", [sym("d"), call("as.Date", [sym("day")])]);
        assert_eq!(
            eval(&e, &["d"], &env).unwrap(),
            call(">", [sym("d"), string("2024-02-29")])
        );
        let today = eval(&call("Sys.Date", []), &[], &Environment::new()).unwrap();
        assert!(matches!(today, Expression::Literal(Literal::String(Some(_)))));
    }

    #[test]
    fn aggregates_and_casts() {
        let env = Environment::new().with("v", vec![1.0, 2.0, 6.0]);
        assert_eq!(eval(&call("mean", [sym("v")]), &[], &env).unwrap(), dbl(3.0));
        assert_eq!(eval(&call("max", [sym("v")]), &[], &env).unwrap(), dbl(6.0));
        assert_eq!(
            eval(&call("as.integer", [call("sum", [sym("v")])]), &[], &env).unwrap(),
            int(9)
        );
        assert_eq!(
            eval(&call("length", [sym("v")]), &[], &env).unwrap(),
            int(3)
        );
    }
}
