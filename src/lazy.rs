//! Lazy query pipelines.
//!
//! Verbs only grow a tree of [`Node`]s. Nothing is evaluated, translated or
//!  sent anywhere until the query is compiled for a dialect, and compiling is
//!  a pure function of the tree, the dialect and the options.

use std::cell::RefCell;
use std::ops::ControlFlow;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::{self, Literal};
use crate::dialect::Dialect;
use crate::error::{Error, Result, Warning};
use crate::evaluate::{Environment, Scope, partial_eval};
use crate::sql::{self, Join, JoinKind, Select, SelectItem, SelectList, Sql, TableName};
use crate::translate::{BinaryOp, Expression, Frame, TranslationContext, Translator};

const LHS: &str = "LHS";
const RHS: &str = "RHS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left rows with a match, left columns only.
    Semi,
    /// Left rows without a match, left columns only.
    Anti,
}

/// One verb of a pipeline. Every node but the source holds its parent.
#[derive(Debug)]
pub enum Node {
    Source {
        table: String,
        columns: Vec<String>,
    },
    /// `(output, input)` pairs. With `keep_rest` the remaining columns stay
    ///  in place (a rename).
    Select {
        parent: LazyQuery,
        columns: Vec<(String, String)>,
        keep_rest: bool,
    },
    Filter {
        parent: LazyQuery,
        predicates: Vec<ast::Expression>,
    },
    Arrange {
        parent: LazyQuery,
        terms: Vec<ast::Expression>,
    },
    Mutate {
        parent: LazyQuery,
        columns: Vec<(String, ast::Expression)>,
    },
    Summarise {
        parent: LazyQuery,
        columns: Vec<(String, ast::Expression)>,
    },
    GroupBy {
        parent: LazyQuery,
        columns: Vec<String>,
    },
    Ungroup {
        parent: LazyQuery,
    },
    Join {
        left: LazyQuery,
        right: LazyQuery,
        kind: JoinType,
        by: Vec<(String, String)>,
        suffix: (String, String),
    },
    Distinct {
        parent: LazyQuery,
    },
    Head {
        parent: LazyQuery,
        n: u64,
    },
    WindowOrder {
        parent: LazyQuery,
        terms: Vec<ast::Expression>,
    },
    WindowFrame {
        parent: LazyQuery,
        frame: Frame,
    },
    Collapse {
        parent: LazyQuery,
    },
}

/// An immutable handle on a pipeline. Cloning is cheap and every verb
///  returns a new query, so branches can share an ancestor.
#[derive(Debug, Clone)]
pub struct LazyQuery(Arc<Node>);

fn pairs<I, A, B>(items: I) -> Vec<(String, B)>
where
    I: IntoIterator<Item = (A, B)>,
    A: Into<String>,
{
    items.into_iter().map(|(a, b)| (a.into(), b)).collect()
}

impl LazyQuery {
    fn new(node: Node) -> Self {
        Self(Arc::new(node))
    }

    pub fn node(&self) -> &Node {
        &self.0
    }

    /// A remote table with known column names. `schema.table` is allowed.
    pub fn table<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Node::Source {
            table: table.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        })
    }

    pub fn select<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = columns
            .into_iter()
            .map(|c| {
                let c = c.into();
                (c.clone(), c)
            })
            .collect();
        Self::new(Node::Select {
            parent: self.clone(),
            columns,
            keep_rest: false,
        })
    }

    /// Keeps the listed `(new, old)` columns only, renamed.
    pub fn select_as<I, A, B>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self::new(Node::Select {
            parent: self.clone(),
            columns: columns
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
            keep_rest: false,
        })
    }

    /// Renames `(new, old)` columns and keeps everything else.
    pub fn rename<I, A, B>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self::new(Node::Select {
            parent: self.clone(),
            columns: columns
                .into_iter()
                .map(|(a, b)| (a.into(), b.into()))
                .collect(),
            keep_rest: true,
        })
    }

    pub fn filter(&self, predicates: impl IntoIterator<Item = ast::Expression>) -> Self {
        Self::new(Node::Filter {
            parent: self.clone(),
            predicates: predicates.into_iter().collect(),
        })
    }

    pub fn arrange(&self, terms: impl IntoIterator<Item = ast::Expression>) -> Self {
        Self::new(Node::Arrange {
            parent: self.clone(),
            terms: terms.into_iter().collect(),
        })
    }

    /// Adds or replaces columns, in order; later columns may use earlier ones.
    pub fn mutate<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ast::Expression)>,
        S: Into<String>,
    {
        Self::new(Node::Mutate {
            parent: self.clone(),
            columns: pairs(columns),
        })
    }

    pub fn summarise<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, ast::Expression)>,
        S: Into<String>,
    {
        Self::new(Node::Summarise {
            parent: self.clone(),
            columns: pairs(columns),
        })
    }

    pub fn group_by<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Node::GroupBy {
            parent: self.clone(),
            columns: columns.into_iter().map(Into::into).collect(),
        })
    }

    pub fn ungroup(&self) -> Self {
        Self::new(Node::Ungroup {
            parent: self.clone(),
        })
    }

    /// Joins on `(left, right)` key pairs. Clashing non-key columns get `.x`
    ///  and `.y` suffixes.
    pub fn join<I, A, B>(&self, right: &LazyQuery, kind: JoinType, by: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        self.join_with_suffix(right, kind, by, (".x", ".y"))
    }

    pub fn join_with_suffix<I, A, B>(
        &self,
        right: &LazyQuery,
        kind: JoinType,
        by: I,
        suffix: (&str, &str),
    ) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<String>,
        B: Into<String>,
    {
        Self::new(Node::Join {
            left: self.clone(),
            right: right.clone(),
            kind,
            by: by.into_iter().map(|(a, b)| (a.into(), b.into())).collect(),
            suffix: (suffix.0.to_string(), suffix.1.to_string()),
        })
    }

    pub fn distinct(&self) -> Self {
        Self::new(Node::Distinct {
            parent: self.clone(),
        })
    }

    pub fn head(&self, n: u64) -> Self {
        Self::new(Node::Head {
            parent: self.clone(),
            n,
        })
    }

    /// Ordering used by window functions without changing the output order.
    pub fn window_order(&self, terms: impl IntoIterator<Item = ast::Expression>) -> Self {
        Self::new(Node::WindowOrder {
            parent: self.clone(),
            terms: terms.into_iter().collect(),
        })
    }

    /// Row offsets relative to the current row; `None` is unbounded.
    pub fn window_frame(&self, from: Option<i64>, to: Option<i64>) -> Self {
        Self::new(Node::WindowFrame {
            parent: self.clone(),
            frame: Frame::rows(from, to),
        })
    }

    /// Forces everything so far into a subquery.
    pub fn collapse(&self) -> Self {
        Self::new(Node::Collapse {
            parent: self.clone(),
        })
    }

    /// The row count is never known without running the query.
    pub fn nrow(&self) -> Option<u64> {
        None
    }

    pub fn show_query(&self, dialect: &Dialect, options: &CompileOptions) -> Result<Sql> {
        compile(self, dialect, options)
    }

    /// Like [`LazyQuery::show_query`], keeping the warnings raised on the way.
    pub fn show_query_with_warnings(
        &self,
        dialect: &Dialect,
        options: &CompileOptions,
    ) -> Result<Compiled> {
        compile_with_warnings(self, dialect, options)
    }

    pub fn explain(&self, dialect: &Dialect, options: &CompileOptions) -> Result<Sql> {
        dialect.explain(&compile(self, dialect, options)?)
    }

    /// Runs the query and hands back whatever the executor produces.
    pub fn collect<E: Executor>(
        &self,
        executor: &E,
        dialect: &Dialect,
        options: &CompileOptions,
    ) -> Result<E::Output> {
        let sql = compile(self, dialect, options)?;
        executor
            .fetch(&sql)
            .map_err(|e| Error::Executor(Box::new(e)))
    }

    /// Stores the result in a temporary table and returns a query over it.
    pub fn compute<E: Executor>(
        &self,
        executor: &E,
        name: &str,
        dialect: &Dialect,
        options: &CompileOptions,
    ) -> Result<LazyQuery> {
        let (compiled, columns) = compile_with_columns(self, dialect, options)?;
        let statement = dialect.temporary_table(name, &compiled.sql);
        executor
            .execute(&statement)
            .map_err(|e| Error::Executor(Box::new(e)))?;
        Ok(LazyQuery::table(dialect.temporary_table_name(name), columns))
    }
}

/// The connection side. Implemented by the caller; nothing in this crate
///  talks to a database.
pub trait Executor {
    type Output;
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch(&self, sql: &Sql) -> std::result::Result<Self::Output, Self::Error>;

    fn execute(&self, sql: &Sql) -> std::result::Result<(), Self::Error>;
}

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub strict: bool,
    /// Local bindings visible to every verb's expressions.
    pub env: Environment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: Sql,
    /// Raised while translating the verbs' expressions, each reported once.
    pub warnings: Vec<Warning>,
}

pub fn compile(query: &LazyQuery, dialect: &Dialect, options: &CompileOptions) -> Result<Sql> {
    compile_with_warnings(query, dialect, options).map(|compiled| compiled.sql)
}

pub fn compile_with_warnings(
    query: &LazyQuery,
    dialect: &Dialect,
    options: &CompileOptions,
) -> Result<Compiled> {
    compile_with_columns(query, dialect, options).map(|(compiled, _)| compiled)
}

fn compile_with_columns(
    query: &LazyQuery,
    dialect: &Dialect,
    options: &CompileOptions,
) -> Result<(Compiled, Vec<String>)> {
    let mut compiler = Compiler {
        dialect,
        options,
        subqueries: 0,
        warnings: RefCell::new(Vec::new()),
    };
    let state = compiler.build(query)?;
    let columns = state.level.columns.keys().cloned().collect();
    let order_by = compiler.order_by(&state)?;
    let sql = state.level.into_select(order_by).render(dialect);
    log::debug!("compiled query:\n{sql}");
    let warnings = compiler.warnings.into_inner();
    Ok((Compiled { sql, warnings }, columns))
}

/// The unqualified column a definition simply passes through, if any.
fn plain_source(def: &Expression) -> Option<&str> {
    match def {
        Expression::Identifier {
            qualifier: None,
            name,
        } => Some(name),
        _ => None,
    }
}

/// Swaps unqualified column references for whatever `lookup` returns.
fn inline(tree: Expression, lookup: impl Fn(&str) -> Option<Expression>) -> Expression {
    tree.transform(&mut |e| {
        let replacement = match &e {
            Expression::Identifier {
                qualifier: None,
                name,
            } => lookup(name),
            _ => None,
        };
        match replacement {
            Some(def) => ControlFlow::Break(def),
            None => ControlFlow::Continue(e),
        }
    })
}

/// One SELECT under construction. Column definitions are expressed over
///  the columns of its FROM clause.
#[derive(Debug)]
struct Level {
    select: Select,
    from_columns: Vec<String>,
    columns: IndexMap<String, Expression>,
    summarised: bool,
    /// The next verb must start a new level.
    closed: bool,
}

impl Level {
    fn new(from: sql::From, columns: Vec<String>) -> Self {
        Self {
            select: Select::star(from),
            columns: columns
                .iter()
                .map(|c| (c.clone(), Expression::ident(c.as_str())))
                .collect(),
            from_columns: columns,
            summarised: false,
            closed: false,
        }
    }

    fn is_computed(&self, name: &str) -> bool {
        self.columns
            .get(name)
            .is_some_and(|def| plain_source(def).is_none())
    }

    fn has_windows(&self) -> bool {
        self.columns.values().any(Expression::is_windowed)
    }

    fn references_computed(&self, tree: &Expression) -> bool {
        tree.column_references()
            .iter()
            .any(|name| self.is_computed(name))
    }

    /// Rewrites output column names into expressions over the FROM clause.
    ///  Computed columns stay as aliases unless `inline_computed` is set.
    fn resolve(&self, tree: Expression, inline_computed: bool) -> Expression {
        inline(tree, |name| {
            self.columns
                .get(name)
                .filter(|def| inline_computed || plain_source(def).is_some())
                .cloned()
        })
    }

    fn select_list(&self) -> SelectList {
        let star = self.columns.len() == self.from_columns.len()
            && self
                .columns
                .iter()
                .zip(&self.from_columns)
                .all(|((name, def), from)| name == from && plain_source(def) == Some(from));
        if star {
            return SelectList::Star;
        }
        SelectList::Items(
            self.columns
                .iter()
                .map(|(name, def)| SelectItem::aliased(def.clone(), name.as_str()))
                .collect(),
        )
    }

    /// The table this level reads unchanged, if it does nothing else.
    fn bare_table(&self) -> Option<&TableName> {
        let s = &self.select;
        let untouched = s.joins.is_empty()
            && s.where_.is_empty()
            && s.group_by.is_empty()
            && s.having.is_empty()
            && !s.distinct
            && s.limit.is_none()
            && self.select_list() == SelectList::Star;
        match &s.from {
            sql::From::Table { name, alias: None } if untouched => Some(name),
            _ => None,
        }
    }

    fn into_select(self, order_by: Vec<Expression>) -> Select {
        let select_list = self.select_list();
        Select {
            select_list,
            order_by,
            ..self.select
        }
    }
}

/// A level plus the pipeline state that survives nesting.
#[derive(Debug)]
struct State {
    level: Level,
    groups: Vec<String>,
    order: Vec<ast::Expression>,
    window_order: Vec<ast::Expression>,
    frame: Option<Frame>,
}

impl State {
    fn new(level: Level) -> Self {
        Self {
            level,
            groups: Vec::new(),
            order: Vec::new(),
            window_order: Vec::new(),
            frame: None,
        }
    }
}

struct Compiler<'a> {
    dialect: &'a Dialect,
    options: &'a CompileOptions,
    subqueries: usize,
    warnings: RefCell<Vec<Warning>>,
}

impl Compiler<'_> {
    fn build(&mut self, query: &LazyQuery) -> Result<State> {
        match query.node() {
            Node::Source { table, columns } => Ok(State::new(Level::new(
                sql::From::Table {
                    name: TableName::parse(table),
                    alias: None,
                },
                columns.clone(),
            ))),
            Node::Select {
                parent,
                columns,
                keep_rest,
            } => {
                let state = self.build(parent)?;
                self.select(state, columns, *keep_rest)
            }
            Node::Filter { parent, predicates } => {
                let mut state = self.build(parent)?;
                for predicate in predicates {
                    state = self.filter(state, predicate)?;
                }
                Ok(state)
            }
            Node::Arrange { parent, terms } => {
                let state = self.build(parent)?;
                let mut state = self.open(state)?;
                state.order = terms.clone();
                Ok(state)
            }
            Node::Mutate { parent, columns } => {
                let mut state = self.build(parent)?;
                for (name, expr) in columns {
                    state = self.mutate(state, name, expr)?;
                }
                Ok(state)
            }
            Node::Summarise { parent, columns } => {
                let state = self.build(parent)?;
                self.summarise(state, columns)
            }
            Node::GroupBy { parent, columns } => {
                let mut state = self.build(parent)?;
                if let Some(missing) = columns
                    .iter()
                    .find(|c| !state.level.columns.contains_key(c.as_str()))
                {
                    return Err(Error::UnknownColumn(missing.clone()));
                }
                state.groups = columns.clone();
                Ok(state)
            }
            Node::Ungroup { parent } => {
                let mut state = self.build(parent)?;
                state.groups.clear();
                Ok(state)
            }
            Node::Join {
                left,
                right,
                kind,
                by,
                suffix,
            } => {
                let left = self.build(left)?;
                let right = self.build(right)?;
                self.join(left, right, *kind, by, suffix)
            }
            Node::Distinct { parent } => {
                let state = self.build(parent)?;
                let mut state = self.open(state)?;
                state.level.select.distinct = true;
                state.level.closed = true;
                Ok(state)
            }
            Node::Head { parent, n } => {
                let state = self.build(parent)?;
                let mut state = self.open(state)?;
                state.level.select.limit = Some(*n);
                state.level.closed = true;
                Ok(state)
            }
            Node::WindowOrder { parent, terms } => {
                let mut state = self.build(parent)?;
                state.window_order = terms.clone();
                Ok(state)
            }
            Node::WindowFrame { parent, frame } => {
                let mut state = self.build(parent)?;
                state.frame = Some(*frame);
                Ok(state)
            }
            Node::Collapse { parent } => {
                let state = self.build(parent)?;
                self.wrap(state)
            }
        }
    }

    /// Wraps the level if it no longer accepts verbs.
    fn open(&mut self, state: State) -> Result<State> {
        if state.level.closed {
            self.wrap(state)
        } else {
            Ok(state)
        }
    }

    /// Turns the current level into an aliased subquery of a fresh one.
    fn wrap(&mut self, state: State) -> Result<State> {
        let order_by = self.nested_order_by(&state)?;
        let State {
            level,
            groups,
            order,
            window_order,
            frame,
        } = state;
        let columns: Vec<String> = level.columns.keys().cloned().collect();
        let select = level.into_select(order_by);
        self.subqueries += 1;
        let alias = format!("q{:02}", self.subqueries);
        log::trace!("nesting level as {alias}");
        let from = sql::From::Subquery {
            select: Box::new(select),
            alias,
        };
        Ok(State {
            level: Level::new(from, columns),
            groups,
            order,
            window_order,
            frame,
        })
    }

    /// Partially evaluates and translates `expr` in the current level's
    ///  context. Column references still name output columns.
    fn translate(
        &self,
        state: &State,
        expr: &ast::Expression,
        windowed: bool,
        extra: &[String],
    ) -> Result<Expression> {
        let mut names: Vec<String> = state.level.columns.keys().cloned().collect();
        names.extend(extra.iter().cloned());
        let expr = partial_eval(expr, &Scope::new(&names, &self.options.env))?;
        let order_by = if state.window_order.is_empty() {
            state.order.clone()
        } else {
            state.window_order.clone()
        };
        let translator = Translator::new(TranslationContext {
            dialect: self.dialect,
            group_by: state.groups.clone(),
            order_by,
            frame: state.frame,
            windowed,
            strict: self.options.strict,
        });
        let tree = translator.translate_expr(&expr)?;
        let mut warnings = self.warnings.borrow_mut();
        // a nested retranslation raises the same warnings again
        for warning in translator.into_warnings() {
            if !warnings.contains(&warning) {
                log::warn!("{warning}");
                warnings.push(warning);
            }
        }
        Ok(tree)
    }

    /// Translates for a windowed verb, nesting first when the result would
    ///  reference a column computed at this level.
    fn translate_here(
        &mut self,
        state: State,
        expr: &ast::Expression,
    ) -> Result<(State, Expression)> {
        let tree = self.translate(&state, expr, true, &[])?;
        if !state.level.references_computed(&tree) {
            return Ok((state, tree));
        }
        let state = self.wrap(state)?;
        let tree = self.translate(&state, expr, true, &[])?;
        Ok((state, tree))
    }

    fn order_by(&self, state: &State) -> Result<Vec<Expression>> {
        let mut terms = Vec::new();
        for term in &state.order {
            let unknown = term.symbols().into_iter().find(|s| {
                !state.level.columns.contains_key(s.as_str())
                    && self.options.env.get(s).is_none()
                    && s != ".data"
                    && s != ".env"
            });
            if let Some(column) = unknown {
                log::debug!("dropping ordering by `{term}`: `{column}` is gone");
                continue;
            }
            let tree = self.translate(state, term, false, &[])?;
            terms.push(state.level.resolve(tree, false));
        }
        Ok(terms)
    }

    /// A nested SELECT keeps its ORDER BY only when a limit depends on it.
    fn nested_order_by(&self, state: &State) -> Result<Vec<Expression>> {
        match state.level.select.limit {
            Some(_) => self.order_by(state),
            None => Ok(Vec::new()),
        }
    }

    fn select(
        &mut self,
        state: State,
        columns: &[(String, String)],
        keep_rest: bool,
    ) -> Result<State> {
        let mut state = self.open(state)?;
        let level = &state.level;
        if let Some((_, missing)) = columns
            .iter()
            .find(|(_, old)| !level.columns.contains_key(old.as_str()))
        {
            return Err(Error::UnknownColumn(missing.clone()));
        }
        let renamed = |name: &str| {
            columns
                .iter()
                .find(|(_, old)| old == name)
                .map(|(new, _)| new.clone())
        };

        let mut next = IndexMap::new();
        if keep_rest {
            for (name, def) in &level.columns {
                next.insert(renamed(name).unwrap_or_else(|| name.clone()), def.clone());
            }
        } else {
            for group in &state.groups {
                if renamed(group).is_some() {
                    continue;
                }
                if let Some(def) = level.columns.get(group) {
                    log::info!("Adding missing grouping variable `{group}`");
                    next.insert(group.clone(), def.clone());
                }
            }
            for (new, old) in columns {
                if let Some(def) = level.columns.get(old) {
                    next.insert(new.clone(), def.clone());
                }
            }
        }
        state.groups = state
            .groups
            .iter()
            .map(|g| renamed(g).unwrap_or_else(|| g.clone()))
            .collect();
        state.level.columns = next;
        Ok(state)
    }

    fn filter(&mut self, state: State, predicate: &ast::Expression) -> Result<State> {
        let mut state = state;
        if state.level.closed || (!state.level.summarised && state.level.has_windows()) {
            state = self.wrap(state)?;
        }
        if state.level.summarised {
            let tree = self.translate(&state, predicate, false, &[])?;
            if !tree.is_windowed() {
                let tree = state.level.resolve(tree, true);
                state.level.select.having.push(tree);
                return Ok(state);
            }
            state = self.wrap(state)?;
        }
        let (mut state, tree) = self.translate_here(state, predicate)?;
        if tree.is_windowed() {
            return self.hoist(state, tree);
        }
        let tree = state.level.resolve(tree, true);
        state.level.select.where_.push(tree);
        Ok(state)
    }

    /// Window functions are not allowed in WHERE: compute them as columns of
    ///  a subquery and filter on those.
    fn hoist(&mut self, state: State, predicate: Expression) -> Result<State> {
        let mut state = state;
        let visible: Vec<String> = state.level.columns.keys().cloned().collect();
        let mut windows = Vec::new();
        let predicate = predicate.transform(&mut |e| match e {
            Expression::Window { .. } => {
                let mut n = windows.len() + 1;
                let name = loop {
                    let candidate = format!("col{n:02}");
                    let taken = visible.contains(&candidate)
                        || windows.iter().any(|(w, _)| *w == candidate);
                    if !taken {
                        break candidate;
                    }
                    n += 1;
                };
                windows.push((name.clone(), e));
                ControlFlow::Break(Expression::ident(name))
            }
            other => ControlFlow::Continue(other),
        });
        for (name, window) in windows {
            let window = state.level.resolve(window, true);
            state.level.columns.insert(name, window);
        }
        let mut state = self.wrap(state)?;
        state.level.select.where_.push(predicate);
        state.level.columns.retain(|name, _| visible.contains(name));
        Ok(state)
    }

    fn mutate(&mut self, state: State, name: &str, expr: &ast::Expression) -> Result<State> {
        let mut state = state;
        if state.level.closed || state.level.summarised {
            state = self.wrap(state)?;
        }
        let (mut state, tree) = self.translate_here(state, expr)?;
        let tree = state.level.resolve(tree, true);
        state.level.columns.insert(name.to_string(), tree);
        Ok(state)
    }

    fn summarise(&mut self, state: State, columns: &[(String, ast::Expression)]) -> Result<State> {
        let mut state = state;
        let uses_computed = columns
            .iter()
            .flat_map(|(_, expr)| expr.symbols())
            .chain(state.groups.iter().cloned())
            .any(|name| state.level.is_computed(&name));
        if state.level.closed
            || state.level.summarised
            || state.level.has_windows()
            || uses_computed
        {
            state = self.wrap(state)?;
        }

        let mut summaries: IndexMap<String, Expression> = IndexMap::new();
        for (name, expr) in columns {
            let earlier: Vec<String> = summaries.keys().cloned().collect();
            let tree = self.translate(&state, expr, false, &earlier)?;
            let tree = inline(tree, |column| {
                summaries
                    .get(column)
                    .or_else(|| state.level.columns.get(column))
                    .cloned()
            });
            summaries.insert(name.clone(), tree);
        }

        let mut next = IndexMap::new();
        let mut group_by = Vec::new();
        for group in &state.groups {
            let def = state
                .level
                .columns
                .get(group)
                .cloned()
                .unwrap_or_else(|| Expression::ident(group.as_str()));
            group_by.push(def.clone());
            next.insert(group.clone(), def);
        }
        next.extend(summaries);

        state.level.select.group_by = group_by;
        state.level.columns = next;
        state.level.summarised = true;
        state.groups.pop();
        state.order.clear();
        Ok(state)
    }

    /// Either side of a join: the bare table or a nested SELECT.
    fn join_side(&mut self, state: State, alias: &str) -> Result<(sql::From, Vec<String>)> {
        let columns = state.level.columns.keys().cloned().collect();
        if let Some(name) = state.level.bare_table() {
            let from = sql::From::Table {
                name: name.clone(),
                alias: Some(alias.to_string()),
            };
            return Ok((from, columns));
        }
        let order_by = self.nested_order_by(&state)?;
        let select = state.level.into_select(order_by);
        let from = sql::From::Subquery {
            select: Box::new(select),
            alias: alias.to_string(),
        };
        Ok((from, columns))
    }

    fn join(
        &mut self,
        left: State,
        right: State,
        kind: JoinType,
        by: &[(String, String)],
        suffix: &(String, String),
    ) -> Result<State> {
        for (l, r) in by {
            if !left.level.columns.contains_key(l.as_str()) {
                return Err(Error::UnknownColumn(l.clone()));
            }
            if !right.level.columns.contains_key(r.as_str()) {
                return Err(Error::UnknownColumn(r.clone()));
            }
        }
        let groups = left.groups.clone();
        let window_order = left.window_order.clone();
        let frame = left.frame;
        let (lhs, lhs_columns) = self.join_side(left, LHS)?;
        let (rhs, rhs_columns) = self.join_side(right, RHS)?;
        let on: Vec<Expression> = by
            .iter()
            .map(|(l, r)| {
                Expression::binary(
                    Expression::qualified(LHS, l.as_str()),
                    BinaryOp::Eq,
                    Expression::qualified(RHS, r.as_str()),
                )
            })
            .collect();

        let mut select = Select::star(lhs);
        let mut columns = IndexMap::new();
        let join_kind = match kind {
            JoinType::Semi | JoinType::Anti => {
                for name in &lhs_columns {
                    columns.insert(name.clone(), Expression::qualified(LHS, name.as_str()));
                }
                let mut exists = Select::star(rhs);
                exists.select_list = SelectList::Items(vec![SelectItem {
                    expr: Expression::Literal(Literal::Integer(Some(1))),
                    alias: None,
                }]);
                exists.where_ = on;
                let negation = if kind == JoinType::Anti { "NOT " } else { "" };
                let text = format!(
                    "{negation}EXISTS (\n{}\n)",
                    sql::indent(exists.render(self.dialect).as_str())
                );
                select.where_.push(Expression::Raw(Sql::raw(text)));
                None
            }
            JoinType::Inner => Some((JoinKind::Inner, rhs, on)),
            JoinType::Left => Some((JoinKind::Left, rhs, on)),
            JoinType::Right => Some((JoinKind::Right, rhs, on)),
            JoinType::Full => Some((JoinKind::Full, rhs, on)),
        };

        if let Some((join_kind, rhs, on)) = join_kind {
            let right_keys: Vec<&str> = by.iter().map(|(_, r)| r.as_str()).collect();
            let rhs_kept: Vec<&String> = rhs_columns
                .iter()
                .filter(|c| !right_keys.contains(&c.as_str()))
                .collect();
            for name in &lhs_columns {
                let key = by.iter().find(|(l, _)| l == name);
                let def = match (kind, key) {
                    (JoinType::Right, Some((_, r))) => Expression::qualified(RHS, r.as_str()),
                    (JoinType::Full, Some((l, r))) => Expression::call(
                        "COALESCE",
                        vec![
                            Expression::qualified(LHS, l.as_str()),
                            Expression::qualified(RHS, r.as_str()),
                        ],
                    ),
                    _ => Expression::qualified(LHS, name.as_str()),
                };
                let clashes = key.is_none() && rhs_kept.contains(&name);
                let output = if clashes {
                    format!("{name}{}", suffix.0)
                } else {
                    name.clone()
                };
                columns.insert(output, def);
            }
            for name in rhs_kept {
                let output = if lhs_columns.contains(name) {
                    format!("{name}{}", suffix.1)
                } else {
                    name.clone()
                };
                columns.insert(output, Expression::qualified(RHS, name.as_str()));
            }
            select.joins.push(Join {
                kind: join_kind,
                from: rhs,
                on,
            });
        }

        Ok(State {
            level: Level {
                select,
                from_columns: Vec::new(),
                columns,
                summarised: false,
                closed: true,
            },
            groups,
            order: Vec::new(),
            window_order,
            frame,
        })
    }
}
