//! The SELECT statement AST and the opaque [`Sql`] text it renders to.

use std::fmt::{self, Display, Formatter, Result};

use crate::dialect::{Dialect, LimitStyle};
use crate::to_sql::{Printer, PrinterConfig, ToSQL, write_list};
use crate::translate::Expression;

/// Already-quoted SQL text. Nothing downstream escapes it again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sql(String);

impl Sql {
    /// Wraps text verbatim. The caller vouches for its quoting.
    pub fn raw(text: impl Into<String>) -> Self {
        Sql(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Sql {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sql {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Indents every line by two spaces.
pub(crate) fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("  {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// `schema.table` splits on the first dot.
    pub fn parse(name: &str) -> Self {
        match name.split_once('.') {
            Some((schema, table)) => Self {
                schema: Some(schema.to_string()),
                name: table.to_string(),
            },
            None => Self {
                schema: None,
                name: name.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expression,
    pub alias: Option<String>,
}

impl SelectItem {
    pub fn column(name: impl Into<String>) -> Self {
        Self {
            expr: Expression::ident(name),
            alias: None,
        }
    }

    pub fn aliased(expr: Expression, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        match &expr {
            Expression::Identifier { name, .. } if *name == alias => Self { expr, alias: None },
            _ => Self {
                expr,
                alias: Some(alias),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectList {
    Star,
    Items(Vec<SelectItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum From {
    Table {
        name: TableName,
        alias: Option<String>,
    },
    Subquery {
        select: Box<Select>,
        alias: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub from: From,
    pub on: Vec<Expression>,
}

/// A SELECT clause
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub select_list: SelectList,
    pub from: From,
    pub joins: Vec<Join>,
    pub where_: Vec<Expression>,
    pub group_by: Vec<Expression>,
    pub having: Vec<Expression>,
    pub order_by: Vec<Expression>,
    pub limit: Option<u64>,
}

impl Select {
    pub fn star(from: From) -> Self {
        Self {
            distinct: false,
            select_list: SelectList::Star,
            from,
            joins: Vec::new(),
            where_: Vec::new(),
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn render(&self, dialect: &Dialect) -> Sql {
        Sql::raw(Printer::new(self, PrinterConfig::new(dialect)).to_string())
    }
}

fn write_predicates(out: &mut Formatter, conf: &PrinterConfig, preds: &[Expression]) -> Result {
    for (i, pred) in preds.iter().enumerate() {
        if i > 0 {
            write!(out, " AND ")?;
        }
        write!(out, "(")?;
        pred.to_sql(out, conf)?;
        write!(out, ")")?;
    }
    Ok(())
}

impl ToSQL for SelectItem {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        self.expr.to_sql(out, conf)?;
        if let Some(alias) = &self.alias {
            write!(out, " AS {}", conf.dialect.quote_identifier(alias))?;
        }
        Ok(())
    }
}

impl ToSQL for From {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        match self {
            From::Table { name, alias } => {
                if let Some(schema) = &name.schema {
                    write!(out, "{}.", conf.dialect.quote_identifier(schema))?;
                }
                write!(out, "{}", conf.dialect.quote_identifier(&name.name))?;
                if let Some(alias) = alias {
                    write!(out, " AS {}", conf.dialect.quote_identifier(alias))?;
                }
                Ok(())
            }
            From::Subquery { select, alias } => {
                let inner = Printer::new(select.as_ref(), *conf).to_string();
                write!(
                    out,
                    "(\n{}\n) AS {}",
                    indent(&inner),
                    conf.dialect.quote_identifier(alias)
                )
            }
        }
    }
}

impl ToSQL for Select {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        write!(out, "SELECT ")?;
        if self.distinct {
            write!(out, "DISTINCT ")?;
        }
        let top = conf.dialect.limit_style() == LimitStyle::Top;
        if let (true, Some(n)) = (top, self.limit) {
            write!(out, "TOP {n} ")?;
        }
        match &self.select_list {
            SelectList::Star => write!(out, "*")?,
            SelectList::Items(items) => write_list(out, conf, items)?,
        }

        write!(out, "\nFROM ")?;
        self.from.to_sql(out, conf)?;

        for join in &self.joins {
            let kind = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
                JoinKind::Right => "RIGHT JOIN",
                JoinKind::Full => "FULL JOIN",
            };
            write!(out, "\n{kind} ")?;
            join.from.to_sql(out, conf)?;
            if join.on.is_empty() {
                // cross product
                write!(out, "\n  ON (1 = 1)")?;
            } else {
                write!(out, "\n  ON ")?;
                write_predicates(out, conf, &join.on)?;
            }
        }

        if !self.where_.is_empty() {
            write!(out, "\nWHERE ")?;
            write_predicates(out, conf, &self.where_)?;
        }
        if !self.group_by.is_empty() {
            write!(out, "\nGROUP BY ")?;
            write_list(out, conf, &self.group_by)?;
        }
        if !self.having.is_empty() {
            write!(out, "\nHAVING ")?;
            write_predicates(out, conf, &self.having)?;
        }
        if !self.order_by.is_empty() {
            write!(out, "\nORDER BY ")?;
            write_list(out, conf, &self.order_by)?;
        }
        if let (false, Some(n)) = (top, self.limit) {
            write!(out, "\nLIMIT {n}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;
    use crate::translate::BinaryOp;
    use pretty_assertions::assert_eq;

    fn table(name: &str) -> From {
        From::Table {
            name: TableName::parse(name),
            alias: None,
        }
    }

    #[test]
    fn clause_order() {
        let mut select = Select::star(table("db.events"));
        select.select_list = SelectList::Items(vec![
            SelectItem::column("g"),
            SelectItem::aliased(
                Expression::call("SUM", vec![Expression::ident("v")]),
                "total",
            ),
        ]);
        select.where_ = vec![
            Expression::BinaryOperator(
                Box::new(Expression::ident("v")),
                BinaryOp::Gt,
                Box::new(Expression::Literal(Literal::Integer(Some(0)))),
            ),
            Expression::IsNull(Box::new(Expression::ident("w"))),
        ];
        select.group_by = vec![Expression::ident("g")];
        select.order_by = vec![Expression::ident("g")];
        select.limit = Some(5);
        assert_eq!(
            select.render(&Dialect::ansi()).as_str(),
            r#"SELECT "g", SUM("v") AS "total"
FROM "db"."events"
WHERE ("v" > 0) AND ((("w") IS NULL))
GROUP BY "g"
ORDER BY "g"
LIMIT 5"#
        );
    }

    #[test]
    fn nested_subquery_and_top() {
        let mut inner = Select::star(table("t"));
        inner.limit = Some(3);
        let outer = Select::star(From::Subquery {
            select: Box::new(inner),
            alias: "q01".into(),
        });
        assert_eq!(
            outer.render(&Dialect::ansi()).as_str(),
            "SELECT *\nFROM (\n  SELECT *\n  FROM \"t\"\n  LIMIT 3\n) AS \"q01\""
        );
        assert_eq!(
            outer.render(&Dialect::mssql()).as_str(),
            "SELECT *\nFROM (\n  SELECT TOP 3 *\n  FROM [t]\n) AS [q01]"
        );
    }
}
