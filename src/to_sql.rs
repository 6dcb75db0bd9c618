use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result};

use crate::dialect::Dialect;
use crate::translate::{BinaryOp, Expression, UnaryOp};

#[derive(Debug, Clone, Copy)]
pub struct PrinterConfig<'a> {
    pub dialect: &'a Dialect,
}

impl<'a> PrinterConfig<'a> {
    pub fn new(dialect: &'a Dialect) -> Self {
        Self { dialect }
    }
}

pub struct Printer<'a, T> {
    tree: T,
    config: PrinterConfig<'a>,
}

impl<'a, T> Printer<'a, T> {
    pub fn new(tree: T, config: PrinterConfig<'a>) -> Self {
        Self { tree, config }
    }
}

pub trait ToSQL {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result;
}

impl<T> ToSQL for &T
where
    T: ToSQL + ?Sized,
{
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        (**self).to_sql(out, conf)
    }
}

impl<T> ToSQL for Box<T>
where
    T: ToSQL,
{
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        self.as_ref().to_sql(out, conf)
    }
}

impl<T> Display for Printer<'_, T>
where
    T: ToSQL,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        self.tree.to_sql(f, &self.config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Associativity {
    Left,
    Both,
    Neither,
}

// Loosest to tightest.
const OR: i32 = 2;
const AND: i32 = 3;
const NOT: i32 = 4;
const COMPARISON: i32 = 6;
const CONCAT: i32 = 9;
const ADDITIVE: i32 = 10;
const MULTIPLICATIVE: i32 = 11;
const NEGATION: i32 = 13;
const ATOM: i32 = 20;

impl BinaryOp {
    fn binding_strength(&self) -> i32 {
        match self {
            BinaryOp::Or => OR,
            BinaryOp::And => AND,
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge
            | BinaryOp::Like
            | BinaryOp::Custom(_) => COMPARISON,
            BinaryOp::Concat => CONCAT,
            BinaryOp::Add | BinaryOp::Sub => ADDITIVE,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => MULTIPLICATIVE,
        }
    }

    fn associativity(&self) -> Associativity {
        match self {
            BinaryOp::Add | BinaryOp::Mul | BinaryOp::And | BinaryOp::Or | BinaryOp::Concat => {
                Associativity::Both
            }
            BinaryOp::Sub | BinaryOp::Div | BinaryOp::Mod => Associativity::Left,
            _ => Associativity::Neither,
        }
    }
}

fn binding_strength(e: &Expression) -> i32 {
    match e {
        Expression::BinaryOperator(_, op, _) => op.binding_strength(),
        Expression::UnaryOperator(UnaryOp::Neg, _) => NEGATION,
        Expression::UnaryOperator(UnaryOp::Not, _) => NOT,
        Expression::Between { .. } | Expression::In { .. } => COMPARISON,
        _ => ATOM,
    }
}

/// An operand needs parentheses when it binds looser than its parent, or
///  equally on a side where regrouping would change the result. On the right
///  only the same fully associative operator may drop them: `a + (b + c)`
///  but `a * (b / c)`.
fn needs_parentheses(
    child: &Expression,
    parent_strength: i32,
    parent_op: Option<BinaryOp>,
    is_left: bool,
) -> bool {
    match binding_strength(child).cmp(&parent_strength) {
        Ordering::Greater => false,
        Ordering::Less => true,
        Ordering::Equal => match (parent_op, child) {
            (Some(op), _) if is_left => op.associativity() == Associativity::Neither,
            (Some(op), Expression::BinaryOperator(_, child_op, _)) => {
                !(op.associativity() == Associativity::Both && *child_op == op)
            }
            _ => true,
        },
    }
}

fn write_operand(
    out: &mut Formatter,
    conf: &PrinterConfig,
    child: &Expression,
    parent_strength: i32,
    parent_op: Option<BinaryOp>,
    is_left: bool,
) -> Result {
    if needs_parentheses(child, parent_strength, parent_op, is_left) {
        write!(out, "(")?;
        child.to_sql(out, conf)?;
        write!(out, ")")
    } else {
        child.to_sql(out, conf)
    }
}

pub(crate) fn write_list<T: ToSQL>(
    out: &mut Formatter,
    conf: &PrinterConfig,
    items: &[T],
) -> Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(out, ", ")?;
        }
        item.to_sql(out, conf)?;
    }
    Ok(())
}

impl ToSQL for BinaryOp {
    fn to_sql(&self, out: &mut Formatter, _: &PrinterConfig) -> Result {
        match self {
            BinaryOp::Add => write!(out, "+"),
            BinaryOp::Sub => write!(out, "-"),
            BinaryOp::Mul => write!(out, "*"),
            BinaryOp::Div => write!(out, "/"),
            BinaryOp::Mod => write!(out, "%"),
            BinaryOp::Concat => write!(out, "||"),

            BinaryOp::Eq => write!(out, "="),
            BinaryOp::Ne => write!(out, "!="),
            BinaryOp::Lt => write!(out, "<"),
            BinaryOp::Le => write!(out, "<="),
            BinaryOp::Gt => write!(out, ">"),
            BinaryOp::Ge => write!(out, ">="),
            BinaryOp::And => write!(out, "AND"),
            BinaryOp::Or => write!(out, "OR"),
            BinaryOp::Like => write!(out, "LIKE"),
            BinaryOp::Custom(token) => write!(out, "{token}"),
        }
    }
}

impl ToSQL for Expression {
    fn to_sql(&self, out: &mut Formatter, conf: &PrinterConfig) -> Result {
        match self {
            Expression::Literal(lit) => out.write_str(&conf.dialect.format_literal(lit)),
            Expression::Identifier { qualifier, name } => {
                if let Some(q) = qualifier {
                    write!(out, "{}.", conf.dialect.quote_identifier(q))?;
                }
                out.write_str(&conf.dialect.quote_identifier(name))
            }
            Expression::Star => write!(out, "*"),
            Expression::List(items) => {
                write!(out, "(")?;
                write_list(out, conf, items)?;
                write!(out, ")")
            }
            Expression::FunctionCall {
                name,
                args,
                distinct,
            } => {
                write!(out, "{name}(")?;
                if *distinct {
                    write!(out, "DISTINCT ")?;
                }
                write_list(out, conf, args)?;
                write!(out, ")")
            }
            Expression::BinaryOperator(l, op, r) => {
                let strength = op.binding_strength();
                write_operand(out, conf, l, strength, Some(*op), true)?;
                write!(out, " ")?;
                op.to_sql(out, conf)?;
                write!(out, " ")?;
                write_operand(out, conf, r, strength, Some(*op), false)
            }
            Expression::UnaryOperator(op, exp) => {
                match op {
                    UnaryOp::Not => write!(out, "NOT("),
                    UnaryOp::Neg => write!(out, "-("),
                }?;
                exp.to_sql(out, conf)?;
                write!(out, ")")
            }
            Expression::IsNull(exp) => {
                write!(out, "((")?;
                exp.to_sql(out, conf)?;
                write!(out, ") IS NULL)")
            }
            Expression::Between { expr, low, high } => {
                write_operand(out, conf, expr, COMPARISON, None, true)?;
                write!(out, " BETWEEN ")?;
                write_operand(out, conf, low, COMPARISON, None, false)?;
                write!(out, " AND ")?;
                write_operand(out, conf, high, COMPARISON, None, false)
            }
            Expression::In { expr, list } => {
                write_operand(out, conf, expr, COMPARISON, None, true)?;
                write!(out, " IN ")?;
                list.to_sql(out, conf)
            }
            Expression::Case { branches, r#else } => {
                write!(out, "CASE")?;
                for branch in branches {
                    write!(out, " WHEN (")?;
                    branch.cond.to_sql(out, conf)?;
                    write!(out, ") THEN (")?;
                    branch.then.to_sql(out, conf)?;
                    write!(out, ")")?;
                }
                if let Some(e) = r#else {
                    write!(out, " ELSE (")?;
                    e.to_sql(out, conf)?;
                    write!(out, ")")?;
                }
                write!(out, " END")
            }
            Expression::Cast(expr, to) => {
                write!(out, "CAST(")?;
                expr.to_sql(out, conf)?;
                write!(out, " AS {to})")
            }
            Expression::Window {
                function,
                partition,
                order,
                frame,
            } => {
                function.to_sql(out, conf)?;
                write!(out, " OVER (")?;
                let mut sep = "";
                if !partition.is_empty() {
                    write!(out, "PARTITION BY ")?;
                    write_list(out, conf, partition)?;
                    sep = " ";
                }
                if !order.is_empty() {
                    write!(out, "{sep}ORDER BY ")?;
                    write_list(out, conf, order)?;
                    sep = " ";
                }
                if let Some(frame) = frame {
                    write!(out, "{sep}{frame}")?;
                }
                write!(out, ")")
            }
            Expression::WithinGroup { function, order } => {
                function.to_sql(out, conf)?;
                write!(out, " WITHIN GROUP (ORDER BY ")?;
                write_list(out, conf, order)?;
                write!(out, ")")
            }
            Expression::Desc(exp) => {
                exp.to_sql(out, conf)?;
                write!(out, " DESC")
            }
            Expression::Raw(sql) => out.write_str(sql.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Literal;
    use pretty_assertions::assert_eq;

    fn print(e: &Expression) -> String {
        let dialect = Dialect::ansi();
        Printer::new(e, PrinterConfig::new(&dialect)).to_string()
    }

    fn bin(l: Expression, op: BinaryOp, r: Expression) -> Expression {
        Expression::BinaryOperator(Box::new(l), op, Box::new(r))
    }

    fn x(name: &str) -> Expression {
        Expression::ident(name)
    }

    #[test]
    fn parenthesizes_only_when_needed() {
        let e = bin(x("a"), BinaryOp::Add, bin(x("b"), BinaryOp::Mul, x("c")));
        assert_eq!(print(&e), r#""a" + "b" * "c""#);
        let e = bin(bin(x("a"), BinaryOp::Add, x("b")), BinaryOp::Mul, x("c"));
        assert_eq!(print(&e), r#"("a" + "b") * "c""#);
        let e = bin(bin(x("a"), BinaryOp::Sub, x("b")), BinaryOp::Sub, x("c"));
        assert_eq!(print(&e), r#""a" - "b" - "c""#);
        let e = bin(x("a"), BinaryOp::Sub, bin(x("b"), BinaryOp::Sub, x("c")));
        assert_eq!(print(&e), r#""a" - ("b" - "c")"#);
        let e = bin(x("a"), BinaryOp::Mul, bin(x("b"), BinaryOp::Div, x("c")));
        assert_eq!(print(&e), r#""a" * ("b" / "c")"#);
        let e = bin(x("a"), BinaryOp::Or, bin(x("b"), BinaryOp::Or, x("c")));
        assert_eq!(print(&e), r#""a" OR "b" OR "c""#);
    }

    #[test]
    fn logic_binds_looser_than_comparison() {
        let e = bin(
            bin(x("a"), BinaryOp::Gt, x("b")),
            BinaryOp::And,
            bin(bin(x("c"), BinaryOp::Eq, x("d")), BinaryOp::Or, x("e")),
        );
        assert_eq!(print(&e), r#""a" > "b" AND ("c" = "d" OR "e")"#);
        let e = bin(
            bin(x("a"), BinaryOp::Eq, x("b")),
            BinaryOp::Eq,
            x("c"),
        );
        assert_eq!(print(&e), r#"("a" = "b") = "c""#);
    }

    #[test]
    fn unary_forms() {
        let neg = Expression::UnaryOperator(UnaryOp::Neg, Box::new(x("a")));
        assert_eq!(print(&bin(neg, BinaryOp::Mul, x("b"))), r#"-("a") * "b""#);
        let not = Expression::UnaryOperator(UnaryOp::Not, Box::new(x("a")));
        assert_eq!(
            print(&bin(not, BinaryOp::And, x("b"))),
            r#"NOT("a") AND "b""#
        );
        let null = Expression::IsNull(Box::new(x("a")));
        assert_eq!(print(&null), r#"(("a") IS NULL)"#);
    }

    #[test]
    fn windows() {
        let e = Expression::Window {
            function: Box::new(Expression::call("SUM", vec![x("v")])),
            partition: vec![x("g")],
            order: vec![Expression::Desc(Box::new(x("t")))],
            frame: Some(crate::translate::Frame::rows(Some(-2), Some(0))),
        };
        assert_eq!(
            print(&e),
            r#"SUM("v") OVER (PARTITION BY "g" ORDER BY "t" DESC ROWS BETWEEN 2 PRECEDING AND CURRENT ROW)"#
        );
        let e = Expression::Window {
            function: Box::new(Expression::call("AVG", vec![x("v")])),
            partition: vec![],
            order: vec![],
            frame: None,
        };
        assert_eq!(print(&e), r#"AVG("v") OVER ()"#);
    }

    #[test]
    fn between_and_in_operands() {
        let e = Expression::Between {
            expr: Box::new(bin(x("a"), BinaryOp::Add, x("b"))),
            low: Box::new(Expression::Literal(Literal::Integer(Some(1)))),
            high: Box::new(Expression::Literal(Literal::Double(Some(2.0)))),
        };
        assert_eq!(print(&e), r#""a" + "b" BETWEEN 1 AND 2.0"#);
        let e = Expression::In {
            expr: Box::new(x("a")),
            list: Box::new(x("b")),
        };
        assert_eq!(print(&e), r#""a" IN "b""#);
    }
}
