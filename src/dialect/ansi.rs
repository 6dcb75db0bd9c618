use std::collections::HashMap;

use super::{Arity::*, CastTo, ConcatStyle, LogStyle, Rule, RuleKind as K};
use crate::translate::BinaryOp;

const X: &[&str] = &["x"];
const WINDOW_ORDER: &[&str] = &["order_by"];

/// The base table. Every other dialect clones this and swaps entries.
pub(super) fn rules() -> HashMap<&'static str, Vec<Rule>> {
    let table: Vec<(&'static str, Rule)> = vec![
        // operators
        ("+", Rule::new(K::Infix(BinaryOp::Add), Exact(2))),
        ("+", Rule::new(K::Identity, Exact(1))),
        ("-", Rule::new(K::Infix(BinaryOp::Sub), Exact(2))),
        ("-", Rule::new(K::Negate, Exact(1))),
        ("*", Rule::new(K::Infix(BinaryOp::Mul), Exact(2))),
        ("/", Rule::new(K::Infix(BinaryOp::Div), Exact(2))),
        ("%%", Rule::new(K::Modulo, Exact(2))),
        ("%/%", Rule::new(K::IntegerDivide, Exact(2))),
        ("^", Rule::new(K::Power, Exact(2))),
        ("(", Rule::new(K::Identity, Exact(1))),
        ("identity", Rule::new(K::Identity, Exact(1)).params(X)),
        ("==", Rule::new(K::Infix(BinaryOp::Eq), Exact(2))),
        ("!=", Rule::new(K::Infix(BinaryOp::Ne), Exact(2))),
        ("<", Rule::new(K::Infix(BinaryOp::Lt), Exact(2))),
        ("<=", Rule::new(K::Infix(BinaryOp::Le), Exact(2))),
        (">", Rule::new(K::Infix(BinaryOp::Gt), Exact(2))),
        (">=", Rule::new(K::Infix(BinaryOp::Ge), Exact(2))),
        ("&", Rule::new(K::Infix(BinaryOp::And), Exact(2))),
        ("&&", Rule::new(K::Infix(BinaryOp::And), Exact(2))),
        ("|", Rule::new(K::Infix(BinaryOp::Or), Exact(2))),
        ("||", Rule::new(K::Infix(BinaryOp::Or), Exact(2))),
        ("!", Rule::new(K::Not, Exact(1))),
        ("%in%", Rule::new(K::In, Exact(2))),
        ("%like%", Rule::new(K::Infix(BinaryOp::Like), Exact(2))),
        ("is.na", Rule::new(K::IsNull, Exact(1)).params(X)),
        ("is.null", Rule::new(K::IsNull, Exact(1)).params(X)),
        (
            "between",
            Rule::new(K::Between, Exact(3)).params(&["x", "left", "right"]),
        ),
        ("c", Rule::new(K::Combine, AtLeast(0))),
        ("desc", Rule::new(K::Desc, Exact(1)).params(X)),
        ("sql", Rule::new(K::Raw, Exact(1))),
        // conditionals
        (
            "if",
            Rule::new(K::Conditional, Between(2, 3)).params(&["cond", "yes", "no"]),
        ),
        (
            "ifelse",
            Rule::new(K::Conditional, Between(2, 3)).params(&["test", "yes", "no"]),
        ),
        (
            "if_else",
            Rule::new(K::Conditional, Between(2, 3)).params(&["condition", "true", "false"]),
        ),
        (
            "case_when",
            Rule::new(K::CaseWhen, AtLeast(1)).keywords(&[".default"]),
        ),
        ("coalesce", Rule::new(K::Scalar("COALESCE"), AtLeast(1))),
        ("pmin", Rule::new(K::Scalar("MIN"), AtLeast(1))),
        ("pmax", Rule::new(K::Scalar("MAX"), AtLeast(1))),
        // casts
        ("as.integer", Rule::new(K::Cast(CastTo::Integer), Exact(1)).params(X)),
        ("as.numeric", Rule::new(K::Cast(CastTo::Double), Exact(1)).params(X)),
        ("as.double", Rule::new(K::Cast(CastTo::Double), Exact(1)).params(X)),
        (
            "as.character",
            Rule::new(K::Cast(CastTo::Character), Exact(1)).params(X),
        ),
        ("as.logical", Rule::new(K::Cast(CastTo::Logical), Exact(1)).params(X)),
        ("as.Date", Rule::new(K::Cast(CastTo::Date), Exact(1)).params(X)),
        // math
        ("abs", Rule::new(K::Scalar("ABS"), Exact(1)).params(X)),
        ("sqrt", Rule::new(K::Scalar("SQRT"), Exact(1)).params(X)),
        ("exp", Rule::new(K::Scalar("EXP"), Exact(1)).params(X)),
        ("floor", Rule::new(K::Scalar("FLOOR"), Exact(1)).params(X)),
        ("ceiling", Rule::new(K::Scalar("CEIL"), Exact(1)).params(X)),
        ("sign", Rule::new(K::Scalar("SIGN"), Exact(1)).params(X)),
        ("sin", Rule::new(K::Scalar("SIN"), Exact(1)).params(X)),
        ("cos", Rule::new(K::Scalar("COS"), Exact(1)).params(X)),
        ("tan", Rule::new(K::Scalar("TAN"), Exact(1)).params(X)),
        ("asin", Rule::new(K::Scalar("ASIN"), Exact(1)).params(X)),
        ("acos", Rule::new(K::Scalar("ACOS"), Exact(1)).params(X)),
        ("atan", Rule::new(K::Scalar("ATAN"), Exact(1)).params(X)),
        ("atan2", Rule::new(K::Scalar("ATAN2"), Exact(2)).params(&["y", "x"])),
        ("log", Rule::new(K::Scalar("LN"), Exact(1)).params(&["x", "base"])),
        (
            "log",
            Rule::new(K::LogBase(LogStyle::BaseFirst), Exact(2)).params(&["x", "base"]),
        ),
        ("log10", Rule::new(K::Scalar("LOG10"), Exact(1)).params(X)),
        ("round", Rule::new(K::Round, Between(1, 2)).params(&["x", "digits"])),
        // strings
        ("nchar", Rule::new(K::Scalar("LENGTH"), Exact(1)).params(X)),
        ("toupper", Rule::new(K::Scalar("UPPER"), Exact(1)).params(X)),
        ("tolower", Rule::new(K::Scalar("LOWER"), Exact(1)).params(X)),
        ("trimws", Rule::new(K::Scalar("TRIM"), Exact(1)).params(X)),
        (
            "substr",
            Rule::new(K::Substr("SUBSTR"), Exact(3)).params(&["x", "start", "stop"]),
        ),
        (
            "paste",
            Rule::new(
                K::Paste {
                    sep: " ",
                    style: ConcatStyle::Operator,
                },
                AtLeast(1),
            )
            .keywords(&["sep"]),
        ),
        (
            "paste0",
            Rule::new(
                K::Paste {
                    sep: "",
                    style: ConcatStyle::Operator,
                },
                AtLeast(1),
            ),
        ),
        (
            "grepl",
            Rule::new(K::Unsupported("regular expression matching"), Exact(2))
                .params(&["pattern", "x"]),
        ),
        // aggregates
        ("mean", Rule::new(K::Aggregate("AVG"), Exact(1)).params(X)),
        ("sum", Rule::new(K::Aggregate("SUM"), Exact(1)).params(X)),
        ("min", Rule::new(K::Aggregate("MIN"), Exact(1)).params(X)),
        ("max", Rule::new(K::Aggregate("MAX"), Exact(1)).params(X)),
        ("sd", Rule::new(K::Aggregate("STDDEV_SAMP"), Exact(1)).params(X)),
        ("var", Rule::new(K::Aggregate("VAR_SAMP"), Exact(1)).params(X)),
        ("count", Rule::new(K::Aggregate("COUNT"), Exact(1)).params(X)),
        ("all", Rule::new(K::Aggregate("MIN"), Exact(1)).params(X)),
        ("any", Rule::new(K::Aggregate("MAX"), Exact(1)).params(X)),
        ("median", Rule::new(K::Median, Exact(1)).params(X)),
        ("n", Rule::new(K::CountAll, Exact(0))),
        ("n_distinct", Rule::new(K::CountDistinct, Exact(1)).params(X)),
        // window functions
        ("cumsum", Rule::new(K::Cumulative("SUM"), Exact(1)).params(X)),
        ("cummean", Rule::new(K::Cumulative("AVG"), Exact(1)).params(X)),
        ("cummin", Rule::new(K::Cumulative("MIN"), Exact(1)).params(X)),
        ("cummax", Rule::new(K::Cumulative("MAX"), Exact(1)).params(X)),
        ("cumall", Rule::new(K::Cumulative("MIN"), Exact(1)).params(X)),
        ("cumany", Rule::new(K::Cumulative("MAX"), Exact(1)).params(X)),
        ("cumprod", Rule::new(K::CumulativeProduct, Exact(1)).params(X)),
        ("row_number", Rule::new(K::Ranking("ROW_NUMBER"), Between(0, 1)).params(X)),
        ("min_rank", Rule::new(K::Ranking("RANK"), Between(0, 1)).params(X)),
        ("rank", Rule::new(K::Ranking("RANK"), Between(0, 1)).params(X)),
        ("dense_rank", Rule::new(K::Ranking("DENSE_RANK"), Between(0, 1)).params(X)),
        (
            "percent_rank",
            Rule::new(K::Ranking("PERCENT_RANK"), Between(0, 1)).params(X),
        ),
        ("cume_dist", Rule::new(K::Ranking("CUME_DIST"), Between(0, 1)).params(X)),
        ("ntile", Rule::new(K::Ntile, Between(1, 2)).params(&["x", "n"])),
        (
            "lead",
            Rule::new(K::Offset("LEAD"), Between(1, 3))
                .params(&["x", "n", "default"])
                .keywords(WINDOW_ORDER),
        ),
        (
            "lag",
            Rule::new(K::Offset("LAG"), Between(1, 3))
                .params(&["x", "n", "default"])
                .keywords(WINDOW_ORDER),
        ),
        (
            "first",
            Rule::new(K::Positional("FIRST_VALUE"), Exact(1))
                .params(X)
                .keywords(WINDOW_ORDER),
        ),
        (
            "last",
            Rule::new(K::Positional("LAST_VALUE"), Exact(1))
                .params(X)
                .keywords(WINDOW_ORDER),
        ),
        (
            "nth",
            Rule::new(K::Positional("NTH_VALUE"), Exact(2))
                .params(&["x", "n"])
                .keywords(WINDOW_ORDER),
        ),
    ];

    let mut rules: HashMap<&'static str, Vec<Rule>> = HashMap::new();
    for (name, rule) in table {
        rules.entry(name).or_default().push(rule);
    }
    rules
}
