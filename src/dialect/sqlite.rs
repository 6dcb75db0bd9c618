use super::{Arity::*, CastTypes, Dialect, LogStyle, Rule, RuleKind as K};

const X: &[&str] = &["x"];

pub(super) fn dialect() -> Dialect {
    Dialect {
        name: "sqlite",
        modulo_function: None,
        explain_prefix: Some("EXPLAIN QUERY PLAN "),
        cast_types: CastTypes {
            integer: "INTEGER",
            double: "REAL",
            character: "TEXT",
            logical: "INTEGER",
            date: "TEXT",
        },
        ..Dialect::ansi()
    }
    .with_rule("sd", Rule::new(K::Unsupported("sd()"), Exact(1)).params(X))
    .with_rule("var", Rule::new(K::Unsupported("var()"), Exact(1)).params(X))
    .with_rule("median", Rule::new(K::Unsupported("median()"), Exact(1)).params(X))
    .with_rules(
        "log",
        vec![
            Rule::new(K::Scalar("LN"), Exact(1)).params(&["x", "base"]),
            Rule::new(K::LogBase(LogStyle::Rewrite), Exact(2)).params(&["x", "base"]),
        ],
    )
}
