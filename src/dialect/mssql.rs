use super::{
    Arity::*, CastTypes, ConcatStyle, Dialect, LimitStyle, LogStyle, Rule, RuleKind as K,
    TempTableStyle,
};

const X: &[&str] = &["x"];

pub(super) fn dialect() -> Dialect {
    Dialect {
        name: "mssql",
        identifier_quote: ('[', ']'),
        modulo_function: None,
        limit_style: LimitStyle::Top,
        explain_prefix: None,
        temp_table: TempTableStyle::SelectInto,
        cast_types: CastTypes {
            integer: "INT",
            double: "FLOAT",
            character: "VARCHAR(MAX)",
            logical: "BIT",
            date: "DATE",
        },
        ..Dialect::ansi()
    }
    .with_rule("nchar", Rule::new(K::Scalar("LEN"), Exact(1)).params(X))
    .with_rule("ceiling", Rule::new(K::Scalar("CEILING"), Exact(1)).params(X))
    .with_rule("sd", Rule::new(K::Aggregate("STDEV"), Exact(1)).params(X))
    .with_rule("var", Rule::new(K::Aggregate("VAR"), Exact(1)).params(X))
    .with_rule("median", Rule::new(K::Unsupported("median()"), Exact(1)).params(X))
    // no scalar MIN/MAX in T-SQL; LEAST/GREATEST need SQL Server 2022
    .with_rule("pmin", Rule::new(K::Scalar("LEAST"), AtLeast(1)))
    .with_rule("pmax", Rule::new(K::Scalar("GREATEST"), AtLeast(1)))
    .with_rule("atan2", Rule::new(K::Scalar("ATN2"), Exact(2)).params(&["y", "x"]))
    .with_rule(
        "substr",
        Rule::new(K::Substr("SUBSTRING"), Exact(3)).params(&["x", "start", "stop"]),
    )
    .with_rules(
        "log",
        vec![
            Rule::new(K::Scalar("LOG"), Exact(1)).params(&["x", "base"]),
            Rule::new(K::LogBase(LogStyle::BaseLast), Exact(2)).params(&["x", "base"]),
        ],
    )
    .with_rule(
        "paste",
        Rule::new(
            K::Paste {
                sep: " ",
                style: ConcatStyle::ConcatWs,
            },
            AtLeast(1),
        )
        .keywords(&["sep"]),
    )
    .with_rule(
        "paste0",
        Rule::new(
            K::Paste {
                sep: "",
                style: ConcatStyle::ConcatWs,
            },
            AtLeast(1),
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::CastTo;

    #[test]
    fn mssql_conventions() {
        let d = dialect();
        assert_eq!(d.limit_style(), LimitStyle::Top);
        assert_eq!(d.cast_type(CastTo::Logical), "BIT");
        assert_eq!(d.rules_for("nchar").unwrap()[0].kind, K::Scalar("LEN"));
        assert_eq!(d.rules_for("pmin").unwrap()[0].kind, K::Scalar("LEAST"));
        assert_eq!(d.rules_for("pmax").unwrap()[0].kind, K::Scalar("GREATEST"));
        assert!(matches!(
            d.rules_for("grepl").unwrap()[0].kind,
            K::Unsupported(_)
        ));
    }
}
