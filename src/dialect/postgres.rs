use super::{Arity::*, CastTypes, ConcatStyle, Dialect, Rule, RuleKind as K};

const X: &[&str] = &["x"];

pub(super) fn dialect() -> Dialect {
    Dialect {
        name: "postgres",
        cast_types: CastTypes {
            integer: "INTEGER",
            double: "DOUBLE PRECISION",
            character: "TEXT",
            logical: "BOOLEAN",
            date: "DATE",
        },
        ..Dialect::ansi()
    }
    .with_rule("pmin", Rule::new(K::Scalar("LEAST"), AtLeast(1)))
    .with_rule("pmax", Rule::new(K::Scalar("GREATEST"), AtLeast(1)))
    .with_rule(
        "grepl",
        Rule::new(K::Regex("~"), Exact(2)).params(&["pattern", "x"]),
    )
    .with_rule("all", Rule::new(K::Aggregate("BOOL_AND"), Exact(1)).params(X))
    .with_rule("any", Rule::new(K::Aggregate("BOOL_OR"), Exact(1)).params(X))
    .with_rule("cumall", Rule::new(K::Cumulative("BOOL_AND"), Exact(1)).params(X))
    .with_rule("cumany", Rule::new(K::Cumulative("BOOL_OR"), Exact(1)).params(X))
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

    #[test]
    fn overrides_regex_and_least() {
        let d = dialect();
        assert_eq!(d.rules_for("grepl").unwrap()[0].kind, K::Regex("~"));
        assert_eq!(d.rules_for("pmin").unwrap()[0].kind, K::Scalar("LEAST"));
        // untouched entries come from the base table
        assert_eq!(d.rules_for("sd").unwrap()[0].kind, K::Aggregate("STDDEV_SAMP"));
    }
}
