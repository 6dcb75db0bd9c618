use super::{Arity::*, CastTypes, ConcatStyle, Dialect, Rule, RuleKind as K};

pub(super) fn dialect() -> Dialect {
    Dialect {
        name: "mysql",
        identifier_quote: ('`', '`'),
        escape_backslash: true,
        cast_types: CastTypes {
            integer: "SIGNED INTEGER",
            double: "DOUBLE",
            character: "CHAR",
            logical: "SIGNED INTEGER",
            date: "DATE",
        },
        ..Dialect::ansi()
    }
    .with_rule("pmin", Rule::new(K::Scalar("LEAST"), AtLeast(1)))
    .with_rule("pmax", Rule::new(K::Scalar("GREATEST"), AtLeast(1)))
    .with_rule(
        "grepl",
        Rule::new(K::Regex("REGEXP"), Exact(2)).params(&["pattern", "x"]),
    )
    .with_rule(
        "median",
        Rule::new(K::Unsupported("median()"), Exact(1)).params(&["x"]),
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
