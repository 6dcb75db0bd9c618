use crate::{
    ast::{self, call, call_named, dbl, int, lgl, na, string, sym},
    dialect::{Dialect, format_double},
    error::{Error, Warning},
    evaluate::Environment,
    translate::{Frame, TranslateOptions, Translation, translate},
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn translate_with(
    expr: &ast::Expression,
    dialect: &Dialect,
    options: &TranslateOptions,
) -> crate::Result<Translation> {
    init_logging();
    translate(expr, dialect, options)
}

/// ANSI SQL for `expr` with default options.
pub fn ansi(expr: &ast::Expression) -> String {
    sql_for(expr, &Dialect::ansi())
}

pub fn sql_for(expr: &ast::Expression, dialect: &Dialect) -> String {
    translate_with(expr, dialect, &TranslateOptions::default())
        .unwrap()
        .sql
        .into_string()
}

pub fn windowed(group_by: &[&str], order_by: Vec<ast::Expression>) -> TranslateOptions {
    TranslateOptions {
        windowed: true,
        group_by: group_by.iter().map(|g| g.to_string()).collect(),
        order_by,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn numbers_keep_host_kinds() {
        assert_eq!(ansi(&call("+", [dbl(1.0), dbl(2.0)])), "1.0 + 2.0");
        assert_eq!(ansi(&call("+", [int(1), int(2)])), "1 + 2");
        assert_eq!(ansi(&call("^", [dbl(5.0), dbl(2.0)])), "POWER(5.0, 2.0)");
    }

    #[test]
    fn doubles_parse_back() {
        let dialect = Dialect::ansi();
        for d in [
            1e-9,
            -2.5e-5,
            1.5e-7,
            0.1,
            1.0 / 3.0,
            2.0 / 3.0,
            123456.789,
            -42.0,
            1e15,
            9.99e14,
        ] {
            let text = dialect.format_literal(&ast::Literal::Double(Some(d)));
            assert_ne!(text, "0", "{d} rendered as zero");
            assert_eq!(text.parse::<f64>().unwrap(), d, "{d} became {text}");
        }
        assert!(matches!(
            format_double(f64::NAN),
            crate::dialect::DoubleText::Null
        ));
    }

    #[test]
    fn logicals_and_missing_values() {
        assert_eq!(ansi(&lgl(true)), "1");
        assert_eq!(ansi(&lgl(false)), "0");
        assert_eq!(ansi(&na()), "NULL");
        assert_eq!(
            ansi(&call("%in%", [sym("x"), call("c", [lgl(true), lgl(false), na()])])),
            r#""x" IN (1, 0, NULL)"#
        );
        assert_eq!(
            ansi(&call("if_else", [sym("x"), lgl(true), na()])),
            r#"CASE WHEN ("x") THEN (1) ELSE (NULL) END"#
        );
    }

    #[test]
    fn precedence_follows_the_tree() {
        let three = dbl(3.0);
        assert_eq!(
            ansi(&call("+", [dbl(1.0), call("*", [dbl(2.0), three.clone()])])),
            "1.0 + 2.0 * 3.0"
        );
        assert_eq!(
            ansi(&call(
                "*",
                [call("(", [call("+", [dbl(1.0), dbl(2.0)])]), three.clone()]
            )),
            "(1.0 + 2.0) * 3.0"
        );
        assert_eq!(
            ansi(&call("*", [call("+", [dbl(1.0), dbl(2.0)]), three])),
            "(1.0 + 2.0) * 3.0"
        );
        assert_eq!(
            ansi(&call(
                "!",
                [call("&", [sym("a"), call("|", [sym("b"), sym("c")])])]
            )),
            r#"NOT("a" AND ("b" OR "c"))"#
        );
        assert_eq!(
            ansi(&call("-", [sym("a"), call("-", [sym("b"), sym("c")])])),
            r#""a" - ("b" - "c")"#
        );
    }

    #[test]
    fn aggregates_ignore_ordering() {
        let sum = call("sum", [sym("x")]);
        let plain = translate_with(&sum, &Dialect::ansi(), &TranslateOptions::default()).unwrap();
        let ordered = translate_with(
            &sum,
            &Dialect::ansi(),
            &TranslateOptions {
                order_by: vec![sym("t")],
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(plain, ordered);
        assert_eq!(plain.sql.as_str(), r#"SUM("x")"#);

        let over = translate_with(&sum, &Dialect::ansi(), &windowed(&["g"], vec![]))
            .unwrap()
            .sql;
        let over_ordered =
            translate_with(&sum, &Dialect::ansi(), &windowed(&["g"], vec![sym("t")]))
                .unwrap()
                .sql;
        assert_eq!(over, over_ordered);
        assert_eq!(over.as_str(), r#"SUM("x") OVER (PARTITION BY "g")"#);
    }

    #[test]
    fn in_lists() {
        assert_eq!(
            ansi(&call("%in%", [sym("x"), call("c", [sym("a")])])),
            r#""x" IN ("a")"#
        );
        assert_eq!(
            ansi(&call("%in%", [sym("x"), call("c", [sym("a"), sym("b")])])),
            r#""x" IN ("a", "b")"#
        );
        assert_eq!(ansi(&call("%in%", [sym("x"), sym("y")])), r#""x" IN "y""#);
        assert_eq!(
            ansi(&call("%in%", [sym("x"), call(":", [dbl(1.0), dbl(2.0)])])),
            r#""x" IN (1, 2)"#
        );
        assert_eq!(ansi(&call("%in%", [sym("x"), call("c", [])])), "0");
    }

    #[test]
    fn conditional_spellings_agree() {
        let expected = r#"CASE WHEN ("x") THEN (1.0) ELSE (2.0) END"#;
        for name in ["if", "ifelse", "if_else"] {
            assert_eq!(
                ansi(&call(name, [sym("x"), dbl(1.0), dbl(2.0)])),
                expected,
                "{name}"
            );
        }
        assert_eq!(
            ansi(&call_named(
                "if_else",
                [],
                [
                    ("false", dbl(2.0)),
                    ("condition", sym("x")),
                    ("true", dbl(1.0)),
                ]
            )),
            expected
        );
        assert_eq!(
            ansi(&call(
                "case_when",
                [
                    call("~", [call(">", [sym("x"), dbl(1.0)]), string("big")]),
                    call("~", [lgl(true), string("small")]),
                ]
            )),
            r#"CASE WHEN ("x" > 1.0) THEN ('big') ELSE ('small') END"#
        );
    }

    #[test]
    fn between_and_null_tests() {
        assert_eq!(
            ansi(&call("between", [sym("x"), dbl(1.0), dbl(2.0)])),
            r#""x" BETWEEN 1.0 AND 2.0"#
        );
        assert_eq!(ansi(&call("is.na", [sym("x")])), r#"(("x") IS NULL)"#);
        assert_eq!(
            ansi(&call("!", [call("is.na", [sym("x")])])),
            r#"NOT((("x") IS NULL))"#
        );
    }

    #[test]
    fn local_values_fold_into_literals() {
        let env = Environment::new().with("a", 2.0).with("name", "bob");
        let options = TranslateOptions {
            env,
            ..Default::default()
        };
        let mixed = call("+", [sym("x"), call("*", [sym("a"), dbl(3.0)])]);
        assert_eq!(
            translate_with(&mixed, &Dialect::ansi(), &options)
                .unwrap()
                .sql
                .as_str(),
            r#""x" + 6.0"#
        );
        let local = call("*", [sym("a"), dbl(3.0)]);
        assert_eq!(
            translate_with(&local, &Dialect::ansi(), &options)
                .unwrap()
                .sql
                .as_str(),
            "6.0"
        );
        let quoted = call("==", [sym("user"), sym("name")]);
        assert_eq!(
            translate_with(&quoted, &Dialect::ansi(), &options)
                .unwrap()
                .sql
                .as_str(),
            r#""user" = 'bob'"#
        );
    }

    #[test]
    fn columns_shadow_locals() {
        let options = TranslateOptions {
            env: Environment::new().with("x", 10_i64),
            columns: vec!["x".to_string()],
            ..Default::default()
        };
        let e = call("+", [sym("x"), int(1)]);
        assert_eq!(
            translate_with(&e, &Dialect::ansi(), &options)
                .unwrap()
                .sql
                .as_str(),
            r#""x" + 1"#
        );
    }

    #[test]
    fn local_failures_name_the_subexpression() {
        let e = call("+", [sym("x"), call("$", [sym(".env"), sym("nope")])]);
        let err = translate_with(&e, &Dialect::ansi(), &TranslateOptions::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to evaluate `.env$nope` locally: object 'nope' not found"
        );
    }

    #[test]
    fn strict_mode() {
        let strict = TranslateOptions {
            strict: true,
            ..Default::default()
        };
        let known = call("abs", [sym("x")]);
        assert_eq!(
            translate_with(&known, &Dialect::ansi(), &strict).unwrap(),
            translate_with(&known, &Dialect::ansi(), &TranslateOptions::default()).unwrap()
        );

        let unknown = call("foo", [sym("x"), dbl(1.0)]);
        assert_eq!(ansi(&unknown), r#"foo("x", 1.0)"#);
        let err = translate_with(&unknown, &Dialect::ansi(), &strict).unwrap_err();
        assert!(matches!(err, Error::UnknownFunction(ref name) if name == "foo"));

        let nested = call("cumsum", [call("foo", [sym("x")])]);
        let strict_windowed = TranslateOptions {
            strict: true,
            ..windowed(&[], vec![sym("t")])
        };
        assert!(matches!(
            translate_with(&nested, &Dialect::ansi(), &strict_windowed),
            Err(Error::UnknownFunction(_))
        ));
    }

    #[test]
    fn passthrough_rejects_unsafe_names() {
        let e = call("drop table x; --", [sym("x")]);
        assert!(matches!(
            translate_with(&e, &Dialect::ansi(), &TranslateOptions::default()),
            Err(Error::InvalidFunctionName(_))
        ));
    }

    #[test]
    fn quoting_is_injection_safe() {
        assert_eq!(ansi(&sym(r#"a"b"#)), r#""a""b""#);
        assert_eq!(ansi(&string("it's")), "'it''s'");
        assert_eq!(sql_for(&sym("a]b"), &Dialect::mssql()), "[a]]b]");
        assert_eq!(sql_for(&string(r"a\b"), &Dialect::mysql()), r"'a\\b'");
        assert_eq!(sql_for(&sym("a`b"), &Dialect::mysql()), "`a``b`");
    }

    #[test]
    fn cumulative_without_order_warns() {
        let e = call("cumsum", [sym("x")]);
        let out = translate_with(&e, &Dialect::ansi(), &windowed(&[], vec![])).unwrap();
        assert_eq!(out.sql.as_str(), r#"SUM("x") OVER (ROWS UNBOUNDED PRECEDING)"#);
        assert_eq!(
            out.warnings,
            vec![Warning::MissingWindowOrder {
                expression: "cumsum(x)".to_string()
            }]
        );

        let out = translate_with(&e, &Dialect::ansi(), &windowed(&["g"], vec![sym("t")])).unwrap();
        assert_eq!(
            out.sql.as_str(),
            r#"SUM("x") OVER (PARTITION BY "g" ORDER BY "t" ROWS UNBOUNDED PRECEDING)"#
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn window_functions() {
        let options = windowed(&["g"], vec![sym("t")]);
        let sql = |e: ast::Expression| {
            translate_with(&e, &Dialect::ansi(), &options)
                .unwrap()
                .sql
                .into_string()
        };
        assert_eq!(
            sql(call_named("lag", [sym("x"), dbl(2.0)], [("order_by", sym("d"))])),
            r#"LAG("x", 2) OVER (PARTITION BY "g" ORDER BY "d")"#
        );
        assert_eq!(
            sql(call("lead", [sym("x")])),
            r#"LEAD("x") OVER (PARTITION BY "g" ORDER BY "t")"#
        );
        assert_eq!(
            sql(call("ntile", [sym("x"), dbl(4.0)])),
            r#"NTILE(4) OVER (PARTITION BY "g" ORDER BY "x")"#
        );
        assert_eq!(
            sql(call("min_rank", [call("desc", [sym("x")])])),
            r#"RANK() OVER (PARTITION BY "g" ORDER BY "x" DESC)"#
        );
        assert_eq!(
            sql(call("last", [sym("x")])),
            r#"LAST_VALUE("x") OVER (PARTITION BY "g" ORDER BY "t" ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING)"#
        );

        let framed = TranslateOptions {
            frame: Some(Frame::rows(Some(-1), Some(1))),
            ..windowed(&[], vec![sym("t")])
        };
        assert_eq!(
            translate_with(&call("mean", [sym("x")]), &Dialect::ansi(), &framed)
                .unwrap()
                .sql
                .as_str(),
            r#"AVG("x") OVER (ORDER BY "t" ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING)"#
        );

        let err = translate_with(&call("ntile", [sym("x"), sym("n")]), &Dialect::ansi(), &options)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { index: 2, .. }));

        // bucket counts are rounded before the lower bound applies
        assert_eq!(
            sql(call("ntile", [sym("x"), dbl(0.6)])),
            r#"NTILE(1) OVER (PARTITION BY "g" ORDER BY "x")"#
        );
        for n in [0.4, 0.0, f64::INFINITY] {
            let err = translate_with(&call("ntile", [sym("x"), dbl(n)]), &Dialect::ansi(), &options)
                .unwrap_err();
            assert!(matches!(err, Error::InvalidArgument { index: 2, .. }));
        }
    }

    #[test]
    fn aggregates() {
        assert_eq!(ansi(&call("n", [])), "COUNT(*)");
        assert_eq!(
            ansi(&call("n_distinct", [sym("x")])),
            r#"COUNT(DISTINCT "x")"#
        );
        assert_eq!(
            ansi(&call("median", [sym("x")])),
            r#"PERCENTILE_CONT(0.5) WITHIN GROUP (ORDER BY "x")"#
        );
        assert_eq!(ansi(&call("sd", [sym("x")])), r#"STDDEV_SAMP("x")"#);
    }

    #[test]
    fn scalar_functions() {
        assert_eq!(
            ansi(&call("as.integer", [sym("x")])),
            r#"CAST("x" AS INTEGER)"#
        );
        assert_eq!(
            ansi(&call("substr", [sym("x"), dbl(2.0), dbl(4.0)])),
            r#"SUBSTR("x", 2, 3)"#
        );
        assert_eq!(
            ansi(&call("round", [sym("x"), dbl(2.0)])),
            r#"ROUND("x", 2)"#
        );
        assert_eq!(
            ansi(&call("log", [sym("x"), dbl(2.0)])),
            r#"LOG(2.0, "x")"#
        );
        assert_eq!(ansi(&call("log", [sym("x")])), r#"LN("x")"#);
        assert_eq!(
            ansi(&call("paste", [sym("a"), sym("b")])),
            r#""a" || ' ' || "b""#
        );
        assert_eq!(
            ansi(&call_named("paste", [sym("a"), sym("b")], [("sep", string("-"))])),
            r#""a" || '-' || "b""#
        );
        assert_eq!(
            ansi(&call("paste0", [sym("a"), sym("b")])),
            r#""a" || "b""#
        );
        assert_eq!(ansi(&call("-", [sym("x")])), r#"-("x")"#);
        assert_eq!(ansi(&call("-", [dbl(1.0)])), "-1.0");
        assert_eq!(ansi(&call("%%", [sym("x"), int(2)])), r#""x" % 2"#);
        assert_eq!(ansi(&call("%%", [sym("x"), dbl(2.0)])), r#"MOD("x", 2.0)"#);
        assert_eq!(
            ansi(&call("%/%", [sym("x"), dbl(2.0)])),
            r#"FLOOR("x" / 2.0)"#
        );
        assert_eq!(ansi(&call("sql", [string("NOW()")])), "NOW()");
    }

    #[test]
    fn argument_errors() {
        let err = translate_with(
            &call("abs", [sym("x"), sym("y")]),
            &Dialect::ansi(),
            &TranslateOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "abs() expects 1 argument(s), got 2");

        let out = translate_with(
            &call_named("abs", [sym("x")], [("digits", dbl(1.0))]),
            &Dialect::ansi(),
            &TranslateOptions::default(),
        )
        .unwrap();
        assert_eq!(out.sql.as_str(), r#"ABS("x")"#);
        assert_eq!(
            out.warnings,
            vec![Warning::NamedArgumentIgnored {
                function: "abs".to_string(),
                argument: "digits".to_string(),
            }]
        );
    }

    #[test]
    fn dialect_overrides() {
        let grepl = call("grepl", [string("^a"), sym("x")]);
        assert_eq!(sql_for(&grepl, &Dialect::postgres()), r#""x" ~ '^a'"#);
        assert_eq!(sql_for(&grepl, &Dialect::mysql()), "`x` REGEXP '^a'");
        assert!(matches!(
            translate_with(&grepl, &Dialect::ansi(), &TranslateOptions::default()),
            Err(Error::DialectUnsupportedFeature { dialect: "ansi", .. })
        ));

        let err = translate_with(
            &call("sd", [sym("x")]),
            &Dialect::sqlite(),
            &TranslateOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "The sqlite dialect does not support sd()");

        assert_eq!(
            sql_for(&call("log", [sym("x"), dbl(2.0)]), &Dialect::sqlite()),
            r#"LN("x") / LN(2.0)"#
        );
        assert_eq!(
            sql_for(&call("%%", [sym("x"), dbl(2.0)]), &Dialect::sqlite()),
            r#""x" % 2.0"#
        );
        assert_eq!(sql_for(&call("nchar", [sym("x")]), &Dialect::mssql()), "LEN([x])");
        assert_eq!(
            sql_for(&call("log", [sym("x"), dbl(2.0)]), &Dialect::mssql()),
            "LOG([x], 2.0)"
        );
        assert_eq!(
            sql_for(&call("pmax", [sym("a"), sym("b")]), &Dialect::postgres()),
            r#"GREATEST("a", "b")"#
        );
        assert_eq!(
            sql_for(&call("paste", [sym("a"), sym("b")]), &Dialect::mysql()),
            "CONCAT_WS(' ', `a`, `b`)"
        );
        assert_eq!(
            sql_for(&call("as.character", [sym("x")]), &Dialect::postgres()),
            r#"CAST("x" AS TEXT)"#
        );

        let cumsum = call("cumsum", [sym("x")]);
        assert!(matches!(
            translate_with(&cumsum, &Dialect::sqlite_legacy(), &windowed(&[], vec![sym("t")])),
            Err(Error::DialectUnsupportedFeature {
                dialect: "sqlite_legacy",
                ..
            })
        ));
    }

    #[test]
    fn numeric_edges_translate_or_fail_cleanly() {
        assert_eq!(
            ansi(&call("%%", [int(i64::MIN), int(-1)])),
            "-9223372036854775808 % -1"
        );
        assert_eq!(
            ansi(&call("%/%", [int(i64::MIN), int(-1)])),
            "FLOOR(-9223372036854775808 / -1)"
        );
        assert_eq!(
            ansi(&call("as.Date", [dbl(1e10)])),
            "CAST(10000000000.0 AS DATE)"
        );

        let options = TranslateOptions {
            env: Environment::new()
                .with("v", vec![1_i64, 2, 3])
                .with("s", "abcdef"),
            ..Default::default()
        };
        let subscript = call("[[", [sym("v"), call("/", [dbl(0.0), dbl(0.0)])]);
        assert!(matches!(
            translate_with(&subscript, &Dialect::ansi(), &options),
            Err(Error::LocalEvalFailure { .. })
        ));
        let cut = call("==", [sym("x"), call("substr", [sym("s"), int(3), dbl(f64::NAN)])]);
        assert_eq!(
            translate_with(&cut, &Dialect::ansi(), &options)
                .unwrap()
                .sql
                .as_str(),
            r#""x" = NULL"#
        );
    }

    #[test]
    fn expressions_arrive_as_json() {
        let json = r#"{"call": {"name": ">", "args": [
            {"symbol": "x"},
            {"literal": {"kind": "integer", "value": 3}}
        ]}}"#;
        let expr: ast::Expression = serde_json::from_str(json).unwrap();
        assert_eq!(expr, call(">", [sym("x"), int(3)]));
        assert_eq!(ansi(&expr), r#""x" > 3"#);

        let missing = r#"{"literal": {"kind": "double", "value": null}}"#;
        let expr: ast::Expression = serde_json::from_str(missing).unwrap();
        assert_eq!(ansi(&expr), "NULL");
    }

    #[test]
    fn shared_dialect_across_threads() {
        let dialect = std::sync::Arc::new(Dialect::postgres());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let dialect = dialect.clone();
                std::thread::spawn(move || {
                    translate(
                        &call("+", [sym("x"), int(i)]),
                        &dialect,
                        &TranslateOptions::default(),
                    )
                    .map(|t| t.sql.into_string())
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap().unwrap(), format!(r#""x" + {i}"#));
        }
    }
}
