use criterion::{Criterion, criterion_group, criterion_main};
use pushdown_sql::ast::{call, call_named, dbl, int, string, sym};
use pushdown_sql::{
    CompileOptions, Dialect, Environment, LazyQuery, TranslateOptions, compile, translate,
};

fn expressions() -> Vec<pushdown_sql::ast::Expression> {
    vec![
        call("+", [dbl(1.0), call("*", [dbl(2.0), dbl(3.0)])]),
        call(
            "&",
            [
                call("between", [sym("x"), dbl(1.0), dbl(2.0)]),
                call("%in%", [sym("y"), call(":", [int(1), int(10)])]),
            ],
        ),
        call(
            "case_when",
            [
                call("~", [call(">", [sym("x"), sym("cutoff")]), string("high")]),
                call("~", [call("is.na", [sym("x")]), string("missing")]),
                call("~", [pushdown_sql::ast::lgl(true), string("low")]),
            ],
        ),
        call_named(
            "paste",
            [sym("first"), sym("last"), call("toupper", [sym("city")])],
            [("sep", string(", "))],
        ),
        call("round", [call("/", [call("sum", [sym("x")]), call("n", [])]), dbl(2.0)]),
    ]
}

fn translate_all(dialect: &Dialect, options: &TranslateOptions) {
    for expr in expressions() {
        _ = std::hint::black_box(translate(&expr, dialect, options));
    }
}

fn pipeline() -> LazyQuery {
    LazyQuery::table("sales.orders", ["id", "region", "amount", "placed"])
        .filter([call(">", [sym("amount"), sym("cutoff")])])
        .group_by(["region"])
        .window_order([sym("placed")])
        .mutate([("running", call("cumsum", [sym("amount")]))])
        .filter([call("<", [call("row_number", []), dbl(10.0)])])
        .summarise([("total", call("sum", [sym("running")]))])
        .arrange([call("desc", [sym("total")])])
        .head(5)
}

fn criterion_benchmark(c: &mut Criterion) {
    let dialect = Dialect::postgres();
    let env = Environment::new().with("cutoff", 100.0);
    let options = TranslateOptions {
        env: env.clone(),
        ..Default::default()
    };
    c.bench_function("translate expressions", |b| {
        b.iter(|| translate_all(&dialect, &options))
    });

    let query = pipeline();
    let compile_options = CompileOptions {
        env,
        ..Default::default()
    };
    c.bench_function("compile pipeline", |b| {
        b.iter(|| std::hint::black_box(compile(&query, &dialect, &compile_options)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
