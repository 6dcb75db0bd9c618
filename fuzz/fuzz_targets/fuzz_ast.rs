#![no_main]
use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use pushdown_sql::ast::Expression;
use pushdown_sql::{Dialect, TranslateOptions, translate};

#[derive(Debug)]
pub struct AstInput {
    pub expr: Expression,
    pub dialect: u8,
    pub windowed: bool,
}

impl<'a> Arbitrary<'a> for AstInput {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        Ok(AstInput {
            expr: Expression::arbitrary(u)?,
            dialect: u.arbitrary()?,
            windowed: u.arbitrary()?,
        })
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = Unstructured::new(data).arbitrary::<AstInput>() {
        let dialect = match input.dialect % 5 {
            0 => Dialect::ansi(),
            1 => Dialect::postgres(),
            2 => Dialect::sqlite(),
            3 => Dialect::mssql(),
            _ => Dialect::mysql(),
        };
        let options = TranslateOptions {
            windowed: input.windowed,
            ..Default::default()
        };
        // errors are fine, panics are not
        let _ = translate(&input.expr, &dialect, &options);
    }
});
