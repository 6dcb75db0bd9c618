//! Translates host-language expressions into dialect-correct SQL.
//!
//! An expression tree goes through [`evaluate::partial_eval`], which folds
//!  everything computable from local bindings, and then through
//!  [`translate::translate`], which renders the rest for a [`Dialect`].
//!  [`LazyQuery`] chains table verbs and compiles them into one SELECT.

pub mod ast;
pub mod config;
pub mod dialect;
pub mod error;
pub mod evaluate;
pub mod lazy;
pub mod sql;
pub mod to_sql;
pub mod translate;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use dialect::Dialect;
pub use error::{Error, Result, Warning};
pub use evaluate::{Environment, Value};
pub use lazy::{
    CompileOptions, Compiled, Executor, JoinType, LazyQuery, compile, compile_with_warnings,
};
pub use sql::Sql;
pub use translate::{Frame, TranslateOptions, Translation, translate};
