//! Library configuration: which dialect to target and how strict to be.

use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::lazy::CompileOptions;
use crate::translate::TranslateOptions;

pub const DIALECT_VAR: &str = "PUSHDOWN_SQL_DIALECT";
pub const STRICT_VAR: &str = "PUSHDOWN_SQL_STRICT";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Any name [`Dialect::by_name`] accepts
    pub dialect: String,

    /// Unknown functions are errors instead of being passed through
    pub strict: bool,

    /// One character for both sides, or an opening and a closing one
    pub identifier_quote: Option<String>,

    pub string_quote: Option<char>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: "ansi".to_string(),
            strict: false,
            identifier_quote: None,
            string_quote: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Defaults overridden by `PUSHDOWN_SQL_DIALECT` and `PUSHDOWN_SQL_STRICT`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(dialect) = var(DIALECT_VAR) {
            config.dialect = dialect;
        }
        if let Some(strict) = var(STRICT_VAR) {
            config.strict = parse_flag(STRICT_VAR, &strict)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        Dialect::by_name(&self.dialect)?;
        self.quote_pair()?;
        Ok(())
    }

    fn quote_pair(&self) -> Result<Option<(char, char)>> {
        let Some(quote) = &self.identifier_quote else {
            return Ok(None);
        };
        let mut chars = quote.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(both), None, None) => Ok(Some((both, both))),
            (Some(open), Some(close), None) => Ok(Some((open, close))),
            _ => Err(Error::Config(format!(
                "identifier_quote must be one or two characters, got {quote:?}"
            ))),
        }
    }

    /// The configured dialect with any quote overrides applied.
    pub fn dialect(&self) -> Result<Dialect> {
        let mut dialect = Dialect::by_name(&self.dialect)?;
        if let Some((open, close)) = self.quote_pair()? {
            dialect = dialect.with_identifier_quote(open, close);
        }
        if let Some(quote) = self.string_quote {
            dialect = dialect.with_string_quote(quote);
        }
        Ok(dialect)
    }

    pub fn translate_options(&self) -> TranslateOptions {
        TranslateOptions {
            strict: self.strict,
            ..Default::default()
        }
    }

    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            strict: self.strict,
            ..Default::default()
        }
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(Error::Config(format!("{key}: expected a boolean, got {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{call, sym};
    use crate::translate::translate;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.dialect().unwrap().name(), "ansi");
        assert!(!config.translate_options().strict);
    }

    #[test]
    fn toml_overrides() {
        let config = Config::from_toml_str(
            r#"
            dialect = "postgresql"
            strict = true
            identifier_quote = "[]"
            string_quote = "'"
            "#,
        )
        .unwrap();
        assert!(config.strict);
        assert!(config.compile_options().strict);
        let dialect = config.dialect().unwrap();
        assert_eq!(dialect.name(), "postgres");
        let out = translate(
            &call("abs", [sym("x y")]),
            &dialect,
            &config.translate_options(),
        )
        .unwrap();
        assert_eq!(out.sql.as_str(), "ABS([x y])");
    }

    #[test]
    fn invalid_toml_is_rejected() {
        assert!(matches!(
            Config::from_toml_str(r#"dialect = "oracle""#),
            Err(Error::UnknownDialect(_))
        ));
        assert!(matches!(
            Config::from_toml_str(r#"identifier_quote = "<<<""#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml_str("verbose = true"),
            Err(Error::Toml(_))
        ));
    }

    #[test]
    fn environment_variables() {
        let config = Config::from_vars(|key| match key {
            DIALECT_VAR => Some("mssql".to_string()),
            STRICT_VAR => Some("yes".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.dialect, "mssql");
        assert!(config.strict);

        let err = Config::from_vars(|key| (key == STRICT_VAR).then(|| "maybe".to_string()))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: PUSHDOWN_SQL_STRICT: expected a boolean, got \"maybe\""
        );
    }
}
