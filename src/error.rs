//! Error and warning types.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::dialect::Arity;

/// Anything that aborts a translation or compilation. No partial SQL is ever
///  returned alongside one of these.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{function}() expects {expected} argument(s), got {actual}")]
    ArityMismatch {
        function: String,
        expected: Expected,
        actual: usize,
    },

    #[error("Unknown function {0}() (strict mode disables passthrough)")]
    UnknownFunction(String),

    #[error("Failed to evaluate `{expression}` locally: {reason}")]
    LocalEvalFailure { expression: String, reason: String },

    #[error("The {dialect} dialect does not support {feature}")]
    DialectUnsupportedFeature {
        dialect: &'static str,
        feature: String,
    },

    #[error("{function}(): argument {index} {reason}")]
    InvalidArgument {
        function: String,
        index: usize,
        reason: String,
    },

    #[error("'{0}' cannot be passed through as a SQL function name")]
    InvalidFunctionName(String),

    #[error("Column `{0}` does not exist")]
    UnknownColumn(String),

    #[error("Unknown dialect '{0}'")]
    UnknownDialect(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Executor failed: {0}")]
    Executor(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub fn local(expression: impl Display, reason: impl Into<String>) -> Self {
        Self::LocalEvalFailure {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(function: &str, index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.to_string(),
            index,
            reason: reason.into(),
        }
    }
}

/// The argument counts a function accepts, possibly spread over several
///  rules registered under the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected(pub Vec<Arity>);

impl Display for Expected {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, arity) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            write!(f, "{arity}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Non-fatal findings surfaced next to the produced SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// A named argument with no counterpart in the rule's parameter table.
    NamedArgumentIgnored { function: String, argument: String },
    /// An order-dependent window function rendered without an explicit order.
    MissingWindowOrder { expression: String },
}

impl Display for Warning {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Warning::NamedArgumentIgnored { function, argument } => {
                write!(f, "Named argument `{argument}` of {function}() is ignored in SQL")
            }
            Warning::MissingWindowOrder { expression } => write!(
                f,
                "Windowed expression `{expression}` has no explicit order; \
                 results depend on the backend's default ordering"
            ),
        }
    }
}
