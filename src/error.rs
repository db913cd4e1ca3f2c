use thiserror::Error;

use crate::parser::ParseError;

/// Runtime failure while evaluating a formula.
///
/// Most of these are absorbed into a `null` result by [`crate::Engine::evaluate`];
/// [`EvalError::MissingArgument`] is the exception and reaches the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("{0} is not defined")]
    UnknownIdentifier(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("{0} is not a function")]
    NotCallable(String),

    #[error("cannot read property '{property}' of {target}")]
    NullAccess { property: String, target: &'static str },

    #[error("{function}: {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("{function}: missing required argument '{argument}'")]
    MissingArgument {
        function: String,
        argument: &'static str,
    },

    #[error("unsupported expression: {0}")]
    Unsupported(String),
}

impl EvalError {
    pub(crate) fn invalid(function: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            function: function.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(function: &str, argument: &'static str) -> Self {
        Self::MissingArgument {
            function: function.to_string(),
            argument,
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] ParseError),

    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    #[error("patch operation could not be applied: {0}")]
    PatchApplication(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
