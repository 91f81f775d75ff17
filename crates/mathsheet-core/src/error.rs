//! Error types for mathsheet core.

use thiserror::Error;

use mathsheet_engine::engine::{DeclarationError, EvalAltResult};

/// Errors raised while processing a worksheet line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorksheetError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error("Name error: {0}")]
    Name(String),

    #[error("{0}")]
    Evaluation(String),

    #[error("Invalid setting: {0}")]
    Setting(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl WorksheetError {
    /// Classify a Rhai failure as a name error or an evaluation error.
    pub fn from_rhai(err: Box<EvalAltResult>) -> Self {
        match *err {
            EvalAltResult::ErrorVariableNotFound(name, _) => {
                WorksheetError::Name(format!("name '{}' is not defined", name))
            }
            EvalAltResult::ErrorFunctionNotFound(signature, _) => {
                WorksheetError::Name(format!("function '{}' is not defined", signature))
            }
            EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => Self::from_rhai(inner),
            EvalAltResult::ErrorRuntime(message, _) => WorksheetError::Evaluation(message.to_string()),
            other => WorksheetError::Evaluation(other.to_string()),
        }
    }
}

impl From<Box<EvalAltResult>> for WorksheetError {
    fn from(err: Box<EvalAltResult>) -> Self {
        Self::from_rhai(err)
    }
}

impl From<std::io::Error> for WorksheetError {
    fn from(err: std::io::Error) -> Self {
        WorksheetError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WorksheetError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mathsheet_engine::engine::Position;

    #[test]
    fn test_undefined_variable_is_a_name_error() {
        let err = Box::new(EvalAltResult::ErrorVariableNotFound("rate".into(), Position::NONE));
        assert_eq!(
            WorksheetError::from_rhai(err),
            WorksheetError::Name("name 'rate' is not defined".into())
        );
    }

    #[test]
    fn test_nested_call_failure_keeps_inner_kind() {
        let inner = Box::new(EvalAltResult::ErrorRuntime("division by zero".into(), Position::NONE));
        let err = Box::new(EvalAltResult::ErrorInFunctionCall(
            "f".into(),
            String::new(),
            inner,
            Position::NONE,
        ));
        assert_eq!(
            WorksheetError::from_rhai(err),
            WorksheetError::Evaluation("division by zero".into())
        );
    }
}
