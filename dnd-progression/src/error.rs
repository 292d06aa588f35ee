//! Error types for the progression and spellcasting engine.
//!
//! Every public operation returns a typed failure; nothing is coerced to a
//! default. Formula and catalog failures have their own enums and fold into
//! [`EngineError`] where they surface through an engine operation.

use thiserror::Error;

/// Error from evaluating a resource or HP formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    #[error("Empty formula")]
    Empty,
    #[error("Unknown token '{token}' in formula '{formula}'")]
    UnknownToken { token: String, formula: String },
    #[error("Unbalanced parentheses in formula '{0}'")]
    UnbalancedParentheses(String),
    #[error("Unexpected end of formula '{0}'")]
    UnexpectedEnd(String),
    #[error("Division by zero in formula '{0}'")]
    DivisionByZero(String),
    #[error("Arithmetic overflow in formula '{0}'")]
    Overflow(String),
}

/// Error from loading or validating a rule catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Catalog is incomplete: {0}")]
    Incomplete(String),

    #[error("Duplicate {kind} slug: {slug}")]
    DuplicateSlug { kind: &'static str, slug: String },
}

/// Error from handing an event to a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("Event channel closed")]
    Closed,
    #[error("Event rejected: {0}")]
    Rejected(String),
}

/// Error from an engine operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Malformed input: bad slug, out-of-range number, wrong choice shape.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A formula in the catalog or a caller-supplied formula failed to evaluate.
    #[error("Formula error: {0}")]
    Formula(#[from] FormulaError),

    /// Multiclass or feat prerequisites are not met.
    #[error("Prerequisites not met: {}", unmet.join(", "))]
    Prerequisite { unmet: Vec<String> },

    /// The character's current state does not allow the operation.
    #[error("Invalid state: {0}")]
    State(String),

    /// A catalog lookup missed.
    #[error("{kind} not found: {slug}")]
    NotFound { kind: &'static str, slug: String },
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn not_found(kind: &'static str, slug: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            slug: slug.into(),
        }
    }

    pub fn prerequisites(unmet: Vec<String>) -> Self {
        Self::Prerequisite { unmet }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = EngineError::not_found("Class", "artificer");
        assert_eq!(err.to_string(), "Class not found: artificer");
    }

    #[test]
    fn test_prerequisite_message_lists_all() {
        let err = EngineError::prerequisites(vec!["STR 13".to_string(), "CHA 13".to_string()]);
        assert_eq!(err.to_string(), "Prerequisites not met: STR 13, CHA 13");
    }

    #[test]
    fn test_formula_error_converts() {
        let err: EngineError = FormulaError::DivisionByZero("level/0".to_string()).into();
        assert!(matches!(err, EngineError::Formula(FormulaError::DivisionByZero(_))));
    }
}
