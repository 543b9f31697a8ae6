use thiserror::Error;

use crate::value::Kind;

/// Errors raised by the boxed value runtime and the identifier mangler.
///
/// The variants follow the runtime's error taxonomy:
/// (a) type mismatch, (b) index out of range, (c) key not found,
/// (d) cell read before assignment, (e) internal contract violation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: Kind, found: Kind },

    #[error("Index {index} is out of range for an array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("Key '{key}' not found in dictionary")]
    KeyNotFound { key: String },

    #[error("Indirection cell read before it was assigned")]
    UninitializedCell,

    #[error("Indirection cell read after its owning scope released it")]
    ReleasedCell,

    #[error("Integer {value} does not fit in a 32-bit Int")]
    IntegerOverflow { value: i128 },

    #[error("Compiler-generated identifier #{id} reached the mangler")]
    GeneratedIdent { id: u64 },

    #[error("Foreign unit '{unit}' has not been registered")]
    UnknownUnit { unit: String },

    #[error("Foreign unit '{unit}' registered twice")]
    DuplicateUnit { unit: String },

    #[error("Foreign unit '{unit}' reached its own exports while initializing")]
    CyclicUnit { unit: String },

    #[error("Foreign export '{name}' defined twice in unit '{unit}'")]
    DuplicateExport { unit: String, name: String },

    #[error("Native function failed: {0}")]
    Native(String),

    #[error("Internal runtime error: {0}")]
    InternalError(String),
}

impl RuntimeError {
    /// Fatal errors indicate a code-generation or runtime bug, never a user
    /// program error, and are reported in every build mode.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::UninitializedCell
                | RuntimeError::ReleasedCell
                | RuntimeError::IntegerOverflow { .. }
                | RuntimeError::GeneratedIdent { .. }
                | RuntimeError::UnknownUnit { .. }
                | RuntimeError::DuplicateUnit { .. }
                | RuntimeError::CyclicUnit { .. }
                | RuntimeError::DuplicateExport { .. }
                | RuntimeError::InternalError(_)
        )
    }

    pub fn category(&self) -> &'static str {
        match self {
            RuntimeError::TypeMismatch { .. } => "type-mismatch",
            RuntimeError::IndexOutOfRange { .. } => "index-out-of-range",
            RuntimeError::KeyNotFound { .. } => "key-not-found",
            RuntimeError::UninitializedCell | RuntimeError::ReleasedCell => "cell",
            RuntimeError::Native(_) => "native",
            _ => "internal",
        }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Reports a checkable violation according to the active build mode.
///
/// Checked builds hand the error back to the caller. Unchecked builds do not
/// report (a)-(c) as recoverable errors; the evaluation is terminated instead.
#[cold]
pub(crate) fn violation<T>(err: RuntimeError) -> RuntimeResult<T> {
    if cfg!(feature = "unchecked") {
        panic!("{}", err);
    }
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RuntimeError::TypeMismatch {
            expected: Kind::Int,
            found: Kind::String,
        };
        assert_eq!(err.to_string(), "Type mismatch: expected Int, found String");

        let err = RuntimeError::IndexOutOfRange { index: 5, len: 3 };
        assert_eq!(
            err.to_string(),
            "Index 5 is out of range for an array of length 3"
        );

        let err = RuntimeError::KeyNotFound {
            key: "missing".to_string(),
        };
        assert!(err.to_string().contains("'missing'"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RuntimeError::UninitializedCell.is_fatal());
        assert!(RuntimeError::GeneratedIdent { id: 7 }.is_fatal());
        assert!(RuntimeError::IntegerOverflow { value: 1 << 40 }.is_fatal());
        assert!(RuntimeError::CyclicUnit { unit: "Main".into() }.is_fatal());
        assert!(!RuntimeError::KeyNotFound { key: "k".into() }.is_fatal());
        assert!(!RuntimeError::IndexOutOfRange { index: 0, len: 0 }.is_fatal());
        assert!(!RuntimeError::Native("boom".into()).is_fatal());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            RuntimeError::IndexOutOfRange { index: 1, len: 0 }.category(),
            "index-out-of-range"
        );
        assert_eq!(RuntimeError::ReleasedCell.category(), "cell");
        assert_eq!(
            RuntimeError::DuplicateUnit { unit: "Data.Array".into() }.category(),
            "internal"
        );
    }

    #[cfg(not(feature = "unchecked"))]
    #[test]
    fn test_violation_reports_in_checked_mode() {
        let result: RuntimeResult<()> = violation(RuntimeError::KeyNotFound { key: "x".into() });
        assert_eq!(
            result,
            Err(RuntimeError::KeyNotFound { key: "x".into() })
        );
    }
}
