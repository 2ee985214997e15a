//! Error Types for the Operation Bridge
//!
//! This module provides the error type for dynamic operation calls.
//!
//! ## Error Categories
//!
//! - Lookup failures: unknown operation, unknown argument, wrong arity
//! - Value failures: unsupported type, value that does not fit the type,
//!   constant that cannot be turned into an image
//! - Native failures: build errors and rejected argument assignments,
//!   carrying the text of the native error buffer
//!
//! Messages put the operation name first, then the argument name when one
//! is known, then the native error text.

use opbridge_native::{error_buffer, error_clear, NativeError};
use smol_str::SmolStr;
use thiserror::Error;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// No operation is registered under this name
    #[error("no such operation {operation}{}", detail(.native))]
    UnknownOperation {
        /// Operation name as given
        operation: SmolStr,
        /// Native error text
        native: String,
    },

    /// Wrong number of positional arguments
    #[error("{operation}: {given} arguments given, but {required} required")]
    Arity {
        /// Operation name
        operation: SmolStr,
        /// Positional arguments supplied
        given: usize,
        /// Positional arguments expected
        required: usize,
    },

    /// Keyword does not name an optional argument of the operation
    #[error("{operation} does not support optional argument {argument}")]
    UnknownArgument {
        /// Operation name
        operation: SmolStr,
        /// Keyword as given
        argument: SmolStr,
    },

    /// Native type is not understood, or a value was used before it was typed
    #[error("{}{message}", prefix(.context))]
    Type {
        /// `operation: argument` when known
        context: String,
        /// What went wrong
        message: String,
    },

    /// Host value does not fit the native type
    #[error("{}{message}", prefix(.context))]
    UnsupportedValue {
        /// `operation: argument` when known
        context: String,
        /// What went wrong
        message: String,
    },

    /// Constant needs a match image to become an image
    #[error("{}cannot turn {kind} into an image without a match image", prefix(.context))]
    NotImageizable {
        /// `operation: argument` when known
        context: String,
        /// Kind of host value
        kind: SmolStr,
    },

    /// Native build step failed
    #[error("{operation}: build failed{}", detail(.native))]
    Build {
        /// Operation name
        operation: SmolStr,
        /// Native error text
        native: String,
    },

    /// Native library rejected an argument or an output read
    #[error("{operation}: {argument}{}", detail(.native))]
    Invocation {
        /// Operation name
        operation: SmolStr,
        /// Argument name
        argument: SmolStr,
        /// Native error text
        native: String,
    },

    /// Native call made outside an operation invocation failed
    #[error(transparent)]
    Native(#[from] NativeError),
}

fn prefix(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!("{}: ", context)
    }
}

fn detail(native: &str) -> String {
    if native.is_empty() {
        String::new()
    } else {
        format!(": {}", native)
    }
}

impl BridgeError {
    /// Create a type error without call context
    pub fn type_error(message: impl Into<String>) -> Self {
        BridgeError::Type {
            context: String::new(),
            message: message.into(),
        }
    }

    /// Create an unsupported value error without call context
    pub fn unsupported(message: impl Into<String>) -> Self {
        BridgeError::UnsupportedValue {
            context: String::new(),
            message: message.into(),
        }
    }

    /// Create a not-imageizable error without call context
    pub fn not_imageizable(kind: impl Into<SmolStr>) -> Self {
        BridgeError::NotImageizable {
            context: String::new(),
            kind: kind.into(),
        }
    }

    /// Create an invocation error from the pending native error
    pub fn invocation(operation: impl Into<SmolStr>, argument: impl Into<SmolStr>) -> Self {
        BridgeError::Invocation {
            operation: operation.into(),
            argument: argument.into(),
            native: take_native_error(),
        }
    }

    /// Create a build error from the pending native error
    pub fn build(operation: impl Into<SmolStr>) -> Self {
        BridgeError::Build {
            operation: operation.into(),
            native: take_native_error(),
        }
    }

    /// Attach `operation: argument` context to a value error.
    ///
    /// Errors that already carry context, and errors that are not value
    /// errors, are returned unchanged.
    pub fn in_argument(self, operation: &str, argument: &str) -> Self {
        let with = |context: String| {
            if context.is_empty() {
                format!("{}: {}", operation, argument)
            } else {
                context
            }
        };
        match self {
            BridgeError::Type { context, message } => BridgeError::Type {
                context: with(context),
                message,
            },
            BridgeError::UnsupportedValue { context, message } => BridgeError::UnsupportedValue {
                context: with(context),
                message,
            },
            BridgeError::NotImageizable { context, kind } => BridgeError::NotImageizable {
                context: with(context),
                kind,
            },
            other => other,
        }
    }

    /// Check if this is a type or value conversion error
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            BridgeError::Type { .. }
                | BridgeError::UnsupportedValue { .. }
                | BridgeError::NotImageizable { .. }
        )
    }

    /// Check if this error carries a native failure
    pub fn is_native_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::Build { .. } | BridgeError::Invocation { .. } | BridgeError::Native(_)
        )
    }

    /// Check if the call itself was malformed
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            BridgeError::UnknownOperation { .. }
                | BridgeError::Arity { .. }
                | BridgeError::UnknownArgument { .. }
        )
    }
}

/// Read and clear the native error buffer.
///
/// Called on every native failure path so that a stale message never
/// leaks into the next error.
pub fn take_native_error() -> String {
    let text = error_buffer();
    error_clear();
    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use opbridge_native::error_push;

    #[test]
    fn test_arity_message() {
        let err = BridgeError::Arity {
            operation: "add".into(),
            given: 1,
            required: 2,
        };
        assert_eq!(err.to_string(), "add: 1 arguments given, but 2 required");
        assert!(err.is_usage_error());
    }

    #[test]
    fn test_context_order() {
        let err = BridgeError::unsupported("int 4294967296 does not fit in 32 bits")
            .in_argument("black", "width");
        assert_eq!(
            err.to_string(),
            "black: width: int 4294967296 does not fit in 32 bits"
        );
        assert!(err.is_type_error());

        // Context is attached once.
        let again = err.clone().in_argument("copy", "in");
        assert_eq!(again, err);
    }

    #[test]
    fn test_take_native_error_clears_buffer() {
        error_clear();
        error_push("add", "images must match in size");
        let err = BridgeError::build("add");
        assert_eq!(err.to_string(), "add: build failed: add: images must match in size");
        assert!(err.is_native_failure());
        assert_eq!(error_buffer(), "");
    }

    #[test]
    fn test_unknown_operation_message() {
        let err = BridgeError::UnknownOperation {
            operation: "frobnicate".into(),
            native: String::new(),
        };
        assert_eq!(err.to_string(), "no such operation frobnicate");
    }

    #[test]
    fn test_native_conversion() {
        let err: BridgeError = NativeError::InvalidObject { handle: 0x10 }.into();
        assert!(err.is_native_failure());
        assert_eq!(err.to_string(), "invalid object handle 0x10");
    }
}
