//! Native Error Types
//!
//! This module provides the error type for the native operation library,
//! together with its last-error buffer.
//!
//! ## Error Buffer
//!
//! Every failing entry point appends a `domain: message` line to the
//! error buffer before returning. The buffer is never cleared by the
//! library itself: callers read it with [`error_buffer`] as soon as a call
//! fails and then reset it with [`error_clear`].
//!
//! The buffer is kept per thread, so a failure on one thread never
//! overwrites the text another thread is about to read.

use std::cell::RefCell;

use thiserror::Error;

/// Result type for native operations
pub type NativeResult<T> = Result<T, NativeError>;

/// Native library error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NativeError {
    /// No operation class is registered under this nickname
    #[error("class \"{name}\" not found")]
    ClassNotFound {
        /// Nickname that was looked up
        name: String,
    },

    /// Type id is not registered
    #[error("unknown type id {type_id}")]
    UnknownType {
        /// Raw type id
        type_id: u64,
    },

    /// Value or object type does not match what was expected
    #[error("expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type name
        expected: String,
        /// Actual type name
        actual: String,
    },

    /// Value slot has no type yet
    #[error("value has not been initialised")]
    ValueNotInitialized,

    /// Value slot was already given a type
    #[error("value already initialised as {type_name}")]
    ValueAlreadyInitialized {
        /// Type the value already holds
        type_name: String,
    },

    /// Type cannot be held by a value slot
    #[error("type {type_name} cannot be stored in a value")]
    UnsupportedValueType {
        /// Name of the rejected type
        type_name: String,
    },

    /// Object has no argument with this name
    #[error("{object} has no argument named \"{name}\"")]
    NoSuchArgument {
        /// Operation nickname
        object: String,
        /// Argument name
        name: String,
    },

    /// Argument is output-only and cannot be assigned by the caller
    #[error("argument \"{name}\" of {object} is not an input")]
    NotAnInput {
        /// Operation nickname
        object: String,
        /// Argument name
        name: String,
    },

    /// Set-once argument was assigned twice
    #[error("argument \"{name}\" of {object} can only be set once")]
    ArgumentAlreadySet {
        /// Operation nickname
        object: String,
        /// Argument name
        name: String,
    },

    /// Required argument was never assigned before build
    #[error("parameter {name} not set")]
    ParameterNotSet {
        /// Operation nickname
        object: String,
        /// Argument name
        name: String,
    },

    /// Operation was modified after it had been built
    #[error("{object} has already been built")]
    AlreadyBuilt {
        /// Operation nickname
        object: String,
    },

    /// Enum or flags type has no member with this nickname
    #[error("enum '{type_name}' has no member '{nick}', should be one of: {allowed}")]
    EnumNoMember {
        /// Enum type name
        type_name: String,
        /// Nickname that was looked up
        nick: String,
        /// Comma-separated list of valid nicknames
        allowed: String,
    },

    /// Verbatim option string could not be applied
    #[error("bad option string \"{options}\": {reason}")]
    BadOptionString {
        /// The option string as supplied
        options: String,
        /// What was wrong with it
        reason: String,
    },

    /// Handle does not refer to a live object
    #[error("invalid object handle 0x{handle:x}")]
    InvalidObject {
        /// Raw handle value
        handle: u64,
    },

    /// Numeric argument outside its permitted range
    #[error("{what} out of range: {value}")]
    OutOfRange {
        /// What was being checked
        what: String,
        /// The offending value
        value: String,
    },

    /// Operation body reported a failure
    #[error("{message}")]
    OperationFailed {
        /// Operation nickname
        operation: String,
        /// Failure description
        message: String,
    },
}

impl NativeError {
    /// Create a type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        NativeError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create an out of range error
    pub fn out_of_range(what: impl Into<String>, value: impl ToString) -> Self {
        NativeError::OutOfRange {
            what: what.into(),
            value: value.to_string(),
        }
    }

    /// Create an operation failure
    pub fn operation_failed(operation: impl Into<String>, message: impl Into<String>) -> Self {
        NativeError::OperationFailed {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Domain prefix used when the error is written to the error buffer
    pub fn domain(&self) -> &str {
        match self {
            NativeError::ClassNotFound { .. } => "Operation",
            NativeError::UnknownType { .. }
            | NativeError::TypeMismatch { .. }
            | NativeError::ValueNotInitialized
            | NativeError::ValueAlreadyInitialized { .. }
            | NativeError::UnsupportedValueType { .. } => "Value",
            NativeError::NoSuchArgument { object, .. }
            | NativeError::NotAnInput { object, .. }
            | NativeError::ArgumentAlreadySet { object, .. }
            | NativeError::ParameterNotSet { object, .. }
            | NativeError::AlreadyBuilt { object } => object,
            NativeError::EnumNoMember { .. } => "enum",
            NativeError::BadOptionString { .. } => "Object",
            NativeError::InvalidObject { .. } => "Object",
            NativeError::OutOfRange { .. } => "Image",
            NativeError::OperationFailed { operation, .. } => operation,
        }
    }
}

// ============================================================================
// Error Buffer
// ============================================================================

thread_local! {
    static ERROR_BUFFER: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Append a line to the error buffer.
pub fn error_push(domain: &str, message: &str) {
    ERROR_BUFFER.with(|buffer| {
        let mut buffer = buffer.borrow_mut();
        buffer.push_str(domain);
        buffer.push_str(": ");
        buffer.push_str(message);
        buffer.push('\n');
    });
}

/// Get the current contents of the error buffer.
pub fn error_buffer() -> String {
    ERROR_BUFFER.with(|buffer| buffer.borrow().clone())
}

/// Clear the error buffer.
pub fn error_clear() {
    ERROR_BUFFER.with(|buffer| buffer.borrow_mut().clear());
}

/// Record an error in the buffer and hand it back as `Err`.
pub(crate) fn raise<T>(err: NativeError) -> NativeResult<T> {
    error_push(err.domain(), &err.to_string());
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NativeError::ClassNotFound {
            name: "frobnicate".to_string(),
        };
        assert_eq!(err.to_string(), "class \"frobnicate\" not found");
        assert_eq!(err.domain(), "Operation");

        let err = NativeError::ParameterNotSet {
            object: "black".to_string(),
            name: "width".to_string(),
        };
        assert_eq!(err.to_string(), "parameter width not set");
        assert_eq!(err.domain(), "black");
    }

    #[test]
    fn test_error_buffer_accumulates_until_cleared() {
        error_clear();
        assert_eq!(error_buffer(), "");

        error_push("Image", "first");
        error_push("Image", "second");
        assert_eq!(error_buffer(), "Image: first\nImage: second\n");

        error_clear();
        assert_eq!(error_buffer(), "");
    }

    #[test]
    fn test_raise_records_error() {
        error_clear();
        let result: NativeResult<()> = raise(NativeError::operation_failed("add", "images must match in size"));
        assert!(result.is_err());
        assert_eq!(error_buffer(), "add: images must match in size\n");
        error_clear();
    }
}
