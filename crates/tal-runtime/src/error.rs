use thiserror::Error;

pub type Result<T> = std::result::Result<T, TalError>;

/// Contract violations raised by the engine.
///
/// Resolution misses (absent path segments, unknown host expressions) are
/// not errors: they are logged and degrade to `undefined`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TalError {
    #[error("not an object")]
    NotAnObject,

    #[error("not an array")]
    NotAnArray,

    #[error("not a function")]
    NotAFunction,

    #[error("not a primitive")]
    NotAPrimitive,

    #[error("{property} can't be initialized, it is internal")]
    ReservedProperty { property: String },

    #[error("unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("context '{expression}' can't be observed")]
    ContextNotObservable { expression: String },

    #[error("template not an element")]
    TemplateNotElement,

    #[error("a dependency detection window is already open")]
    NestedDetection,

    #[error("invalid {directive} statement: {text:?}")]
    InvalidStatement { directive: String, text: String },

    #[error("configuration error: {message}")]
    Config { message: String },
}

impl TalError {
    #[must_use]
    pub fn reserved(property: impl Into<String>) -> Self {
        Self::ReservedProperty {
            property: property.into(),
        }
    }

    #[must_use]
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
        }
    }

    #[must_use]
    pub fn invalid_statement(directive: impl Into<String>, text: impl Into<String>) -> Self {
        Self::InvalidStatement {
            directive: directive.into(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Failure reported by a host expression (`js:` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<TalError> for HostError {
    fn from(err: TalError) -> Self {
        Self::new(err.to_string())
    }
}
