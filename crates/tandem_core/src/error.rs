use thiserror::Error;

/// Errors raised by the value-sharing layer.
#[derive(Debug, Error)]
pub enum ValueError {
    #[error("cannot share a value of kind {kind}")]
    UnsupportedValueKind { kind: &'static str },

    #[error("expected a {expected} handle, got {actual}")]
    IncompatibleHandleType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("value graph exceeds depth limit {limit}; cyclic structures cannot be shared")]
    GraphTooDeep { limit: usize },

    #[error("no value unpacker installed in {runtime}")]
    UnpackerMissing { runtime: String },

    #[error("'{name}' is not callable in this runtime")]
    NotCallable { name: String },

    #[error("execution error: {message}")]
    Execution { message: String },
}

impl ValueError {
    pub fn execution(message: impl Into<String>) -> Self {
        ValueError::Execution {
            message: message.into(),
        }
    }
}
