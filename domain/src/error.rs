use std::time::Duration;

/// The error taxonomy shared by every backend, the cache, and the sync manager.
///
/// Each variant carries enough context for a caller to decide whether to
/// retry, surface the error to a human, or give up. `suggestion` is filled
/// in whenever the origin knows a concrete next step.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("invalid input: {message}")]
    InvalidInput {
        message: String,
        suggestion: Option<String>,
    },

    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("already exists: {message}")]
    AlreadyExists { message: String },

    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        message: String,
        suggestion: Option<String>,
    },

    #[error("backend offline: {message}")]
    BackendOffline { message: String },

    #[error("rate limited, retry after {retry_after:?}: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("not supported: {message}")]
    NotSupported { message: String },

    #[error("transient failure: {message}")]
    Transient { message: String },

    #[error("fatal error: {message}")]
    Fatal {
        message: String,
        suggestion: Option<String>,
    },

    #[error("database error: {0}")]
    Sql(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TaskError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TaskError::InvalidInput {
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn invalid_input_with_suggestion(
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        TaskError::InvalidInput {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        TaskError::NotFound {
            message: message.into(),
        }
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        TaskError::AlreadyExists {
            message: message.into(),
        }
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        TaskError::NotSupported {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        TaskError::Transient {
            message: message.into(),
        }
    }

    pub fn backend_offline(message: impl Into<String>) -> Self {
        TaskError::BackendOffline {
            message: message.into(),
        }
    }

    /// A short, user-facing next step, if one is known. Callers surface this
    /// alongside the error message on the normal output channel.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            TaskError::InvalidInput { suggestion, .. }
            | TaskError::AuthenticationFailed { suggestion, .. }
            | TaskError::Fatal { suggestion, .. } => suggestion.as_deref(),
            _ => None,
        }
    }

    /// Whether the sync manager should retry this error with backoff rather
    /// than surfacing it immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::Transient { .. } | TaskError::RateLimited { .. } | TaskError::BackendOffline { .. }
        )
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
