use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("store error: {0}")]
    Store(#[from] crate::records::StoreError),

    /// Raised by the governor; never retried, never shown to the user verbatim.
    #[error("tool call limit exceeded: {key}")]
    CallLimitExceeded { key: String },
}

impl ToolError {
    pub fn is_call_limit(&self) -> bool {
        matches!(self, Self::CallLimitExceeded { .. })
    }
}
