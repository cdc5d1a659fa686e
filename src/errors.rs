use std::fmt;

use crate::storage::StorageError;

/// Error type shared by the orchestrator, its collaborators and the CLI.
/// Every variant maps to a distinct process exit code.
#[derive(Debug)]
pub enum PwgenError {
    /// Rejected user input such as empty instructions (exit code 2)
    InvalidInput(String),
    /// Page round trip or completion network call failed (exit code 3)
    Transport(String),
    /// Completion payload was malformed or missing expected markers (exit code 4)
    ContentValidation { message: String, raw: String },
    /// Persistence or messaging host is gone; a full reload is required (exit code 5)
    ContextInvalidated(String),
    /// A generation cycle is already in flight (exit code 6)
    Busy,
    /// Transient persistence failure, safe to retry (exit code 7)
    Storage(String),
    /// No usable configuration for the requested operation (exit code 8)
    Config(String),
    /// Generic error (exit code 1)
    Other(anyhow::Error),
}

impl PwgenError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PwgenError::InvalidInput(_) => 2,
            PwgenError::Transport(_) => 3,
            PwgenError::ContentValidation { .. } => 4,
            PwgenError::ContextInvalidated(_) => 5,
            PwgenError::Busy => 6,
            PwgenError::Storage(_) => 7,
            PwgenError::Config(_) => 8,
            PwgenError::Other(_) => 1,
        }
    }

    pub fn content(message: impl Into<String>, raw: impl Into<String>) -> Self {
        PwgenError::ContentValidation {
            message: message.into(),
            raw: raw.into(),
        }
    }

    /// Whether the caller must reload before anything else can succeed
    pub fn requires_reload(&self) -> bool {
        matches!(self, PwgenError::ContextInvalidated(_))
    }
}

impl fmt::Display for PwgenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PwgenError::InvalidInput(msg) => write!(f, "{}", msg),
            PwgenError::Transport(msg) => write!(f, "{}", msg),
            PwgenError::ContentValidation { message, .. } => {
                write!(f, "Invalid completion content: {}", message)
            }
            PwgenError::ContextInvalidated(msg) => {
                write!(
                    f,
                    "Extension context invalidated ({}). Please reload and try again.",
                    msg
                )
            }
            PwgenError::Busy => write!(f, "A generation is already in progress"),
            PwgenError::Storage(msg) => write!(f, "Storage error: {}", msg),
            PwgenError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PwgenError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PwgenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PwgenError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<StorageError> for PwgenError {
    fn from(err: StorageError) -> Self {
        if err.is_fatal() {
            PwgenError::ContextInvalidated(err.to_string())
        } else {
            PwgenError::Storage(err.to_string())
        }
    }
}

impl From<anyhow::Error> for PwgenError {
    fn from(err: anyhow::Error) -> Self {
        // Errors already typed somewhere down the stack keep their variant
        let err = match err.downcast::<PwgenError>() {
            Ok(typed) => return typed,
            Err(err) => err,
        };

        let msg = err.to_string();
        if msg.contains("Extension context invalidated") || msg.contains("invalid session id") {
            PwgenError::ContextInvalidated(msg)
        } else if msg.contains("WebDriver") || msg.contains("geckodriver") || msg.contains("chromedriver")
        {
            PwgenError::Transport(msg)
        } else {
            PwgenError::Other(err)
        }
    }
}
