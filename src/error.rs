use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("api error ({status}): {message}")]
    Application {
        status: u16,
        message: String,
    },

    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Application { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn user_message(&self) -> &str {
        match self {
            Self::Transport(_) => "Could not reach the server. Please check your connection.",
            Self::Application { message, .. } => message,
            Self::Validation { message, .. } => message,
            Self::Decode(_) => "The server sent a response we could not understand.",
            Self::Storage(_) => "Could not save your session on this device.",
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Application { status, .. } => *status == 429 || *status >= 500,
            Self::Validation { .. } | Self::Decode(_) | Self::Storage(_) => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
