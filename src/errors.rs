use thiserror::Error;

/// Failures reported by the remote document-management API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Transport(String),
    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by a wizard instance outside of ordinary field validation.
#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Wizard is closed")]
    Closed,
    #[error("Already on the last step; submit instead")]
    TerminalStep,
    #[error("Submission is only available from the last step")]
    NotTerminal,
    #[error("Submission failed: {0}")]
    Submission(#[source] ApiError),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(found: bool) -> ApiResult<u32> {
        if found {
            Ok(7)
        } else {
            Err(ApiError::NotFound("document 7".into()))
        }
    }

    #[test]
    fn api_result_carries_api_errors() {
        assert_eq!(lookup(true), Ok(7));
        let err = lookup(false).unwrap_err();
        assert_eq!(err.to_string(), "Not found: document 7");
        let wrapped = WizardError::Submission(err);
        assert_eq!(wrapped.to_string(), "Submission failed: Not found: document 7");
    }
}
