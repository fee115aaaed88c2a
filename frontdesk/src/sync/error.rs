use thiserror::Error;

/// Remote sync errors
///
/// Never fatal: the sync layer logs them and moves on, local data is untouched.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connectivity probe failed; remote work is skipped for the session
    #[error("Remote backend offline")]
    Offline,

    #[error("Remote returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Server-side and network failures are worth another attempt; client errors are not
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Status { status, .. } => *status >= 500 || *status == 429,
            SyncError::Transport(_) => true,
            SyncError::Offline | SyncError::Serialization(_) => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
