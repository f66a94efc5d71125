use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid settings: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    #[error("Invalid polling interval: must be at least 1 second")]
    InvalidPollingInterval,

    #[error("Failed to watch settings file: {source}")]
    Watch {
        #[from]
        source: notify::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("Not a git repository: {path}")]
    NotARepository {
        path: PathBuf,
        #[source]
        source: git2::Error,
    },

    #[error("No commit is checked out")]
    NoHead,

    #[error("Git operation failed: {source}")]
    Git {
        #[from]
        source: git2::Error,
    },

    #[error("Head lookup task failed: {source}")]
    Task {
        #[from]
        source: tokio::task::JoinError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Request error: {source}")]
    Request {
        #[from]
        source: reqwest::Error,
    },

    #[error("Invalid status {code}")]
    Status { code: u16 },

    #[error("JSON decode error: {message}")]
    Decode { message: String },

    #[error("Cannot resolve the current commit: {source}")]
    Git {
        #[from]
        source: GitError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to build HTTP client: {source}")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },
}
