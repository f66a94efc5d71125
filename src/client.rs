use async_trait::async_trait;
use tokio::sync::watch;

use crate::{
    build_status::BuildReport,
    errors::{ClientError, FetchError},
};

pub type CommitId = String;

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Certificate validation for one client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TlsPolicy {
    #[default]
    Strict,
    /// Accepts self-signed and otherwise invalid server certificates.
    AcceptInvalidCerts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub tls: TlsPolicy,
}

/// Source of build results for the checked-out commit.
#[async_trait]
pub trait RemoteStatusClient: Send + Sync {
    /// Replaces credentials and TLS policy wholesale.
    fn configure(&self, config: ClientConfig) -> Result<(), ClientError>;

    async fn fetch_build_status(&self) -> Result<BuildReport, FetchError>;

    /// Changes whenever the checked-out commit changes.
    fn commit_changes(&self) -> watch::Receiver<Option<CommitId>>;
}
