use std::{
    path::PathBuf,
    sync::{PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::DateTime;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{
    build_status::{Build, BuildReport, BuildStatus},
    client::{ClientConfig, CommitId, Credentials, RemoteStatusClient, TlsPolicy},
    errors::{ClientError, FetchError},
    git::resolve_head,
    utils::{BasicAuth, request},
};

#[derive(Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct BuildStatusPage {
    is_last_page: bool,
    next_page_start: Option<u32>,
    values: Vec<BitbucketBuild>,
}

#[derive(Debug, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct BitbucketBuild {
    state: String,
    key: String,
    name: Option<String>,
    url: String,
    description: Option<String>,
    date_added: Option<i64>,
}

impl BitbucketBuild {
    fn into_build(self) -> Build {
        let state = match self.state.as_str() {
            "SUCCESSFUL" => BuildStatus::Successful,
            "FAILED" => BuildStatus::Failed,
            "INPROGRESS" => BuildStatus::InProgress,
            other => {
                debug!(event = "bitbucket.unhandled_state", state = other);
                BuildStatus::Unknown
            }
        };
        Build {
            name: self.name.unwrap_or_else(|| self.key.clone()),
            key: self.key,
            state,
            url: self.url,
            description: self.description.filter(|d| !d.is_empty()),
            date_added: self.date_added.and_then(DateTime::from_timestamp_millis),
        }
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_PAGES: usize = 100;

/// Start of the page after `page`, `None` once the last page was read.
fn next_start(page: &BuildStatusPage, start: u32, pages: usize) -> Result<Option<u32>, FetchError> {
    let next = match page.next_page_start {
        Some(next) if !page.is_last_page => next,
        _ => return Ok(None),
    };
    if next <= start {
        return Err(FetchError::Decode {
            message: format!("nextPageStart {next} does not advance past {start}"),
        });
    }
    if pages >= MAX_PAGES {
        return Err(FetchError::Decode {
            message: format!("more than {MAX_PAGES} pages of builds"),
        });
    }
    Ok(Some(next))
}

fn build_http_client(tls: TlsPolicy, timeout: Duration) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(tls == TlsPolicy::AcceptInvalidCerts)
        .connect_timeout(timeout.min(CONNECT_TIMEOUT))
        .timeout(timeout)
        .build()
        .map_err(|source| ClientError::HttpClient { source })
}

/// Build statuses from the Bitbucket Server build-status REST API.
pub struct BitbucketClient {
    server_url: String,
    repository: PathBuf,
    commits: watch::Receiver<Option<CommitId>>,
    request_timeout: Duration,
    http: RwLock<reqwest::Client>,
    config: RwLock<Option<ClientConfig>>,
}

impl BitbucketClient {
    pub fn new(
        server_url: &str,
        repository: PathBuf,
        commits: watch::Receiver<Option<CommitId>>,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            repository,
            commits,
            request_timeout: REQUEST_TIMEOUT,
            http: RwLock::new(build_http_client(TlsPolicy::Strict, REQUEST_TIMEOUT)?),
            config: RwLock::new(None),
        })
    }

    /// Bound on one request, connection included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, ClientError> {
        self.request_timeout = timeout;
        let http = build_http_client(self.tls_policy(), timeout)?;
        *self.http.get_mut().unwrap_or_else(PoisonError::into_inner) = http;
        Ok(self)
    }

    pub fn tls_policy(&self) -> TlsPolicy {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.tls)
            .unwrap_or_default()
    }

    fn commit_url(&self, commit: &str, start: u32) -> String {
        let server_url = &self.server_url;
        format!("{server_url}/rest/build-status/1.0/commits/{commit}?start={start}")
    }

    fn credentials(&self) -> Option<Credentials> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|c| c.credentials.clone())
    }
}

#[async_trait]
impl RemoteStatusClient for BitbucketClient {
    fn configure(&self, config: ClientConfig) -> Result<(), ClientError> {
        let http = build_http_client(config.tls, self.request_timeout)?;
        *self.http.write().unwrap_or_else(PoisonError::into_inner) = http;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = Some(config);
        Ok(())
    }

    async fn fetch_build_status(&self) -> Result<BuildReport, FetchError> {
        let commit = resolve_head(self.repository.clone()).await?;
        let http = self
            .http
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let credentials = self.credentials();
        if credentials.is_none() {
            warn!(event = "bitbucket.unauthenticated_fetch");
        }
        let auth = credentials.as_ref().map(|c| BasicAuth {
            user: &c.username,
            password: &c.password,
        });
        let headers = [("Accept", "application/json")];

        let mut builds = Vec::new();
        let mut start = 0;
        let mut pages = 0;
        loop {
            let url = self.commit_url(&commit, start);
            let page =
                request::<BuildStatusPage>(&http, &url, &headers, auth.as_ref()).await?;
            pages += 1;
            let next = next_start(&page, start, pages)?;
            builds.extend(page.values.into_iter().map(BitbucketBuild::into_build));
            match next {
                Some(next) => start = next,
                None => break,
            }
        }
        debug!(event = "bitbucket.fetched", commit = %commit, builds = builds.len());
        Ok(BuildReport::from_builds(builds))
    }

    fn commit_changes(&self) -> watch::Receiver<Option<CommitId>> {
        self.commits.clone()
    }
}
