use std::{
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::{mpsc, watch},
    time::{self, Interval, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    build_status::BuildStatus,
    client::{ClientConfig, CommitId, Credentials, RemoteStatusClient, TlsPolicy},
    errors::ClientError,
    rendering::{BuildListPresenter, StatusIndicator},
};

pub const HINT_BUILDS_AVAILABLE: &str = "See available builds";
pub const HINT_NO_BUILDS: &str = "No builds available (commit not pushed or CI not started yet)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListBuilds,
    Reconfigure {
        credentials: Credentials,
        tls: TlsPolicy,
        interval: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(BuildStatus),
    Failed,
    /// Another refresh was already in flight.
    Skipped,
}

#[derive(Debug, Default)]
struct PollingState {
    last_status: BuildStatus,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PollingController<C, I, P> {
    client: C,
    indicator: I,
    builds: P,
    state: Mutex<PollingState>,
    in_flight: AtomicBool,
}

impl<C, I, P> PollingController<C, I, P>
where
    C: RemoteStatusClient,
    I: StatusIndicator,
    P: BuildListPresenter,
{
    pub fn new(client: C, indicator: I, builds: P) -> Self {
        Self {
            client,
            indicator,
            builds,
            state: Mutex::new(PollingState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    #[cfg(test)]
    pub fn indicator(&self) -> &I {
        &self.indicator
    }

    pub fn builds(&self) -> &P {
        &self.builds
    }

    #[cfg(test)]
    pub fn last_status(&self) -> BuildStatus {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last_status
    }

    /// Installs credentials and TLS policy into the client. The policy only
    /// affects this controller's client.
    pub fn configure(&self, credentials: Credentials, tls: TlsPolicy) -> Result<(), ClientError> {
        if tls == TlsPolicy::AcceptInvalidCerts {
            warn!(
                event = "controller.tls_verification_disabled",
                "server certificates will not be validated"
            );
        }
        self.client.configure(ClientConfig { credentials, tls })?;
        debug!(event = "controller.configured");
        Ok(())
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_in_flight) = InFlight::acquire(&self.in_flight) else {
            debug!(event = "controller.refresh_dropped", reason = "in_flight");
            return RefreshOutcome::Skipped;
        };

        self.indicator.set_checking(true);
        let fetched = self.client.fetch_build_status().await;
        self.indicator.set_checking(false);

        match fetched {
            Ok(report) => {
                let (status, hint) = if report.builds.is_empty() {
                    (BuildStatus::Unknown, HINT_NO_BUILDS)
                } else {
                    (report.status, HINT_BUILDS_AVAILABLE)
                };
                self.indicator.set_hint(hint);
                self.commit_status(status);
                debug!(
                    event = "controller.refreshed",
                    status = status.label(),
                    builds = report.builds.len()
                );
                self.builds.set_list(report.builds);
                RefreshOutcome::Completed(status)
            }
            Err(e) => {
                debug!(event = "controller.fetch_failed", error = %e);
                self.indicator
                    .set_hint(&format!("Failed to fetch build status: {e}"));
                self.commit_status(BuildStatus::Error);
                self.builds.set_list(Vec::new());
                RefreshOutcome::Failed
            }
        }
    }

    fn commit_status(&self, status: BuildStatus) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.last_status != status {
            debug!(
                event = "controller.status_changed",
                from = state.last_status.label(),
                to = status.label()
            );
            state.last_status = status;
            self.indicator.update(status);
        }
    }

    /// Runs the refresh cycle: immediately, every `interval`, and whenever
    /// the checked-out commit changes. Commands are served between refreshes.
    /// Never returns.
    pub async fn run(&self, interval: Duration, mut commands: mpsc::Receiver<Command>) {
        let mut ticker = ticker(interval);
        let mut period = interval;
        let mut commits = self.client.commit_changes();
        commits.borrow_and_update();
        let mut commits_open = true;
        let mut commands_open = true;

        debug!(event = "controller.started", interval_secs = interval.as_secs());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.refresh().await;
                    self.drop_commit_change(&mut commits);
                }
                changed = commits.changed(), if commits_open => match changed {
                    Ok(()) => {
                        let commit = commits.borrow_and_update().clone();
                        debug!(event = "controller.commit_changed", commit = ?commit);
                        self.refresh().await;
                        self.drop_commit_change(&mut commits);
                    }
                    Err(_) => {
                        debug!(event = "controller.commit_notifications_closed");
                        commits_open = false;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::ListBuilds) => self.builds.show(),
                    Some(Command::Reconfigure { credentials, tls, interval }) => {
                        if let Err(e) = self.configure(credentials, tls) {
                            warn!(event = "controller.reconfigure_failed", error = %e);
                        }
                        if interval != period {
                            debug!(event = "controller.interval_changed", interval_secs = interval.as_secs());
                            period = interval;
                            ticker = ticker_from_now(period);
                        }
                    }
                    None => commands_open = false,
                },
            }
        }
    }

    /// A commit change seen while a refresh was in flight is not replayed;
    /// the next tick picks the new commit up.
    fn drop_commit_change(&self, commits: &mut watch::Receiver<Option<CommitId>>) {
        if commits.has_changed().unwrap_or(false) {
            let commit = commits.borrow_and_update().clone();
            debug!(event = "controller.commit_change_dropped", commit = ?commit);
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

fn ticker_from_now(period: Duration) -> Interval {
    let mut ticker = time::interval_at(time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}
