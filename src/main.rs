mod bitbucket;
mod build_status;
mod cli;
mod client;
mod controller;
mod errors;
mod git;
mod logging;
mod rendering;
mod settings;
mod settings_watcher;
mod utils;

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::Parser;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, error, info};

use crate::{
    bitbucket::BitbucketClient,
    cli::{Cli, Commands},
    controller::{Command, PollingController, RefreshOutcome},
    git::{HEAD_CHECK_INTERVAL, HeadWatcher},
    logging::init_logging,
    rendering::{BuildListPresenter, TerminalBuildList, TerminalStatusIndicator},
    settings::{SettingKey, Settings, default_settings_path, read_settings},
    settings_watcher::{SettingsEvent, SettingsWatcher},
};

type Controller = PollingController<BitbucketClient, TerminalStatusIndicator, TerminalBuildList>;

type Error = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(event = "cli.failed", error = %e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let repo = match cli.repo {
        Some(repo) => repo,
        None => std::env::current_dir()?,
    };
    let settings_path = cli
        .config
        .unwrap_or_else(|| default_settings_path(&repo));

    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => watch(&repo, &settings_path).await,
        Commands::List => list(&repo, &settings_path).await,
        Commands::Settings => print_settings(&settings_path),
    }
}

fn build_controller(settings: &Settings, base: &Path) -> Result<(Controller, HeadWatcher), Error> {
    let repo_path = settings.repository_path(base);
    let head = HeadWatcher::spawn(repo_path.clone(), HEAD_CHECK_INTERVAL);
    let client = BitbucketClient::new(&settings.server_url, repo_path, head.subscribe())?;
    let controller = PollingController::new(
        client,
        TerminalStatusIndicator::new(),
        TerminalBuildList::new(),
    );
    controller.configure(settings.credentials(), settings.tls_policy())?;
    Ok((controller, head))
}

async fn watch(repo: &Path, settings_path: &Path) -> Result<(), Error> {
    let (_watcher, mut events) = SettingsWatcher::start(settings_path)?;
    let settings = match events.recv().await {
        Some(SettingsEvent::Loaded(settings)) => settings,
        Some(SettingsEvent::Invalid(e)) => return Err(e.into()),
        _ => return Err("settings are not available".into()),
    };
    let (controller, _head) = build_controller(&settings, repo)?;

    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(read_commands(tx.clone()));
    tokio::spawn(forward_settings(
        events,
        tx,
        settings_path.to_path_buf(),
    ));

    println!("Type `l` and Enter to list the builds.");
    controller.run(settings.polling_interval(), rx).await;
    Ok(())
}

async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match line.trim() {
            "l" | "list" => {
                if tx.send(Command::ListBuilds).await.is_err() {
                    break;
                }
            }
            "" => {}
            other => println!("\nUnknown command `{other}`, use `l` to list the builds."),
        }
    }
}

/// Settings edits reconfigure the running controller; errors and removal
/// are reported and the settings in force are kept.
async fn forward_settings(
    mut events: mpsc::UnboundedReceiver<SettingsEvent>,
    tx: mpsc::Sender<Command>,
    path: PathBuf,
) {
    while let Some(event) = events.recv().await {
        match event {
            SettingsEvent::Loaded(settings) | SettingsEvent::Reloaded(settings) => {
                debug!(event = "settings.reloaded", path = %path.display());
                let command = Command::Reconfigure {
                    credentials: settings.credentials(),
                    tls: settings.tls_policy(),
                    interval: settings.polling_interval(),
                };
                if tx.send(command).await.is_err() {
                    break;
                }
            }
            SettingsEvent::Invalid(e) => {
                eprintln!("\nIgnoring invalid settings in {}: {e}", path.display());
            }
            SettingsEvent::Deleted => {
                eprintln!(
                    "\nSettings file {} was deleted, keeping the current settings",
                    path.display()
                );
            }
        }
    }
}

async fn list(repo: &Path, settings_path: &Path) -> Result<(), Error> {
    let settings = read_settings(settings_path)?;
    let (controller, _head) = build_controller(&settings, repo)?;
    let outcome = controller.refresh().await;
    controller.builds().show();
    match outcome {
        RefreshOutcome::Completed(status) => {
            info!(event = "cli.listed", status = status.label());
            Ok(())
        }
        RefreshOutcome::Failed | RefreshOutcome::Skipped => {
            Err("could not fetch the build status".into())
        }
    }
}

fn print_settings(settings_path: &Path) -> Result<(), Error> {
    let settings = read_settings(settings_path)?;
    println!("{:10} {}", "file", settings_path.display());
    println!("{:10} {}", "serverUrl", settings.server_url);
    for key in SettingKey::ALL {
        let value = match key {
            SettingKey::Password => String::from("********"),
            _ => settings.get(key).to_string(),
        };
        println!("{:10} {}", key.name(), value);
    }
    Ok(())
}

#[cfg(test)]
mod main_tests {
    use std::time::Duration;

    use super::*;
    use crate::{client::TlsPolicy, errors::SettingsError, settings::load_settings};

    #[tokio::test]
    async fn settings_edits_become_reconfigure_commands() {
        let settings = load_settings(
            "{\"serverUrl\":\"https://b\",\"username\":\"u\",\"password\":\"p\",\"strictTls\":false,\"pooling\":15}",
            |_| None,
        )
        .unwrap();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(8);
        events_tx
            .send(SettingsEvent::Invalid(SettingsError::InvalidPollingInterval))
            .unwrap();
        events_tx.send(SettingsEvent::Deleted).unwrap();
        events_tx
            .send(SettingsEvent::Reloaded(settings.clone()))
            .unwrap();
        drop(events_tx);

        forward_settings(events_rx, tx, PathBuf::from(".commitwatch.json")).await;

        assert_eq!(
            rx.recv().await,
            Some(Command::Reconfigure {
                credentials: settings.credentials(),
                tls: TlsPolicy::AcceptInvalidCerts,
                interval: Duration::from_secs(15),
            })
        );
        assert_eq!(rx.recv().await, None);
    }
}
