use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Watch the CI status of the checked-out commit", long_about = None)]
pub struct Cli {
    /// Settings file (defaults to <repo>/.commitwatch.json, then ~/.commitwatch.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository to watch (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo: Option<PathBuf>,

    /// Only log errors
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Poll the build status and keep the status line current (default)
    Watch,

    /// Fetch once and list the builds of the checked-out commit
    List,

    /// Print the recognised settings
    Settings,
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    #[test]
    fn defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["commit-watch"]).unwrap();
        assert_eq!(cli.command, None);
        assert!(!cli.quiet);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["commit-watch", "list", "--config", "/tmp/cw.json", "-q"]).unwrap();
        assert_eq!(cli.command, Some(Commands::List));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/cw.json")));
        assert!(cli.quiet);
    }
}
