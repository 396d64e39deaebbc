use clap::{Parser, Subcommand};

/// jw-watch: follow a background generation job over its progress stream.
#[derive(Debug, Parser)]
#[command(name = "jw-watch", version, about)]
pub struct Cli {
    /// Emit logs as JSON lines (overrides `[logging] json`).
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start (or attach to) a job and print its progress until it finishes.
    Watch {
        /// Repository to analyse (defaults to `[job] repo_path`).
        #[arg(long)]
        repo_path: Option<String>,
        /// Reuse an existing client id instead of registering a new one.
        #[arg(long)]
        client_id: Option<String>,
        /// Only follow the stream; do not start a job.
        #[arg(long)]
        attach: bool,
        /// Disable the backend's performance mode.
        #[arg(long)]
        no_performance_mode: bool,
        /// Print the final result as pretty JSON on stdout.
        #[arg(long)]
        json: bool,
    },
    /// Print the backend's status snapshot for a client id.
    Status {
        client_id: String,
        /// Output the raw snapshot as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_watch_flags() {
        let cli = Cli::try_parse_from([
            "jw-watch",
            "watch",
            "--repo-path",
            "/srv/repo",
            "--client-id",
            "c-1",
            "--no-performance-mode",
        ])
        .unwrap();
        match cli.command {
            Command::Watch {
                repo_path,
                client_id,
                attach,
                no_performance_mode,
                json,
            } => {
                assert_eq!(repo_path.as_deref(), Some("/srv/repo"));
                assert_eq!(client_id.as_deref(), Some("c-1"));
                assert!(!attach);
                assert!(no_performance_mode);
                assert!(!json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["jw-watch", "config", "show", "--json-logs"]).unwrap();
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Config(ConfigCommand::Show)));
    }

    #[test]
    fn status_requires_client_id() {
        assert!(Cli::try_parse_from(["jw-watch", "status"]).is_err());
    }
}
