use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use jw_watch::api::JobApi;
use jw_watch::cli::{Cli, Command, ConfigCommand};
use jw_watch::config::{load_config, LoggingConfig};
use jw_watch::watch::{render_status, run_watch, Outcome, WatchOptions};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let (config, config_path) = load_config()?;
    init_tracing(&config.logging, cli.json_logs);
    tracing::debug!(config_path = %config_path, "configuration loaded");

    match cli.command {
        Command::Watch {
            repo_path,
            client_id,
            attach,
            no_performance_mode,
            json,
        } => {
            let opts = WatchOptions {
                client_id,
                repo_path,
                trigger: !attach,
                use_performance_mode: config.job.use_performance_mode && !no_performance_mode,
            };
            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_err() {
                    std::future::pending::<()>().await;
                }
            };
            let outcome = run_watch(&config, opts, shutdown).await?;
            report(&outcome, json)?;
            Ok(ExitCode::from(outcome.exit_code()))
        }
        Command::Status { client_id, json } => {
            let api = JobApi::new(&config.server)?;
            let status = api.status(&client_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", render_status(&status));
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(ConfigCommand::Show) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn report(outcome: &Outcome, json: bool) -> anyhow::Result<()> {
    match outcome {
        Outcome::Completed { client_id, result } => {
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                println!("job for {client_id} completed");
            }
        }
        Outcome::Failed { client_id, message } => {
            eprintln!("job for {client_id} failed: {message}");
        }
        Outcome::GaveUp { client_id, attempts } => {
            eprintln!("lost the progress stream for {client_id} after {attempts} reconnect attempts");
        }
        Outcome::Interrupted { client_id } => {
            eprintln!("stopped watching {client_id}");
        }
    }
    Ok(())
}

/// Logs go to stderr so stdout carries only progress and results.
fn init_tracing(cfg: &LoggingConfig, force_json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if cfg.json || force_json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
