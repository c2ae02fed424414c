use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use exportmon::core::{Destination, Orchestrator};
use exportmon::{config, context, logging};
use serde::Serialize;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "exportmon")]
#[command(about = "Track remote export jobs until they finish", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll one or more jobs until they finish; Ctrl-C cancels them
    Watch(WatchArgs),
    /// Print the current status of a job once
    Status(StatusArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
struct WatchArgs {
    #[arg(required = true)]
    job_ids: Vec<String>,

    #[arg(long, value_enum, default_value_t = Destination::LocalStaging)]
    destination: Destination,
}

#[derive(Args)]
struct StatusArgs {
    job_id: String,

    #[arg(long, value_enum, default_value_t = Destination::LocalStaging)]
    destination: Destination,
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    provider_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    poll_interval_secs: Option<u64>,

    #[serde(skip_serializing_if = "is_false")]
    #[arg(long, global = true)]
    simulation: bool,

    #[serde(skip_serializing_if = "is_false")]
    #[arg(long, global = true)]
    verbose: bool,

    #[serde(skip_serializing_if = "is_false")]
    #[arg(long, global = true)]
    json_logs: bool,
}

// An unset flag must not override the file or environment value.
fn is_false(flag: &bool) -> bool {
    !*flag
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let config = config::AppConfig::new(Some(&cli.global))?;
    logging::init(logging::LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
    });

    match &cli.command {
        Commands::Watch(args) => {
            let ctx = context::AppContext::new(config);
            run_watch(ctx, args).await.context("Failed to watch export jobs")
        }
        Commands::Status(args) => {
            let ctx = context::AppContext::new(config);
            run_status(ctx, args).await.context("Failed to query export job")
        }
        Commands::Config => {
            print!("{}", config.redacted().to_toml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_watch(ctx: context::AppContext, args: &WatchArgs) -> Result<ExitCode> {
    let orchestrator = Orchestrator::new(ctx);
    let interrupt = async {
        // If the handler cannot be installed, run without Ctrl-C support.
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let outcome = orchestrator
        .watch(&args.job_ids, args.destination, interrupt)
        .await?;

    for (job_id, status) in &outcome.statuses {
        match status {
            Some(status) => println!(">> {}: {}", job_id, status),
            None => println!(">> {}: no status received", job_id),
        }
    }

    Ok(if outcome.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_status(ctx: context::AppContext, args: &StatusArgs) -> Result<ExitCode> {
    let status = Orchestrator::new(ctx)
        .query(&args.job_id, args.destination)
        .await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_options_are_plain_flags() {
        let cli = Cli::try_parse_from(["exportmon", "config", "--simulation", "--json-logs"]).unwrap();
        assert!(cli.global.simulation);
        assert!(cli.global.json_logs);
        assert!(!cli.global.verbose);

        assert!(Cli::try_parse_from(["exportmon", "--verbose", "true", "config"]).is_err());
    }

    #[test]
    fn test_unset_flags_are_not_serialized() {
        let cli = Cli::try_parse_from(["exportmon", "--simulation", "config"]).unwrap();
        let args = serde_json::to_value(&cli.global).unwrap();
        assert_eq!(args, serde_json::json!({ "simulation": true }));
    }
}
