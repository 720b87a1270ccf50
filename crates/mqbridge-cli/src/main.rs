//! mqbridge
//!
//! Relays messages between Google Cloud Pub/Sub and an MQ queue manager:
//! - cloud-to-mq: subscription to queue or topic
//! - mq-to-cloud: queue or topic to Pub/Sub topic
//! - hash-password: bcrypt hash for the queue manager's user registry

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

mod backends;
mod commands;

#[derive(Parser, Debug)]
#[command(name = "mqbridge")]
#[command(about = "Bridge between Google Cloud Pub/Sub and IBM MQ")]
#[command(long_about = "Bridge between Google Cloud Pub/Sub and IBM MQ.\n\n\
No native MQ client is linked into this build. The bridge commands refuse to \
start unless --emulate-mq is given, and then run against an in-process queue \
manager that starts empty and is discarded on exit. Without the gcp feature \
the Pub/Sub side is in-process as well.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at info level for every crate, dependencies included
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Forward a Pub/Sub subscription to an MQ queue or topic
    CloudToMq(commands::cloud_to_mq::CloudToMqCommand),
    /// Publish messages from an MQ queue or topic to Pub/Sub
    MqToCloud(commands::mq_to_cloud::MqToCloudCommand),
    /// Print a bcrypt hash of a password
    HashPassword(commands::hash_password::HashPasswordCommand),
}

const DEFAULT_FILTER: &str = "warn,mqbridge=info,mqbridge_pipeline=info,mqbridge_transport=info";

fn log_filter(cli: &Cli) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let directives = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        DEFAULT_FILTER
    };
    EnvFilter::new(directives)
}

/// Cancel `cancel` on ctrl-c
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            signal = tokio::signal::ctrl_c() => {
                match signal {
                    Ok(()) => info!("Interrupted, draining"),
                    Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
                }
                cancel.cancel();
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli))
        .with_writer(std::io::stderr)
        .with_target(cli.debug)
        .init();

    let cancel = CancellationToken::new();
    let summary = match cli.command {
        Commands::CloudToMq(cmd) => {
            cancel_on_interrupt(cancel.clone());
            commands::cloud_to_mq::execute(cmd, cancel).await?
        }
        Commands::MqToCloud(cmd) => {
            cancel_on_interrupt(cancel.clone());
            commands::mq_to_cloud::execute(cmd, cancel).await?
        }
        Commands::HashPassword(cmd) => {
            commands::hash_password::execute(cmd)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    debug!("Run summary: {}", serde_json::to_string(&summary)?);
    Ok(ExitCode::from(summary.exit.code()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use commands::OnFailure;

    #[test]
    fn test_cloud_to_mq_args() {
        let cli = Cli::try_parse_from([
            "mqbridge",
            "cloud-to-mq",
            "orders-sub",
            "DEV.QUEUE.1",
            "QM1",
            "--connection",
            "localhost(1414)",
            "--channel",
            "DEV.APP.SVRCONN",
            "--max-in-flight",
            "4",
            "--on-failure",
            "drop",
            "--emulate-mq",
        ])
        .unwrap();

        let Commands::CloudToMq(cmd) = cli.command else {
            panic!("expected cloud-to-mq");
        };
        assert_eq!(cmd.subscription, "orders-sub");
        assert_eq!(cmd.destination, "DEV.QUEUE.1");
        assert_eq!(cmd.queue_manager, "QM1");
        assert_eq!(cmd.max_in_flight, 4);
        assert_eq!(cmd.on_failure, OnFailure::Drop);
        assert_eq!(cmd.client.channel.as_deref(), Some("DEV.APP.SVRCONN"));
        assert!(cmd.client.emulate_mq);
    }

    #[test]
    fn test_missing_positional_is_usage_error() {
        let err = Cli::try_parse_from(["mqbridge", "cloud-to-mq", "orders-sub", "DEV.QUEUE.1"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_eq!(err.exit_code(), 2);

        assert!(Cli::try_parse_from(["mqbridge", "mq-to-cloud", "orders"]).is_err());
    }

    #[test]
    fn test_user_requires_password() {
        let err = Cli::try_parse_from([
            "mqbridge",
            "mq-to-cloud",
            "orders",
            "DEV.QUEUE.1",
            "QM1",
            "--connection",
            "localhost(1414)",
            "--channel",
            "DEV.APP.SVRCONN",
            "--user",
            "app",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_channel_requires_connection() {
        assert!(
            Cli::try_parse_from([
                "mqbridge",
                "mq-to-cloud",
                "orders",
                "DEV.QUEUE.1",
                "QM1",
                "--channel",
                "DEV.APP.SVRCONN",
            ])
            .is_err()
        );
    }

    #[test]
    fn test_mq_to_cloud_defaults() {
        let cli = Cli::try_parse_from([
            "mqbridge",
            "--debug",
            "mq-to-cloud",
            "orders",
            "dev/orders",
            "QM1",
            "--topic",
            "--match-msg-id",
            "414d5120",
        ])
        .unwrap();
        assert!(cli.debug);

        let Commands::MqToCloud(cmd) = cli.command else {
            panic!("expected mq-to-cloud");
        };
        assert!(cmd.topic);
        assert_eq!(cmd.wait_interval, 3);
        assert!(!cmd.client.emulate_mq);
        assert_eq!(cmd.match_msg_id.as_deref(), Some("414d5120"));
        assert_eq!(cmd.on_failure, OnFailure::Exit);
    }

    #[test]
    fn test_hash_password_default_cost() {
        let cli = Cli::try_parse_from(["mqbridge", "hash-password", "secret"]).unwrap();
        let Commands::HashPassword(cmd) = cli.command else {
            panic!("expected hash-password");
        };
        assert_eq!(cmd.cost, 8);
    }
}
