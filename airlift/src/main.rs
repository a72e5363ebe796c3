mod config;
mod mdns;
mod net;
mod rendezvous;
mod session;

use std::io::IsTerminal;
use std::process::ExitCode;
use anyhow::{anyhow, Result};
use clap::Parser;
use crate::config::{Args, Role, SessionConfig};
use crate::session::receive::ReceiveOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the payload, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.log_directive()))
        )
        .init();

    let config = args.resolve(std::io::stdin().is_terminal());
    tracing::info!("Starting airlift as {:?}", config.role);

    match run(&config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: &SessionConfig) -> Result<()> {
    match config.role {
        Role::Publish => session::publish::run(config).await,
        Role::Receive => match session::receive::run(config).await? {
            ReceiveOutcome::Received { from, bytes } => {
                tracing::info!("Received {} bytes from {}", bytes, from);
                Ok(())
            }
            ReceiveOutcome::Exhausted { attempts } => Err(anyhow!(
                "No publisher could be reached ({} candidates tried)",
                attempts
            )),
        },
    }
}
