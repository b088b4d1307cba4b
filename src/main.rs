mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use claude_bridge::config;
use claude_bridge::dispatch::Dispatcher;
use claude_bridge::transport::{ChannelOutbound, InboundEvent};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the environment may already be set.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = config::load(&cli.config)?;
    cli.apply(&mut config);
    let channel = config
        .target_channel
        .clone()
        .context("no target channel: set TARGET_CHANNEL_ID, --channel, or target_channel")?;

    let (outbound, mut outbox) = ChannelOutbound::channel();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(message) = outbox.recv().await {
            let line = format!("{message}\n");
            if let Err(e) = stdout.write_all(line.as_bytes()).await {
                error!("failed to write to stdout: {e}");
                break;
            }
            if let Err(e) = stdout.flush().await {
                error!("failed to flush stdout: {e}");
                break;
            }
        }
    });

    // Installed before anything needs cleaning up on the way out.
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let dispatcher = Dispatcher::new(channel.as_str(), &config, outbound);

    if config.awake_on_start {
        match dispatcher.caffeine().start().await {
            Ok(pid) => info!(?pid, "sleep inhibitor active; use !sleep / !awake to toggle"),
            Err(e) => warn!("could not start sleep inhibitor: {e:#}"),
        }
    }

    info!("claude bridge active on {channel}");
    warn!("running claude with --dangerously-skip-permissions");
    warn!("claude will create, modify and delete files and run commands without confirmation");
    warn!("make sure only trusted users can post in the target channel");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = Vec::new();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(text) => {
                        let event = InboundEvent::user(channel.as_str(), text);
                        if let Some(task) = dispatcher.handle(&event).await {
                            in_flight.push(task);
                        }
                        in_flight.retain(|task| !task.is_finished());
                    }
                    None => {
                        info!("input closed, waiting for running requests");
                        for task in in_flight.drain(..) {
                            if let Err(e) = task.await {
                                error!("request task failed: {e}");
                            }
                        }
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
            _ = terminate.recv() => {
                info!("terminated, shutting down");
                break;
            }
        }
    }

    dispatcher.shutdown().await?;
    drop(dispatcher);
    if let Err(e) = writer.await {
        error!("output writer failed: {e}");
    }
    Ok(())
}

/// Initialise tracing from `RUST_LOG`, falling back to `--log-level`.
fn init_tracing(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr; stdout carries the channel messages.
    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
