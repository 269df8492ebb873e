//! nearcast command line: share text, command lines and files with nearby
//! peers over broadcast UDP datagrams.

mod config;
mod run;
mod store;
mod transport;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nearcast_core::{ShareSession, TransferKind};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

use run::Runner;
use transport::UdpTransport;

#[derive(Parser)]
#[command(name = "nearcast", version, about = "Share text, commands and files with nearby devices")]
struct Cli {
    /// Destination: 12 hex digits or 'broadcast'. Skips interactive discovery.
    #[arg(long, global = true)]
    to: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a text message.
    SendText { text: String },
    /// Send one command line, or read lines interactively when omitted.
    SendCommand { command: Option<String> },
    /// Send a file.
    SendFile { path: PathBuf },
    /// Receive text messages.
    RecvText {
        /// Stop after one transfer instead of looping.
        #[arg(long)]
        once: bool,
    },
    /// Receive command lines.
    RecvCommand {
        #[arg(long)]
        once: bool,
    },
    /// Receive files into the download directory.
    RecvFile {
        #[arg(long)]
        once: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = config::load();

    let transport = Arc::new(UdpTransport::bind(config.port).await?);
    let session = Arc::new(Mutex::new(ShareSession::new()));
    transport::spawn_receiver(transport.clone(), session.clone());

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("cancel requested");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let runner = Runner {
        config,
        transport,
        session,
        cancel: cancel.clone(),
    };

    match cli.command {
        Command::SendText { text } => {
            let dest = runner.choose_destination(cli.to.as_deref()).await?;
            runner.send_text(dest, &text).await?;
        }
        Command::SendCommand { command: Some(command) } => {
            let dest = runner.choose_destination(cli.to.as_deref()).await?;
            runner.send_command(dest, &command).await?;
        }
        Command::SendCommand { command: None } => {
            let dest = runner.choose_destination(cli.to.as_deref()).await?;
            // Interactive mode: each stdin line becomes one transfer.
            for line in std::io::stdin().lock().lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                runner.send_command(dest, &line).await?;
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
            }
        }
        Command::SendFile { path } => {
            let dest = runner.choose_destination(cli.to.as_deref()).await?;
            runner.send_file(dest, &path).await?;
        }
        Command::RecvText { once } => receive_loop(&runner, TransferKind::Text, once).await?,
        Command::RecvCommand { once } => receive_loop(&runner, TransferKind::Serial, once).await?,
        Command::RecvFile { once } => receive_loop(&runner, TransferKind::File, once).await?,
    }
    Ok(())
}

/// Receivers re-arm after each transfer until cancelled or `--once`.
async fn receive_loop(runner: &Runner, kind: TransferKind, once: bool) -> Result<()> {
    loop {
        runner.run_receive(kind).await?;
        if once || runner.cancel.load(Ordering::Relaxed) {
            return Ok(());
        }
    }
}
