//! Send and receive rounds: the interactive loops that drive a session over
//! the UDP transport, one transfer at a time.

use std::io::{BufRead, Write as _};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use nearcast_core::{
    FailReason, FileMeta, Frame, LinkAddr, SendSequence, ShareSession, TransferKind, TransferState,
};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::store::FsStore;
use crate::transport::UdpTransport;

pub struct Runner {
    pub config: Config,
    pub transport: Arc<UdpTransport>,
    pub session: Arc<Mutex<ShareSession>>,
    /// Set by the Ctrl-C handler; checked once per polling iteration.
    pub cancel: Arc<AtomicBool>,
}

impl Runner {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    async fn pace(&self) {
        sleep(Duration::from_millis(self.config.poll_ms)).await;
    }

    /// Turn a `--to` argument or an interactive discovery round into a
    /// destination address. Chosen unicast peers are registered before any
    /// data flows; a failed registration aborts the operation.
    pub async fn choose_destination(&self, to: Option<&str>) -> Result<LinkAddr> {
        let dest = match to {
            Some(arg) if arg.eq_ignore_ascii_case("broadcast") => LinkAddr::BROADCAST,
            Some(arg) => LinkAddr::parse_hex(arg)
                .ok_or_else(|| anyhow!("destination must be 12 hex digits or 'broadcast'"))?,
            None => self.discover_destination().await?,
        };
        if !dest.is_broadcast() && !self.transport.register_peer(dest).await {
            bail!("could not register peer {dest}");
        }
        Ok(dest)
    }

    /// Broadcast a PING, collect PONGs for the discovery window, and let the
    /// user pick from the peers that answered (or broadcast).
    async fn discover_destination(&self) -> Result<LinkAddr> {
        self.session.lock().await.clear_peer_options();
        info!("discovering peers");
        self.transport
            .send(LinkAddr::BROADCAST, &Frame::ping().encode(), &self.session)
            .await
            .context("broadcasting ping")?;
        sleep(Duration::from_millis(self.config.discovery_ms)).await;

        let options: Vec<LinkAddr> = {
            let mut session = self.session.lock().await;
            let options = session.peer_options().to_vec();
            session.clear_peer_options();
            options
        };

        println!("  0) broadcast to everyone");
        for (i, peer) in options.iter().enumerate() {
            println!("  {}) {peer}", i + 1);
        }
        print!("destination> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let choice: usize = line.trim().parse().context("enter a number from the list")?;
        if choice == 0 {
            return Ok(LinkAddr::BROADCAST);
        }
        options
            .get(choice - 1)
            .copied()
            .ok_or_else(|| anyhow!("no such peer"))
    }

    pub async fn send_text(&self, dest: LinkAddr, text: &str) -> Result<TransferState> {
        self.run_send(dest, TransferKind::Text, text.as_bytes(), None)
            .await
    }

    pub async fn send_command(&self, dest: LinkAddr, command: &str) -> Result<TransferState> {
        self.run_send(dest, TransferKind::Serial, command.as_bytes(), None)
            .await
    }

    pub async fn send_file(&self, dest: LinkAddr, path: &Path) -> Result<TransferState> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!(FailReason::FilePick.describe()))?
            .to_string();
        let filepath = path
            .parent()
            .and_then(|p| p.to_str())
            .unwrap_or("/")
            .to_string();
        let meta = FileMeta { filename, filepath };
        self.run_send(dest, TransferKind::File, &content, Some(meta))
            .await
    }

    /// One send round: chunk the payload and transmit frame by frame at the
    /// polling cadence, honoring cancellation and send failures.
    async fn run_send(
        &self,
        dest: LinkAddr,
        kind: TransferKind,
        payload: &[u8],
        file: Option<FileMeta>,
    ) -> Result<TransferState> {
        let mut seq = SendSequence::new(kind, payload.len() as u32, file)
            .map_err(|reason| anyhow!(reason.describe()))?;
        info!(kind = kind.name(), to = %dest, bytes = payload.len(), "sending");

        let mut pos = 0usize;
        while !seq.is_finished() {
            if self.cancelled() {
                // The receiver learns of the cancellation from one final
                // empty DONE frame.
                if let Some(fin) = seq.cancel() {
                    let _ = self.transport.send(dest, &fin.encode(), &self.session).await;
                }
                break;
            }
            let end = (pos + seq.chunk_capacity()).min(payload.len());
            let frame = seq.next_frame(&payload[pos..end]);
            pos = end;
            if self
                .transport
                .send(dest, &frame.encode(), &self.session)
                .await
                .is_err()
            {
                seq.fail_send();
                break;
            }
            let (sent, total) = seq.progress();
            info!(sent, total, "send progress");
            if !seq.is_finished() {
                self.pace().await;
            }
        }
        self.report(kind, seq.state());
        Ok(seq.state())
    }

    /// One receive round: arm the session, poll until the transfer reaches a
    /// terminal state, then hand the payload to its consumer.
    pub async fn run_receive(&self, kind: TransferKind) -> Result<TransferState> {
        // Commands and text reassemble in memory; files stream to disk.
        let buffer_capacity = match kind {
            TransferKind::Serial => Some(1024),
            TransferKind::Text => Some(4096),
            TransferKind::File => None,
        };
        let store = FsStore::new(self.config.download_dir.clone());
        self.session
            .lock()
            .await
            .begin_receive(kind, buffer_capacity, self.config.stall_polls);
        info!(kind = kind.name(), "waiting for transfer");

        let mut state = loop {
            if self.cancelled() {
                self.session.lock().await.cancel_receive();
            }
            let state = self.session.lock().await.poll_receive(&store);
            if state.is_terminal() {
                break state;
            }
            self.pace().await;
        };

        if state == TransferState::Complete {
            let mut session = self.session.lock().await;
            match kind {
                TransferKind::Text => {
                    println!("{}", session.take_text());
                }
                TransferKind::Serial => {
                    let command = session.take_text();
                    if !interpret_command(&command) {
                        state = TransferState::Failed(FailReason::Parse);
                    }
                }
                TransferKind::File => {
                    if let Some(path) = session.received_path() {
                        info!(path, "file stored");
                    }
                }
            }
        }
        self.session.lock().await.end_receive();
        self.report(kind, state);
        Ok(state)
    }

    fn report(&self, kind: TransferKind, state: TransferState) {
        match state {
            TransferState::Complete => info!(kind = kind.name(), "transfer complete"),
            TransferState::Broken => info!(kind = kind.name(), "transfer cancelled"),
            other => warn!(kind = kind.name(), outcome = other.describe(), "transfer ended"),
        }
    }
}

/// Interpret a received command line. Commands are logged, not executed as
/// shell; an empty or non-printable line counts as an interpretation failure.
fn interpret_command(command: &str) -> bool {
    let trimmed = command.trim();
    if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
        return false;
    }
    info!(command = trimmed, "command received");
    true
}
