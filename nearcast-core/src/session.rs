//! Share session: host-driven hub tying the classifier, the receive queue,
//! the discovery peer list, and the active receive operation together.
//!
//! The host owns exactly one session per device and calls it from two
//! contexts: the transport's receive callback (`on_datagram`, quick, only
//! classifies and enqueues) and the polling run loop (`poll_receive`, which
//! drains the queue and drives reassembly). Actions returned by the session
//! are performed by the host; the session itself never touches the link.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::link::LinkAddr;
use crate::protocol::MessageType;
use crate::sink::{FileAppendSink, FileStore};
use crate::transfer::{Acceptance, FailReason, RecvSequence, TransferKind, TransferState};
use crate::wire::{Frame, FrameBody};

/// Work the host must perform on the session's behalf.
pub enum OutboundAction {
    /// Register the origin as a communication peer, then send the encoded
    /// frame to it. If registration fails, drop the frame silently.
    ReplyTo(LinkAddr, Vec<u8>),
}

struct ReceiveOp {
    seq: RecvSequence,
    /// Reassembled text/command bytes. Unused for file transfers.
    text: Vec<u8>,
    sink: FileAppendSink,
}

/// One device's protocol session.
#[derive(Default)]
pub struct ShareSession {
    rx_queue: VecDeque<Frame>,
    peer_options: Vec<LinkAddr>,
    recv: Option<ReceiveOp>,
    last_send_ok: Option<bool>,
}

impl ShareSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inbound classifier, installed as the transport's receive callback.
    /// Must stay quick: it decodes, auto-replies to discovery, and enqueues
    /// frames the active receive operation is prepared to accept. Everything
    /// else is dropped without comment.
    pub fn on_datagram(&mut self, origin: LinkAddr, bytes: &[u8]) -> Vec<OutboundAction> {
        let frame = match Frame::decode(bytes, origin) {
            Ok(frame) => frame,
            Err(err) => {
                trace!(%origin, %err, "dropping foreign datagram");
                return Vec::new();
            }
        };
        trace!(%origin, msg_type = frame.msg_type.name(), size = frame.data_size(), "frame in");

        match frame.msg_type {
            MessageType::Nop => Vec::new(),
            MessageType::Ping => {
                debug!(%origin, "ping, replying pong");
                vec![OutboundAction::ReplyTo(origin, Frame::pong().encode())]
            }
            MessageType::Pong => {
                // Duplicates from re-pinging peers are acceptable: the list
                // feeds a human-facing selection prompt.
                debug!(%origin, "pong, peer discovered");
                self.peer_options.push(origin);
                Vec::new()
            }
            msg_type => {
                let wanted = match &self.recv {
                    Some(op) => match op.seq.state() {
                        TransferState::Waiting => op.seq.kind().accepts(msg_type, true),
                        TransferState::InProgress => op.seq.kind().accepts(msg_type, false),
                        _ => false,
                    },
                    None => false,
                };
                if wanted {
                    self.rx_queue.push_back(frame);
                } else {
                    trace!(msg_type = msg_type.name(), "dropping unexpected frame");
                }
                Vec::new()
            }
        }
    }

    /// Link-layer send-completion callback. Recorded for progress display
    /// only; a failed datagram is never retransmitted here.
    pub fn on_send_result(&mut self, addr: LinkAddr, ok: bool) {
        if !ok {
            debug!(%addr, "link reported send failure");
        }
        self.last_send_ok = Some(ok);
    }

    pub fn last_send_ok(&self) -> Option<bool> {
        self.last_send_ok
    }

    /// Peer addresses that answered the current discovery window.
    pub fn peer_options(&self) -> &[LinkAddr] {
        &self.peer_options
    }

    /// Clear the option list once a destination has been chosen.
    pub fn clear_peer_options(&mut self) {
        self.peer_options.clear();
    }

    /// Start a receive operation. Fully resets the shared queue and transfer
    /// state; outcomes of earlier operations cannot leak in.
    pub fn begin_receive(
        &mut self,
        kind: TransferKind,
        buffer_capacity: Option<usize>,
        stall_limit: u32,
    ) {
        self.rx_queue.clear();
        self.recv = Some(ReceiveOp {
            seq: RecvSequence::new(kind, buffer_capacity, stall_limit),
            text: Vec::new(),
            sink: FileAppendSink::new(),
        });
    }

    /// One polling iteration of the receive loop: drain whatever the
    /// classifier queued, or account an empty poll toward the stall timeout.
    /// Returns the transfer state afterwards.
    pub fn poll_receive<S: FileStore>(&mut self, store: &S) -> TransferState {
        let Some(op) = &mut self.recv else {
            return TransferState::Stopped;
        };
        if op.seq.state().is_terminal() {
            return op.seq.state();
        }

        if self.rx_queue.is_empty() {
            op.seq.on_empty_poll();
            return op.seq.state();
        }

        while let Some(frame) = self.rx_queue.pop_front() {
            if op.seq.state().is_terminal() {
                break;
            }
            match op.seq.accept(&frame) {
                Acceptance::Tiny => {
                    op.text = frame.payload().to_vec();
                }
                Acceptance::Chunk { .. } => {
                    if op.seq.kind() == TransferKind::File {
                        let meta = match &frame.body {
                            FrameBody::FileHead(fhb) => {
                                Some((fhb.filename.as_str(), fhb.filepath.as_str()))
                            }
                            _ => None,
                        };
                        if let Err(err) = op.sink.append(store, meta, frame.payload()) {
                            warn!(%err, "append failed, aborting receive");
                            op.seq.fail(FailReason::Append);
                            break;
                        }
                    } else {
                        op.text.extend_from_slice(frame.payload());
                    }
                    op.seq.advance(&frame);
                    let (received, total) = op.seq.progress();
                    debug!(received, total, "receive progress");
                }
                Acceptance::Skip => {}
            }
        }
        op.seq.state()
    }

    pub fn cancel_receive(&mut self) {
        if let Some(op) = &mut self.recv {
            op.seq.cancel();
        }
    }

    pub fn recv_state(&self) -> TransferState {
        self.recv
            .as_ref()
            .map(|op| op.seq.state())
            .unwrap_or(TransferState::Stopped)
    }

    pub fn recv_progress(&self) -> (u32, u32) {
        self.recv
            .as_ref()
            .map(|op| op.seq.progress())
            .unwrap_or((0, 0))
    }

    /// Reassembled text of a completed text/command receive.
    pub fn take_text(&mut self) -> String {
        let bytes = self
            .recv
            .as_mut()
            .map(|op| std::mem::take(&mut op.text))
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Destination path of the file being received, once fixed.
    pub fn received_path(&self) -> Option<&str> {
        self.recv.as_ref().and_then(|op| op.sink.dest())
    }

    /// Tear down the receive operation at the end of one round.
    pub fn end_receive(&mut self) {
        self.recv = None;
        self.rx_queue.clear();
    }
}
