//! Sequence transfer engine: outbound chunking and inbound reassembly.
//!
//! One transfer per direction at a time. The host drives both machines from a
//! plain polling loop: it reads chunks and transmits the frames `SendSequence`
//! builds, and feeds received frames into `RecvSequence`, which owns every
//! acceptance rule (origin/handle locking, first-frame sanity, completion vs.
//! packet loss). Neither machine sleeps, sends, or touches a filesystem.

use rand::Rng;
use tracing::debug;

use crate::link::LinkAddr;
use crate::protocol::MessageType;
use crate::wire::{Frame, FrameBody};

/// Payload kind of a transfer.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransferKind {
    Text,
    Serial,
    File,
}

impl TransferKind {
    /// Single-frame message type, if the kind has one. Files always sequence.
    pub fn tiny_type(&self) -> Option<MessageType> {
        match self {
            TransferKind::Text => Some(MessageType::TextTiny),
            TransferKind::Serial => Some(MessageType::CmdTiny),
            TransferKind::File => None,
        }
    }

    /// Multi-frame message type carrying the sequence block.
    pub fn long_type(&self) -> MessageType {
        match self {
            TransferKind::Text => MessageType::TextLong,
            TransferKind::Serial => MessageType::CmdLong,
            TransferKind::File => MessageType::FileBody,
        }
    }

    /// Whether a receiver in the given phase accepts this message type.
    /// Files expect the head frame first and body frames after; text and
    /// command transfers admit both their variants here and let the receive
    /// machine skip the ones that don't fit the phase.
    pub fn accepts(&self, msg_type: MessageType, waiting: bool) -> bool {
        match self {
            TransferKind::File => {
                if waiting {
                    msg_type == MessageType::FileHead
                } else {
                    msg_type == MessageType::FileBody
                }
            }
            TransferKind::Serial => {
                matches!(msg_type, MessageType::CmdTiny | MessageType::CmdLong)
            }
            TransferKind::Text => {
                matches!(msg_type, MessageType::TextTiny | MessageType::TextLong)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TransferKind::Text => "text",
            TransferKind::Serial => "command",
            TransferKind::File => "file",
        }
    }
}

/// Why a transfer ended short of completion.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FailReason {
    /// Caller supplied an inconsistent kind/payload combination.
    Arg,
    /// Destination file could not be written.
    Append,
    /// DONE flag and byte counter disagree.
    PacketLost,
    /// No frames arrived for the stall-tolerance window.
    Timeout,
    /// No send-side file was chosen.
    FilePick,
    /// Received command text failed interpretation.
    Parse,
    /// The transport refused a frame. Never retried.
    Send,
}

impl FailReason {
    pub fn describe(&self) -> &'static str {
        match self {
            FailReason::Arg => "invalid transfer arguments",
            FailReason::Append => "failed appending to file",
            FailReason::PacketLost => "packet lost",
            FailReason::Timeout => "timed out waiting for frames",
            FailReason::FilePick => "no file selected",
            FailReason::Parse => "command failed interpretation",
            FailReason::Send => "transport send failed",
        }
    }
}

/// Lifecycle state of one transfer. `Broken`, `Complete` and `Failed` are
/// terminal; a new operation starts from a fresh machine.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TransferState {
    Stopped,
    /// Receiver waiting for the first frame of a sequence.
    Waiting,
    InProgress,
    /// Cancelled by the user. An outcome, not an error.
    Broken,
    Complete,
    Failed(FailReason),
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferState::Broken | TransferState::Complete | TransferState::Failed(_)
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            TransferState::Stopped => "stopped",
            TransferState::Waiting => "waiting",
            TransferState::InProgress => "in progress",
            TransferState::Broken => "cancelled",
            TransferState::Complete => "complete",
            TransferState::Failed(reason) => reason.describe(),
        }
    }
}

/// File metadata announced in the head frame of a file transfer.
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub filename: String,
    pub filepath: String,
}

/// Outbound chunking machine. Built once per send operation; the host reads
/// source bytes up to `chunk_capacity()` and passes them to `next_frame()`
/// until `state()` turns terminal.
#[derive(Debug)]
pub struct SendSequence {
    kind: TransferKind,
    handle: u16,
    total: u32,
    sent: u32,
    tiny: bool,
    file: Option<FileMeta>,
    head_sent: bool,
    state: TransferState,
}

impl SendSequence {
    /// Validates the kind/payload combination and picks TINY vs. sequenced
    /// framing. A fresh random handle distinguishes this sequence from any
    /// other live on the shared medium.
    pub fn new(
        kind: TransferKind,
        total: u32,
        file: Option<FileMeta>,
    ) -> Result<Self, FailReason> {
        match kind {
            TransferKind::File if file.is_none() => return Err(FailReason::Arg),
            TransferKind::Text | TransferKind::Serial if file.is_some() => {
                return Err(FailReason::Arg)
            }
            _ => {}
        }
        if total == 0 {
            return Err(FailReason::Arg);
        }
        let tiny = match kind.tiny_type() {
            Some(t) => (total as usize) <= t.capacity(),
            None => false,
        };
        let handle = rand::thread_rng().gen::<u16>();
        debug!(
            kind = kind.name(),
            handle, total, tiny, "send sequence started"
        );
        Ok(SendSequence {
            kind,
            handle,
            total,
            sent: 0,
            tiny,
            file,
            head_sent: false,
            state: TransferState::InProgress,
        })
    }

    pub fn handle(&self) -> u16 {
        self.handle
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn progress(&self) -> (u32, u32) {
        (self.sent, self.total)
    }

    /// Payload capacity of the next frame. The file head frame is smaller
    /// than the body frames that follow it.
    pub fn chunk_capacity(&self) -> usize {
        if self.tiny {
            return self
                .kind
                .tiny_type()
                .map(|t| t.capacity())
                .unwrap_or_default();
        }
        if self.kind == TransferKind::File && !self.head_sent {
            MessageType::FileHead.capacity()
        } else {
            self.kind.long_type().capacity()
        }
    }

    /// Build the next outbound frame from `chunk` (read by the host, at most
    /// `chunk_capacity()` bytes). Advances the running counter, clamped to the
    /// declared total, and sets DONE exactly when the counter reaches it.
    pub fn next_frame(&mut self, chunk: &[u8]) -> Frame {
        let chunk = &chunk[..chunk.len().min(self.chunk_capacity())];
        self.sent = (self.sent + chunk.len() as u32).min(self.total);
        let done = self.sent == self.total;

        let frame = if self.tiny {
            // Single-packet shortcut: no sequence block on the wire.
            let msg_type = self.kind.tiny_type().unwrap_or(MessageType::Nop);
            Frame {
                msg_type,
                flags: crate::protocol::FLAG_DONE,
                body: FrameBody::Raw(chunk.to_vec()),
                origin: LinkAddr::UNSET,
            }
        } else if self.kind == TransferKind::File && !self.head_sent {
            self.head_sent = true;
            let meta = self.file.as_ref().expect("file kind carries metadata");
            Frame::file_head(
                self.handle,
                self.total,
                self.sent,
                &meta.filename,
                &meta.filepath,
                chunk.to_vec(),
                done,
            )
        } else {
            Frame::sequence(
                self.kind.long_type(),
                self.handle,
                self.total,
                self.sent,
                chunk.to_vec(),
                done,
            )
        };

        if done {
            self.state = TransferState::Complete;
        }
        frame
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Cancel the sequence. Sequenced transfers get one final empty DONE
    /// frame to tell the receiver the stream ended early; the host must still
    /// transmit it. TINY transfers have nothing in flight to terminate.
    pub fn cancel(&mut self) -> Option<Frame> {
        debug!(handle = self.handle, "send sequence cancelled");
        self.state = TransferState::Broken;
        if self.tiny {
            return None;
        }
        Some(Frame::sequence(
            self.kind.long_type(),
            self.handle,
            self.total,
            self.sent,
            Vec::new(),
            true,
        ))
    }

    /// The transport refused a frame. The transfer halts; there is no
    /// per-chunk retry at any layer.
    pub fn fail_send(&mut self) {
        debug!(handle = self.handle, "send sequence halted on send failure");
        self.state = TransferState::Failed(FailReason::Send);
    }
}

/// What the receive machine decided about one frame.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Acceptance {
    /// A TINY frame while waiting: the whole transfer in one packet. The
    /// machine is already `Complete`; the caller copies the payload.
    Tiny,
    /// An accepted sequence chunk. The caller delivers the payload to its
    /// sink at `offset`, then reports back via `advance()` or `fail()`.
    Chunk { offset: u32, first: bool },
    /// Not for us: foreign origin/handle, wrong phase, or a mid-stream frame
    /// whose start we missed. Dropped without comment.
    Skip,
}

/// Inbound reassembly machine for one receive operation.
pub struct RecvSequence {
    kind: TransferKind,
    state: TransferState,
    peer: LinkAddr,
    handle: u16,
    total: u32,
    received: u32,
    /// Destination capacity for in-memory sinks. Files are unbounded.
    buffer_capacity: Option<usize>,
    stall_polls: u32,
    stall_limit: u32,
}

impl RecvSequence {
    pub fn new(kind: TransferKind, buffer_capacity: Option<usize>, stall_limit: u32) -> Self {
        RecvSequence {
            kind,
            state: TransferState::Waiting,
            peer: LinkAddr::UNSET,
            handle: 0,
            total: 0,
            received: 0,
            buffer_capacity,
            stall_polls: 0,
            stall_limit,
        }
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn progress(&self) -> (u32, u32) {
        (self.received, self.total)
    }

    /// Locked peer address, once the first frame has been accepted.
    pub fn peer(&self) -> LinkAddr {
        self.peer
    }

    /// Decide what to do with a queued frame. Acceptance rules:
    ///
    /// - While waiting, a TINY frame is the entire transfer. A sequenced
    ///   frame must be a genuine first packet (`bytes_sent == data_size`) and
    ///   its declared total must fit the destination buffer; anything else is
    ///   skipped in case a valid start follows. Accepting locks the sender's
    ///   address and handle for the rest of the transfer.
    /// - In progress, frames from any other address or with any other handle
    ///   are skipped. Cross-talk on a broadcast medium is expected, not an
    ///   error.
    pub fn accept(&mut self, frame: &Frame) -> Acceptance {
        let waiting = self.state == TransferState::Waiting;
        if !waiting && self.state != TransferState::InProgress {
            return Acceptance::Skip;
        }
        if !self.kind.accepts(frame.msg_type, waiting) {
            return Acceptance::Skip;
        }

        if waiting {
            let Some((handle, total, bytes_sent)) = frame.counters() else {
                // TINY shortcut: one frame, no sequence block, done.
                self.total = u32::from(frame.data_size());
                self.received = self.total;
                self.peer = frame.origin;
                self.state = TransferState::Complete;
                debug!(kind = self.kind.name(), peer = %frame.origin, "tiny transfer complete");
                return Acceptance::Tiny;
            };
            // A first packet reports exactly its own payload as sent. Frames
            // failing this belong to a sequence whose start we missed.
            if bytes_sent != u32::from(frame.data_size()) {
                return Acceptance::Skip;
            }
            if let Some(cap) = self.buffer_capacity {
                if total as usize > cap {
                    return Acceptance::Skip;
                }
            }
            self.peer = frame.origin;
            self.handle = handle;
            self.total = total;
            self.state = TransferState::InProgress;
            debug!(
                kind = self.kind.name(),
                peer = %frame.origin,
                handle,
                total,
                "receive sequence locked"
            );
            return Acceptance::Chunk {
                offset: 0,
                first: true,
            };
        }

        if frame.origin != self.peer {
            return Acceptance::Skip;
        }
        match frame.counters() {
            Some((handle, _, _)) if handle == self.handle => Acceptance::Chunk {
                offset: self.received,
                first: false,
            },
            _ => Acceptance::Skip,
        }
    }

    /// Account for a delivered chunk and evaluate completion. A DONE flag
    /// that disagrees with the byte counter, in either direction, is data
    /// loss, never silently accepted.
    pub fn advance(&mut self, frame: &Frame) {
        self.received += u32::from(frame.data_size());
        self.stall_polls = 0;
        if frame.is_done() {
            self.state = if self.received == self.total {
                TransferState::Complete
            } else {
                TransferState::Failed(FailReason::PacketLost)
            };
        } else if self.received >= self.total {
            self.state = TransferState::Failed(FailReason::PacketLost);
        }
        if self.state.is_terminal() {
            debug!(
                handle = self.handle,
                received = self.received,
                total = self.total,
                state = self.state.describe(),
                "receive sequence ended"
            );
        }
    }

    /// Called once per polling iteration that found the queue empty. Returns
    /// true when the stall tolerance is exhausted. The counter only runs
    /// mid-sequence; an idle receiver waits indefinitely for a first frame.
    pub fn on_empty_poll(&mut self) -> bool {
        if self.state != TransferState::InProgress {
            return false;
        }
        self.stall_polls += 1;
        if self.stall_polls >= self.stall_limit {
            self.state = TransferState::Failed(FailReason::Timeout);
            debug!(handle = self.handle, "receive sequence timed out");
            return true;
        }
        false
    }

    pub fn cancel(&mut self) {
        self.state = TransferState::Broken;
    }

    pub fn fail(&mut self, reason: FailReason) {
        self.state = TransferState::Failed(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RAW_CAPACITY, SEQ_CAPACITY};

    fn addr(tag: u8) -> LinkAddr {
        LinkAddr::from_bytes([tag; 6])
    }

    fn stamp(mut frame: Frame, origin: LinkAddr) -> Frame {
        frame.origin = origin;
        frame
    }

    /// Drive a SendSequence over an in-memory buffer, collecting every frame.
    fn send_all(seq: &mut SendSequence, payload: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut pos = 0usize;
        while !seq.is_finished() {
            let end = (pos + seq.chunk_capacity()).min(payload.len());
            frames.push(seq.next_frame(&payload[pos..end]));
            pos = end;
        }
        frames
    }

    #[test]
    fn tiny_payload_sends_one_frame() {
        let mut seq = SendSequence::new(TransferKind::Text, 5, None).unwrap();
        let frames = send_all(&mut seq, b"hello");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msg_type, MessageType::TextTiny);
        assert!(frames[0].is_done());
        assert_eq!(frames[0].payload(), b"hello");
        assert_eq!(seq.state(), TransferState::Complete);
    }

    #[test]
    fn long_payload_fragments_with_done_on_last() {
        let payload = vec![0xABu8; 1000];
        let mut seq = SendSequence::new(TransferKind::Text, 1000, None).unwrap();
        let frames = send_all(&mut seq, &payload);
        // 4 x 230 + 1 x 80.
        assert_eq!(frames.len(), 5);
        for frame in &frames[..4] {
            assert_eq!(frame.msg_type, MessageType::TextLong);
            assert_eq!(frame.payload().len(), SEQ_CAPACITY);
            assert!(!frame.is_done());
        }
        assert_eq!(frames[4].payload().len(), 80);
        assert!(frames[4].is_done());
        let (_, _, sent) = frames[4].counters().unwrap();
        assert_eq!(sent, 1000);
    }

    #[test]
    fn chunk_count_is_ceil_of_size_over_capacity() {
        for size in [231u32, 460, 461, 2300, 2301] {
            let payload = vec![1u8; size as usize];
            let mut seq = SendSequence::new(TransferKind::Serial, size, None).unwrap();
            let frames = send_all(&mut seq, &payload);
            let expected = (size as usize).div_ceil(SEQ_CAPACITY);
            assert_eq!(frames.len(), expected, "size {}", size);
        }
    }

    #[test]
    fn boundary_payload_takes_tiny_path() {
        let payload = vec![2u8; RAW_CAPACITY];
        let mut seq = SendSequence::new(TransferKind::Serial, RAW_CAPACITY as u32, None).unwrap();
        let frames = send_all(&mut seq, &payload);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msg_type, MessageType::CmdTiny);
    }

    #[test]
    fn file_sends_head_then_bodies() {
        let meta = FileMeta {
            filename: "photo.jpg".into(),
            filepath: "/dl".into(),
        };
        let payload = vec![3u8; 500];
        let mut seq = SendSequence::new(TransferKind::File, 500, Some(meta)).unwrap();
        assert_eq!(seq.chunk_capacity(), MessageType::FileHead.capacity());
        let frames = send_all(&mut seq, &payload);
        // 150 head + 230 body + 120 body.
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].msg_type, MessageType::FileHead);
        assert_eq!(frames[0].payload().len(), 150);
        assert_eq!(frames[1].msg_type, MessageType::FileBody);
        assert!(frames[2].is_done());
    }

    #[test]
    fn arg_validation() {
        assert_eq!(
            SendSequence::new(TransferKind::File, 10, None).unwrap_err(),
            FailReason::Arg
        );
        let meta = FileMeta {
            filename: "a".into(),
            filepath: "/".into(),
        };
        assert_eq!(
            SendSequence::new(TransferKind::Text, 10, Some(meta)).unwrap_err(),
            FailReason::Arg
        );
        assert_eq!(
            SendSequence::new(TransferKind::Text, 0, None).unwrap_err(),
            FailReason::Arg
        );
    }

    #[test]
    fn cancel_emits_terminating_frame_and_breaks() {
        let mut seq = SendSequence::new(TransferKind::Text, 1000, None).unwrap();
        let _ = seq.next_frame(&[0u8; 230]);
        let fin = seq.cancel().unwrap();
        assert!(fin.is_done());
        assert_eq!(fin.data_size(), 0);
        assert_eq!(seq.state(), TransferState::Broken);
    }

    #[test]
    fn send_failure_halts() {
        let mut seq = SendSequence::new(TransferKind::Text, 1000, None).unwrap();
        let _ = seq.next_frame(&[0u8; 230]);
        seq.fail_send();
        assert_eq!(seq.state(), TransferState::Failed(FailReason::Send));
        assert!(seq.is_finished());
    }

    // Receive side.

    fn recv_all(recv: &mut RecvSequence, frames: &[Frame]) -> Vec<u8> {
        let mut out = Vec::new();
        for frame in frames {
            match recv.accept(frame) {
                Acceptance::Tiny => out.extend_from_slice(frame.payload()),
                Acceptance::Chunk { offset, .. } => {
                    assert_eq!(offset as usize, out.len());
                    out.extend_from_slice(frame.payload());
                    recv.advance(frame);
                }
                Acceptance::Skip => {}
            }
        }
        out
    }

    #[test]
    fn tiny_frame_completes_immediately() {
        let mut send = SendSequence::new(TransferKind::Text, 5, None).unwrap();
        let frame = stamp(send.next_frame(b"hello"), addr(7));
        let mut recv = RecvSequence::new(TransferKind::Text, Some(1024), 20);
        let out = recv_all(&mut recv, &[frame]);
        assert_eq!(recv.state(), TransferState::Complete);
        assert_eq!(out, b"hello");
        assert_eq!(recv.progress(), (5, 5));
    }

    #[test]
    fn long_sequence_reassembles_exactly() {
        let payload: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let mut send = SendSequence::new(TransferKind::Text, 1000, None).unwrap();
        let frames: Vec<Frame> = send_all(&mut send, &payload)
            .into_iter()
            .map(|f| stamp(f, addr(7)))
            .collect();
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        let out = recv_all(&mut recv, &frames);
        assert_eq!(recv.state(), TransferState::Complete);
        assert_eq!(out, payload);
        assert_eq!(recv.progress(), (1000, 1000));
    }

    #[test]
    fn foreign_handle_and_origin_are_skipped() {
        let payload = vec![5u8; 700];
        let mut send_a = SendSequence::new(TransferKind::Text, 700, None).unwrap();
        let mut send_b = SendSequence::new(TransferKind::Text, 700, None).unwrap();
        let frames_a: Vec<Frame> = send_all(&mut send_a, &payload)
            .into_iter()
            .map(|f| stamp(f, addr(1)))
            .collect();
        let frames_b: Vec<Frame> = send_all(&mut send_b, &payload)
            .into_iter()
            .map(|f| stamp(f, addr(2)))
            .collect();

        // Interleave: A locks the receiver; B's frames must all be skipped.
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        let mut out = Vec::new();
        let mut skipped = 0;
        for pair in frames_a.iter().zip(frames_b.iter()) {
            for frame in [pair.0, pair.1] {
                match recv.accept(frame) {
                    Acceptance::Chunk { .. } => {
                        out.extend_from_slice(frame.payload());
                        recv.advance(frame);
                    }
                    Acceptance::Skip => skipped += 1,
                    Acceptance::Tiny => panic!("unexpected tiny"),
                }
            }
        }
        assert_eq!(recv.state(), TransferState::Complete);
        assert_eq!(out, payload);
        assert!(skipped >= frames_b.len() - 1);
        assert_eq!(recv.peer(), addr(1));
    }

    #[test]
    fn same_origin_foreign_handle_skipped() {
        let payload = vec![6u8; 700];
        let mut send_a = SendSequence::new(TransferKind::Text, 700, None).unwrap();
        let frames_a = send_all(&mut send_a, &payload);
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        assert!(matches!(
            recv.accept(&stamp(frames_a[0].clone(), addr(1))),
            Acceptance::Chunk { first: true, .. }
        ));
        recv.advance(&frames_a[0]);

        // Same peer, different handle: a second concurrent sequence.
        let foreign = stamp(
            Frame::sequence(
                MessageType::TextLong,
                send_a.handle().wrapping_add(1),
                700,
                460,
                vec![9u8; 230],
                false,
            ),
            addr(1),
        );
        assert_eq!(recv.accept(&foreign), Acceptance::Skip);
    }

    #[test]
    fn done_with_short_count_is_packet_lost() {
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        let first = stamp(
            Frame::sequence(MessageType::TextLong, 11, 1000, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&first), Acceptance::Chunk { .. }));
        recv.advance(&first);
        // Sender gave up: DONE with the counter far short of the total.
        let fin = stamp(
            Frame::sequence(MessageType::TextLong, 11, 1000, 230, Vec::new(), true),
            addr(1),
        );
        assert!(matches!(recv.accept(&fin), Acceptance::Chunk { .. }));
        recv.advance(&fin);
        assert_eq!(recv.state(), TransferState::Failed(FailReason::PacketLost));
    }

    #[test]
    fn count_reached_without_done_is_packet_lost() {
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        let first = stamp(
            Frame::sequence(MessageType::TextLong, 12, 230, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&first), Acceptance::Chunk { .. }));
        recv.advance(&first);
        assert_eq!(recv.state(), TransferState::Failed(FailReason::PacketLost));
    }

    #[test]
    fn mid_sequence_first_frame_is_skipped() {
        // bytes_sent != data_size: we missed the start of this sequence.
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        let stray = stamp(
            Frame::sequence(MessageType::TextLong, 13, 1000, 460, vec![0u8; 230], false),
            addr(1),
        );
        assert_eq!(recv.accept(&stray), Acceptance::Skip);
        assert_eq!(recv.state(), TransferState::Waiting);
    }

    #[test]
    fn oversized_total_is_skipped_not_errored() {
        let mut recv = RecvSequence::new(TransferKind::Serial, Some(512), 20);
        let big = stamp(
            Frame::sequence(MessageType::CmdLong, 14, 4096, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert_eq!(recv.accept(&big), Acceptance::Skip);
        // A smaller valid sequence may still follow.
        assert_eq!(recv.state(), TransferState::Waiting);
        let ok = stamp(
            Frame::sequence(MessageType::CmdLong, 15, 400, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&ok), Acceptance::Chunk { .. }));
    }

    #[test]
    fn file_kind_gates_head_then_body() {
        let mut recv = RecvSequence::new(TransferKind::File, None, 20);
        // A body frame while waiting is not a valid start.
        let body = stamp(
            Frame::sequence(MessageType::FileBody, 16, 500, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert_eq!(recv.accept(&body), Acceptance::Skip);

        let head = stamp(
            Frame::file_head(16, 500, 150, "a.bin", "/dl", vec![0u8; 150], false),
            addr(1),
        );
        assert!(matches!(
            recv.accept(&head),
            Acceptance::Chunk { first: true, .. }
        ));
        recv.advance(&head);

        // A second head mid-transfer is likewise ignored.
        assert_eq!(recv.accept(&head), Acceptance::Skip);

        let body2 = stamp(
            Frame::sequence(MessageType::FileBody, 16, 500, 380, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&body2), Acceptance::Chunk { .. }));
    }

    #[test]
    fn timeout_after_stall_limit() {
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 3);
        let first = stamp(
            Frame::sequence(MessageType::TextLong, 17, 1000, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&first), Acceptance::Chunk { .. }));
        recv.advance(&first);
        assert!(!recv.on_empty_poll());
        assert!(!recv.on_empty_poll());
        assert!(recv.on_empty_poll());
        assert_eq!(recv.state(), TransferState::Failed(FailReason::Timeout));
    }

    #[test]
    fn no_timeout_while_waiting_for_first_frame() {
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 2);
        for _ in 0..100 {
            assert!(!recv.on_empty_poll());
        }
        assert_eq!(recv.state(), TransferState::Waiting);
    }

    #[test]
    fn progress_resets_stall_counter() {
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 3);
        let first = stamp(
            Frame::sequence(MessageType::TextLong, 18, 1000, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&first), Acceptance::Chunk { .. }));
        recv.advance(&first);
        assert!(!recv.on_empty_poll());
        assert!(!recv.on_empty_poll());
        let second = stamp(
            Frame::sequence(MessageType::TextLong, 18, 1000, 460, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&second), Acceptance::Chunk { .. }));
        recv.advance(&second);
        assert!(!recv.on_empty_poll());
        assert!(!recv.on_empty_poll());
        assert_eq!(recv.state(), TransferState::InProgress);
    }

    #[test]
    fn cancel_is_broken_never_in_progress() {
        let mut recv = RecvSequence::new(TransferKind::Text, Some(2048), 20);
        let first = stamp(
            Frame::sequence(MessageType::TextLong, 19, 1000, 230, vec![0u8; 230], false),
            addr(1),
        );
        assert!(matches!(recv.accept(&first), Acceptance::Chunk { .. }));
        recv.advance(&first);
        recv.cancel();
        assert_eq!(recv.state(), TransferState::Broken);
        assert!(recv.state().is_terminal());
    }
}
