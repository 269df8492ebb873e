//! Framing: fixed packed little-endian layout, type-tagged body union.
//!
//! Every frame is `[magic:5][version:1][type:1][flags:1][data_size:2]` followed
//! by a body whose shape depends on the type tag. The whole frame fits one
//! link-layer datagram (≤250 bytes). The sender's link address is attached to
//! decoded frames by the receiver; it is not part of the wire format.

use crate::link::LinkAddr;
use crate::protocol::{
    MessageType, FILENAME_SIZE, FILEPATH_SIZE, FLAG_DONE, HEADER_SIZE, MAGIC, PROTOCOL_VERSION,
    SEQ_PREFIX_SIZE,
};

/// Running counters carried by multi-frame sequences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceBlock {
    /// Transfer-scoped random identifier; the receiver locks onto the first one seen.
    pub handle: u16,
    /// Declared total size of the sequence.
    pub total_bytes: u32,
    /// Sender's running counter after this frame's payload.
    pub bytes_sent: u32,
    pub data: Vec<u8>,
}

/// First frame of a file transfer: sequence counters plus file metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeadBlock {
    pub handle: u16,
    pub total_bytes: u32,
    pub bytes_sent: u32,
    pub filename: String,
    pub filepath: String,
    pub data: Vec<u8>,
}

/// Frame body, one variant per layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    /// NOP/PING/PONG and the TINY text/command variants.
    Raw(Vec<u8>),
    /// FILE_BODY, CMD_LONG, TEXT_LONG.
    Sequence(SequenceBlock),
    /// FILE_HEAD only.
    FileHead(FileHeadBlock),
}

/// A decoded or to-be-encoded wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub msg_type: MessageType,
    pub flags: u8,
    pub body: FrameBody,
    /// Link address the frame arrived from. `UNSET` on outbound frames.
    pub origin: LinkAddr,
}

impl Frame {
    pub fn nop() -> Self {
        Frame {
            msg_type: MessageType::Nop,
            flags: 0,
            body: FrameBody::Raw(Vec::new()),
            origin: LinkAddr::UNSET,
        }
    }

    pub fn ping() -> Self {
        Frame {
            msg_type: MessageType::Ping,
            flags: 0,
            body: FrameBody::Raw(Vec::new()),
            origin: LinkAddr::UNSET,
        }
    }

    pub fn pong() -> Self {
        Frame {
            msg_type: MessageType::Pong,
            flags: 0,
            body: FrameBody::Raw(Vec::new()),
            origin: LinkAddr::UNSET,
        }
    }

    /// Single-frame text or command message. Oversized payloads are truncated
    /// to the raw body capacity, not rejected; LONG variants fragment instead.
    pub fn tiny(msg_type: MessageType, text: &str) -> Self {
        debug_assert!(matches!(
            msg_type,
            MessageType::CmdTiny | MessageType::TextTiny
        ));
        let cap = msg_type.capacity();
        let mut data = text.as_bytes().to_vec();
        data.truncate(cap);
        Frame {
            msg_type,
            flags: FLAG_DONE,
            body: FrameBody::Raw(data),
            origin: LinkAddr::UNSET,
        }
    }

    /// Sequence-block frame (FILE_BODY/CMD_LONG/TEXT_LONG). `data` is clamped
    /// to the type's capacity.
    pub fn sequence(
        msg_type: MessageType,
        handle: u16,
        total_bytes: u32,
        bytes_sent: u32,
        mut data: Vec<u8>,
        done: bool,
    ) -> Self {
        debug_assert!(msg_type.is_sequenced() && msg_type != MessageType::FileHead);
        data.truncate(msg_type.capacity());
        Frame {
            msg_type,
            flags: if done { FLAG_DONE } else { 0 },
            body: FrameBody::Sequence(SequenceBlock {
                handle,
                total_bytes,
                bytes_sent,
                data,
            }),
            origin: LinkAddr::UNSET,
        }
    }

    /// First frame of a file transfer. Filename/filepath are clamped to their
    /// fixed field widths, `data` to the file-head capacity.
    pub fn file_head(
        handle: u16,
        total_bytes: u32,
        bytes_sent: u32,
        filename: &str,
        filepath: &str,
        mut data: Vec<u8>,
        done: bool,
    ) -> Self {
        data.truncate(MessageType::FileHead.capacity());
        Frame {
            msg_type: MessageType::FileHead,
            flags: if done { FLAG_DONE } else { 0 },
            body: FrameBody::FileHead(FileHeadBlock {
                handle,
                total_bytes,
                bytes_sent,
                filename: clamp_str(filename, FILENAME_SIZE),
                filepath: clamp_str(filepath, FILEPATH_SIZE),
                data,
            }),
            origin: LinkAddr::UNSET,
        }
    }

    /// Useful payload of this frame, whatever the body variant.
    pub fn payload(&self) -> &[u8] {
        match &self.body {
            FrameBody::Raw(data) => data,
            FrameBody::Sequence(seq) => &seq.data,
            FrameBody::FileHead(fhb) => &fhb.data,
        }
    }

    /// Declared useful payload length.
    pub fn data_size(&self) -> u16 {
        self.payload().len() as u16
    }

    pub fn is_done(&self) -> bool {
        self.flags & FLAG_DONE != 0
    }

    /// Sequence counters `(handle, total_bytes, bytes_sent)` if this frame
    /// carries them.
    pub fn counters(&self) -> Option<(u16, u32, u32)> {
        match &self.body {
            FrameBody::Raw(_) => None,
            FrameBody::Sequence(seq) => Some((seq.handle, seq.total_bytes, seq.bytes_sent)),
            FrameBody::FileHead(fhb) => Some((fhb.handle, fhb.total_bytes, fhb.bytes_sent)),
        }
    }

    /// Encode into wire bytes. Always ≤ `MAX_FRAME_SIZE` because every
    /// constructor clamps its payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + SEQ_PREFIX_SIZE + self.payload().len());
        out.extend_from_slice(&MAGIC);
        out.push(PROTOCOL_VERSION);
        out.push(self.msg_type as u8);
        out.push(self.flags);
        out.extend_from_slice(&self.data_size().to_le_bytes());
        match &self.body {
            FrameBody::Raw(data) => out.extend_from_slice(data),
            FrameBody::Sequence(seq) => {
                out.extend_from_slice(&seq.handle.to_le_bytes());
                out.extend_from_slice(&seq.total_bytes.to_le_bytes());
                out.extend_from_slice(&seq.bytes_sent.to_le_bytes());
                out.extend_from_slice(&seq.data);
            }
            FrameBody::FileHead(fhb) => {
                out.extend_from_slice(&fhb.handle.to_le_bytes());
                out.extend_from_slice(&fhb.total_bytes.to_le_bytes());
                out.extend_from_slice(&fhb.bytes_sent.to_le_bytes());
                out.extend_from_slice(&fixed_str(&fhb.filename, FILENAME_SIZE));
                out.extend_from_slice(&fixed_str(&fhb.filepath, FILEPATH_SIZE));
                out.extend_from_slice(&fhb.data);
            }
        }
        out
    }

    /// Decode a received datagram. Short buffers, wrong magic, and unknown
    /// type tags are rejected; callers treat every rejection as foreign noise
    /// and drop it silently. The declared data_size of a received frame is
    /// never trusted: the payload is clamped to what the buffer actually
    /// holds and to the type's capacity.
    pub fn decode(bytes: &[u8], origin: LinkAddr) -> Result<Frame, FrameDecodeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameDecodeError::TooShort);
        }
        if bytes[..5] != MAGIC {
            return Err(FrameDecodeError::BadMagic);
        }
        let msg_type =
            MessageType::from_u8(bytes[6]).ok_or(FrameDecodeError::UnknownType(bytes[6]))?;
        let flags = bytes[7];
        let declared = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let body = &bytes[HEADER_SIZE..];

        let body = match msg_type {
            MessageType::FileHead => {
                let meta_len = SEQ_PREFIX_SIZE + FILENAME_SIZE + FILEPATH_SIZE;
                if body.len() < meta_len {
                    return Err(FrameDecodeError::TooShort);
                }
                let data_len = declared.min(msg_type.capacity()).min(body.len() - meta_len);
                FrameBody::FileHead(FileHeadBlock {
                    handle: u16::from_le_bytes([body[0], body[1]]),
                    total_bytes: u32::from_le_bytes([body[2], body[3], body[4], body[5]]),
                    bytes_sent: u32::from_le_bytes([body[6], body[7], body[8], body[9]]),
                    filename: read_fixed_str(&body[SEQ_PREFIX_SIZE..][..FILENAME_SIZE]),
                    filepath: read_fixed_str(
                        &body[SEQ_PREFIX_SIZE + FILENAME_SIZE..][..FILEPATH_SIZE],
                    ),
                    data: body[meta_len..meta_len + data_len].to_vec(),
                })
            }
            t if t.is_sequenced() => {
                if body.len() < SEQ_PREFIX_SIZE {
                    return Err(FrameDecodeError::TooShort);
                }
                let data_len = declared
                    .min(msg_type.capacity())
                    .min(body.len() - SEQ_PREFIX_SIZE);
                FrameBody::Sequence(SequenceBlock {
                    handle: u16::from_le_bytes([body[0], body[1]]),
                    total_bytes: u32::from_le_bytes([body[2], body[3], body[4], body[5]]),
                    bytes_sent: u32::from_le_bytes([body[6], body[7], body[8], body[9]]),
                    data: body[SEQ_PREFIX_SIZE..SEQ_PREFIX_SIZE + data_len].to_vec(),
                })
            }
            _ => {
                let data_len = declared.min(msg_type.capacity()).min(body.len());
                FrameBody::Raw(body[..data_len].to_vec())
            }
        };

        Ok(Frame {
            msg_type,
            flags,
            body,
            origin,
        })
    }
}

/// Error decoding a datagram into a frame. Never surfaced past the inbound
/// classifier: a frame that fails to decode is foreign traffic.
#[derive(Debug, thiserror::Error)]
pub enum FrameDecodeError {
    #[error("buffer shorter than frame header")]
    TooShort,
    #[error("bad protocol signature")]
    BadMagic,
    #[error("unknown message type tag {0}")]
    UnknownType(u8),
}

fn clamp_str(s: &str, width: usize) -> String {
    let mut end = s.len().min(width);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

fn fixed_str(s: &str, width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

fn read_fixed_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
