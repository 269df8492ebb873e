//! Nearcast wire protocol: message type tags, layout constants, flags.

/// 5-byte protocol signature at the start of every frame. Frames without it
/// are foreign traffic and are dropped without comment.
pub const MAGIC: [u8; 5] = *b"NCAST";

/// Current protocol version. Bumped on breaking wire changes.
pub const PROTOCOL_VERSION: u8 = 0;

/// Maximum size of one frame on the wire. Chosen to fit a single datagram on
/// short-range links whose payload tops out around 250 bytes.
pub const MAX_FRAME_SIZE: usize = 250;

/// Fixed header: magic(5) + version(1) + type(1) + flags(1) + data_size(2).
pub const HEADER_SIZE: usize = 10;

/// Capacity of the raw body used by NOP/PING/PONG and the TINY variants.
pub const RAW_CAPACITY: usize = MAX_FRAME_SIZE - HEADER_SIZE;

/// Sequence block prefix: handle(2) + total_bytes(4) + bytes_sent(4).
pub const SEQ_PREFIX_SIZE: usize = 10;

/// Payload capacity of a sequence-block frame (FILE_BODY/CMD_LONG/TEXT_LONG).
pub const SEQ_CAPACITY: usize = RAW_CAPACITY - SEQ_PREFIX_SIZE;

/// Fixed filename field width in a file-head block.
pub const FILENAME_SIZE: usize = 30;

/// Fixed filepath field width in a file-head block.
pub const FILEPATH_SIZE: usize = 50;

/// Payload capacity of the file-head frame, after its metadata fields.
pub const FILE_HEAD_CAPACITY: usize = SEQ_CAPACITY - FILENAME_SIZE - FILEPATH_SIZE;

/// Header flag bit: final frame of a sequence.
pub const FLAG_DONE: u8 = 0x01;

/// Wire message type tag.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum MessageType {
    /// Does nothing.
    Nop = 0,
    /// Device search request.
    Ping = 1,
    /// Device search response.
    Pong = 2,
    /// File transfer, first frame (carries filename/filepath).
    FileHead = 3,
    /// File transfer, subsequent frames.
    FileBody = 4,
    /// Command that fits a single frame.
    CmdTiny = 5,
    /// Command sequence spanning multiple frames.
    CmdLong = 6,
    /// Text that fits a single frame.
    TextTiny = 7,
    /// Text spanning multiple frames.
    TextLong = 8,
}

impl MessageType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => MessageType::Nop,
            1 => MessageType::Ping,
            2 => MessageType::Pong,
            3 => MessageType::FileHead,
            4 => MessageType::FileBody,
            5 => MessageType::CmdTiny,
            6 => MessageType::CmdLong,
            7 => MessageType::TextTiny,
            8 => MessageType::TextLong,
            _ => return None,
        })
    }

    /// Types carrying a sequence block (running counters + handle).
    pub fn is_sequenced(&self) -> bool {
        matches!(
            self,
            MessageType::FileHead
                | MessageType::FileBody
                | MessageType::CmdLong
                | MessageType::TextLong
        )
    }

    /// Useful payload capacity for this type.
    pub fn capacity(&self) -> usize {
        match self {
            MessageType::FileHead => FILE_HEAD_CAPACITY,
            MessageType::FileBody | MessageType::CmdLong | MessageType::TextLong => SEQ_CAPACITY,
            _ => RAW_CAPACITY,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Nop => "NOP",
            MessageType::Ping => "PING",
            MessageType::Pong => "PONG",
            MessageType::FileHead => "FILE_HEAD",
            MessageType::FileBody => "FILE_BODY",
            MessageType::CmdTiny => "CMD_TINY",
            MessageType::CmdLong => "CMD_LONG",
            MessageType::TextTiny => "TEXT_TINY",
            MessageType::TextLong => "TEXT_LONG",
        }
    }
}
