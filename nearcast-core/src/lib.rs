//! Nearcast share protocol reference implementation.
//! Host-driven: no I/O; the host passes datagrams and poll ticks, and
//! performs the actions the session returns.

pub mod link;
pub mod protocol;
pub mod session;
pub mod sink;
pub mod transfer;
pub mod wire;

pub use link::LinkAddr;
pub use protocol::{MessageType, MAX_FRAME_SIZE, PROTOCOL_VERSION};
pub use session::{OutboundAction, ShareSession};
pub use sink::{FileAppendSink, FileStore, SinkError};
pub use transfer::{
    FailReason, FileMeta, RecvSequence, SendSequence, TransferKind, TransferState,
};
pub use wire::{Frame, FrameBody, FrameDecodeError};
