//! Link-layer addressing: 6-byte peer addresses, broadcast, hex display.

use std::fmt;

/// Link-layer address of a peer (6 bytes). The transport attaches the sender's
/// address to received frames; it is never carried on the wire itself.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct LinkAddr([u8; 6]);

impl LinkAddr {
    /// All-ones broadcast address.
    pub const BROADCAST: LinkAddr = LinkAddr([0xFF; 6]);

    /// Zero address, used before a transfer has locked onto a peer.
    pub const UNSET: LinkAddr = LinkAddr([0; 6]);

    pub const fn from_bytes(bytes: [u8; 6]) -> Self {
        LinkAddr(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Parse from 12 hex digits, e.g. "A0B1C2D3E4F5". Case-insensitive.
    pub fn parse_hex(s: &str) -> Option<Self> {
        if s.len() != 12 || !s.is_ascii() {
            return None;
        }
        let mut out = [0u8; 6];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(LinkAddr(out))
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
