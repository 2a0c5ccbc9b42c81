//! Chunks: the fixed-size unit of allocation backing every packet.

/// Payload bytes carried by one chunk. 60 bytes is sized so
/// `Ethernet + VLAN + IPv4 + UDP` headers (42 bytes) plus a few payload
/// bytes fit in the first chunk of a typical frame.
pub const CHUNK_PAYLOAD: usize = 60;

/// An index into `MultiBuffer`'s chunk arena. `u32` keeps `Packet`
/// small; a buffer with more than 4 billion chunks is not a realistic
/// target for this crate.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ChunkId(pub(crate) u32);

#[derive(Clone)]
pub(crate) struct ChunkSlot {
    pub data: [u8; CHUNK_PAYLOAD],
    /// Bytes of `data` currently holding valid packet payload.
    pub used: usize,
    /// Next chunk in this packet's list, or the next free chunk when this
    /// slot is on the free list.
    pub next: Option<ChunkId>,
}

impl ChunkSlot {
    pub(crate) fn empty() -> Self {
        Self {
            data: [0u8; CHUNK_PAYLOAD],
            used: 0,
            next: None,
        }
    }
}
