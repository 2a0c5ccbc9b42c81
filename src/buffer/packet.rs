//! Packet headers: a chunk list plus per-packet bookkeeping fields.

use super::chunk::ChunkId;

/// Number of opaque per-packet metadata words available to plug-ins.
/// Sized for what the switch plug-in chain in this crate actually
/// stores: ingress port index, VLAN id, and priority.
pub const META_WORDS: usize = 4;

/// An index into `MultiBuffer`'s packet-header arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct PacketId(pub(crate) u32);

#[derive(Clone)]
pub(crate) struct PacketHeader {
    pub head: Option<ChunkId>,
    pub tail: Option<ChunkId>,
    pub len: usize,
    pub refct: u32,
    pub priority: u16,
    /// Monotone counter assigned at `enqueue()`, used as the age
    /// tie-breaker in the priority-heap read-port variant.
    pub seq: u16,
    pub meta: [u32; META_WORDS],
    /// Link used only while this slot sits on the header free list.
    pub free_next: Option<PacketId>,
}

impl PacketHeader {
    pub(crate) fn fresh(first_chunk: ChunkId) -> Self {
        Self {
            head: Some(first_chunk),
            tail: Some(first_chunk),
            len: 0,
            refct: 1,
            priority: 0,
            seq: 0,
            meta: [0; META_WORDS],
            free_next: None,
        }
    }
}
