//! Read and write ports.

use std::collections::VecDeque;

use super::chunk::ChunkId;
use super::heap::PriorityHeap;
use super::packet::PacketId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ReadPortId(pub(crate) u32);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WritePortId(pub(crate) u32);

pub(crate) enum Queue {
    Fifo(VecDeque<PacketId>, usize),
    Priority(PriorityHeap),
}

impl Queue {
    pub fn len(&self) -> usize {
        match self {
            Queue::Fifo(q, _) => q.len(),
            Queue::Priority(h) => h.len(),
        }
    }

    pub fn push(&mut self, id: PacketId, priority: u16, seq: u16, counter: u16) -> bool {
        match self {
            Queue::Fifo(q, capacity) => {
                if q.len() >= *capacity {
                    false
                } else {
                    q.push_back(id);
                    true
                }
            }
            Queue::Priority(h) => h.push(id, priority, seq, counter),
        }
    }

    pub fn pop(&mut self, counter: u16) -> Option<PacketId> {
        match self {
            Queue::Fifo(q, _) => q.pop_front(),
            Queue::Priority(h) => h.pop(counter),
        }
    }

    pub fn drain(&mut self) -> Vec<PacketId> {
        match self {
            Queue::Fifo(q, _) => q.drain(..).collect(),
            Queue::Priority(h) => {
                let mut out = Vec::with_capacity(h.len());
                while let Some(id) = h.pop(0) {
                    out.push(id);
                }
                out
            }
        }
    }
}

/// Read cursor into the packet currently dequeued for consumption.
pub(crate) struct Cursor {
    pub packet: PacketId,
    pub chunk: Option<ChunkId>,
    pub offset: usize,
    pub remaining: usize,
}

pub(crate) struct ReadPortState {
    pub queue: Queue,
    pub cursor: Option<Cursor>,
    pub enabled: bool,
    pub timeout_millis: u64,
    pub last_activity_millis: u64,
}

pub(crate) struct WritePortState {
    pub packet: Option<PacketId>,
    pub written: usize,
    pub max_packet: usize,
    pub overflowed: bool,
    pub timeout_millis: u64,
    pub last_activity_millis: u64,
}
