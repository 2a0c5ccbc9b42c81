//! The chunked multi-source/multi-sink packet buffer.
//!
//! `MultiBuffer` owns every chunk and packet header; read and write ports
//! are handles (`ReadPortId`/`WritePortId`) into arrays it owns, in the
//! same arena-plus-index style used elsewhere in this crate for the MAC
//! table and VLAN membership. One physical copy of a frame's
//! payload is shared by every reader through a reference count set once,
//! at delivery time, rather than incremented by each reader — see
//! [`MultiBuffer::poll_demand`].

mod chunk;
mod heap;
mod packet;
mod port;

pub use chunk::{ChunkId, CHUNK_PAYLOAD};
pub use packet::{PacketId, META_WORDS};
pub use port::{ReadPortId, WritePortId};

use std::collections::VecDeque;

use crate::poll::AtomicLock;
use crate::{Error, Result};

use chunk::ChunkSlot;
use packet::PacketHeader;
use port::{Cursor, Queue, ReadPortState, WritePortState};

/// Shared chunked packet pool. One instance typically backs one switch
/// core; nothing about it requires global uniqueness.
pub struct MultiBuffer {
    chunks: Vec<ChunkSlot>,
    chunk_free_head: Option<ChunkId>,
    free_chunk_count: usize,
    capacity: usize,

    headers: Vec<PacketHeader>,
    header_free_head: Option<PacketId>,
    live_header_count: usize,

    deliver_queue: VecDeque<PacketId>,
    packet_counter: u16,

    read_ports: Vec<ReadPortState>,
    write_ports: Vec<WritePortState>,

    lock: AtomicLock,

    /// Overridable delivery hook. When `None`, the default behavior
    /// offers the packet to every attached read port.
    deliver_hook: Option<Box<dyn FnMut(&mut MultiBuffer, PacketId) -> usize>>,
}

impl MultiBuffer {
    /// Build a pool over `capacity` chunks (i.e. `capacity * CHUNK_PAYLOAD`
    /// bytes). The source subdivides an externally-supplied byte array;
    /// here the array is simply the chunk arena itself.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "MultiBuffer requires at least one chunk");
        let mut chunks = Vec::with_capacity(capacity);
        for i in 0..capacity {
            let next = if i + 1 < capacity {
                Some(ChunkId((i + 1) as u32))
            } else {
                None
            };
            chunks.push(ChunkSlot {
                next,
                ..ChunkSlot::empty()
            });
        }
        Self {
            chunks,
            chunk_free_head: Some(ChunkId(0)),
            free_chunk_count: capacity,
            capacity,
            headers: Vec::new(),
            header_free_head: None,
            live_header_count: 0,
            deliver_queue: VecDeque::new(),
            packet_counter: 0,
            read_ports: Vec::new(),
            write_ports: Vec::new(),
            lock: AtomicLock::new(),
            deliver_hook: None,
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.capacity * CHUNK_PAYLOAD
    }

    pub fn free_bytes(&self) -> usize {
        self.free_chunk_count * CHUNK_PAYLOAD
    }

    pub fn packet_count(&self) -> usize {
        self.live_header_count
    }

    /// Install a custom delivery hook, overriding the default fan-out.
    pub fn set_deliver_hook(
        &mut self,
        hook: impl FnMut(&mut MultiBuffer, PacketId) -> usize + 'static,
    ) {
        self.deliver_hook = Some(Box::new(hook));
    }

    // ---- chunk / packet allocation --------------------------------------

    pub fn new_chunk(&mut self) -> Option<ChunkId> {
        self.lock.with_lock(|| self.pop_free_chunk())
    }

    fn pop_free_chunk(&mut self) -> Option<ChunkId> {
        let id = self.chunk_free_head?;
        self.chunk_free_head = self.chunks[id.0 as usize].next;
        self.chunks[id.0 as usize] = ChunkSlot::empty();
        self.free_chunk_count -= 1;
        Some(id)
    }

    fn push_free_chunk(&mut self, id: ChunkId) {
        self.chunks[id.0 as usize].next = self.chunk_free_head;
        self.chunk_free_head = Some(id);
        self.free_chunk_count += 1;
    }

    /// Allocate a packet header with one pre-allocated body chunk. Returns
    /// `None` on allocation failure, which the caller should treat as a
 /// clean drop of whatever it was building.
    pub fn new_packet(&mut self) -> Option<PacketId> {
        let first_chunk = self.new_chunk()?;
        Some(self.alloc_header(PacketHeader::fresh(first_chunk)))
    }

    fn alloc_header(&mut self, header: PacketHeader) -> PacketId {
        self.live_header_count += 1;
        if let Some(id) = self.header_free_head {
            self.header_free_head = self.headers[id.0 as usize].free_next;
            self.headers[id.0 as usize] = header;
            id
        } else {
            let id = PacketId(self.headers.len() as u32);
            self.headers.push(header);
            id
        }
    }

    /// Splice `p`'s chunks back onto the free list and return the header
    /// slot to the header free list.
    pub fn free_packet(&mut self, id: PacketId) {
        self.lock.with_lock(|| {
            let (mut cursor, tail) = {
                let h = &self.headers[id.0 as usize];
                (h.head, h.tail)
            };
            // Splice the whole chunk chain onto the free list at once
            // instead of one push per chunk.
            if let (Some(_head), Some(tail)) = (cursor, tail) {
                self.chunks[tail.0 as usize].next = self.chunk_free_head;
                self.chunk_free_head = cursor;
                let mut n = 0;
                while let Some(c) = cursor {
                    n += 1;
                    cursor = if c == tail { None } else { self.chunks[c.0 as usize].next };
                }
                self.free_chunk_count += n;
            }
            let h = &mut self.headers[id.0 as usize];
            *h = PacketHeader::fresh(ChunkId(0));
            h.refct = 0;
            h.free_next = self.header_free_head;
            self.header_free_head = Some(id);
            self.live_header_count -= 1;
        });
    }

    /// Total bytes `id`'s already-allocated chunk chain can hold, whether
    /// written yet or not. A length can grow into this slack without
    /// allocating another chunk; past it there's nowhere for the extra
    /// bytes to live.
    fn packet_capacity(&self, id: PacketId) -> usize {
        let h = &self.headers[id.0 as usize];
        let (mut cursor, tail) = (h.head, h.tail);
        let mut count = 0usize;
        while let Some(c) = cursor {
            count += 1;
            cursor = if Some(c) == tail { None } else { self.chunks[c.0 as usize].next };
        }
        count * CHUNK_PAYLOAD
    }

    /// Grow or shrink `id`'s recorded length by `delta` bytes, in place.
    /// Growing is only honored up to the packet's already-allocated
    /// chunk capacity — there's no facility here to allocate a fresh
    /// chunk or to move payload bytes around, so a plug-in that inserts a
    /// header still has to write those bytes into the existing chunk
    /// span itself; this only updates the bookkeeping length.
    pub(crate) fn adjust_packet_len(&mut self, id: PacketId, delta: isize) -> Result<()> {
        let h = &self.headers[id.0 as usize];
        let new_len = if delta >= 0 {
            h.len.checked_add(delta as usize)
        } else {
            h.len.checked_sub((-delta) as usize)
        };
        let new_len = new_len.ok_or(Error::ResourceExhausted("packet length adjustment underflowed"))?;
        if new_len > self.packet_capacity(id) {
            return Err(Error::ResourceExhausted("header growth exceeds the packet's allocated chunk span"));
        }
        self.headers[id.0 as usize].len = new_len;
        Ok(())
    }

    pub fn packet_len(&self, id: PacketId) -> usize {
        self.headers[id.0 as usize].len
    }

    pub fn packet_priority(&self, id: PacketId) -> u16 {
        self.headers[id.0 as usize].priority
    }

    pub fn set_packet_priority(&mut self, id: PacketId, priority: u16) {
        self.headers[id.0 as usize].priority = priority;
    }

    pub fn packet_meta(&self, id: PacketId, slot: usize) -> u32 {
        self.headers[id.0 as usize].meta[slot]
    }

    pub fn set_packet_meta(&mut self, id: PacketId, slot: usize, value: u32) {
        self.headers[id.0 as usize].meta[slot] = value;
    }

    // ---- write side -------------------------------------------------------

    pub fn attach_write_port(&mut self, max_packet: usize, timeout_millis: u64) -> WritePortId {
        self.write_ports.push(WritePortState {
            packet: None,
            written: 0,
            max_packet,
            overflowed: false,
            timeout_millis,
            last_activity_millis: 0,
        });
        WritePortId((self.write_ports.len() - 1) as u32)
    }

    fn wport(&mut self, port: WritePortId) -> &mut WritePortState {
        &mut self.write_ports[port.0 as usize]
    }

    /// Begin assembling a new packet on `port`. Returns `false` on
    /// allocation failure, a clean drop at the source.
    pub fn write_open(&mut self, port: WritePortId, now_millis: u64) -> bool {
        let Some(pid) = self.new_packet() else {
            return false;
        };
        let w = self.wport(port);
        w.packet = Some(pid);
        w.written = 0;
        w.overflowed = false;
        w.last_activity_millis = now_millis;
        true
    }

    /// Append `data` to the in-progress packet on `port`. Returns the
    /// number of bytes actually appended (always `data.len()` on success,
    /// `0` if the writer is overflowed/closed/allocation-starved — those
    /// cases silently discard).
    pub fn write_bytes(&mut self, port: WritePortId, data: &[u8], now_millis: u64) -> usize {
        let (pid, max_packet, overflowed, written) = {
            let w = &self.write_ports[port.0 as usize];
            (w.packet, w.max_packet, w.overflowed, w.written)
        };
        let Some(pid) = pid else { return 0 };
        if overflowed {
            return 0;
        }
        if written + data.len() > max_packet {
            self.write_ports[port.0 as usize].overflowed = true;
            self.free_packet(pid);
            self.write_ports[port.0 as usize].packet = None;
            self.write_ports[port.0 as usize].written = 0;
            return 0;
        }
        if !self.append_bytes(pid, data) {
            // Ran out of chunks mid-write: abort cleanly.
            self.free_packet(pid);
            let w = self.wport(port);
            w.packet = None;
            w.written = 0;
            w.overflowed = false;
            return 0;
        }
        let w = self.wport(port);
        w.written += data.len();
        w.last_activity_millis = now_millis;
        data.len()
    }

    fn append_bytes(&mut self, pid: PacketId, mut data: &[u8]) -> bool {
        while !data.is_empty() {
            let tail = self.headers[pid.0 as usize].tail.unwrap();
            let used = self.chunks[tail.0 as usize].used;
            let space = CHUNK_PAYLOAD - used;
            if space == 0 {
                let Some(next) = self.new_chunk() else {
                    return false;
                };
                self.chunks[tail.0 as usize].next = Some(next);
                self.headers[pid.0 as usize].tail = Some(next);
                continue;
            }
            let take = space.min(data.len());
            self.chunks[tail.0 as usize].data[used..used + take].copy_from_slice(&data[..take]);
            self.chunks[tail.0 as usize].used += take;
            self.headers[pid.0 as usize].len += take;
            data = &data[take..];
        }
        true
    }

    /// Promote the in-progress packet to the deferred delivery queue.
    /// Returns `None` if nothing was in progress or the writer had
    /// already overflowed.
    pub fn write_finalize(&mut self, port: WritePortId) -> Option<PacketId> {
        let pid = self.write_finalize_common(port)?;
        self.enqueue(pid);
        Some(pid)
    }

    /// Like [`MultiBuffer::write_finalize`], but stamps the sequence
    /// number without queuing the packet for deferred delivery. For a
    /// caller that computes its own fan-out and calls
    /// [`MultiBuffer::deliver_to`] directly — never draining
    /// `deliver_queue` through [`MultiBuffer::poll_demand`] — so the
    /// queue doesn't accumulate already-delivered ids forever.
    pub fn write_finalize_direct(&mut self, port: WritePortId) -> Option<PacketId> {
        let pid = self.write_finalize_common(port)?;
        self.stamp_seq(pid);
        Some(pid)
    }

    fn write_finalize_common(&mut self, port: WritePortId) -> Option<PacketId> {
        let w = self.wport(port);
        let pid = w.packet.take()?;
        w.written = 0;
        let overflowed = w.overflowed;
        w.overflowed = false;
        if overflowed {
            self.free_packet(pid);
            return None;
        }
        Some(pid)
    }

    pub fn write_abort(&mut self, port: WritePortId) {
        let w = self.wport(port);
        let pid = w.packet.take();
        w.written = 0;
        w.overflowed = false;
        if let Some(pid) = pid {
            self.free_packet(pid);
        }
    }

    /// Abort any write port whose partial packet has been idle longer
 /// than its configured timeout.
    pub fn write_watchdog_tick(&mut self, now_millis: u64) {
        for i in 0..self.write_ports.len() {
            let (has_packet, idle) = {
                let w = &self.write_ports[i];
                (
                    w.packet.is_some(),
                    now_millis.saturating_sub(w.last_activity_millis),
                )
            };
            if has_packet && idle >= self.write_ports[i].timeout_millis {
                self.write_abort(WritePortId(i as u32));
            }
        }
    }

    // ---- delivery ----------------------------------------------------------

    /// Stamp the next sequence number onto a finished packet, without
    /// queuing it for deferred delivery. Used by callers — a switch core
    /// computing its own fan-out, for instance — that call
    /// [`MultiBuffer::deliver_to`] directly instead of draining
    /// `deliver_queue` through [`MultiBuffer::poll_demand`].
    fn stamp_seq(&mut self, id: PacketId) {
        self.lock.with_lock(|| {
            self.headers[id.0 as usize].seq = self.packet_counter;
            self.packet_counter = self.packet_counter.wrapping_add(1);
        });
    }

    /// Push a finished packet onto the deferred-delivery queue and tag it
    /// with the next sequence number.
    pub fn enqueue(&mut self, id: PacketId) {
        self.stamp_seq(id);
        self.lock.with_lock(|| self.deliver_queue.push_back(id));
    }

    /// Drain the deferred-delivery queue, calling the delivery hook (or
    /// the default fan-out) for each packet.
    pub fn poll_demand(&mut self) {
        let drained: Vec<PacketId> = self.lock.with_lock(|| self.deliver_queue.drain(..).collect());
        for pid in drained {
            let n = if let Some(mut hook) = self.deliver_hook.take() {
                let n = hook(self, pid);
                self.deliver_hook = Some(hook);
                n
            } else {
                self.default_deliver(pid)
            };
            if n == 0 {
                self.free_packet(pid);
            } else {
                self.headers[pid.0 as usize].refct = n.max(1) as u32;
            }
        }
    }

    /// Offer `pid` to every attached, enabled read port; returns the
    /// number of ports that accepted it.
    pub fn default_deliver(&mut self, pid: PacketId) -> usize {
        let all: Vec<ReadPortId> = (0..self.read_ports.len() as u32).map(ReadPortId).collect();
        self.deliver_to(pid, &all)
    }

    /// Offer `pid` to exactly the listed (enabled) read ports, bumping its
    /// reference count by the number that accept it. Callers that compute
    /// their own fan-out set — a switch core intersecting MAC-table,
    /// promiscuous, and VLAN masks, for instance — use this directly
    /// instead of the generic `deliver`/`poll_demand` pipeline.
    pub fn deliver_to(&mut self, pid: PacketId, ports: &[ReadPortId]) -> usize {
        let priority = self.headers[pid.0 as usize].priority;
        let seq = self.headers[pid.0 as usize].seq;
        let counter = self.packet_counter;
        let mut accepted = 0;
        for port in ports {
            let i = port.0 as usize;
            if !self.read_ports[i].enabled {
                continue;
            }
            if self.read_ports[i].queue.push(pid, priority, seq, counter) {
                accepted += 1;
            }
        }
        if accepted > 0 {
            self.headers[pid.0 as usize].refct = accepted as u32;
        }
        accepted
    }

    // ---- read side ----------------------------------------------------------

    pub fn attach_read_port(&mut self, priority: bool, capacity: usize, timeout_millis: u64) -> ReadPortId {
        let queue = if priority {
            Queue::Priority(heap::PriorityHeap::new(capacity))
        } else {
            Queue::Fifo(VecDeque::with_capacity(capacity), capacity)
        };
        self.read_ports.push(ReadPortState {
            queue,
            cursor: None,
            enabled: true,
            timeout_millis,
            last_activity_millis: 0,
        });
        ReadPortId((self.read_ports.len() - 1) as u32)
    }

    pub fn set_read_enabled(&mut self, port: ReadPortId, enabled: bool) {
        self.read_ports[port.0 as usize].enabled = enabled;
    }

    pub fn read_queue_len(&self, port: ReadPortId) -> usize {
        self.read_ports[port.0 as usize].queue.len()
    }

    /// Load the next queued packet into the port's cursor, if nothing is
    /// currently loaded. Returns whether a packet is now loaded.
    pub fn read_load_next(&mut self, port: ReadPortId, now_millis: u64) -> bool {
        let counter = self.packet_counter;
        let rp = &mut self.read_ports[port.0 as usize];
        rp.last_activity_millis = now_millis;
        if rp.cursor.is_some() {
            return true;
        }
        let Some(pid) = rp.queue.pop(counter) else {
            return false;
        };
        let len = self.headers[pid.0 as usize].len;
        let head = self.headers[pid.0 as usize].head;
        self.read_ports[port.0 as usize].cursor = Some(Cursor {
            packet: pid,
            chunk: head,
            offset: 0,
            remaining: len,
        });
        true
    }

    pub fn read_current_packet(&self, port: ReadPortId) -> Option<PacketId> {
        self.read_ports[port.0 as usize].cursor.as_ref().map(|c| c.packet)
    }

    /// Copy up to `buf.len()` bytes from the currently loaded packet into
    /// `buf`, advancing the cursor. Returns the number of bytes copied.
    pub fn read_bytes(&mut self, port: ReadPortId, buf: &mut [u8], now_millis: u64) -> usize {
        let mut copied = 0;
        loop {
            if copied >= buf.len() {
                break;
            }
            let rp = &mut self.read_ports[port.0 as usize];
            let Some(cursor) = rp.cursor.as_mut() else { break };
            if cursor.remaining == 0 {
                break;
            }
            let Some(chunk_id) = cursor.chunk else { break };
            let chunk = &self.chunks[chunk_id.0 as usize];
            let available = chunk.used - cursor.offset;
            let take = available.min(buf.len() - copied).min(cursor.remaining);
            buf[copied..copied + take].copy_from_slice(&chunk.data[cursor.offset..cursor.offset + take]);
            copied += take;
            cursor.offset += take;
            cursor.remaining -= take;
            if cursor.offset >= chunk.used {
                cursor.chunk = chunk.next;
                cursor.offset = 0;
            }
        }
        if copied > 0 {
            self.read_ports[port.0 as usize].last_activity_millis = now_millis;
        }
        copied
    }

    pub fn read_remaining(&self, port: ReadPortId) -> usize {
        self.read_ports[port.0 as usize]
            .cursor
            .as_ref()
            .map(|c| c.remaining)
            .unwrap_or(0)
    }

    /// Release the currently loaded packet: decrement its reference
    /// count, freeing the chunks if it reaches zero, then clear the
    /// cursor so the next `read_load_next` pulls a fresh packet.
    pub fn read_finalize(&mut self, port: ReadPortId) {
        let rp = &mut self.read_ports[port.0 as usize];
        let Some(cursor) = rp.cursor.take() else { return };
        let pid = cursor.packet;
        let refct = &mut self.headers[pid.0 as usize].refct;
        *refct = refct.saturating_sub(1);
        if self.headers[pid.0 as usize].refct == 0 {
            self.free_packet(pid);
        }
    }

    /// Discard every packet queued (and currently loaded) on a read port
    /// that has been idle past its timeout, preventing resource hogging
    /// by a stuck consumer.
    pub fn read_watchdog_tick(&mut self, now_millis: u64) {
        for i in 0..self.read_ports.len() {
            let idle = now_millis.saturating_sub(self.read_ports[i].last_activity_millis);
            if idle < self.read_ports[i].timeout_millis {
                continue;
            }
            let port = ReadPortId(i as u32);
            if let Some(pid) = self.read_current_packet(port) {
                self.release_one_ref(pid);
                self.read_ports[i].cursor = None;
            }
            let drained = self.read_ports[i].queue.drain();
            for pid in drained {
                self.release_one_ref(pid);
            }
            self.read_ports[i].last_activity_millis = now_millis;
        }
    }

    fn release_one_ref(&mut self, pid: PacketId) {
        let refct = &mut self.headers[pid.0 as usize].refct;
        *refct = refct.saturating_sub(1);
        if self.headers[pid.0 as usize].refct == 0 {
            self.free_packet(pid);
        }
    }

    // ---- diagnostics --------------------------------------------------------

    /// Number of packets currently sitting in the deferred-delivery
    /// queue, awaiting a [`MultiBuffer::poll_demand`] call. A caller that
    /// only ever uses [`MultiBuffer::write_finalize_direct`] and
    /// [`MultiBuffer::deliver_to`] should see this stay at zero.
    pub fn deliver_queue_len(&self) -> usize {
        self.deliver_queue.len()
    }

    /// Audit the free-chunk list: its length must match `free_bytes /
    /// CHUNK_PAYLOAD`, and it must not contain a cycle.
    pub fn consistency(&self) -> bool {
        let mut seen = 0usize;
        let mut cursor = self.chunk_free_head;
        let mut visited = vec![false; self.chunks.len()];
        while let Some(id) = cursor {
            let idx = id.0 as usize;
            if idx >= visited.len() || visited[idx] {
                return false; // cycle or out-of-range link
            }
            visited[idx] = true;
            seen += 1;
            cursor = self.chunks[idx].next;
        }
        seen == self.free_chunk_count && self.free_chunk_count * CHUNK_PAYLOAD == self.free_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_packet(mb: &mut MultiBuffer, wp: WritePortId, data: &[u8]) -> Option<PacketId> {
        assert!(mb.write_open(wp, 0));
        assert_eq!(mb.write_bytes(wp, data, 0), data.len());
        mb.write_finalize(wp)
    }

    #[test]
    fn free_bytes_conserved_across_write_deliver_read_cycle() {
        let mut mb = MultiBuffer::new(16);
        let total = mb.total_bytes();
        let wp = mb.attach_write_port(1500, 1000);
        let rp = mb.attach_read_port(false, 8, 1000);

        write_packet(&mut mb, wp, b"hello world, this spans more than one 60-byte chunk of payload data");
        assert!(mb.consistency());
        mb.poll_demand();
        assert!(mb.consistency());

        assert!(mb.read_load_next(rp, 0));
        let mut buf = [0u8; 128];
        let n = mb.read_bytes(rp, &mut buf, 0);
        assert_eq!(&buf[..n], &b"hello world, this spans more than one 60-byte chunk of payload data"[..]);
        mb.read_finalize(rp);

        assert!(mb.consistency());
        assert_eq!(mb.free_bytes(), total);
    }

    #[test]
    fn overflow_drops_partial_packet_and_frees_chunks() {
        let mut mb = MultiBuffer::new(4);
        let wp = mb.attach_write_port(50, 1000);
        assert!(mb.write_open(wp, 0));
        assert_eq!(mb.write_bytes(wp, &[0u8; 60], 0), 0); // exceeds max_packet
        assert_eq!(mb.write_finalize(wp), None);
        assert!(mb.consistency());
        assert_eq!(mb.free_bytes(), mb.total_bytes());
    }

    #[test]
    fn allocation_failure_yields_clean_drop() {
        let mut mb = MultiBuffer::new(1);
        let wp = mb.attach_write_port(1000, 1000);
        assert!(mb.write_open(wp, 0)); // consumes the only chunk
        let wp2 = mb.attach_write_port(1000, 1000);
        assert!(!mb.write_open(wp2, 0)); // pool exhausted
    }

    #[test]
    fn read_port_overflow_does_not_affect_other_ports() {
        let mut mb = MultiBuffer::new(32);
        let wp = mb.attach_write_port(1500, 1000);
        let small = mb.attach_read_port(false, 1, 1000);
        let big = mb.attach_read_port(false, 8, 1000);

        write_packet(&mut mb, wp, b"one");
        mb.poll_demand();
        write_packet(&mut mb, wp, b"two");
        mb.poll_demand();

        // `small` only had room for one packet; `big` got both.
        assert_eq!(mb.read_queue_len(small), 1);
        assert_eq!(mb.read_queue_len(big), 2);
    }

    #[test]
    fn read_watchdog_discards_queued_packets() {
        let mut mb = MultiBuffer::new(8);
        let wp = mb.attach_write_port(1500, 1000);
        let rp = mb.attach_read_port(false, 8, 100);

        write_packet(&mut mb, wp, b"stale");
        mb.poll_demand();
        assert_eq!(mb.read_queue_len(rp), 1);

        mb.read_watchdog_tick(500); // well past the 100ms timeout
        assert_eq!(mb.read_queue_len(rp), 0);
        assert!(mb.consistency());
        assert_eq!(mb.free_bytes(), mb.total_bytes());
    }

    #[test]
    fn write_watchdog_aborts_idle_partial_packet() {
        let mut mb = MultiBuffer::new(8);
        let wp = mb.attach_write_port(1500, 100);
        assert!(mb.write_open(wp, 0));
        mb.write_bytes(wp, b"partial", 0);
        mb.write_watchdog_tick(500);
        assert_eq!(mb.write_finalize(wp), None);
        assert!(mb.consistency());
        assert_eq!(mb.free_bytes(), mb.total_bytes());
    }

    #[test]
    fn priority_port_orders_by_key_not_arrival() {
        let mut mb = MultiBuffer::new(32);
        let wp = mb.attach_write_port(1500, 1000);
        let rp = mb.attach_read_port(true, 8, 1000);

        let low = write_packet(&mut mb, wp, b"low").unwrap();
        mb.set_packet_priority(low, 0);
        mb.poll_demand();

        let high = write_packet(&mut mb, wp, b"high").unwrap();
        mb.set_packet_priority(high, 5);
        mb.poll_demand();

        mb.read_load_next(rp, 0);
        assert_eq!(mb.read_current_packet(rp), Some(high));
        mb.read_finalize(rp);
        mb.read_load_next(rp, 0);
        assert_eq!(mb.read_current_packet(rp), Some(low));
    }

    #[test]
    fn refcount_fanout_frees_only_after_every_reader_consumes() {
        let mut mb = MultiBuffer::new(32);
        let wp = mb.attach_write_port(1500, 1000);
        let a = mb.attach_read_port(false, 8, 1000);
        let b = mb.attach_read_port(false, 8, 1000);

        write_packet(&mut mb, wp, b"shared");
        mb.poll_demand();
        assert_eq!(mb.packet_count(), 1);

        mb.read_load_next(a, 0);
        mb.read_finalize(a);
        assert_eq!(mb.packet_count(), 1, "still referenced by port b");

        mb.read_load_next(b, 0);
        mb.read_finalize(b);
        assert_eq!(mb.packet_count(), 0);
        assert!(mb.consistency());
        assert_eq!(mb.free_bytes(), mb.total_bytes());
    }
}
