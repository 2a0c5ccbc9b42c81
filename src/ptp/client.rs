//! PTPv2 event/general message pipeline: header codec, the
//! master outgoing schedule, and the slave/peer-delay measurement cache
//! that turns message arrivals into `(offset, delay)` pairs.
//!
//! Framing and network I/O stay with the caller, the same split the
//! Ethernet dispatch and DHCP state machines use elsewhere in this
//! crate: this module only parses/writes the 34-byte PTP header and
//! payload fields, and returns [`Outbound`] descriptors of what to send.

use crate::net::addr::PtpIdentity;
use crate::{ensure, Error, Result};

use super::timestamp::Time;

/// PTP message type nibble values (IEEE 1588-2019 Table 19).
pub mod msg_type {
    pub const SYNC: u8 = 0x0;
    pub const DELAY_REQ: u8 = 0x1;
    pub const PDELAY_REQ: u8 = 0x2;
    pub const PDELAY_RESP: u8 = 0x3;
    pub const FOLLOW_UP: u8 = 0x8;
    pub const DELAY_RESP: u8 = 0x9;
    pub const PDELAY_RESP_FOLLOW_UP: u8 = 0xa;
    pub const ANNOUNCE: u8 = 0xb;
    pub const SIGNALING: u8 = 0xc;
    pub const MANAGEMENT: u8 = 0xd;
}

/// Size of the common PTPv2 header, all messages on the wire.
pub const HEADER_LEN: usize = 34;

/// Operating mode: disabled, master over raw Ethernet or UDP/IPv4,
/// slave-only, or passive (listen but never discipline the clock).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PtpMode {
    Disabled,
    MasterL2,
    MasterL3,
    SlaveOnly,
    Passive,
}

const TWO_STEP_FLAG: u16 = 0x0200;

/// The common PTPv2 header shared by every message type.
#[derive(Clone, Copy, Debug)]
pub struct PtpHeader {
    pub message_type: u8,
    pub version: u8,
    pub message_length: u16,
    pub domain_number: u8,
    pub flags: u16,
    pub correction_subns: i128,
    pub source_port: PtpIdentity,
    pub sequence_id: u16,
    pub control_field: u8,
    pub log_message_interval: i8,
}

impl PtpHeader {
    pub fn two_step(&self) -> bool {
        self.flags & TWO_STEP_FLAG != 0
    }

    pub fn parse(buf: &[u8]) -> Result<(Self, &[u8])> {
        ensure!(
            buf.len() >= HEADER_LEN,
            Error::PeerProtocol("ptp header truncated")
        );
        let message_type = buf[0] & 0x0f;
        let version = buf[1] & 0x0f;
        let message_length = u16::from_be_bytes([buf[2], buf[3]]);
        let domain_number = buf[4];
        let flags = u16::from_be_bytes([buf[6], buf[7]]);
        let correction_subns = Time::correction_from_bytes(buf[8..16].try_into().unwrap());
        let mut clock_identity = [0u8; 8];
        clock_identity.copy_from_slice(&buf[20..28]);
        let port_number = u16::from_be_bytes([buf[28], buf[29]]);
        let sequence_id = u16::from_be_bytes([buf[30], buf[31]]);
        let control_field = buf[32];
        let log_message_interval = buf[33] as i8;
        let header = PtpHeader {
            message_type,
            version,
            message_length,
            domain_number,
            flags,
            correction_subns,
            source_port: PtpIdentity { clock_identity, port_number },
            sequence_id,
            control_field,
            log_message_interval,
        };
        Ok((header, &buf[HEADER_LEN..]))
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.message_type & 0x0f);
        out.push(self.version & 0x0f);
        out.extend_from_slice(&self.message_length.to_be_bytes());
        out.push(self.domain_number);
        out.push(0); // reserved
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&Time::correction_to_bytes(self.correction_subns));
        out.extend_from_slice(&[0; 4]); // reserved2
        out.extend_from_slice(&self.source_port.clock_identity);
        out.extend_from_slice(&self.source_port.port_number.to_be_bytes());
        out.extend_from_slice(&self.sequence_id.to_be_bytes());
        out.push(self.control_field);
        out.extend_from_slice(&(self.log_message_interval as u8).to_be_bytes());
    }
}

/// A message this client wants sent, with the network layer (raw
/// Ethernet for `MASTER_L2`, UDP/IPv4 event port 319 / general port 320
/// for `MASTER_L3`) left entirely to the caller.
#[derive(Debug)]
pub struct Outbound {
    pub message_type: u8,
    pub payload: Vec<u8>,
}

/// One in-flight two-way exchange. `complete()` returns `Some` once all
/// four timestamps have landed.
#[derive(Clone, Copy, Debug, Default)]
pub struct Measurement {
    pub t1: Option<Time>,
    pub t2: Option<Time>,
    pub t3: Option<Time>,
    pub t4: Option<Time>,
}

impl Measurement {
    /// Returns `(offset_from_master_subns, mean_path_delay_subns)`.
    pub fn complete(&self) -> Option<(i128, i128)> {
        let (t1, t2, t3, t4) = (self.t1?, self.t2?, self.t3?, self.t4?);
        let offset = ((t2 - t1) - (t4 - t3)) / 2;
        let delay = ((t2 - t1) + (t4 - t3)) / 2;
        Some((offset, delay))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
struct MeasurementKey {
    peer_to_peer: bool,
    source_port: PtpIdentity,
    sequence_id: u16,
}

/// A completed measurement callback: `(offset_subns, delay_subns)`.
pub type MeasurementCallback = Box<dyn FnMut(i128, i128)>;

/// Reduced PTPv2 client supporting master and slave modes, one- and
/// two-step SYNC, DELAY_REQ/RESP end-to-end, and PDELAY_REQ/RESP
/// peer-to-peer. `CACHE` bounds the number of in-flight measurements
/// tracked at once, held in a `heapless::Vec` rather than a growable
/// one; the oldest unresolved entry is evicted to make room for a new
/// one, a bounded-LRU policy matching the fixed resource budgets the
/// rest of this crate uses (e.g. `buffer::MultiBuffer`'s fixed chunk
/// pool).
pub struct PtpClient<const CACHE: usize> {
    mode: PtpMode,
    local_identity: PtpIdentity,
    domain_number: u8,
    rate: i8,
    sync_count: u32,
    next_sequence_id: u16,
    cache: heapless::Vec<(MeasurementKey, Measurement), CACHE>,
    callbacks: Vec<MeasurementCallback>,
}

impl<const CACHE: usize> PtpClient<CACHE> {
    pub fn new(mode: PtpMode, local_identity: PtpIdentity, domain_number: u8, rate: i8) -> Self {
        Self {
            mode,
            local_identity,
            domain_number,
            rate,
            sync_count: 0,
            next_sequence_id: 0,
            cache: heapless::Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn mode(&self) -> PtpMode {
        self.mode
    }

    pub fn on_measurement(&mut self, callback: MeasurementCallback) {
        self.callbacks.push(callback);
    }

    fn alloc_sequence_id(&mut self) -> u16 {
        let id = self.next_sequence_id;
        self.next_sequence_id = self.next_sequence_id.wrapping_add(1);
        id
    }

    fn header_template(&self, message_type: u8, sequence_id: u16, two_step: bool) -> PtpHeader {
        PtpHeader {
            message_type,
            version: 2,
            message_length: 0,
            domain_number: self.domain_number,
            flags: if two_step { TWO_STEP_FLAG } else { 0 },
            correction_subns: 0,
            source_port: self.local_identity,
            sequence_id,
            control_field: 0,
            log_message_interval: self.rate,
        }
    }

    fn entry(&mut self, key: MeasurementKey) -> &mut Measurement {
        if let Some(idx) = self.cache.iter().position(|(k, _)| *k == key) {
            return &mut self.cache[idx].1;
        }
        if self.cache.len() == CACHE {
            self.cache.remove(0);
        }
        // Capacity was just guaranteed above, so this can't overflow.
        let _ = self.cache.push((key, Measurement::default()));
        &mut self.cache.last_mut().unwrap().1
    }

    fn take_complete(&mut self, key: MeasurementKey) {
        if let Some(idx) = self.cache.iter().position(|(k, _)| *k == key) {
            if let Some((offset, delay)) = self.cache[idx].1.complete() {
                self.cache.remove(idx);
                for cb in self.callbacks.iter_mut() {
                    cb(offset, delay);
                }
            }
        }
    }

    /// Drive the master outgoing schedule. Call once per SYNC tick (the
    /// caller is responsible for timing `2^rate` Hz); returns the
    /// messages to transmit, ANNOUNCE included every `2^rate` SYNCs
 ///.
    pub fn master_tick(&mut self, origin_timestamp: Time, one_step: bool) -> Vec<Outbound> {
        let mut out = Vec::new();
        if !matches!(self.mode, PtpMode::MasterL2 | PtpMode::MasterL3) {
            return out;
        }
        let seq = self.alloc_sequence_id();
        let header = self.header_template(msg_type::SYNC, seq, !one_step);
        let mut payload = Vec::new();
        header.write(&mut payload);
        if one_step {
            let (s, n, f) = origin_timestamp.to_wire();
            payload.extend_from_slice(&s.to_be_bytes()[2..]);
            payload.extend_from_slice(&n.to_be_bytes());
            payload.extend_from_slice(&f.to_be_bytes());
        }
        out.push(Outbound { message_type: msg_type::SYNC, payload });

        if !one_step {
            let seq_fu = seq;
            let fu_header = self.header_template(msg_type::FOLLOW_UP, seq_fu, false);
            let mut fu_payload = Vec::new();
            fu_header.write(&mut fu_payload);
            let (s, n, f) = origin_timestamp.to_wire();
            fu_payload.extend_from_slice(&s.to_be_bytes()[2..]);
            fu_payload.extend_from_slice(&n.to_be_bytes());
            fu_payload.extend_from_slice(&f.to_be_bytes());
            out.push(Outbound { message_type: msg_type::FOLLOW_UP, payload: fu_payload });
        }

        self.sync_count += 1;
        let syncs_per_announce = 1u32 << self.rate.unsigned_abs().min(16);
        if self.sync_count >= syncs_per_announce {
            self.sync_count = 0;
            let seq_an = self.alloc_sequence_id();
            let an_header = self.header_template(msg_type::ANNOUNCE, seq_an, false);
            let mut an_payload = Vec::new();
            an_header.write(&mut an_payload);
            out.push(Outbound { message_type: msg_type::ANNOUNCE, payload: an_payload });
        }
        out
    }

    /// Feed one received PTP message (header already separated from its
    /// message-specific body) into the slave/peer-delay bookkeeping
 /// table. `rx_time` is the local hardware
    /// receive timestamp. Returns any message this exchange now needs
    /// sent in response (DELAY_REQ, PDELAY_RESP, ...).
    pub fn receive(&mut self, header: &PtpHeader, body: &[u8], rx_time: Time) -> Result<Vec<Outbound>> {
        match header.message_type {
            msg_type::SYNC => self.on_sync(header, body, rx_time),
            msg_type::FOLLOW_UP => self.on_follow_up(header, body),
            msg_type::DELAY_RESP => self.on_delay_resp(header, body),
            msg_type::PDELAY_REQ => self.on_pdelay_req(header, rx_time),
            msg_type::PDELAY_RESP => self.on_pdelay_resp(header, body, rx_time),
            msg_type::PDELAY_RESP_FOLLOW_UP => self.on_pdelay_rfu(header, body),
            _ => Ok(Vec::new()),
        }
    }

    fn on_sync(&mut self, header: &PtpHeader, body: &[u8], rx_time: Time) -> Result<Vec<Outbound>> {
        let key = MeasurementKey { peer_to_peer: false, source_port: header.source_port, sequence_id: header.sequence_id };
        let two_step = header.two_step();
        if !two_step {
            ensure!(body.len() >= 10, Error::PeerProtocol("sync payload truncated"));
            let seconds = u64::from_be_bytes([0, 0, body[0], body[1], body[2], body[3], body[4], body[5]]);
            let nanos = u32::from_be_bytes([body[6], body[7], body[8], body[9]]);
            let origin = Time::from_wire(seconds, nanos, 0).add_correction(header.correction_subns);
            self.entry(key).t1 = Some(origin);
        }
        self.entry(key).t2 = Some(rx_time);
        if !two_step {
            return self.issue_delay_req(key);
        }
        Ok(Vec::new())
    }

    fn on_follow_up(&mut self, header: &PtpHeader, body: &[u8]) -> Result<Vec<Outbound>> {
        ensure!(body.len() >= 10, Error::PeerProtocol("follow_up payload truncated"));
        let key = MeasurementKey { peer_to_peer: false, source_port: header.source_port, sequence_id: header.sequence_id };
        let seconds = u64::from_be_bytes([0, 0, body[0], body[1], body[2], body[3], body[4], body[5]]);
        let nanos = u32::from_be_bytes([body[6], body[7], body[8], body[9]]);
        let origin = Time::from_wire(seconds, nanos, 0).add_correction(header.correction_subns);
        self.entry(key).t1 = Some(origin);
        self.issue_delay_req(key)
    }

    fn issue_delay_req(&mut self, sync_key: MeasurementKey) -> Result<Vec<Outbound>> {
        let seq = self.alloc_sequence_id();
        let header = self.header_template(msg_type::DELAY_REQ, seq, false);
        let mut payload = Vec::new();
        header.write(&mut payload);
        let req_key = MeasurementKey { peer_to_peer: false, source_port: self.local_identity, sequence_id: seq };
        let t1 = self.entry(sync_key).t1;
        let t2 = self.entry(sync_key).t2;
        let entry = self.entry(req_key);
        entry.t1 = t1;
        entry.t2 = t2;
        Ok(vec![Outbound { message_type: msg_type::DELAY_REQ, payload }])
    }

    /// Caller reports the local hardware transmit timestamp for an
    /// already-sent DELAY_REQ so its `t3` can be filled in once the
    /// matching DELAY_RESP arrives.
    pub fn note_delay_req_transmit(&mut self, sequence_id: u16, t3: Time) {
        let key = MeasurementKey { peer_to_peer: false, source_port: self.local_identity, sequence_id };
        self.entry(key).t3 = Some(t3);
        self.take_complete(key);
    }

    fn on_delay_resp(&mut self, header: &PtpHeader, body: &[u8]) -> Result<Vec<Outbound>> {
        ensure!(body.len() >= 10, Error::PeerProtocol("delay_resp payload truncated"));
        let seconds = u64::from_be_bytes([0, 0, body[0], body[1], body[2], body[3], body[4], body[5]]);
        let nanos = u32::from_be_bytes([body[6], body[7], body[8], body[9]]);
        // DELAY_RESP echoes the requester's own sequenceId in the header,
        // so no separate requestingPortIdentity lookup is needed to find
        // the matching DELAY_REQ entry; t4 = rx - corr completes the
        // exchange once t3 is already set.
        let rx_time = Time::from_wire(seconds, nanos, 0).add_correction(-header.correction_subns);
        let key = MeasurementKey { peer_to_peer: false, source_port: self.local_identity, sequence_id: header.sequence_id };
        self.entry(key).t4 = Some(rx_time);
        self.take_complete(key);
        Ok(Vec::new())
    }

    fn on_pdelay_req(&mut self, header: &PtpHeader, rx_time: Time) -> Result<Vec<Outbound>> {
        let key = MeasurementKey { peer_to_peer: true, source_port: header.source_port, sequence_id: header.sequence_id };
        self.entry(key).t2 = Some(rx_time);
        let seq = header.sequence_id;
        let resp_header = self.header_template(msg_type::PDELAY_RESP, seq, true);
        let mut payload = Vec::new();
        resp_header.write(&mut payload);
        let (s, n, f) = rx_time.to_wire();
        payload.extend_from_slice(&s.to_be_bytes()[2..]);
        payload.extend_from_slice(&n.to_be_bytes());
        payload.extend_from_slice(&f.to_be_bytes());
        payload.extend_from_slice(&header.source_port.clock_identity);
        payload.extend_from_slice(&header.source_port.port_number.to_be_bytes());
        Ok(vec![Outbound { message_type: msg_type::PDELAY_RESP, payload }])
    }

    fn on_pdelay_resp(&mut self, header: &PtpHeader, body: &[u8], rx_time: Time) -> Result<Vec<Outbound>> {
        ensure!(body.len() >= 10, Error::PeerProtocol("pdelay_resp payload truncated"));
        let key = MeasurementKey { peer_to_peer: true, source_port: self.local_identity, sequence_id: header.sequence_id };
        self.entry(key).t4 = Some(rx_time);
        if !header.two_step() {
            let seconds = u64::from_be_bytes([0, 0, body[0], body[1], body[2], body[3], body[4], body[5]]);
            let nanos = u32::from_be_bytes([body[6], body[7], body[8], body[9]]);
            let t2 = Time::from_wire(seconds, nanos, 0);
            self.entry(key).t3 = Some(t2.add_correction(header.correction_subns));
            self.take_complete(key);
        }
        Ok(Vec::new())
    }

    fn on_pdelay_rfu(&mut self, header: &PtpHeader, body: &[u8]) -> Result<Vec<Outbound>> {
        ensure!(body.len() >= 10, Error::PeerProtocol("pdelay_rfu payload truncated"));
        let key = MeasurementKey { peer_to_peer: true, source_port: self.local_identity, sequence_id: header.sequence_id };
        let seconds = u64::from_be_bytes([0, 0, body[0], body[1], body[2], body[3], body[4], body[5]]);
        let nanos = u32::from_be_bytes([body[6], body[7], body[8], body[9]]);
        let t2 = Time::from_wire(seconds, nanos, 0);
        self.entry(key).t3 = Some(t2.add_correction(header.correction_subns));
        self.take_complete(key);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(n: u8) -> PtpIdentity {
        PtpIdentity { clock_identity: [n; 8], port_number: 1 }
    }

    #[test]
    fn header_round_trips_through_write_and_parse() {
        let header = PtpHeader {
            message_type: msg_type::ANNOUNCE,
            version: 2,
            message_length: 64,
            domain_number: 0,
            flags: TWO_STEP_FLAG,
            correction_subns: -12345,
            source_port: identity(7),
            sequence_id: 42,
            control_field: 5,
            log_message_interval: -3,
        };
        let mut buf = Vec::new();
        header.write(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);
        let (parsed, rest) = PtpHeader::parse(&buf).unwrap();
        assert!(rest.is_empty());
        assert_eq!(parsed.message_type, msg_type::ANNOUNCE);
        assert_eq!(parsed.sequence_id, 42);
        assert_eq!(parsed.correction_subns, -12345);
        assert!(parsed.two_step());
        assert_eq!(parsed.log_message_interval, -3);
    }

    #[test]
    fn master_tick_emits_announce_every_2_pow_rate_syncs() {
        let mut client: PtpClient<8> = PtpClient::new(PtpMode::MasterL2, identity(1), 0, 2);
        let mut announce_count = 0;
        for _ in 0..4 {
            let out = client.master_tick(Time::ZERO, true);
            announce_count += out.iter().filter(|o| o.message_type == msg_type::ANNOUNCE).count();
        }
        assert_eq!(announce_count, 1);
    }

    #[test]
    fn two_step_sync_measurement_completes_and_invokes_callback() {
        let mut client: PtpClient<8> = PtpClient::new(PtpMode::SlaveOnly, identity(2), 0, 0);
        let seen: std::rc::Rc<std::cell::RefCell<Vec<(i128, i128)>>> = Default::default();
        let seen_cb = seen.clone();
        client.on_measurement(Box::new(move |o, d| seen_cb.borrow_mut().push((o, d))));

        let master = identity(1);
        let sync_header = PtpHeader {
            message_type: msg_type::SYNC,
            version: 2,
            message_length: 44,
            domain_number: 0,
            flags: TWO_STEP_FLAG,
            correction_subns: 0,
            source_port: master,
            sequence_id: 10,
            control_field: 0,
            log_message_interval: 0,
        };
        let t2 = Time::from_wire(100, 1_000_000, 0);
        let out = client.receive(&sync_header, &[], t2).unwrap();
        assert!(out.is_empty());

        let t1 = Time::from_wire(100, 1_000_700, 0);
        let (s, n, _f) = t1.to_wire();
        let mut fu_body = Vec::new();
        fu_body.extend_from_slice(&s.to_be_bytes()[2..]);
        fu_body.extend_from_slice(&n.to_be_bytes());
        fu_body.extend_from_slice(&0u16.to_be_bytes());
        let fu_header = PtpHeader { message_type: msg_type::FOLLOW_UP, sequence_id: 10, ..sync_header };
        let out = client.on_follow_up(&fu_header, &fu_body).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].message_type, msg_type::DELAY_REQ);

        let (req_header, _) = PtpHeader::parse(&out[0].payload).unwrap();
        client.note_delay_req_transmit(req_header.sequence_id, Time::from_wire(100, 2_000_000, 0));

        let t4 = Time::from_wire(100, 2_000_900, 0);
        let (s4, n4, _f4) = t4.to_wire();
        let mut dr_body = Vec::new();
        dr_body.extend_from_slice(&s4.to_be_bytes()[2..]);
        dr_body.extend_from_slice(&n4.to_be_bytes());
        dr_body.extend_from_slice(&[0u8; 8]); // reserved trailer padding up to requestingPortIdentity
        dr_body.extend_from_slice(&req_header.sequence_id.to_be_bytes());
        let dr_header = PtpHeader { message_type: msg_type::DELAY_RESP, sequence_id: req_header.sequence_id, source_port: master, ..sync_header };
        client.on_delay_resp(&dr_header, &dr_body).unwrap();

        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn peer_delay_two_way_exchange_completes_without_follow_up() {
        let mut requester: PtpClient<8> = PtpClient::new(PtpMode::SlaveOnly, identity(3), 0, 0);
        let responder_id = identity(4);

        let seq = 5;
        let t1 = Time::from_wire(0, 1_000_000, 0);
        let req_header = PtpHeader {
            message_type: msg_type::PDELAY_REQ,
            version: 2,
            message_length: 54,
            domain_number: 0,
            flags: 0,
            correction_subns: 0,
            source_port: requester.local_identity,
            sequence_id: seq,
            control_field: 0,
            log_message_interval: 0,
        };
        requester.entry(MeasurementKey { peer_to_peer: true, source_port: requester.local_identity, sequence_id: seq }).t1 = Some(t1);

        let mut responder: PtpClient<8> = PtpClient::new(PtpMode::SlaveOnly, responder_id, 0, 0);
        let t2 = Time::from_wire(0, 1_000_300, 0);
        let resp_out = responder.on_pdelay_req(&req_header, t2).unwrap();
        assert_eq!(resp_out.len(), 1);

        let (resp_header, resp_body) = PtpHeader::parse(&resp_out[0].payload).unwrap();
        let t4 = Time::from_wire(0, 1_001_600, 0);
        requester.on_pdelay_resp(&resp_header, resp_body, t4).unwrap();

        let key = MeasurementKey { peer_to_peer: true, source_port: requester.local_identity, sequence_id: seq };
        let (_, measurement) = requester.cache.iter().find(|(k, _)| *k == key).unwrap();
        assert!(measurement.complete().is_some());
    }
}
