//! ARP (RFC 826) request/reply codec and a small resolution cache, used
//! by the DHCP client's address-conflict probe (its `TESTING` state) and
//! by any host-stack consumer that needs to resolve a neighbor's MAC
//! address.

use std::collections::HashMap;

use super::addr::{Ipv4Addr, MacAddr};

pub const PACKET_LEN: usize = 28;

const HTYPE_ETHERNET: u16 = 1;
const PTYPE_IPV4: u16 = 0x0800;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    Request,
    Reply,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ArpPacket {
    pub opcode: Opcode,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < PACKET_LEN {
            return None;
        }
        let htype = u16::from_be_bytes([buf[0], buf[1]]);
        let ptype = u16::from_be_bytes([buf[2], buf[3]]);
        if htype != HTYPE_ETHERNET || ptype != PTYPE_IPV4 || buf[4] != 6 || buf[5] != 4 {
            return None;
        }
        let opcode = match u16::from_be_bytes([buf[6], buf[7]]) {
            1 => Opcode::Request,
            2 => Opcode::Reply,
            _ => return None,
        };
        Some(Self {
            opcode,
            sender_mac: MacAddr([buf[8], buf[9], buf[10], buf[11], buf[12], buf[13]]),
            sender_ip: Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]),
            target_mac: MacAddr([buf[18], buf[19], buf[20], buf[21], buf[22], buf[23]]),
            target_ip: Ipv4Addr::new(buf[24], buf[25], buf[26], buf[27]),
        })
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&HTYPE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&PTYPE_IPV4.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        let op: u16 = match self.opcode {
            Opcode::Request => 1,
            Opcode::Reply => 2,
        };
        buf[6..8].copy_from_slice(&op.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
    }

    /// Build the probe used during address-conflict detection (RFC 5227):
    /// an ARP request for `candidate` with an all-zero sender IP.
    pub fn probe(sender_mac: MacAddr, candidate: Ipv4Addr) -> Self {
        Self {
            opcode: Opcode::Request,
            sender_mac,
            sender_ip: Ipv4Addr::UNSPECIFIED,
            target_mac: MacAddr::ZERO,
            target_ip: candidate,
        }
    }
}

/// A simple resolved-address cache; entries never expire on their own —
/// callers age them out via [`ArpCache::evict_older_than`] on their own
/// schedule, mirroring the rest of this crate's explicit-tick model.
#[derive(Default)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, (MacAddr, u64)>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now_millis: u64) {
        self.entries.insert(ip, (mac, now_millis));
    }

    pub fn lookup(&self, ip: &Ipv4Addr) -> Option<MacAddr> {
        self.entries.get(ip).map(|(mac, _)| *mac)
    }

    pub fn evict_older_than(&mut self, now_millis: u64, max_age_millis: u64) {
        self.entries
            .retain(|_, (_, seen)| now_millis.saturating_sub(*seen) < max_age_millis);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
