//! The managed Ethernet switch core.
//!
//! `SwitchCore` owns a private [`MultiBuffer`](crate::buffer::MultiBuffer)
//! — a switch's packet pool realistically belongs to that switch alone —
//! plus a sparse port table, the MAC-learning table, and per-VID state.
//! Forwarding decisions bypass `MultiBuffer`'s generic
//! `enqueue`/`poll_demand` fan-out entirely: `ingress()` finalizes each
//! frame with [`MultiBuffer::write_finalize_direct`] (so it never piles
//! up in `deliver_queue`), computes the destination mask itself (MAC
//! table, VLAN membership, promiscuous ports, plug-in verdicts), and
//! hands the chosen read ports straight to [`MultiBuffer::deliver_to`].

mod log;
mod mac_table;
mod plugin;
mod port;
mod vlan;

pub use log::{DebugLogWriter, Fingerprint, ForwardingEvent, Reason, RecordingLogWriter, SwitchLogWriter};
pub use mac_table::{MacEntry, MacTable};
pub use plugin::{EgressPlugin, IngressPlugin, PacketView, Stage, Verdict};
pub use port::SwitchPort;
pub use vlan::{PortVlanConfig, RateViolation, ResetMode, TagDecision, TagPolicy, VlanRate, VlanTable};

use crate::buffer::{MultiBuffer, PacketId, ReadPortId};
use crate::net::ethernet::{EtherType, EthernetHeader};
use crate::{Error, Result};

/// Default port-count ceiling, a configurable limit rather than a hard
/// architectural one.
pub const DEFAULT_MAX_PORTS: usize = 32;

/// What to do with a unicast frame whose destination isn't in the MAC
/// table yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CacheMissPolicy {
    FloodAll,
    Drop,
}

pub struct SwitchCore {
    buffer: MultiBuffer,
    ports: Vec<SwitchPort>,
    max_ports: usize,
    mac_table: MacTable,
    vlan_table: VlanTable,
    ingress_plugins: Vec<Box<dyn IngressPlugin>>,
    traffic_filter: Option<EtherType>,
    traffic_count: u64,
    cache_miss: CacheMissPolicy,
    log_writer: Box<dyn SwitchLogWriter>,
}

impl SwitchCore {
    pub fn new(buffer_chunks: usize, max_ports: usize) -> Self {
        Self {
            buffer: MultiBuffer::new(buffer_chunks),
            ports: Vec::new(),
            max_ports,
            mac_table: MacTable::new(max_ports * 4),
            vlan_table: VlanTable::new(max_ports, ResetMode::Open),
            ingress_plugins: Vec::new(),
            traffic_filter: None,
            traffic_count: 0,
            cache_miss: CacheMissPolicy::FloodAll,
            log_writer: Box::new(DebugLogWriter),
        }
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn add_port(
        &mut self,
        max_packet: usize,
        write_timeout_millis: u64,
        priority_queue: bool,
        read_capacity: usize,
        read_timeout_millis: u64,
    ) -> Result<u8> {
        if self.ports.len() >= self.max_ports {
            ::log::warn!("switch: refusing to add port past ceiling of {}", self.max_ports);
            return Err(Error::ResourceExhausted("switch port table full"));
        }
        let write_port = self.buffer.attach_write_port(max_packet, write_timeout_millis);
        let read_port = self
            .buffer
            .attach_read_port(priority_queue, read_capacity, read_timeout_millis);
        let index = self.ports.len() as u8;
        self.ports.push(SwitchPort::new(index, write_port, read_port));
        self.vlan_table.add_member(1, index);
        Ok(index)
    }

    pub fn set_promiscuous(&mut self, port: u8, on: bool) {
        if let Some(p) = self.ports.get_mut(port as usize) {
            p.promiscuous = on;
        }
    }

    pub fn set_port_vlan_policy(&mut self, port: u8, policy: PortVlanConfig) {
        if let Some(p) = self.ports.get_mut(port as usize) {
            p.vlan = policy;
        }
    }

    pub fn set_traffic_filter(&mut self, filter: Option<EtherType>) {
        self.traffic_filter = filter;
        self.traffic_count = 0;
    }

    pub fn get_traffic_count(&self) -> u64 {
        self.traffic_count
    }

    pub fn set_cache_miss_policy(&mut self, policy: CacheMissPolicy) {
        self.cache_miss = policy;
    }

    pub fn set_log_writer(&mut self, writer: Box<dyn SwitchLogWriter>) {
        self.log_writer = writer;
    }

    pub fn register_ingress_plugin(&mut self, plugin: Box<dyn IngressPlugin>) {
        self.ingress_plugins.push(plugin);
    }

    pub fn register_egress_plugin(&mut self, port: u8, plugin: Box<dyn EgressPlugin>) {
        if let Some(p) = self.ports.get_mut(port as usize) {
            p.egress_plugins.push(plugin);
        }
    }

    pub fn vlan_table_mut(&mut self) -> &mut VlanTable {
        &mut self.vlan_table
    }

    pub fn mac_table(&self) -> &MacTable {
        &self.mac_table
    }

    /// Number of packets sitting in the private buffer's
    /// deferred-delivery queue. `ingress()` delivers directly and never
    /// drains this queue, so it should stay at zero; exposed for tests
    /// and diagnostics rather than normal forwarding use.
    pub fn buffer_deliver_queue_len(&self) -> usize {
        self.buffer.deliver_queue_len()
    }

    /// Read `buf.len()` bytes (or however many are available) of the
    /// currently-loaded packet on `port`'s egress read port. Mirrors
    /// `MultiBuffer::read_bytes` with the port-index interface this crate
    /// presents at the switch boundary.
    pub fn egress_load(&mut self, port: u8, now_millis: u64) -> bool {
        let Some(p) = self.ports.get(port as usize) else { return false };
        self.buffer.read_load_next(p.read_port, now_millis)
    }

    pub fn egress_read(&mut self, port: u8, buf: &mut [u8], now_millis: u64) -> usize {
        let Some(p) = self.ports.get(port as usize) else { return 0 };
        self.buffer.read_bytes(p.read_port, buf, now_millis)
    }

    pub fn egress_finalize(&mut self, port: u8) {
        if let Some(p) = self.ports.get(port as usize) {
            self.buffer.read_finalize(p.read_port);
        }
    }

    pub fn write_watchdog_tick(&mut self, now_millis: u64) {
        self.buffer.write_watchdog_tick(now_millis);
    }

    pub fn read_watchdog_tick(&mut self, now_millis: u64) {
        self.buffer.read_watchdog_tick(now_millis);
    }

    pub fn mac_age_tick(&mut self, max_age: u32) {
        self.mac_table.age_tick(max_age);
    }

    /// Run the full ingress-to-egress forwarding decision for one frame
 /// arriving on `ingress_port`.
    pub fn ingress(&mut self, ingress_port: u8, frame: &[u8], now_millis: u64) {
        let Some(hdr) = EthernetHeader::parse(frame) else {
            self.emit(Fingerprint(0), 0, Reason::DroppedRunt);
            return;
        };
        let fp = Fingerprint::of(hdr.src, hdr.dst, frame.len(), 0);

        let Some(port_idx) = self.ports.get(ingress_port as usize).map(|_| ingress_port) else {
            return;
        };
        if !self.ports[port_idx as usize].enabled {
            return;
        }

        let write_port = self.ports[port_idx as usize].write_port;
        if !self.buffer.write_open(write_port, now_millis) {
            self.emit(fp, 0, Reason::DroppedOverflow);
            return;
        }
        if self.buffer.write_bytes(write_port, frame, now_millis) != frame.len() {
            self.buffer.write_abort(write_port);
            self.emit(fp, 0, Reason::DroppedOverflow);
            return;
        }
        let Some(pid) = self.buffer.write_finalize_direct(write_port) else {
            self.emit(fp, 0, Reason::DroppedOverflow);
            return;
        };

        let tag = hdr.vlan.as_ref().map(|t| (t.vid, t.priority));
        let (vid, priority) = match self.ports[port_idx as usize].vlan.ingress(tag) {
            TagDecision::Accept { vid, priority } => (vid, priority),
            TagDecision::Drop => {
                self.buffer.free_packet(pid);
                self.emit(fp, 0, Reason::DroppedVlan);
                return;
            }
        };
        self.buffer.set_packet_priority(pid, priority as u16);

        {
            let mut view = PacketView::new(&mut self.buffer, pid, Stage::Ingress);
            for plugin in self.ingress_plugins.iter_mut() {
                match plugin.apply(&mut view, port_idx) {
                    Verdict::Continue => {}
                    Verdict::Divert => {
                        drop(view);
                        self.buffer.free_packet(pid);
                        self.emit(fp, 0, Reason::DroppedDiverted);
                        return;
                    }
                    Verdict::Drop => {
                        drop(view);
                        self.buffer.free_packet(pid);
                        self.emit(fp, 0, Reason::DroppedPolicy);
                        return;
                    }
                }
            }
        }

        self.mac_table.learn(hdr.src, port_idx, vid);

        let mut mask: u32 = if hdr.dst.is_unicast() {
            match self.mac_table.lookup(&hdr.dst) {
                Some(entry) => 1u32 << entry.port,
                None => match self.cache_miss {
                    CacheMissPolicy::FloodAll => self.all_ports_mask(),
                    CacheMissPolicy::Drop => 0,
                },
            }
        } else {
            self.all_ports_mask()
        };
        for p in &self.ports {
            if p.promiscuous && p.index != port_idx {
                mask |= 1 << p.index;
            }
        }
        mask &= !(1 << port_idx);

        if mask == 0 {
            self.buffer.free_packet(pid);
            self.emit(fp, 0, Reason::DroppedNoRoute);
            return;
        }

        mask &= self.vlan_table.member_mask(vid);
        if mask == 0 {
            self.buffer.free_packet(pid);
            self.emit(fp, 0, Reason::DroppedVlan);
            return;
        }

        let priority_u8 = self.buffer.packet_priority(pid) as u8;
        if let Some(rate) = self.vlan_table.rate_mut(vid) {
            match rate.charge(frame.len(), priority_u8, now_millis) {
                Some(new_priority) => self.buffer.set_packet_priority(pid, new_priority as u16),
                None => {
                    self.buffer.free_packet(pid);
                    self.emit(fp, 0, Reason::DroppedVlan);
                    return;
                }
            }
        }

        let mut final_mask = mask;
        for idx in 0..self.ports.len() as u8 {
            if mask & (1 << idx) == 0 {
                continue;
            }
            if self.ports[idx as usize].egress_plugins.is_empty() {
                continue;
            }
            let mut cleared = false;
            {
                let mut view = PacketView::new(&mut self.buffer, pid, Stage::Egress);
                for plugin in self.ports[idx as usize].egress_plugins.iter_mut() {
                    match plugin.apply(&mut view, idx) {
                        Verdict::Continue => {}
                        Verdict::Drop | Verdict::Divert => {
                            cleared = true;
                            break;
                        }
                    }
                }
            }
            if cleared {
                final_mask &= !(1 << idx);
            }
        }

        if final_mask == 0 {
            self.buffer.free_packet(pid);
            self.emit(fp, 0, Reason::DroppedPolicy);
            return;
        }

        let targets: Vec<ReadPortId> = (0..self.ports.len() as u8)
            .filter(|i| final_mask & (1 << i) != 0)
            .map(|i| self.ports[i as usize].read_port)
            .collect();
        let delivered = self.buffer.deliver_to(pid, &targets);
        if delivered == 0 {
            self.buffer.free_packet(pid);
            self.emit(fp, final_mask, Reason::DroppedOverflow);
        } else {
            self.emit(fp, final_mask, Reason::Delivered);
            if self.traffic_filter == Some(hdr.ether_type) {
                self.traffic_count += 1;
            }
        }
    }

    fn all_ports_mask(&self) -> u32 {
        if self.ports.len() >= 32 {
            u32::MAX
        } else {
            (1u32 << self.ports.len()) - 1
        }
    }

    fn emit(&mut self, fingerprint: Fingerprint, decision_mask: u32, reason: Reason) {
        self.log_writer.on_decision(&ForwardingEvent {
            fingerprint,
            decision_mask,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::addr::MacAddr;

    fn frame(dst: MacAddr, src: MacAddr) -> Vec<u8> {
        let mut buf = vec![0u8; 14 + 10];
        let hdr = EthernetHeader {
            dst,
            src,
            ether_type: crate::net::ethernet::EtherTypes::Ipv4,
            vlan: None,
        };
        hdr.write(&mut buf[..14]);
        buf
    }

    #[test]
    fn learns_source_and_forwards_unicast_reply() {
        let mut sw = SwitchCore::new(256, 8);
        let p0 = sw.add_port(1500, 1000, false, 8, 1000).unwrap();
        let p1 = sw.add_port(1500, 1000, false, 8, 1000).unwrap();

        let a = MacAddr([2, 0, 0, 0, 0, 1]);
        let b = MacAddr([2, 0, 0, 0, 0, 2]);

        // a -> broadcast, arrives on p0: floods to p1, learns `a` there.
        sw.ingress(p0, &frame(MacAddr::BROADCAST, a), 0);
        assert!(sw.egress_load(p1, 0));
        sw.egress_finalize(p1);

        // b -> a, arrives on p1: now unicast-known, goes only to p0.
        sw.ingress(p1, &frame(a, b), 0);
        assert!(sw.egress_load(p0, 0));
        assert!(!sw.egress_load(p1, 10)); // nothing new queued for p1
    }

    #[test]
    fn runt_frame_is_dropped() {
        let mut sw = SwitchCore::new(64, 4);
        let p0 = sw.add_port(1500, 1000, false, 8, 1000).unwrap();
        sw.ingress(p0, &[0u8; 4], 0);
        assert_eq!(sw.mac_table().len(), 0);
    }

    #[test]
    fn port_ceiling_is_enforced() {
        let mut sw = SwitchCore::new(64, 1);
        assert!(sw.add_port(1500, 1000, false, 8, 1000).is_ok());
        assert!(sw.add_port(1500, 1000, false, 8, 1000).is_err());
    }

    #[test]
    fn traffic_filter_counts_matching_ethertype() {
        let mut sw = SwitchCore::new(256, 4);
        let p0 = sw.add_port(1500, 1000, false, 8, 1000).unwrap();
        sw.add_port(1500, 1000, false, 8, 1000).unwrap();
        sw.set_traffic_filter(Some(crate::net::ethernet::EtherTypes::Ipv4));
        sw.ingress(p0, &frame(MacAddr::BROADCAST, MacAddr([2, 0, 0, 0, 0, 9])), 0);
        assert_eq!(sw.get_traffic_count(), 1);
    }

    #[test]
    fn vlan_membership_blocks_forwarding_across_vlans() {
        let mut sw = SwitchCore::new(256, 4);
        let p0 = sw.add_port(1500, 1000, false, 8, 1000).unwrap();
        let p1 = sw.add_port(1500, 1000, false, 8, 1000).unwrap();
        // Move p1 out of VID 1's membership.
        sw.vlan_table_mut().remove_member(1, p1);
        sw.ingress(p0, &frame(MacAddr::BROADCAST, MacAddr([2, 0, 0, 0, 0, 1])), 0);
        assert!(!sw.egress_load(p1, 0));
    }
}
