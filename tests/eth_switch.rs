//! VLAN-aware forwarding and rate-limiting scenarios on `SwitchCore`,
//! layered on top of the unit tests already living beside the module.

use satcat5::net::addr::MacAddr;
use satcat5::net::ethernet::{EtherTypes, EthernetHeader, VlanTag};
use satcat5::switch::{RateViolation, ResetMode, SwitchCore, TagPolicy, VlanRate};

fn tagged_frame(dst: MacAddr, src: MacAddr, vid: u16, priority: u8, payload_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; 18 + payload_len];
    let hdr = EthernetHeader {
        dst,
        src,
        ether_type: EtherTypes::Ipv4,
        vlan: Some(VlanTag { vid, priority }),
    };
    hdr.write(&mut buf[..18]);
    buf
}

#[test]
fn strict_rate_limit_admits_then_drops_once_the_bucket_is_dry() {
    let mut sw = SwitchCore::new(256, 4);
    let p0 = sw.add_port(1500, 1000, false, 16, 1000).unwrap();
    let p1 = sw.add_port(1500, 1000, false, 16, 1000).unwrap();

    sw.vlan_table_mut().remove_member(1, p0);
    sw.vlan_table_mut().remove_member(1, p1);
    sw.vlan_table_mut().add_member(42, p0);
    sw.vlan_table_mut().add_member(42, p1);
    sw.vlan_table_mut().set_rate(42, VlanRate::new(0, 120, RateViolation::Strict));
    sw.set_port_vlan_policy(
        p0,
        satcat5::switch::PortVlanConfig { policy: TagPolicy::AdmitAll, default_vid: 42, default_priority: 0 },
    );

    let a = MacAddr([2, 0, 0, 0, 0, 0xa]);
    let b = MacAddr([2, 0, 0, 0, 0, 0xb]);

    // Two 60-byte frames fit the 120-byte bucket; the third doesn't.
    for _ in 0..2 {
        sw.ingress(p0, &tagged_frame(MacAddr::BROADCAST, a, 42, 0, 42), 0);
    }
    let mut admitted = 0;
    while sw.egress_load(p1, 0) {
        admitted += 1;
        sw.egress_finalize(p1);
    }
    assert_eq!(admitted, 2);

    sw.ingress(p0, &tagged_frame(MacAddr::BROADCAST, b, 42, 0, 42), 0);
    assert!(!sw.egress_load(p1, 0)); // dropped: bucket is dry
}

#[test]
fn vlan_lockdown_blocks_forwarding_until_membership_is_granted() {
    let mut sw = SwitchCore::new(256, 4);
    let p0 = sw.add_port(1500, 1000, false, 16, 1000).unwrap();
    let p1 = sw.add_port(1500, 1000, false, 16, 1000).unwrap();
    *sw.vlan_table_mut() = satcat5::switch::VlanTable::new(4, ResetMode::Lockdown);

    let a = MacAddr([2, 0, 0, 0, 0, 1]);
    sw.ingress(p0, &tagged_frame(MacAddr::BROADCAST, a, 1, 0, 10), 0);
    assert!(!sw.egress_load(p1, 0));

    sw.vlan_table_mut().add_member(1, p0);
    sw.vlan_table_mut().add_member(1, p1);
    sw.ingress(p0, &tagged_frame(MacAddr::BROADCAST, a, 1, 0, 10), 0);
    assert!(sw.egress_load(p1, 0));
}

#[test]
fn ingress_never_leaves_packets_in_the_deferred_delivery_queue() {
    // `ingress()` delivers straight to the computed fan-out and never
    // drains `deliver_queue`; it must finalize without enqueuing there
    // in the first place, or every forwarded frame would pile up in a
    // queue nothing ever drains.
    let mut sw = SwitchCore::new(256, 4);
    let p0 = sw.add_port(1500, 1000, false, 16, 1000).unwrap();
    let p1 = sw.add_port(1500, 1000, false, 16, 1000).unwrap();
    let a = MacAddr([2, 0, 0, 0, 0, 1]);
    let b = MacAddr([2, 0, 0, 0, 0, 2]);

    for _ in 0..20 {
        sw.ingress(p0, &tagged_frame(MacAddr::BROADCAST, a, 1, 0, 10), 0);
        assert_eq!(sw.buffer_deliver_queue_len(), 0);
        assert!(sw.egress_load(p1, 0));
        sw.egress_finalize(p1);
    }

    // A frame dropped for having no route (unknown unicast destination,
    // cache-miss policy set to drop) also takes an early return before
    // delivery; it must not leave anything behind either.
    sw.set_cache_miss_policy(satcat5::switch::CacheMissPolicy::Drop);
    sw.ingress(p0, &tagged_frame(b, a, 1, 0, 10), 0);
    assert_eq!(sw.buffer_deliver_queue_len(), 0);
}
