//! Host-side networking core: a chunked multi-source/multi-sink packet
//! buffer, a managed Ethernet switch with VLAN and MAC-address learning,
//! Layer 2/3/4 dispatch (Ethernet/ARP/IPv4/ICMP/UDP/DHCP), a CoAP
//! connection state machine (RFC 7252), a PTPv2 client with a chainable
//! tracking-filter chain, and a CBOR telemetry facade.
//!
//! Every subsystem is cooperative and single-threaded ([`poll::Poller`]
//! drives all of them) and carries its own timing through [`time::TimeRef`]
//! so tests can replace the wall clock with [`time::FakeClock`].
//! Resource limits throughout (chunk pools, MAC table slots, PTP
//! measurement caches) are fixed at construction time rather than
//! growing unboundedly, matching the bounded-memory posture a hosted
//! stand-in for embedded firmware is expected to keep.

pub mod buffer;
pub mod cbor;
pub mod coap;
pub mod diag;
pub mod error;
pub mod net;
pub mod poll;
pub mod ptp;
pub mod switch;
pub mod telemetry;
pub mod time;
pub mod wide;

pub use error::{Error, Result};
