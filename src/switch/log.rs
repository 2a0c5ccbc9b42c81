//! Packet-level forwarding log hook.

use crate::net::addr::MacAddr;

/// Why a forwarding decision came out the way it did.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Reason {
    Delivered,
    DroppedRunt,
    DroppedNoRoute,
    DroppedOverflow,
    DroppedVlan,
    DroppedPolicy,
    DroppedDiverted,
}

/// A cheap per-packet identifier for log correlation: not a cryptographic
/// digest, just enough of the header to tell packets apart in a trace.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(src: MacAddr, dst: MacAddr, len: usize, seq: u16) -> Self {
        let mut h = 0xcbf29ce484222325u64; // FNV-1a offset basis
        for byte in src.0.iter().chain(dst.0.iter()) {
            h ^= *byte as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        h ^= len as u64;
        h = h.wrapping_mul(0x100000001b3);
        h ^= seq as u64;
        Fingerprint(h)
    }
}

pub struct ForwardingEvent {
    pub fingerprint: Fingerprint,
    pub decision_mask: u32,
    pub reason: Reason,
}

/// Receives one event per forwarding decision. The default `log::debug!`
/// sink is installed automatically; callers may swap in their own to
/// capture events for tests or a management UI.
pub trait SwitchLogWriter {
    fn on_decision(&mut self, event: &ForwardingEvent);
}

/// Default writer: emits a debug-level log line per decision.
pub struct DebugLogWriter;

impl SwitchLogWriter for DebugLogWriter {
    fn on_decision(&mut self, event: &ForwardingEvent) {
        log::debug!(
            "fwd fp={:016x} mask={:032b} reason={:?}",
            event.fingerprint.0,
            event.decision_mask,
            event.reason
        );
    }
}

/// Writer that simply records every event, handy for test assertions.
#[derive(Default)]
pub struct RecordingLogWriter {
    pub events: Vec<(Fingerprint, u32, Reason)>,
}

impl SwitchLogWriter for RecordingLogWriter {
    fn on_decision(&mut self, event: &ForwardingEvent) {
        self.events.push((event.fingerprint, event.decision_mask, event.reason));
    }
}
