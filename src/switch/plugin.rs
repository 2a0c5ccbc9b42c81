//! Ingress/egress plug-in traits.

use crate::buffer::{MultiBuffer, PacketId};
use crate::{ensure, Result};

/// Which stage a `PacketView` was handed out for. Header-length changes
/// are only legal during ingress; attempting one during egress is a
/// fatal policy violation.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    Ingress,
    Egress,
}

/// What a plug-in decided to do with the packet it was handed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verdict {
    /// Let the pipeline continue (subsequent plug-ins, then forwarding).
    Continue,
    /// Claim ownership: no further forwarding happens for this packet.
    Divert,
    /// Drop the packet outright (egress plug-ins use this to clear their
    /// own bit in the destination mask without affecting other ports).
    Drop,
}

/// A mutable view onto one packet's switch-visible fields, handed to
/// plug-ins during ingress or egress.
pub struct PacketView<'a> {
    mb: &'a mut MultiBuffer,
    packet: PacketId,
    stage: Stage,
}

impl<'a> PacketView<'a> {
    pub(crate) fn new(mb: &'a mut MultiBuffer, packet: PacketId, stage: Stage) -> Self {
        Self { mb, packet, stage }
    }

    pub fn priority(&self) -> u16 {
        self.mb.packet_priority(self.packet)
    }

    pub fn set_priority(&mut self, priority: u16) {
        self.mb.set_packet_priority(self.packet, priority);
    }

    pub fn meta(&self, slot: usize) -> u32 {
        self.mb.packet_meta(self.packet, slot)
    }

    pub fn set_meta(&mut self, slot: usize, value: u32) {
        self.mb.set_packet_meta(self.packet, slot, value);
    }

    pub fn len(&self) -> usize {
        self.mb.packet_len(self.packet)
    }

    /// Declare that the on-the-wire header length changed by `delta`
    /// bytes. Only legal during ingress. This only updates the packet's
    /// recorded length, clamped to the chunk span already allocated for
    /// it (shrinking a header is always honored; growing one is, up to
    /// whatever slack the original frame's allocation left) — actual
    /// byte-level content edits are still the plug-in's own doing, this
    /// crate has no mid-packet splice primitive.
    pub fn adjust(&mut self, delta: isize) -> Result<()> {
        ensure!(
            self.stage == Stage::Ingress,
            crate::Error::PolicyViolation("header length changed during egress")
        );
        self.mb.adjust_packet_len(self.packet, delta)
    }
}

pub trait IngressPlugin {
    fn apply(&mut self, view: &mut PacketView<'_>, ingress_port: u8) -> Verdict;
}

pub trait EgressPlugin {
    fn apply(&mut self, view: &mut PacketView<'_>, egress_port: u8) -> Verdict;
}
