//! UDP header encode/decode with the IPv4 pseudo-header checksum
//! (RFC 768). DHCP and CoAP both ride on top of this.

use super::addr::Ipv4Addr;
use super::ipv4::{checksum, protocol};

pub const HEADER_LEN: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
}

impl UdpHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_LEN {
            return None;
        }
        Some(Self {
            src_port: u16::from_be_bytes([buf[0], buf[1]]),
            dst_port: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
        })
    }

    /// Write the header and payload into `buf` (`buf.len() >=
    /// self.length as usize`), computing the pseudo-header checksum
    /// against `src`/`dst`. A checksum of zero is promoted to
    /// `0xffff` per RFC 768 (all-zero would mean "no checksum").
    pub fn write(&self, buf: &mut [u8], payload: &[u8], src: Ipv4Addr, dst: Ipv4Addr) {
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dst_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&0u16.to_be_bytes());
        buf[8..8 + payload.len()].copy_from_slice(payload);

        let mut pseudo = Vec::with_capacity(12 + buf.len());
        pseudo.extend_from_slice(&src.octets());
        pseudo.extend_from_slice(&dst.octets());
        pseudo.push(0);
        pseudo.push(protocol::UDP);
        pseudo.extend_from_slice(&self.length.to_be_bytes());
        pseudo.extend_from_slice(&buf[..8 + payload.len()]);

        let sum = match checksum(&pseudo) {
            0 => 0xffff,
            other => other,
        };
        buf[6..8].copy_from_slice(&sum.to_be_bytes());
    }
}
