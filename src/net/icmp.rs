//! ICMP echo request/reply (ping), the minimal slice of RFC 792 this
//! crate needs.

use super::ipv4::checksum;

const TYPE_ECHO_REQUEST: u8 = 8;
const TYPE_ECHO_REPLY: u8 = 0;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IcmpKind {
    EchoRequest,
    EchoReply,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IcmpEcho {
    pub kind: IcmpKind,
    pub identifier: u16,
    pub sequence: u16,
    pub payload: Vec<u8>,
}

impl IcmpEcho {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < 8 {
            return None;
        }
        let kind = match buf[0] {
            TYPE_ECHO_REQUEST => IcmpKind::EchoRequest,
            TYPE_ECHO_REPLY => IcmpKind::EchoReply,
            _ => return None,
        };
        Some(Self {
            kind,
            identifier: u16::from_be_bytes([buf[4], buf[5]]),
            sequence: u16::from_be_bytes([buf[6], buf[7]]),
            payload: buf[8..].to_vec(),
        })
    }

    pub fn encoded_len(&self) -> usize {
        8 + self.payload.len()
    }

    pub fn write(&self, buf: &mut [u8]) {
        buf[0] = match self.kind {
            IcmpKind::EchoRequest => TYPE_ECHO_REQUEST,
            IcmpKind::EchoReply => TYPE_ECHO_REPLY,
        };
        buf[1] = 0; // code
        buf[2..4].copy_from_slice(&0u16.to_be_bytes()); // checksum placeholder
        buf[4..6].copy_from_slice(&self.identifier.to_be_bytes());
        buf[6..8].copy_from_slice(&self.sequence.to_be_bytes());
        buf[8..8 + self.payload.len()].copy_from_slice(&self.payload);
        let sum = checksum(&buf[..self.encoded_len()]);
        buf[2..4].copy_from_slice(&sum.to_be_bytes());
    }

    /// Build the reply to this echo request, swapping type and keeping
    /// identifier/sequence/payload intact.
    pub fn reply(&self) -> Self {
        Self {
            kind: IcmpKind::EchoReply,
            identifier: self.identifier,
            sequence: self.sequence,
            payload: self.payload.clone(),
        }
    }
}
