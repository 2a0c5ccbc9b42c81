//! DHCP (RFC 2131) over the BOOTP frame, tying the client and server
//! state machines to a real wire format.

pub mod client;
pub mod options;
pub mod server;

pub use client::{ClientState, DhcpClient, Lease, Outbound};
pub use options::{DhcpOptions, MessageType};
pub use server::{DhcpServer, ServerConfig};

use super::addr::MacAddr;

pub const SERVER_PORT: u16 = 67;
pub const CLIENT_PORT: u16 = 68;

const OP_BOOTREQUEST: u8 = 1;
const OP_BOOTREPLY: u8 = 2;
const HTYPE_ETHERNET: u8 = 1;
const HLEN_ETHERNET: u8 = 6;
const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
const FIXED_HEADER_LEN: usize = 236; // up to and including `file`
pub const FLAG_BROADCAST: u16 = 0x8000;

/// The fixed BOOTP header plus the variable-length options trailer
///.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BootpFrame {
    pub is_reply: bool,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub client_ip: std::net::Ipv4Addr,
    pub your_ip: std::net::Ipv4Addr,
    pub server_ip: std::net::Ipv4Addr,
    pub gateway_ip: std::net::Ipv4Addr,
    pub chaddr: MacAddr,
    pub options: DhcpOptions,
}

impl BootpFrame {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < FIXED_HEADER_LEN + MAGIC_COOKIE.len() {
            return None;
        }
        let is_reply = match buf[0] {
            OP_BOOTREQUEST => false,
            OP_BOOTREPLY => true,
            _ => return None,
        };
        if buf[1] != HTYPE_ETHERNET || buf[2] != HLEN_ETHERNET {
            return None;
        }
        let xid = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let secs = u16::from_be_bytes([buf[8], buf[9]]);
        let flags = u16::from_be_bytes([buf[10], buf[11]]);
        let read_ip = |off: usize| std::net::Ipv4Addr::new(buf[off], buf[off + 1], buf[off + 2], buf[off + 3]);
        let client_ip = read_ip(12);
        let your_ip = read_ip(16);
        let server_ip = read_ip(20);
        let gateway_ip = read_ip(24);
        let mut mac = [0u8; 6];
        mac.copy_from_slice(&buf[28..34]);

        if buf[236..240] != MAGIC_COOKIE {
            return None;
        }
        let options = DhcpOptions::parse(&buf[240..]);

        Some(Self {
            is_reply,
            xid,
            secs,
            flags,
            client_ip,
            your_ip,
            server_ip,
            gateway_ip,
            chaddr: MacAddr(mac),
            options,
        })
    }

    pub fn write(&self) -> Vec<u8> {
        let mut buf = vec![0u8; FIXED_HEADER_LEN];
        buf[0] = if self.is_reply { OP_BOOTREPLY } else { OP_BOOTREQUEST };
        buf[1] = HTYPE_ETHERNET;
        buf[2] = HLEN_ETHERNET;
        buf[3] = 0; // hops
        buf[4..8].copy_from_slice(&self.xid.to_be_bytes());
        buf[8..10].copy_from_slice(&self.secs.to_be_bytes());
        buf[10..12].copy_from_slice(&self.flags.to_be_bytes());
        buf[12..16].copy_from_slice(&self.client_ip.octets());
        buf[16..20].copy_from_slice(&self.your_ip.octets());
        buf[20..24].copy_from_slice(&self.server_ip.octets());
        buf[24..28].copy_from_slice(&self.gateway_ip.octets());
        buf[28..34].copy_from_slice(self.chaddr.as_bytes());
        // buf[34..236] (chaddr padding, sname, file) stays zeroed.
        buf.extend_from_slice(&MAGIC_COOKIE);
        self.options.write(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_discover_frame() {
        let frame = BootpFrame {
            is_reply: false,
            xid: 0xdead_beef,
            secs: 3,
            flags: FLAG_BROADCAST,
            client_ip: std::net::Ipv4Addr::UNSPECIFIED,
            your_ip: std::net::Ipv4Addr::UNSPECIFIED,
            server_ip: std::net::Ipv4Addr::UNSPECIFIED,
            gateway_ip: std::net::Ipv4Addr::UNSPECIFIED,
            chaddr: MacAddr([0x02, 0, 0, 0, 0, 1]),
            options: DhcpOptions {
                message_type: Some(MessageType::Discover),
                ..Default::default()
            },
        };
        let bytes = frame.write();
        let parsed = BootpFrame::parse(&bytes).unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn rejects_frame_missing_magic_cookie() {
        let buf = vec![0u8; FIXED_HEADER_LEN + 4];
        assert!(BootpFrame::parse(&buf).is_none());
    }
}
