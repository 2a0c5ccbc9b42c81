//! DHCP option TLV codec: subnet-mask, router, DNS server, domain name,
//! lease time, message type, server IP, client-id. All options are
//! length-validated; unknown options are discarded.

use crate::net::addr::Ipv4Addr;

pub const OPT_PAD: u8 = 0;
pub const OPT_SUBNET_MASK: u8 = 1;
pub const OPT_ROUTER: u8 = 3;
pub const OPT_DNS_SERVER: u8 = 6;
pub const OPT_DOMAIN_NAME: u8 = 15;
pub const OPT_REQUESTED_IP: u8 = 50;
pub const OPT_LEASE_TIME: u8 = 51;
pub const OPT_MESSAGE_TYPE: u8 = 53;
pub const OPT_SERVER_ID: u8 = 54;
pub const OPT_PARAM_REQUEST_LIST: u8 = 55;
pub const OPT_CLIENT_ID: u8 = 61;
pub const OPT_END: u8 = 255;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl MessageType {
    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => return None,
        })
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }
}

/// Decoded option set. Every field is optional; a reader just ignores
/// whatever wasn't present, and length-invalid or unrecognized option
/// codes are skipped rather than aborting the parse.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DhcpOptions {
    pub message_type: Option<MessageType>,
    pub subnet_mask: Option<Ipv4Addr>,
    pub router: Option<Ipv4Addr>,
    pub dns_server: Option<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub requested_ip: Option<Ipv4Addr>,
    pub lease_time: Option<u32>,
    pub server_id: Option<Ipv4Addr>,
    pub client_id: Option<Vec<u8>>,
}

fn read_ipv4(buf: &[u8]) -> Option<Ipv4Addr> {
    if buf.len() != 4 {
        return None;
    }
    Some(Ipv4Addr::new(buf[0], buf[1], buf[2], buf[3]))
}

impl DhcpOptions {
    pub fn parse(buf: &[u8]) -> Self {
        let mut out = Self::default();
        let mut i = 0;
        while i < buf.len() {
            let code = buf[i];
            if code == OPT_PAD {
                i += 1;
                continue;
            }
            if code == OPT_END {
                break;
            }
            if i + 1 >= buf.len() {
                break; // truncated length byte
            }
            let len = buf[i + 1] as usize;
            let start = i + 2;
            if start + len > buf.len() {
                break; // value runs past the buffer
            }
            let value = &buf[start..start + len];
            match code {
                OPT_MESSAGE_TYPE if len == 1 => out.message_type = MessageType::from_u8(value[0]),
                OPT_SUBNET_MASK => out.subnet_mask = read_ipv4(value),
                OPT_ROUTER => out.router = read_ipv4(value),
                OPT_DNS_SERVER => out.dns_server = read_ipv4(value),
                OPT_DOMAIN_NAME => out.domain_name = std::str::from_utf8(value).ok().map(String::from),
                OPT_REQUESTED_IP => out.requested_ip = read_ipv4(value),
                OPT_LEASE_TIME if len == 4 => {
                    out.lease_time = Some(u32::from_be_bytes([value[0], value[1], value[2], value[3]]))
                }
                OPT_SERVER_ID => out.server_id = read_ipv4(value),
                OPT_CLIENT_ID => out.client_id = Some(value.to_vec()),
                _ => {} // unknown or length-mismatched: discarded
            }
            i = start + len;
        }
        out
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        if let Some(mt) = self.message_type {
            buf.extend_from_slice(&[OPT_MESSAGE_TYPE, 1, mt.to_u8()]);
        }
        if let Some(ip) = self.requested_ip {
            buf.extend_from_slice(&[OPT_REQUESTED_IP, 4]);
            buf.extend_from_slice(&ip.octets());
        }
        if let Some(ip) = self.server_id {
            buf.extend_from_slice(&[OPT_SERVER_ID, 4]);
            buf.extend_from_slice(&ip.octets());
        }
        if let Some(ip) = self.subnet_mask {
            buf.extend_from_slice(&[OPT_SUBNET_MASK, 4]);
            buf.extend_from_slice(&ip.octets());
        }
        if let Some(ip) = self.router {
            buf.extend_from_slice(&[OPT_ROUTER, 4]);
            buf.extend_from_slice(&ip.octets());
        }
        if let Some(ip) = self.dns_server {
            buf.extend_from_slice(&[OPT_DNS_SERVER, 4]);
            buf.extend_from_slice(&ip.octets());
        }
        if let Some(secs) = self.lease_time {
            buf.extend_from_slice(&[OPT_LEASE_TIME, 4]);
            buf.extend_from_slice(&secs.to_be_bytes());
        }
        if let Some(name) = &self.domain_name {
            buf.push(OPT_DOMAIN_NAME);
            buf.push(name.len() as u8);
            buf.extend_from_slice(name.as_bytes());
        }
        if let Some(id) = &self.client_id {
            buf.push(OPT_CLIENT_ID);
            buf.push(id.len() as u8);
            buf.extend_from_slice(id);
        }
        buf.push(OPT_PARAM_REQUEST_LIST);
        buf.push(3);
        buf.extend_from_slice(&[OPT_SUBNET_MASK, OPT_ROUTER, OPT_DNS_SERVER]);
        buf.push(OPT_END);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_full_option_set() {
        let opts = DhcpOptions {
            message_type: Some(MessageType::Offer),
            subnet_mask: Some(Ipv4Addr::new(255, 255, 255, 0)),
            router: Some(Ipv4Addr::new(10, 0, 0, 1)),
            dns_server: Some(Ipv4Addr::new(10, 0, 0, 2)),
            domain_name: Some("lan".into()),
            requested_ip: None,
            lease_time: Some(3600),
            server_id: Some(Ipv4Addr::new(10, 0, 0, 1)),
            client_id: Some(vec![1, 2, 3]),
        };
        let mut buf = Vec::new();
        opts.write(&mut buf);
        let parsed = DhcpOptions::parse(&buf);
        assert_eq!(parsed.message_type, opts.message_type);
        assert_eq!(parsed.subnet_mask, opts.subnet_mask);
        assert_eq!(parsed.router, opts.router);
        assert_eq!(parsed.dns_server, opts.dns_server);
        assert_eq!(parsed.domain_name, opts.domain_name);
        assert_eq!(parsed.lease_time, opts.lease_time);
        assert_eq!(parsed.server_id, opts.server_id);
        assert_eq!(parsed.client_id, opts.client_id);
    }

    #[test]
    fn unknown_option_is_skipped_not_fatal() {
        let buf = [200u8, 2, 0xaa, 0xbb, OPT_MESSAGE_TYPE, 1, 5, OPT_END];
        let parsed = DhcpOptions::parse(&buf);
        assert_eq!(parsed.message_type, Some(MessageType::Ack));
    }

    #[test]
    fn truncated_length_byte_stops_parse_cleanly() {
        let buf = [OPT_SUBNET_MASK];
        let parsed = DhcpOptions::parse(&buf);
        assert_eq!(parsed.subnet_mask, None);
    }

    #[test]
    fn value_running_past_buffer_stops_parse_cleanly() {
        let buf = [OPT_SUBNET_MASK, 4, 1, 2]; // claims 4 bytes, only 2 present
        let parsed = DhcpOptions::parse(&buf);
        assert_eq!(parsed.subnet_mask, None);
    }
}
