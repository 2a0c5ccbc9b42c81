//! DHCP client state machine.
//!
//! Network I/O is left to the caller: every transition that needs to
//! transmit something returns an [`Outbound`] describing what to send,
//! rather than touching a socket itself — the same separation this crate
//! uses for the scheduler (`Poller` callbacks do the work; `poll.rs`
//! itself never touches I/O).

use super::options::{DhcpOptions, MessageType};
use crate::net::addr::{Ipv4Addr, MacAddr};

const INITIAL_RETRY_MILLIS: u64 = 3_000;
const MAX_RETRY_MILLIS: u64 = 64_000;
const ARP_PROBE_WAIT_MILLIS: u64 = 2_000;
const NAK_BACKOFF_MILLIS: u64 = 3_000;
/// Renew/rebind hold-back, subtracted from the lease span to schedule
/// renew at `lease - renew_hold` and rebind at `lease - rebind_hold`.
/// Conventional DHCP values: renew at 50% of the lease, rebind at 87.5%.
const REBIND_HOLD_NUM: u32 = 7;
const REBIND_HOLD_DEN: u32 = 8;
const RENEW_HOLD_NUM: u32 = 1;
const RENEW_HOLD_DEN: u32 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClientState {
    Stopped,
    Init,
    Selecting,
    Testing,
    Requesting,
    Bound,
    Renewing,
    Rebinding,
    Informing,
    Error,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Lease {
    pub address: Ipv4Addr,
    pub netmask: Option<Ipv4Addr>,
    pub gateway: Option<Ipv4Addr>,
    pub lease_seconds: u32,
    pub server_id: Ipv4Addr,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Outbound {
    Discover { xid: u32 },
    RequestBroadcast { xid: u32, requested_ip: Ipv4Addr },
    RequestUnicast { xid: u32, server: Ipv4Addr },
    Decline { xid: u32, declined_ip: Ipv4Addr },
    ArpProbe { candidate: Ipv4Addr },
    Inform { xid: u32 },
}

pub struct DhcpClient {
    mac: MacAddr,
    state: ClientState,
    xid: u32,
    offered: Option<Lease>,
    lease: Option<Lease>,
    attempt: u32,
    next_event_millis: u64,
    bound_at_millis: u64,
    renew_at_millis: u64,
    rebind_at_millis: u64,
    expire_at_millis: u64,
}

impl DhcpClient {
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            state: ClientState::Stopped,
            xid: 1,
            offered: None,
            lease: None,
            attempt: 0,
            next_event_millis: 0,
            bound_at_millis: 0,
            renew_at_millis: u64::MAX,
            rebind_at_millis: u64::MAX,
            expire_at_millis: u64::MAX,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn lease(&self) -> Option<&Lease> {
        self.lease.as_ref()
    }

    fn next_xid(&mut self) -> u32 {
        self.xid = self.xid.wrapping_add(1);
        self.xid
    }

    /// Enter `INIT`, armed to fire a `DISCOVER` on the next `tick()`.
    pub fn start(&mut self, now_millis: u64) {
        self.state = ClientState::Init;
        self.attempt = 0;
        self.next_event_millis = now_millis;
    }

    /// Enter the out-of-band `INFORM` path against an externally assigned
 /// address.
    pub fn inform(&mut self, now_millis: u64) -> Outbound {
        self.state = ClientState::Informing;
        self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
        Outbound::Inform { xid: self.next_xid() }
    }

    /// Drive timer-based transitions. Returns what to transmit, if
    /// anything, now that `now_millis` has arrived.
    pub fn tick(&mut self, now_millis: u64) -> Option<Outbound> {
        if now_millis < self.next_event_millis {
            return None;
        }
        match self.state {
            ClientState::Init => {
                self.state = ClientState::Selecting;
                self.attempt = 0;
                self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
                Some(Outbound::Discover { xid: self.next_xid() })
            }
            ClientState::Selecting => {
                self.attempt += 1;
                let backoff = (INITIAL_RETRY_MILLIS << self.attempt.min(5)).min(MAX_RETRY_MILLIS);
                self.next_event_millis = now_millis + backoff;
                Some(Outbound::Discover { xid: self.xid })
            }
            ClientState::Testing => {
                // No ARP reply arrived within the probe window: proceed.
                self.state = ClientState::Requesting;
                self.attempt = 0;
                self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
                let ip = self.offered.as_ref().map(|l| l.address).unwrap_or(Ipv4Addr::UNSPECIFIED);
                Some(Outbound::RequestBroadcast {
                    xid: self.xid,
                    requested_ip: ip,
                })
            }
            ClientState::Requesting => {
                self.attempt += 1;
                let backoff = (INITIAL_RETRY_MILLIS << self.attempt.min(5)).min(MAX_RETRY_MILLIS);
                self.next_event_millis = now_millis + backoff;
                let ip = self.offered.as_ref().map(|l| l.address).unwrap_or(Ipv4Addr::UNSPECIFIED);
                Some(Outbound::RequestBroadcast {
                    xid: self.xid,
                    requested_ip: ip,
                })
            }
            ClientState::Bound => {
                if now_millis >= self.renew_at_millis {
                    self.state = ClientState::Renewing;
                    self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
                    let server = self.lease.as_ref().map(|l| l.server_id).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    Some(Outbound::RequestUnicast {
                        xid: self.next_xid(),
                        server,
                    })
                } else {
                    None
                }
            }
            ClientState::Renewing => {
                if now_millis >= self.rebind_at_millis {
                    self.state = ClientState::Rebinding;
                    self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
                    let ip = self.lease.as_ref().map(|l| l.address).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    Some(Outbound::RequestBroadcast {
                        xid: self.xid,
                        requested_ip: ip,
                    })
                } else {
                    self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
                    let server = self.lease.as_ref().map(|l| l.server_id).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    Some(Outbound::RequestUnicast { xid: self.xid, server })
                }
            }
            ClientState::Rebinding => {
                if now_millis >= self.expire_at_millis {
                    self.lease = None;
                    self.state = ClientState::Init;
                    self.next_event_millis = now_millis;
                    None
                } else {
                    self.next_event_millis = now_millis + INITIAL_RETRY_MILLIS;
                    let ip = self.lease.as_ref().map(|l| l.address).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    Some(Outbound::RequestBroadcast { xid: self.xid, requested_ip: ip })
                }
            }
            _ => None,
        }
    }

    /// First `OFFER` matching our transaction id: probe the address
 /// before requesting it.
    pub fn on_offer(&mut self, now_millis: u64, xid: u32, opts: &DhcpOptions) -> Option<Outbound> {
        if self.state != ClientState::Selecting || xid != self.xid {
            return None;
        }
        if opts.message_type != Some(MessageType::Offer) {
            return None;
        }
        let address = opts.requested_ip?;
        let server_id = opts.server_id?;
        self.offered = Some(Lease {
            address,
            netmask: opts.subnet_mask,
            gateway: opts.router,
            lease_seconds: opts.lease_time.unwrap_or(0),
            server_id,
        });
        self.state = ClientState::Testing;
        self.next_event_millis = now_millis + ARP_PROBE_WAIT_MILLIS;
        Some(Outbound::ArpProbe { candidate: address })
    }

    /// An ARP reply arrived during the probe window: the offered address
    /// is already in use. Decline it and restart from `INIT`.
    pub fn on_arp_conflict(&mut self, now_millis: u64) -> Option<Outbound> {
        if self.state != ClientState::Testing {
            return None;
        }
        let declined = self.offered.take()?.address;
        self.state = ClientState::Init;
        self.next_event_millis = now_millis + NAK_BACKOFF_MILLIS;
        Some(Outbound::Decline { xid: self.xid, declined_ip: declined })
    }

    /// A matching `ACK`: install the lease and schedule renew/rebind.
    pub fn on_ack(&mut self, now_millis: u64, xid: u32, opts: &DhcpOptions) {
        if !matches!(
            self.state,
            ClientState::Requesting | ClientState::Renewing | ClientState::Rebinding
        ) || xid != self.xid
        {
            return;
        }
        let address = match opts.requested_ip.or_else(|| self.offered.as_ref().map(|l| l.address)) {
            Some(a) => a,
            None => return,
        };
        let lease_seconds = opts.lease_time.unwrap_or(3600);
        let server_id = opts.server_id.unwrap_or(Ipv4Addr::UNSPECIFIED);
        self.lease = Some(Lease {
            address,
            netmask: opts.subnet_mask,
            gateway: opts.router,
            lease_seconds,
            server_id,
        });
        self.offered = None;
        self.state = ClientState::Bound;
        self.bound_at_millis = now_millis;
        let lease_millis = (lease_seconds as u64).saturating_mul(1000);
        self.renew_at_millis = now_millis
            .saturating_add(lease_millis * RENEW_HOLD_NUM as u64 / RENEW_HOLD_DEN as u64);
        self.rebind_at_millis = now_millis
            .saturating_add(lease_millis * REBIND_HOLD_NUM as u64 / REBIND_HOLD_DEN as u64);
        self.expire_at_millis = now_millis.saturating_add(lease_millis);
        self.next_event_millis = self.renew_at_millis;
    }

    /// A `NAK`: abandon whatever we were requesting and restart, with a
    /// short back-off, from `INIT`.
    pub fn on_nak(&mut self, now_millis: u64, xid: u32) {
        if !matches!(
            self.state,
            ClientState::Requesting | ClientState::Renewing | ClientState::Rebinding
        ) || xid != self.xid
        {
            return;
        }
        self.lease = None;
        self.offered = None;
        self.state = ClientState::Init;
        self.next_event_millis = now_millis + NAK_BACKOFF_MILLIS;
    }
}
