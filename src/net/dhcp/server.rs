//! DHCP server transaction handler.
//!
//! Stateless per-transaction: each `handle_*` call looks at the pool,
//! decides, and returns. The only persistent state is the pool itself and
//! the incremental sweep cursor.

use crc::{Crc, CRC_32_ISO_HDLC};

use super::options::{DhcpOptions, MessageType};
use crate::net::addr::{Ipv4Addr, MacAddr};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

fn client_hash(client_id: Option<&[u8]>, chaddr: &MacAddr) -> u32 {
    match client_id {
        Some(id) => CRC32.checksum(id),
        None => CRC32.checksum(&chaddr.0),
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum EntryState {
    Free,
    Offered,
    Bound,
    /// Declined by a client; reserved against re-offering to anyone else
 /// until `expires_at_millis`.
    Declined,
}

struct PoolEntry {
    ip: Ipv4Addr,
    state: EntryState,
    client_hash: u32,
    expires_at_millis: u64,
}

pub struct ServerConfig {
    pub subnet_mask: Ipv4Addr,
    pub router: Option<Ipv4Addr>,
    pub dns_server: Option<Ipv4Addr>,
    pub domain_name: Option<String>,
    pub default_lease_secs: u32,
    pub max_lease_secs: u32,
}

pub struct DhcpServer {
    server_id: Ipv4Addr,
    config: ServerConfig,
    pool: Vec<PoolEntry>,
    sweep_cursor: usize,
}

impl DhcpServer {
    pub fn new(server_id: Ipv4Addr, config: ServerConfig, first: Ipv4Addr, count: usize) -> Self {
        let base = u32::from(first);
        let pool = (0..count)
            .map(|i| PoolEntry {
                ip: Ipv4Addr::from(base + i as u32),
                state: EntryState::Free,
                client_hash: 0,
                expires_at_millis: 0,
            })
            .collect();
        Self {
            server_id,
            config,
            pool,
            sweep_cursor: 0,
        }
    }

    fn find_by_hash(&self, hash: u32, states: &[EntryState]) -> Option<usize> {
        self.pool
            .iter()
            .position(|e| e.client_hash == hash && states.contains(&e.state))
    }

    fn find_free_or_expired(&self, now_millis: u64) -> Option<usize> {
        self.pool
            .iter()
            .position(|e| e.state == EntryState::Free || (e.state != EntryState::Declined && e.expires_at_millis <= now_millis))
    }

    fn base_options(&self, lease_secs: u32) -> DhcpOptions {
        DhcpOptions {
            subnet_mask: Some(self.config.subnet_mask),
            router: self.config.router,
            dns_server: self.config.dns_server,
            domain_name: self.config.domain_name.clone(),
            lease_time: Some(lease_secs),
            server_id: Some(self.server_id),
            ..Default::default()
        }
    }

    /// `DISCOVER`: reuse the client's existing lease if it has one,
    /// otherwise the first free-or-expired pool slot. Returns the `OFFER`
    /// options, or `None` if the pool is exhausted.
    pub fn handle_discover(&mut self, now_millis: u64, chaddr: MacAddr, opts: &DhcpOptions) -> Option<DhcpOptions> {
        let hash = client_hash(opts.client_id.as_deref(), &chaddr);
        let idx = self
            .find_by_hash(hash, &[EntryState::Bound, EntryState::Offered])
            .or_else(|| self.find_free_or_expired(now_millis))?;

        let lease_secs = self.config.default_lease_secs;
        let entry = &mut self.pool[idx];
        entry.state = EntryState::Offered;
        entry.client_hash = hash;
        entry.expires_at_millis = now_millis + lease_secs as u64 * 1000;

        let mut reply = self.base_options(lease_secs);
        reply.message_type = Some(MessageType::Offer);
        reply.requested_ip = Some(self.pool[idx].ip);
        Some(reply)
    }

    /// `REQUEST`: grant if the address is free or already owned by this
    /// client; otherwise `NAK` (`None`).
    pub fn handle_request(&mut self, now_millis: u64, chaddr: MacAddr, opts: &DhcpOptions) -> Option<DhcpOptions> {
        let hash = client_hash(opts.client_id.as_deref(), &chaddr);
        let requested = opts.requested_ip?;
        let idx = self.pool.iter().position(|e| e.ip == requested)?;

        let ownable = {
            let entry = &self.pool[idx];
            match entry.state {
                EntryState::Free => true,
                EntryState::Offered | EntryState::Bound => entry.client_hash == hash,
                EntryState::Declined => entry.client_hash == hash,
            }
        };
        if !ownable {
            return None; // NAK
        }

        let lease_secs = self.config.default_lease_secs;
        let entry = &mut self.pool[idx];
        entry.state = EntryState::Bound;
        entry.client_hash = hash;
        entry.expires_at_millis = now_millis + lease_secs as u64 * 1000;

        let mut reply = self.base_options(lease_secs);
        reply.message_type = Some(MessageType::Ack);
        reply.requested_ip = Some(requested);
        Some(reply)
    }

    /// `DECLINE`: burn the offered address against this client-id for
 /// `max_lease`.
    pub fn handle_decline(&mut self, now_millis: u64, chaddr: MacAddr, opts: &DhcpOptions) {
        let hash = client_hash(opts.client_id.as_deref(), &chaddr);
        let Some(declined) = opts.requested_ip else { return };
        if let Some(idx) = self.pool.iter().position(|e| e.ip == declined) {
            let entry = &mut self.pool[idx];
            entry.state = EntryState::Declined;
            entry.client_hash = hash;
            entry.expires_at_millis = now_millis + self.config.max_lease_secs as u64 * 1000;
        }
    }

    /// `RELEASE`: free the address only if the client-id matches.
    pub fn handle_release(&mut self, chaddr: MacAddr, opts: &DhcpOptions) {
        let hash = client_hash(opts.client_id.as_deref(), &chaddr);
        if let Some(released) = opts.requested_ip {
            if let Some(idx) = self.pool.iter().position(|e| e.ip == released && e.client_hash == hash) {
                let entry = &mut self.pool[idx];
                entry.state = EntryState::Free;
                entry.expires_at_millis = 0;
            }
        }
    }

    /// `INFORM`: return subnet parameters without binding an address.
    pub fn handle_inform(&self) -> DhcpOptions {
        let mut reply = self.base_options(0);
        reply.message_type = Some(MessageType::Ack);
        reply.lease_time = None;
        reply
    }

    /// Visit up to `batch` pool slots starting from the rotating cursor,
    /// freeing any that have expired. The sweep is incremental to
    /// amortize cost; time arithmetic uses unsigned subtraction so
    /// counter wrap under 2^31 seconds is harmless.
    pub fn sweep(&mut self, now_millis: u64, batch: usize) {
        if self.pool.is_empty() {
            return;
        }
        for _ in 0..batch.min(self.pool.len()) {
            let idx = self.sweep_cursor % self.pool.len();
            self.sweep_cursor = self.sweep_cursor.wrapping_add(1);
            let entry = &mut self.pool[idx];
            // Unsigned modular subtraction: treats `now_millis` as having
            // already passed `expires_at_millis` unless the gap looks like
            // counter wrap (i.e. the difference is absurdly large).
            let elapsed = now_millis.wrapping_sub(entry.expires_at_millis);
            if entry.state != EntryState::Free && elapsed < (1u64 << 63) {
                entry.state = EntryState::Free;
                entry.client_hash = 0;
            }
        }
    }

    pub fn free_count(&self) -> usize {
        self.pool.iter().filter(|e| e.state == EntryState::Free).count()
    }
}
