//! VLAN tag policy and per-VID rate limiting.

/// Per-port tag-handling policy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TagPolicy {
    /// Packets must arrive tagged; untagged frames are dropped.
    Mandatory,
    /// Packets must arrive untagged; the port's default VID is assigned.
    /// Tagged frames are dropped.
    Restrict,
    /// Either is accepted; a missing tag is filled from the port default.
    AdmitAll,
    /// Only the tag's priority field is honored; VID is always overridden
    /// by the port default.
    Priority,
}

/// What to do when a VID's token bucket runs dry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RateViolation {
    /// Drop the packet outright.
    Strict,
    /// Forward anyway, but rewrite the packet's priority to the lowest
    /// class.
    Demote,
}

/// Lowest priority class, used by `RateViolation::Demote`.
pub const LOWEST_PRIORITY: u8 = 0;

#[derive(Clone, Copy, Debug)]
pub struct PortVlanConfig {
    pub policy: TagPolicy,
    pub default_vid: u16,
    pub default_priority: u8,
}

impl Default for PortVlanConfig {
    fn default() -> Self {
        Self {
            policy: TagPolicy::AdmitAll,
            default_vid: 1,
            default_priority: 0,
        }
    }
}

/// Outcome of applying a port's ingress tag policy.
pub enum TagDecision {
    Accept { vid: u16, priority: u8 },
    Drop,
}

impl PortVlanConfig {
    /// Apply this port's ingress policy to an observed (optional) tag.
    pub fn ingress(&self, tag: Option<(u16, u8)>) -> TagDecision {
        match (self.policy, tag) {
            (TagPolicy::Mandatory, None) => TagDecision::Drop,
            (TagPolicy::Mandatory, Some((vid, priority))) => TagDecision::Accept { vid, priority },
            (TagPolicy::Restrict, Some(_)) => TagDecision::Drop,
            (TagPolicy::Restrict, None) => TagDecision::Accept {
                vid: self.default_vid,
                priority: self.default_priority,
            },
            (TagPolicy::AdmitAll, Some((vid, priority))) => TagDecision::Accept { vid, priority },
            (TagPolicy::AdmitAll, None) => TagDecision::Accept {
                vid: self.default_vid,
                priority: self.default_priority,
            },
            (TagPolicy::Priority, Some((_, priority))) => TagDecision::Accept {
                vid: self.default_vid,
                priority,
            },
            (TagPolicy::Priority, None) => TagDecision::Accept {
                vid: self.default_vid,
                priority: self.default_priority,
            },
        }
    }
}

/// Token-bucket rate record for one VID.
pub struct VlanRate {
    pub fill_rate_bytes_per_ms: u32,
    pub bucket_size_bytes: u32,
    tokens: i64,
    pub policy: RateViolation,
    last_fill_millis: u64,
}

impl VlanRate {
    pub fn new(fill_rate_bytes_per_ms: u32, bucket_size_bytes: u32, policy: RateViolation) -> Self {
        Self {
            fill_rate_bytes_per_ms,
            bucket_size_bytes,
            tokens: bucket_size_bytes as i64,
            policy,
            last_fill_millis: 0,
        }
    }

    fn refill(&mut self, now_millis: u64) {
        let elapsed = now_millis.saturating_sub(self.last_fill_millis);
        if elapsed == 0 {
            return;
        }
        let added = elapsed.saturating_mul(self.fill_rate_bytes_per_ms as u64) as i64;
        self.tokens = (self.tokens + added).min(self.bucket_size_bytes as i64);
        self.last_fill_millis = now_millis;
    }

    /// Charge `len` bytes at `now_millis`. Returns the priority (if any)
    /// the packet should be forwarded with, or `None` if it must be
    /// dropped.
    pub fn charge(&mut self, len: usize, priority: u8, now_millis: u64) -> Option<u8> {
        self.refill(now_millis);
        self.tokens -= len as i64;
        if self.tokens < 0 {
            match self.policy {
                RateViolation::Strict => {
                    self.tokens += len as i64; // refund: the packet never went out
                    None
                }
                RateViolation::Demote => Some(LOWEST_PRIORITY),
            }
        } else {
            Some(priority)
        }
    }

    pub fn tokens(&self) -> i64 {
        self.tokens
    }
}

/// Whether resetting the VLAN table should open every VID to every port
/// or leave every VID's membership empty.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResetMode {
    Open,
    Lockdown,
}

/// Per-VID membership masks and rate records, indexed by VID.
pub struct VlanTable {
    port_count: usize,
    membership: std::collections::HashMap<u16, u32>,
    rates: std::collections::HashMap<u16, VlanRate>,
}

impl VlanTable {
    pub fn new(port_count: usize, mode: ResetMode) -> Self {
        let mut membership = std::collections::HashMap::new();
        if mode == ResetMode::Open {
            let mask = if port_count >= 32 {
                u32::MAX
            } else {
                (1u32 << port_count) - 1
            };
            membership.insert(1, mask);
        }
        Self {
            port_count,
            membership,
            rates: std::collections::HashMap::new(),
        }
    }

    pub fn member_mask(&self, vid: u16) -> u32 {
        self.membership.get(&vid).copied().unwrap_or(0)
    }

    pub fn add_member(&mut self, vid: u16, port: u8) {
        debug_assert!((port as usize) < self.port_count);
        *self.membership.entry(vid).or_insert(0) |= 1 << port;
    }

    pub fn remove_member(&mut self, vid: u16, port: u8) {
        if let Some(mask) = self.membership.get_mut(&vid) {
            *mask &= !(1 << port);
        }
    }

    pub fn set_rate(&mut self, vid: u16, rate: VlanRate) {
        self.rates.insert(vid, rate);
    }

    pub fn rate_mut(&mut self, vid: u16) -> Option<&mut VlanRate> {
        self.rates.get_mut(&vid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mandatory_drops_untagged() {
        let cfg = PortVlanConfig {
            policy: TagPolicy::Mandatory,
            ..Default::default()
        };
        assert!(matches!(cfg.ingress(None), TagDecision::Drop));
    }

    #[test]
    fn restrict_drops_tagged() {
        let cfg = PortVlanConfig {
            policy: TagPolicy::Restrict,
            ..Default::default()
        };
        assert!(matches!(cfg.ingress(Some((5, 0))), TagDecision::Drop));
    }

    #[test]
    fn priority_policy_overrides_vid() {
        let cfg = PortVlanConfig {
            policy: TagPolicy::Priority,
            default_vid: 9,
            default_priority: 0,
        };
        match cfg.ingress(Some((5, 3))) {
            TagDecision::Accept { vid, priority } => {
                assert_eq!(vid, 9);
                assert_eq!(priority, 3);
            }
            TagDecision::Drop => panic!("should accept"),
        }
    }

    #[test]
    fn token_bucket_strict_drops_and_refunds() {
        let mut rate = VlanRate::new(0, 100, RateViolation::Strict);
        assert_eq!(rate.charge(50, 7, 0), Some(7));
        assert_eq!(rate.charge(60, 7, 0), None); // would go negative
        assert_eq!(rate.tokens(), 50); // refunded
    }

    #[test]
    fn token_bucket_demote_forwards_at_lowest_priority() {
        let mut rate = VlanRate::new(0, 10, RateViolation::Demote);
        assert_eq!(rate.charge(20, 7, 0), Some(LOWEST_PRIORITY));
    }

    #[test]
    fn token_bucket_refills_over_time() {
        let mut rate = VlanRate::new(10, 100, RateViolation::Strict);
        rate.charge(100, 0, 0);
        assert_eq!(rate.charge(1, 0, 0), None);
        assert_eq!(rate.charge(50, 0, 10), Some(0)); // 10ms * 10 bytes/ms = 100 tokens refilled
    }

    #[test]
    fn open_reset_admits_every_port_to_default_vid() {
        let table = VlanTable::new(4, ResetMode::Open);
        assert_eq!(table.member_mask(1), 0b1111);
    }

    #[test]
    fn lockdown_reset_admits_nobody() {
        let table = VlanTable::new(4, ResetMode::Lockdown);
        assert_eq!(table.member_mask(1), 0);
    }
}
