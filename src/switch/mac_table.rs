//! Source-address learning table.

use crate::net::addr::MacAddr;

#[derive(Clone, Copy, Debug)]
pub struct MacEntry {
    pub mac: MacAddr,
    pub port: u8,
    pub vid: u16,
    pub age: u32,
}

/// Fixed-capacity learning table. Unicast addresses appear at most once;
/// broadcast/multicast are never learned.
pub struct MacTable {
    entries: Vec<MacEntry>,
    capacity: usize,
}

impl MacTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Learn `mac` at `port`/`vid`, or refresh its age if already present.
    /// Broadcast and multicast sources are silently ignored. Evicts the
    /// oldest entry on overflow.
    pub fn learn(&mut self, mac: MacAddr, port: u8, vid: u16) {
        if mac.is_multicast() {
            return;
        }
        if let Some(existing) = self.entries.iter_mut().find(|e| e.mac == mac) {
            existing.port = port;
            existing.vid = vid;
            existing.age = 0;
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.push(MacEntry { mac, port, vid, age: 0 });
    }

    fn evict_oldest(&mut self) {
        if let Some((idx, _)) = self
            .entries
            .iter()
            .enumerate()
            .max_by_key(|(_, e)| e.age)
        {
            self.entries.remove(idx);
        }
    }

    pub fn lookup(&self, mac: &MacAddr) -> Option<&MacEntry> {
        self.entries.iter().find(|e| &e.mac == mac)
    }

    pub fn scan_by_port(&self, port: u8) -> impl Iterator<Item = &MacEntry> {
        self.entries.iter().filter(move |e| e.port == port)
    }

    pub fn scan_by_vid(&self, vid: u16) -> impl Iterator<Item = &MacEntry> {
        self.entries.iter().filter(move |e| e.vid == vid)
    }

    /// Age every entry by one tick, evicting any entry that reaches
    /// `max_age`.
    pub fn age_tick(&mut self, max_age: u32) {
        for e in self.entries.iter_mut() {
            e.age = e.age.saturating_add(1);
        }
        self.entries.retain(|e| e.age < max_age);
    }

    /// Human-readable dump, used by CLI tooling built on top of this
 /// crate.
    pub fn log_table(&self) {
        log::debug!("mac table: {} entries", self.entries.len());
        for e in &self.entries {
            log::debug!("  {} port={} vid={} age={}", e.mac, e.port, e.vid, e.age);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learns_and_looks_up() {
        let mut t = MacTable::new(4);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        t.learn(mac, 3, 10);
        assert_eq!(t.lookup(&mac).unwrap().port, 3);
    }

    #[test]
    fn refreshing_resets_age_without_duplicate_entry() {
        let mut t = MacTable::new(4);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        t.learn(mac, 1, 0);
        t.age_tick(100);
        t.learn(mac, 2, 0);
        assert_eq!(t.len(), 1);
        assert_eq!(t.lookup(&mac).unwrap().port, 2);
        assert_eq!(t.lookup(&mac).unwrap().age, 0);
    }

    #[test]
    fn multicast_source_never_learned() {
        let mut t = MacTable::new(4);
        t.learn(MacAddr::BROADCAST, 1, 0);
        assert!(t.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut t = MacTable::new(2);
        let a = MacAddr([2, 0, 0, 0, 0, 1]);
        let b = MacAddr([2, 0, 0, 0, 0, 2]);
        let c = MacAddr([2, 0, 0, 0, 0, 3]);
        t.learn(a, 1, 0);
        t.age_tick(1000);
        t.learn(b, 1, 0);
        t.learn(c, 1, 0); // evicts `a`, the oldest
        assert!(t.lookup(&a).is_none());
        assert!(t.lookup(&b).is_some());
        assert!(t.lookup(&c).is_some());
    }

    #[test]
    fn age_out_past_max_age() {
        let mut t = MacTable::new(4);
        let mac = MacAddr([2, 0, 0, 0, 0, 1]);
        t.learn(mac, 1, 0);
        for _ in 0..5 {
            t.age_tick(5);
        }
        assert!(t.lookup(&mac).is_none());
    }
}
