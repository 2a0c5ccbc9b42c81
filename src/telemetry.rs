//! Telemetry aggregation over the CBOR facade.
//!
//! A [`TelemetryAggregator`] owns a set of [`TelemetrySink`]s (transports)
//! and [`TelemetryTier`]s (sources, each on its own interval). On each
//! timer tick it fires every tier whose countdown has reached zero and
//! hands the concatenated — or, in per-tier mode, individually framed —
//! CBOR map to every sink. `TelemetryRx` is the receive side: it scans one
//! level of map keys and fans out `(key-hash, item)` pairs to watchers,
//! hashing string keys with CRC-32 so a watcher only ever compares a
//! `u32`.

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::cbor::{Key, MapReader, MapWriter};
use crate::{Error, Result};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Hash a string key down to the 32-bit value watchers compare against.
/// String keys are hashed with CRC-32; integer keys already are a single
/// 32-bit integer and hash to themselves.
pub fn key_hash(key: &Key) -> u32 {
    match key {
        Key::Int(v) => *v as u32,
        Key::Text(s) => CRC32.checksum(s.as_bytes()),
    }
}

/// A telemetry transport. Concrete senders (raw Ethernet, UDP, loopback)
/// implement this; this crate only needs the facade, not real sockets.
pub trait TelemetrySink {
    fn send(&mut self, frame: &[u8]) -> Result<()>;
}

/// A sink that appends every sent frame to an in-memory log — used by
/// tests and by a loopback "send telemetry to myself" configuration.
#[derive(Default)]
pub struct LoopbackSink {
    pub sent: Vec<Vec<u8>>,
}

impl TelemetrySink for LoopbackSink {
    fn send(&mut self, frame: &[u8]) -> Result<()> {
        self.sent.push(frame.to_vec());
        Ok(())
    }
}

/// One source of telemetry fields, polled on its own interval.
pub struct TelemetryTier {
    pub tier_id: u8,
    interval_millis: u32,
    countdown_millis: u32,
    source: Box<dyn FnMut(&mut MapWriter) -> Result<()>>,
}

impl TelemetryTier {
    pub fn new(tier_id: u8, interval_millis: u32, source: impl FnMut(&mut MapWriter) -> Result<()> + 'static) -> Self {
        Self {
            tier_id,
            interval_millis,
            countdown_millis: interval_millis,
            source: Box::new(source),
        }
    }

    fn tick(&mut self, elapsed_millis: u32) -> bool {
        self.countdown_millis = self.countdown_millis.saturating_sub(elapsed_millis);
        if self.countdown_millis == 0 {
            self.countdown_millis = self.interval_millis;
            true
        } else {
            false
        }
    }
}

/// How fired tiers are packed into outgoing frames.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EmissionMode {
    /// All tiers that fired this tick share one map; `tier-id = 0`.
    Concatenated,
    /// Each fired tier produces its own message.
    PerTier,
}

pub struct TelemetryAggregator {
    sinks: Vec<Box<dyn TelemetrySink>>,
    tiers: Vec<TelemetryTier>,
    mode: EmissionMode,
    capacity: usize,
    last_tick_millis: u64,
}

impl TelemetryAggregator {
    pub fn new(mode: EmissionMode, capacity: usize) -> Self {
        Self {
            sinks: Vec::new(),
            tiers: Vec::new(),
            mode,
            capacity,
            last_tick_millis: 0,
        }
    }

    pub fn add_sink(&mut self, sink: Box<dyn TelemetrySink>) {
        self.sinks.push(sink);
    }

    pub fn add_tier(&mut self, tier: TelemetryTier) {
        self.tiers.push(tier);
    }

    /// Every tier's interval, in milliseconds. Used so a caller can derive
    /// the minimum poll period it needs to drive.
    pub fn min_interval_millis(&self) -> Option<u32> {
        self.tiers.iter().map(|t| t.interval_millis).min()
    }

    /// Drive one timer tick at `now_millis`. Fires every tier whose
    /// countdown expired and emits to every sink per the configured mode.
    pub fn tick(&mut self, now_millis: u64) -> Result<()> {
        let elapsed = now_millis.saturating_sub(self.last_tick_millis).min(u32::MAX as u64) as u32;
        self.last_tick_millis = now_millis;
        if elapsed == 0 {
            return Ok(());
        }

        match self.mode {
            EmissionMode::Concatenated => {
                let mut writer = MapWriter::new(self.capacity);
                let mut fired = false;
                for tier in &mut self.tiers {
                    if tier.tick(elapsed) {
                        fired = true;
                        (tier.source)(&mut writer)?;
                    }
                }
                if fired {
                    let frame = writer.finalize()?;
                    self.emit(&frame)?;
                }
            }
            EmissionMode::PerTier => {
                for tier in &mut self.tiers {
                    if tier.tick(elapsed) {
                        let mut writer = MapWriter::new(self.capacity);
                        writer.insert_int("tier", tier.tier_id as i64)?;
                        (tier.source)(&mut writer)?;
                        let frame = writer.finalize()?;
                        self.emit(&frame)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, frame: &[u8]) -> Result<()> {
        for sink in &mut self.sinks {
            sink.send(frame)?;
        }
        Ok(())
    }
}

/// A receiver of one key's telemetry value.
pub trait TelemetryWatcher {
    fn on_item(&mut self, key_hash: u32, reader: &MapReader, key: &Key);
}

/// Scans one level of a received telemetry map and fans `(key-hash,
/// value)` pairs out to registered watchers.
#[derive(Default)]
pub struct TelemetryRx {
    watchers: Vec<(u32, Box<dyn TelemetryWatcher>)>,
}

impl TelemetryRx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a watcher for a specific key hash (use [`key_hash`] to
    /// compute it from the original key).
    pub fn watch(&mut self, key_hash: u32, watcher: Box<dyn TelemetryWatcher>) {
        self.watchers.push((key_hash, watcher));
    }

    /// Decode `frame` as a top-level CBOR map and dispatch every key it
    /// carries to any watcher registered for that key's hash. Integer
    /// keys 0..N and known field names are probed explicitly since CBOR
    /// doesn't expose "iterate raw keys" without re-parsing per key, which
    /// fits a fixed, known-in-advance telemetry schema.
    pub fn dispatch_known_keys(&mut self, frame: &[u8], candidate_keys: &[Key]) -> Result<()> {
        let reader = MapReader::new(frame).map_err(|_| Error::PeerProtocol("telemetry: not a cbor map"))?;
        for key in candidate_keys {
            let hash = key_hash(key);
            if reader.get_int(key.clone()).unwrap_or(None).is_none()
                && reader.get_float(key.clone()).unwrap_or(None).is_none()
                && reader.get_text(key.clone()).unwrap_or(None).is_none()
                && !reader.is_null(key.clone()).unwrap_or(false)
            {
                continue;
            }
            for (watch_hash, watcher) in &mut self.watchers {
                if *watch_hash == hash {
                    watcher.on_item(hash, &reader, key);
                }
            }
        }
        Ok(())
    }
}
