//! CBOR (RFC 8949) encode/decode facade.
//!
//! Two typed façades sit over a codec crate — `MapWriter`/`MapReader` for
//! dictionaries, `ListWriter`/`ListReader` for sequences. `minicbor` is a
//! small, no-std-friendly CBOR codec (the same ecosystem choice
//! `oxidecomputer/hubris` makes for its own wire format). Rather than a
//! generic `MapWriter<K>` monomorphized per key type, [`MapWriter`]/
//! [`MapReader`] take `impl Into<Key>` at each call site — a CBOR map can
//! mix integer and string keys in the same object on the wire, so this
//! is both more idiomatic and strictly more general than picking one `K`
//! per writer.

use minicbor::data::Type;
use minicbor::{Decoder, Encoder};

use crate::{Error, Result};

/// A CBOR map key: either a small integer or a short text string.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Key {
    Int(i64),
    Text(String),
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}
impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Key::Int(v as i64)
    }
}
impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Text(v.to_string())
    }
}

fn encode_key(enc: &mut Encoder<&mut Vec<u8>>, key: &Key) -> Result<()> {
    match key {
        Key::Int(v) => enc.i64(*v).map(|_| ()),
        Key::Text(s) => enc.str(s).map(|_| ()),
    }
    .map_err(|_| Error::Config("cbor encode failed"))
}

/// Builds one CBOR map, writing into an internal buffer and validating the
/// final size against `capacity` at [`MapWriter::finalize`].
pub struct MapWriter {
    buf: Vec<u8>,
    capacity: usize,
    count: u64,
    /// Placeholder byte index for the definite-length map header, patched
    /// in `finalize` once the final entry count is known.
    header_at: usize,
}

impl MapWriter {
    /// `capacity` is the maximum encoded size this writer's caller can
    /// transmit (a telemetry sink's MTU, typically).
    pub fn new(capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(capacity.min(256));
        let header_at = buf.len();
        buf.push(0); // overwritten by finalize() with the real map header
        Self {
            buf,
            capacity,
            count: 0,
            header_at,
        }
    }

    pub fn insert_int(&mut self, key: impl Into<Key>, value: i64) -> Result<()> {
        let key = key.into();
        let mut enc = Encoder::new(&mut self.buf);
        encode_key(&mut enc, &key)?;
        enc.i64(value).map_err(|_| Error::Config("cbor encode failed"))?;
        self.count += 1;
        Ok(())
    }

    pub fn insert_float(&mut self, key: impl Into<Key>, value: f64) -> Result<()> {
        let key = key.into();
        let mut enc = Encoder::new(&mut self.buf);
        encode_key(&mut enc, &key)?;
        enc.f64(value).map_err(|_| Error::Config("cbor encode failed"))?;
        self.count += 1;
        Ok(())
    }

    pub fn insert_bool(&mut self, key: impl Into<Key>, value: bool) -> Result<()> {
        let key = key.into();
        let mut enc = Encoder::new(&mut self.buf);
        encode_key(&mut enc, &key)?;
        enc.bool(value).map_err(|_| Error::Config("cbor encode failed"))?;
        self.count += 1;
        Ok(())
    }

    pub fn insert_null(&mut self, key: impl Into<Key>) -> Result<()> {
        let key = key.into();
        let mut enc = Encoder::new(&mut self.buf);
        encode_key(&mut enc, &key)?;
        enc.null().map_err(|_| Error::Config("cbor encode failed"))?;
        self.count += 1;
        Ok(())
    }

    pub fn insert_text(&mut self, key: impl Into<Key>, value: &str) -> Result<()> {
        let key = key.into();
        let mut enc = Encoder::new(&mut self.buf);
        encode_key(&mut enc, &key)?;
        enc.str(value).map_err(|_| Error::Config("cbor encode failed"))?;
        self.count += 1;
        Ok(())
    }

    pub fn insert_bytes(&mut self, key: impl Into<Key>, value: &[u8]) -> Result<()> {
        let key = key.into();
        let mut enc = Encoder::new(&mut self.buf);
        encode_key(&mut enc, &key)?;
        enc.bytes(value).map_err(|_| Error::Config("cbor encode failed"))?;
        self.count += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Patch in the definite-length map header and return the encoded
    /// bytes. Errors if the result would exceed `capacity`.
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        let mut header = Vec::with_capacity(9);
        Encoder::new(&mut header)
            .map(self.count)
            .map_err(|_| Error::Config("cbor map header encode failed"))?;
        self.buf.splice(self.header_at..self.header_at + 1, header);
        if self.buf.len() > self.capacity {
            return Err(Error::ResourceExhausted("cbor map exceeds buffer capacity"));
        }
        Ok(self.buf)
    }
}

/// Reads one top-level CBOR map, resolving keys on demand. Distinguishes
/// "key absent" (`Ok(None)`) from "key present with the wrong type"
/// (`Err`).
pub struct MapReader<'b> {
    bytes: &'b [u8],
}

impl<'b> MapReader<'b> {
    pub fn new(bytes: &'b [u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        dec.map().map_err(|_| Error::PeerProtocol("cbor: expected a map"))?;
        Ok(Self { bytes })
    }

    fn decoder(&self) -> Decoder<'b> {
        let mut dec = Decoder::new(self.bytes);
        let _ = dec.map();
        dec
    }

    fn find(&self, key: &Key) -> Result<Option<Decoder<'b>>> {
        let mut dec = self.decoder();
        loop {
            match dec.datatype() {
                Ok(Type::Break) => return Ok(None),
                Err(_) => return Ok(None),
                Ok(_) => {}
            }
            let candidate = match key {
                Key::Int(_) => dec.i64().ok().map(Key::Int),
                Key::Text(_) => dec.str().ok().map(|s| Key::Text(s.to_string())),
            };
            let Some(candidate) = candidate else {
                // Key shape didn't match; skip this key and its value.
                dec.skip().map_err(|_| Error::PeerProtocol("cbor: malformed key"))?;
                dec.skip().map_err(|_| Error::PeerProtocol("cbor: malformed value"))?;
                continue;
            };
            if &candidate == key {
                return Ok(Some(dec));
            }
            dec.skip().map_err(|_| Error::PeerProtocol("cbor: malformed value"))?;
        }
    }

    pub fn get_int(&self, key: impl Into<Key>) -> Result<Option<i64>> {
        let key = key.into();
        match self.find(&key)? {
            None => Ok(None),
            Some(mut dec) => dec.i64().map(Some).map_err(|_| Error::PeerProtocol("cbor: value is not an int")),
        }
    }

    pub fn get_float(&self, key: impl Into<Key>) -> Result<Option<f64>> {
        let key = key.into();
        match self.find(&key)? {
            None => Ok(None),
            Some(mut dec) => dec.f64().map(Some).map_err(|_| Error::PeerProtocol("cbor: value is not a float")),
        }
    }

    pub fn get_bool(&self, key: impl Into<Key>) -> Result<Option<bool>> {
        let key = key.into();
        match self.find(&key)? {
            None => Ok(None),
            Some(mut dec) => dec.bool().map(Some).map_err(|_| Error::PeerProtocol("cbor: value is not a bool")),
        }
    }

    pub fn get_text(&self, key: impl Into<Key>) -> Result<Option<String>> {
        let key = key.into();
        match self.find(&key)? {
            None => Ok(None),
            Some(mut dec) => dec
                .str()
                .map(|s| Some(s.to_string()))
                .map_err(|_| Error::PeerProtocol("cbor: value is not a string")),
        }
    }

    pub fn is_null(&self, key: impl Into<Key>) -> Result<bool> {
        let key = key.into();
        match self.find(&key)? {
            None => Ok(false),
            Some(mut dec) => Ok(matches!(dec.datatype(), Ok(Type::Null))),
        }
    }
}

/// An ordered CBOR sequence, used for list-shaped telemetry fields and
/// CoAP payloads that aren't maps.
pub struct ListWriter {
    buf: Vec<u8>,
}

impl ListWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn push_int(&mut self, value: i64) -> Result<()> {
        Encoder::new(&mut self.buf).i64(value).map_err(|_| Error::Config("cbor encode failed"))?;
        Ok(())
    }

    pub fn push_float(&mut self, value: f64) -> Result<()> {
        Encoder::new(&mut self.buf).f64(value).map_err(|_| Error::Config("cbor encode failed"))?;
        Ok(())
    }

    pub fn push_bytes(&mut self, value: &[u8]) -> Result<()> {
        Encoder::new(&mut self.buf).bytes(value).map_err(|_| Error::Config("cbor encode failed"))?;
        Ok(())
    }

    /// Finalize with the known element count, producing a definite-length
    /// CBOR array.
    pub fn finalize(self, count: u64) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.buf.len() + 9);
        Encoder::new(&mut out).array(count).map_err(|_| Error::Config("cbor array header encode failed"))?;
        out.extend_from_slice(&self.buf);
        Ok(out)
    }
}

impl Default for ListWriter {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ListReader<'b> {
    bytes: &'b [u8],
    len: Option<u64>,
}

impl<'b> ListReader<'b> {
    pub fn new(bytes: &'b [u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let len = dec.array().map_err(|_| Error::PeerProtocol("cbor: expected an array"))?;
        Ok(Self { bytes, len })
    }

    pub fn len(&self) -> Option<u64> {
        self.len
    }

    pub fn ints(&self) -> Result<Vec<i64>> {
        let mut dec = Decoder::new(self.bytes);
        dec.array().map_err(|_| Error::PeerProtocol("cbor: expected an array"))?;
        let mut out = Vec::new();
        loop {
            match dec.datatype() {
                Ok(Type::Break) | Err(_) => break,
                Ok(_) => out.push(dec.i64().map_err(|_| Error::PeerProtocol("cbor: element is not an int"))?),
            }
            if self.len.map(|n| out.len() as u64 >= n).unwrap_or(false) {
                break;
            }
        }
        Ok(out)
    }
}
