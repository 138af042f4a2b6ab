//! Record codec (C1, spec.md §4.1): serialize/deserialize a session value
//! (timeout + two dictionaries) to/from a byte buffer, optionally gzipped.
//!
//! The two dictionaries are the host framework's session-items collection
//! and its static-objects collection. Their *values* are opaque blobs
//! produced by the embedding framework's own object-model codec — this
//! module only owns the ordered key→value envelope and the outer wire
//! layout, never the value bytes themselves.

use std::io::{self, Cursor, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// An ordered key→value dictionary whose values are opaque byte blobs.
/// Used for both the session-items and the static-objects collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dictionary(pub Vec<(String, Vec<u8>)>);

impl Dictionary {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.0.push((key.into(), value));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The decoded contents of a content record's `Payload` (spec.md §3/§4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct SessionValue {
    /// Session timeout, in whole minutes, as carried on the wire.
    pub timeout_minutes: i32,
    pub session_items: Option<Dictionary>,
    pub static_objects: Option<Dictionary>,
}

impl SessionValue {
    /// An uninitialized session created on first touch (spec.md §3 lifecycle):
    /// a timeout with no populated dictionaries.
    pub fn empty(timeout_minutes: i32) -> Self {
        Self { timeout_minutes, session_items: None, static_objects: None }
    }
}

/// Serializes/deserializes one dictionary's entries to/from the wire. The
/// header and outer gzip framing in [`encode_with`]/[`decode_with`] never
/// depend on a concrete dictionary representation — only on this trait —
/// so an embedding framework with its own session-item collection type
/// could supply its own codec without touching the rest of this module.
pub trait SessionDictionaryCodec {
    fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) -> io::Result<()>;
    fn read_dictionary<R: Read>(r: &mut R) -> io::Result<Dictionary>;
}

/// The trivial codec: a dictionary's values are already opaque bytes
/// (spec.md §4.1, "delegated to an external collaborator"), so this codec
/// just length-prefixes them. Used throughout this crate, since there is
/// no real web-framework dictionary type in scope here to target.
pub struct RawBytesCodec;

impl SessionDictionaryCodec for RawBytesCodec {
    fn write_dictionary(out: &mut Vec<u8>, dict: &Dictionary) -> io::Result<()> {
        out.write_all(&(dict.0.len() as u32).to_le_bytes())?;
        for (key, value) in &dict.0 {
            let key_bytes = key.as_bytes();
            out.write_all(&(key_bytes.len() as u32).to_le_bytes())?;
            out.write_all(key_bytes)?;
            out.write_all(&(value.len() as u32).to_le_bytes())?;
            out.write_all(value)?;
        }
        Ok(())
    }

    fn read_dictionary<R: Read>(r: &mut R) -> io::Result<Dictionary> {
        let count = read_u32(r)?;
        let mut entries = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let key_len = read_u32(r)? as usize;
            let mut key_bytes = vec![0u8; key_len];
            r.read_exact(&mut key_bytes)?;
            let key = String::from_utf8(key_bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let value_len = read_u32(r)? as usize;
            let mut value = vec![0u8; value_len];
            r.read_exact(&mut value)?;

            entries.push((key, value));
        }
        Ok(Dictionary(entries))
    }
}

/// Serialize `value` to the wire layout from spec.md §4.1 using `C`,
/// optionally wrapping the whole buffer in gzip at "optimal" compression.
pub fn encode_with<C: SessionDictionaryCodec>(value: &SessionValue, compress: bool) -> io::Result<Vec<u8>> {
    let mut raw = Vec::new();
    write_header_and_body::<C>(&mut raw, value)?;

    if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(&raw)?;
        encoder.finish()
    } else {
        Ok(raw)
    }
}

/// [`encode_with`] against [`RawBytesCodec`], the codec every store call in
/// this crate uses.
pub fn encode(value: &SessionValue, compress: bool) -> io::Result<Vec<u8>> {
    encode_with::<RawBytesCodec>(value, compress)
}

fn write_header_and_body<C: SessionDictionaryCodec>(out: &mut Vec<u8>, value: &SessionValue) -> io::Result<()> {
    out.write_all(&value.timeout_minutes.to_le_bytes())?;
    out.write_all(&[value.session_items.is_some() as u8])?;
    out.write_all(&[value.static_objects.is_some() as u8])?;
    if let Some(items) = &value.session_items {
        C::write_dictionary(out, items)?;
    }
    if let Some(objects) = &value.static_objects {
        C::write_dictionary(out, objects)?;
    }
    Ok(())
}

/// Deserialize `bytes` produced by [`encode_with`] using `C`. `compressed`
/// must match the flag the content record's `Compressed` field carried
/// (spec.md §4.1: the flag is per-record, not per-deployment).
pub fn decode_with<C: SessionDictionaryCodec>(bytes: &[u8], compressed: bool) -> io::Result<SessionValue> {
    if compressed {
        let mut decoder = GzDecoder::new(bytes);
        let mut raw = Vec::new();
        decoder.read_to_end(&mut raw)?;
        read_header_and_body::<C>(&mut Cursor::new(raw))
    } else {
        read_header_and_body::<C>(&mut Cursor::new(bytes))
    }
}

/// [`decode_with`] against [`RawBytesCodec`], the codec every store call in
/// this crate uses.
pub fn decode(bytes: &[u8], compressed: bool) -> io::Result<SessionValue> {
    decode_with::<RawBytesCodec>(bytes, compressed)
}

fn read_header_and_body<C: SessionDictionaryCodec>(r: &mut impl Read) -> io::Result<SessionValue> {
    let timeout_minutes = read_i32(r)?;
    let has_session_items = read_bool(r)?;
    let has_static_objects = read_bool(r)?;

    let session_items = has_session_items.then(|| C::read_dictionary(r)).transpose()?;
    let static_objects = has_static_objects.then(|| C::read_dictionary(r)).transpose()?;

    Ok(SessionValue { timeout_minutes, session_items, static_objects })
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_bool<R: Read>(r: &mut R) -> io::Result<bool> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0] != 0)
}
