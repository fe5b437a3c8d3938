//! Versioned binary encoding of changes.
//!
//! The layout is deterministic: two implementations encoding the same change
//! produce identical bytes, so the SHA-256 of the encoding can serve as the
//! change's identity. All integers are little-endian; variable-length fields
//! are length-prefixed.
//!
//! Layout (version 1):
//!
//! ```text
//! u8   format version
//! 16B  actor id
//! u64  change seq        u64 start counter      i64 timestamp millis
//! u32  message length + utf8 bytes
//! u32  dep count + 32 bytes per dependency hash (sorted)
//! u32  op count, then per operation:
//!      u64 id counter (the actor is the change's actor)
//!      u32 path segment count; per segment: tag (0 = key, 1 = elem)
//!      u8  action tag (0 = set, 1 = delete, 2 = insert, 3 = remove)
//!      ... action fields, payloads tagged (0 = scalar, 1 = map, 2 = seq)
//!      u32 pred count; per pred: u64 counter + 16B actor
//! ```
//!
//! Decoding returns a fully formed [`Change`] or a [`DecodeError`]; it never
//! partially mutates caller state.

use crate::change::Change;
use crate::hash::ChangeHash;
use orde_core::{ActorId, OpAction, OpId, Operation, Path, PathSegment, Payload, Scalar};
use thiserror::Error;

/// Wire format version written by this implementation.
pub const FORMAT_VERSION: u8 = 1;

/// Errors produced while parsing a binary change.
///
/// All of these are fatal for the one change being decoded and harmless to
/// the replica: reject, report, carry on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The version tag is not one this implementation understands.
    #[error("unknown change format version {0}")]
    UnknownVersion(u8),
    /// A length-prefixed field runs past the end of the buffer.
    #[error("change buffer truncated")]
    Truncated,
    /// Structurally invalid content.
    #[error("malformed change: {0}")]
    Malformed(&'static str),
}

/// Serialize a change to the version-1 wire format. The stored hash is not
/// part of the encoding; it is recomputed from these bytes.
pub fn encode(change: &Change) -> Vec<u8> {
    let mut w = Writer::new();
    w.u8(FORMAT_VERSION);
    w.bytes(&change.actor.to_bytes());
    w.u64(change.seq);
    w.u64(change.start_counter);
    w.i64(change.timestamp);
    w.str(&change.message);
    w.u32(change.deps.len() as u32);
    for dep in &change.deps {
        w.bytes(dep.as_bytes());
    }
    w.u32(change.ops.len() as u32);
    for op in &change.ops {
        encode_op(&mut w, op);
    }
    w.finish()
}

/// Parse a change from the wire format, recomputing its hash.
pub fn decode(bytes: &[u8]) -> Result<Change, DecodeError> {
    let mut r = Reader::new(bytes);

    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(DecodeError::UnknownVersion(version));
    }

    let actor = ActorId::from_bytes(r.array::<16>()?);
    let seq = r.u64()?;
    let start_counter = r.u64()?;
    let timestamp = r.i64()?;
    let message = r.str()?;

    let dep_count = r.u32()? as usize;
    let mut deps = Vec::with_capacity(dep_count.min(1024));
    for _ in 0..dep_count {
        deps.push(ChangeHash::from_bytes(r.array::<32>()?));
    }

    let op_count = r.u32()? as usize;
    let mut ops = Vec::with_capacity(op_count.min(1024));
    for i in 0..op_count {
        let op = decode_op(&mut r, actor)?;
        let expected = start_counter
            .checked_add(i as u64)
            .ok_or(DecodeError::Malformed("operation counter overflow"))?;
        if op.id.counter != expected {
            return Err(DecodeError::Malformed("non-contiguous operation counters"));
        }
        if op.is_self_referential() {
            return Err(DecodeError::Malformed(
                "operation references itself as predecessor",
            ));
        }
        ops.push(op);
    }

    if !r.is_exhausted() {
        return Err(DecodeError::Malformed("trailing bytes after change"));
    }

    Ok(Change {
        hash: ChangeHash::of(bytes),
        actor,
        seq,
        start_counter,
        timestamp,
        message,
        deps,
        ops,
    })
}

fn encode_op(w: &mut Writer, op: &Operation) {
    w.u64(op.id.counter);
    encode_path(w, &op.path);
    match &op.action {
        OpAction::Set { key, payload } => {
            w.u8(0);
            w.str(key);
            encode_payload(w, payload);
        }
        OpAction::Delete { key } => {
            w.u8(1);
            w.str(key);
        }
        OpAction::Insert { after, payload } => {
            w.u8(2);
            match after {
                Some(anchor) => {
                    w.u8(1);
                    encode_op_id(w, anchor);
                }
                None => w.u8(0),
            }
            encode_payload(w, payload);
        }
        OpAction::Remove { target } => {
            w.u8(3);
            encode_op_id(w, target);
        }
    }
    w.u32(op.preds.len() as u32);
    for pred in &op.preds {
        encode_op_id(w, pred);
    }
}

fn decode_op(r: &mut Reader<'_>, actor: ActorId) -> Result<Operation, DecodeError> {
    let counter = r.u64()?;
    let id = OpId::new(counter, actor);
    let path = decode_path(r)?;

    let action = match r.u8()? {
        0 => OpAction::Set {
            key: r.str()?,
            payload: decode_payload(r)?,
        },
        1 => OpAction::Delete { key: r.str()? },
        2 => {
            let after = match r.u8()? {
                0 => None,
                1 => Some(decode_op_id(r)?),
                _ => return Err(DecodeError::Malformed("bad insert anchor flag")),
            };
            OpAction::Insert {
                after,
                payload: decode_payload(r)?,
            }
        }
        3 => OpAction::Remove {
            target: decode_op_id(r)?,
        },
        _ => return Err(DecodeError::Malformed("unknown action tag")),
    };

    let pred_count = r.u32()? as usize;
    let mut preds = Vec::with_capacity(pred_count.min(1024));
    for _ in 0..pred_count {
        preds.push(decode_op_id(r)?);
    }

    Ok(Operation::new(id, path, action, preds))
}

fn encode_path(w: &mut Writer, path: &Path) {
    w.u32(path.segments().len() as u32);
    for segment in path.segments() {
        match segment {
            PathSegment::Key(key) => {
                w.u8(0);
                w.str(key);
            }
            PathSegment::Elem(id) => {
                w.u8(1);
                encode_op_id(w, id);
            }
        }
    }
}

fn decode_path(r: &mut Reader<'_>) -> Result<Path, DecodeError> {
    let count = r.u32()? as usize;
    let mut segments = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        segments.push(match r.u8()? {
            0 => PathSegment::Key(r.str()?),
            1 => PathSegment::Elem(decode_op_id(r)?),
            _ => return Err(DecodeError::Malformed("unknown path segment tag")),
        });
    }
    Ok(Path::new(segments))
}

fn encode_payload(w: &mut Writer, payload: &Payload) {
    match payload {
        Payload::Scalar(scalar) => {
            w.u8(0);
            encode_scalar(w, scalar);
        }
        Payload::Map => w.u8(1),
        Payload::Seq => w.u8(2),
    }
}

fn decode_payload(r: &mut Reader<'_>) -> Result<Payload, DecodeError> {
    match r.u8()? {
        0 => Ok(Payload::Scalar(decode_scalar(r)?)),
        1 => Ok(Payload::Map),
        2 => Ok(Payload::Seq),
        _ => Err(DecodeError::Malformed("unknown payload tag")),
    }
}

fn encode_scalar(w: &mut Writer, scalar: &Scalar) {
    match scalar {
        Scalar::Null => w.u8(0),
        Scalar::Bool(b) => {
            w.u8(1);
            w.u8(*b as u8);
        }
        Scalar::Int(i) => {
            w.u8(2);
            w.i64(*i);
        }
        Scalar::Float(f) => {
            w.u8(3);
            w.u64(f.to_bits());
        }
        Scalar::Str(s) => {
            w.u8(4);
            w.str(s);
        }
    }
}

fn decode_scalar(r: &mut Reader<'_>) -> Result<Scalar, DecodeError> {
    match r.u8()? {
        0 => Ok(Scalar::Null),
        1 => match r.u8()? {
            0 => Ok(Scalar::Bool(false)),
            1 => Ok(Scalar::Bool(true)),
            _ => Err(DecodeError::Malformed("bad boolean byte")),
        },
        2 => Ok(Scalar::Int(r.i64()?)),
        3 => Ok(Scalar::Float(f64::from_bits(r.u64()?))),
        4 => Ok(Scalar::Str(r.str()?)),
        _ => Err(DecodeError::Malformed("unknown scalar tag")),
    }
}

fn encode_op_id(w: &mut Writer, id: &OpId) {
    w.u64(id.counter);
    w.bytes(&id.actor.to_bytes());
}

fn decode_op_id(r: &mut Reader<'_>) -> Result<OpId, DecodeError> {
    let counter = r.u64()?;
    let actor = ActorId::from_bytes(r.array::<16>()?);
    Ok(OpId::new(counter, actor))
}

/// Little-endian byte writer.
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new() -> Self {
        Writer { buf: Vec::new() }
    }

    fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    fn str(&mut self, v: &str) {
        self.u32(v.len() as u32);
        self.buf.extend_from_slice(v.as_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked little-endian byte reader.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.buf.len() - self.pos < n {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes: [u8; 4] = self.take(4)?.try_into().unwrap();
        Ok(u32::from_le_bytes(bytes))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(u64::from_le_bytes(bytes))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        let bytes: [u8; 8] = self.take(8)?.try_into().unwrap();
        Ok(i64::from_le_bytes(bytes))
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        Ok(self.take(N)?.try_into().unwrap())
    }

    fn str(&mut self) -> Result<String, DecodeError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| DecodeError::Malformed("invalid utf-8 in string field"))
    }

    fn is_exhausted(&self) -> bool {
        self.pos == self.buf.len()
    }
}
