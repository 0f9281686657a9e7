//! Hand-rolled binary encoding for a node payload and the meta counters.
//!
//! Length-prefixed fields with manual `to_le_bytes`/`from_le_bytes`, no
//! `serde`, since this on-disk format is private to the crate and never
//! exchanged with anything else. A trailing CRC32 (`crc32fast`) turns a
//! torn or bit-flipped write into a detectable `Corruption` error at load
//! time instead of a silent misread.

use crate::error::{Result, VsTreeError};
use crate::model::{Meta, NodeId, Record, Vector};
use std::convert::TryInto;

const NODE_FORMAT_VERSION: u8 = 1;
const META_FORMAT_VERSION: u8 = 1;

/// Encode a node's records and children into a self-describing byte buffer.
///
/// A node is a leaf iff `children` is empty.
pub fn encode_node(records: &[Record], children: &[(Vector, NodeId)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(NODE_FORMAT_VERSION);
    push_u32(&mut buf, records.len() as u32);
    for r in records {
        push_vector(&mut buf, &r.key);
        push_bytes(&mut buf, &r.payload);
    }
    push_u32(&mut buf, children.len() as u32);
    for (pivot, nid) in children {
        push_vector(&mut buf, pivot);
        push_bytes(&mut buf, nid.as_bytes());
    }
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Decode a node payload previously produced by [`encode_node`].
pub fn decode_node(buf: &[u8]) -> Result<(Vec<Record>, Vec<(Vector, NodeId)>)> {
    check_crc(buf)?;
    let body = &buf[..buf.len() - 4];
    let mut cur = Cursor::new(body);
    let version = cur.take_u8()?;
    if version != NODE_FORMAT_VERSION {
        return Err(VsTreeError::Corruption(format!(
            "unsupported node format version {version}"
        )));
    }
    let num_records = cur.take_u32()?;
    let mut records = Vec::with_capacity(num_records as usize);
    for _ in 0..num_records {
        let key = cur.take_vector()?;
        let payload = cur.take_bytes()?.to_vec();
        records.push(Record::new(key, payload));
    }
    let num_children = cur.take_u32()?;
    let mut children = Vec::with_capacity(num_children as usize);
    for _ in 0..num_children {
        let pivot = cur.take_vector()?;
        let nid_bytes = cur.take_bytes()?;
        let nid = String::from_utf8(nid_bytes.to_vec())
            .map_err(|_| VsTreeError::Corruption("node id is not valid utf-8".into()))?;
        children.push((pivot, nid));
    }
    if !cur.is_empty() {
        return Err(VsTreeError::Corruption(
            "trailing bytes after node payload".into(),
        ));
    }
    Ok((records, children))
}

/// Encode the `{size, nodes}` meta counters.
pub fn encode_meta(meta: Meta) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 8 + 8 + 4);
    buf.push(META_FORMAT_VERSION);
    buf.extend_from_slice(&meta.size.to_le_bytes());
    buf.extend_from_slice(&meta.nodes.to_le_bytes());
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Decode meta counters previously produced by [`encode_meta`].
pub fn decode_meta(buf: &[u8]) -> Result<Meta> {
    check_crc(buf)?;
    let body = &buf[..buf.len() - 4];
    let mut cur = Cursor::new(body);
    let version = cur.take_u8()?;
    if version != META_FORMAT_VERSION {
        return Err(VsTreeError::Corruption(format!(
            "unsupported meta format version {version}"
        )));
    }
    let size = cur.take_u64()?;
    let nodes = cur.take_u64()?;
    if !cur.is_empty() {
        return Err(VsTreeError::Corruption(
            "trailing bytes after meta payload".into(),
        ));
    }
    Ok(Meta { size, nodes })
}

fn check_crc(buf: &[u8]) -> Result<()> {
    if buf.len() < 4 {
        return Err(VsTreeError::Corruption("payload shorter than crc trailer".into()));
    }
    let (body, trailer) = buf.split_at(buf.len() - 4);
    let expected = u32::from_le_bytes(trailer.try_into().unwrap());
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(VsTreeError::Corruption("crc32 mismatch".into()));
    }
    Ok(())
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn push_vector(buf: &mut Vec<u8>, v: &[f64]) {
    push_u32(buf, v.len() as u32);
    for x in v {
        buf.extend_from_slice(&x.to_le_bytes());
    }
}

fn push_bytes(buf: &mut Vec<u8>, b: &[u8]) {
    push_u32(buf, b.len() as u32);
    buf.extend_from_slice(b);
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(VsTreeError::Corruption("payload truncated".into()));
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn take_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn take_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn take_f64(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn take_vector(&mut self) -> Result<Vector> {
        let len = self.take_u32()? as usize;
        let mut v = Vec::with_capacity(len);
        for _ in 0..len {
            v.push(self.take_f64()?);
        }
        Ok(v)
    }

    fn take_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.take_u32()? as usize;
        self.take(len)
    }
}
