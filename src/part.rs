// Grounded on the teacher's Message/Request/Reply newtypes and fuurin's
// byte-oriented Part<T> wire type.

use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// A single message payload, cheaply shareable between the caller and the
/// session thread without copying.
///
/// Mirrors `zmq::Message` closely enough to convert in both directions, but
/// carries an `Arc<[u8]>` instead of an owned buffer so a part handed to a
/// broadcast fan-out (radio publish to many groups) doesn't need to be
/// cloned per destination.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Part {
    bytes: Arc<[u8]>,
}

impl Part {
    pub fn empty() -> Part {
        Part { bytes: Arc::from(&[][..]) }
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Part {
        Part { bytes: Arc::from(bytes) }
    }

    pub fn from_str(s: &str) -> Part {
        Part::from_bytes(s.as_bytes().to_vec())
    }

    pub fn from_u8(v: u8) -> Part {
        Part::from_bytes(vec![v])
    }

    pub fn from_u32(v: u32) -> Part {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, v);
        Part::from_bytes(buf.to_vec())
    }

    pub fn from_u64(v: u64) -> Part {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, v);
        Part::from_bytes(buf.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.bytes)
            .map_err(|e| Error::Part(format!("invalid utf8: {e}")))
    }

    pub fn as_u8(&self) -> Result<u8> {
        self.bytes
            .first()
            .copied()
            .ok_or_else(|| Error::Part("expected 1 byte".into()))
    }

    pub fn as_u32(&self) -> Result<u32> {
        if self.bytes.len() < 4 {
            return Err(Error::Part("expected 4 bytes".into()));
        }
        Ok(LittleEndian::read_u32(&self.bytes))
    }

    pub fn as_u64(&self) -> Result<u64> {
        if self.bytes.len() < 8 {
            return Err(Error::Part("expected 8 bytes".into()));
        }
        Ok(LittleEndian::read_u64(&self.bytes))
    }

    pub fn to_zmq_message(&self) -> zmq::Message {
        zmq::Message::from(self.bytes.as_ref())
    }

    pub fn from_zmq_message(msg: &zmq::Message) -> Part {
        Part::from_bytes(msg.to_vec())
    }
}

impl Default for Part {
    fn default() -> Part {
        Part::empty()
    }
}

/// Appends length-prefixed fields into a single packed buffer, used for
/// every multi-field frame on the wire (topics, configs, snapshot
/// verb/syncseq/payload triples).
///
/// Fixed-width integers are written as-is; strings and nested parts are
/// preceded by a 4-byte little-endian length so `Unpacker` can walk the
/// buffer without a schema.
#[derive(Default)]
pub struct Packer {
    buf: Vec<u8>,
}

impl Packer {
    pub fn new() -> Packer {
        Packer { buf: Vec::new() }
    }

    pub fn put_u8(mut self, v: u8) -> Packer {
        self.buf.push(v);
        self
    }

    pub fn put_u32(mut self, v: u32) -> Packer {
        let mut tmp = [0u8; 4];
        LittleEndian::write_u32(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    pub fn put_u64(mut self, v: u64) -> Packer {
        let mut tmp = [0u8; 8];
        LittleEndian::write_u64(&mut tmp, v);
        self.buf.extend_from_slice(&tmp);
        self
    }

    pub fn put_bool(self, v: bool) -> Packer {
        self.put_u8(v as u8)
    }

    pub fn put_bytes(mut self, data: &[u8]) -> Packer {
        let mut len = [0u8; 4];
        LittleEndian::write_u32(&mut len, data.len() as u32);
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(data);
        self
    }

    pub fn put_str(self, s: &str) -> Packer {
        self.put_bytes(s.as_bytes())
    }

    pub fn put_part(self, part: &Part) -> Packer {
        self.put_bytes(part.as_bytes())
    }

    pub fn put_fixed(mut self, data: &[u8]) -> Packer {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn finish(self) -> Part {
        Part::from_bytes(self.buf)
    }
}

/// Reads fields back out of a buffer produced by [`Packer`], in the same
/// order they were written.
pub struct Unpacker<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Unpacker<'a> {
    pub fn new(part: &'a Part) -> Unpacker<'a> {
        Unpacker { buf: part.as_bytes(), pos: 0 }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.len() < self.pos + n {
            return Err(Error::Part(format!(
                "buffer underrun: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let v = LittleEndian::read_u32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        self.need(8)?;
        let v = LittleEndian::read_u64(&self.buf[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.get_u32()? as usize;
        self.need(len)?;
        let v = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(v)
    }

    pub fn get_str(&mut self) -> Result<String> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes).map_err(|e| Error::Part(format!("invalid utf8: {e}")))
    }

    pub fn get_part(&mut self) -> Result<Part> {
        Ok(Part::from_bytes(self.get_bytes()?))
    }

    pub fn get_fixed(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_unpack_round_trips_mixed_fields() {
        let part = Packer::new()
            .put_u8(7)
            .put_u64(424242)
            .put_str("hello")
            .put_bool(true)
            .finish();

        let mut u = Unpacker::new(&part);
        assert_eq!(7, u.get_u8().unwrap());
        assert_eq!(424242, u.get_u64().unwrap());
        assert_eq!("hello", u.get_str().unwrap());
        assert!(u.get_bool().unwrap());
    }

    #[test]
    fn unpack_reports_buffer_underrun() {
        let part = Part::from_bytes(vec![1, 2]);
        let mut u = Unpacker::new(&part);
        assert!(u.get_u64().is_err());
    }
}
