//! Reading and writing the DNS wire format.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use foldhash::{HashMap, HashMapExt};

//----------- WireReader -------------------------------------------------------

/// A bounds-checked cursor over a DNS message.
///
/// The reader always has access to the whole message, because compressed
/// names may point anywhere before the current position.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    /// The whole message.
    data: &'a [u8],

    /// The current read position.
    pos: usize,
}

impl<'a> WireReader<'a> {
    /// Construct a new [`WireReader`] at the start of `data`.
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The whole message.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// The current position.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Move to a different position.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// The number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Whether all bytes have been read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read the next `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.pos + len;
        let slice = self
            .data
            .get(self.pos..end)
            .ok_or(ProtocolError::TruncatedMessage { offset: end })?;
        self.pos = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.read_slice(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ProtocolError> {
        let s = self.read_slice(2)?;
        Ok(u16::from_be_bytes([s[0], s[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ProtocolError> {
        let s = self.read_slice(4)?;
        Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    /// Read a 48-bit unsigned integer, as used for TSIG timestamps.
    pub fn read_u48(&mut self) -> Result<u64, ProtocolError> {
        let s = self.read_slice(6)?;
        Ok(s.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
    }
}

//----------- WireWriter -------------------------------------------------------

/// A growable buffer for composing DNS messages.
///
/// The writer remembers the offsets of names it has written so that later
/// names can be compressed against them.
#[derive(Debug, Default)]
pub struct WireWriter {
    /// The message built so far.
    buf: BytesMut,

    /// Offsets of previously written name suffixes.
    ///
    /// Keys are the lowercase, uncompressed wire form of each suffix.
    names: HashMap<Vec<u8>, u16>,
}

impl WireWriter {
    /// Construct a new, empty [`WireWriter`].
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            names: HashMap::new(),
        }
    }

    /// The number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    /// Write the low 48 bits of `value`.
    pub fn put_u48(&mut self, value: u64) {
        self.buf.put_slice(&value.to_be_bytes()[2..]);
    }

    pub fn put_slice(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    /// Overwrite a previously written `u16`.
    ///
    /// ## Panics
    ///
    /// Panics if `offset + 2` exceeds the written length.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        self.buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
    }

    /// Look up the offset of a previously written name suffix.
    pub(crate) fn lookup_name(&self, suffix: &[Box<[u8]>]) -> Option<u16> {
        self.names.get(&suffix_key(suffix)).copied()
    }

    /// Remember that a name suffix starts at the current position.
    ///
    /// Positions beyond the reach of a compression pointer are ignored.
    pub(crate) fn remember_name(&mut self, suffix: &[Box<[u8]>]) {
        if let Ok(offset) = u16::try_from(self.buf.len()) {
            if offset < 0x4000 {
                self.names.entry(suffix_key(suffix)).or_insert(offset);
            }
        }
    }

    /// Finish writing, returning the composed bytes.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

fn suffix_key(suffix: &[Box<[u8]>]) -> Vec<u8> {
    let mut key = Vec::new();
    for label in suffix {
        key.push(label.len() as u8);
        key.extend(label.iter().map(u8::to_ascii_lowercase));
    }
    key
}

//============ Errors ==========================================================

//----------- ProtocolError ----------------------------------------------------

/// Malformed or truncated wire data.
///
/// These errors are always fatal to the operation that encountered them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The data ended before a complete structure could be read.
    TruncatedMessage {
        /// The offset that could not be reached.
        offset: usize,
    },

    /// A compression pointer led back to a name already being read.
    CompressionLoop {
        /// The offset of the offending pointer.
        offset: usize,
    },

    /// The data was inconsistent.
    MalformedMessage {
        /// The offset where the inconsistency was detected.
        offset: usize,

        /// What was wrong.
        reason: &'static str,
    },
}

impl ProtocolError {
    pub(crate) const fn malformed(offset: usize, reason: &'static str) -> Self {
        Self::MalformedMessage { offset, reason }
    }
}

impl std::error::Error for ProtocolError {}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TruncatedMessage { offset } => {
                write!(f, "the message is truncated (needed byte {offset})")
            }
            Self::CompressionLoop { offset } => {
                write!(f, "the message contains a compression loop at offset {offset}")
            }
            Self::MalformedMessage { offset, reason } => {
                write!(f, "the message is malformed at offset {offset}: {reason}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        let mut writer = WireWriter::new();
        writer.put_u16(0x1234);
        writer.put_u32(0xDEADBEEF);
        writer.put_u48(0x0000_0102_0304_0506);
        let data = writer.finish();
        assert_eq!(
            &data[..],
            &[0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF, 1, 2, 3, 4, 5, 6]
        );

        let mut reader = WireReader::new(&data);
        assert_eq!(reader.read_u16().unwrap(), 0x1234);
        assert_eq!(reader.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(reader.read_u48().unwrap(), 0x0102_0304_0506);
        assert_eq!(
            reader.read_u8(),
            Err(ProtocolError::TruncatedMessage { offset: 13 })
        );
    }

    #[test]
    fn patching() {
        let mut writer = WireWriter::new();
        writer.put_u16(0);
        writer.put_u16(7);
        writer.patch_u16(0, 42);
        assert_eq!(&writer.finish()[..], &[0, 42, 0, 7]);
    }
}
