//! OSC Binary Codec
//!
//! Reads and writes OSC primitive wire values. Every value is big-endian and
//! the stream stays aligned to 4 bytes:
//!
//! - strings and type tags are null terminated and padded with 1 to 4 zero
//!   bytes, so a terminator is always present
//! - blobs carry an int32 length prefix and are padded with 0 to 3 zero bytes
//! - int32, float32, char and time tags are 4 or 8 bytes, with no padding
//! - booleans have no payload, their value lives in the type tag (`T`/`F`)

use crate::{Error, Result, TimeTag};
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Prefix of every type tag string on the wire
pub const COMMA: u8 = b',';

/// Address string that marks a bundle instead of a message
pub const BUNDLE_TAG: &str = "#bundle";

/// Zero bytes after a null-terminable chunk of `len` bytes (strings, type tags).
///
/// Always between 1 and 4, a chunk that is already aligned gets a full word
/// of zeros so the terminator is never missing.
#[inline]
pub fn string_padding(len: usize) -> usize {
    4 - (len % 4)
}

/// Zero bytes after a blob of `len` bytes, between 0 and 3
#[inline]
pub fn blob_padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

// ============================================================================
// READING
// ============================================================================

/// Cursor over the bytes of one received packet
#[derive(Debug)]
pub struct OscReader<'a> {
    buf: &'a [u8],
    type_tag: String,
}

impl<'a> OscReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            buf: bytes,
            type_tag: String::new(),
        }
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// The unread part of the packet
    pub fn rest(&self) -> &'a [u8] {
        self.buf
    }

    /// The last type tag read, without its leading comma
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    #[inline]
    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                have: self.buf.remaining(),
            });
        }
        Ok(())
    }

    /// Read a null terminated, padded UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let end = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::DecodeError("unterminated string".to_string()))?;
        let text = std::str::from_utf8(&self.buf[..end])
            .map_err(|e| Error::DecodeError(e.to_string()))?
            .to_string();
        let total = end + string_padding(end);
        self.ensure(total)?;
        self.buf.advance(total);
        Ok(text)
    }

    /// Read a type tag string and remember it for the value decoders.
    ///
    /// The returned tag has the leading comma stripped.
    pub fn read_type_tag(&mut self) -> Result<String> {
        let head = self.read_string()?;
        let tag = head
            .strip_prefix(',')
            .ok_or_else(|| Error::InvalidTypeTag(head.clone()))?
            .to_string();
        self.type_tag = tag.clone();
        Ok(tag)
    }

    pub fn read_int32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.buf.get_i32())
    }

    pub fn read_int64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.buf.get_i64())
    }

    pub fn read_float32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.buf.get_f32())
    }

    pub fn read_float64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.buf.get_f64())
    }

    /// Read an int32 length prefixed, padded blob
    pub fn read_blob(&mut self) -> Result<Bytes> {
        let len = self.read_int32()?;
        if len < 0 {
            return Err(Error::DecodeError(format!("negative blob size: {}", len)));
        }
        let len = len as usize;
        self.ensure(len + blob_padding(len))?;
        let blob = Bytes::copy_from_slice(&self.buf[..len]);
        self.buf.advance(len + blob_padding(len));
        Ok(blob)
    }

    pub fn read_time_tag(&mut self) -> Result<TimeTag> {
        self.ensure(8)?;
        let seconds = self.buf.get_u32();
        let fraction = self.buf.get_u32();
        Ok(TimeTag { seconds, fraction })
    }

    /// Read a char sent as a 4 byte code point
    pub fn read_char(&mut self) -> Result<char> {
        self.ensure(4)?;
        let code = self.buf.get_u32();
        char::from_u32(code).ok_or(Error::InvalidChar(code))
    }
}

/// Read the header of a bundle packet and return its time tag
pub fn decode_bundle_header(bytes: &[u8]) -> Result<TimeTag> {
    let mut reader = OscReader::new(bytes);
    let head = reader.read_string()?;
    if head != BUNDLE_TAG {
        return Err(Error::DecodeError(format!("not a bundle: {}", head)));
    }
    reader.read_time_tag()
}

// ============================================================================
// WRITING
// ============================================================================

/// Growable buffer for one outgoing packet
#[derive(Debug, Default)]
pub struct OscWriter {
    buf: BytesMut,
}

impl OscWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Finish the packet
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    #[inline]
    fn put_zeros(&mut self, count: usize) {
        self.buf.put_bytes(0, count);
    }

    /// Write a string followed by its terminator and padding
    pub fn write_string(&mut self, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(Error::EncodeError(format!("string contains a null byte: {:?}", s)));
        }
        self.buf.extend_from_slice(s.as_bytes());
        self.put_zeros(string_padding(s.len()));
        Ok(())
    }

    /// Write a type tag, the leading comma is added here.
    ///
    /// A blank tag is rejected before anything is written.
    pub fn write_type_tag(&mut self, tag: &str) -> Result<()> {
        if tag.trim().is_empty() {
            return Err(Error::EmptyTypeTag);
        }
        self.write_arg_tags(tag);
        Ok(())
    }

    /// Write the type tag of a variadic payload, which may have no arguments.
    ///
    /// An empty `tags` produces a bare `,` padded to 4 bytes.
    pub fn write_arg_tags(&mut self, tags: &str) {
        self.buf.put_u8(COMMA);
        self.buf.extend_from_slice(tags.as_bytes());
        self.put_zeros(string_padding(tags.len() + 1));
    }

    pub fn write_int32(&mut self, x: i32) {
        self.buf.put_i32(x);
    }

    pub fn write_int64(&mut self, x: i64) {
        self.buf.put_i64(x);
    }

    pub fn write_float32(&mut self, x: f32) {
        self.buf.put_f32(x);
    }

    pub fn write_float64(&mut self, x: f64) {
        self.buf.put_f64(x);
    }

    /// Write an int32 length prefixed blob padded to 4 bytes
    pub fn write_blob(&mut self, blob: &[u8]) -> Result<()> {
        if blob.len() > i32::MAX as usize {
            return Err(Error::PayloadTooLarge(blob.len()));
        }
        self.buf.put_i32(blob.len() as i32);
        self.buf.extend_from_slice(blob);
        self.put_zeros(blob_padding(blob.len()));
        Ok(())
    }

    pub fn write_time_tag(&mut self, tag: TimeTag) {
        self.buf.put_u32(tag.seconds);
        self.buf.put_u32(tag.fraction);
    }

    pub fn write_char(&mut self, c: char) {
        self.buf.put_u32(c as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_padding_always_terminates() {
        assert_eq!(string_padding(0), 4);
        assert_eq!(string_padding(1), 3);
        assert_eq!(string_padding(3), 1);
        assert_eq!(string_padding(4), 4);
        assert_eq!(string_padding(23), 1);
    }

    #[test]
    fn test_blob_padding() {
        assert_eq!(blob_padding(0), 0);
        assert_eq!(blob_padding(1), 3);
        assert_eq!(blob_padding(4), 0);
        assert_eq!(blob_padding(5), 3);
    }

    #[test]
    fn test_string_alignment() {
        for len in 0..=17 {
            let s = "x".repeat(len);
            let mut writer = OscWriter::new();
            writer.write_string(&s).unwrap();

            let expected = if len % 4 == 0 { len + 4 } else { (len + 1 + 3) / 4 * 4 };
            assert_eq!(writer.len(), expected, "length {}", len);
            assert_eq!(writer.len() % 4, 0);
            assert_eq!(writer.as_bytes()[len], 0);

            let bytes = writer.freeze();
            let mut reader = OscReader::new(&bytes);
            assert_eq!(reader.read_string().unwrap(), s);
            assert_eq!(reader.remaining(), 0);
        }
    }

    #[test]
    fn test_type_tag() {
        let mut writer = OscWriter::new();
        writer.write_type_tag("iisff").unwrap();
        assert_eq!(writer.as_bytes(), b",iisff\0\0");

        let bytes = writer.freeze();
        let mut reader = OscReader::new(&bytes);
        assert_eq!(reader.read_type_tag().unwrap(), "iisff");
        assert_eq!(reader.type_tag(), "iisff");
    }

    #[test]
    fn test_blank_type_tag_rejected() {
        let mut writer = OscWriter::new();
        assert_eq!(writer.write_type_tag(""), Err(Error::EmptyTypeTag));
        assert_eq!(writer.write_type_tag("  "), Err(Error::EmptyTypeTag));
        assert!(writer.is_empty());
    }

    #[test]
    fn test_empty_arg_tags() {
        let mut writer = OscWriter::new();
        writer.write_arg_tags("");
        assert_eq!(writer.as_bytes(), b",\0\0\0");
    }

    #[test]
    fn test_type_tag_without_comma() {
        let mut writer = OscWriter::new();
        writer.write_string("if").unwrap();
        let bytes = writer.freeze();
        let mut reader = OscReader::new(&bytes);
        assert_eq!(
            reader.read_type_tag(),
            Err(Error::InvalidTypeTag("if".to_string()))
        );
    }

    #[test]
    fn test_numbers_are_big_endian() {
        let mut writer = OscWriter::new();
        writer.write_int32(1000);
        writer.write_int32(-1);
        writer.write_float32(440.0);
        assert_eq!(
            writer.as_bytes(),
            &[0x00, 0x00, 0x03, 0xe8, 0xff, 0xff, 0xff, 0xff, 0x43, 0xdc, 0x00, 0x00]
        );
    }

    #[test]
    fn test_blob_of_aligned_length_has_no_padding() {
        let mut writer = OscWriter::new();
        writer.write_blob(&[1, 2, 3, 4]).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 4, 1, 2, 3, 4]);

        let mut writer = OscWriter::new();
        writer.write_blob(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(writer.len(), 4 + 5 + 3);
    }

    #[test]
    fn test_empty_blob() {
        let mut writer = OscWriter::new();
        writer.write_blob(&[]).unwrap();
        assert_eq!(writer.as_bytes(), &[0, 0, 0, 0]);

        let bytes = writer.freeze();
        let mut reader = OscReader::new(&bytes);
        assert!(reader.read_blob().unwrap().is_empty());
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_input_fails() {
        let mut reader = OscReader::new(&[0x00, 0x01]);
        assert_eq!(
            reader.read_int32(),
            Err(Error::BufferTooSmall { needed: 4, have: 2 })
        );

        // terminator present but padding cut off
        let mut reader = OscReader::new(b"/ab\0/cdef\0");
        assert_eq!(reader.read_string().unwrap(), "/ab");
        assert_eq!(
            reader.read_string(),
            Err(Error::BufferTooSmall { needed: 8, have: 6 })
        );

        let mut reader = OscReader::new(b"/abc");
        assert!(matches!(reader.read_string(), Err(Error::DecodeError(_))));

        let mut reader = OscReader::new(&[0, 0, 0, 8, 1, 2]);
        assert_eq!(
            reader.read_blob(),
            Err(Error::BufferTooSmall { needed: 8, have: 2 })
        );
    }

    #[test]
    fn test_char_and_time_tag() {
        let mut writer = OscWriter::new();
        writer.write_char('x');
        writer.write_time_tag(TimeTag::new(3_900_000_000, 7));
        let bytes = writer.freeze();
        assert_eq!(bytes.len(), 12);

        let mut reader = OscReader::new(&bytes);
        assert_eq!(reader.read_char().unwrap(), 'x');
        assert_eq!(reader.read_time_tag().unwrap(), TimeTag::new(3_900_000_000, 7));
    }

    #[test]
    fn test_invalid_char() {
        let mut reader = OscReader::new(&[0x00, 0x00, 0xd8, 0x00]);
        assert_eq!(reader.read_char(), Err(Error::InvalidChar(0xd800)));
    }

    #[test]
    fn test_bundle_header() {
        let mut writer = OscWriter::new();
        writer.write_string(BUNDLE_TAG).unwrap();
        writer.write_time_tag(TimeTag::IMMEDIATE);
        let bytes = writer.freeze();
        assert_eq!(bytes.len(), 16);
        assert_eq!(decode_bundle_header(&bytes).unwrap(), TimeTag::IMMEDIATE);
    }
}
