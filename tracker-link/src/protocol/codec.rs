//! Zero-allocation wire codec
//!
//! This module provides:
//! - `TxBuffer`: Single reusable buffer every outgoing datagram is assembled in
//! - `RxReader`: Bounds-checked cursor over a received datagram
//!
//! All multi-byte values are big-endian. Every write is checked against the
//! remaining capacity and fails without touching the buffer, so a caller can
//! abandon a half-built packet with `truncate`.

use crate::error::{Error, Result};

/// Reusable outgoing datagram buffer
///
/// Create once, reuse for every packet. `N` sets the datagram size limit.
pub struct TxBuffer<const N: usize> {
    data: [u8; N],
    len: usize,
}

impl<const N: usize> TxBuffer<N> {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            len: 0,
        }
    }

    /// Bytes written so far
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes still free
    #[inline]
    pub fn remaining(&self) -> usize {
        N - self.len
    }

    /// Drop everything written
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Roll back to an earlier length
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        self.len = self.len.min(len);
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.remaining() {
            return Err(Error::BufferOverflow {
                needed: bytes.len(),
                available: self.remaining(),
            });
        }
        self.data[self.len..self.len + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len();
        Ok(())
    }

    #[inline]
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    #[inline]
    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    #[inline]
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    #[inline]
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// IEEE-754 single precision, big-endian bit pattern
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// String with a one byte length prefix (identifiers, versions)
    pub fn write_short_string(&mut self, value: &str) -> Result<()> {
        let len = u8::try_from(value.len()).map_err(|_| Error::StringTooLong {
            len: value.len(),
            max: u8::MAX as usize,
        })?;
        self.ensure(1 + value.len())?;
        self.write_u8(len)?;
        self.write_bytes(value.as_bytes())
    }

    /// String with a four byte length prefix
    pub fn write_long_string(&mut self, value: &str) -> Result<()> {
        let len = u32::try_from(value.len()).map_err(|_| Error::StringTooLong {
            len: value.len(),
            max: u32::MAX as usize,
        })?;
        self.ensure(4 + value.len())?;
        self.write_u32(len)?;
        self.write_bytes(value.as_bytes())
    }

    /// Reserve a u16 to be filled in later, returns its offset
    pub fn reserve_u16(&mut self) -> Result<usize> {
        let at = self.len;
        self.write_u16(0)?;
        Ok(at)
    }

    /// Overwrite a u16 previously reserved at `at`
    pub fn patch_u16(&mut self, at: usize, value: u16) -> Result<()> {
        if at + 2 > self.len {
            return Err(Error::BufferOverflow {
                needed: at + 2,
                available: self.len,
            });
        }
        self.data[at..at + 2].copy_from_slice(&value.to_be_bytes());
        Ok(())
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if needed > self.remaining() {
            return Err(Error::BufferOverflow {
                needed,
                available: self.remaining(),
            });
        }
        Ok(())
    }
}

impl<const N: usize> Default for TxBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor over one received datagram
///
/// Reads past the end return `InvalidPacket` and leave the cursor where it was.
pub struct RxReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> RxReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed
    #[inline]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.pos < len {
            return Err(Error::InvalidPacket(format!(
                "truncated: wanted {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_array<const L: usize>(&mut self) -> Result<[u8; L]> {
        let mut out = [0u8; L];
        out.copy_from_slice(self.read_bytes(L)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_array()?))
    }

    pub fn read_short_string(&mut self) -> Result<&'a str> {
        let len = self.read_u8()? as usize;
        let bytes = self.read_bytes(len)?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::InvalidPacket(format!("short string not UTF-8: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_endian_layout() {
        let mut buf: TxBuffer<32> = TxBuffer::new();
        buf.write_u8(0xAB).unwrap();
        buf.write_u16(0x0102).unwrap();
        buf.write_u32(0x0304_0506).unwrap();
        buf.write_u64(7).unwrap();
        buf.write_f32(1.0).unwrap();

        assert_eq!(
            buf.as_bytes(),
            &[
                0xAB, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0, 0, 0, 0, 0, 0, 0, 7, 0x3F, 0x80, 0,
                0
            ]
        );
    }

    #[test]
    fn test_overflow_leaves_buffer_untouched() {
        let mut buf: TxBuffer<4> = TxBuffer::new();
        buf.write_u16(1).unwrap();

        let err = buf.write_u32(2).unwrap_err();
        assert!(matches!(
            err,
            Error::BufferOverflow {
                needed: 4,
                available: 2
            }
        ));
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_short_string() {
        let mut buf: TxBuffer<16> = TxBuffer::new();
        buf.write_short_string("v0.5").unwrap();
        assert_eq!(buf.as_bytes(), &[4, b'v', b'0', b'.', b'5']);

        let too_long = "x".repeat(256);
        let mut big: TxBuffer<512> = TxBuffer::new();
        assert!(matches!(
            big.write_short_string(&too_long),
            Err(Error::StringTooLong { len: 256, max: 255 })
        ));
        assert!(big.is_empty());
    }

    #[test]
    fn test_long_string_is_atomic() {
        let mut buf: TxBuffer<8> = TxBuffer::new();
        // Prefix fits, body does not: nothing may be written
        assert!(buf.write_long_string("hello").is_err());
        assert!(buf.is_empty());

        buf.write_long_string("hey").unwrap();
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 3, b'h', b'e', b'y']);
    }

    #[test]
    fn test_reserve_and_patch() {
        let mut buf: TxBuffer<16> = TxBuffer::new();
        buf.write_u8(100).unwrap();
        let at = buf.reserve_u16().unwrap();
        buf.write_u8(9).unwrap();
        buf.patch_u16(at, 0x0203).unwrap();

        assert_eq!(buf.as_bytes(), &[100, 0x02, 0x03, 9]);
        assert!(buf.patch_u16(3, 1).is_err());
    }

    #[test]
    fn test_truncate_rolls_back() {
        let mut buf: TxBuffer<16> = TxBuffer::new();
        buf.write_u32(1).unwrap();
        let mark = buf.len();
        buf.write_u32(2).unwrap();
        buf.truncate(mark);
        assert_eq!(buf.as_bytes(), &[0, 0, 0, 1]);
    }

    #[test]
    fn test_reader() {
        let data = [22, 0, 0, 0, 0, 0, 0, 0, 9, 0x3F, 0x80, 0, 0, 2, b'o', b'k'];
        let mut rx = RxReader::new(&data);
        assert_eq!(rx.read_u8().unwrap(), 22);
        assert_eq!(rx.read_u64().unwrap(), 9);
        assert_eq!(rx.read_f32().unwrap(), 1.0);
        assert_eq!(rx.read_short_string().unwrap(), "ok");
        assert!(rx.remaining().is_empty());
        assert!(matches!(rx.read_u8(), Err(Error::InvalidPacket(_))));
    }
}
