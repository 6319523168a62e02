//! Byte-level readers and writers
//!
//! Endianness is a property of the whole reader or writer, never of an
//! individual field. Every read is bounds-checked and fails with
//! `TruncatedBuffer` when the buffer cannot satisfy it.

use bytes::{BufMut, Bytes, BytesMut};
use prism_core::{PrismError, PrismResult};

/// Byte order for a whole reader or writer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Growable output buffer with a fixed byte order
#[derive(Debug)]
pub struct Writer {
    buf: BytesMut,
    endian: Endian,
}

macro_rules! put_prim {
    ($name:ident, $ty:ty, $le:ident, $be:ident) => {
        #[inline]
        pub fn $name(&mut self, v: $ty) {
            match self.endian {
                Endian::Little => self.buf.$le(v),
                Endian::Big => self.buf.$be(v),
            }
        }
    };
}

impl Writer {
    pub fn new(endian: Endian) -> Self {
        Writer {
            buf: BytesMut::new(),
            endian,
        }
    }

    /// Little-endian writer (the simulator protocol's native order)
    pub fn little() -> Self {
        Writer::new(Endian::Little)
    }

    pub fn big() -> Self {
        Writer::new(Endian::Big)
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    #[inline]
    pub fn put_i8(&mut self, v: i8) {
        self.buf.put_i8(v);
    }

    put_prim!(put_u16, u16, put_u16_le, put_u16);
    put_prim!(put_u32, u32, put_u32_le, put_u32);
    put_prim!(put_u64, u64, put_u64_le, put_u64);
    put_prim!(put_i16, i16, put_i16_le, put_i16);
    put_prim!(put_i32, i32, put_i32_le, put_i32);
    put_prim!(put_i64, i64, put_i64_le, put_i64);
    put_prim!(put_f32, f32, put_f32_le, put_f32);
    put_prim!(put_f64, f64, put_f64_le, put_f64);

    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consume the writer, yielding the accumulated bytes
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Bounds-checked cursor over a byte slice with a fixed byte order
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

macro_rules! read_prim {
    ($name:ident, $ty:ty, $width:expr) => {
        #[inline]
        pub fn $name(&mut self) -> PrismResult<$ty> {
            let bytes: [u8; $width] = self.read_bytes($width)?.try_into().unwrap();
            Ok(match self.endian {
                Endian::Little => <$ty>::from_le_bytes(bytes),
                Endian::Big => <$ty>::from_be_bytes(bytes),
            })
        }
    };
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Reader {
            data,
            pos: 0,
            endian,
        }
    }

    /// Little-endian reader (the simulator protocol's native order)
    pub fn little(data: &'a [u8]) -> Self {
        Reader::new(data, Endian::Little)
    }

    pub fn big(data: &'a [u8]) -> Self {
        Reader::new(data, Endian::Big)
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Read exactly `n` bytes, advancing the cursor
    #[inline]
    pub fn read_bytes(&mut self, n: usize) -> PrismResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(PrismError::TruncatedBuffer {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Consume the rest of the buffer
    #[inline]
    pub fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos..];
        self.pos = self.data.len();
        bytes
    }

    /// Split off an isolated sub-reader over the next `n` bytes
    pub fn take(&mut self, n: usize) -> PrismResult<Reader<'a>> {
        let bytes = self.read_bytes(n)?;
        Ok(Reader::new(bytes, self.endian))
    }

    /// Scan for `terminator`, returning the bytes before it and consuming
    /// the terminator itself
    pub fn read_until(&mut self, terminator: u8) -> PrismResult<&'a [u8]> {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == terminator) {
            Some(idx) => {
                let bytes = &rest[..idx];
                self.pos += idx + 1;
                Ok(bytes)
            }
            None => Err(PrismError::TruncatedBuffer {
                needed: rest.len() + 1,
                remaining: rest.len(),
            }),
        }
    }

    #[inline]
    pub fn read_u8(&mut self) -> PrismResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    #[inline]
    pub fn read_i8(&mut self) -> PrismResult<i8> {
        Ok(self.read_bytes(1)?[0] as i8)
    }

    read_prim!(read_u16, u16, 2);
    read_prim!(read_u32, u32, 4);
    read_prim!(read_u64, u64, 8);
    read_prim!(read_i16, i16, 2);
    read_prim!(read_i32, i32, 4);
    read_prim!(read_i64, i64, 8);
    read_prim!(read_f32, f32, 4);
    read_prim!(read_f64, f64, 8);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_reader_roundtrip_le() {
        let mut w = Writer::little();
        w.put_u8(0xAB);
        w.put_u16(0x1234);
        w.put_u32(0xDEADBEEF);
        w.put_f32(1.5);

        let bytes = w.freeze();
        let mut r = Reader::little(&bytes);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert!(r.is_empty());
    }

    #[test]
    fn test_endianness_is_reader_wide() {
        let mut w = Writer::big();
        w.put_u16(0x0102);
        assert_eq!(w.as_slice(), &[0x01, 0x02]);

        let mut w = Writer::little();
        w.put_u16(0x0102);
        assert_eq!(w.as_slice(), &[0x02, 0x01]);
    }

    #[test]
    fn test_truncated_read() {
        let mut r = Reader::little(&[0x01, 0x02]);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(
            err,
            prism_core::PrismError::TruncatedBuffer {
                needed: 4,
                remaining: 2
            }
        ));
        // A failed read must not advance the cursor
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn test_take_isolates_subrange() {
        let mut r = Reader::little(&[1, 2, 3, 4, 5]);
        let mut sub = r.take(3).unwrap();
        assert_eq!(sub.remaining(), 3);
        assert_eq!(sub.read_u8().unwrap(), 1);
        assert_eq!(r.remaining(), 2);
        assert_eq!(r.read_u8().unwrap(), 4);
    }

    #[test]
    fn test_read_until_terminator() {
        let mut r = Reader::little(b"abc\0rest");
        assert_eq!(r.read_until(0).unwrap(), b"abc");
        assert_eq!(r.read_rest(), b"rest");

        let mut r = Reader::little(b"no-terminator");
        assert!(r.read_until(0).is_err());
    }
}
