// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! MySQL wire primitives
//!
//! Readers consume from the front of a `Bytes` cursor. Every read checks the
//! remaining length first, so a short packet surfaces as
//! `DorisError::PacketTruncated` rather than a panic.
//!
//! `MysqlSerializer` is the write side, carrying the negotiated capability
//! for the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DorisError, Result};
use super::protocol::MysqlCapability;

fn ensure_remaining(buf: &Bytes, needed: usize) -> Result<()> {
    if buf.remaining() < needed {
        return Err(DorisError::PacketTruncated {
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

pub fn read_byte(buf: &mut Bytes) -> Result<u8> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_int1(buf: &mut Bytes) -> Result<u8> {
    read_byte(buf)
}

pub fn read_int2(buf: &mut Bytes) -> Result<u16> {
    let b0 = read_byte(buf)? as u16;
    let b1 = read_byte(buf)? as u16;
    Ok(b0 | (b1 << 8))
}

pub fn read_int3(buf: &mut Bytes) -> Result<u32> {
    let b0 = read_byte(buf)? as u32;
    let b1 = read_byte(buf)? as u32;
    let b2 = read_byte(buf)? as u32;
    Ok(b0 | (b1 << 8) | (b2 << 16))
}

pub fn read_int4(buf: &mut Bytes) -> Result<u32> {
    let b0 = read_byte(buf)? as u32;
    let b1 = read_byte(buf)? as u32;
    let b2 = read_byte(buf)? as u32;
    let b3 = read_byte(buf)? as u32;
    Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
}

/// Low 4 bytes first, then the high 2.
pub fn read_int6(buf: &mut Bytes) -> Result<u64> {
    let low = read_int4(buf)? as u64;
    let high = read_int2(buf)? as u64;
    Ok(low | (high << 32))
}

/// Low 4 bytes first, then the high 4.
pub fn read_int8(buf: &mut Bytes) -> Result<u64> {
    let low = read_int4(buf)? as u64;
    let high = read_int4(buf)? as u64;
    Ok(low | (high << 32))
}

/// Length-encoded integer.
///
/// `0xFB` is the NULL marker and is an error here. `0xFF` has no defined
/// meaning in this position and decodes as 0 without consuming anything else.
pub fn read_vint(buf: &mut Bytes) -> Result<u64> {
    let b = read_int1(buf)?;
    match b {
        0..=250 => Ok(b as u64),
        0xfb => Err(DorisError::NullLengthEncodedInt),
        0xfc => Ok(read_int2(buf)? as u64),
        0xfd => Ok(read_int3(buf)? as u64),
        0xfe => read_int8(buf),
        _ => Ok(0),
    }
}

pub fn read_fixed_string(buf: &mut Bytes, len: usize) -> Result<Bytes> {
    ensure_remaining(buf, len)?;
    Ok(buf.split_to(len))
}

pub fn read_eof_string(buf: &mut Bytes) -> Bytes {
    buf.split_to(buf.len())
}

pub fn read_len_encoded_string(buf: &mut Bytes) -> Result<Bytes> {
    let len = read_vint(buf)?;
    let len = usize::try_from(len)
        .map_err(|_| DorisError::InvalidPacket(format!("length {} does not fit in memory", len)))?;
    read_fixed_string(buf, len)
}

/// Bytes up to the first NUL. The NUL itself is consumed; without one the
/// rest of the buffer is returned.
pub fn read_nul_terminated_string(buf: &mut Bytes) -> Bytes {
    match buf.iter().position(|&b| b == 0) {
        Some(pos) => {
            let s = buf.split_to(pos);
            buf.advance(1);
            s
        }
        None => buf.split_to(buf.len()),
    }
}

/// Convenience for text fields; MySQL clients send UTF-8 for identifiers.
pub fn bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Write side of the codec.
#[derive(Debug, Default)]
pub struct MysqlSerializer {
    buf: BytesMut,
    capability: MysqlCapability,
}

impl MysqlSerializer {
    pub fn new(capability: MysqlCapability) -> Self {
        Self {
            buf: BytesMut::with_capacity(128),
            capability,
        }
    }

    pub fn capability(&self) -> MysqlCapability {
        self.capability
    }

    pub fn set_capability(&mut self, capability: MysqlCapability) {
        self.capability = capability;
    }

    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the written bytes, leaving the serializer empty.
    pub fn to_bytes(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    pub fn write_int1(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_int2(&mut self, value: u16) {
        self.buf.put_u16_le(value);
    }

    pub fn write_int3(&mut self, value: u32) {
        self.buf.put_uint_le(value as u64 & 0xff_ffff, 3);
    }

    pub fn write_int4(&mut self, value: u32) {
        self.buf.put_u32_le(value);
    }

    pub fn write_int6(&mut self, value: u64) {
        self.buf.put_uint_le(value & 0xffff_ffff_ffff, 6);
    }

    pub fn write_int8(&mut self, value: u64) {
        self.buf.put_u64_le(value);
    }

    pub fn write_vint(&mut self, value: u64) {
        if value < 251 {
            self.buf.put_u8(value as u8);
        } else if value < 0x10000 {
            self.buf.put_u8(0xfc);
            self.buf.put_u16_le(value as u16);
        } else if value < 0x1000000 {
            self.buf.put_u8(0xfd);
            self.buf.put_uint_le(value, 3);
        } else {
            self.buf.put_u8(0xfe);
            self.buf.put_u64_le(value);
        }
    }

    pub fn write_bytes(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
    }

    pub fn write_zeros(&mut self, count: usize) {
        self.buf.put_bytes(0, count);
    }

    pub fn write_len_encoded_string(&mut self, value: &[u8]) {
        self.write_vint(value.len() as u64);
        self.buf.put_slice(value);
    }

    pub fn write_nul_terminated_string(&mut self, value: &[u8]) {
        self.buf.put_slice(value);
        self.buf.put_u8(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn written(f: impl FnOnce(&mut MysqlSerializer)) -> Bytes {
        let mut serializer = MysqlSerializer::default();
        f(&mut serializer);
        serializer.to_bytes()
    }

    #[test]
    fn test_fixed_width_boundaries() {
        for v in [0u8, 1, 0x7f, u8::MAX] {
            let mut buf = written(|s| s.write_int1(v));
            assert_eq!(read_int1(&mut buf).unwrap(), v);
            assert!(buf.is_empty());
        }
        for v in [0u16, 1, 0x1234, u16::MAX] {
            let mut buf = written(|s| s.write_int2(v));
            assert_eq!(read_int2(&mut buf).unwrap(), v);
            assert!(buf.is_empty());
        }
        for v in [0u32, 1, 0x12_3456, 0xff_ffff] {
            let mut buf = written(|s| s.write_int3(v));
            assert_eq!(buf.len(), 3);
            assert_eq!(read_int3(&mut buf).unwrap(), v);
        }
        for v in [0u32, 1, 0x1234_5678, u32::MAX] {
            let mut buf = written(|s| s.write_int4(v));
            assert_eq!(read_int4(&mut buf).unwrap(), v);
        }
        for v in [0u64, 1, 0x1234_5678_9abc, 0xffff_ffff_ffff] {
            let mut buf = written(|s| s.write_int6(v));
            assert_eq!(buf.len(), 6);
            assert_eq!(read_int6(&mut buf).unwrap(), v);
        }
        for v in [0u64, 1, 0x0123_4567_89ab_cdef, u64::MAX] {
            let mut buf = written(|s| s.write_int8(v));
            assert_eq!(read_int8(&mut buf).unwrap(), v);
        }
    }

    #[test]
    fn test_little_endian_composition() {
        let mut buf = Bytes::from_static(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(read_int6(&mut buf).unwrap(), 0x0605_0403_0201);

        let mut buf = Bytes::from_static(&[0x01, 0, 0, 0, 0x02, 0, 0, 0]);
        assert_eq!(read_int8(&mut buf).unwrap(), 0x0000_0002_0000_0001);
    }

    #[test]
    fn test_vint_single_byte() {
        let mut buf = Bytes::from_static(&[5, 0xaa]);
        assert_eq!(read_vint(&mut buf).unwrap(), 5);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_vint_two_byte() {
        let mut buf = Bytes::from_static(&[252, 0x01, 0x00, 0xaa]);
        assert_eq!(read_vint(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..], &[0xaa]);
    }

    #[test]
    fn test_vint_three_and_eight_byte() {
        let mut buf = Bytes::from_static(&[253, 0x01, 0x02, 0x03]);
        assert_eq!(read_vint(&mut buf).unwrap(), 0x030201);

        let mut buf = written(|s| s.write_vint(u64::MAX));
        assert_eq!(buf[0], 254);
        assert_eq!(read_vint(&mut buf).unwrap(), u64::MAX);
    }

    #[test]
    fn test_vint_null_marker_fails() {
        let mut buf = Bytes::from_static(&[251, 0, 0]);
        let err = read_vint(&mut buf).unwrap_err();
        assert!(matches!(err, DorisError::NullLengthEncodedInt));
    }

    #[test]
    fn test_vint_0xff_is_zero_without_consuming() {
        let mut buf = Bytes::from_static(&[255, 7, 8]);
        assert_eq!(read_vint(&mut buf).unwrap(), 0);
        assert_eq!(&buf[..], &[7, 8]);
    }

    #[test]
    fn test_vint_truncated() {
        let mut buf = Bytes::from_static(&[252, 0x01]);
        assert!(matches!(
            read_vint(&mut buf),
            Err(DorisError::PacketTruncated { needed: 1, remaining: 0 })
        ));
    }

    #[test]
    fn test_nul_terminated_string() {
        let mut buf = Bytes::from_static(b"abc\0def");
        assert_eq!(&read_nul_terminated_string(&mut buf)[..], b"abc");
        assert_eq!(&buf[..], b"def");
    }

    #[test]
    fn test_nul_terminated_string_without_terminator() {
        let mut buf = Bytes::from_static(b"def");
        assert_eq!(&read_nul_terminated_string(&mut buf)[..], b"def");
        assert!(buf.is_empty());
        assert!(read_nul_terminated_string(&mut buf).is_empty());
    }

    #[test]
    fn test_len_encoded_string() {
        let mut buf = written(|s| {
            s.write_len_encoded_string(b"hello");
            s.write_int1(9);
        });
        assert_eq!(&read_len_encoded_string(&mut buf).unwrap()[..], b"hello");
        assert_eq!(read_int1(&mut buf).unwrap(), 9);
    }

    #[test]
    fn test_len_encoded_string_longer_than_buffer() {
        let mut buf = Bytes::from_static(&[10, b'a', b'b']);
        assert!(matches!(
            read_len_encoded_string(&mut buf),
            Err(DorisError::PacketTruncated { needed: 10, remaining: 2 })
        ));
    }

    #[test]
    fn test_fixed_and_eof_string() {
        let mut buf = Bytes::from_static(b"0123456789");
        assert_eq!(&read_fixed_string(&mut buf, 4).unwrap()[..], b"0123");
        assert_eq!(&read_eof_string(&mut buf)[..], b"456789");
        assert!(read_eof_string(&mut buf).is_empty());
        assert!(read_fixed_string(&mut buf, 1).is_err());
    }

    #[test]
    fn test_serializer_reset_and_capability() {
        let mut s = MysqlSerializer::new(MysqlCapability::new(0x200));
        s.write_nul_terminated_string(b"x");
        assert_eq!(s.len(), 2);
        s.reset();
        assert!(s.is_empty());
        s.set_capability(MysqlCapability::DEFAULT);
        assert_eq!(s.capability(), MysqlCapability::DEFAULT);
    }
}
