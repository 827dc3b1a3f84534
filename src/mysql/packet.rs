// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! MySQL packet framing and generic response packets
//!
//! ```text
//! [3 bytes: payload length]
//! [1 byte: sequence number]
//! [N bytes: payload]
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::codec::MysqlSerializer;
use super::protocol::SERVER_STATUS_AUTOCOMMIT;

pub const PACKET_HEADER_LEN: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = 0xff_ffff;
pub const DEFAULT_MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

// MySQL Packet structure
#[derive(Debug, Clone)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Bytes,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: Bytes) -> Self {
        Self { sequence_id, payload }
    }

    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(PACKET_HEADER_LEN + self.payload.len());

        // Payload length (3 bytes)
        let len = self.payload.len() as u32;
        buf.put_u8((len & 0xff) as u8);
        buf.put_u8(((len >> 8) & 0xff) as u8);
        buf.put_u8(((len >> 16) & 0xff) as u8);

        // Sequence ID
        buf.put_u8(self.sequence_id);

        // Payload
        buf.put_slice(&self.payload);

        buf
    }

    /// Pop one frame off the front of `buf`, or `None` if it is incomplete.
    pub fn decode(buf: &mut BytesMut) -> Option<Self> {
        if buf.len() < PACKET_HEADER_LEN {
            return None;
        }

        let len = (buf[0] as usize) | ((buf[1] as usize) << 8) | ((buf[2] as usize) << 16);
        let sequence_id = buf[3];

        if buf.len() < PACKET_HEADER_LEN + len {
            return None;
        }

        buf.advance(PACKET_HEADER_LEN);
        let payload = buf.split_to(len).freeze();

        Some(Packet { sequence_id, payload })
    }
}

/// Frame a logical payload, splitting it at `MAX_PAYLOAD_LEN`.
///
/// A payload that is an exact multiple of the maximum is followed by an
/// empty frame so the peer knows it has ended. `sequence_id` is advanced
/// once per frame written.
pub fn encode_payload(payload: &[u8], sequence_id: &mut u8) -> BytesMut {
    let mut out = BytesMut::with_capacity(payload.len() + PACKET_HEADER_LEN);
    let mut remaining = payload;
    loop {
        let chunk_len = remaining.len().min(MAX_PAYLOAD_LEN);
        let (chunk, rest) = remaining.split_at(chunk_len);
        let frame = Packet::new(*sequence_id, Bytes::copy_from_slice(chunk));
        out.extend_from_slice(&frame.encode());
        *sequence_id = sequence_id.wrapping_add(1);
        remaining = rest;
        if chunk_len < MAX_PAYLOAD_LEN {
            break;
        }
    }
    out
}

// OK Packet
#[derive(Debug, Clone)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

impl OkPacket {
    pub fn new() -> Self {
        Self {
            affected_rows: 0,
            last_insert_id: 0,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            warnings: 0,
            info: String::new(),
        }
    }

    pub fn write_to(&self, serializer: &mut MysqlSerializer) {
        serializer.write_int1(0x00);
        serializer.write_vint(self.affected_rows);
        serializer.write_vint(self.last_insert_id);
        if serializer.capability().is_protocol41() {
            serializer.write_int2(self.status_flags);
            serializer.write_int2(self.warnings);
        }
        if !self.info.is_empty() {
            serializer.write_bytes(self.info.as_bytes());
        }
    }
}

impl Default for OkPacket {
    fn default() -> Self {
        Self::new()
    }
}

// Error Packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    pub fn new(error_code: u16, sql_state: &str, error_message: String) -> Self {
        Self {
            error_code,
            sql_state: sql_state.to_string(),
            error_message,
        }
    }

    /// Always written in the protocol 4.1 layout (with SQLSTATE).
    pub fn write_to(&self, serializer: &mut MysqlSerializer) {
        serializer.write_int1(0xff);
        serializer.write_int2(self.error_code);
        serializer.write_int1(b'#');
        let mut state = [b'H', b'Y', b'0', b'0', b'0'];
        for (dst, src) in state.iter_mut().zip(self.sql_state.bytes()) {
            *dst = src;
        }
        serializer.write_bytes(&state);
        serializer.write_bytes(self.error_message.as_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mysql::protocol::{MysqlCapability, CLIENT_PROTOCOL_41};

    #[test]
    fn test_packet_encode_decode() {
        let packet = Packet::new(3, Bytes::from_static(b"\x03select 1"));
        let mut buf = packet.encode();
        buf.extend_from_slice(&[0x01]);

        let decoded = Packet::decode(&mut buf).unwrap();
        assert_eq!(decoded.sequence_id, 3);
        assert_eq!(&decoded.payload[..], b"\x03select 1");
        assert_eq!(&buf[..], &[0x01]);
        assert!(Packet::decode(&mut buf).is_none());
    }

    #[test]
    fn test_encode_payload_splits_large() {
        let payload = vec![7u8; MAX_PAYLOAD_LEN + 10];
        let mut seq = 5;
        let mut framed = encode_payload(&payload, &mut seq);
        assert_eq!(seq, 7);

        let first = Packet::decode(&mut framed).unwrap();
        assert_eq!(first.sequence_id, 5);
        assert_eq!(first.payload.len(), MAX_PAYLOAD_LEN);
        let second = Packet::decode(&mut framed).unwrap();
        assert_eq!(second.sequence_id, 6);
        assert_eq!(second.payload.len(), 10);
    }

    #[test]
    fn test_encode_payload_exact_multiple_gets_empty_tail() {
        let payload = vec![1u8; MAX_PAYLOAD_LEN];
        let mut seq = 0;
        let mut framed = encode_payload(&payload, &mut seq);
        assert_eq!(seq, 2);
        assert_eq!(Packet::decode(&mut framed).unwrap().payload.len(), MAX_PAYLOAD_LEN);
        assert!(Packet::decode(&mut framed).unwrap().payload.is_empty());
    }

    #[test]
    fn test_ok_packet() {
        let mut serializer = MysqlSerializer::new(MysqlCapability::new(CLIENT_PROTOCOL_41));
        OkPacket::new().write_to(&mut serializer);
        let bytes = serializer.to_bytes();
        assert_eq!(&bytes[..], &[0x00, 0, 0, 0x02, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_err_packet() {
        let mut serializer = MysqlSerializer::default();
        ErrPacket::new(1045, "28000", "denied".to_string()).write_to(&mut serializer);
        let bytes = serializer.to_bytes();
        assert_eq!(bytes[0], 0xff);
        assert_eq!(u16::from_le_bytes([bytes[1], bytes[2]]), 1045);
        assert_eq!(&bytes[3..9], b"#28000");
        assert_eq!(&bytes[9..], b"denied");
    }
}
