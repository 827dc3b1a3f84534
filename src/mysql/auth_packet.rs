// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Protocol::HandshakeResponse41, the client's answer to the greeting
//!
//! ```text
//! [4 bytes: capability flags]
//! [4 bytes: max packet size]
//! [1 byte : character set]
//! [23 bytes: reserved]
//! --- an SSLRequest stops here ---
//! [NUL string: username]
//! [auth response: lenenc / 1-byte length / NUL string, by capability]
//! [NUL string: database]          if CLIENT_CONNECT_WITH_DB
//! [NUL string: auth plugin name]  if CLIENT_PLUGIN_AUTH
//! [lenenc: connect attributes]    if CLIENT_CONNECT_ATTRS
//! ```

use bytes::{Buf, Bytes};

use crate::error::{DorisError, Result};
use super::codec::*;
use super::protocol::MysqlCapability;

const RESERVED_LEN: usize = 23;

/// Length of a bare SSLRequest: capability, max packet size, charset, reserved.
pub const SSL_REQUEST_LEN: usize = 4 + 4 + 1 + RESERVED_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    capability: MysqlCapability,
    max_packet_size: u32,
    character_set: u8,
    user: String,
    auth_response: Bytes,
    database: Option<String>,
    plugin_name: Option<String>,
    connect_attrs: Vec<(String, String)>,
    is_ssl_request: bool,
}

impl AuthPacket {
    pub fn read_from(mut buf: Bytes) -> Result<Self> {
        let capability = MysqlCapability::new(read_int4(&mut buf)?);
        let max_packet_size = read_int4(&mut buf)?;
        let character_set = read_int1(&mut buf)?;
        read_fixed_string(&mut buf, RESERVED_LEN)?;

        let mut packet = AuthPacket {
            capability,
            max_packet_size,
            character_set,
            user: String::new(),
            auth_response: Bytes::new(),
            database: None,
            plugin_name: None,
            connect_attrs: Vec::new(),
            is_ssl_request: false,
        };

        if !buf.has_remaining() && capability.is_ssl() {
            packet.is_ssl_request = true;
            return Ok(packet);
        }

        packet.user = bytes_to_string(&read_nul_terminated_string(&mut buf));

        packet.auth_response = if capability.is_plugin_auth_data_length_encoded() {
            read_len_encoded_string(&mut buf)?
        } else if capability.is_secure_connection() {
            let len = read_int1(&mut buf)? as usize;
            read_fixed_string(&mut buf, len)?
        } else {
            read_nul_terminated_string(&mut buf)
        };

        if capability.is_connected_with_db() && buf.has_remaining() {
            packet.database = Some(bytes_to_string(&read_nul_terminated_string(&mut buf)));
        }

        if capability.is_plugin_auth() && buf.has_remaining() {
            packet.plugin_name = Some(bytes_to_string(&read_nul_terminated_string(&mut buf)));
        }

        if capability.is_connect_attrs() && buf.has_remaining() {
            packet.connect_attrs = read_connect_attrs(&mut buf)?;
        }

        Ok(packet)
    }

    /// Copy of this packet carrying the proof received after an auth switch.
    pub fn with_auth_response(&self, auth_response: Bytes) -> Self {
        Self {
            auth_response,
            ..self.clone()
        }
    }

    pub fn capability(&self) -> MysqlCapability {
        self.capability
    }

    pub fn max_packet_size(&self) -> u32 {
        self.max_packet_size
    }

    pub fn character_set(&self) -> u8 {
        self.character_set
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn auth_response(&self) -> &[u8] {
        &self.auth_response
    }

    /// Requested database; an empty name counts as none.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref().filter(|db| !db.is_empty())
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin_name.as_deref()
    }

    pub fn connect_attrs(&self) -> &[(String, String)] {
        &self.connect_attrs
    }

    pub fn is_ssl_request(&self) -> bool {
        self.is_ssl_request
    }
}

/// Length-prefixed block of length-encoded key/value strings.
pub(crate) fn read_connect_attrs(buf: &mut Bytes) -> Result<Vec<(String, String)>> {
    let mut block = read_len_encoded_string(buf)?;
    let mut attrs = Vec::new();
    while block.has_remaining() {
        let key = read_len_encoded_string(&mut block)?;
        let value = read_len_encoded_string(&mut block).map_err(|e| match e {
            DorisError::PacketTruncated { .. } => DorisError::InvalidPacket(format!(
                "connect attribute '{}' has no value",
                bytes_to_string(&key)
            )),
            other => other,
        })?;
        attrs.push((bytes_to_string(&key), bytes_to_string(&value)));
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mysql::protocol::*;

    fn response_bytes(
        flags: u32,
        user: &str,
        auth: &[u8],
        db: Option<&str>,
        plugin: Option<&str>,
    ) -> Bytes {
        let mut s = MysqlSerializer::default();
        s.write_int4(flags);
        s.write_int4(16 * 1024 * 1024);
        s.write_int1(UTF8MB4_GENERAL_CI);
        s.write_zeros(23);
        s.write_nul_terminated_string(user.as_bytes());
        if flags & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
            s.write_len_encoded_string(auth);
        } else if flags & CLIENT_SECURE_CONNECTION != 0 {
            s.write_int1(auth.len() as u8);
            s.write_bytes(auth);
        } else {
            s.write_nul_terminated_string(auth);
        }
        if let Some(db) = db {
            s.write_nul_terminated_string(db.as_bytes());
        }
        if let Some(plugin) = plugin {
            s.write_nul_terminated_string(plugin.as_bytes());
        }
        s.to_bytes()
    }

    const MODERN: u32 = CLIENT_PROTOCOL_41
        | CLIENT_SECURE_CONNECTION
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_CONNECT_WITH_DB;

    #[test]
    fn test_read_full_response() {
        let buf = response_bytes(MODERN, "root", &[9; 20], Some("tpch"), Some("mysql_native_password"));
        let packet = AuthPacket::read_from(buf).unwrap();

        assert_eq!(packet.capability().flags(), MODERN);
        assert_eq!(packet.max_packet_size(), 16 * 1024 * 1024);
        assert_eq!(packet.character_set(), UTF8MB4_GENERAL_CI);
        assert_eq!(packet.user(), "root");
        assert_eq!(packet.auth_response(), &[9; 20]);
        assert_eq!(packet.database(), Some("tpch"));
        assert_eq!(packet.plugin_name(), Some("mysql_native_password"));
        assert!(!packet.is_ssl_request());
    }

    #[test]
    fn test_no_connect_with_db_reads_plugin_next() {
        let flags = MODERN & !CLIENT_CONNECT_WITH_DB;
        let buf = response_bytes(flags, "u", b"proof", None, Some("caching_sha2_password"));
        let packet = AuthPacket::read_from(buf).unwrap();

        assert_eq!(packet.database(), None);
        assert_eq!(packet.plugin_name(), Some("caching_sha2_password"));
    }

    #[test]
    fn test_one_byte_length_proof() {
        let flags = CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION;
        let buf = response_bytes(flags, "u", &[1, 0, 2], None, None);
        let packet = AuthPacket::read_from(buf).unwrap();
        assert_eq!(packet.auth_response(), &[1, 0, 2]);
        assert_eq!(packet.plugin_name(), None);
    }

    #[test]
    fn test_nul_terminated_proof() {
        let buf = response_bytes(CLIENT_PROTOCOL_41, "old", b"abc", None, None);
        let packet = AuthPacket::read_from(buf).unwrap();
        assert_eq!(packet.auth_response(), b"abc");
    }

    #[test]
    fn test_ssl_request() {
        let mut s = MysqlSerializer::default();
        s.write_int4(MODERN | CLIENT_SSL);
        s.write_int4(0);
        s.write_int1(UTF8_GENERAL_CI);
        s.write_zeros(23);
        let buf = s.to_bytes();
        assert_eq!(buf.len(), SSL_REQUEST_LEN);

        let packet = AuthPacket::read_from(buf).unwrap();
        assert!(packet.is_ssl_request());
        assert_eq!(packet.user(), "");
    }

    #[test]
    fn test_truncated_header_fails() {
        let err = AuthPacket::read_from(Bytes::from_static(&[0x00, 0x02, 0x00])).unwrap_err();
        assert!(err.is_protocol_format());
    }

    #[test]
    fn test_proof_longer_than_packet_fails() {
        let mut s = MysqlSerializer::default();
        s.write_int4(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        s.write_int4(0);
        s.write_int1(UTF8_GENERAL_CI);
        s.write_zeros(23);
        s.write_nul_terminated_string(b"u");
        s.write_int1(20);
        s.write_bytes(&[1, 2, 3]);

        let err = AuthPacket::read_from(s.to_bytes()).unwrap_err();
        assert!(matches!(err, DorisError::PacketTruncated { needed: 20, remaining: 3 }));
    }

    #[test]
    fn test_connect_attrs() {
        let flags = MODERN | CLIENT_CONNECT_ATTRS;
        let mut s = MysqlSerializer::default();
        s.write_bytes(&response_bytes(flags, "u", b"", Some(""), Some("mysql_native_password")));
        let mut attrs = MysqlSerializer::default();
        attrs.write_len_encoded_string(b"_client_name");
        attrs.write_len_encoded_string(b"libmysql");
        attrs.write_len_encoded_string(b"_pid");
        attrs.write_len_encoded_string(b"42");
        let attrs = attrs.to_bytes();
        s.write_len_encoded_string(&attrs);

        let packet = AuthPacket::read_from(s.to_bytes()).unwrap();
        assert_eq!(packet.database(), None);
        assert_eq!(
            packet.connect_attrs(),
            &[
                ("_client_name".to_string(), "libmysql".to_string()),
                ("_pid".to_string(), "42".to_string()),
            ]
        );
    }

    #[test]
    fn test_with_auth_response_leaves_original() {
        let buf = response_bytes(MODERN, "root", b"old", Some("db"), Some("caching_sha2_password"));
        let original = AuthPacket::read_from(buf).unwrap();
        let switched = original.with_auth_response(Bytes::from_static(b"new"));

        assert_eq!(original.auth_response(), b"old");
        assert_eq!(switched.auth_response(), b"new");
        assert_eq!(switched.user(), "root");
        assert_eq!(switched.database(), Some("db"));
    }
}
