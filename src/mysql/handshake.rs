// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! MySQL Handshake Protocol
//!
//! Implements the server side of the greeting:
//! 1. Server sends Initial Handshake packet (v10)
//! 2. Client responds with HandshakeResponse41
//! 3. Server may ask the client to switch auth plugin
//! 4. Server sends OK or ERR packet

use rand::Rng;

use crate::auth::password::SCRAMBLE_LENGTH;
use crate::auth::AuthenticationDelegate;
use crate::error::{DorisError, Result};
use super::codec::MysqlSerializer;
use super::protocol::*;

const SCRAMBLE_PART1_LENGTH: usize = 8;
const AUTH_SWITCH_REQUEST: u8 = 0xfe;

/// Initial handshake packet sent by server
#[derive(Debug, Clone)]
pub struct HandshakePacket {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub capability: MysqlCapability,
    pub character_set: u8,
    pub status_flags: u16,
    auth_plugin_data: Vec<u8>,
}

impl HandshakePacket {
    /// Create new handshake with random scramble
    pub fn new(connection_id: u32, support_ssl: bool) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            server_version: DEFAULT_SERVER_VERSION.to_string(),
            connection_id,
            capability: MysqlCapability::server(support_ssl),
            character_set: UTF8_GENERAL_CI,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            auth_plugin_data: generate_scramble(),
        }
    }

    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = version.to_string();
        self
    }

    /// Use a scramble chosen elsewhere, e.g. by a proxy that already greeted
    /// the client.
    pub fn with_auth_plugin_data(mut self, data: Vec<u8>) -> Result<Self> {
        if data.len() != SCRAMBLE_LENGTH {
            return Err(DorisError::InvalidPacket(format!(
                "scramble must be {} bytes, got {}",
                SCRAMBLE_LENGTH,
                data.len()
            )));
        }
        self.auth_plugin_data = data;
        Ok(self)
    }

    pub fn auth_plugin_data(&self) -> &[u8] {
        &self.auth_plugin_data
    }

    pub fn check_auth_plugin_same_as_server(&self, plugin_name: &str) -> bool {
        plugin_name == NATIVE_AUTH_PLUGIN_NAME
    }

    pub fn write_to(&self, serializer: &mut MysqlSerializer) {
        let capability = self.capability;

        // Protocol version
        serializer.write_int1(self.protocol_version);

        // Server version
        serializer.write_nul_terminated_string(self.server_version.as_bytes());

        // Connection ID
        serializer.write_int4(self.connection_id);

        // Auth plugin data part 1 (8 bytes) and filler
        serializer.write_bytes(&self.auth_plugin_data[..SCRAMBLE_PART1_LENGTH]);
        serializer.write_int1(0);

        // Capability flags (lower 2 bytes)
        serializer.write_int2((capability.flags() & 0xffff) as u16);

        // Character set
        serializer.write_int1(self.character_set);

        // Status flags
        serializer.write_int2(self.status_flags);

        // Capability flags (upper 2 bytes)
        serializer.write_int2((capability.flags() >> 16) as u16);

        // Auth plugin data length, counting the trailing NUL
        if capability.is_plugin_auth() {
            serializer.write_int1(self.auth_plugin_data.len() as u8 + 1);
        } else {
            serializer.write_int1(0);
        }

        // Reserved (10 bytes)
        serializer.write_zeros(10);

        // Auth plugin data part 2 (12 bytes)
        if capability.is_secure_connection() {
            serializer.write_nul_terminated_string(&self.auth_plugin_data[SCRAMBLE_PART1_LENGTH..]);
        }

        // Auth plugin name
        if capability.is_plugin_auth() {
            serializer.write_nul_terminated_string(NATIVE_AUTH_PLUGIN_NAME.as_bytes());
        }
    }

    /// Protocol::AuthSwitchRequest asking the client to redo its proof with
    /// mysql_native_password and the same scramble.
    pub fn build_auth_switch_request(&self, serializer: &mut MysqlSerializer) {
        serializer.write_int1(AUTH_SWITCH_REQUEST);
        serializer.write_nul_terminated_string(NATIVE_AUTH_PLUGIN_NAME.as_bytes());
        serializer.write_bytes(&self.auth_plugin_data);
        serializer.write_int1(0);
    }

    /// AuthSwitchRequest for `authentication_kerberos_client` carrying a
    /// service-ticket challenge issued for `user` at `remote_ip`.
    ///
    /// Nothing is written if the challenge cannot be issued.
    pub fn build_krb5_auth_request(
        &self,
        serializer: &mut MysqlSerializer,
        auth: &dyn AuthenticationDelegate,
        remote_ip: &str,
        user: &str,
    ) -> Result<()> {
        let challenge = auth
            .build_kerberos_challenge(remote_ip, user)
            .map_err(|e| match e {
                DorisError::ExternalService(msg) => DorisError::ExternalService(msg),
                other => DorisError::ExternalService(other.to_string()),
            })?;

        serializer.write_int1(AUTH_SWITCH_REQUEST);
        serializer.write_nul_terminated_string(AUTHENTICATION_KERBEROS_CLIENT.as_bytes());
        serializer.write_bytes(&challenge);
        Ok(())
    }
}

/// Printable random bytes; part 2 is NUL-terminated on the wire so the
/// scramble itself must not contain NUL.
fn generate_scramble() -> Vec<u8> {
    let mut rng = rand::rng();
    (0..SCRAMBLE_LENGTH)
        .map(|_| rng.random_range(0x21u8..0x7f))
        .collect()
}
