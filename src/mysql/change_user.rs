// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! COM_CHANGE_USER payload
//!
//! Parsed against the capability already negotiated for the session.

use bytes::{Buf, Bytes};

use crate::error::{DorisError, Result};
use super::auth_packet::read_connect_attrs;
use super::codec::*;
use super::protocol::{MysqlCapability, COM_CHANGE_USER};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUserPacket {
    user: String,
    auth_response: Bytes,
    database: String,
    character_set: Option<u16>,
    plugin_name: Option<String>,
    connect_attrs: Vec<(String, String)>,
}

impl ChangeUserPacket {
    /// `buf` starts with the command byte.
    pub fn read_from(mut buf: Bytes, capability: MysqlCapability) -> Result<Self> {
        let command = read_int1(&mut buf)?;
        if command != COM_CHANGE_USER {
            return Err(DorisError::InvalidPacket(format!(
                "expected COM_CHANGE_USER, got command {:#04x}",
                command
            )));
        }

        let user = bytes_to_string(&read_nul_terminated_string(&mut buf));

        let auth_response = if capability.is_secure_connection() {
            let len = read_int1(&mut buf)? as usize;
            read_fixed_string(&mut buf, len)?
        } else {
            read_nul_terminated_string(&mut buf)
        };

        let database = bytes_to_string(&read_nul_terminated_string(&mut buf));

        let character_set = if buf.remaining() >= 2 {
            Some(read_int2(&mut buf)?)
        } else {
            None
        };

        let plugin_name = if capability.is_plugin_auth() && buf.has_remaining() {
            Some(bytes_to_string(&read_nul_terminated_string(&mut buf)))
        } else {
            None
        };

        let connect_attrs = if capability.is_connect_attrs() && buf.has_remaining() {
            read_connect_attrs(&mut buf)?
        } else {
            Vec::new()
        };

        Ok(ChangeUserPacket {
            user,
            auth_response,
            database,
            character_set,
            plugin_name,
            connect_attrs,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn auth_response(&self) -> &[u8] {
        &self.auth_response
    }

    pub fn database(&self) -> Option<&str> {
        Some(self.database.as_str()).filter(|db| !db.is_empty())
    }

    pub fn character_set(&self) -> Option<u16> {
        self.character_set
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin_name.as_deref()
    }

    pub fn connect_attrs(&self) -> &[(String, String)] {
        &self.connect_attrs
    }
}
