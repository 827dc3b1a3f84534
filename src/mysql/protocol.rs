// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! MySQL protocol constants and capability handling

use std::fmt;

pub const PROTOCOL_VERSION: u8 = 10;
pub const DEFAULT_SERVER_VERSION: &str = "5.7.99";

// Character set
pub const UTF8_GENERAL_CI: u8 = 33;
pub const UTF8MB4_GENERAL_CI: u8 = 45;

// Status flags
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

// Auth plugins
pub const NATIVE_AUTH_PLUGIN_NAME: &str = "mysql_native_password";
pub const AUTHENTICATION_KERBEROS_CLIENT: &str = "authentication_kerberos_client";

// MySQL Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Quit,
    InitDb,
    Query,
    Ping,
    ChangeUser,
    Unknown(u8),
}

impl From<u8> for Command {
    fn from(byte: u8) -> Self {
        match byte {
            0x01 => Command::Quit,
            0x02 => Command::InitDb,
            0x03 => Command::Query,
            0x0e => Command::Ping,
            0x11 => Command::ChangeUser,
            b => Command::Unknown(b),
        }
    }
}

pub const COM_CHANGE_USER: u8 = 0x11;

// MySQL Capability Flags
pub const CLIENT_LONG_PASSWORD: u32 = 0x00000001;
pub const CLIENT_FOUND_ROWS: u32 = 0x00000002;
pub const CLIENT_LONG_FLAG: u32 = 0x00000004;
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x00000008;
pub const CLIENT_NO_SCHEMA: u32 = 0x00000010;
pub const CLIENT_COMPRESS: u32 = 0x00000020;
pub const CLIENT_ODBC: u32 = 0x00000040;
pub const CLIENT_LOCAL_FILES: u32 = 0x00000080;
pub const CLIENT_IGNORE_SPACE: u32 = 0x00000100;
pub const CLIENT_PROTOCOL_41: u32 = 0x00000200;
pub const CLIENT_INTERACTIVE: u32 = 0x00000400;
pub const CLIENT_SSL: u32 = 0x00000800;
pub const CLIENT_IGNORE_SIGPIPE: u32 = 0x00001000;
pub const CLIENT_TRANSACTIONS: u32 = 0x00002000;
pub const CLIENT_RESERVED: u32 = 0x00004000;
pub const CLIENT_SECURE_CONNECTION: u32 = 0x00008000;
pub const CLIENT_MULTI_STATEMENTS: u32 = 0x00010000;
pub const CLIENT_MULTI_RESULTS: u32 = 0x00020000;
pub const CLIENT_PS_MULTI_RESULTS: u32 = 0x00040000;
pub const CLIENT_PLUGIN_AUTH: u32 = 0x00080000;
pub const CLIENT_CONNECT_ATTRS: u32 = 0x00100000;
pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x00200000;
pub const CLIENT_CAN_HANDLE_EXPIRED_PASSWORDS: u32 = 0x00400000;
pub const CLIENT_SESSION_TRACK: u32 = 0x00800000;
pub const CLIENT_DEPRECATE_EOF: u32 = 0x01000000;

/// Bits a client must declare for the server to talk to it.
pub const REQUIRED_CLIENT_FLAGS: u32 = CLIENT_PROTOCOL_41;

// Server capability flags
pub fn server_capabilities() -> u32 {
    CLIENT_LONG_PASSWORD
        | CLIENT_FOUND_ROWS
        | CLIENT_LONG_FLAG
        | CLIENT_CONNECT_WITH_DB
        | CLIENT_ODBC
        | CLIENT_IGNORE_SPACE
        | CLIENT_PROTOCOL_41
        | CLIENT_INTERACTIVE
        | CLIENT_IGNORE_SIGPIPE
        | CLIENT_TRANSACTIONS
        | CLIENT_SECURE_CONNECTION
        | CLIENT_MULTI_STATEMENTS
        | CLIENT_MULTI_RESULTS
        | CLIENT_PS_MULTI_RESULTS
        | CLIENT_PLUGIN_AUTH
        | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA
        | CLIENT_CONNECT_ATTRS
}

/// A capability bitset as declared by one side of the connection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MysqlCapability(u32);

impl MysqlCapability {
    pub const DEFAULT: MysqlCapability = MysqlCapability(0);

    pub fn new(flags: u32) -> Self {
        Self(flags)
    }

    /// What the server advertises, with `CLIENT_SSL` only when the
    /// transport can be upgraded.
    pub fn server(support_ssl: bool) -> Self {
        let flags = server_capabilities();
        if support_ssl {
            Self(flags | CLIENT_SSL)
        } else {
            Self(flags)
        }
    }

    pub fn flags(&self) -> u32 {
        self.0
    }

    fn has(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn is_protocol41(&self) -> bool {
        self.has(CLIENT_PROTOCOL_41)
    }

    pub fn is_secure_connection(&self) -> bool {
        self.has(CLIENT_SECURE_CONNECTION)
    }

    pub fn is_plugin_auth_data_length_encoded(&self) -> bool {
        self.has(CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA)
    }

    pub fn is_connected_with_db(&self) -> bool {
        self.has(CLIENT_CONNECT_WITH_DB)
    }

    pub fn is_plugin_auth(&self) -> bool {
        self.has(CLIENT_PLUGIN_AUTH)
    }

    pub fn is_connect_attrs(&self) -> bool {
        self.has(CLIENT_CONNECT_ATTRS)
    }

    pub fn is_ssl(&self) -> bool {
        self.has(CLIENT_SSL)
    }

    /// Every required bit must be offered by the server and declared by the client.
    pub fn is_compatible(server: MysqlCapability, client: MysqlCapability) -> bool {
        server.0 & client.0 & REQUIRED_CLIENT_FLAGS == REQUIRED_CLIENT_FLAGS
    }
}

impl fmt::Debug for MysqlCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MysqlCapability({:#010x})", self.0)
    }
}
