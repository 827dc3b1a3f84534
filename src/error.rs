// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DorisError {
    /// A read ran past the end of the packet buffer.
    #[error("Packet truncated: needed {needed} bytes, {remaining} remaining")]
    PacketTruncated { needed: usize, remaining: usize },

    /// Length-encoded integer carried the 0xFB NULL marker.
    #[error("Unexpected NULL length-encoded integer")]
    NullLengthEncodedInt,

    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Client capability {client:#010x} is not compatible with server capability {server:#010x}")]
    CapabilityMismatch { server: u32, client: u32 },

    #[error("Transport upgrade failed: {0}")]
    TransportUpgrade(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Unknown database '{0}'")]
    UnknownDatabase(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection closed")]
    ConnectionClosed,
}

impl DorisError {
    /// True for errors caused by malformed client input rather than the server.
    pub fn is_protocol_format(&self) -> bool {
        matches!(
            self,
            DorisError::PacketTruncated { .. }
                | DorisError::NullLengthEncodedInt
                | DorisError::InvalidPacket(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DorisError>;
