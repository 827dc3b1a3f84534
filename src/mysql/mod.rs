// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

pub mod protocol;
pub mod error_code;
pub mod codec;
pub mod packet;
pub mod handshake;
pub mod auth_packet;
pub mod change_user;
pub mod channel;
pub mod tls;
pub mod negotiate;
pub mod server;

pub use auth_packet::AuthPacket;
pub use change_user::ChangeUserPacket;
pub use channel::{MysqlChannel, PacketChannel};
pub use error_code::ErrorCode;
pub use handshake::HandshakePacket;
pub use negotiate::{NegotiateResult, Negotiator};
pub use protocol::*;
pub use server::{ConnectionHandler, MysqlServer};
