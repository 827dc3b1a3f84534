// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Packet-level I/O for one client connection

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

use crate::error::{DorisError, Result};
use super::packet::{encode_payload, Packet, DEFAULT_MAX_PACKET_SIZE, MAX_PAYLOAD_LEN};

/// Whole, de-framed packets in both directions.
#[async_trait]
pub trait PacketChannel: Send {
    /// Frame and send one logical payload, flushing it.
    async fn send_packet(&mut self, payload: Bytes) -> Result<()>;

    /// Next logical payload, or `None` once the peer has closed.
    async fn fetch_one_packet(&mut self) -> Result<Option<Bytes>>;

    fn supports_ssl(&self) -> bool;

    async fn upgrade_to_ssl(&mut self) -> Result<()>;

    fn remote_ip(&self) -> &str;

    /// Start a new command phase; the client's next packet is sequence 0.
    fn reset_sequence(&mut self);
}

enum ChannelStream<S> {
    Plain(S),
    Tls(Box<TlsStream<S>>),
    /// Transport lost during a failed upgrade.
    Detached,
}

impl<S> ChannelStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            ChannelStream::Plain(s) => s.read_buf(buf).await,
            ChannelStream::Tls(s) => s.read_buf(buf).await,
            ChannelStream::Detached => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            ChannelStream::Plain(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
            ChannelStream::Tls(s) => {
                s.write_all(data).await?;
                s.flush().await
            }
            ChannelStream::Detached => Err(io::ErrorKind::NotConnected.into()),
        }
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            ChannelStream::Plain(s) => s.shutdown().await,
            ChannelStream::Tls(s) => s.shutdown().await,
            ChannelStream::Detached => Ok(()),
        }
    }
}

pub struct MysqlChannel<S> {
    stream: ChannelStream<S>,
    read_buffer: BytesMut,
    sequence_id: u8,
    remote_ip: String,
    tls_acceptor: Option<TlsAcceptor>,
    read_timeout: Option<Duration>,
    max_packet_size: usize,
}

impl<S> MysqlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, remote_ip: impl Into<String>) -> Self {
        Self {
            stream: ChannelStream::Plain(stream),
            read_buffer: BytesMut::with_capacity(8192),
            sequence_id: 0,
            remote_ip: remote_ip.into(),
            tls_acceptor: None,
            read_timeout: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_tls(mut self, acceptor: Option<TlsAcceptor>) -> Self {
        self.tls_acceptor = acceptor;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Largest reassembled payload accepted from the client.
    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn is_ssl(&self) -> bool {
        matches!(self.stream, ChannelStream::Tls(_))
    }

    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }

    /// Returns `false` on a clean EOF.
    async fn fill_buffer(&mut self) -> Result<bool> {
        let read = self.stream.read_buf(&mut self.read_buffer);
        let n = match self.read_timeout {
            Some(timeout) => tokio::time::timeout(timeout, read).await.map_err(|_| {
                DorisError::Timeout(format!(
                    "no data from {} within {}ms",
                    self.remote_ip,
                    timeout.as_millis()
                ))
            })??,
            None => read.await?,
        };
        Ok(n > 0)
    }

    async fn read_frame(&mut self) -> Result<Option<Packet>> {
        loop {
            if let Some(packet) = Packet::decode(&mut self.read_buffer) {
                return Ok(Some(packet));
            }
            if !self.fill_buffer().await? {
                if self.read_buffer.is_empty() {
                    return Ok(None);
                }
                return Err(DorisError::ConnectionClosed);
            }
        }
    }
}

#[async_trait]
impl<S> PacketChannel for MysqlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send_packet(&mut self, payload: Bytes) -> Result<()> {
        let framed = encode_payload(&payload, &mut self.sequence_id);
        self.stream.write_all(&framed).await?;
        Ok(())
    }

    async fn fetch_one_packet(&mut self) -> Result<Option<Bytes>> {
        let mut payload: Option<BytesMut> = None;
        loop {
            let frame = match self.read_frame().await? {
                Some(frame) => frame,
                None if payload.is_none() => return Ok(None),
                None => return Err(DorisError::ConnectionClosed),
            };

            if frame.sequence_id != self.sequence_id {
                return Err(DorisError::InvalidPacket(format!(
                    "packets out of order: expected sequence {}, got {}",
                    self.sequence_id, frame.sequence_id
                )));
            }
            self.sequence_id = self.sequence_id.wrapping_add(1);

            let received = payload.as_ref().map_or(0, BytesMut::len) + frame.payload.len();
            if received > self.max_packet_size {
                return Err(DorisError::InvalidPacket(format!(
                    "packet from {} exceeds max packet size {}",
                    self.remote_ip, self.max_packet_size
                )));
            }

            let more = frame.payload.len() == MAX_PAYLOAD_LEN;
            match payload.as_mut() {
                Some(buf) => buf.extend_from_slice(&frame.payload),
                None if !more => return Ok(Some(frame.payload)),
                None => payload = Some(BytesMut::from(&frame.payload[..])),
            }
            if !more {
                return Ok(payload.map(BytesMut::freeze));
            }
        }
    }

    fn supports_ssl(&self) -> bool {
        self.tls_acceptor.is_some()
    }

    async fn upgrade_to_ssl(&mut self) -> Result<()> {
        let acceptor = self
            .tls_acceptor
            .clone()
            .ok_or_else(|| DorisError::TransportUpgrade("TLS is not configured".to_string()))?;

        if !self.read_buffer.is_empty() {
            return Err(DorisError::TransportUpgrade(
                "client sent plaintext data after the SSL request".to_string(),
            ));
        }

        let stream = match std::mem::replace(&mut self.stream, ChannelStream::Detached) {
            ChannelStream::Plain(stream) => stream,
            other => {
                self.stream = other;
                return Err(DorisError::TransportUpgrade(
                    "connection is already encrypted".to_string(),
                ));
            }
        };

        match acceptor.accept(stream).await {
            Ok(tls) => {
                debug!("TLS handshake with {} complete", self.remote_ip);
                self.stream = ChannelStream::Tls(Box::new(tls));
                Ok(())
            }
            Err(e) => {
                warn!("TLS handshake with {} failed: {}", self.remote_ip, e);
                Err(DorisError::TransportUpgrade(e.to_string()))
            }
        }
    }

    fn remote_ip(&self) -> &str {
        &self.remote_ip
    }

    fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn frame(seq: u8, payload: &[u8]) -> BytesMut {
        Packet::new(seq, Bytes::copy_from_slice(payload)).encode()
    }

    #[tokio::test]
    async fn test_send_and_fetch_track_sequence() {
        let (server, mut client) = duplex(1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1");

        channel.send_packet(Bytes::from_static(b"greeting")).await.unwrap();
        let mut buf = BytesMut::new();
        client.read_buf(&mut buf).await.unwrap();
        let sent = Packet::decode(&mut buf).unwrap();
        assert_eq!(sent.sequence_id, 0);
        assert_eq!(&sent.payload[..], b"greeting");

        client.write_all(&frame(1, b"response")).await.unwrap();
        let got = channel.fetch_one_packet().await.unwrap().unwrap();
        assert_eq!(&got[..], b"response");
        assert_eq!(channel.sequence_id(), 2);
    }

    #[tokio::test]
    async fn test_fetch_reassembles_split_payload() {
        let (server, mut client) = duplex(64 * 1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1");

        let payload = vec![3u8; MAX_PAYLOAD_LEN + 5];
        let mut seq = 0;
        let framed = encode_payload(&payload, &mut seq);
        tokio::spawn(async move {
            client.write_all(&framed).await.unwrap();
            client
        });

        let got = channel.fetch_one_packet().await.unwrap().unwrap();
        assert_eq!(got.len(), MAX_PAYLOAD_LEN + 5);
        assert_eq!(channel.sequence_id(), 2);
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_payload() {
        let (server, mut client) = duplex(64 * 1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1").with_max_packet_size(MAX_PAYLOAD_LEN + 4);

        let payload = vec![7u8; MAX_PAYLOAD_LEN + 5];
        let mut seq = 0;
        let framed = encode_payload(&payload, &mut seq);
        tokio::spawn(async move {
            let _ = client.write_all(&framed).await;
            client
        });

        let err = channel.fetch_one_packet().await.unwrap_err();
        assert!(err.is_protocol_format());
    }

    #[tokio::test]
    async fn test_fetch_accepts_payload_at_limit() {
        let (server, mut client) = duplex(1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1").with_max_packet_size(8);

        client.write_all(&frame(0, b"12345678")).await.unwrap();
        let got = channel.fetch_one_packet().await.unwrap().unwrap();
        assert_eq!(&got[..], b"12345678");

        client.write_all(&frame(1, b"123456789")).await.unwrap();
        assert!(matches!(
            channel.fetch_one_packet().await,
            Err(DorisError::InvalidPacket(_))
        ));
    }

    #[tokio::test]
    async fn test_out_of_order_sequence() {
        let (server, mut client) = duplex(1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1");

        client.write_all(&frame(4, b"x")).await.unwrap();
        let err = channel.fetch_one_packet().await.unwrap_err();
        assert!(err.is_protocol_format());
    }

    #[tokio::test]
    async fn test_closed_peer() {
        let (server, client) = duplex(1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1");
        drop(client);
        assert!(channel.fetch_one_packet().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_mid_packet() {
        let (server, mut client) = duplex(1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1");
        client.write_all(&[10, 0, 0, 0, b'a']).await.unwrap();
        drop(client);
        assert!(matches!(
            channel.fetch_one_packet().await,
            Err(DorisError::ConnectionClosed)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (server, _client) = duplex(1024);
        let mut channel =
            MysqlChannel::new(server, "127.0.0.1").with_read_timeout(Some(Duration::from_millis(50)));
        assert!(matches!(
            channel.fetch_one_packet().await,
            Err(DorisError::Timeout(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_read_timeout_waits() {
        let (server, mut client) = duplex(1024);
        let mut channel =
            MysqlChannel::new(server, "127.0.0.1").with_read_timeout(Some(Duration::from_millis(50)));
        channel.set_read_timeout(None);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            client.write_all(&frame(0, b"late")).await.unwrap();
            client
        });

        let got = channel.fetch_one_packet().await.unwrap().unwrap();
        assert_eq!(&got[..], b"late");
    }

    #[tokio::test]
    async fn test_upgrade_without_tls_config() {
        let (server, _client) = duplex(1024);
        let mut channel = MysqlChannel::new(server, "127.0.0.1");
        assert!(!channel.supports_ssl());
        assert!(matches!(
            channel.upgrade_to_ssl().await,
            Err(DorisError::TransportUpgrade(_))
        ));
        // The plaintext transport is still usable.
        channel.send_packet(Bytes::from_static(b"err")).await.unwrap();
    }
}
