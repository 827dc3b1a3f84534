// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::auth::{AuthenticationDelegate, StaticAuthenticator};
use crate::catalog::InMemoryCatalog;
use crate::config::Config;
use crate::error::Result;
use crate::session::ConnectContext;
use super::channel::{MysqlChannel, PacketChannel};
use super::codec::bytes_to_string;
use super::error_code::ErrorCode;
use super::negotiate::Negotiator;
use super::packet::DEFAULT_MAX_PACKET_SIZE;
use super::protocol::Command;
use super::tls::build_tls_acceptor;

/// Drives one client connection from greeting to disconnect.
#[derive(Clone)]
pub struct ConnectionHandler {
    negotiator: Arc<Negotiator>,
    tls_acceptor: Option<TlsAcceptor>,
    read_timeout: Option<Duration>,
    max_packet_size: usize,
    default_catalog: String,
}

impl ConnectionHandler {
    pub fn new(negotiator: Arc<Negotiator>) -> Self {
        Self {
            negotiator,
            tls_acceptor: None,
            read_timeout: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            default_catalog: crate::catalog::DEFAULT_CATALOG.to_string(),
        }
    }

    pub fn with_tls(mut self, acceptor: Option<TlsAcceptor>) -> Self {
        self.tls_acceptor = acceptor;
        self
    }

    /// Applies to reads during negotiation only; an authenticated session may idle.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_packet_size(mut self, max_packet_size: usize) -> Self {
        self.max_packet_size = max_packet_size;
        self
    }

    pub fn with_default_catalog(mut self, catalog: &str) -> Self {
        self.default_catalog = catalog.to_string();
        self
    }

    pub async fn handle<S>(&self, connection_id: u32, stream: S, remote_ip: String) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut channel = MysqlChannel::new(stream, remote_ip)
            .with_tls(self.tls_acceptor.clone())
            .with_read_timeout(self.read_timeout)
            .with_max_packet_size(self.max_packet_size);
        let mut ctx = ConnectContext::new(connection_id, channel.supports_ssl())
            .with_catalog(&self.default_catalog);

        let result = self.negotiator.negotiate(&mut ctx, &mut channel).await?;
        if !result.is_success() {
            info!("Connection {} from {} rejected", connection_id, channel.remote_ip());
            let _ = channel.close().await;
            return Ok(());
        }

        ctx.state_mut().set_ok();
        self.negotiator.send_response_packet(&mut ctx, &mut channel).await?;
        channel.set_read_timeout(None);
        info!(
            "Connection {} authenticated as {}{}",
            connection_id,
            ctx.current_user_identity().map(ToString::to_string).unwrap_or_default(),
            if channel.is_ssl() { " over TLS" } else { "" }
        );

        while self.handle_command(&mut ctx, &mut channel).await? {}

        info!("Client disconnected: {}", connection_id);
        let _ = channel.close().await;
        Ok(())
    }

    /// Returns `false` when the connection should be closed.
    async fn handle_command<S>(&self, ctx: &mut ConnectContext, channel: &mut MysqlChannel<S>) -> Result<bool>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        channel.reset_sequence();
        let payload = match channel.fetch_one_packet().await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!("Connection {} read failed: {}", ctx.connection_id(), e);
                return Ok(false);
            }
        };

        ctx.state_mut().set_ok();
        let Some(&cmd_byte) = payload.first() else {
            ctx.state_mut().report(ErrorCode::ErrUnknownComError, &[]);
            self.negotiator.send_response_packet(ctx, channel).await?;
            return Ok(true);
        };

        let command = Command::from(cmd_byte);
        debug!("Command: {:?}", command);

        match command {
            Command::Quit => return Ok(false),
            Command::Ping => {}
            Command::InitDb => {
                let db = bytes_to_string(&payload[1..]);
                if self.negotiator.use_database(ctx, &db) {
                    info!("Changed database to: {}", db);
                }
            }
            Command::ChangeUser => {
                if !self.negotiator.change_user(ctx, channel, payload).await? {
                    return Ok(true);
                }
            }
            Command::Query | Command::Unknown(_) => {
                warn!("Unsupported command: 0x{:02x}", cmd_byte);
                ctx.state_mut().report(ErrorCode::ErrUnknownComError, &[]);
            }
        }

        self.negotiator.send_response_packet(ctx, channel).await?;
        Ok(true)
    }
}

pub struct MysqlServer {
    port: u16,
    connection_id_counter: Arc<AtomicU32>,
    handler: ConnectionHandler,
}

impl MysqlServer {
    pub fn new(port: u16, handler: ConnectionHandler) -> Self {
        Self {
            port,
            connection_id_counter: Arc::new(AtomicU32::new(1)),
            handler,
        }
    }

    /// Static users, in-memory catalog and optional TLS, all from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let auth: Arc<dyn AuthenticationDelegate> = Arc::new(StaticAuthenticator::from_config(&config.users));
        let catalog = Arc::new(
            InMemoryCatalog::new(&config.default_catalog).with_databases(&config.databases),
        );
        let negotiator = Negotiator::new(auth, catalog)
            .with_auth_check(config.enable_auth_check)
            .with_server_version(&config.mysql_server_version);

        let tls_acceptor = config.ssl.as_ref().map(build_tls_acceptor).transpose()?;

        let handler = ConnectionHandler::new(Arc::new(negotiator))
            .with_tls(tls_acceptor)
            .with_read_timeout(config.read_timeout())
            .with_max_packet_size(config.max_packet_size)
            .with_default_catalog(&config.default_catalog);

        Ok(Self::new(config.query_port, handler))
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("MySQL server listening on {}", addr);
        self.serve_listener(listener).await
    }

    pub async fn serve_listener(self, listener: TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let connection_id = self.connection_id_counter.fetch_add(1, Ordering::SeqCst);
                    let handler = self.handler.clone();

                    info!("Accepted connection from {}, ID: {}", addr, connection_id);

                    tokio::spawn(async move {
                        if let Err(e) = handler.handle(connection_id, stream, remote_ip(&addr)).await {
                            error!("Connection {} error: {}", connection_id, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

fn remote_ip(addr: &SocketAddr) -> String {
    addr.ip().to_string()
}
