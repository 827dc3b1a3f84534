// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Connection negotiation and COM_CHANGE_USER
//!
//! ```text
//! server ---- handshake ----> client
//! server <--- [SSLRequest] -- client   (then TLS, then the full response)
//! server <--- auth packet --- client
//! server -- [auth switch] --> client   (plugin mismatch only)
//! server <-- [switch resp] -- client
//! server ---- OK / ERR -----> client   (OK is sent by the caller)
//! ```
//!
//! Each step is a `NegotiateState`. A transition returns the next state and
//! at most one packet for the driver loop to send.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::auth::AuthenticationDelegate;
use crate::catalog::CatalogManager;
use crate::error::{DorisError, Result};
use crate::session::{ConnectContext, SessionSnapshot};
use super::auth_packet::AuthPacket;
use super::change_user::ChangeUserPacket;
use super::channel::PacketChannel;
use super::error_code::ErrorCode;
use super::handshake::HandshakePacket;
use super::protocol::{MysqlCapability, AUTHENTICATION_KERBEROS_CLIENT, DEFAULT_SERVER_VERSION};

#[derive(Debug)]
pub struct NegotiateResult {
    auth_packet: Option<AuthPacket>,
    success: bool,
}

impl NegotiateResult {
    /// `None` when no auth packet could be read or parsed.
    pub fn auth_packet(&self) -> Option<&AuthPacket> {
        self.auth_packet.as_ref()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

#[derive(Debug)]
enum NegotiateState {
    Greet,
    AwaitAuth { upgraded: bool },
    MaybeUpgrade(AuthPacket),
    CapabilityCheck(AuthPacket),
    PluginReconcile(AuthPacket),
    AwaitSwitchResponse(AuthPacket),
    Authenticate(AuthPacket),
    SelectDatabase(AuthPacket),
    Accepted(AuthPacket),
    Rejected(Option<AuthPacket>),
    Aborted(Option<AuthPacket>),
}

struct Transition {
    next: NegotiateState,
    reply: Option<Bytes>,
}

impl Transition {
    fn to(next: NegotiateState) -> Self {
        Self { next, reply: None }
    }

    fn reply(next: NegotiateState, reply: Bytes) -> Self {
        Self {
            next,
            reply: Some(reply),
        }
    }
}

pub struct Negotiator {
    auth: Arc<dyn AuthenticationDelegate>,
    catalog: Arc<dyn CatalogManager>,
    enable_auth_check: bool,
    server_version: String,
}

impl Negotiator {
    pub fn new(auth: Arc<dyn AuthenticationDelegate>, catalog: Arc<dyn CatalogManager>) -> Self {
        Self {
            auth,
            catalog,
            enable_auth_check: true,
            server_version: DEFAULT_SERVER_VERSION.to_string(),
        }
    }

    pub fn with_auth_check(mut self, enable: bool) -> Self {
        self.enable_auth_check = enable;
        self
    }

    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = version.to_string();
        self
    }

    pub async fn negotiate<C>(&self, ctx: &mut ConnectContext, channel: &mut C) -> Result<NegotiateResult>
    where
        C: PacketChannel + ?Sized,
    {
        self.negotiate_with_scramble(ctx, channel, None).await
    }

    /// Negotiate using `scramble` for the greeting instead of a fresh one,
    /// for connections whose greeting was already sent by a proxy.
    ///
    /// Only failures to send are returned as `Err`; every other failure ends
    /// in an unsuccessful `NegotiateResult`.
    pub async fn negotiate_with_scramble<C>(
        &self,
        ctx: &mut ConnectContext,
        channel: &mut C,
        scramble: Option<Vec<u8>>,
    ) -> Result<NegotiateResult>
    where
        C: PacketChannel + ?Sized,
    {
        ctx.state_mut().set_ok();

        let mut handshake = HandshakePacket::new(ctx.connection_id(), ctx.supports_ssl())
            .with_server_version(&self.server_version);
        if let Some(scramble) = scramble {
            handshake = handshake.with_auth_plugin_data(scramble)?;
        }

        let mut state = NegotiateState::Greet;
        loop {
            let transition = match state {
                NegotiateState::Greet => self.greet(ctx, &handshake),
                NegotiateState::AwaitAuth { upgraded } => self.await_auth(ctx, channel, upgraded).await,
                NegotiateState::MaybeUpgrade(packet) => self.maybe_upgrade(ctx, channel, packet).await,
                NegotiateState::CapabilityCheck(packet) => self.capability_check(ctx, packet),
                NegotiateState::PluginReconcile(packet) => {
                    self.plugin_reconcile(ctx, channel.remote_ip(), &handshake, packet)
                }
                NegotiateState::AwaitSwitchResponse(packet) => self.await_switch_response(channel, packet).await,
                NegotiateState::Authenticate(packet) => {
                    let remote_ip = channel.remote_ip().to_string();
                    self.authenticate_step(ctx, &remote_ip, &handshake, packet)
                }
                NegotiateState::SelectDatabase(packet) => self.select_database(ctx, packet),
                NegotiateState::Accepted(packet) => {
                    return Ok(NegotiateResult {
                        auth_packet: Some(packet),
                        success: true,
                    });
                }
                NegotiateState::Rejected(packet) | NegotiateState::Aborted(packet) => {
                    return Ok(NegotiateResult {
                        auth_packet: packet,
                        success: false,
                    });
                }
            };

            if let Some(reply) = transition.reply {
                channel.send_packet(reply).await?;
            }
            state = transition.next;
        }
    }

    fn greet(&self, ctx: &mut ConnectContext, handshake: &HandshakePacket) -> Transition {
        let serializer = ctx.serializer();
        serializer.reset();
        handshake.write_to(serializer);
        Transition::reply(NegotiateState::AwaitAuth { upgraded: false }, serializer.to_bytes())
    }

    async fn await_auth<C>(&self, ctx: &mut ConnectContext, channel: &mut C, upgraded: bool) -> Transition
    where
        C: PacketChannel + ?Sized,
    {
        let payload = match channel.fetch_one_packet().await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("connection {} closed before authenticating", ctx.connection_id());
                return Transition::to(NegotiateState::Aborted(None));
            }
            Err(e) => {
                warn!("failed to read auth packet from {}: {}", channel.remote_ip(), e);
                return Transition::to(NegotiateState::Aborted(None));
            }
        };

        let packet = match AuthPacket::read_from(payload) {
            Ok(packet) if upgraded && packet.is_ssl_request() => {
                warn!("repeated SSL request from {}", channel.remote_ip());
                return Self::error_transition(ctx, ErrorCode::ErrNotSupportedAuthMode, &[], NegotiateState::Aborted(None));
            }
            Ok(packet) => packet,
            Err(e) => {
                warn!("malformed auth packet from {}: {}", channel.remote_ip(), e);
                return Self::error_transition(ctx, ErrorCode::ErrNotSupportedAuthMode, &[], NegotiateState::Aborted(None));
            }
        };

        if upgraded {
            Transition::to(NegotiateState::CapabilityCheck(packet))
        } else {
            Transition::to(NegotiateState::MaybeUpgrade(packet))
        }
    }

    async fn maybe_upgrade<C>(&self, ctx: &mut ConnectContext, channel: &mut C, packet: AuthPacket) -> Transition
    where
        C: PacketChannel + ?Sized,
    {
        if !packet.is_ssl_request() {
            return Transition::to(NegotiateState::CapabilityCheck(packet));
        }

        info!("start to enable ssl connection");
        let upgraded = if ctx.supports_ssl() {
            channel.upgrade_to_ssl().await
        } else {
            Err(DorisError::TransportUpgrade("server did not offer SSL".to_string()))
        };

        match upgraded {
            Ok(()) => {
                info!("enable ssl connection successfully");
                Transition::to(NegotiateState::AwaitAuth { upgraded: true })
            }
            Err(e) => {
                warn!("enable ssl connection failed: {}", e);
                Self::error_transition(
                    ctx,
                    ErrorCode::ErrChangeToSslConnectionFailed,
                    &[],
                    NegotiateState::Rejected(Some(packet)),
                )
            }
        }
    }

    fn capability_check(&self, ctx: &mut ConnectContext, packet: AuthPacket) -> Transition {
        if !MysqlCapability::is_compatible(ctx.server_capability(), packet.capability()) {
            let mismatch = DorisError::CapabilityMismatch {
                server: ctx.server_capability().flags(),
                client: packet.capability().flags(),
            };
            debug!("connection {}: {}", ctx.connection_id(), mismatch);
            return Self::error_transition(
                ctx,
                ErrorCode::ErrNotSupportedAuthMode,
                &[],
                NegotiateState::Rejected(Some(packet)),
            );
        }
        Transition::to(NegotiateState::PluginReconcile(packet))
    }

    /// Clients that name no plugin (5.1 and older) use mysql_native_password.
    fn plugin_reconcile(
        &self,
        ctx: &mut ConnectContext,
        remote_ip: &str,
        handshake: &HandshakePacket,
        packet: AuthPacket,
    ) -> Transition {
        let plugin = match packet.plugin_name() {
            Some(plugin) if !handshake.check_auth_plugin_same_as_server(plugin) => plugin.to_string(),
            _ => return Transition::to(NegotiateState::Authenticate(packet)),
        };

        ctx.serializer().reset();
        if plugin == AUTHENTICATION_KERBEROS_CLIENT {
            if !self.auth.supports_kerberos() {
                return Self::error_transition(
                    ctx,
                    ErrorCode::ErrAuthPluginNotLoaded,
                    &["authentication_kerberos"],
                    NegotiateState::Rejected(Some(packet)),
                );
            }
            let built = handshake.build_krb5_auth_request(
                ctx.serializer(),
                self.auth.as_ref(),
                remote_ip,
                packet.user(),
            );
            if let Err(e) = built {
                let msg = match e {
                    DorisError::ExternalService(msg) => msg,
                    other => other.to_string(),
                };
                let msg = format!("Building handshake with kerberos error, msg: {}", msg);
                return Self::error_transition(
                    ctx,
                    ErrorCode::ErrUnknownError,
                    &[&msg],
                    NegotiateState::Rejected(Some(packet)),
                );
            }
        } else {
            debug!("switching {} from {} to mysql_native_password", remote_ip, plugin);
            handshake.build_auth_switch_request(ctx.serializer());
        }

        let request = ctx.serializer().to_bytes();
        Transition::reply(NegotiateState::AwaitSwitchResponse(packet), request)
    }

    async fn await_switch_response<C>(&self, channel: &mut C, packet: AuthPacket) -> Transition
    where
        C: PacketChannel + ?Sized,
    {
        match channel.fetch_one_packet().await {
            Ok(Some(response)) => {
                Transition::to(NegotiateState::Authenticate(packet.with_auth_response(response)))
            }
            Ok(None) => {
                error!(
                    "auth switch failed: no response from the client for {}",
                    packet.user()
                );
                Transition::to(NegotiateState::Rejected(Some(packet)))
            }
            Err(e) => {
                error!("auth switch failed for {}: {}", packet.user(), e);
                Transition::to(NegotiateState::Rejected(Some(packet)))
            }
        }
    }

    fn authenticate_step(
        &self,
        ctx: &mut ConnectContext,
        remote_ip: &str,
        handshake: &HandshakePacket,
        packet: AuthPacket,
    ) -> Transition {
        ctx.set_capability(ctx.server_capability());
        ctx.reset_serializer();

        if !self.authenticate(ctx, remote_ip, packet.auth_response(), handshake.auth_plugin_data(), packet.user()) {
            return Self::reply_with_state(ctx, NegotiateState::Rejected(Some(packet)));
        }
        Transition::to(NegotiateState::SelectDatabase(packet))
    }

    fn select_database(&self, ctx: &mut ConnectContext, packet: AuthPacket) -> Transition {
        if let Some(db) = packet.database() {
            if !self.use_database(ctx, db) {
                return Self::reply_with_state(ctx, NegotiateState::Rejected(Some(packet)));
            }
        }
        ctx.set_connect_attrs(packet.connect_attrs().to_vec());
        Transition::to(NegotiateState::Accepted(packet))
    }

    /// Resolve `user` and bind the identity to the session. On failure the
    /// error is recorded in the session state and nothing is bound.
    ///
    /// `random_string` is the scramble the client salted its proof with.
    fn authenticate(
        &self,
        ctx: &mut ConnectContext,
        remote_ip: &str,
        auth_response: &[u8],
        random_string: &[u8],
        user: &str,
    ) -> bool {
        let use_passwd = if auth_response.is_empty() { "NO" } else { "YES" };

        if user.is_empty() {
            ctx.state_mut().report(ErrorCode::ErrAccessDeniedError, &["", use_passwd]);
            return false;
        }

        let identity = if self.enable_auth_check {
            self.auth.check_password(user, remote_ip, auth_response, random_string)
        } else {
            let matched = self.auth.best_matched_identity(user, remote_ip);
            if matched.is_none() {
                info!("enable_auth_check is false, but cannot find user '{}'@'{}'", user, remote_ip);
            }
            matched
        };

        let Some(identity) = identity else {
            ctx.state_mut().report(ErrorCode::ErrAccessDeniedError, &[user, use_passwd]);
            return false;
        };

        if identity.is_ephemeral() {
            ctx.set_current_role_ids(Default::default());
        } else {
            ctx.set_current_role_ids(self.auth.role_ids(&identity));
            ctx.set_auth_data_salt(random_string.to_vec());
        }
        ctx.set_current_user_identity(Some(identity));
        ctx.set_qualified_user(Some(user.to_string()));
        true
    }

    /// Handle a COM_CHANGE_USER payload on an established connection.
    ///
    /// On failure the ERR reply has been sent and the session is back to its
    /// previous login. On success the caller sends the OK.
    pub async fn change_user<C>(&self, ctx: &mut ConnectContext, channel: &mut C, payload: Bytes) -> Result<bool>
    where
        C: PacketChannel + ?Sized,
    {
        ctx.state_mut().set_ok();

        let packet = match ChangeUserPacket::read_from(payload, ctx.capability()) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("malformed change user packet from {}: {}", channel.remote_ip(), e);
                ctx.state_mut().report(ErrorCode::ErrNotSupportedAuthMode, &[]);
                self.send_response_packet(ctx, channel).await?;
                ctx.reset_serializer();
                return Ok(false);
            }
        };

        let snapshot = SessionSnapshot::capture(ctx);
        let previous_user = ctx.qualified_user().unwrap_or_default().to_string();
        let salt = ctx.auth_data_salt().map(<[u8]>::to_vec).unwrap_or_default();
        let remote_ip = channel.remote_ip().to_string();

        if !self.authenticate(ctx, &remote_ip, packet.auth_response(), &salt, packet.user()) {
            warn!(
                "Command `Change user` failed, from [{}] to [{}]",
                previous_user,
                packet.user()
            );
            self.send_response_packet(ctx, channel).await?;
            ctx.reset_serializer();
            snapshot.restore(ctx);
            return Ok(false);
        }

        if let Some(db) = packet.database() {
            if !self.use_database(ctx, db) {
                error!(
                    "Command `Change user` failed at stage changing db, from [{}] to [{}], err[{}]",
                    previous_user,
                    packet.user(),
                    ctx.state().error_message()
                );
                self.send_response_packet(ctx, channel).await?;
                ctx.reset_serializer();
                snapshot.restore(ctx);
                return Ok(false);
            }
        }

        ctx.set_connect_attrs(packet.connect_attrs().to_vec());
        info!(
            "Command `Change user` succeeded, from [{}] to [{}]",
            previous_user,
            ctx.qualified_user().unwrap_or_default()
        );
        Ok(true)
    }

    /// Send the OK/ERR packet describing the session state.
    pub async fn send_response_packet<C>(&self, ctx: &mut ConnectContext, channel: &mut C) -> Result<()>
    where
        C: PacketChannel + ?Sized,
    {
        let payload = Self::state_payload(ctx);
        channel.send_packet(payload).await
    }

    fn state_payload(ctx: &mut ConnectContext) -> Bytes {
        let packet = ctx.state().to_response_packet();
        let serializer = ctx.serializer();
        serializer.reset();
        packet.write_to(serializer);
        serializer.to_bytes()
    }

    fn reply_with_state(ctx: &mut ConnectContext, next: NegotiateState) -> Transition {
        Transition::reply(next, Self::state_payload(ctx))
    }

    fn error_transition(ctx: &mut ConnectContext, code: ErrorCode, args: &[&str], next: NegotiateState) -> Transition {
        ctx.state_mut().report(code, args);
        Self::reply_with_state(ctx, next)
    }

    /// Switch the session to `db` (COM_INIT_DB and the connect-time
    /// database). On failure the error is recorded in the session state.
    pub fn use_database(&self, ctx: &mut ConnectContext, db: &str) -> bool {
        match self.catalog.change_catalog_db(ctx, db) {
            Ok(()) => true,
            Err(DorisError::UnknownDatabase(db)) => {
                ctx.state_mut().report(ErrorCode::ErrBadDbError, &[&db]);
                false
            }
            Err(other) => {
                ctx.state_mut().report(ErrorCode::ErrUnknownError, &[&other.to_string()]);
                false
            }
        }
    }
}
