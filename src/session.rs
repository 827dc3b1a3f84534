// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Per-connection session state populated by the handshake

use std::collections::HashSet;

use crate::auth::UserIdentity;
use crate::mysql::codec::MysqlSerializer;
use crate::mysql::error_code::ErrorCode;
use crate::mysql::packet::{ErrPacket, OkPacket};
use crate::mysql::protocol::MysqlCapability;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionVariable {
    pub resource_group: Option<String>,
}

/// Outcome of the last operation, turned into the OK/ERR reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueryState {
    #[default]
    Ok,
    Err {
        code: ErrorCode,
        message: String,
    },
}

impl QueryState {
    pub fn set_ok(&mut self) {
        *self = QueryState::Ok;
    }

    pub fn set_error(&mut self, code: ErrorCode, message: String) {
        *self = QueryState::Err { code, message };
    }

    /// Record `code` with its message template filled from `args`.
    pub fn report(&mut self, code: ErrorCode, args: &[&str]) {
        let message = code.format_message(args);
        self.set_error(code, message);
    }

    pub fn is_error(&self) -> bool {
        matches!(self, QueryState::Err { .. })
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            QueryState::Ok => None,
            QueryState::Err { code, .. } => Some(*code),
        }
    }

    pub fn error_message(&self) -> &str {
        match self {
            QueryState::Ok => "",
            QueryState::Err { message, .. } => message,
        }
    }

    pub fn to_response_packet(&self) -> ResponsePacket {
        match self {
            QueryState::Ok => ResponsePacket::Ok(OkPacket::new()),
            QueryState::Err { code, message } => {
                ResponsePacket::Err(ErrPacket::new(code.code(), code.sql_state(), message.clone()))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum ResponsePacket {
    Ok(OkPacket),
    Err(ErrPacket),
}

impl ResponsePacket {
    pub fn write_to(&self, serializer: &mut MysqlSerializer) {
        match self {
            ResponsePacket::Ok(ok) => ok.write_to(serializer),
            ResponsePacket::Err(err) => err.write_to(serializer),
        }
    }
}

pub struct ConnectContext {
    connection_id: u32,
    server_capability: MysqlCapability,
    capability: MysqlCapability,
    serializer: MysqlSerializer,
    state: QueryState,
    current_user_identity: Option<UserIdentity>,
    current_role_ids: HashSet<i64>,
    qualified_user: Option<String>,
    auth_data_salt: Option<Vec<u8>>,
    session_variable: SessionVariable,
    current_catalog: String,
    current_db: Option<String>,
    connect_attrs: Vec<(String, String)>,
}

impl ConnectContext {
    pub fn new(connection_id: u32, support_ssl: bool) -> Self {
        Self {
            connection_id,
            server_capability: MysqlCapability::server(support_ssl),
            capability: MysqlCapability::DEFAULT,
            serializer: MysqlSerializer::new(MysqlCapability::DEFAULT),
            state: QueryState::Ok,
            current_user_identity: None,
            current_role_ids: HashSet::new(),
            qualified_user: None,
            auth_data_salt: None,
            session_variable: SessionVariable::default(),
            current_catalog: crate::catalog::DEFAULT_CATALOG.to_string(),
            current_db: None,
            connect_attrs: Vec::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: &str) -> Self {
        self.current_catalog = catalog.to_string();
        self
    }

    pub fn connection_id(&self) -> u32 {
        self.connection_id
    }

    pub fn server_capability(&self) -> MysqlCapability {
        self.server_capability
    }

    pub fn supports_ssl(&self) -> bool {
        self.server_capability.is_ssl()
    }

    pub fn capability(&self) -> MysqlCapability {
        self.capability
    }

    pub fn set_capability(&mut self, capability: MysqlCapability) {
        self.capability = capability;
    }

    pub fn serializer(&mut self) -> &mut MysqlSerializer {
        &mut self.serializer
    }

    /// Clear pending output and realign the serializer with the session
    /// capability.
    pub fn reset_serializer(&mut self) {
        self.serializer.reset();
        self.serializer.set_capability(self.capability);
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut QueryState {
        &mut self.state
    }

    pub fn current_user_identity(&self) -> Option<&UserIdentity> {
        self.current_user_identity.as_ref()
    }

    pub fn set_current_user_identity(&mut self, identity: Option<UserIdentity>) {
        self.current_user_identity = identity;
    }

    pub fn current_role_ids(&self) -> &HashSet<i64> {
        &self.current_role_ids
    }

    pub fn set_current_role_ids(&mut self, role_ids: HashSet<i64>) {
        self.current_role_ids = role_ids;
    }

    pub fn qualified_user(&self) -> Option<&str> {
        self.qualified_user.as_deref()
    }

    pub fn set_qualified_user(&mut self, user: Option<String>) {
        self.qualified_user = user;
    }

    /// Scramble the current identity authenticated with; reused by
    /// COM_CHANGE_USER.
    pub fn auth_data_salt(&self) -> Option<&[u8]> {
        self.auth_data_salt.as_deref()
    }

    pub fn set_auth_data_salt(&mut self, salt: Vec<u8>) {
        self.auth_data_salt = Some(salt);
    }

    pub fn session_variable(&self) -> &SessionVariable {
        &self.session_variable
    }

    pub fn session_variable_mut(&mut self) -> &mut SessionVariable {
        &mut self.session_variable
    }

    pub fn current_catalog(&self) -> &str {
        &self.current_catalog
    }

    pub fn current_db(&self) -> Option<&str> {
        self.current_db.as_deref()
    }

    pub fn set_catalog_db(&mut self, catalog: &str, db: &str) {
        self.current_catalog = catalog.to_string();
        self.current_db = Some(db.to_string());
    }

    pub fn connect_attrs(&self) -> &[(String, String)] {
        &self.connect_attrs
    }

    pub fn set_connect_attrs(&mut self, attrs: Vec<(String, String)>) {
        self.connect_attrs = attrs;
    }
}

/// Login state that COM_CHANGE_USER must put back when it fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    identity: Option<UserIdentity>,
    role_ids: HashSet<i64>,
    qualified_user: Option<String>,
    resource_group: Option<String>,
    auth_data_salt: Option<Vec<u8>>,
    current_catalog: String,
    current_db: Option<String>,
}

impl SessionSnapshot {
    pub fn capture(ctx: &ConnectContext) -> Self {
        Self {
            identity: ctx.current_user_identity.clone(),
            role_ids: ctx.current_role_ids.clone(),
            qualified_user: ctx.qualified_user.clone(),
            resource_group: ctx.session_variable.resource_group.clone(),
            auth_data_salt: ctx.auth_data_salt.clone(),
            current_catalog: ctx.current_catalog.clone(),
            current_db: ctx.current_db.clone(),
        }
    }

    pub fn restore(self, ctx: &mut ConnectContext) {
        ctx.current_user_identity = self.identity;
        ctx.current_role_ids = self.role_ids;
        ctx.qualified_user = self.qualified_user;
        ctx.session_variable.resource_group = self.resource_group;
        ctx.auth_data_salt = self.auth_data_salt;
        ctx.current_catalog = self.current_catalog;
        ctx.current_db = self.current_db;
    }
}
