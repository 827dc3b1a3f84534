// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! In-memory user table implementing `AuthenticationDelegate`

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::UserConfig;
use crate::error::{DorisError, Result};
use super::password::{check_scramble, double_sha1, SCRAMBLE_LENGTH};
use super::{AuthenticationDelegate, UserIdentity};

/// Issues and verifies Kerberos tickets for the `authentication_kerberos`
/// plugin. Implementations talk to a KDC and are outside this crate.
pub trait KerberosTicketIssuer: Send + Sync {
    fn build_handshake_request(&self, remote_ip: &str, user: &str) -> Result<Vec<u8>>;

    fn verify_ticket(&self, user: &str, remote_ip: &str, ticket: &[u8]) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAuth {
    /// `None` means the account has no password.
    Native(Option<[u8; SCRAMBLE_LENGTH]>),
    Kerberos,
}

#[derive(Debug, Clone)]
pub struct UserEntry {
    pub identity: UserIdentity,
    pub auth: UserAuth,
    pub role_ids: HashSet<i64>,
}

impl UserEntry {
    pub fn native(user: &str, host: &str, password: &str) -> Self {
        let stored = if password.is_empty() {
            None
        } else {
            Some(double_sha1(password))
        };
        Self {
            identity: UserIdentity::new(user, host),
            auth: UserAuth::Native(stored),
            role_ids: HashSet::new(),
        }
    }

    pub fn kerberos(user: &str, host: &str) -> Self {
        Self {
            identity: UserIdentity::new(user, host),
            auth: UserAuth::Kerberos,
            role_ids: HashSet::new(),
        }
    }

    pub fn with_roles(mut self, role_ids: impl IntoIterator<Item = i64>) -> Self {
        self.role_ids = role_ids.into_iter().collect();
        self
    }

    pub fn into_ephemeral(mut self) -> Self {
        self.identity = UserIdentity::ephemeral(self.identity.user(), self.identity.host());
        self
    }

    /// How closely this entry's host pattern matches `remote_ip`, or `None`.
    /// Exact hosts beat prefix patterns (`10.0.%`), which beat `%`.
    fn host_match(&self, remote_ip: &str) -> Option<usize> {
        let host = self.identity.host();
        if host == "%" {
            Some(0)
        } else if let Some(prefix) = host.strip_suffix('%') {
            remote_ip.starts_with(prefix).then(|| 1 + prefix.len())
        } else if host == remote_ip {
            Some(usize::MAX)
        } else {
            None
        }
    }
}

#[derive(Default)]
pub struct StaticAuthenticator {
    users: DashMap<String, Vec<UserEntry>>,
    kerberos: Option<Arc<dyn KerberosTicketIssuer>>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(users: &[UserConfig]) -> Self {
        let auth = Self::new();
        for user in users {
            let mut entry = UserEntry::native(&user.name, &user.host, &user.password)
                .with_roles(user.role_ids.iter().copied());
            if user.ephemeral {
                entry = entry.into_ephemeral();
            }
            auth.add_user(entry);
        }
        auth
    }

    pub fn with_kerberos(mut self, issuer: Arc<dyn KerberosTicketIssuer>) -> Self {
        self.kerberos = Some(issuer);
        self
    }

    /// Adds or replaces the entry for the same `'user'@'host'`.
    pub fn add_user(&self, entry: UserEntry) {
        let mut entries = self.users.entry(entry.identity.user().to_string()).or_default();
        entries.retain(|e| e.identity.host() != entry.identity.host());
        entries.push(entry);
    }

    pub fn drop_user(&self, user: &str, host: &str) -> bool {
        match self.users.get_mut(user) {
            Some(mut entries) => {
                let before = entries.len();
                entries.retain(|e| e.identity.host() != host);
                before != entries.len()
            }
            None => false,
        }
    }

    fn best_match(&self, user: &str, remote_ip: &str) -> Option<UserEntry> {
        let entries = self.users.get(user)?;
        entries.iter()
            .filter_map(|e| e.host_match(remote_ip).map(|score| (score, e)))
            .max_by_key(|(score, _)| *score)
            .map(|(_, e)| e.clone())
    }
}

impl AuthenticationDelegate for StaticAuthenticator {
    fn check_password(
        &self,
        user: &str,
        remote_ip: &str,
        auth_response: &[u8],
        random_string: &[u8],
    ) -> Option<UserIdentity> {
        let entry = self.best_match(user, remote_ip)?;
        let verified = match &entry.auth {
            UserAuth::Native(None) => auth_response.is_empty(),
            UserAuth::Native(Some(stored)) => check_scramble(auth_response, random_string, stored),
            UserAuth::Kerberos => match &self.kerberos {
                Some(issuer) => issuer.verify_ticket(user, remote_ip, auth_response),
                None => false,
            },
        };
        if !verified {
            debug!("password check failed for {}", entry.identity);
            return None;
        }
        Some(entry.identity)
    }

    fn best_matched_identity(&self, user: &str, remote_ip: &str) -> Option<UserIdentity> {
        self.best_match(user, remote_ip).map(|e| e.identity)
    }

    fn role_ids(&self, identity: &UserIdentity) -> HashSet<i64> {
        self.users
            .get(identity.user())
            .and_then(|entries| {
                entries.iter()
                    .find(|e| e.identity.host() == identity.host())
                    .map(|e| e.role_ids.clone())
            })
            .unwrap_or_default()
    }

    fn supports_kerberos(&self) -> bool {
        self.kerberos.is_some()
    }

    fn build_kerberos_challenge(&self, remote_ip: &str, user: &str) -> Result<Vec<u8>> {
        match &self.kerberos {
            Some(issuer) => issuer.build_handshake_request(remote_ip, user),
            None => Err(DorisError::ExternalService(
                "kerberos authentication is not configured".to_string(),
            )),
        }
    }
}
