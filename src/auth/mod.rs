// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Identity resolution used during the MySQL handshake
//!
//! The handshake never inspects password proofs itself. It hands the proof
//! and the scramble to an `AuthenticationDelegate`, which is shared by every
//! connection and therefore has to be `Send + Sync`.

pub mod password;
pub mod static_auth;

use std::collections::HashSet;
use std::fmt;

use crate::error::{DorisError, Result};

pub use static_auth::{KerberosTicketIssuer, StaticAuthenticator, UserAuth, UserEntry};

/// An authenticated `'user'@'host'` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserIdentity {
    user: String,
    host: String,
    is_ephemeral: bool,
}

impl UserIdentity {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            is_ephemeral: false,
        }
    }

    /// Identity that must not receive persisted role bindings, e.g. one
    /// impersonated by an external system.
    pub fn ephemeral(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
            is_ephemeral: true,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_ephemeral(&self) -> bool {
        self.is_ephemeral
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}'@'{}'", self.user, self.host)
    }
}

pub trait AuthenticationDelegate: Send + Sync {
    /// Verify `auth_response` against the user's credentials, salted with
    /// `random_string` (the scramble sent in the greeting).
    fn check_password(
        &self,
        user: &str,
        remote_ip: &str,
        auth_response: &[u8],
        random_string: &[u8],
    ) -> Option<UserIdentity>;

    /// Identity lookup without credential verification, used when auth
    /// checking is disabled.
    fn best_matched_identity(&self, user: &str, remote_ip: &str) -> Option<UserIdentity>;

    /// Role ids granted to a (non-ephemeral) identity.
    fn role_ids(&self, identity: &UserIdentity) -> HashSet<i64>;

    fn supports_kerberos(&self) -> bool {
        false
    }

    /// Service-ticket challenge for a Kerberos auth request addressed to
    /// `user` connecting from `remote_ip`.
    fn build_kerberos_challenge(&self, _remote_ip: &str, _user: &str) -> Result<Vec<u8>> {
        Err(DorisError::ExternalService(
            "kerberos authentication is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let identity = UserIdentity::new("root", "%");
        assert_eq!(identity.to_string(), "'root'@'%'");
        assert!(!identity.is_ephemeral());
        assert!(UserIdentity::ephemeral("etl", "10.0.0.1").is_ephemeral());
    }
}
