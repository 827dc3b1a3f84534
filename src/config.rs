// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{DorisError, Result};
use crate::mysql::packet::DEFAULT_MAX_PACKET_SIZE;
use crate::mysql::protocol::DEFAULT_SERVER_VERSION;

pub const DEFAULT_CONFIG_FILE: &str = "fe_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MySQL server port
    pub query_port: u16,

    /// When false, users are matched by name and host only
    pub enable_auth_check: bool,

    /// Version string sent in the server greeting
    pub mysql_server_version: String,

    /// Catalog used when a client names a database without a catalog prefix
    pub default_catalog: String,

    /// Per-read timeout while a client is connected; unset means wait forever
    pub handshake_read_timeout_ms: Option<u64>,

    /// Largest client payload accepted after multi-packet reassembly
    pub max_packet_size: usize,

    pub ssl: Option<SslConfig>,

    pub users: Vec<UserConfig>,

    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SslConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role_ids: Vec<i64>,
    #[serde(default)]
    pub ephemeral: bool,
}

fn default_host() -> String {
    "%".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            query_port: 9030,
            enable_auth_check: true,
            mysql_server_version: DEFAULT_SERVER_VERSION.to_string(),
            default_catalog: "internal".to_string(),
            handshake_read_timeout_ms: None,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
            ssl: None,
            users: vec![UserConfig {
                name: "root".to_string(),
                host: default_host(),
                password: String::new(),
                role_ids: Vec::new(),
                ephemeral: false,
            }],
            databases: vec!["information_schema".to_string()],
        }
    }
}

impl Config {
    /// Load from `$FE_CONFIG` or `fe_config.json`, then apply environment
    /// overrides. Defaults are used only when `FE_CONFIG` is unset and
    /// `fe_config.json` does not exist.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("FE_CONFIG") {
            Ok(path) => Self::from_path(Path::new(&path), true)?,
            Err(_) => Self::from_path(Path::new(DEFAULT_CONFIG_FILE), false)?,
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// A missing file is an error when `explicit` is set.
    fn from_path(path: &Path, explicit: bool) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Self::from_json(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound && !explicit => {
                warn!("{} not found, using default configuration", path.display());
                Ok(Config::default())
            }
            Err(e) => Err(DorisError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| DorisError::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(port) = std::env::var("FE_QUERY_PORT") {
            if let Ok(port_num) = port.parse::<u16>() {
                self.query_port = port_num;
            }
        }

        if let Ok(flag) = std::env::var("ENABLE_AUTH_CHECK") {
            if let Ok(enabled) = flag.parse::<bool>() {
                self.enable_auth_check = enabled;
            }
        }

        if let Ok(version) = std::env::var("MYSQL_SERVER_VERSION") {
            if !version.is_empty() {
                self.mysql_server_version = version;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.query_port == 0 {
            return Err(DorisError::Config("query_port cannot be 0".to_string()));
        }
        if self.mysql_server_version.as_bytes().contains(&0) {
            return Err(DorisError::Config(
                "mysql_server_version cannot contain NUL".to_string(),
            ));
        }
        if let Some(ssl) = &self.ssl {
            if ssl.cert_path.as_os_str().is_empty() || ssl.key_path.as_os_str().is_empty() {
                return Err(DorisError::Config(
                    "ssl requires both cert_path and key_path".to_string(),
                ));
            }
        }
        if self.max_packet_size == 0 {
            return Err(DorisError::Config("max_packet_size must be positive".to_string()));
        }
        if self.handshake_read_timeout_ms == Some(0) {
            return Err(DorisError::Config(
                "handshake_read_timeout_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.handshake_read_timeout_ms.map(Duration::from_millis)
    }
}
