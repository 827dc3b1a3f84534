// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

// Library exports for the Doris FE MySQL handshake
// This allows the binary and integration tests to use the modules

pub mod error;
pub mod config;
pub mod auth;
pub mod catalog;
pub mod session;
pub mod mysql;

// Re-export commonly used types
pub use error::{DorisError, Result};
pub use config::Config;
pub use auth::{AuthenticationDelegate, StaticAuthenticator, UserIdentity};
pub use catalog::{CatalogManager, InMemoryCatalog};
pub use session::ConnectContext;
pub use mysql::{MysqlServer, Negotiator};
