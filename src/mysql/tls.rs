// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

//! Server-side TLS for the SSLRequest upgrade

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::config::SslConfig;
use crate::error::{DorisError, Result};

pub fn build_tls_acceptor(config: &SslConfig) -> Result<TlsAcceptor> {
    let certs = load_certs(&config.cert_path)?;
    let key = load_private_key(&config.key_path)?;

    let provider = Arc::new(tokio_rustls::rustls::crypto::ring::default_provider());
    let server_config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| DorisError::Config(format!("TLS protocol versions: {}", e)))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| DorisError::Config(format!("TLS configuration error: {}", e)))?;

    info!("TLS enabled with certificate {}", config.cert_path.display());
    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path)
        .map_err(|e| DorisError::Config(format!("cannot open {}: {}", path.display(), e)))?;
    Ok(BufReader::new(file))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| DorisError::Config(format!("failed to parse certificates: {}", e)))?;

    if certs.is_empty() {
        return Err(DorisError::Config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| DorisError::Config(format!("failed to parse private key: {}", e)))?
        .ok_or_else(|| DorisError::Config(format!("no private key found in {}", path.display())))
}
