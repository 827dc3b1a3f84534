// Copyright 2025 Apache Doris Community
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doris_mysql_handshake::{Config, MysqlServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "doris_mysql_handshake=info,doris_fe_mysql=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded: port={}, auth_check={}, ssl={}, users={}",
        config.query_port,
        config.enable_auth_check,
        config.ssl.is_some(),
        config.users.len()
    );

    let mysql_server = MysqlServer::from_config(&config)?;
    let mysql_handle = tokio::spawn(async move {
        if let Err(e) = mysql_server.serve().await {
            error!("MySQL server error: {}", e);
        }
    });

    info!("Connect with: mysql -h 127.0.0.1 -P {} -u root", config.query_port);

    tokio::select! {
        _ = mysql_handle => {
            error!("MySQL server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    info!("Shutting down");
    Ok(())
}
