use std::net::SocketAddr;

use anyhow::Result;

use crate::db::DbConfig;
use crate::notify::SmtpConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub dev_mode: bool,
    pub database: DbConfig,
    /// SMTP relay settings; `None` selects the no-op notifier.
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("MARMA_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let log_level = std::env::var("MARMA_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let dev_mode = std::env::var("MARMA_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let database = DbConfig::from_env();

        let smtp = smtp_from_env();

        Ok(Self {
            listen_addr,
            log_level,
            dev_mode,
            database,
            smtp,
        })
    }
}

fn smtp_from_env() -> Option<SmtpConfig> {
    let host = std::env::var("MARMA_SMTP_HOST").ok()?;

    let port = std::env::var("MARMA_SMTP_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(465);

    let username = std::env::var("MARMA_SMTP_USERNAME").unwrap_or_default();
    let password = std::env::var("MARMA_SMTP_PASSWORD").unwrap_or_default();

    let from = std::env::var("MARMA_SMTP_FROM")
        .unwrap_or_else(|_| "MARMA Registry <no-reply@marma.org>".to_string());

    Some(SmtpConfig {
        host,
        port,
        username,
        password,
        from,
    })
}
