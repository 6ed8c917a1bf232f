//! Simulator configuration.

use std::net::SocketAddr;

use anyhow::{Context, Result};

use crate::parse_color;

/// Simulator configuration (env-driven).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to listen on.
    pub listen_addr: SocketAddr,

    /// Color shown at startup.
    pub initial_color: u32,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let listen_addr = std::env::var("LAMP_SIM_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8081".to_string())
            .parse()
            .context("LAMP_SIM_LISTEN_ADDR must be a socket address (host:port).")?;

        let initial_color = match std::env::var("LAMP_SIM_INITIAL_COLOR") {
            Ok(value) => parse_color(&value)
                .context("LAMP_SIM_INITIAL_COLOR must be six hex digits (e.g. ff8800).")?,
            Err(_) => 0,
        };

        let log_level = std::env::var("LAMP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            listen_addr,
            initial_color,
            log_level,
        })
    }
}
