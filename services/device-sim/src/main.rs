//! Lamp simulator
//!
//! Pretends to be a lamp on the network so the controller can be run and
//! tested without hardware.

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lamp_device_sim::config::Config;
use lamp_device_sim::SimState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    let state = SimState::new(config.initial_color);

    lamp_device_sim::serve(listener, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal");
    })
    .await?;

    info!("Lamp simulator stopped");
    Ok(())
}
