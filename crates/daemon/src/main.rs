// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use orra_core::Config;
use orra_daemon::ControlPlane;
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?)).init();

    let config = load_config()?;
    let bind_addr = config.bind_addr.clone();

    let control_plane = ControlPlane::new(config);
    let app = orra_daemon::router::build(control_plane);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "orra-daemon listening");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Loads config from the path in `ORRA_CONFIG_PATH`, falling back to
/// defaults when unset. Every field not present in the file keeps its
/// `Config::default()` value (`#[serde(default)]` on the struct).
fn load_config() -> Result<Config, Box<dyn std::error::Error>> {
    match env::var("ORRA_CONFIG_PATH") {
        Ok(path) => {
            let contents = std::fs::read_to_string(&path)?;
            Ok(toml::from_str(&contents)?)
        }
        Err(_) => Ok(Config::default()),
    }
}
