//! geolocator_api - HTTP service for the drone geolocator
//!
//! This daemon:
//! 1. Loads configuration (GEOLOCATOR_CONFIG + env overrides)
//! 2. Loads the detector model once
//! 3. Serves /detect and /health until Ctrl-C

use anyhow::{anyhow, Result};
use std::sync::{mpsc, Arc};

use drone_geolocator::{
    api::{ApiConfig, ApiServer},
    DetectionPipeline, GeolocatorConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = GeolocatorConfig::load()?;
    let pipeline = Arc::new(DetectionPipeline::from_config(&config)?);

    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
        max_upload_bytes: config.max_upload_bytes,
        max_connections: config.max_connections,
        request_timeout: config.request_timeout,
    };
    let api_handle = ApiServer::new(api_config, pipeline).spawn()?;
    log::info!("detection api listening on {}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("geolocator_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
