//! `tilevault serve` - HTTP server over the processed stores.

use crate::error::CliError;
use std::env;
use std::path::PathBuf;
use tilevault::server::{serve_blocking, TileServer};

pub fn run() -> Result<(), CliError> {
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    let data_path = env::var("DATA_PATH")
        .ok()
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let server = TileServer::new(&data_path)?;
    serve_blocking(server, port)?;
    Ok(())
}
