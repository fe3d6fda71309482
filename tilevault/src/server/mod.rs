//! HTTP tile server over a directory of processed stores.
//!
//! At startup every `v*.db` file in the data directory is opened
//! read-only and mapped by version; the map is immutable afterwards. The
//! server serves what the stores contain: diff reconstruction across the
//! base/diff chain happens offline or in the client, not here.

mod preview;

use crate::coord::TileCoord;
use crate::store::{StoreError, TileStore};
use axum::body::Body;
use axum::extract::{Path as UrlPath, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("no database files found in {0} (looking for v*.db)")]
    NoDatabases(String),

    #[error("failed to read index.html.tmpl: {0}")]
    Template(std::io::Error),
}

/// Immutable server state: one read-only store per discovered version.
pub struct TileServer {
    stores: HashMap<String, TileStore>,
    versions: Vec<String>,
    latest_version: String,
    index_html: String,
    preview: Vec<u8>,
}

impl TileServer {
    /// Scans `data_path` for `v*.db` stores and builds the serving state.
    pub fn new(data_path: &Path) -> Result<Self, ServerError> {
        let mut stores = HashMap::new();
        let mut descriptions = HashMap::new();

        for entry in fs::read_dir(data_path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(body) = file_name
                .strip_suffix(".db")
                .filter(|b| b.starts_with('v'))
            else {
                continue;
            };

            // `v1_2025-08-29T18` -> version v1, description 2025-08-29T18
            let (version, description) = match body.split_once('_') {
                Some((version, description)) => (version.to_string(), description.to_string()),
                None => (body.to_string(), String::new()),
            };

            info!(file = %file_name, version = %version, "initializing database");
            let store = TileStore::open(&entry.path(), true)?;
            stores.insert(version.clone(), store);
            descriptions.insert(version, description);
        }

        if stores.is_empty() {
            return Err(ServerError::NoDatabases(
                data_path.to_string_lossy().into_owned(),
            ));
        }

        let mut versions: Vec<String> = stores.keys().cloned().collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        let latest_version = versions.last().cloned().unwrap_or_default();

        let index_html = build_index(data_path, &versions, &descriptions)?;
        let preview =
            preview::make_preview(data_path, &stores, &latest_version).unwrap_or_default();

        info!(
            databases = versions.len(),
            latest = %latest_version,
            "tile server initialized"
        );
        Ok(Self {
            stores,
            versions,
            latest_version,
            index_html,
            preview,
        })
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    pub fn latest_version(&self) -> &str {
        &self.latest_version
    }
}

/// Numeric version ordering: the part after `v` compared as a float, so
/// `v0.024 < v1 < v1.002`; non-numeric versions fall back to string
/// order.
fn compare_versions(a: &str, b: &str) -> Ordering {
    let num = |v: &str| v.trim_start_matches('v').parse::<f64>().ok();
    match (num(a), num(b)) {
        (Some(fa), Some(fb)) => fa.partial_cmp(&fb).unwrap_or(Ordering::Equal),
        _ => a.cmp(b),
    }
}

/// Renders the index page from `index.html.tmpl`, substituting the
/// version picker entries.
fn build_index(
    data_path: &Path,
    versions: &[String],
    descriptions: &HashMap<String, String>,
) -> Result<String, ServerError> {
    let template =
        fs::read_to_string(data_path.join("index.html.tmpl")).map_err(ServerError::Template)?;
    let options: Vec<String> = versions
        .iter()
        .map(|version| {
            let date = descriptions.get(version).map(String::as_str).unwrap_or("");
            format!("{{version: '{version}', date: '{date}'}}")
        })
        .collect();
    Ok(template.replace("//$$VERSION_OPTIONS$$", &options.join(",")))
}

/// Builds the HTTP router over the server state.
pub fn router(state: Arc<TileServer>) -> Router {
    Router::new()
        .route("/", get(serve_index))
        .route("/preview.png", get(serve_preview))
        .route("/tiles/{version}/{z}/{x}/{y}", get(serve_tile))
        .layer(middleware::from_fn(log_requests))
        .with_state(state)
}

/// Binds and serves until the process is stopped.
pub async fn serve(server: TileServer, port: u16) -> Result<(), ServerError> {
    let app = router(Arc::new(server));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "starting tile server");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Synchronous wrapper around [`serve`] owning its own runtime.
pub fn serve_blocking(server: TileServer, port: u16) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(serve(server, port))
}

async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();
    let response = next.run(request).await;
    info!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "request"
    );
    response
}

async fn serve_index(State(state): State<Arc<TileServer>>) -> Html<String> {
    Html(state.index_html.clone())
}

async fn serve_preview(State(state): State<Arc<TileServer>>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        state.preview.clone(),
    )
        .into_response()
}

async fn serve_tile(
    State(state): State<Arc<TileServer>>,
    UrlPath((version, z, x, y)): UrlPath<(String, String, String, String)>,
    headers: HeaderMap,
) -> Response {
    // Route shape: /tiles/v<...>/{z}/{x}/{y}.png
    if !valid_version(&version) {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(y) = y.strip_suffix(".png") else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let (Ok(z), Ok(x), Ok(y)) = (z.parse::<i32>(), x.parse::<i32>(), y.parse::<i32>()) else {
        return (StatusCode::BAD_REQUEST, "Invalid tile coordinates").into_response();
    };
    if !TileCoord::new(z, x, y).is_valid() {
        return (StatusCode::BAD_REQUEST, "Invalid tile coordinates").into_response();
    }

    let Some(store) = state.stores.get(&version) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let data = match store.get(z, x, y) {
        Ok(Some(data)) => data,
        Ok(None) => return StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(version = %version, tile = %TileCoord::new(z, x, y), error = %e, "database query error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response();
        }
    };

    let etag = format!("\"{version}-{z}/{x}/{y}\"");
    if let Some(candidate) = headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok()) {
        if candidate == etag {
            return StatusCode::NOT_MODIFIED.into_response();
        }
    }

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
            (header::ETAG, etag),
        ],
        Body::from(data),
    )
        .into_response()
}

/// The version path segment must match `v[0-9a-z.]+`.
fn valid_version(version: &str) -> bool {
    let Some(rest) = version.strip_prefix('v') else {
        return false;
    };
    !rest.is_empty()
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase() || c == '.')
}
