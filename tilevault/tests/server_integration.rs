//! Tile server tests over a real data directory.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tilevault::palette::{PalettedTile, Paletter};
use tilevault::server::{router, TileServer};
use tilevault::store::TileStore;
use tower::util::ServiceExt;

const INDEX_TEMPLATE: &str = "<html><script>let versions = [//$$VERSION_OPTIONS$$];</script></html>";

fn world_tile_png() -> Vec<u8> {
    let tile = PalettedTile {
        width: 4,
        height: 4,
        pixels: vec![7; 16],
    };
    Paletter::new().encode_png(&tile).unwrap()
}

/// A data dir with one base store (v1) and one diff store (v0.024).
fn data_dir() -> (TempDir, Vec<u8>) {
    let dir = TempDir::new().unwrap();
    let tile = world_tile_png();

    let store = TileStore::open(&dir.path().join("v1_2025-08-29T18.db"), false).unwrap();
    store.put_auto_crc(0, 0, 0, &tile).unwrap();
    store.put_auto_crc(2, 1, 3, b"deep tile").unwrap();
    store.close();

    let diff = TileStore::open(&dir.path().join("v0.024_2025-08-22T10.db"), false).unwrap();
    diff.put_auto_crc(0, 0, 0, b"old tile").unwrap();
    diff.close();

    fs::write(dir.path().join("index.html.tmpl"), INDEX_TEMPLATE).unwrap();
    (dir, tile)
}

async fn get(
    app: axum::Router,
    uri: &str,
    extra: Option<(header::HeaderName, &str)>,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let mut builder = Request::builder().uri(uri);
    if let Some((name, value)) = extra {
        builder = builder.header(name, value);
    }
    let response = app
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body.to_vec())
}

fn server(path: &Path) -> (Arc<TileServer>, axum::Router) {
    let state = Arc::new(TileServer::new(path).unwrap());
    let app = router(Arc::clone(&state));
    (state, app)
}

#[tokio::test]
async fn serves_stored_tile_bytes() {
    let (dir, tile) = data_dir();
    let (_state, app) = server(dir.path());

    let (status, headers, body) = get(app, "/tiles/v1/0/0/0.png", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, tile);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=86400");
    assert_eq!(headers[header::ETAG], "\"v1-0/0/0\"");
}

#[tokio::test]
async fn etag_revalidation_returns_304() {
    let (dir, _tile) = data_dir();
    let (_state, app) = server(dir.path());

    let (status, _, body) = get(
        app,
        "/tiles/v1/0/0/0.png",
        Some((header::IF_NONE_MATCH, "\"v1-0/0/0\"")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_MODIFIED);
    assert!(body.is_empty());
}

#[tokio::test]
async fn stale_etag_still_returns_tile() {
    let (dir, tile) = data_dir();
    let (_state, app) = server(dir.path());

    let (status, _, body) = get(
        app,
        "/tiles/v1/0/0/0.png",
        Some((header::IF_NONE_MATCH, "\"v1-0/0/1\"")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, tile);
}

#[tokio::test]
async fn unknown_version_is_404() {
    let (dir, _tile) = data_dir();
    let (_state, app) = server(dir.path());
    let (status, _, _) = get(app, "/tiles/v2/0/0/0.png", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn missing_tile_is_404() {
    let (dir, _tile) = data_dir();
    let (_state, app) = server(dir.path());
    let (status, _, _) = get(app, "/tiles/v1/2/0/0.png", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn out_of_range_coordinates_are_400() {
    let (dir, _tile) = data_dir();
    let (_state, app) = server(dir.path());

    let (status, _, _) = get(app.clone(), "/tiles/v1/12/0/0.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = get(app.clone(), "/tiles/v1/2/4/0.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _, _) = get(app, "/tiles/v1/1/0/abc.png", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_png_path_is_404() {
    let (dir, _tile) = data_dir();
    let (_state, app) = server(dir.path());
    let (status, _, _) = get(app, "/tiles/v1/0/0/0", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn index_lists_versions_in_numeric_order() {
    let (dir, _tile) = data_dir();
    let (state, app) = server(dir.path());

    assert_eq!(state.versions(), &["v0.024", "v1"]);
    assert_eq!(state.latest_version(), "v1");

    let (status, headers, body) = get(app, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = String::from_utf8(body).unwrap();
    assert!(html.contains(
        "{version: 'v0.024', date: '2025-08-22T10'},{version: 'v1', date: '2025-08-29T18'}"
    ));
}

#[tokio::test]
async fn preview_serves_latest_world_tile() {
    let (dir, tile) = data_dir();
    let (_state, app) = server(dir.path());

    // No osm000.png basemap in the data dir: the preview falls back to
    // the raw world tile of the latest base version.
    let (status, headers, body) = get(app, "/preview.png", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(body, tile);
}

#[tokio::test]
async fn startup_fails_without_stores() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("index.html.tmpl"), INDEX_TEMPLATE).unwrap();
    assert!(TileServer::new(dir.path()).is_err());
}
