//! Startup preview: the latest world tile composited over a basemap.

use crate::store::TileStore;
use image::{GenericImageView, RgbaImage};
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use tracing::warn;

/// Builds the `/preview.png` payload: tile `(0, 0, 0)` of the latest
/// base version overlaid on `osm000.png` from the data directory.
///
/// A missing or mismatched basemap falls back to the raw tile; a missing
/// tile yields no preview at all.
pub(super) fn make_preview(
    data_path: &Path,
    stores: &HashMap<String, TileStore>,
    latest_version: &str,
) -> Option<Vec<u8>> {
    // Diff versions share their base's world tile
    let latest_base = latest_version.split('.').next().unwrap_or(latest_version);
    let Some(store) = stores.get(latest_base) else {
        warn!(version = latest_base, "no base store for preview");
        return None;
    };
    let tile_bytes = match store.get(0, 0, 0) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            warn!(version = latest_base, "no world tile for preview");
            return None;
        }
        Err(e) => {
            warn!(version = latest_base, error = %e, "failed to load preview tile");
            return None;
        }
    };

    let tile = match crate::palette::decode_png(&tile_bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!(error = %e, "failed to decode preview tile");
            return None;
        }
    };

    let basemap_path = data_path.join("osm000.png");
    let basemap = match image::open(&basemap_path) {
        Ok(img) => img,
        Err(e) => {
            warn!(path = %basemap_path.display(), error = %e, "no basemap, serving raw tile");
            return Some(tile_bytes);
        }
    };
    if basemap.dimensions() != tile.dimensions() {
        warn!("basemap size does not match latest tile size, serving raw tile");
        return Some(tile_bytes);
    }

    let tile = tile.to_rgba8();
    let basemap = basemap.to_rgba8();
    let mut out = RgbaImage::new(tile.width(), tile.height());
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let top = tile.get_pixel(x, y);
        *pixel = if top.0[3] > 0 {
            *top
        } else {
            *basemap.get_pixel(x, y)
        };
    }

    let mut buf = Cursor::new(Vec::new());
    match image::DynamicImage::ImageRgba8(out).write_to(&mut buf, image::ImageFormat::Png) {
        Ok(()) => Some(buf.into_inner()),
        Err(e) => {
            warn!(error = %e, "failed to encode preview");
            Some(tile_bytes)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::palette::{PalettedTile, Paletter};

    fn store_with_world_tile(dir: &Path, name: &str, pixels: Vec<u8>, side: u32) -> TileStore {
        let store = TileStore::open(&dir.join(name), false).unwrap();
        let tile = PalettedTile {
            width: side,
            height: side,
            pixels,
        };
        let data = Paletter::new().encode_png(&tile).unwrap();
        store.put_auto_crc(0, 0, 0, &data).unwrap();
        store
    }

    #[test]
    fn test_missing_basemap_serves_raw_tile() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_world_tile(dir.path(), "v1.db", vec![7, 0, 0, 7], 2);
        let mut stores = HashMap::new();
        let expected = store.get(0, 0, 0).unwrap().unwrap();
        stores.insert("v1".to_string(), store);

        let preview = make_preview(dir.path(), &stores, "v1").unwrap();
        assert_eq!(preview, expected);
    }

    #[test]
    fn test_diff_version_resolves_to_base_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_with_world_tile(dir.path(), "v1.db", vec![7], 1);
        let mut stores = HashMap::new();
        stores.insert("v1".to_string(), store);

        assert!(make_preview(dir.path(), &stores, "v1.024").is_some());
    }

    #[test]
    fn test_no_store_means_no_preview() {
        let dir = tempfile::tempdir().unwrap();
        let stores = HashMap::new();
        assert!(make_preview(dir.path(), &stores, "v9").is_none());
    }

    #[test]
    fn test_composite_over_matching_basemap() {
        let dir = tempfile::tempdir().unwrap();
        // World tile: opaque black on the diagonal, transparent elsewhere
        let store = store_with_world_tile(dir.path(), "v2.db", vec![1, 0, 0, 1], 2);

        // Matching 2x2 white basemap
        let mut basemap = RgbaImage::new(2, 2);
        for pixel in basemap.pixels_mut() {
            *pixel = image::Rgba([255, 255, 255, 255]);
        }
        basemap.save(dir.path().join("osm000.png")).unwrap();

        let mut stores = HashMap::new();
        stores.insert("v2".to_string(), store);
        let preview = make_preview(dir.path(), &stores, "v2").unwrap();

        let img = image::load_from_memory(&preview).unwrap().to_rgba8();
        // Opaque palette pixel wins, transparent pixel shows the basemap
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [255, 255, 255, 255]);
    }
}
