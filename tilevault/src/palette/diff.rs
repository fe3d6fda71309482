//! Per-pixel diffs between paletted tiles sharing the canonical palette.
//!
//! A diff stores the new index where a pixel changed and the transparent
//! sentinel where it did not. Consequence: a colour-to-transparent
//! transition encodes as "no change" and is lost; accepted because diffs
//! target monotonic fills in the source domain.

use super::codec::{PaletteError, PalettedTile, Paletter};
use super::table::TRANSPARENT;

/// Computes the per-pixel diff of `new` against `base`.
///
/// Returns the diff tile and whether any pixel differs.
pub fn diff(base: &PalettedTile, new: &PalettedTile) -> Result<(PalettedTile, bool), PaletteError> {
    if base.len() != new.len() {
        return Err(PaletteError::SizeMismatch(base.len(), new.len()));
    }

    let mut pixels = vec![TRANSPARENT; base.len()];
    let mut changed = false;
    for (i, out) in pixels.iter_mut().enumerate() {
        if base.pixels[i] != new.pixels[i] {
            *out = new.pixels[i];
            // A transition *to* transparent leaves the sentinel in place
            // and does not count as a change
            changed |= new.pixels[i] != TRANSPARENT;
        }
    }

    Ok((
        PalettedTile {
            width: new.width,
            height: new.height,
            pixels,
        },
        changed,
    ))
}

/// Reconstructs a tile from a base and a diff.
pub fn undiff(base: &PalettedTile, diff: &PalettedTile) -> Result<PalettedTile, PaletteError> {
    if base.len() != diff.len() {
        return Err(PaletteError::SizeMismatch(base.len(), diff.len()));
    }

    let pixels = base
        .pixels
        .iter()
        .zip(&diff.pixels)
        .map(|(&b, &d)| if d == TRANSPARENT { b } else { d })
        .collect();

    Ok(PalettedTile {
        width: base.width,
        height: base.height,
        pixels,
    })
}

/// Diffs two encoded PNG tiles, returning the encoded diff.
///
/// Both inputs must decode as indexed images.
pub fn diff_png(
    paletter: &Paletter,
    base: &[u8],
    new: &[u8],
) -> Result<(Vec<u8>, bool), PaletteError> {
    let base_tile = paletter.decode_paletted(base)?;
    let new_tile = paletter.decode_paletted(new)?;
    let (diff_tile, changed) = diff(&base_tile, &new_tile)?;
    let encoded = paletter.encode_png(&diff_tile)?;
    Ok((encoded, changed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tile(pixels: Vec<u8>) -> PalettedTile {
        PalettedTile {
            width: pixels.len() as u32,
            height: 1,
            pixels,
        }
    }

    #[test]
    fn test_diff_marks_changes_only() {
        let base = tile(vec![1, 2, 3]);
        let new = tile(vec![1, 2, 4]);
        let (d, changed) = diff(&base, &new).unwrap();
        assert_eq!(d.pixels, vec![0, 0, 4]);
        assert!(changed);
    }

    #[test]
    fn test_diff_round_trip_on_opaque_transitions() {
        let base = tile(vec![1, 2, 3]);
        let new = tile(vec![1, 2, 4]);
        let (d, _) = diff(&base, &new).unwrap();
        assert_eq!(undiff(&base, &d).unwrap(), new);
    }

    #[test]
    fn test_colour_to_transparent_is_lost() {
        let base = tile(vec![1, 2, 3]);
        let new = tile(vec![0, 2, 3]);
        let (d, changed) = diff(&base, &new).unwrap();
        assert_eq!(d.pixels, vec![0, 0, 0]);
        assert!(!changed);
        // Reconstruction keeps the base pixel: the 1 -> 0 transition is gone
        assert_eq!(undiff(&base, &d).unwrap(), base);
    }

    #[test]
    fn test_identical_tiles_are_unchanged() {
        let base = tile(vec![5, 6, 7]);
        let (d, changed) = diff(&base, &base).unwrap();
        assert!(!changed);
        assert_eq!(d.pixels, vec![0, 0, 0]);
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let a = tile(vec![1, 2]);
        let b = tile(vec![1, 2, 3]);
        assert!(diff(&a, &b).is_err());
        assert!(undiff(&a, &b).is_err());
    }

    #[test]
    fn test_diff_png_round_trip() {
        let paletter = Paletter::new();
        let base = tile(vec![1, 2, 3, 4]);
        let new = tile(vec![1, 9, 3, 4]);
        let base_png = paletter.encode_png(&base).unwrap();
        let new_png = paletter.encode_png(&new).unwrap();

        let (diff_png_bytes, changed) = diff_png(&paletter, &base_png, &new_png).unwrap();
        assert!(changed);

        let decoded = paletter.decode_paletted(&diff_png_bytes).unwrap();
        assert_eq!(decoded.pixels, vec![0, 9, 0, 0]);
        assert_eq!(undiff(&base, &decoded).unwrap(), new);
    }
}
