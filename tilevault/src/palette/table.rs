//! The fixed 64-entry palette, shipped as data.
//!
//! Index 0 is reserved for fully transparent; indices 1..=63 are opaque
//! RGB colours. The table must be identical across all instances: any
//! deviation breaks diff compatibility with existing stores.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Number of palette entries, including the transparent sentinel.
pub const PALETTE_LEN: usize = 64;

/// Palette index reserved for fully transparent pixels.
pub const TRANSPARENT: u8 = 0;

/// Opaque palette entries as `(rgb, index)` pairs.
const OPAQUE_ENTRIES: [([u8; 3], u8); 63] = [
    ([0, 0, 0], 1),        // Black
    ([60, 60, 60], 2),     // Dark Gray
    ([120, 120, 120], 3),  // Gray
    ([170, 170, 170], 32), // Medium Gray
    ([210, 210, 210], 4),  // Light Gray
    ([255, 255, 255], 5),  // White
    ([96, 0, 24], 6),      // Deep Red
    ([165, 14, 30], 33),   // Dark Red
    ([237, 28, 36], 7),    // Red
    ([250, 128, 114], 34), // Light Red
    ([228, 92, 26], 35),   // Dark Orange
    ([255, 127, 39], 8),   // Orange
    ([246, 170, 9], 9),    // Gold
    ([249, 221, 59], 10),  // Yellow
    ([255, 250, 188], 11), // Light Yellow
    ([156, 132, 49], 37),  // Dark Goldenrod
    ([197, 173, 49], 38),  // Goldenrod
    ([232, 212, 95], 39),  // Light Goldenrod
    ([74, 107, 58], 40),   // Dark Olive
    ([90, 148, 74], 41),   // Olive
    ([132, 197, 115], 42), // Light Olive
    ([14, 185, 104], 12),  // Dark Green
    ([19, 230, 123], 13),  // Green
    ([135, 255, 94], 14),  // Light Green
    ([12, 129, 110], 15),  // Dark Teal
    ([16, 174, 166], 16),  // Teal
    ([19, 225, 190], 17),  // Light Teal
    ([15, 121, 159], 43),  // Dark Cyan
    ([96, 247, 242], 20),  // Cyan
    ([187, 250, 242], 44), // Light Cyan
    ([40, 80, 158], 18),   // Dark Blue
    ([64, 147, 228], 19),  // Blue
    ([125, 199, 255], 45), // Light Blue
    ([77, 49, 184], 46),   // Dark Indigo
    ([107, 80, 246], 21),  // Indigo
    ([153, 177, 251], 22), // Light Indigo
    ([74, 66, 132], 47),   // Dark Slate Blue
    ([122, 113, 196], 48), // Slate Blue
    ([181, 174, 241], 49), // Light Slate Blue
    ([120, 12, 153], 23),  // Dark Purple
    ([170, 56, 185], 24),  // Purple
    ([224, 159, 249], 25), // Light Purple
    ([203, 0, 122], 26),   // Dark Pink
    ([236, 31, 128], 27),  // Pink
    ([243, 141, 169], 28), // Light Pink
    ([155, 82, 73], 53),   // Dark Peach
    ([209, 128, 120], 54), // Peach
    ([250, 182, 164], 55), // Light Peach
    ([104, 70, 52], 29),   // Dark Brown
    ([149, 104, 42], 30),  // Brown
    ([219, 164, 99], 50),  // Light Brown
    ([123, 99, 82], 56),   // Dark Tan
    ([156, 132, 107], 57), // Tan
    ([214, 181, 148], 36), // Light Tan
    ([209, 128, 81], 51),  // Dark Beige
    ([248, 178, 119], 31), // Beige
    ([255, 197, 165], 52), // Light Beige
    ([109, 100, 63], 61),  // Dark Stone
    ([148, 140, 107], 62), // Stone
    ([205, 197, 158], 63), // Light Stone
    ([51, 57, 65], 58),    // Dark Slate
    ([109, 117, 141], 59), // Slate
    ([179, 185, 209], 60), // Light Slate
];

/// Looks up the palette index of an opaque RGB colour.
///
/// Returns `None` for colours outside the canonical table; callers map
/// those to [`TRANSPARENT`] and log a diagnostic.
pub fn rgb_to_index(rgb: [u8; 3]) -> Option<u8> {
    static LOOKUP: OnceLock<HashMap<[u8; 3], u8>> = OnceLock::new();
    LOOKUP
        .get_or_init(|| OPAQUE_ENTRIES.iter().copied().collect())
        .get(&rgb)
        .copied()
}

/// The PLTE chunk data for encoded tiles: 64 RGB triples in index order.
///
/// Unused slots (only index 0 here) are filled with black; index 0 is
/// marked fully transparent through the tRNS chunk instead.
pub fn palette_rgb() -> &'static [u8; PALETTE_LEN * 3] {
    static PLTE: OnceLock<[u8; PALETTE_LEN * 3]> = OnceLock::new();
    PLTE.get_or_init(|| {
        let mut table = [0u8; PALETTE_LEN * 3];
        for (rgb, idx) in OPAQUE_ENTRIES {
            let at = idx as usize * 3;
            table[at..at + 3].copy_from_slice(&rgb);
        }
        table
    })
}

/// The RGBA colour of a palette index.
pub fn index_to_rgba(index: u8) -> [u8; 4] {
    if index == TRANSPARENT || index as usize >= PALETTE_LEN {
        return [0, 0, 0, 0];
    }
    let plte = palette_rgb();
    let at = index as usize * 3;
    [plte[at], plte[at + 1], plte[at + 2], 255]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_indices_distinct_and_in_range() {
        let mut seen = [false; PALETTE_LEN];
        for (_, idx) in OPAQUE_ENTRIES {
            assert!(idx > 0 && (idx as usize) < PALETTE_LEN);
            assert!(!seen[idx as usize], "duplicate palette index {idx}");
            seen[idx as usize] = true;
        }
    }

    #[test]
    fn test_lookup_round_trip() {
        for (rgb, idx) in OPAQUE_ENTRIES {
            assert_eq!(rgb_to_index(rgb), Some(idx));
            assert_eq!(index_to_rgba(idx), [rgb[0], rgb[1], rgb[2], 255]);
        }
    }

    #[test]
    fn test_unknown_colour_is_absent() {
        assert_eq!(rgb_to_index([1, 2, 3]), None);
    }

    #[test]
    fn test_transparent_sentinel() {
        assert_eq!(index_to_rgba(TRANSPARENT), [0, 0, 0, 0]);
    }

    #[test]
    fn test_known_colours() {
        assert_eq!(rgb_to_index([0, 0, 0]), Some(1));
        assert_eq!(rgb_to_index([255, 255, 255]), Some(5));
        assert_eq!(rgb_to_index([179, 185, 209]), Some(60));
    }
}
