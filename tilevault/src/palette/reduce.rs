//! 2x2 -> 1 tile reduction with the majority-non-transparent rule.
//!
//! Four neighbour tiles of side S are each halved and composed into one
//! S x S parent. Halving prefers the most common non-transparent palette
//! index in each 2x2 block, which keeps solid regions visually prominent
//! while discarding isolated anti-aliasing pixels.

use super::codec::{PaletteError, PalettedTile};
use super::table::TRANSPARENT;

/// Picks the reduced index for a 2x2 block `{a, b, c, d}`.
///
/// All transparent -> transparent; then triple majority among the
/// non-transparent (abc, abd, acd, bcd); then pair majority (ab, ac,
/// ad, bc, bd, cd); then the first non-transparent in a, b, c, d order.
pub fn most_non_transparent_2x2(a: u8, b: u8, c: u8, d: u8) -> u8 {
    let a0 = a == TRANSPARENT;
    let b0 = b == TRANSPARENT;
    let c0 = c == TRANSPARENT;
    let d0 = d == TRANSPARENT;

    if a0 && b0 && c0 && d0 {
        return TRANSPARENT;
    }

    if !a0 && a == b && a == c {
        return a;
    }
    if !a0 && a == b && a == d {
        return a;
    }
    if !a0 && a == c && a == d {
        return a;
    }
    if !b0 && b == c && b == d {
        return b;
    }

    if !a0 && a == b {
        return a;
    }
    if !a0 && a == c {
        return a;
    }
    if !a0 && a == d {
        return a;
    }
    if !b0 && b == c {
        return b;
    }
    if !b0 && b == d {
        return b;
    }
    if !c0 && c == d {
        return c;
    }

    for v in [a, b, c, d] {
        if v != TRANSPARENT {
            return v;
        }
    }
    TRANSPARENT
}

/// Halves `src` into the quadrant of `dst` starting at `(x_off, y_off)`.
fn reduce_into(src: &PalettedTile, dst: &mut PalettedTile, x_off: usize, y_off: usize) {
    let src_w = src.width as usize;
    let dst_w = dst.width as usize;
    let half_w = src_w / 2;
    let half_h = src.height as usize / 2;

    for y in 0..half_h {
        for x in 0..half_w {
            let a = src.pixels[(y * 2) * src_w + x * 2];
            let b = src.pixels[(y * 2) * src_w + x * 2 + 1];
            let c = src.pixels[(y * 2 + 1) * src_w + x * 2];
            let d = src.pixels[(y * 2 + 1) * src_w + x * 2 + 1];
            dst.pixels[(y + y_off) * dst_w + x + x_off] =
                most_non_transparent_2x2(a, b, c, d);
        }
    }
}

/// Halves four neighbour tiles and composes them into one parent tile.
///
/// Layout:
/// ```text
/// A B
/// C D
/// ```
/// All inputs must share the same dimensions; the output has the same
/// side length as a single input.
pub fn merge_quadrants(
    a: &PalettedTile,
    b: &PalettedTile,
    c: &PalettedTile,
    d: &PalettedTile,
) -> Result<PalettedTile, PaletteError> {
    for other in [b, c, d] {
        if other.len() != a.len() {
            return Err(PaletteError::SizeMismatch(a.len(), other.len()));
        }
    }

    let mut canvas = PalettedTile::empty(a.width, a.height);
    let half_w = a.width as usize / 2;
    let half_h = a.height as usize / 2;

    reduce_into(a, &mut canvas, 0, 0);
    reduce_into(b, &mut canvas, half_w, 0);
    reduce_into(c, &mut canvas, 0, half_h);
    reduce_into(d, &mut canvas, half_w, half_h);
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triple_majority_beats_transparent() {
        assert_eq!(most_non_transparent_2x2(5, 5, 5, 0), 5);
        assert_eq!(most_non_transparent_2x2(0, 5, 5, 5), 5);
    }

    #[test]
    fn test_pair_majority_tie_broken_to_first() {
        assert_eq!(most_non_transparent_2x2(5, 7, 0, 0), 5);
        assert_eq!(most_non_transparent_2x2(5, 5, 7, 7), 5);
        assert_eq!(most_non_transparent_2x2(0, 7, 7, 5), 7);
    }

    #[test]
    fn test_all_transparent() {
        assert_eq!(most_non_transparent_2x2(0, 0, 0, 0), 0);
    }

    #[test]
    fn test_all_distinct_picks_first_non_transparent() {
        assert_eq!(most_non_transparent_2x2(3, 5, 7, 9), 3);
        assert_eq!(most_non_transparent_2x2(0, 5, 7, 9), 5);
        assert_eq!(most_non_transparent_2x2(0, 0, 7, 9), 7);
        assert_eq!(most_non_transparent_2x2(0, 0, 0, 9), 9);
    }

    #[test]
    fn test_transparent_pair_does_not_win() {
        // Two transparent pixels never outvote a lone colour
        assert_eq!(most_non_transparent_2x2(0, 0, 3, 0), 3);
    }

    fn uniform(size: u32, index: u8) -> PalettedTile {
        PalettedTile {
            width: size,
            height: size,
            pixels: vec![index; (size * size) as usize],
        }
    }

    #[test]
    fn test_merge_quadrants_layout() {
        let merged = merge_quadrants(
            &uniform(4, 1),
            &uniform(4, 2),
            &uniform(4, 3),
            &uniform(4, 4),
        )
        .unwrap();
        assert_eq!(merged.width, 4);
        assert_eq!(merged.height, 4);
        // Top-left quadrant from A, top-right from B, etc.
        assert_eq!(merged.pixels[0], 1);
        assert_eq!(merged.pixels[3], 2);
        assert_eq!(merged.pixels[12], 3);
        assert_eq!(merged.pixels[15], 4);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let a = PalettedTile {
            width: 2,
            height: 2,
            pixels: vec![5, 0, 7, 5],
        };
        let e = PalettedTile::empty(2, 2);
        let once = merge_quadrants(&a, &e, &e, &e).unwrap();
        let twice = merge_quadrants(&a, &e, &e, &e).unwrap();
        assert_eq!(once, twice);
        // 2x2 block {5, 0, 7, 5}: pair a==d wins
        assert_eq!(once.pixels[0], 5);
    }

    #[test]
    fn test_merge_rejects_mismatched_sizes() {
        let a = uniform(4, 1);
        let small = uniform(2, 1);
        assert!(merge_quadrants(&a, &small, &a, &a).is_err());
    }
}
