//! Palette codec: conversion of arbitrary PNG tiles to the fixed
//! 64-entry indexed palette, and encoding/decoding of indexed tiles.
//!
//! Every stored tile is an indexed PNG whose palette is exactly the
//! canonical table in [`table`]; one byte per pixel, each byte <= 63.

mod codec;
mod table;

pub mod diff;
pub mod reduce;

pub use codec::{decode_png, PaletteError, PalettedTile, Paletter};
pub use table::{index_to_rgba, palette_rgb, rgb_to_index, PALETTE_LEN, TRANSPARENT};
