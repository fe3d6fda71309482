//! Indexed PNG encode/decode and palette conversion.

use super::table::{palette_rgb, rgb_to_index, PALETTE_LEN, TRANSPARENT};
use image::RgbaImage;
use std::io::Cursor;
use thiserror::Error;
use tracing::warn;

/// Errors from palette conversion and PNG coding.
#[derive(Debug, Error)]
pub enum PaletteError {
    /// PNG stream could not be decoded
    #[error("png decode failed: {0}")]
    Decode(String),

    /// Input decoded but is not an indexed image
    #[error("image is not paletted")]
    NotIndexed,

    /// Indexed image carries no PLTE chunk
    #[error("paletted image has no palette chunk")]
    MissingPalette,

    /// Indexed bit depth outside 1/2/4/8
    #[error("unsupported indexed bit depth: {0}")]
    UnsupportedBitDepth(u8),

    /// General image decoding failure (non-indexed inputs)
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),

    /// PNG stream could not be written
    #[error("png encode failed: {0}")]
    Encode(String),

    /// Two tiles that must match in pixel count do not
    #[error("images differ in size ({0} vs {1} pixels)")]
    SizeMismatch(usize, usize),
}

/// An image held as one palette index per pixel.
///
/// Invariant: `pixels.len() == width * height` and every byte < 64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalettedTile {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl PalettedTile {
    /// An all-transparent tile of the given dimensions.
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![TRANSPARENT; (width * height) as usize],
        }
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Converts images to the canonical palette and codes indexed PNGs.
#[derive(Debug, Clone, Copy)]
pub struct Paletter {
    // BestCompression is ~9x slower for marginal gains, Fast ~4x faster
    // at a much worse ratio; Default is the chosen trade-off.
    compression: png::Compression,
}

impl Paletter {
    pub fn new() -> Self {
        Self {
            compression: png::Compression::Default,
        }
    }

    /// Decodes any PNG tile, recolours it to the canonical palette and
    /// re-encodes it as an indexed PNG.
    pub fn pack(&self, data: &[u8]) -> Result<Vec<u8>, PaletteError> {
        let tile = self.to_paletted(data)?;
        self.encode_png(&tile)
    }

    /// Decodes any PNG tile into the canonical palette.
    ///
    /// Indexed inputs are remapped entry-by-entry (fully transparent
    /// entries go to index 0 regardless of RGB); other inputs are
    /// converted per pixel. Colours outside the table map to transparent
    /// with a diagnostic.
    pub fn to_paletted(&self, data: &[u8]) -> Result<PalettedTile, PaletteError> {
        match self.decode_paletted(data) {
            Ok(tile) => Ok(tile),
            Err(PaletteError::NotIndexed) => {
                let img = decode_png(data)?;
                Ok(self.from_rgba(&img.to_rgba8()))
            }
            Err(e) => Err(e),
        }
    }

    /// Converts an RGBA image to the canonical palette, pixel by pixel.
    pub fn from_rgba(&self, img: &RgbaImage) -> PalettedTile {
        let pixels = img
            .pixels()
            .map(|p| {
                let [r, g, b, a] = p.0;
                if a == 0 {
                    TRANSPARENT
                } else {
                    rgb_to_index([r, g, b]).unwrap_or_else(|| {
                        warn!(r, g, b, "unknown colour, mapping to transparent");
                        TRANSPARENT
                    })
                }
            })
            .collect();
        PalettedTile {
            width: img.width(),
            height: img.height(),
            pixels,
        }
    }

    /// Decodes an indexed PNG into the canonical palette.
    ///
    /// Fails with [`PaletteError::NotIndexed`] for any other colour type.
    pub fn decode_paletted(&self, data: &[u8]) -> Result<PalettedTile, PaletteError> {
        let mut decoder = png::Decoder::new(Cursor::new(data));
        decoder.set_transformations(png::Transformations::IDENTITY);
        let mut reader = decoder
            .read_info()
            .map_err(|e| PaletteError::Decode(e.to_string()))?;
        let mut buf = vec![0u8; reader.output_buffer_size()];
        let info = reader
            .next_frame(&mut buf)
            .map_err(|e| PaletteError::Decode(e.to_string()))?;
        if info.color_type != png::ColorType::Indexed {
            return Err(PaletteError::NotIndexed);
        }

        let indices = unpack_indices(&buf[..info.buffer_size()], &info)?;

        let png_info = reader.info();
        let plte = png_info.palette.as_ref().ok_or(PaletteError::MissingPalette)?;
        let trns: &[u8] = png_info.trns.as_deref().unwrap_or(&[]);
        let remap = remap_table(plte, trns);

        let pixels = indices.iter().map(|&i| remap[i as usize]).collect();
        Ok(PalettedTile {
            width: info.width,
            height: info.height,
            pixels,
        })
    }

    /// Encodes a paletted tile as an indexed PNG with palette exactly P
    /// and index 0 marked transparent through tRNS.
    pub fn encode_png(&self, tile: &PalettedTile) -> Result<Vec<u8>, PaletteError> {
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, tile.width, tile.height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(&palette_rgb()[..]);
        encoder.set_trns(&[0u8][..]);
        encoder.set_compression(self.compression);
        let mut writer = encoder
            .write_header()
            .map_err(|e| PaletteError::Encode(e.to_string()))?;
        writer
            .write_image_data(&tile.pixels)
            .map_err(|e| PaletteError::Encode(e.to_string()))?;
        drop(writer);
        Ok(out)
    }
}

impl Default for Paletter {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a PNG of any colour type into a dynamic image.
pub fn decode_png(data: &[u8]) -> Result<image::DynamicImage, PaletteError> {
    Ok(image::load_from_memory(data)?)
}

/// Builds the source-palette-index -> canonical-index table.
///
/// Fully transparent entries (tRNS alpha 0) map to index 0 regardless of
/// their RGB value.
fn remap_table(plte: &[u8], trns: &[u8]) -> [u8; 256] {
    let mut remap = [TRANSPARENT; 256];
    for (i, rgb) in plte.chunks_exact(3).enumerate().take(256) {
        let alpha = trns.get(i).copied().unwrap_or(255);
        if alpha == 0 {
            continue;
        }
        remap[i] = rgb_to_index([rgb[0], rgb[1], rgb[2]]).unwrap_or_else(|| {
            warn!(
                r = rgb[0],
                g = rgb[1],
                b = rgb[2],
                "unknown colour, mapping to transparent"
            );
            TRANSPARENT
        });
    }
    remap
}

/// Expands packed index rows (bit depths 1/2/4) to one byte per pixel.
fn unpack_indices(buf: &[u8], info: &png::OutputInfo) -> Result<Vec<u8>, PaletteError> {
    let width = info.width as usize;
    let height = info.height as usize;
    let depth = info.bit_depth as u8;
    if depth == 8 {
        return Ok(buf.to_vec());
    }
    if !matches!(depth, 1 | 2 | 4) {
        return Err(PaletteError::UnsupportedBitDepth(depth));
    }

    let per_byte = 8 / depth as usize;
    let mask = (1u16 << depth) as u8 - 1;
    let mut pixels = Vec::with_capacity(width * height);
    for row in buf.chunks(info.line_size) {
        for x in 0..width {
            let byte = row[x / per_byte];
            let shift = 8 - depth as usize * (x % per_byte + 1);
            pixels.push((byte >> shift) & mask);
        }
    }
    Ok(pixels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn rgba_tile(colours: &[[u8; 4]], width: u32) -> RgbaImage {
        let height = colours.len() as u32 / width;
        let mut img = RgbaImage::new(width, height);
        for (i, c) in colours.iter().enumerate() {
            img.put_pixel(i as u32 % width, i as u32 / width, Rgba(*c));
        }
        img
    }

    fn encode_rgba_png(img: &RgbaImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_from_rgba_maps_known_colours() {
        let img = rgba_tile(
            &[
                [0, 0, 0, 255],       // Black -> 1
                [255, 255, 255, 255], // White -> 5
                [237, 28, 36, 255],   // Red -> 7
                [0, 0, 0, 0],         // transparent -> 0
            ],
            2,
        );
        let tile = Paletter::new().from_rgba(&img);
        assert_eq!(tile.pixels, vec![1, 5, 7, 0]);
    }

    #[test]
    fn test_from_rgba_unknown_colour_goes_transparent() {
        let img = rgba_tile(&[[1, 2, 3, 255]], 1);
        let tile = Paletter::new().from_rgba(&img);
        assert_eq!(tile.pixels, vec![0]);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let paletter = Paletter::new();
        let tile = PalettedTile {
            width: 4,
            height: 2,
            pixels: vec![0, 1, 5, 7, 63, 12, 0, 31],
        };
        let encoded = paletter.encode_png(&tile).unwrap();
        let decoded = paletter.decode_paletted(&encoded).unwrap();
        assert_eq!(decoded, tile);
    }

    #[test]
    fn test_to_paletted_idempotent() {
        let paletter = Paletter::new();
        let img = rgba_tile(
            &[
                [96, 0, 24, 255],
                [246, 170, 9, 255],
                [0, 0, 0, 0],
                [19, 230, 123, 255],
            ],
            2,
        );
        let png1 = paletter.pack(&encode_rgba_png(&img)).unwrap();
        let png2 = paletter.pack(&png1).unwrap();
        assert_eq!(png1, png2);
    }

    #[test]
    fn test_decode_paletted_rejects_rgba() {
        let paletter = Paletter::new();
        let data = encode_rgba_png(&rgba_tile(&[[0, 0, 0, 255]], 1));
        assert!(matches!(
            paletter.decode_paletted(&data),
            Err(PaletteError::NotIndexed)
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Paletter::new().to_paletted(b"not a png").is_err());
    }

    #[test]
    fn test_foreign_palette_is_remapped() {
        // Encode with a shuffled palette: entry 0 = Red, entry 1 = transparent
        let mut out = Vec::new();
        let mut encoder = png::Encoder::new(&mut out, 2, 1);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(&[237, 28, 36, 9, 9, 9][..]);
        encoder.set_trns(&[255u8, 0][..]);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0, 1]).unwrap();
        drop(writer);

        let tile = Paletter::new().decode_paletted(&out).unwrap();
        assert_eq!(tile.pixels, vec![7, 0]);
    }

    #[test]
    fn test_empty_tile() {
        let tile = PalettedTile::empty(3, 2);
        assert_eq!(tile.len(), 6);
        assert!(tile.pixels.iter().all(|&p| p == TRANSPARENT));
    }
}
