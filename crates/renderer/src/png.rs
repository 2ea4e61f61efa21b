//! PNG encoding for the placeholder tile.
//!
//! Tiles below the render floor are answered with a single-color image. An
//! indexed PNG (color type 3) with a one-entry palette keeps that image a
//! few hundred bytes regardless of size.

use std::io::Write;

/// Standard web map tile edge in pixels.
pub const TILE_SIZE: usize = 256;

/// A fully transparent `TILE_SIZE` x `TILE_SIZE` PNG.
pub fn transparent_tile() -> Result<Vec<u8>, String> {
    solid_png(TILE_SIZE, TILE_SIZE, (0, 0, 0, 0))
}

/// A single-color PNG of the given size.
pub fn solid_png(width: usize, height: usize, color: (u8, u8, u8, u8)) -> Result<Vec<u8>, String> {
    let indices = vec![0u8; width * height];
    create_png_indexed(width, height, &[color], &indices)
}

/// Create an indexed PNG (color type 3) from palette and indices.
pub fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[(u8, u8, u8, u8)],
    indices: &[u8],
) -> Result<Vec<u8>, String> {
    if palette.is_empty() || palette.len() > 256 {
        return Err(format!("palette must have 1..=256 entries, got {}", palette.len()));
    }
    if indices.len() != width * height {
        return Err(format!(
            "expected {} indices for {}x{}, got {}",
            width * height,
            width,
            height,
            indices.len()
        ));
    }

    let mut png = Vec::new();

    // PNG signature
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    // IHDR chunk
    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr_data.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr_data.push(8); // bit depth (8 bits per palette index)
    ihdr_data.push(3); // color type 3 = indexed
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    write_chunk(&mut png, b"IHDR", &ihdr_data);

    // PLTE chunk (palette)
    let plte_data: Vec<u8> = palette.iter().flat_map(|(r, g, b, _)| [*r, *g, *b]).collect();
    write_chunk(&mut png, b"PLTE", &plte_data);

    // tRNS chunk, only when some entry is not opaque
    if palette.iter().any(|(_, _, _, a)| *a < 255) {
        let trns_data: Vec<u8> = palette.iter().map(|(_, _, _, a)| *a).collect();
        write_chunk(&mut png, b"tRNS", &trns_data);
    }

    let idat_data = deflate_scanlines(indices, width, height)
        .map_err(|e| format!("IDAT compression failed: {}", e))?;
    write_chunk(&mut png, b"IDAT", &idat_data);

    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Deflate one byte per pixel, each scanline prefixed with filter type 0.
fn deflate_scanlines(indices: &[u8], width: usize, height: usize) -> std::io::Result<Vec<u8>> {
    let mut uncompressed = Vec::with_capacity(height * (1 + width));
    for row in indices.chunks_exact(width.max(1)).take(height) {
        uncompressed.push(0);
        uncompressed.extend_from_slice(row);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(&uncompressed)?;
    encoder.finish()
}

/// Write a PNG chunk: length, type, data, CRC over type and data.
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transparent_tile_header() {
        let png = transparent_tile().unwrap();
        assert_eq!(&png[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        assert_eq!(&png[12..16], b"IHDR");
        assert_eq!(u32::from_be_bytes([png[16], png[17], png[18], png[19]]), 256);
        assert_eq!(u32::from_be_bytes([png[20], png[21], png[22], png[23]]), 256);
        assert_eq!(png[25], 3);
    }

    #[test]
    fn test_transparent_tile_has_trns() {
        let png = transparent_tile().unwrap();
        assert!(png.windows(4).any(|w| w == b"tRNS"));
        assert_eq!(&png[png.len() - 8..png.len() - 4], b"IEND");
    }

    #[test]
    fn test_opaque_tile_omits_trns() {
        let png = solid_png(4, 4, (255, 255, 255, 255)).unwrap();
        assert!(!png.windows(4).any(|w| w == b"tRNS"));
    }

    #[test]
    fn test_chunk_crc() {
        let mut png = Vec::new();
        write_chunk(&mut png, b"IEND", &[]);
        // Well-known CRC of an empty IEND chunk
        assert_eq!(&png[8..12], &[0xAE, 0x42, 0x60, 0x82]);
    }

    #[test]
    fn test_rejects_mismatched_indices() {
        assert!(create_png_indexed(2, 2, &[(0, 0, 0, 0)], &[0, 0, 0]).is_err());
        assert!(create_png_indexed(1, 1, &[], &[0]).is_err());
    }

    #[test]
    fn test_placeholder_is_small() {
        let png = transparent_tile().unwrap();
        assert!(png.len() < 1024, "placeholder is {} bytes", png.len());
    }
}
