//! Decoder for uncompressed 24 bits-per-pixel BMP files holding a single
//! 28x28 digit.

use std::io::Read;
use std::path::Path;

use super::{IMAGE_SIDE, NUM_PIXELS};
use crate::error::{open, Error, Resource, Result};

const HEADER_SIZE: usize = 54;

fn u16_at(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Decode a bitmap into one greyscale byte per pixel, left to right then top
/// to bottom. The first channel byte of every pixel is used.
pub fn decode(bytes: &[u8]) -> Result<Vec<u8>> {
    if bytes.len() < HEADER_SIZE || &bytes[0..2] != b"BM" {
        return Err(Error::UnsupportedImage("not a bitmap".to_string()));
    }

    let offset = u32_at(bytes, 10) as usize;
    let width = u32_at(bytes, 18) as i32;
    let height = u32_at(bytes, 22) as i32;
    let bits_per_pixel = u16_at(bytes, 28);
    let compression = u32_at(bytes, 30);

    if bits_per_pixel != 24 {
        return Err(Error::UnsupportedImage(
            "only 24 bits per pixel images are supported".to_string(),
        ));
    }
    if compression != 0 {
        return Err(Error::UnsupportedImage(
            "only uncompressed images are supported".to_string(),
        ));
    }
    if width != IMAGE_SIDE as i32 || height.unsigned_abs() as usize != IMAGE_SIDE {
        return Err(Error::UnsupportedImage(format!(
            "the image must be {} by {} pixels",
            IMAGE_SIDE, IMAGE_SIDE
        )));
    }

    // Rows are padded to a multiple of four bytes
    let stride = (IMAGE_SIDE * 3 + 3) & !3;
    if bytes.len() < offset + stride * IMAGE_SIDE {
        return Err(Error::UnsupportedImage("pixel data is truncated".to_string()));
    }

    // Positive heights store the bottom row first
    let bottom_up = height > 0;
    let mut output = vec![0u8; NUM_PIXELS];

    for row in 0..IMAGE_SIDE {
        let target_row = if bottom_up { IMAGE_SIDE - row - 1 } else { row };

        for col in 0..IMAGE_SIDE {
            output[target_row * IMAGE_SIDE + col] = bytes[offset + row * stride + col * 3];
        }
    }

    Ok(output)
}

pub fn read_image(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    open(path, Resource::Image)?.read_to_end(&mut bytes)?;

    decode(&bytes)
}
