//! Reader for the IDX files MNIST is distributed in.
//! Headers are big-endian: a magic number, the item count, then (for images)
//! the row and column counts. The payload is one unsigned byte per value.

use std::io::{BufReader, Read};
use std::path::Path;

use super::{RawDataset, IMAGE_SIDE, NUM_PIXELS};
use crate::error::{open, Error, Resource, Result};

const IMAGE_MAGIC: u32 = 0x0000_0803;
const LABEL_MAGIC: u32 = 0x0000_0801;

fn read_u32<R: Read>(reader: &mut R, resource: Resource) -> Result<u32> {
    let mut bytes = [0u8; 4];
    read_exact(reader, &mut bytes, resource)?;

    Ok(u32::from_be_bytes(bytes))
}

fn read_exact<R: Read>(reader: &mut R, buffer: &mut [u8], resource: Resource) -> Result<()> {
    reader.read_exact(buffer).map_err(|err| match err.kind() {
        std::io::ErrorKind::UnexpectedEof => Error::malformed(resource, "the file ended early"),
        _ => Error::Io(err),
    })
}

/// Read exactly `len` payload bytes, growing the buffer only as data arrives
fn read_payload<R: Read>(reader: &mut R, len: usize, resource: Resource) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut payload)?;

    if payload.len() != len {
        return Err(Error::malformed(
            resource,
            format!("the file ended early: {} of {} payload bytes", payload.len(), len),
        ));
    }

    Ok(payload)
}

fn read_magic<R: Read>(reader: &mut R, expected: u32, resource: Resource) -> Result<()> {
    let magic = read_u32(reader, resource)?;

    if magic != expected {
        return Err(Error::malformed(
            resource,
            format!("bad IDX magic number {:#010x}, expected {:#010x}", magic, expected),
        ));
    }

    Ok(())
}

/// Read an image file, returning the concatenated 28x28 images
pub fn read_images<R: Read>(mut reader: R, resource: Resource) -> Result<Vec<u8>> {
    read_magic(&mut reader, IMAGE_MAGIC, resource)?;
    let count = read_u32(&mut reader, resource)? as usize;
    let rows = read_u32(&mut reader, resource)? as usize;
    let cols = read_u32(&mut reader, resource)? as usize;

    if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
        return Err(Error::malformed(
            resource,
            format!("images are {}x{}, expected {}x{}", rows, cols, IMAGE_SIDE, IMAGE_SIDE),
        ));
    }

    let len = count
        .checked_mul(NUM_PIXELS)
        .ok_or_else(|| Error::malformed(resource, format!("{} images is too many", count)))?;

    read_payload(&mut reader, len, resource)
}

pub fn read_labels<R: Read>(mut reader: R, resource: Resource) -> Result<Vec<u8>> {
    read_magic(&mut reader, LABEL_MAGIC, resource)?;
    let count = read_u32(&mut reader, resource)? as usize;

    read_payload(&mut reader, count, resource)
}

/// Load a dataset from an image file and its label file
pub fn load(images: &Path, labels: &Path, resource: Resource) -> Result<RawDataset> {
    let image_file = open(images, resource)?;
    let label_file = open(labels, resource)?;

    let images = read_images(BufReader::new(image_file), resource)?;
    let labels = read_labels(BufReader::new(label_file), resource)?;

    if images.len() != labels.len() * NUM_PIXELS {
        return Err(Error::malformed(
            resource,
            format!(
                "{} images but {} labels",
                images.len() / NUM_PIXELS,
                labels.len()
            ),
        ));
    }

    Ok(RawDataset { images, labels })
}
