//! Saved parameter files.
//!
//! The brainsave layout is a bare run of native-endian `f64`s: every layer's
//! weights (row-major) in layer order, then every layer's bias in layer order.
//! For the digit classifier that is W1, W2, b1, b2. There is no header, so the
//! shapes come from the layer specs the file is read against.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use json::object;

use super::neural_net::NeuralNet;
use super::LayerSpec;
use crate::error::{open, Error, Resource, Result};
use crate::linalg::Matrix;

const VALUE_SIZE: usize = std::mem::size_of::<f64>();

/// Size in bytes of a brainsave for the given architecture
pub fn saved_size(specs: &[LayerSpec]) -> usize {
    specs
        .iter()
        .map(|spec| (spec.units * spec.inputs + spec.units) * VALUE_SIZE)
        .sum()
}

pub fn write_parameters<W: Write>(model: &NeuralNet, mut writer: W) -> std::io::Result<()> {
    let weights = model.layers.iter().map(|layer| &layer.weights);
    let biases = model.layers.iter().map(|layer| &layer.bias);

    for matrix in weights.chain(biases) {
        for value in matrix.row_major().iter() {
            writer.write_all(&value.to_ne_bytes())?;
        }
    }

    writer.flush()
}

pub fn read_parameters<R: Read>(mut reader: R, specs: &[LayerSpec]) -> Result<NeuralNet> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let expected = saved_size(specs);
    if bytes.len() != expected {
        return Err(Error::malformed(
            Resource::Model,
            format!("expected {} bytes, found {}", expected, bytes.len()),
        ));
    }

    let mut values = bytes.chunks_exact(VALUE_SIZE).map(|chunk| {
        let mut buffer = [0u8; VALUE_SIZE];
        buffer.copy_from_slice(chunk);
        f64::from_ne_bytes(buffer)
    });
    let mut take = |rows: usize, cols: usize| {
        Matrix::from_vec(rows, cols, values.by_ref().take(rows * cols).collect())
    };

    let weights = specs
        .iter()
        .map(|spec| take(spec.units, spec.inputs))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let biases = specs
        .iter()
        .map(|spec| take(spec.units, 1))
        .collect::<std::result::Result<Vec<_>, _>>()?;

    NeuralNet::from_parameters(specs, weights.into_iter().zip(biases).collect())
}

pub fn save(model: &NeuralNet, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_parameters(model, BufWriter::new(file))?;

    Ok(())
}

pub fn load(path: &Path, specs: &[LayerSpec]) -> Result<NeuralNet> {
    let file = open(path, Resource::Model)?;

    read_parameters(file, specs)
}

/// Write the weights of the model in JSON format.
/// The keys are W1, b1, W2, b2, ...; the values are the row-major elements.
pub fn write_json<W: Write>(model: &NeuralNet, mut writer: W) -> std::io::Result<()> {
    let mut data = object! {};

    for (i, layer) in model.layers.iter().enumerate() {
        let w: Vec<f64> = layer.weights.row_major().to_vec();
        let b: Vec<f64> = layer.bias.row_major().to_vec();

        data[format!("W{}", i + 1)] = w.into();
        data[format!("b{}", i + 1)] = b.into();
    }

    writer.write_all(data.dump().as_bytes())?;
    writer.flush()
}

pub fn export_json(model: &NeuralNet, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    write_json(model, BufWriter::new(file))?;

    Ok(())
}
