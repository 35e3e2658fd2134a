use serde::Serialize;

use crate::error::Result;
use crate::linalg::{Backend, Matrix};
use crate::parsing::{Batch, NUM_PIXELS};

pub mod evaluate;
pub mod neural_net;
pub mod persist;

pub const NUM_CLASSES: usize = 10;
pub const HIDDEN_UNITS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activation {
    ReLU,
    Softmax,
}

impl Activation {
    pub fn apply(&self, linear: &Matrix) -> Matrix {
        match self {
            Activation::ReLU => linear.relu(),
            Activation::Softmax => linear.softmax(),
        }
    }
}

/// One fully connected layer: `units` outputs computed from `inputs` values
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayerSpec {
    pub inputs: usize,
    pub units: usize,
    pub activation: Activation,
}

/// The digit classifier: 784 pixels -> 10 ReLU units -> 10 class probabilities.
/// Saved parameter files depend on exactly this layout.
pub const DIGIT_CLASSIFIER: [LayerSpec; 2] = [
    LayerSpec {
        inputs: NUM_PIXELS,
        units: HIDDEN_UNITS,
        activation: Activation::ReLU,
    },
    LayerSpec {
        inputs: HIDDEN_UNITS,
        units: NUM_CLASSES,
        activation: Activation::Softmax,
    },
];

/// Training hyperparams
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainConfig {
    pub iterations: usize,
    pub learning_rate: f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            iterations: 500,
            learning_rate: 0.1,
        }
    }
}

/// Progress after one gradient descent step, measured on the training batch
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub progress: f64,
    pub accuracy: f64,
    pub loss: f64,
}

pub trait Model {
    /// Fit the model to the batch with full-batch gradient descent.
    /// Returns the per-iteration training history.
    fn fit<B: Backend>(
        &mut self,
        backend: &B,
        batch: &Batch,
        config: &TrainConfig,
    ) -> Result<Vec<IterationRecord>>;

    /// Class probabilities for every column of `inputs`
    fn predict<B: Backend>(&self, backend: &B, inputs: &Matrix) -> Result<Matrix>;
}
