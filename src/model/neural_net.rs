use log::info;
use rand::Rng;

use super::evaluate::{cross_entropy, score};
use super::{Activation, IterationRecord, LayerSpec, Model, TrainConfig};
use crate::error::{Error, Result};
use crate::linalg::{Backend, Matrix, MatrixError, Shape, Transpose};
use crate::parsing::Batch;

/// A fully connected layer: `weights` is (units, inputs), `bias` is (units, 1)
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub weights: Matrix,
    pub bias: Matrix,
    pub activation: Activation,
}

impl Layer {
    pub fn spec(&self) -> LayerSpec {
        LayerSpec {
            inputs: self.weights.cols(),
            units: self.weights.rows(),
            activation: self.activation,
        }
    }
}

/// Represents a neural net
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNet {
    pub layers: Vec<Layer>,
}

/// Everything the forward pass computed, kept for backprop.
/// `linear[i]` is layer i before its activation, `activations[i]` after.
#[derive(Debug, Clone)]
pub struct ForwardTrace {
    pub linear: Vec<Matrix>,
    pub activations: Vec<Matrix>,
}

impl ForwardTrace {
    /// The network's output, one probability column per sample
    pub fn output(&self) -> Result<&Matrix> {
        self.activations
            .last()
            .ok_or_else(|| Error::Architecture("the network has no layers".to_string()))
    }
}

/// Gradient of the loss with respect to one layer's parameters
#[derive(Debug, Clone)]
pub struct LayerGradient {
    pub weights: Matrix,
    pub bias: Matrix,
}

/// Layers must chain, and only the output layer may use softmax
fn check_architecture(specs: &[LayerSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(Error::Architecture("the network has no layers".to_string()));
    }

    for (idx, pair) in specs.windows(2).enumerate() {
        if pair[0].units != pair[1].inputs {
            return Err(Error::Architecture(format!(
                "layer {} outputs {} values but layer {} expects {}",
                idx,
                pair[0].units,
                idx + 1,
                pair[1].inputs
            )));
        }
        if pair[0].activation != Activation::ReLU {
            return Err(Error::Architecture(format!(
                "hidden layer {} must use ReLU",
                idx
            )));
        }
    }

    Ok(())
}

impl NeuralNet {
    /// Construct a new neural net with every weight and bias drawn uniformly
    /// from [-0.5, 0.5]
    pub fn new<R: Rng + ?Sized>(specs: &[LayerSpec], rng: &mut R) -> Result<NeuralNet> {
        check_architecture(specs)?;

        let mut layers = Vec::with_capacity(specs.len());

        for spec in specs {
            let mut weights = Matrix::zeros(spec.units, spec.inputs)?;
            let mut bias = Matrix::zeros(spec.units, 1)?;
            weights.randomize(rng);
            bias.randomize(rng);

            layers.push(Layer {
                weights,
                bias,
                activation: spec.activation,
            });
        }

        Ok(NeuralNet { layers })
    }

    /// Assemble a network from existing `(weights, bias)` pairs, which must
    /// have exactly the shapes `specs` describes
    pub fn from_parameters(
        specs: &[LayerSpec],
        parameters: Vec<(Matrix, Matrix)>,
    ) -> Result<NeuralNet> {
        check_architecture(specs)?;

        if specs.len() != parameters.len() {
            return Err(Error::Architecture(format!(
                "{} layers described but {} parameter sets given",
                specs.len(),
                parameters.len()
            )));
        }

        let mut layers = Vec::with_capacity(specs.len());

        for (spec, (weights, bias)) in specs.iter().zip(parameters) {
            if weights.shape() != Shape(spec.units, spec.inputs)
                || bias.shape() != Shape(spec.units, 1)
            {
                return Err(MatrixError::DimensionMismatch {
                    operation: "load",
                    left: weights.shape(),
                    right: bias.shape(),
                }
                .into());
            }

            layers.push(Layer {
                weights,
                bias,
                activation: spec.activation,
            });
        }

        Ok(NeuralNet { layers })
    }

    pub fn specs(&self) -> Vec<LayerSpec> {
        self.layers.iter().map(Layer::spec).collect()
    }

    /// Perform a forward pass of the network on some input, one sample per column
    pub fn forward<B: Backend>(&self, backend: &B, inputs: &Matrix) -> Result<ForwardTrace> {
        let mut linear = Vec::with_capacity(self.layers.len());
        let mut activations: Vec<Matrix> = Vec::with_capacity(self.layers.len());

        for layer in &self.layers {
            let input = activations.last().unwrap_or(inputs);
            let lin_output = backend
                .multiply(&layer.weights, input)?
                .add_to_rows(&layer.bias)?;
            let real_output = layer.activation.apply(&lin_output);

            linear.push(lin_output);
            activations.push(real_output);
        }

        Ok(ForwardTrace { linear, activations })
    }

    /// Gradients of the softmax cross-entropy loss, summed over the batch.
    /// `targets` holds one one-hot column per sample.
    pub fn backward<B: Backend>(
        &self,
        backend: &B,
        inputs: &Matrix,
        trace: &ForwardTrace,
        targets: &Matrix,
    ) -> Result<Vec<LayerGradient>> {
        if self.layers.last().map(|layer| layer.activation) != Some(Activation::Softmax) {
            return Err(Error::Architecture(
                "training needs a softmax output layer".to_string(),
            ));
        }

        // Gradient WRT the linear output of the current layer, starting at the output
        let mut grad_help = trace.output()?.subtract(targets, 1f64)?;
        let mut gradients = Vec::with_capacity(self.layers.len());

        for idx in (0..self.layers.len()).rev() {
            let layer_input = if idx == 0 {
                inputs
            } else {
                &trace.activations[idx - 1]
            };

            let weights = backend.gemm(&grad_help, Transpose::No, layer_input, Transpose::Yes)?;
            let bias = grad_help.sum_rows();

            if idx > 0 {
                let upstream = backend.gemm(
                    &self.layers[idx].weights,
                    Transpose::Yes,
                    &grad_help,
                    Transpose::No,
                )?;
                let step = match self.layers[idx - 1].activation {
                    Activation::ReLU => trace.linear[idx - 1].drelu(),
                    Activation::Softmax => {
                        return Err(Error::Architecture(format!(
                            "hidden layer {} must use ReLU",
                            idx - 1
                        )))
                    }
                };
                grad_help = upstream.elementwise_multiply(&step)?;
            }

            gradients.push(LayerGradient { weights, bias });
        }

        gradients.reverse();

        Ok(gradients)
    }

    /// A new network with every parameter moved by `-step * gradient`
    pub fn apply_gradients(&self, gradients: &[LayerGradient], step: f64) -> Result<NeuralNet> {
        if gradients.len() != self.layers.len() {
            return Err(Error::Architecture(format!(
                "{} gradients for {} layers",
                gradients.len(),
                self.layers.len()
            )));
        }

        let layers = self
            .layers
            .iter()
            .zip(gradients)
            .map(|(layer, grad)| -> Result<Layer> {
                Ok(Layer {
                    weights: layer.weights.subtract(&grad.weights, step)?,
                    bias: layer.bias.subtract(&grad.bias, step)?,
                    activation: layer.activation,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(NeuralNet { layers })
    }
}

impl Model for NeuralNet {
    fn fit<B: Backend>(
        &mut self,
        backend: &B,
        batch: &Batch,
        config: &TrainConfig,
    ) -> Result<Vec<IterationRecord>> {
        let classes = self.layers.last().map_or(0, |layer| layer.weights.rows());
        let targets = batch.one_hot(classes)?;
        let samples = batch.len() as f64;
        let step = config.learning_rate / samples;
        let mut history = Vec::with_capacity(config.iterations);

        for iteration in 1..=config.iterations {
            let trace = self.forward(backend, &batch.pixels)?;
            let gradients = self.backward(backend, &batch.pixels, &trace, &targets)?;
            let updated = self.apply_gradients(&gradients, step)?;

            let accuracy = score(trace.output()?, &batch.labels)?;
            let loss = cross_entropy(trace.output()?, &targets)? / samples;
            let progress = 100f64 * iteration as f64 / config.iterations as f64;

            // The previous parameters are dropped here, the trace and gradients
            // at the end of the iteration
            *self = updated;

            info!(
                "Training...{:.2}% Accuracy={:.1}% Loss={:.4}",
                progress,
                100f64 * accuracy,
                loss
            );

            history.push(IterationRecord {
                iteration,
                progress,
                accuracy,
                loss,
            });
        }

        Ok(history)
    }

    fn predict<B: Backend>(&self, backend: &B, inputs: &Matrix) -> Result<Matrix> {
        let mut trace = self.forward(backend, inputs)?;

        trace
            .activations
            .pop()
            .ok_or_else(|| Error::Architecture("the network has no layers".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::Cpu;
    use crate::model::DIGIT_CLASSIFIER;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn matrix(rows: usize, cols: usize, data: &[f64]) -> Matrix {
        Matrix::from_vec(rows, cols, data.to_vec()).unwrap()
    }

    const TINY: [LayerSpec; 2] = [
        LayerSpec {
            inputs: 3,
            units: 4,
            activation: Activation::ReLU,
        },
        LayerSpec {
            inputs: 4,
            units: 3,
            activation: Activation::Softmax,
        },
    ];

    #[test]
    fn random_init_has_digit_shapes() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = NeuralNet::new(&DIGIT_CLASSIFIER, &mut rng).unwrap();

        assert_eq!(net.layers[0].weights.shape(), Shape(10, 784));
        assert_eq!(net.layers[0].bias.shape(), Shape(10, 1));
        assert_eq!(net.layers[1].weights.shape(), Shape(10, 10));
        assert_eq!(net.layers[1].bias.shape(), Shape(10, 1));
        assert_eq!(net.specs(), DIGIT_CLASSIFIER.to_vec());

        for layer in &net.layers {
            assert!(layer.weights.row_major().iter().all(|x| (-0.5..=0.5).contains(x)));
            assert!(layer.bias.row_major().iter().all(|x| (-0.5..=0.5).contains(x)));
        }
    }

    #[test]
    fn rejects_broken_architectures() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut specs = TINY;
        specs[1].inputs = 5;
        assert!(matches!(NeuralNet::new(&specs, &mut rng), Err(Error::Architecture(_))));

        let mut specs = TINY;
        specs[0].activation = Activation::Softmax;
        assert!(NeuralNet::new(&specs, &mut rng).is_err());

        assert!(NeuralNet::new(&[], &mut rng).is_err());
    }

    #[test]
    fn from_parameters_checks_shapes() {
        let weights = Matrix::zeros(10, 784).unwrap();
        let bias = Matrix::zeros(10, 1).unwrap();
        let wrong = Matrix::zeros(10, 9).unwrap();

        let err = NeuralNet::from_parameters(
            &DIGIT_CLASSIFIER,
            vec![(weights.clone(), bias.clone()), (wrong, bias.clone())],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Matrix(MatrixError::DimensionMismatch { .. })));

        let err = NeuralNet::from_parameters(&DIGIT_CLASSIFIER, vec![(weights, bias)]).unwrap_err();
        assert!(matches!(err, Error::Architecture(_)));
    }

    #[test]
    fn identity_layer_forward() {
        let spec = [LayerSpec {
            inputs: 2,
            units: 2,
            activation: Activation::ReLU,
        }];
        let net = NeuralNet::from_parameters(
            &spec,
            vec![(matrix(2, 2, &[1.0, 0.0, 0.0, 1.0]), matrix(2, 1, &[0.0, 0.0]))],
        )
        .unwrap();

        let output = net.predict(&Cpu, &matrix(2, 1, &[1.0, 2.0])).unwrap();
        assert_eq!(output, matrix(2, 1, &[1.0, 2.0]));

        // Only softmax outputs can be trained
        let trace = net.forward(&Cpu, &matrix(2, 1, &[1.0, 2.0])).unwrap();
        let targets = matrix(2, 1, &[1.0, 0.0]);
        assert!(net
            .backward(&Cpu, &matrix(2, 1, &[1.0, 2.0]), &trace, &targets)
            .is_err());
    }

    #[test]
    fn forward_matches_the_two_layer_formula() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = NeuralNet::new(&TINY, &mut rng).unwrap();
        let mut x = Matrix::zeros(3, 5).unwrap();
        x.randomize(&mut rng);

        let trace = net.forward(&Cpu, &x).unwrap();

        let (l1, l2) = (&net.layers[0], &net.layers[1]);
        let z1 = l1.weights.multiply(&x).unwrap().add_to_rows(&l1.bias).unwrap();
        let a1 = z1.relu();
        let z2 = l2.weights.multiply(&a1).unwrap().add_to_rows(&l2.bias).unwrap();
        let a2 = z2.softmax();

        assert_eq!(trace.linear, vec![z1, z2]);
        assert_eq!(trace.activations, vec![a1, a2.clone()]);
        assert_eq!(net.predict(&Cpu, &x).unwrap(), a2);
    }

    #[test]
    fn backward_matches_the_two_layer_formula() {
        let mut rng = StdRng::seed_from_u64(5);
        let net = NeuralNet::new(&TINY, &mut rng).unwrap();
        let mut x = Matrix::zeros(3, 4).unwrap();
        x.randomize(&mut rng);
        let y = matrix(3, 4, &[1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0]);

        let trace = net.forward(&Cpu, &x).unwrap();
        let grads = net.backward(&Cpu, &x, &trace, &y).unwrap();

        let (z1, a1, a2) = (&trace.linear[0], &trace.activations[0], &trace.activations[1]);
        let w2 = &net.layers[1].weights;
        let dz2 = a2.subtract(&y, 1.0).unwrap();
        let dw2 = dz2.multiply(&a1.transpose()).unwrap();
        let db2 = dz2.sum_rows();
        let dz1 = w2
            .transpose()
            .multiply(&dz2)
            .unwrap()
            .elementwise_multiply(&z1.drelu())
            .unwrap();
        let dw1 = x.multiply(&dz1.transpose()).unwrap().transpose();
        let db1 = dz1.sum_rows();

        let close = |a: &Matrix, b: &Matrix| {
            assert_eq!(a.shape(), b.shape());
            for (x, y) in a.row_major().iter().zip(b.row_major().iter()) {
                assert!((x - y).abs() < 1e-12, "{} != {}", x, y);
            }
        };
        close(&grads[1].weights, &dw2);
        close(&grads[1].bias, &db2);
        close(&grads[0].weights, &dw1);
        close(&grads[0].bias, &db1);
    }

    #[test]
    fn gradients_match_finite_differences() {
        let mut rng = StdRng::seed_from_u64(11);
        let net = NeuralNet::new(&TINY, &mut rng).unwrap();
        let mut x = Matrix::zeros(3, 5).unwrap();
        x.randomize(&mut rng);
        let x = x.multiply_scalar(4.0);
        let y = matrix(
            3,
            5,
            &[1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0],
        );

        let loss = |net: &NeuralNet| {
            let p = net.predict(&Cpu, &x).unwrap();
            cross_entropy(&p, &y).unwrap()
        };

        let trace = net.forward(&Cpu, &x).unwrap();
        let grads = net.backward(&Cpu, &x, &trace, &y).unwrap();
        let eps = 1e-6;

        for (idx, grad) in grads.iter().enumerate() {
            for (param, analytic) in [(false, &grad.weights), (true, &grad.bias)] {
                for row in 0..analytic.rows() {
                    for col in 0..analytic.cols() {
                        let nudge = |delta: f64| {
                            let mut shifted = net.clone();
                            let target = if param {
                                &mut shifted.layers[idx].bias
                            } else {
                                &mut shifted.layers[idx].weights
                            };
                            let value = target.get(row, col) + delta;
                            target.set(row, col, value);
                            loss(&shifted)
                        };
                        let numeric = (nudge(eps) - nudge(-eps)) / (2.0 * eps);
                        let expected = analytic.get(row, col);

                        assert!(
                            (numeric - expected).abs() < 1e-5 + 1e-4 * expected.abs(),
                            "layer {} ({}, {}): numeric {} analytic {}",
                            idx,
                            row,
                            col,
                            numeric,
                            expected
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn update_moves_against_the_gradient() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = NeuralNet::new(&TINY, &mut rng).unwrap();
        let filled = |value: f64| -> Vec<LayerGradient> {
            net.layers
                .iter()
                .map(|layer| {
                    let Shape(rows, cols) = layer.weights.shape();
                    LayerGradient {
                        weights: Matrix::from_vec(rows, cols, vec![value; rows * cols]).unwrap(),
                        bias: Matrix::from_vec(rows, 1, vec![value; rows]).unwrap(),
                    }
                })
                .collect()
        };

        // Zero gradients leave the parameters where they were
        assert_eq!(net.apply_gradients(&filled(0.0), 0.1).unwrap(), net);

        let ones = filled(1.0);
        let moved = net.apply_gradients(&ones, 0.25).unwrap();
        let w = net.layers[0].weights.get(1, 2);
        let b = net.layers[1].bias.get(0, 0);
        assert!((moved.layers[0].weights.get(1, 2) - (w - 0.25)).abs() < 1e-12);
        assert!((moved.layers[1].bias.get(0, 0) - (b - 0.25)).abs() < 1e-12);

        assert!(net.apply_gradients(&ones[..1], 0.25).is_err());
    }

    #[test]
    fn training_reduces_the_loss() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut net = NeuralNet::new(&TINY, &mut rng).unwrap();

        // Three well separated clusters, one per class
        let pixels = matrix(
            3,
            6,
            &[
                1.0, 0.9, 0.0, 0.1, 0.0, 0.1, //
                0.0, 0.1, 1.0, 0.9, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.1, 1.0, 0.9,
            ],
        );
        let batch = Batch {
            pixels,
            labels: vec![0, 0, 1, 1, 2, 2],
        };
        let config = TrainConfig {
            iterations: 200,
            learning_rate: 0.5,
        };

        let history = net.fit(&Cpu, &batch, &config).unwrap();

        assert_eq!(history.len(), 200);
        assert_eq!(history[0].iteration, 1);
        assert_eq!(history[199].progress, 100.0);
        assert!(history[199].loss < history[0].loss);
        assert!(history.iter().all(|r| (0.0..=1.0).contains(&r.accuracy)));

        let predictions = net.predict(&Cpu, &batch.pixels).unwrap();
        assert_eq!(predictions.shape(), Shape(3, 6));
    }
}
