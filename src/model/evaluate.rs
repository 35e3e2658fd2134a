use crate::linalg::{Matrix, MatrixError, Shape};

/// Fraction of columns whose most probable class equals the label.
/// Ties between classes resolve to the lowest class index.
pub fn score(predictions: &Matrix, labels: &[u8]) -> Result<f64, MatrixError> {
    if labels.len() != predictions.cols() {
        return Err(MatrixError::DimensionMismatch {
            operation: "score",
            left: predictions.shape(),
            right: Shape(1, labels.len()),
        });
    }

    let correct = predictions
        .argmax_columns()
        .into_iter()
        .zip(labels)
        .filter(|(predicted, label)| *predicted == **label as usize)
        .count();

    Ok(correct as f64 / predictions.cols() as f64)
}

/// Summed cross-entropy `-sum(y * ln p)` between predicted probabilities and
/// one-hot targets
pub fn cross_entropy(predictions: &Matrix, targets: &Matrix) -> Result<f64, MatrixError> {
    if predictions.shape() != targets.shape() {
        return Err(MatrixError::DimensionMismatch {
            operation: "compare",
            left: predictions.shape(),
            right: targets.shape(),
        });
    }

    let total: f64 = predictions
        .row_major()
        .iter()
        .zip(targets.row_major().iter())
        .filter(|(_, y)| **y != 0f64)
        .map(|(p, y)| y * p.max(f64::MIN_POSITIVE).ln())
        .sum();

    Ok(-total)
}
