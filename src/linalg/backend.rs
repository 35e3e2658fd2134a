use super::{Matrix, MatrixError, Shape};

/// Whether a GEMM operand is used as stored or transposed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transpose {
    No,
    Yes,
}

impl Transpose {
    /// Shape of the operand after the flag is applied
    pub fn apply(self, matrix: &Matrix) -> Shape {
        match self {
            Transpose::No => matrix.shape(),
            Transpose::Yes => Shape(matrix.cols(), matrix.rows()),
        }
    }
}

/// Something that can execute matrix products.
/// Implementations must agree with [`Matrix::multiply`] for every caller.
pub trait Backend {
    /// Compute `op(left) * op(right)` into a new matrix
    fn gemm(
        &self,
        left: &Matrix,
        left_op: Transpose,
        right: &Matrix,
        right_op: Transpose,
    ) -> Result<Matrix, MatrixError>;

    fn multiply(&self, left: &Matrix, right: &Matrix) -> Result<Matrix, MatrixError> {
        self.gemm(left, Transpose::No, right, Transpose::No)
    }
}

/// Check the inner dimensions of `op(left) * op(right)` and return `(m, k, n)`
pub(crate) fn gemm_dims(
    left: &Matrix,
    left_op: Transpose,
    right: &Matrix,
    right_op: Transpose,
) -> Result<(usize, usize, usize), MatrixError> {
    let Shape(m, k) = left_op.apply(left);
    let Shape(inner, n) = right_op.apply(right);

    if k != inner {
        return Err(MatrixError::DimensionMismatch {
            operation: "multiply",
            left: Shape(m, k),
            right: Shape(inner, n),
        });
    }

    Ok((m, k, n))
}

/// Host execution through ndarray
#[derive(Debug, Default, Clone, Copy)]
pub struct Cpu;

impl Backend for Cpu {
    fn gemm(
        &self,
        left: &Matrix,
        left_op: Transpose,
        right: &Matrix,
        right_op: Transpose,
    ) -> Result<Matrix, MatrixError> {
        gemm_dims(left, left_op, right, right_op)?;

        let lhs = match left_op {
            Transpose::No => left.view(),
            Transpose::Yes => left.view().reversed_axes(),
        };
        let rhs = match right_op {
            Transpose::No => right.view(),
            Transpose::Yes => right.view().reversed_axes(),
        };

        Ok(Matrix::from_array(lhs.dot(&rhs)))
    }
}

#[cfg(not(feature = "cuda"))]
pub type DefaultBackend = Cpu;

#[cfg(feature = "cuda")]
pub type DefaultBackend = super::cuda::CudaBackend;

/// Construct the backend chosen at build time
#[cfg(not(feature = "cuda"))]
pub fn default_backend() -> Result<DefaultBackend, MatrixError> {
    Ok(Cpu)
}

/// Construct the backend chosen at build time, on the first CUDA device
#[cfg(feature = "cuda")]
pub fn default_backend() -> Result<DefaultBackend, MatrixError> {
    super::cuda::CudaBackend::new(0)
}
