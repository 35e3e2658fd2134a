//! Dense row-major matrices and the primitives the classifier is built from.
//!
//! Every operation except [`Matrix::randomize`] and [`Matrix::clear`] returns a
//! freshly allocated matrix and leaves its operands untouched.

use ndarray::{Array2, ArrayView2, Axis, Zip};
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::borrow::Cow;
use std::fmt;
use thiserror::Error;

pub mod backend;
#[cfg(feature = "cuda")]
pub mod cuda;

pub use backend::{default_backend, Backend, Cpu, DefaultBackend, Transpose};

/// Dimensions of a matrix as `(rows, cols)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape(pub usize, pub usize);

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.0, self.1)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    #[error("Cannot {operation} matrices due to incompatible sizes: {left} and {right}")]
    DimensionMismatch {
        operation: &'static str,
        left: Shape,
        right: Shape,
    },

    #[error("A {shape} matrix cannot hold {len} values")]
    InvalidShape { shape: Shape, len: usize },

    #[error("Ran out of memory allocating a {0} matrix")]
    Allocation(Shape),

    #[error("Device error: {0}")]
    Device(String),
}

/// A dense matrix of `f64` values stored row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    data: Array2<f64>,
}

fn mismatch(operation: &'static str, left: &Matrix, right: &Matrix) -> MatrixError {
    MatrixError::DimensionMismatch {
        operation,
        left: left.shape(),
        right: right.shape(),
    }
}

impl Matrix {
    /// Allocate a zero-filled matrix.
    /// Fails instead of aborting when the buffer cannot be reserved, since the
    /// pixel matrix of a full dataset runs to hundreds of megabytes.
    pub fn zeros(rows: usize, cols: usize) -> Result<Self, MatrixError> {
        let shape = Shape(rows, cols);

        if rows == 0 || cols == 0 {
            return Err(MatrixError::InvalidShape { shape, len: 0 });
        }

        let len = rows
            .checked_mul(cols)
            .ok_or(MatrixError::Allocation(shape))?;
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(len)
            .map_err(|_| MatrixError::Allocation(shape))?;
        buffer.resize(len, 0f64);

        Self::from_vec(rows, cols, buffer)
    }

    /// Build a matrix from row-major data. The buffer is moved into the matrix.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, MatrixError> {
        let shape = Shape(rows, cols);
        let len = data.len();

        if rows == 0 || cols == 0 {
            return Err(MatrixError::InvalidShape { shape, len });
        }

        Array2::from_shape_vec((rows, cols), data)
            .map(Self::from_array)
            .map_err(|_| MatrixError::InvalidShape { shape, len })
    }

    pub(crate) fn from_array(data: Array2<f64>) -> Self {
        if data.is_standard_layout() {
            Matrix { data }
        } else {
            Matrix {
                data: data.as_standard_layout().into_owned(),
            }
        }
    }

    pub(crate) fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn shape(&self) -> Shape {
        Shape(self.rows(), self.cols())
    }

    /// Panics if `(row, col)` is out of bounds, like slice indexing.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[[row, col]]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[[row, col]] = value;
    }

    /// The elements in row-major order
    pub fn row_major(&self) -> Cow<'_, [f64]> {
        match self.data.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(self.data.iter().copied().collect()),
        }
    }

    /// Standard matrix product `self * other`
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.cols() != other.rows() {
            return Err(mismatch("multiply", self, other));
        }

        Ok(Matrix::from_array(self.data.dot(&other.data)))
    }

    /// Hadamard product
    pub fn elementwise_multiply(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.shape() != other.shape() {
            return Err(mismatch("elementwise multiply", self, other));
        }

        Ok(Matrix::from_array(&self.data * &other.data))
    }

    /// Add `other[r][0]` to every element of row `r`.
    /// This is how a bias vector is added to every sample column of a batch.
    pub fn add_to_rows(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if other.cols() != 1 || self.rows() != other.rows() {
            return Err(mismatch("add", self, other));
        }

        let mut output = self.data.clone();
        output += &other.data;

        Ok(Matrix::from_array(output))
    }

    /// Reduce every row to its sum, giving a `(rows, 1)` matrix
    pub fn sum_rows(&self) -> Matrix {
        Matrix::from_array(self.data.sum_axis(Axis(1)).insert_axis(Axis(1)))
    }

    pub fn relu(&self) -> Matrix {
        Matrix::from_array(self.data.mapv(|x| if x > 0f64 { x } else { 0f64 }))
    }

    /// Derivative of ReLU. The kink at zero maps to 0.
    pub fn drelu(&self) -> Matrix {
        Matrix::from_array(self.data.mapv(|x| if x > 0f64 { 1f64 } else { 0f64 }))
    }

    pub fn transpose(&self) -> Matrix {
        Matrix::from_array(self.data.t().as_standard_layout().into_owned())
    }

    /// Compute `self - other * scale` elementwise
    pub fn subtract(&self, other: &Matrix, scale: f64) -> Result<Matrix, MatrixError> {
        if self.shape() != other.shape() {
            return Err(mismatch("subtract", self, other));
        }

        let output = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| a - b * scale);

        Ok(Matrix::from_array(output))
    }

    pub fn multiply_scalar(&self, value: f64) -> Matrix {
        Matrix::from_array(self.data.mapv(|x| x * value))
    }

    /// Turn every column into a probability distribution
    pub fn softmax(&self) -> Matrix {
        let mut output = self.data.clone();

        for mut column in output.axis_iter_mut(Axis(1)) {
            // Shifting by the column max keeps exp() from overflowing on large logits
            let max = column.fold(f64::NEG_INFINITY, |acc, &x| acc.max(x));
            column.mapv_inplace(|x| (x - max).exp());
            let sum = column.sum();
            column.mapv_inplace(|x| x / sum);
        }

        Matrix::from_array(output)
    }

    /// Overwrite every element with a uniform sample from [-0.5, 0.5]
    pub fn randomize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let distribution = Uniform::new_inclusive(-0.5, 0.5);

        for x in self.data.iter_mut() {
            *x = distribution.sample(rng);
        }
    }

    pub fn clear(&mut self) {
        self.data.fill(0f64);
    }

    /// Row index of the largest element of every column.
    /// Ties go to the lowest index.
    pub fn argmax_columns(&self) -> Vec<usize> {
        self.data
            .axis_iter(Axis(1))
            .map(|column| {
                let mut best = 0;

                for (row, value) in column.iter().enumerate().skip(1) {
                    if *value > column[best] {
                        best = row;
                    }
                }

                best
            })
            .collect()
    }
}

/// Indices to print along one axis, with `None` marking an elided run
fn visible(len: usize) -> Vec<Option<usize>> {
    if len <= 10 {
        (0..len).map(Some).collect()
    } else {
        (0..7)
            .map(Some)
            .chain(std::iter::once(None))
            .chain((len - 6..len).map(Some))
            .collect()
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cols = visible(self.cols());

        for row in visible(self.rows()) {
            let Some(row) = row else {
                writeln!(f, ".\n.\n.")?;
                continue;
            };

            write!(f, "[ ")?;
            for col in &cols {
                match col {
                    Some(col) => write!(f, "{:7.2}", self.get(row, *col))?,
                    None => write!(f, " ... ")?,
                }
            }
            writeln!(f, " ]")?;
        }

        Ok(())
    }
}
