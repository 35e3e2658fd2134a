//! cuBLAS matrix products via [`cudarc`](https://crates.io/crates/cudarc).
//!
//! Only compiled with the `cuda` feature. Operands are staged into device
//! memory for every call and the result is copied straight back; device
//! buffers are released when their `CudaSlice` handles drop.

use std::os::raw::c_int;
use std::sync::Arc;

use cudarc::cublas::sys::cublasOperation_t;
use cudarc::cublas::{CudaBlas, Gemm, GemmConfig};
use cudarc::driver::CudaDevice;

use super::backend::{gemm_dims, Backend, Transpose};
use super::{Matrix, MatrixError};

/// A CUDA device together with its cuBLAS handle.
/// Create one at startup and pass it by reference to everything that multiplies.
pub struct CudaBackend {
    device: Arc<CudaDevice>,
    blas: CudaBlas,
}

fn device_error<E: std::fmt::Debug>(err: E) -> MatrixError {
    MatrixError::Device(format!("{:?}", err))
}

fn operation(op: Transpose) -> cublasOperation_t {
    match op {
        Transpose::No => cublasOperation_t::CUBLAS_OP_N,
        Transpose::Yes => cublasOperation_t::CUBLAS_OP_T,
    }
}

fn dim(value: usize) -> Result<c_int, MatrixError> {
    c_int::try_from(value)
        .map_err(|_| MatrixError::Device(format!("dimension {value} exceeds cuBLAS limits")))
}

impl CudaBackend {
    pub fn new(ordinal: usize) -> Result<Self, MatrixError> {
        let device = CudaDevice::new(ordinal).map_err(device_error)?;
        let blas = CudaBlas::new(device.clone()).map_err(device_error)?;

        log::info!("Using CUDA device {}", ordinal);

        Ok(CudaBackend { device, blas })
    }
}

impl Backend for CudaBackend {
    fn gemm(
        &self,
        left: &Matrix,
        left_op: Transpose,
        right: &Matrix,
        right_op: Transpose,
    ) -> Result<Matrix, MatrixError> {
        let (m, k, n) = gemm_dims(left, left_op, right, right_op)?;

        let left_gpu = self
            .device
            .htod_sync_copy(&left.row_major())
            .map_err(device_error)?;
        let right_gpu = self
            .device
            .htod_sync_copy(&right.row_major())
            .map_err(device_error)?;
        let mut output_gpu = self.device.alloc_zeros::<f64>(m * n).map_err(device_error)?;

        // cuBLAS is column-major, where a row-major buffer reads as its own
        // transpose. Computing C^T = op(B)^T * op(A)^T leaves C row-major.
        let config = GemmConfig {
            transa: operation(right_op),
            transb: operation(left_op),
            m: dim(n)?,
            n: dim(m)?,
            k: dim(k)?,
            alpha: 1f64,
            lda: dim(right.cols())?,
            ldb: dim(left.cols())?,
            beta: 0f64,
            ldc: dim(n)?,
        };

        unsafe { self.blas.gemm(config, &right_gpu, &left_gpu, &mut output_gpu) }
            .map_err(device_error)?;

        let output = self.device.dtoh_sync_copy(&output_gpu).map_err(device_error)?;

        Matrix::from_vec(m, n, output)
    }
}
