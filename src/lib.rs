//! A two-layer digit classifier trained with full-batch gradient descent on
//! 28x28 greyscale images.

pub mod error;
pub mod linalg;
pub mod model;
pub mod parsing;

pub use error::{Error, Result};
