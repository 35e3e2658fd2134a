use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

use crate::linalg::MatrixError;

pub type Result<T> = std::result::Result<T, Error>;

/// The inputs the program reads from disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    TrainingData,
    TestData,
    Model,
    Image,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resource::TrainingData => "training data",
            Resource::TestData => "test data",
            Resource::Model => "saved model",
            Resource::Image => "image",
        };

        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("Invalid network architecture: {0}")]
    Architecture(String),

    #[error("Could not find {resource} at {path:?}")]
    MissingResource { resource: Resource, path: PathBuf },

    #[error("Malformed {resource}: {reason}")]
    Malformed { resource: Resource, reason: String },

    #[error("Unsupported image: {0}")]
    UnsupportedImage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn malformed(resource: Resource, reason: impl Into<String>) -> Self {
        Error::Malformed {
            resource,
            reason: reason.into(),
        }
    }

    /// Process exit status for this failure
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.status())
    }

    /// The numeric status behind [`Error::exit_code`]
    pub fn status(&self) -> u8 {
        match self {
            Error::Matrix(MatrixError::Allocation(_)) => 3,
            Error::Matrix(MatrixError::Device(_)) => 6,
            Error::Matrix(_) | Error::Architecture(_) => 1,
            Error::MissingResource { resource, .. } | Error::Malformed { resource, .. } => {
                match resource {
                    Resource::TrainingData => 2,
                    Resource::TestData | Resource::Model => 4,
                    Resource::Image => 5,
                }
            }
            Error::UnsupportedImage(_) => 5,
            Error::Io(_) | Error::Csv(_) => 7,
        }
    }
}

/// Map a failed open to [`Error::MissingResource`] when the file is absent
pub(crate) fn open(path: &std::path::Path, resource: Resource) -> Result<std::fs::File> {
    std::fs::File::open(path).map_err(|err| match err.kind() {
        std::io::ErrorKind::NotFound => Error::MissingResource {
            resource,
            path: path.to_path_buf(),
        },
        _ => Error::Io(err),
    })
}
