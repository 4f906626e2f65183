//! Error type shared by every fallible operation in the crate.

use std::path::PathBuf;

use crate::cells::{SparseBackend, SparseLayout};

/// Convenience alias used throughout the crate.
pub type Result<T, E = TopographyError> = std::result::Result<T, E>;

/// Errors raised while building, loading, running or training a topographic network.
///
/// Configuration problems are reported at construction time and are never retried.
#[derive(Debug, thiserror::Error)]
pub enum TopographyError {
    #[error("sparse backend `{backend}` cannot run on layout `{layout}`")]
    InvalidBackendLayout {
        backend: SparseBackend,
        layout: SparseLayout,
    },

    #[error("connectivity must be square, got {rows}x{cols}")]
    NonSquareConnectivity { rows: usize, cols: usize },

    #[error("malformed connectivity: {0}")]
    InvalidConnectivity(String),

    #[error("connectivity contains no synapses")]
    EmptyConnectivity,

    #[error("either random or file-based connectivity must be configured")]
    MissingConnectivity,

    #[error("{name} indices must be 1D, got shape {shape:?}")]
    IndicesNotOneDimensional { name: &'static str, shape: Vec<usize> },

    #[error("{name} index {index} is out of range for {size} neurons")]
    IndexOutOfRange {
        name: &'static str,
        index: i64,
        size: usize,
    },

    #[error("{name} index {index} appears more than once")]
    DuplicateIndex { name: &'static str, index: usize },

    #[error("expected {expected} input features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("{path}: no known format matched (tried {tried:?})")]
    UnrecognizedFormat { path: PathBuf, tried: Vec<&'static str> },

    #[error("unknown {kind} `{name}`")]
    UnknownName { kind: &'static str, name: String },

    #[error("sheet {rows}x{cols} does not cover {num_neurons} neurons")]
    SheetMismatch {
        rows: usize,
        cols: usize,
        num_neurons: usize,
    },

    #[error("tensor data: {0}")]
    TensorData(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record encoding: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("checkpoint: {0}")]
    Recorder(#[from] burn::record::RecorderError),

    #[error("image export: {0}")]
    Image(#[from] image::ImageError),

    #[error("array shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl TopographyError {
    pub(crate) fn unknown(kind: &'static str, name: &str) -> Self {
        TopographyError::UnknownName {
            kind,
            name: name.to_string(),
        }
    }
}
