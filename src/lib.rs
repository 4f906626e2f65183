//! # bioplnn - Biologically-Plausible Recurrent Networks (Rust)
//!
//! Sparse topographic cortical-sheet RNNs built on the Burn framework.
//!
//! ## Features
//!
//! - **Topographic connectivity**: neurons on a 2D sheet, each synapsing onto
//!   Gaussian-distributed neighbours, or indices loaded from a file
//! - **Sparse recurrence**: three interchangeable sparse matmul strategies over COO,
//!   CSR or coordinate layouts
//! - **Topographic RNN**: input re-injected at every step, configurable readout
//!   neurons and a dense classifier head
//! - **Activity export**: per-step sheet activity rendered to GIF or PNG
//! - **Training**: SGD/Adam/AdamW, one-cycle schedule, cross-entropy or evidential
//!   loss, per-epoch checkpoints
//!
//! ## Quick Start
//!
//! ```rust
//! use bioplnn::prelude::*;
//! use burn::backend::NdArray;
//! use burn::tensor::Tensor;
//!
//! let device = Default::default();
//! let model = TopographicRnnConfig::new()
//!     .with_sheet_size(SheetSize::new(4, 4))
//!     .with_synapses_per_neuron(Some(3))
//!     .with_synapse_std(Some(1.0))
//!     .with_num_classes(3)
//!     .init::<NdArray<f32>>(&device)
//!     .unwrap();
//!
//! let x = Tensor::<NdArray<f32>, 2>::ones([2, 16], &device);
//! let logits = model.forward(x, 5).unwrap();
//! assert_eq!(logits.dims(), [2, 3]);
//! ```
//!
//! ## Cell-level Usage
//!
//! For direct access to the sparse recurrence (a single step):
//!
//! ```ignore
//! use bioplnn::cells::{SparseBackend, SparseLayout, TopographicCell};
//! use bioplnn::connectivity::GaussianConnectivity;
//!
//! let conn = GaussianConnectivity::new(SheetSize::new(32, 32), 16, 3.0);
//! let cell = TopographicCell::<Backend>::from_connectivity(
//!     &conn, &mut rng, SparseBackend::Tsgu, SparseLayout::Coo, &device,
//! )?;
//! ```

pub mod activation;
pub mod cells;
pub mod connectivity;
mod data;
pub mod error;
pub mod rnn;
pub mod sheet;
pub mod sparse;
pub mod training;
pub mod visualize;

pub use error::{Result, TopographyError};

pub mod prelude {
    pub use crate::activation::Nonlinearity;
    pub use crate::cells::{SparseBackend, SparseLayout, TopographicCell};
    pub use crate::connectivity::{Connectivity, FileConnectivity, GaussianConnectivity};
    pub use crate::error::TopographyError;
    pub use crate::rnn::{ForwardOptions, SheetInput, TopographicRnn, TopographicRnnConfig};
    pub use crate::sheet::SheetSize;
    pub use crate::training::{ClassificationBatch, MetricEvent, MetricSink, Trainer, TrainingConfig};
    pub use crate::visualize::{render_gif, ActivationTrace, GifOptions};
}
