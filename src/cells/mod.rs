//! # Sparse Recurrent Cells
//!
//! Single-step modules over a neuron sheet. The multi-step driver lives in
//! [`crate::rnn`].
//!
//! ## Sparse Backends
//!
//! Every backend computes the same `W @ x`; they differ in how the sparse product is
//! expressed as tensor operations, which changes speed and memory use.
//!
//! | Backend | Valid layouts | Strategy |
//! |---------|---------------|----------|
//! | [`SparseBackend::TorchSparse`] | `torch_sparse` | `select` sources, `select_assign` into destinations |
//! | [`SparseBackend::Native`] | `coo`, `csr` | element-wise `gather`, then `select_assign` into destinations |
//! | [`SparseBackend::Tsgu`] | `coo`, `csr` | row-padded slots from the row pointers, summed per row |
//!
//! Pairings are checked once against [`VALID_PAIRINGS`] when a cell is built.
//!
//! ## Example
//!
//! ```ignore
//! use bioplnn::cells::{SparseBackend, SparseLayout, TopographicCell};
//! use bioplnn::connectivity::GaussianConnectivity;
//! use bioplnn::sheet::SheetSize;
//!
//! let conn = GaussianConnectivity::new(SheetSize::new(4, 4), 3, 1.0);
//! let cell = TopographicCell::<Backend>::from_connectivity(
//!     &conn, &mut rng, SparseBackend::Native, SparseLayout::Csr, &device,
//! )?;
//! let y = cell.forward(x); // [batch, 16] -> [batch, 16]
//! ```

mod sparse_weight;
pub mod topographic_cell;

pub use sparse_weight::{SparseBackend, SparseLayout, SparseWeight, VALID_PAIRINGS};
pub use topographic_cell::TopographicCell;
