//! # Synaptic Connectivity
//!
//! Builders for the sparse recurrent weight matrix of a neuron sheet.
//!
//! | Source | Description |
//! |--------|-------------|
//! | [`GaussianConnectivity`] | Local random synapses drawn around each neuron |
//! | [`FileConnectivity`] | Indices read from a sparse matrix file |
//!
//! Both produce a coalesced [`CooMatrix`](crate::sparse::CooMatrix) whose values are
//! He-initialized from the per-destination fan-in.

use std::path::Path;

use rand::rngs::StdRng;
use tracing::warn;

use crate::error::{Result, TopographyError};
use crate::sheet::SheetSize;
use crate::sparse::CooMatrix;

mod file;
pub mod format;
mod gaussian;

pub use file::FileConnectivity;
pub use format::{
    load_connectivity, load_indices, save_connectivity_npy, save_index_npy, save_index_record,
    save_sparse_record, FileFormat, IndexTensorRecord, Probe, SparseTensorRecord,
};
pub use gaussian::GaussianConnectivity;

/// Something that can produce an `N x N` synapse matrix.
pub trait Connectivity: Send + Sync {
    /// Number of neurons `N` the matrix spans.
    fn num_neurons(&self) -> usize;

    /// Build the coalesced, initialized weight matrix.
    fn build(&self, rng: &mut StdRng) -> Result<CooMatrix>;
}

/// The connectivity a model is built from, chosen from its configuration.
#[derive(Clone, Debug)]
pub enum ConnectivitySource {
    Gaussian(GaussianConnectivity),
    File(FileConnectivity),
}

impl ConnectivitySource {
    /// Pick a source from the random parameters and an optional file.
    ///
    /// A file takes precedence over random parameters; supplying both logs a warning.
    pub fn resolve(
        sheet: SheetSize,
        synapse_std: Option<f64>,
        synapses_per_neuron: Option<usize>,
        self_recurrence: bool,
        path: Option<&Path>,
    ) -> Result<Self> {
        let random = synapse_std.zip(synapses_per_neuron);
        match (path, random) {
            (Some(path), random) => {
                if random.is_some() {
                    warn!(
                        path = %path.display(),
                        "both random and file connectivity configured, using the file"
                    );
                }
                Ok(Self::File(FileConnectivity::open(path, self_recurrence)?))
            }
            (None, Some((std, spn))) => Ok(Self::Gaussian(
                GaussianConnectivity::new(sheet, spn, std).with_self_recurrence(self_recurrence),
            )),
            (None, None) => Err(TopographyError::MissingConnectivity),
        }
    }
}

impl Connectivity for ConnectivitySource {
    fn num_neurons(&self) -> usize {
        match self {
            Self::Gaussian(c) => c.num_neurons(),
            Self::File(c) => c.num_neurons(),
        }
    }

    fn build(&self, rng: &mut StdRng) -> Result<CooMatrix> {
        match self {
            Self::Gaussian(c) => c.build(rng),
            Self::File(c) => c.build(rng),
        }
    }
}
