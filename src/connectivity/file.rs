use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use tracing::info;

use super::format::load_connectivity;
use super::Connectivity;
use crate::error::{Result, TopographyError};
use crate::sparse::CooMatrix;

/// Connectivity read from a sparse matrix file.
///
/// Only the stored indices are used. Weights are redrawn with He scaling from the
/// final per-destination fan-in, after any missing self-loops have been added.
#[derive(Clone, Debug)]
pub struct FileConnectivity {
    path: PathBuf,
    self_recurrence: bool,
    matrix: CooMatrix,
}

impl FileConnectivity {
    /// Read and validate the file eagerly so shape errors surface at construction.
    pub fn open(path: impl AsRef<Path>, self_recurrence: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let record = load_connectivity(&path)?;
        let mut matrix = record.to_coo()?;
        matrix.coalesce();

        Ok(Self {
            path,
            self_recurrence,
            matrix,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn self_recurrence(&self) -> bool {
        self.self_recurrence
    }

    /// The stored indices as read from disk, after coalescing.
    pub fn stored(&self) -> &CooMatrix {
        &self.matrix
    }
}

impl Connectivity for FileConnectivity {
    fn num_neurons(&self) -> usize {
        self.matrix.size()
    }

    fn build(&self, rng: &mut StdRng) -> Result<CooMatrix> {
        let mut matrix = self.matrix.clone();
        let added = if self.self_recurrence {
            matrix.add_self_loops()
        } else {
            0
        };
        matrix.coalesce();
        if matrix.nnz() == 0 {
            return Err(TopographyError::EmptyConnectivity);
        }
        matrix.he_initialize(rng);

        info!(
            path = %self.path.display(),
            neurons = matrix.size(),
            synapses = matrix.nnz(),
            self_loops_added = added,
            "loaded connectivity"
        );
        Ok(matrix)
    }
}
