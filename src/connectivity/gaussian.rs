use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::info;

use super::Connectivity;
use crate::error::{Result, TopographyError};
use crate::sheet::SheetSize;
use crate::sparse::CooMatrix;

/// Local random connectivity on a neuron sheet.
///
/// Every neuron draws `synapses_per_neuron` presynaptic partners from a 2D Gaussian
/// centred on its own grid position. Samples falling off the sheet are clamped to the
/// border, so edge neurons see a truncated distribution.
#[derive(Clone, Debug)]
pub struct GaussianConnectivity {
    sheet: SheetSize,
    synapses_per_neuron: usize,
    std: f64,
    self_recurrence: bool,
}

impl GaussianConnectivity {
    pub fn new(sheet: SheetSize, synapses_per_neuron: usize, std: f64) -> Self {
        Self {
            sheet,
            synapses_per_neuron,
            std,
            self_recurrence: true,
        }
    }

    pub fn with_self_recurrence(mut self, self_recurrence: bool) -> Self {
        self.self_recurrence = self_recurrence;
        self
    }

    pub fn sheet(&self) -> SheetSize {
        self.sheet
    }

    pub fn synapses_per_neuron(&self) -> usize {
        self.synapses_per_neuron
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn self_recurrence(&self) -> bool {
        self.self_recurrence
    }

    /// Incoming synapses per neuron before duplicates are merged.
    pub fn fan_in(&self) -> usize {
        self.synapses_per_neuron + usize::from(self.self_recurrence)
    }

    /// Sample raw `(source, destination)` edges, duplicates included.
    pub fn sample_edges(&self, rng: &mut StdRng) -> Result<Vec<(usize, usize)>> {
        // rand_distr accepts a negative std and mirrors the samples
        if !(self.std.is_finite() && self.std >= 0.0) {
            return Err(TopographyError::InvalidConnectivity(format!(
                "synapse std must be finite and non-negative, got {}",
                self.std
            )));
        }
        let normal = Normal::new(0.0, self.std).map_err(|e| {
            TopographyError::InvalidConnectivity(format!("synapse std {}: {e}", self.std))
        })?;

        let mut edges = Vec::with_capacity(self.sheet.num_neurons() * self.fan_in());
        for row in 0..self.sheet.rows {
            for col in 0..self.sheet.cols {
                let dst = self.sheet.linear_index(row, col);
                for _ in 0..self.synapses_per_neuron {
                    let (r, c) = self.sheet.clamp_to_grid(
                        row as f64 + normal.sample(rng),
                        col as f64 + normal.sample(rng),
                    );
                    edges.push((self.sheet.linear_index(r, c), dst));
                }
                if self.self_recurrence {
                    edges.push((dst, dst));
                }
            }
        }
        Ok(edges)
    }
}

impl Connectivity for GaussianConnectivity {
    fn num_neurons(&self) -> usize {
        self.sheet.num_neurons()
    }

    fn build(&self, rng: &mut StdRng) -> Result<CooMatrix> {
        let edges = self.sample_edges(rng)?;
        let mut matrix = CooMatrix::from_edges(self.num_neurons(), edges)?;
        // scale by the sampled fan-in; coalescing then sums any duplicate draws
        matrix.he_initialize(rng);
        matrix.coalesce();

        info!(
            rows = self.sheet.rows,
            cols = self.sheet.cols,
            synapses = matrix.nnz(),
            "built gaussian connectivity"
        );
        Ok(matrix)
    }
}
