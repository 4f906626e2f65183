//! Host-side coordinate-format sparse matrices.
//!
//! Connectivity is assembled and normalized here before it is uploaded to the
//! tensor runtime. Rows index destination neurons and columns index source
//! neurons, so a matrix-vector product `W x` routes source activity to the
//! destinations.

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::{Result, TopographyError};

/// A square `size x size` sparse matrix in coordinate (COO) format.
#[derive(Clone, Debug, PartialEq)]
pub struct CooMatrix {
    size: usize,
    rows: Vec<usize>,
    cols: Vec<usize>,
    values: Vec<f32>,
}

impl CooMatrix {
    /// Build an unweighted matrix from `(source, destination)` edges.
    ///
    /// Values start at zero; call [`he_initialize`](Self::he_initialize) to draw weights.
    pub fn from_edges(size: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Result<Self> {
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        for (src, dst) in edges {
            if src >= size || dst >= size {
                return Err(TopographyError::InvalidConnectivity(format!(
                    "synapse {src} -> {dst} outside a {size}x{size} matrix"
                )));
            }
            rows.push(dst);
            cols.push(src);
        }
        let values = vec![0.0; rows.len()];
        Ok(Self {
            size,
            rows,
            cols,
            values,
        })
    }

    /// Build a matrix from parallel row/column/value vectors.
    pub fn from_triplets(
        size: usize,
        rows: Vec<usize>,
        cols: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        if rows.len() != cols.len() || rows.len() != values.len() {
            return Err(TopographyError::InvalidConnectivity(format!(
                "mismatched triplet lengths: {} rows, {} cols, {} values",
                rows.len(),
                cols.len(),
                values.len()
            )));
        }
        if let Some(&bad) = rows.iter().chain(cols.iter()).find(|&&i| i >= size) {
            return Err(TopographyError::IndexOutOfRange {
                name: "connectivity",
                index: bad as i64,
                size,
            });
        }
        Ok(Self {
            size,
            rows,
            cols,
            values,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of stored entries (duplicates included until coalesced).
    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    /// Destination neuron of every entry.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Source neuron of every entry.
    pub fn cols(&self) -> &[usize] {
        &self.cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Whether entries are sorted by `(row, col)` with no duplicates.
    pub fn is_coalesced(&self) -> bool {
        self.rows
            .iter()
            .zip(self.cols.iter())
            .zip(self.rows.iter().skip(1).zip(self.cols.iter().skip(1)))
            .all(|(prev, next)| prev < next)
    }

    /// Sort entries by `(row, col)` and sum the values of duplicate entries.
    ///
    /// Duplicates are summed rather than averaged, so a source sampled twice for the
    /// same destination carries twice the weight variance.
    pub fn coalesce(&mut self) {
        if self.is_coalesced() {
            return;
        }

        let mut order: Vec<usize> = (0..self.nnz()).collect();
        order.sort_by_key(|&i| (self.rows[i], self.cols[i]));

        let mut rows: Vec<usize> = Vec::with_capacity(order.len());
        let mut cols: Vec<usize> = Vec::with_capacity(order.len());
        let mut values: Vec<f32> = Vec::with_capacity(order.len());
        for i in order {
            let (r, c, v) = (self.rows[i], self.cols[i], self.values[i]);
            match (rows.last(), cols.last()) {
                (Some(&lr), Some(&lc)) if lr == r && lc == c => {
                    if let Some(last) = values.last_mut() {
                        *last += v;
                    }
                }
                _ => {
                    rows.push(r);
                    cols.push(c);
                    values.push(v);
                }
            }
        }

        self.rows = rows;
        self.cols = cols;
        self.values = values;
    }

    /// Number of incoming entries per destination neuron.
    pub fn fan_in(&self) -> Vec<usize> {
        let mut counts = vec![0; self.size];
        for &r in &self.rows {
            counts[r] += 1;
        }
        counts
    }

    /// CSR row pointers. Only meaningful once the matrix is coalesced.
    pub fn row_offsets(&self) -> Vec<usize> {
        let mut offsets = vec![0; self.size + 1];
        for &r in &self.rows {
            offsets[r + 1] += 1;
        }
        for i in 0..self.size {
            offsets[i + 1] += offsets[i];
        }
        offsets
    }

    /// Add a self-loop for every neuron touched by an entry that does not already have one.
    ///
    /// Returns the number of loops added.
    pub fn add_self_loops(&mut self) -> usize {
        let mut touched = vec![false; self.size];
        let mut looped = vec![false; self.size];
        for (&r, &c) in self.rows.iter().zip(self.cols.iter()) {
            touched[r] = true;
            touched[c] = true;
            if r == c {
                looped[r] = true;
            }
        }

        let mut added = 0;
        for neuron in 0..self.size {
            if touched[neuron] && !looped[neuron] {
                self.rows.push(neuron);
                self.cols.push(neuron);
                self.values.push(0.0);
                added += 1;
            }
        }
        added
    }

    /// Redraw every value as `N(0, 1) * sqrt(2 / fan_in)` of its destination neuron.
    pub fn he_initialize<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        let fan_in = self.fan_in();
        for (value, &row) in self.values.iter_mut().zip(self.rows.iter()) {
            let scale = (2.0 / fan_in[row].max(1) as f64).sqrt();
            let z: f64 = StandardNormal.sample(rng);
            *value = (z * scale) as f32;
        }
    }

    pub(crate) fn into_parts(self) -> (usize, Vec<usize>, Vec<usize>, Vec<f32>) {
        (self.size, self.rows, self.cols, self.values)
    }
}
