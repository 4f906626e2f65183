//! Geometry of the 2D neuron sheet.

use serde::{Deserialize, Serialize};

/// A `rows x cols` grid of neurons, flattened row-major.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SheetSize {
    pub rows: usize,
    pub cols: usize,
}

impl SheetSize {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of neurons on the sheet.
    pub fn num_neurons(&self) -> usize {
        self.rows * self.cols
    }

    /// Row-major linear index of the neuron at `(row, col)`.
    pub fn linear_index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    pub fn position(&self, index: usize) -> (usize, usize) {
        (index / self.cols, index % self.cols)
    }

    /// Round and clamp a continuous sheet coordinate to the nearest neuron.
    pub fn clamp_to_grid(&self, row: f64, col: f64) -> (usize, usize) {
        let clamp = |v: f64, upper: usize| -> usize {
            let v = v.round();
            if v <= 0.0 {
                0
            } else if v >= upper as f64 {
                upper
            } else {
                v as usize
            }
        };
        (
            clamp(row, self.rows.saturating_sub(1)),
            clamp(col, self.cols.saturating_sub(1)),
        )
    }
}

impl Default for SheetSize {
    fn default() -> Self {
        Self::new(150, 300)
    }
}
