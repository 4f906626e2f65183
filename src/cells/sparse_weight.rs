//! Sparse weight storage and the sparse matrix-multiply strategies that consume it.

use std::fmt;
use std::str::FromStr;

use burn::module::{Ignored, Module, Param, ParamId};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use serde::{Deserialize, Serialize};

use crate::data::{float_tensor, float_vec, index_tensor, index_vec};
use crate::error::{Result, TopographyError};
use crate::sparse::CooMatrix;

/// Algorithm used to compute `W @ x`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseBackend {
    /// Gather source rows, scale, then index-add into destinations.
    TorchSparse,
    /// Element-wise gather over expanded index tensors, then index-add.
    Native,
    /// Row-padded slot table built from the CSR row pointers, reduced per row.
    Tsgu,
}

/// Storage layout of the sparse weight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SparseLayout {
    TorchSparse,
    Coo,
    Csr,
}

/// Every backend/layout combination that can be constructed.
pub const VALID_PAIRINGS: &[(SparseBackend, SparseLayout)] = &[
    (SparseBackend::TorchSparse, SparseLayout::TorchSparse),
    (SparseBackend::Native, SparseLayout::Coo),
    (SparseBackend::Native, SparseLayout::Csr),
    (SparseBackend::Tsgu, SparseLayout::Coo),
    (SparseBackend::Tsgu, SparseLayout::Csr),
];

impl SparseBackend {
    pub const ALL: [SparseBackend; 3] = [Self::TorchSparse, Self::Native, Self::Tsgu];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TorchSparse => "torch_sparse",
            Self::Native => "native",
            Self::Tsgu => "tsgu",
        }
    }

    /// Reject layouts this backend cannot run on.
    pub fn validate(self, layout: SparseLayout) -> Result<()> {
        if VALID_PAIRINGS.contains(&(self, layout)) {
            Ok(())
        } else {
            Err(TopographyError::InvalidBackendLayout {
                backend: self,
                layout,
            })
        }
    }

    /// Multiply a neuron-major `[N, batch]` tensor by the sparse weight.
    ///
    /// Every strategy touches only the stored entries, so memory stays
    /// proportional to `nnz * batch`.
    pub fn sparse_matmul<B: Backend>(&self, weight: &SparseWeight<B>, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let [n, batch] = x.dims();
        let device = x.device();
        let rows = weight.rows.val();
        let cols = weight.cols.val();
        let values = weight.values.val();

        match self {
            Self::TorchSparse => {
                let messages = x.select(0, cols) * values.unsqueeze_dim::<2>(1);
                Tensor::zeros([n, batch], &device).select_assign(0, rows, messages)
            }
            Self::Native => {
                let cols = cols.unsqueeze_dim::<2>(1).repeat_dim(1, batch);
                let messages = x.gather(0, cols) * values.unsqueeze_dim::<2>(1);
                Tensor::zeros([n, batch], &device).select_assign(0, rows, messages)
            }
            Self::Tsgu => {
                // one padded slot table per destination row, reduced with a sum
                let (slots, width) = padded_slots(weight.offsets.as_slice());
                let slots = index_tensor::<B>(&slots, &device);
                let cols = Tensor::cat(vec![cols, Tensor::zeros([1], &device)], 0)
                    .select(0, slots.clone());
                let values = Tensor::cat(vec![values, Tensor::zeros([1], &device)], 0)
                    .select(0, slots)
                    .reshape([n, width, 1]);
                let messages = x.select(0, cols).reshape([n, width, batch]) * values;
                messages.sum_dim(1).reshape([n, batch])
            }
        }
    }
}

/// Lay each row's entries out in `width` slots, where `width` is the largest fan-in.
/// Unused slots point one past the last entry, at the zero padding.
fn padded_slots(offsets: &[usize]) -> (Vec<usize>, usize) {
    let pad = offsets.last().copied().unwrap_or(0);
    let width = offsets
        .windows(2)
        .map(|w| w[1] - w[0])
        .max()
        .unwrap_or(0)
        .max(1);
    let mut slots = Vec::with_capacity((offsets.len().saturating_sub(1)) * width);
    for w in offsets.windows(2) {
        slots.extend(w[0]..w[1]);
        slots.extend(std::iter::repeat(pad).take(width - (w[1] - w[0])));
    }
    (slots, width)
}

impl SparseLayout {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TorchSparse => "torch_sparse",
            Self::Coo => "coo",
            Self::Csr => "csr",
        }
    }
}

impl fmt::Display for SparseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for SparseLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SparseBackend {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.name() == s)
            .ok_or_else(|| TopographyError::unknown("sparse backend", s))
    }
}

impl FromStr for SparseLayout {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        [Self::TorchSparse, Self::Coo, Self::Csr]
            .into_iter()
            .find(|l| l.name() == s)
            .ok_or_else(|| TopographyError::unknown("sparse layout", s))
    }
}

/// A coalesced sparse `N x N` weight living on a device.
///
/// Index tensors are stored as non-trainable parameters so they travel with the
/// module record; only `values` receives gradients.
#[derive(Module, Debug)]
pub struct SparseWeight<B: Backend> {
    rows: Param<Tensor<B, 1, Int>>,
    cols: Param<Tensor<B, 1, Int>>,
    values: Param<Tensor<B, 1>>,
    num_neurons: usize,
    layout: Ignored<SparseLayout>,
    /// Row pointers over the stored entries, kept for every layout.
    offsets: Ignored<Vec<usize>>,
}

impl<B: Backend> SparseWeight<B> {
    /// Upload a host matrix, coalescing it first.
    pub fn new(mut matrix: CooMatrix, layout: SparseLayout, device: &B::Device) -> Self {
        matrix.coalesce();
        let offsets = matrix.row_offsets();
        let (num_neurons, rows, cols, values) = matrix.into_parts();
        let rows = match layout {
            // expand the compressed row pointers back to one row per entry
            SparseLayout::Csr => offsets
                .windows(2)
                .enumerate()
                .flat_map(|(row, w)| std::iter::repeat(row).take(w[1] - w[0]))
                .collect(),
            _ => rows,
        };

        Self {
            rows: Param::initialized(ParamId::new(), index_tensor(&rows, device)),
            cols: Param::initialized(ParamId::new(), index_tensor(&cols, device)),
            values: Param::from_tensor(float_tensor(&values, device)),
            num_neurons,
            layout: Ignored(layout),
            offsets: Ignored(offsets),
        }
    }

    pub fn num_neurons(&self) -> usize {
        self.num_neurons
    }

    /// Number of stored synapses.
    pub fn nnz(&self) -> usize {
        self.cols.val().dims()[0]
    }

    pub fn layout(&self) -> SparseLayout {
        *self.layout
    }

    /// CSR row pointers, exposed only for [`SparseLayout::Csr`].
    pub fn row_offsets(&self) -> Option<&[usize]> {
        match *self.layout {
            SparseLayout::Csr => Some(self.offsets.as_slice()),
            _ => None,
        }
    }

    /// Copy the weight back to the host.
    pub fn to_coo(&self) -> Result<CooMatrix> {
        CooMatrix::from_triplets(
            self.num_neurons,
            index_vec(self.rows.val())?,
            index_vec(self.cols.val())?,
            float_vec(self.values.val())?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_pairing_table() {
        for backend in SparseBackend::ALL {
            for layout in [SparseLayout::TorchSparse, SparseLayout::Coo, SparseLayout::Csr] {
                let expected = VALID_PAIRINGS.contains(&(backend, layout));
                assert_eq!(backend.validate(layout).is_ok(), expected, "{backend}/{layout}");
            }
        }
        assert!(SparseBackend::TorchSparse.validate(SparseLayout::Coo).is_err());
        assert!(SparseBackend::Native.validate(SparseLayout::TorchSparse).is_err());
    }

    #[test]
    fn test_names_round_trip() {
        for backend in SparseBackend::ALL {
            assert_eq!(backend.name().parse::<SparseBackend>().unwrap(), backend);
        }
        assert_eq!("csr".parse::<SparseLayout>().unwrap(), SparseLayout::Csr);
        assert!("cuda".parse::<SparseBackend>().is_err());

        let json = serde_json::to_string(&SparseBackend::TorchSparse).unwrap();
        assert_eq!(json, "\"torch_sparse\"");
    }

    #[test]
    fn test_padded_slots() {
        // rows with 1, 0, 2 and 1 entries
        let (slots, width) = padded_slots(&[0, 1, 1, 3, 4]);
        assert_eq!(width, 2);
        assert_eq!(slots, vec![0, 4, 4, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn test_csr_rows_match_coo() {
        let device = Default::default();
        let matrix = CooMatrix::from_edges(4, [(0, 2), (1, 0), (3, 2), (2, 3)]).unwrap();
        let coo = SparseWeight::<TestBackend>::new(matrix.clone(), SparseLayout::Coo, &device);
        let csr = SparseWeight::<TestBackend>::new(matrix, SparseLayout::Csr, &device);

        assert_eq!(csr.row_offsets(), Some(&[0, 1, 1, 3, 4][..]));
        assert_eq!(coo.to_coo().unwrap(), csr.to_coo().unwrap());
    }

    #[test]
    fn test_strategies_agree_with_dense() {
        let device = Default::default();
        let mut matrix = CooMatrix::from_triplets(
            3,
            vec![0, 0, 1, 2, 2],
            vec![0, 2, 1, 0, 1],
            vec![1.0, 2.0, -1.0, 0.5, 3.0],
        )
        .unwrap();
        matrix.coalesce();
        let weight = SparseWeight::<TestBackend>::new(matrix, SparseLayout::Coo, &device);
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]], &device);

        let expected = [11.0f32, 14.0, -3.0, -4.0, 9.5, 13.0];
        for backend in SparseBackend::ALL {
            let y = backend.sparse_matmul(&weight, x.clone());
            assert_eq!(y.dims(), [3, 2]);
            let got = y.into_data().to_vec::<f32>().unwrap();
            for (g, e) in got.iter().zip(expected.iter()) {
                assert!((g - e).abs() < 1e-5, "{backend}: got {got:?}");
            }
        }
    }
}
