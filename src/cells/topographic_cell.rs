//! Topographic Cortical Cell
//!
//! A single recurrent step over a neuron sheet: one sparse matrix multiply by the
//! synaptic weight followed by an optional per-neuron bias.

use burn::module::{Ignored, Module, Param};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;
use rand::rngs::StdRng;

use super::sparse_weight::{SparseBackend, SparseLayout, SparseWeight};
use crate::connectivity::Connectivity;
use crate::error::Result;
use crate::sparse::CooMatrix;

/// Sparse recurrent cell over `N` neurons.
///
/// # Tensor Shapes
///
/// | batch_first | input / output |
/// |-------------|----------------|
/// | `true` (default) | `[batch, N]` |
/// | `false` | `[N, batch]` |
#[derive(Module, Debug)]
pub struct TopographicCell<B: Backend> {
    weight: SparseWeight<B>,
    /// Per-neuron bias of shape `[N, 1]`
    bias: Option<Param<Tensor<B, 2>>>,
    backend: Ignored<SparseBackend>,
    batch_first: bool,
}

impl<B: Backend> TopographicCell<B> {
    /// Create a cell from a host weight matrix.
    ///
    /// Fails if `backend` cannot run on `layout`. Bias starts at zero and input is
    /// batch-first.
    pub fn new(
        matrix: CooMatrix,
        backend: SparseBackend,
        layout: SparseLayout,
        device: &B::Device,
    ) -> Result<Self> {
        backend.validate(layout)?;
        let num_neurons = matrix.size();
        let weight = SparseWeight::new(matrix, layout, device);

        Ok(Self {
            weight,
            bias: Some(Param::from_tensor(Tensor::zeros([num_neurons, 1], device))),
            backend: Ignored(backend),
            batch_first: true,
        })
    }

    /// Build the weight from a connectivity source, then create the cell.
    pub fn from_connectivity(
        connectivity: &dyn Connectivity,
        rng: &mut StdRng,
        backend: SparseBackend,
        layout: SparseLayout,
        device: &B::Device,
    ) -> Result<Self> {
        backend.validate(layout)?;
        let matrix = connectivity.build(rng)?;
        Self::new(matrix, backend, layout, device)
    }

    /// Enable or disable the bias term (default: enabled)
    pub fn with_bias(mut self, bias: bool) -> Self {
        self.bias = match (bias, self.bias) {
            (false, _) => None,
            (true, Some(existing)) => Some(existing),
            (true, None) => {
                let device = self.weight.devices()[0].clone();
                Some(Param::from_tensor(Tensor::zeros(
                    [self.weight.num_neurons(), 1],
                    &device,
                )))
            }
        };
        self
    }

    /// Set whether input is batch-first (default: true)
    pub fn with_batch_first(mut self, batch_first: bool) -> Self {
        self.batch_first = batch_first;
        self
    }

    pub fn num_neurons(&self) -> usize {
        self.weight.num_neurons()
    }

    pub fn nnz(&self) -> usize {
        self.weight.nnz()
    }

    pub fn backend(&self) -> SparseBackend {
        *self.backend
    }

    pub fn layout(&self) -> SparseLayout {
        self.weight.layout()
    }

    pub fn batch_first(&self) -> bool {
        self.batch_first
    }

    pub fn has_bias(&self) -> bool {
        self.bias.is_some()
    }

    pub fn weight(&self) -> &SparseWeight<B> {
        &self.weight
    }

    /// Host copy of the `(destination, source)` indices.
    pub fn indices(&self) -> Result<(Vec<usize>, Vec<usize>)> {
        let matrix = self.weight.to_coo()?;
        Ok((matrix.rows().to_vec(), matrix.cols().to_vec()))
    }

    /// Host copy of the synaptic weights, aligned with [`indices`](Self::indices).
    pub fn values(&self) -> Result<Vec<f32>> {
        Ok(self.weight.to_coo()?.values().to_vec())
    }

    /// Re-normalize the sparse structure.
    ///
    /// Entries are sorted and merged when the weight is uploaded and the indices
    /// never change afterwards, so the cell comes back unchanged.
    pub fn coalesce(self) -> Self {
        self
    }

    /// One step `W @ x + b` in the configured orientation.
    pub fn forward(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        if self.batch_first {
            self.forward_neuron_major(x.transpose()).transpose()
        } else {
            self.forward_neuron_major(x)
        }
    }

    /// One step on a neuron-major `[N, batch]` tensor.
    pub fn forward_neuron_major(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let y = self.backend.sparse_matmul(&self.weight, x);
        match &self.bias {
            Some(bias) => y + bias.val(),
            None => y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::GaussianConnectivity;
    use crate::sheet::SheetSize;
    use burn::backend::NdArray;
    use rand::SeedableRng;

    type TestBackend = NdArray<f32>;

    fn get_test_device() -> <TestBackend as Backend>::Device {
        Default::default()
    }

    #[test]
    fn test_bias_broadcasts_over_batch() {
        let device = get_test_device();
        let matrix = CooMatrix::from_triplets(2, vec![0, 1], vec![0, 1], vec![0.0, 0.0]).unwrap();
        let cell = TopographicCell::<TestBackend>::new(
            matrix,
            SparseBackend::TorchSparse,
            SparseLayout::TorchSparse,
            &device,
        )
        .unwrap();
        assert!(cell.has_bias());

        let x = Tensor::<TestBackend, 2>::ones([3, 2], &device);
        let y = cell.forward(x);
        assert_eq!(y.dims(), [3, 2]);
        assert!(y.abs().sum().into_scalar() < 1e-6);
    }

    #[test]
    fn test_invalid_pairing_rejected() {
        let device = get_test_device();
        let conn = GaussianConnectivity::new(SheetSize::new(2, 2), 1, 1.0);
        let mut rng = StdRng::seed_from_u64(0);
        let result = TopographicCell::<TestBackend>::from_connectivity(
            &conn,
            &mut rng,
            SparseBackend::Tsgu,
            SparseLayout::TorchSparse,
            &device,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_orientations_agree() {
        let device = get_test_device();
        let conn = GaussianConnectivity::new(SheetSize::new(3, 3), 2, 1.0);
        let mut rng = StdRng::seed_from_u64(4);
        let cell = TopographicCell::<TestBackend>::from_connectivity(
            &conn,
            &mut rng,
            SparseBackend::Native,
            SparseLayout::Coo,
            &device,
        )
        .unwrap()
        .with_bias(false);

        let x = Tensor::<TestBackend, 2>::random(
            [2, 9],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        let batch_first = cell.forward(x.clone());
        let cell = cell.with_batch_first(false);
        let neuron_major = cell.forward(x.transpose()).transpose();

        let diff = (batch_first - neuron_major).abs().max().into_scalar();
        assert!(diff < 1e-6);
    }
}
