//! Topographic RNN
//!
//! Drives a [`TopographicCell`] for a fixed number of steps with the embedded input
//! re-injected at every step, then classifies the final sheet state.

use std::path::Path;

use burn::config::Config;
use burn::module::{Ignored, Module, Param, ParamId};
use burn::nn::{Linear, LinearConfig};
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::activation::Nonlinearity;
use crate::cells::{SparseBackend, SparseLayout, TopographicCell};
use crate::connectivity::{load_indices, Connectivity, ConnectivitySource};
use crate::data::index_tensor;
use crate::error::{Result, TopographyError};
use crate::sheet::SheetSize;
use crate::visualize::ActivationTrace;

/// Configuration for [`TopographicRnn`].
#[derive(Config, Debug)]
pub struct TopographicRnnConfig {
    /// Grid the neurons are laid out on
    #[config(default = "SheetSize::new(150, 300)")]
    pub sheet_size: SheetSize,
    /// Spread of local synapses, in grid cells
    #[config(default = "Some(10.0)")]
    pub synapse_std: Option<f64>,
    #[config(default = "Some(32)")]
    pub synapses_per_neuron: Option<usize>,
    #[config(default = true)]
    pub self_recurrence: bool,
    /// Sparse matrix file; takes precedence over random connectivity
    pub connectivity_path: Option<String>,
    #[config(default = "SparseBackend::TorchSparse")]
    pub sparse_backend: SparseBackend,
    #[config(default = "SparseLayout::TorchSparse")]
    pub sparse_layout: SparseLayout,
    #[config(default = 10)]
    pub num_classes: usize,
    /// Orientation of flat `[batch, N]` inputs
    #[config(default = true)]
    pub batch_first: bool,
    /// 1-D index file mapping input features onto sheet neurons
    pub input_indices_path: Option<String>,
    /// 1-D index file selecting the neurons seen by the readout
    pub output_indices_path: Option<String>,
    #[config(default = "Nonlinearity::Relu")]
    pub nonlinearity: Nonlinearity,
    #[config(default = true)]
    pub bias: bool,
    #[config(default = 64)]
    pub readout_hidden: usize,
    /// Seed for connectivity sampling and weight draws
    #[config(default = 0)]
    pub seed: u64,
}

impl TopographicRnnConfig {
    /// Build the model, reading any index files named in the config.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<TopographicRnn<B>> {
        let source = self.connectivity()?;
        let num_neurons = source.num_neurons();
        let input = self
            .input_indices_path
            .as_deref()
            .map(|p| load_indices(p)?.into_neuron_indices("input", num_neurons))
            .transpose()?;
        let output = self
            .output_indices_path
            .as_deref()
            .map(|p| load_indices(p)?.into_neuron_indices("output", num_neurons))
            .transpose()?;
        self.build(source, input, output, device)
    }

    /// Build the model with index sets supplied in memory. Index files in the config
    /// are ignored.
    pub fn init_with_indices<B: Backend>(
        &self,
        input_indices: Option<Vec<usize>>,
        output_indices: Option<Vec<usize>>,
        device: &B::Device,
    ) -> Result<TopographicRnn<B>> {
        let source = self.connectivity()?;
        let n = source.num_neurons();
        for (name, indices) in [("input", &input_indices), ("output", &output_indices)] {
            if let Some(&bad) = indices.iter().flatten().find(|&&i| i >= n) {
                return Err(TopographyError::IndexOutOfRange {
                    name,
                    index: bad as i64,
                    size: n,
                });
            }
        }
        self.build(source, input_indices, output_indices, device)
    }

    fn connectivity(&self) -> Result<ConnectivitySource> {
        self.sparse_backend.validate(self.sparse_layout)?;
        ConnectivitySource::resolve(
            self.sheet_size,
            self.synapse_std,
            self.synapses_per_neuron,
            self.self_recurrence,
            self.connectivity_path.as_deref().map(Path::new),
        )
    }

    fn build<B: Backend>(
        &self,
        source: ConnectivitySource,
        input_indices: Option<Vec<usize>>,
        output_indices: Option<Vec<usize>>,
        device: &B::Device,
    ) -> Result<TopographicRnn<B>> {
        let num_neurons = source.num_neurons();
        if num_neurons != self.sheet_size.num_neurons() {
            warn!(
                rows = self.sheet_size.rows,
                cols = self.sheet_size.cols,
                num_neurons,
                "connectivity does not match the sheet; visualization will be unavailable"
            );
        }

        // input features are index-added onto the sheet, so a repeat would sum them
        if let Some(indices) = &input_indices {
            let mut seen = vec![false; num_neurons];
            if let Some(&index) = indices.iter().find(|&&i| std::mem::replace(&mut seen[i], true)) {
                return Err(TopographyError::DuplicateIndex {
                    name: "input",
                    index,
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let cell = TopographicCell::from_connectivity(
            &source,
            &mut rng,
            self.sparse_backend,
            self.sparse_layout,
            device,
        )?
        .with_bias(self.bias)
        .with_batch_first(self.batch_first);

        let num_inputs = input_indices.as_ref().map_or(num_neurons, Vec::len);
        let num_outputs = output_indices.as_ref().map_or(num_neurons, Vec::len);
        let index_param =
            |indices: &[usize]| Param::initialized(ParamId::new(), index_tensor::<B>(indices, device));

        debug!(
            num_neurons,
            synapses = cell.nnz(),
            num_inputs,
            num_outputs,
            backend = %self.sparse_backend,
            "initialized topographic rnn"
        );

        Ok(TopographicRnn {
            cell,
            readout_hidden: LinearConfig::new(num_outputs, self.readout_hidden).init(device),
            readout_out: LinearConfig::new(self.readout_hidden, self.num_classes).init(device),
            input_indices: input_indices.as_deref().map(index_param),
            output_indices: output_indices.as_deref().map(index_param),
            nonlinearity: Ignored(self.nonlinearity),
            sheet: Ignored(self.sheet_size),
            num_neurons,
            num_inputs,
            num_classes: self.num_classes,
            batch_first: self.batch_first,
        })
    }
}

/// Input accepted by [`TopographicRnn::forward`].
///
/// Channel axes are averaged away; images are flattened to `h * w` features.
#[derive(Clone, Debug)]
pub enum SheetInput<B: Backend> {
    /// `[batch, features]`, or `[features, batch]` when the model is not batch-first
    Flat(Tensor<B, 2>),
    /// `[batch, channels, features]`
    Channels(Tensor<B, 3>),
    /// `[batch, channels, height, width]`
    Images(Tensor<B, 4>),
    /// One `[batch, features]` tensor per channel
    PerChannel(Vec<Tensor<B, 2>>),
}

impl<B: Backend> SheetInput<B> {
    /// Collapse to a `[batch, features]` tensor.
    fn into_features(self, batch_first: bool) -> Result<Tensor<B, 2>> {
        let features = match self {
            Self::Flat(x) if batch_first => x,
            Self::Flat(x) => x.transpose(),
            Self::Channels(x) => x.mean_dim(1).squeeze::<2>(1),
            Self::Images(x) => {
                let [b, c, h, w] = x.dims();
                x.reshape([b, c, h * w]).mean_dim(1).squeeze::<2>(1)
            }
            Self::PerChannel(channels) => {
                if channels.is_empty() {
                    return Err(TopographyError::ShapeMismatch {
                        expected: 1,
                        actual: 0,
                    });
                }
                Tensor::stack::<3>(channels, 1).mean_dim(1).squeeze::<2>(1)
            }
        };
        Ok(features)
    }
}

impl<B: Backend> From<Tensor<B, 2>> for SheetInput<B> {
    fn from(x: Tensor<B, 2>) -> Self {
        Self::Flat(x)
    }
}

impl<B: Backend> From<Tensor<B, 3>> for SheetInput<B> {
    fn from(x: Tensor<B, 3>) -> Self {
        Self::Channels(x)
    }
}

impl<B: Backend> From<Tensor<B, 4>> for SheetInput<B> {
    fn from(x: Tensor<B, 4>) -> Self {
        Self::Images(x)
    }
}

impl<B: Backend> From<Vec<Tensor<B, 2>>> for SheetInput<B> {
    fn from(x: Vec<Tensor<B, 2>>) -> Self {
        Self::PerChannel(x)
    }
}

/// Per-call settings for [`TopographicRnn::forward_with`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ForwardOptions {
    pub num_steps: usize,
    /// Apply the readout after every step
    pub loss_all_timesteps: bool,
    /// Record the sheet state before the first step and after each step
    pub return_activations: bool,
}

impl ForwardOptions {
    pub fn new(num_steps: usize) -> Self {
        Self {
            num_steps,
            loss_all_timesteps: false,
            return_activations: false,
        }
    }

    pub fn with_loss_all_timesteps(mut self, loss_all_timesteps: bool) -> Self {
        self.loss_all_timesteps = loss_all_timesteps;
        self
    }

    pub fn with_return_activations(mut self, return_activations: bool) -> Self {
        self.return_activations = return_activations;
        self
    }
}

/// Result of [`TopographicRnn::forward_with`].
#[derive(Debug)]
pub struct TopographicOutput<B: Backend> {
    /// `[batch, classes]` from the final state
    pub logits: Tensor<B, 2>,
    /// `[steps, batch, classes]`, present with `loss_all_timesteps`
    pub step_logits: Option<Tensor<B, 3>>,
    /// `steps + 1` frames, present with `return_activations`
    pub activations: Option<ActivationTrace>,
}

/// Recurrent network over a 2D neuron sheet with a dense classifier head.
///
/// # Dynamics
///
/// ```text
/// x_0     = embed(input)
/// x_{t+1} = σ(W · (x_0 + x_t) + b)
/// logits  = Linear(σ(Linear(select(x_T))))
/// ```
#[derive(Module, Debug)]
pub struct TopographicRnn<B: Backend> {
    cell: TopographicCell<B>,
    readout_hidden: Linear<B>,
    readout_out: Linear<B>,
    input_indices: Option<Param<Tensor<B, 1, Int>>>,
    output_indices: Option<Param<Tensor<B, 1, Int>>>,
    nonlinearity: Ignored<Nonlinearity>,
    sheet: Ignored<SheetSize>,
    num_neurons: usize,
    num_inputs: usize,
    num_classes: usize,
    batch_first: bool,
}

impl<B: Backend> TopographicRnn<B> {
    pub fn cell(&self) -> &TopographicCell<B> {
        &self.cell
    }

    pub fn num_neurons(&self) -> usize {
        self.num_neurons
    }

    /// Number of input features expected after channel averaging.
    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn sheet_size(&self) -> SheetSize {
        *self.sheet
    }

    pub fn nonlinearity(&self) -> Nonlinearity {
        *self.nonlinearity
    }

    /// Run `num_steps` steps and return the final `[batch, classes]` logits.
    pub fn forward(&self, input: impl Into<SheetInput<B>>, num_steps: usize) -> Result<Tensor<B, 2>> {
        Ok(self.forward_with(input, &ForwardOptions::new(num_steps))?.logits)
    }

    pub fn forward_with(
        &self,
        input: impl Into<SheetInput<B>>,
        options: &ForwardOptions,
    ) -> Result<TopographicOutput<B>> {
        let x0 = self.embed(input.into().into_features(self.batch_first)?)?;
        let mut trace = options.return_activations.then(ActivationTrace::new);
        let mut step_logits = Vec::new();

        if let Some(trace) = trace.as_mut() {
            trace.record(x0.clone())?;
        }

        let mut x = x0.clone();
        for _ in 0..options.num_steps {
            x = self
                .nonlinearity
                .forward(self.cell.forward_neuron_major(x0.clone() + x));
            if let Some(trace) = trace.as_mut() {
                trace.record(x.clone())?;
            }
            if options.loss_all_timesteps {
                step_logits.push(self.readout(x.clone()));
            }
        }

        let logits = self.readout(x);
        let step_logits = options.loss_all_timesteps.then(|| {
            if step_logits.is_empty() {
                step_logits.push(logits.clone());
            }
            Tensor::stack::<3>(step_logits, 0)
        });

        Ok(TopographicOutput {
            logits,
            step_logits,
            activations: trace,
        })
    }

    /// Map `[batch, features]` onto a neuron-major `[N, batch]` sheet state.
    fn embed(&self, features: Tensor<B, 2>) -> Result<Tensor<B, 2>> {
        let [batch, k] = features.dims();
        if k != self.num_inputs {
            return Err(TopographyError::ShapeMismatch {
                expected: self.num_inputs,
                actual: k,
            });
        }
        Ok(match &self.input_indices {
            Some(indices) => Tensor::zeros([self.num_neurons, batch], &features.device())
                .select_assign(0, indices.val(), features.transpose()),
            None => features.transpose(),
        })
    }

    /// Classify a neuron-major state.
    fn readout(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = x.transpose();
        let x = match &self.output_indices {
            Some(indices) => x.select(1, indices.val()),
            None => x,
        };
        let x = self.nonlinearity.forward(self.readout_hidden.forward(x));
        self.readout_out.forward(x)
    }
}
