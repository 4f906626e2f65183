//! Topographic RNN Training Demo
//!
//! Trains a small 8x8 sheet to tell apart two noisy input patterns, then writes
//! the sheet activity for one sample as an animated GIF.
//!
//! Run with `RUST_LOG=info cargo run --example train_topographic`.

use burn::backend::{Autodiff, NdArray};
use burn::module::AutodiffModule;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use bioplnn::cells::{SparseBackend, SparseLayout};
use bioplnn::prelude::*;
use bioplnn::training::{OptimizerSettings, TracingSink};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

type InferenceBackend = NdArray<f32>;
type TrainBackend = Autodiff<InferenceBackend>;

const SHEET: SheetSize = SheetSize { rows: 8, cols: 8 };
const NUM_INPUTS: usize = 8;
const BATCH_SIZE: usize = 16;

/// Class 0 drives the upper half of the input column, class 1 the lower half.
fn synthetic_batch<B: Backend>(rng: &mut StdRng, device: &B::Device) -> ClassificationBatch<B> {
    let mut features = Vec::with_capacity(BATCH_SIZE * NUM_INPUTS);
    let mut labels = Vec::with_capacity(BATCH_SIZE);
    for _ in 0..BATCH_SIZE {
        let label = rng.gen_range(0..2usize);
        for i in 0..NUM_INPUTS {
            let active = (i < NUM_INPUTS / 2) == (label == 0);
            let signal = if active { 1.0 } else { 0.0 };
            features.push(signal + rng.gen_range(-0.1..0.1f32));
        }
        labels.push(label as i64);
    }
    ClassificationBatch::new(
        Tensor::<B, 2>::from_data(TensorData::new(features, [BATCH_SIZE, NUM_INPUTS]), device),
        Tensor::<B, 1, Int>::from_data(TensorData::new(labels, [BATCH_SIZE]), device),
    )
}

fn main() -> bioplnn::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== Topographic RNN Training Example ===\n");

    let device = Default::default();
    let mut rng = StdRng::seed_from_u64(2024);

    // Inputs land on the left column, the readout watches the right column
    let input_indices: Vec<usize> = (0..SHEET.rows).map(|r| SHEET.linear_index(r, 0)).collect();
    let output_indices: Vec<usize> = (0..SHEET.rows)
        .map(|r| SHEET.linear_index(r, SHEET.cols - 1))
        .collect();

    let model = TopographicRnnConfig::new()
        .with_sheet_size(SHEET)
        .with_synapses_per_neuron(Some(6))
        .with_synapse_std(Some(1.5))
        .with_sparse_backend(SparseBackend::Native)
        .with_sparse_layout(SparseLayout::Csr)
        .with_num_classes(2)
        .with_readout_hidden(16)
        .init_with_indices::<TrainBackend>(Some(input_indices), Some(output_indices), &device)?;

    println!("Model:");
    println!("  Sheet: {}x{} ({} neurons)", SHEET.rows, SHEET.cols, model.num_neurons());
    println!("  Synapses: {}", model.cell().nnz());
    println!();

    let train: Vec<_> = (0..20)
        .map(|_| synthetic_batch::<TrainBackend>(&mut rng, &device))
        .collect();
    let valid: Vec<_> = (0..4)
        .map(|_| synthetic_batch::<InferenceBackend>(&mut rng, &device))
        .collect();

    let checkpoint_dir = std::env::temp_dir().join("bioplnn-demo");
    let config = TrainingConfig::new()
        .with_optimizer(OptimizerSettings::new().with_lr(5e-3))
        .with_scheduler(Some("one_cycle".into()))
        .with_epochs(5)
        .with_num_steps(8)
        .with_log_freq(5)
        .with_checkpoint_dir(checkpoint_dir.to_string_lossy().into_owned())
        .with_seed(Some(7));

    let trainer = Trainer::new(config)?;
    let model = trainer.fit(model, &train, &valid, &mut TracingSink)?.valid();

    // Record one sample's activity across every step
    let sample = synthetic_batch::<InferenceBackend>(&mut rng, &device);
    let out = model.forward_with(
        sample.inputs,
        &ForwardOptions::new(8).with_return_activations(true),
    )?;
    if let Some(trace) = out.activations {
        let path = checkpoint_dir.join("activity.gif");
        let frames = render_gif(&trace, model.sheet_size(), &path, &GifOptions::default().with_scale(16))?;
        println!("\nWrote {} frames to {}", frames, path.display());
    }

    Ok(())
}
