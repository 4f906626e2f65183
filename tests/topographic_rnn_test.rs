//! Topographic RNN Integration Tests
//!
//! End-to-end forward passes on a 3x3 sheet, index files and activity export.

use burn::backend::NdArray;
use burn::config::Config;
use burn::tensor::Tensor;
use bioplnn::activation::Nonlinearity;
use bioplnn::cells::{SparseBackend, SparseLayout};
use bioplnn::connectivity::{save_index_npy, save_index_record, IndexTensorRecord};
use bioplnn::prelude::*;
use bioplnn::visualize::render_png;

type Backend = NdArray<f32>;

fn small_config() -> TopographicRnnConfig {
    TopographicRnnConfig::new()
        .with_sheet_size(SheetSize::new(3, 3))
        .with_synapses_per_neuron(Some(2))
        .with_synapse_std(Some(1.0))
        .with_sparse_backend(SparseBackend::Native)
        .with_sparse_layout(SparseLayout::Coo)
        .with_bias(false)
        .with_num_classes(5)
}

fn create_model() -> TopographicRnn<Backend> {
    let device = Default::default();
    small_config().init::<Backend>(&device).unwrap()
}

#[test]
fn test_rnn_forward_with_trace() {
    let device = Default::default();
    let model = create_model();
    let x = Tensor::<Backend, 2>::random(
        [2, 9],
        burn::tensor::Distribution::Uniform(0.0, 1.0),
        &device,
    );

    let out = model
        .forward_with(x, &ForwardOptions::new(3).with_return_activations(true))
        .unwrap();
    assert_eq!(out.logits.dims(), [2, 5]);
    assert!(out.step_logits.is_none());

    let trace = out.activations.unwrap();
    assert_eq!(trace.len(), 4);
    for frame in trace.frames() {
        assert_eq!(frame.dim(), (2, 9));
    }
    // relu keeps every post-step state non-negative
    for frame in &trace.frames()[1..] {
        assert!(frame.iter().all(|&v| v >= 0.0));
    }
}

#[test]
fn test_three_by_three_scenario() {
    let device = Default::default();
    let model = small_config()
        .with_self_recurrence(true)
        .with_num_classes(9)
        .init::<Backend>(&device)
        .unwrap();
    assert!(!model.cell().has_bias());

    let x = Tensor::<Backend, 2>::random(
        [2, 9],
        burn::tensor::Distribution::Normal(0.0, 1.0),
        &device,
    );
    let out = model
        .forward_with(x, &ForwardOptions::new(3).with_return_activations(true))
        .unwrap();
    assert_eq!(out.logits.dims(), [2, 9]);
    assert_eq!(out.activations.unwrap().len(), 4);
}

#[test]
fn test_rnn_all_timestep_logits() {
    let device = Default::default();
    let model = create_model();
    let x = Tensor::<Backend, 2>::ones([2, 9], &device);

    let out = model
        .forward_with(x, &ForwardOptions::new(4).with_loss_all_timesteps(true))
        .unwrap();
    let steps = out.step_logits.unwrap();
    assert_eq!(steps.dims(), [4, 2, 5]);

    let last = steps.slice([3..4, 0..2, 0..5]).reshape([2, 5]);
    let diff: f32 = (last - out.logits).abs().max().into_scalar();
    assert!(diff < 1e-6);
}

#[test]
fn test_rnn_input_variants() {
    let device = Default::default();
    let model = create_model();

    let channels = Tensor::<Backend, 3>::ones([2, 3, 9], &device);
    assert_eq!(model.forward(channels, 2).unwrap().dims(), [2, 5]);

    let images = Tensor::<Backend, 4>::ones([2, 3, 3, 3], &device);
    assert_eq!(model.forward(images, 2).unwrap().dims(), [2, 5]);

    let per_channel = vec![
        Tensor::<Backend, 2>::ones([2, 9], &device),
        Tensor::<Backend, 2>::zeros([2, 9], &device),
    ];
    assert_eq!(model.forward(per_channel, 2).unwrap().dims(), [2, 5]);

    let empty: Vec<Tensor<Backend, 2>> = Vec::new();
    assert!(model.forward(empty, 2).is_err());
}

#[test]
fn test_channel_average_matches_flat() {
    let device = Default::default();
    let model = create_model();

    let flat = Tensor::<Backend, 2>::full([1, 9], 0.5, &device);
    let channels = Tensor::cat(
        vec![
            Tensor::<Backend, 3>::zeros([1, 1, 9], &device),
            Tensor::<Backend, 3>::ones([1, 1, 9], &device),
        ],
        1,
    );

    let a = model.forward(flat, 3).unwrap();
    let b = model.forward(channels, 3).unwrap();
    let diff: f32 = (a - b).abs().max().into_scalar();
    assert!(diff < 1e-6);
}

#[test]
fn test_rnn_neuron_major_input() {
    let device = Default::default();
    let model = small_config()
        .with_batch_first(false)
        .init::<Backend>(&device)
        .unwrap();
    let x = Tensor::<Backend, 2>::ones([9, 4], &device);
    assert_eq!(model.forward(x, 2).unwrap().dims(), [4, 5]);
}

#[test]
fn test_rnn_index_files() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = dir.path().join("inputs.npy");
    let outputs = dir.path().join("outputs.bin");
    save_index_npy(&[0, 2, 6, 8], &inputs).unwrap();
    save_index_record(&IndexTensorRecord::from_indices(&[4]), &outputs).unwrap();

    let device = Default::default();
    let model = small_config()
        .with_input_indices_path(Some(inputs.to_string_lossy().into_owned()))
        .with_output_indices_path(Some(outputs.to_string_lossy().into_owned()))
        .init::<Backend>(&device)
        .unwrap();
    assert_eq!(model.num_inputs(), 4);

    let x = Tensor::<Backend, 2>::ones([3, 4], &device);
    assert_eq!(model.forward(x, 2).unwrap().dims(), [3, 5]);

    let wrong = Tensor::<Backend, 2>::ones([3, 9], &device);
    assert!(matches!(
        model.forward(wrong, 2),
        Err(TopographyError::ShapeMismatch {
            expected: 4,
            actual: 9
        })
    ));
}

#[test]
fn test_rnn_rejects_out_of_range_indices() {
    let device = Default::default();
    let result = small_config().init_with_indices::<Backend>(Some(vec![0, 9]), None, &device);
    assert!(matches!(
        result,
        Err(TopographyError::IndexOutOfRange { index: 9, size: 9, .. })
    ));
}

#[test]
fn test_rnn_rejects_duplicate_input_indices() {
    let device = Default::default();
    let result = small_config().init_with_indices::<Backend>(Some(vec![1, 4, 1]), None, &device);
    assert!(matches!(
        result,
        Err(TopographyError::DuplicateIndex { name: "input", index: 1 })
    ));

    // repeated readout neurons are allowed
    let model = small_config()
        .init_with_indices::<Backend>(None, Some(vec![4, 4]), &device)
        .unwrap();
    let x = Tensor::<Backend, 2>::ones([2, 9], &device);
    assert_eq!(model.forward(x, 2).unwrap().dims(), [2, 5]);
}

#[test]
fn test_rnn_invalid_pairing() {
    let device = Default::default();
    let result = small_config()
        .with_sparse_layout(SparseLayout::TorchSparse)
        .init::<Backend>(&device);
    assert!(matches!(
        result,
        Err(TopographyError::InvalidBackendLayout { .. })
    ));
}

#[test]
fn test_rnn_gelu_and_seed() {
    let device = Default::default();
    let config = small_config().with_nonlinearity(Nonlinearity::Gelu).with_seed(9);
    let a = config.init::<Backend>(&device).unwrap();
    let b = config.init::<Backend>(&device).unwrap();
    assert_eq!(a.nonlinearity(), Nonlinearity::Gelu);
    assert_eq!(
        a.cell().indices().unwrap(),
        b.cell().indices().unwrap()
    );
    assert_eq!(a.cell().values().unwrap(), b.cell().values().unwrap());
}

#[test]
fn test_activity_export() {
    let dir = tempfile::tempdir().unwrap();
    let device = Default::default();
    let model = create_model();
    let x = Tensor::<Backend, 2>::ones([2, 9], &device);

    let trace = model
        .forward_with(x, &ForwardOptions::new(5).with_return_activations(true))
        .unwrap()
        .activations
        .unwrap();

    let gif = dir.path().join("activity.gif");
    let written = render_gif(
        &trace,
        model.sheet_size(),
        &gif,
        &GifOptions::default().with_scale(4).with_frames(1, 4).with_batch_index(1),
    )
    .unwrap();
    assert_eq!(written, 3);
    assert!(std::fs::metadata(&gif).unwrap().len() > 0);

    let png = dir.path().join("step.png");
    render_png(&trace, model.sheet_size(), 5, &png, &GifOptions::default()).unwrap();
    assert!(png.exists());

    let mismatched = render_gif(&trace, SheetSize::new(2, 2), &gif, &GifOptions::default());
    assert!(matches!(
        mismatched,
        Err(TopographyError::SheetMismatch { num_neurons: 9, .. })
    ));
}

#[test]
fn test_config_json_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let config = small_config().with_readout_hidden(16);

    config.save(&path).unwrap();
    let loaded = TopographicRnnConfig::load(&path).unwrap();
    assert_eq!(loaded.sheet_size, SheetSize::new(3, 3));
    assert_eq!(loaded.sparse_backend, SparseBackend::Native);
    assert_eq!(loaded.readout_hidden, 16);
    assert!(!loaded.bias);
}
