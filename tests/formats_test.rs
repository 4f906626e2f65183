//! File Format Integration Tests
//!
//! Connectivity and index files written by the crate, or by NumPy, are read back
//! through the format probes.

use std::fs::File;
use std::io::BufWriter;

use bioplnn::connectivity::{
    load_connectivity, load_indices, save_connectivity_npy, save_index_npy, save_index_record,
    save_sparse_record, Connectivity, GaussianConnectivity, IndexTensorRecord, SparseTensorRecord,
};
use bioplnn::sheet::SheetSize;
use bioplnn::TopographyError;
use npyz::WriterBuilder;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sample_matrix() -> bioplnn::sparse::CooMatrix {
    GaussianConnectivity::new(SheetSize::new(3, 3), 2, 1.0)
        .build(&mut StdRng::seed_from_u64(5))
        .unwrap()
}

fn write_npy<T: npyz::Serialize + npyz::AutoSerialize + Copy>(
    path: &std::path::Path,
    shape: &[u64],
    data: &[T],
) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut writer = npyz::WriteOptions::<T>::new()
        .default_dtype()
        .shape(shape)
        .writer(file)
        .begin_nd()
        .unwrap();
    writer.extend(data.iter().copied()).unwrap();
    writer.finish().unwrap();
}

#[test]
fn test_sparse_record_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.bin");
    let matrix = sample_matrix();
    let record = SparseTensorRecord::from(&matrix);

    save_sparse_record(&record, &path).unwrap();
    let loaded = load_connectivity(&path).unwrap();
    assert_eq!(loaded, record);
    assert!(loaded.coalesced);

    let coo = loaded.to_coo().unwrap();
    assert_eq!(coo.rows(), matrix.rows());
    assert_eq!(coo.cols(), matrix.cols());
}

#[test]
fn test_npy_connectivity_infers_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.npy");
    let matrix = sample_matrix();

    save_connectivity_npy(&matrix, &path).unwrap();
    let loaded = load_connectivity(&path).unwrap();
    // every neuron has a self-loop, so neuron 8 bounds the matrix
    assert_eq!(loaded.shape, [9, 9]);
    assert_eq!(loaded.nnz(), matrix.nnz());
    assert!(loaded.values.is_none());
}

#[test]
fn test_npy_connectivity_wrong_shape() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.npy");
    write_npy::<i64>(&path, &[3, 2], &[0, 1, 2, 0, 1, 2]);

    assert!(matches!(
        load_connectivity(&path),
        Err(TopographyError::InvalidConnectivity(_))
    ));
}

#[test]
fn test_index_files() {
    let dir = tempfile::tempdir().unwrap();
    let record_path = dir.path().join("inputs.bin");
    let npy_path = dir.path().join("inputs.npy");

    save_index_record(&IndexTensorRecord::from_indices(&[4, 0, 7]), &record_path).unwrap();
    save_index_npy(&[4, 0, 7], &npy_path).unwrap();

    for path in [&record_path, &npy_path] {
        let indices = load_indices(path)
            .unwrap()
            .into_neuron_indices("input", 9)
            .unwrap();
        assert_eq!(indices, vec![4, 0, 7]);
    }
}

#[test]
fn test_int32_npy_indices() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outputs.npy");
    write_npy::<i32>(&path, &[3], &[1, 5, 2]);

    let record = load_indices(&path).unwrap();
    assert_eq!(record.shape, vec![3]);
    assert_eq!(record.data, vec![1, 5, 2]);
}

#[test]
fn test_two_dimensional_npy_indices_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("grid.npy");
    write_npy::<i64>(&path, &[2, 2], &[0, 1, 2, 3]);

    let result = load_indices(&path).unwrap().into_neuron_indices("output", 9);
    assert!(matches!(
        result,
        Err(TopographyError::IndicesNotOneDimensional { name: "output", .. })
    ));
}

#[test]
fn test_out_of_range_indices_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("inputs.npy");
    save_index_npy(&[0, 9], &path).unwrap();

    let result = load_indices(&path).unwrap().into_neuron_indices("input", 9);
    assert!(matches!(
        result,
        Err(TopographyError::IndexOutOfRange { index: 9, size: 9, .. })
    ));
}

#[test]
fn test_float_npy_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("floats.npy");
    write_npy::<f32>(&path, &[2], &[0.5, 1.5]);

    assert!(matches!(load_indices(&path), Err(TopographyError::TensorData(_))));
}

#[test]
fn test_unrecognized_format() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("conn.txt");
    std::fs::write(&path, "0 1\n1 2\n").unwrap();

    match load_connectivity(&path) {
        Err(TopographyError::UnrecognizedFormat { tried, .. }) => {
            assert_eq!(tried, vec!["tensor_record", "npy"]);
        }
        other => panic!("expected an unrecognized format, got {other:?}"),
    }
}
