//! On-disk formats for connectivity matrices and neuron index vectors.
//!
//! Two encodings are understood:
//!
//! | Format | Magic | Payload |
//! |--------|-------|---------|
//! | Tensor record | `BPLNCOO1` / `BPLNIDX1` | bincode-encoded [`SparseTensorRecord`] / [`IndexTensorRecord`] |
//! | NumPy array | `\x93NUMPY` | `(2, nnz)` integer array / 1-D integer array |
//!
//! Loading walks [`FileFormat::PROBE_ORDER`]. Each probe looks at the magic bytes and
//! either claims the file or steps aside; once a probe claims a file, a decode failure
//! is reported as-is instead of falling through to the next format.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use npyz::WriterBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, TopographyError};
use crate::sparse::CooMatrix;

const SPARSE_MAGIC: &[u8; 8] = b"BPLNCOO1";
const INDEX_MAGIC: &[u8; 8] = b"BPLNIDX1";
const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Serialized sparse `N x N` matrix in coordinate format.
///
/// `indices[0]` holds destination rows and `indices[1]` source columns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseTensorRecord {
    pub shape: [usize; 2],
    pub indices: [Vec<i64>; 2],
    pub values: Option<Vec<f32>>,
    pub coalesced: bool,
}

impl SparseTensorRecord {
    /// Number of stored entries.
    pub fn nnz(&self) -> usize {
        self.indices[0].len()
    }

    /// Check the shape and index invariants and convert to a host matrix.
    ///
    /// Stored values are only checked for length; weights are always redrawn.
    pub fn to_coo(&self) -> Result<CooMatrix> {
        let [rows, cols] = self.shape;
        if rows != cols {
            return Err(TopographyError::NonSquareConnectivity { rows, cols });
        }
        if self.indices[0].len() != self.indices[1].len() {
            return Err(TopographyError::InvalidConnectivity(format!(
                "{} row indices but {} column indices",
                self.indices[0].len(),
                self.indices[1].len()
            )));
        }
        if let Some(values) = &self.values {
            if values.len() != self.nnz() {
                return Err(TopographyError::InvalidConnectivity(format!(
                    "{} values for {} indices",
                    values.len(),
                    self.nnz()
                )));
            }
        }
        if self.nnz() == 0 {
            return Err(TopographyError::EmptyConnectivity);
        }

        let rows_idx = to_neuron_indices("connectivity", &self.indices[0], rows)?;
        let cols_idx = to_neuron_indices("connectivity", &self.indices[1], rows)?;
        let values = vec![0.0; rows_idx.len()];
        CooMatrix::from_triplets(rows, rows_idx, cols_idx, values)
    }
}

impl From<&CooMatrix> for SparseTensorRecord {
    fn from(matrix: &CooMatrix) -> Self {
        Self {
            shape: [matrix.size(), matrix.size()],
            indices: [
                matrix.rows().iter().map(|&r| r as i64).collect(),
                matrix.cols().iter().map(|&c| c as i64).collect(),
            ],
            values: Some(matrix.values().to_vec()),
            coalesced: matrix.is_coalesced(),
        }
    }
}

/// Serialized integer index tensor. Only 1-D tensors are valid neuron index sets.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexTensorRecord {
    pub shape: Vec<usize>,
    pub data: Vec<i64>,
}

impl IndexTensorRecord {
    pub fn from_indices(indices: &[usize]) -> Self {
        Self {
            shape: vec![indices.len()],
            data: indices.iter().map(|&i| i as i64).collect(),
        }
    }

    /// Validate as a 1-D set of neuron indices in `[0, num_neurons)`.
    pub fn into_neuron_indices(self, name: &'static str, num_neurons: usize) -> Result<Vec<usize>> {
        if self.shape.len() != 1 {
            return Err(TopographyError::IndicesNotOneDimensional {
                name,
                shape: self.shape,
            });
        }
        to_neuron_indices(name, &self.data, num_neurons)
    }
}

pub(crate) fn to_neuron_indices(name: &'static str, raw: &[i64], size: usize) -> Result<Vec<usize>> {
    raw.iter()
        .map(|&i| {
            if i < 0 || i as u64 >= size as u64 {
                Err(TopographyError::IndexOutOfRange {
                    name,
                    index: i,
                    size,
                })
            } else {
                Ok(i as usize)
            }
        })
        .collect()
}

/// Outcome of offering a file to one format.
#[derive(Debug)]
pub enum Probe<T> {
    Matched(T),
    NotApplicable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileFormat {
    TensorRecord,
    Npy,
}

impl FileFormat {
    /// Formats are tried in this order.
    pub const PROBE_ORDER: [FileFormat; 2] = [FileFormat::TensorRecord, FileFormat::Npy];

    pub fn name(&self) -> &'static str {
        match self {
            FileFormat::TensorRecord => "tensor_record",
            FileFormat::Npy => "npy",
        }
    }

    pub fn probe_connectivity(&self, bytes: &[u8]) -> Result<Probe<SparseTensorRecord>> {
        match self {
            FileFormat::TensorRecord => match bytes.strip_prefix(SPARSE_MAGIC.as_slice()) {
                Some(payload) => Ok(Probe::Matched(bincode::deserialize(payload)?)),
                None => Ok(Probe::NotApplicable),
            },
            FileFormat::Npy => {
                if !bytes.starts_with(NPY_MAGIC) {
                    return Ok(Probe::NotApplicable);
                }
                let (shape, data) = read_npy_ints(bytes)?;
                if shape.len() != 2 || shape[0] != 2 {
                    return Err(TopographyError::InvalidConnectivity(format!(
                        "index array must have shape (2, nnz), got {shape:?}"
                    )));
                }
                let nnz = shape[1];
                let rows = data[..nnz].to_vec();
                let cols = data[nnz..].to_vec();
                // plain arrays carry no matrix shape; the largest index bounds it
                let size = rows
                    .iter()
                    .chain(cols.iter())
                    .copied()
                    .max()
                    .map_or(0, |m| (m.max(-1) + 1) as usize);
                Ok(Probe::Matched(SparseTensorRecord {
                    shape: [size, size],
                    indices: [rows, cols],
                    values: None,
                    coalesced: false,
                }))
            }
        }
    }

    pub fn probe_indices(&self, bytes: &[u8]) -> Result<Probe<IndexTensorRecord>> {
        match self {
            FileFormat::TensorRecord => match bytes.strip_prefix(INDEX_MAGIC.as_slice()) {
                Some(payload) => Ok(Probe::Matched(bincode::deserialize(payload)?)),
                None => Ok(Probe::NotApplicable),
            },
            FileFormat::Npy => {
                if !bytes.starts_with(NPY_MAGIC) {
                    return Ok(Probe::NotApplicable);
                }
                let (shape, data) = read_npy_ints(bytes)?;
                Ok(Probe::Matched(IndexTensorRecord { shape, data }))
            }
        }
    }
}

/// Read a row-major integer array of dtype `i64` or `i32`.
fn read_npy_ints(bytes: &[u8]) -> Result<(Vec<usize>, Vec<i64>)> {
    let file = npyz::NpyFile::new(bytes)?;
    let shape: Vec<usize> = file.shape().iter().map(|&d| d as usize).collect();
    let fortran = matches!(file.order(), npyz::Order::Fortran);

    let data: Vec<i64> = match file.try_data::<i64>() {
        Ok(reader) => reader.collect::<std::io::Result<_>>()?,
        Err(file) => match file.try_data::<i32>() {
            Ok(reader) => reader
                .map(|v| v.map(i64::from))
                .collect::<std::io::Result<_>>()?,
            Err(file) => {
                return Err(TopographyError::TensorData(format!(
                    "expected an integer array, found dtype {:?}",
                    file.dtype()
                )))
            }
        },
    };

    if fortran && shape.len() == 2 {
        let (r, c) = (shape[0], shape[1]);
        let mut row_major = vec![0; data.len()];
        for i in 0..r {
            for j in 0..c {
                row_major[i * c + j] = data[j * r + i];
            }
        }
        return Ok((shape, row_major));
    }
    Ok((shape, data))
}

fn run_probes<T>(
    path: &Path,
    probe: impl Fn(FileFormat, &[u8]) -> Result<Probe<T>>,
) -> Result<T> {
    let bytes = fs::read(path)?;
    for format in FileFormat::PROBE_ORDER {
        if let Probe::Matched(record) = probe(format, &bytes)? {
            debug!(path = %path.display(), format = format.name(), "format matched");
            return Ok(record);
        }
    }
    Err(TopographyError::UnrecognizedFormat {
        path: path.to_path_buf(),
        tried: FileFormat::PROBE_ORDER.iter().map(|f| f.name()).collect(),
    })
}

/// Load a sparse connectivity matrix from any supported format.
pub fn load_connectivity(path: impl AsRef<Path>) -> Result<SparseTensorRecord> {
    run_probes(path.as_ref(), |format, bytes| format.probe_connectivity(bytes))
}

/// Load a neuron index tensor from any supported format.
pub fn load_indices(path: impl AsRef<Path>) -> Result<IndexTensorRecord> {
    run_probes(path.as_ref(), |format, bytes| format.probe_indices(bytes))
}

pub fn save_sparse_record(record: &SparseTensorRecord, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    writer.write_all(SPARSE_MAGIC)?;
    bincode::serialize_into(&mut writer, record)?;
    writer.flush()?;
    Ok(())
}

pub fn save_index_record(record: &IndexTensorRecord, path: impl AsRef<Path>) -> Result<()> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    writer.write_all(INDEX_MAGIC)?;
    bincode::serialize_into(&mut writer, record)?;
    writer.flush()?;
    Ok(())
}

/// Write neuron indices as a 1-D `int64` `.npy` array.
pub fn save_index_npy(indices: &[usize], path: impl AsRef<Path>) -> Result<()> {
    write_npy_i64(
        path.as_ref(),
        &[indices.len() as u64],
        indices.iter().map(|&i| i as i64),
    )
}

/// Write the `(2, nnz)` index array of a connectivity matrix as `.npy`.
pub fn save_connectivity_npy(matrix: &CooMatrix, path: impl AsRef<Path>) -> Result<()> {
    let rows = matrix.rows().iter().map(|&r| r as i64);
    let cols = matrix.cols().iter().map(|&c| c as i64);
    write_npy_i64(path.as_ref(), &[2, matrix.nnz() as u64], rows.chain(cols))
}

fn write_npy_i64(path: &Path, shape: &[u64], data: impl IntoIterator<Item = i64>) -> Result<()> {
    let file = BufWriter::new(fs::File::create(path)?);
    let mut writer = npyz::WriteOptions::<i64>::new()
        .default_dtype()
        .shape(shape)
        .writer(file)
        .begin_nd()?;
    writer.extend(data)?;
    writer.finish()?;
    Ok(())
}
