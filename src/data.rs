//! Moving small tensors between the host and a backend device.

use burn::tensor::{backend::Backend, Int, Tensor, TensorData};

use crate::error::{Result, TopographyError};

pub(crate) fn float_vec<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> Result<Vec<f32>> {
    tensor
        .into_data()
        .convert::<f32>()
        .into_vec::<f32>()
        .map_err(|e| TopographyError::TensorData(format!("{e:?}")))
}

pub(crate) fn int_vec<B: Backend, const D: usize>(tensor: Tensor<B, D, Int>) -> Result<Vec<i64>> {
    tensor
        .into_data()
        .convert::<i64>()
        .into_vec::<i64>()
        .map_err(|e| TopographyError::TensorData(format!("{e:?}")))
}

pub(crate) fn index_vec<B: Backend>(tensor: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    Ok(int_vec(tensor)?.into_iter().map(|i| i as usize).collect())
}

pub(crate) fn index_tensor<B: Backend>(indices: &[usize], device: &B::Device) -> Tensor<B, 1, Int> {
    let data: Vec<i64> = indices.iter().map(|&i| i as i64).collect();
    Tensor::from_data(TensorData::new(data, [indices.len()]), device)
}

pub(crate) fn float_tensor<B: Backend>(values: &[f32], device: &B::Device) -> Tensor<B, 1> {
    Tensor::from_data(TensorData::new(values.to_vec(), [values.len()]), device)
}
