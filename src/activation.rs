//! Pointwise nonlinearities applied to the sheet state and the readout.

use std::fmt;
use std::str::FromStr;

use burn::tensor::activation::{gelu, relu};
use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TopographyError};

/// Nonlinearity selected by name in a model configuration.
///
/// # Example
///
/// ```rust
/// use burn::backend::NdArray;
/// use burn::tensor::Tensor;
/// use bioplnn::activation::Nonlinearity;
///
/// type Backend = NdArray<f32>;
/// let device = Default::default();
///
/// let act: Nonlinearity = "gelu".parse().unwrap();
/// let x = Tensor::<Backend, 1>::from_floats([0.0, 1.0, -1.0], &device);
/// let y = act.forward(x);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nonlinearity {
    #[default]
    Relu,
    Gelu,
}

impl Nonlinearity {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::Gelu => "gelu",
        }
    }

    /// Applies the nonlinearity element-wise.
    pub fn forward<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu => relu(x),
            Self::Gelu => gelu(x),
        }
    }
}

impl fmt::Display for Nonlinearity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Nonlinearity {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relu" => Ok(Self::Relu),
            "gelu" => Ok(Self::Gelu),
            other => Err(TopographyError::unknown("nonlinearity", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type Backend = NdArray<f32>;

    #[test]
    fn test_relu_clamps_negatives() {
        let device = Default::default();
        let x = Tensor::<Backend, 1>::from_floats([-2.0, -0.5, 0.0, 1.5], &device);
        let y = Nonlinearity::Relu.forward(x);
        assert_eq!(y.into_data().to_vec::<f32>().unwrap(), vec![0.0, 0.0, 0.0, 1.5]);
    }

    #[test]
    fn test_gelu_values() {
        let device = Default::default();
        let test_values = [-3.0f32, -1.0, 0.0, 1.0, 3.0];

        for &val in &test_values {
            let x = Tensor::<Backend, 1>::full([1], val, &device);
            let result = Nonlinearity::Gelu.forward(x).into_scalar();
            // tanh approximation is within 1e-3 of the exact erf form
            let approx = 0.5
                * val
                * (1.0 + ((2.0f32 / std::f32::consts::PI).sqrt() * (val + 0.044715 * val.powi(3))).tanh());
            assert!(
                (result - approx).abs() < 1e-2,
                "gelu incorrect at x={}: {}",
                val,
                result
            );
        }
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("relu".parse::<Nonlinearity>().unwrap(), Nonlinearity::Relu);
        assert_eq!("gelu".parse::<Nonlinearity>().unwrap(), Nonlinearity::Gelu);
        assert!(matches!(
            "tanh".parse::<Nonlinearity>(),
            Err(TopographyError::UnknownName { kind: "nonlinearity", .. })
        ));
    }

    #[test]
    fn test_preserves_shape() {
        let device = Default::default();
        let x = Tensor::<Backend, 3>::random(
            [2, 3, 4],
            burn::tensor::Distribution::Uniform(-1.0, 1.0),
            &device,
        );
        assert_eq!(Nonlinearity::Gelu.forward(x).dims(), [2, 3, 4]);
    }
}
