//! Classification criteria applied to model output.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Int, Tensor};

use super::config::CriterionKind;
use crate::rnn::TopographicOutput;

/// Evidential deep learning loss (squared-error form).
///
/// Logits are read as non-negative evidence for a Dirichlet over the classes; the
/// loss is the expected squared error against the one-hot target plus the Dirichlet
/// variance, summed over classes and averaged over the batch.
pub fn evidential_loss<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
    num_classes: usize,
) -> Tensor<B, 1> {
    let one_hot = targets.one_hot::<2>(num_classes).float();
    let alpha = relu(logits) + 1.0;
    let strength = alpha.clone().sum_dim(1);
    let p = alpha / strength.clone();

    let err = (one_hot - p.clone()).powf_scalar(2.0);
    let var = p.clone() * (p.neg() + 1.0) / (strength + 1.0);
    (err + var).sum_dim(1).mean()
}

impl CriterionKind {
    /// Score `[n, classes]` logits against `[n]` targets.
    pub fn loss<B: Backend>(&self, logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        match self {
            Self::CrossEntropy => CrossEntropyLossConfig::new()
                .init(&logits.device())
                .forward(logits, targets),
            Self::Evidential => {
                let num_classes = logits.dims()[1];
                evidential_loss(logits, targets, num_classes)
            }
        }
    }

    /// Loss over a model output. With `all_timesteps`, every step's readout is scored
    /// against the same targets.
    pub fn output_loss<B: Backend>(
        &self,
        output: &TopographicOutput<B>,
        targets: Tensor<B, 1, Int>,
        all_timesteps: bool,
    ) -> Tensor<B, 1> {
        match (&output.step_logits, all_timesteps) {
            (Some(step_logits), true) => {
                let [steps, batch, classes] = step_logits.dims();
                let logits = step_logits.clone().reshape([steps * batch, classes]);
                let targets = targets
                    .unsqueeze_dim::<2>(0)
                    .repeat_dim(0, steps)
                    .reshape([steps * batch]);
                self.loss(logits, targets)
            }
            _ => self.loss(output.logits.clone(), targets),
        }
    }
}

/// Number of rows whose arg-max matches the target.
pub fn num_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = logits.argmax(1).squeeze::<1>(1);
    predicted
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_num_correct() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[0.1, 0.9, 0.0], [2.0, 0.0, 1.0], [0.0, 0.0, 3.0]],
            &device,
        );
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([1, 2, 2], &device);
        assert_eq!(num_correct(logits, targets), 2);
    }

    #[test]
    fn test_evidential_loss_rewards_evidence() {
        let device = Default::default();
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0], &device);

        let confident = Tensor::<TestBackend, 2>::from_floats([[20.0, 0.0]], &device);
        let wrong = Tensor::<TestBackend, 2>::from_floats([[0.0, 20.0]], &device);
        let unsure = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0]], &device);

        let confident = evidential_loss(confident, targets.clone(), 2).into_scalar();
        let wrong = evidential_loss(wrong, targets.clone(), 2).into_scalar();
        let unsure = evidential_loss(unsure, targets, 2).into_scalar();

        // no evidence: p = 0.5 each, err = 0.5, var = 2 * 0.25 / 3
        assert!((unsure - (0.5 + 0.5 / 3.0)).abs() < 1e-5);
        assert!(confident < unsure);
        assert!(wrong > unsure);
    }

    #[test]
    fn test_cross_entropy_uniform_logits() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([4, 5], &device);
        let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1, 2, 3], &device);
        let loss = CriterionKind::CrossEntropy.loss(logits, targets).into_scalar();
        assert!((loss - 5.0f32.ln()).abs() < 1e-5);
    }
}
