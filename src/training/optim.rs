//! Optimizer construction and learning-rate schedules.

use std::f64::consts::PI;
use std::path::Path;

use burn::grad_clipping::GradientClippingConfig;
use burn::lr_scheduler::LrScheduler;
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{AdamConfig, AdamWConfig, GradientsParams, Optimizer, SgdConfig};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::LearningRate;

use super::config::{ClipKind, OptimizerKind, OptimizerSettings, SchedulerKind, TrainingPlan};
use crate::error::Result;

/// An optimizer the trainer can hold without naming its concrete type.
pub trait TrainingOptimizer<B: AutodiffBackend, M: AutodiffModule<B>> {
    fn step(&mut self, lr: LearningRate, module: M, grads: GradientsParams) -> M;

    /// Write the optimizer state to `path` (the recorder adds its extension).
    fn save(&self, path: &Path) -> Result<()>;
}

impl<B, M, O> TrainingOptimizer<B, M> for O
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
    O: Optimizer<M, B>,
{
    fn step(&mut self, lr: LearningRate, module: M, grads: GradientsParams) -> M {
        Optimizer::step(self, lr, module, grads)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        Recorder::<B>::record(&recorder, self.to_record(), path.to_path_buf())?;
        Ok(())
    }
}

/// Build the optimizer named in `plan`.
pub fn build_optimizer<B, M>(
    plan: &TrainingPlan,
    settings: &OptimizerSettings,
) -> Box<dyn TrainingOptimizer<B, M>>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + 'static,
{
    // burn clips each parameter tensor by its own norm, not the global norm
    let clipping = plan.grad_clip.map(|(kind, value)| match kind {
        ClipKind::Norm => GradientClippingConfig::Norm(value),
        ClipKind::Value => GradientClippingConfig::Value(value),
    });
    let decay = settings.weight_decay.map(WeightDecayConfig::new);

    match plan.optimizer {
        OptimizerKind::Sgd => Box::new(
            SgdConfig::new()
                .with_momentum(Some(
                    MomentumConfig::new()
                        .with_momentum(settings.momentum)
                        .with_dampening(0.0),
                ))
                .with_weight_decay(decay)
                .with_gradient_clipping(clipping)
                .init::<B, M>(),
        ),
        OptimizerKind::Adam => Box::new(
            AdamConfig::new()
                .with_beta_1(settings.beta1)
                .with_beta_2(settings.beta2)
                .with_weight_decay(decay)
                .with_grad_clipping(clipping)
                .init::<B, M>(),
        ),
        OptimizerKind::AdamW => {
            let mut config = AdamWConfig::new()
                .with_beta_1(settings.beta1)
                .with_beta_2(settings.beta2)
                .with_grad_clipping(clipping);
            if let Some(decay) = settings.weight_decay {
                config = config.with_weight_decay(decay);
            }
            Box::new(config.init::<B, M>())
        }
    }
}

/// One-cycle policy: cosine warm-up from `max_lr / div_factor` to `max_lr` over
/// `pct_start` of the run, then cosine annealing down to
/// `max_lr / (div_factor * final_div_factor)`.
#[derive(Clone, Copy, Debug)]
pub struct OneCycleSchedule {
    max_lr: LearningRate,
    total_steps: usize,
    pct_start: f64,
    div_factor: f64,
    final_div_factor: f64,
    current: usize,
}

impl OneCycleSchedule {
    pub fn new(max_lr: LearningRate, total_steps: usize) -> Self {
        Self {
            max_lr,
            total_steps,
            pct_start: 0.3,
            div_factor: 25.0,
            final_div_factor: 1e4,
            current: 0,
        }
    }

    pub fn initial_lr(&self) -> LearningRate {
        self.max_lr / self.div_factor
    }

    pub fn min_lr(&self) -> LearningRate {
        self.initial_lr() / self.final_div_factor
    }

    /// Learning rate at step `step`, clamped to the last step.
    pub fn lr_at(&self, step: usize) -> LearningRate {
        let last = self.total_steps.saturating_sub(1) as f64;
        let step = (step as f64).min(last);
        let warm_end = self.pct_start * self.total_steps as f64 - 1.0;

        let anneal = |start: f64, end: f64, pct: f64| end + (start - end) / 2.0 * ((PI * pct).cos() + 1.0);
        if step <= warm_end {
            let pct = if warm_end > 0.0 { step / warm_end } else { 1.0 };
            anneal(self.initial_lr(), self.max_lr, pct)
        } else {
            let span = last - warm_end;
            let pct = if span > 0.0 { (step - warm_end) / span } else { 1.0 };
            anneal(self.max_lr, self.min_lr(), pct)
        }
    }
}

impl LrScheduler for OneCycleSchedule {
    type Record<B: Backend> = usize;

    fn step(&mut self) -> LearningRate {
        let lr = self.lr_at(self.current);
        self.current += 1;
        lr
    }

    fn to_record<B: Backend>(&self) -> Self::Record<B> {
        self.current
    }

    fn load_record<B: Backend>(mut self, record: Self::Record<B>) -> Self {
        self.current = record;
        self
    }
}

/// The learning rate source used by the trainer.
#[derive(Clone, Copy, Debug)]
pub enum Schedule {
    Constant(LearningRate),
    OneCycle(OneCycleSchedule),
}

impl Schedule {
    pub fn new(kind: Option<SchedulerKind>, lr: LearningRate, total_steps: usize) -> Self {
        match kind {
            None => Self::Constant(lr),
            Some(SchedulerKind::OneCycle) => Self::OneCycle(OneCycleSchedule::new(lr, total_steps)),
        }
    }

    /// Learning rate for the next optimizer step.
    pub fn next_lr(&mut self) -> LearningRate {
        match self {
            Self::Constant(lr) => *lr,
            Self::OneCycle(schedule) => LrScheduler::step(schedule),
        }
    }
}
