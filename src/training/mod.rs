//! Epoch-based training for [`TopographicRnn`].
//!
//! The trainer treats the model as an opaque differentiable module: it calls
//! [`TopographicRnn::forward_with`], scores the output with the configured
//! criterion and steps a burn optimizer. Metrics leave through a [`MetricSink`].
//!
//! ```ignore
//! let trainer = Trainer::new(TrainingConfig::new().with_epochs(5))?;
//! let mut sink = TracingSink;
//! let model = trainer.fit(model, &train_batches, &valid_batches, &mut sink)?;
//! ```

pub mod checkpoint;
mod config;
mod loss;
mod metrics;
mod optim;

pub use checkpoint::{latest_checkpoint, load_model, save_checkpoint, CheckpointPointer};
pub use config::{
    ClipKind, CriterionKind, CriterionSettings, GradClipSettings, OptimizerKind, OptimizerSettings,
    SchedulerKind, TrainingConfig, TrainingPlan,
};
pub use loss::{evidential_loss, num_correct};
pub use metrics::{MetricEvent, MetricSink, TracingSink};
pub use optim::{build_optimizer, OneCycleSchedule, Schedule, TrainingOptimizer};

use burn::module::AutodiffModule;
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};
use tracing::{debug, error};

use crate::error::Result;
use crate::rnn::{ForwardOptions, SheetInput, TopographicRnn};

/// One batch of inputs with their class labels.
#[derive(Clone, Debug)]
pub struct ClassificationBatch<B: Backend> {
    pub inputs: SheetInput<B>,
    /// `[batch]` class indices
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassificationBatch<B> {
    pub fn new(inputs: impl Into<SheetInput<B>>, targets: Tensor<B, 1, Int>) -> Self {
        Self {
            inputs: inputs.into(),
            targets,
        }
    }

    pub fn len(&self) -> usize {
        self.targets.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Loss and accuracy accumulated over a run of batches.
#[derive(Clone, Copy, Debug, Default)]
struct Tally {
    loss: f64,
    batches: usize,
    correct: usize,
    samples: usize,
}

impl Tally {
    fn add(&mut self, loss: f64, correct: usize, samples: usize) {
        self.loss += loss;
        self.batches += 1;
        self.correct += correct;
        self.samples += samples;
    }

    fn mean_loss(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss / self.batches as f64
        }
    }

    fn accuracy(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.correct as f64 / self.samples as f64
        }
    }
}

/// Runs training epochs for a [`TopographicRnn`].
#[derive(Clone, Debug)]
pub struct Trainer {
    config: TrainingConfig,
    plan: TrainingPlan,
}

impl Trainer {
    /// Resolve every named option in `config`. Unknown names fail here, before any
    /// batch is seen.
    pub fn new(config: TrainingConfig) -> Result<Self> {
        let plan = config.plan()?;
        Ok(Self { config, plan })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn plan(&self) -> &TrainingPlan {
        &self.plan
    }

    /// Train for `config.epochs` epochs and return the trained model.
    ///
    /// Each epoch trains on every batch of `train`, evaluates on `valid` and saves
    /// a checkpoint. Any failure is reported to `sink` as [`MetricEvent::Error`]
    /// before being returned.
    pub fn fit<B: AutodiffBackend>(
        &self,
        model: TopographicRnn<B>,
        train: &[ClassificationBatch<B>],
        valid: &[ClassificationBatch<B::InnerBackend>],
        sink: &mut dyn MetricSink,
    ) -> Result<TopographicRnn<B>> {
        self.run(model, train, valid, sink).inspect_err(|err| {
            error!(%err, "training failed");
            sink.emit(MetricEvent::Error {
                message: err.to_string(),
            });
        })
    }

    fn run<B: AutodiffBackend>(
        &self,
        mut model: TopographicRnn<B>,
        train: &[ClassificationBatch<B>],
        valid: &[ClassificationBatch<B::InnerBackend>],
        sink: &mut dyn MetricSink,
    ) -> Result<TopographicRnn<B>> {
        if let Some(seed) = self.config.seed {
            B::seed(seed);
        }

        let mut optimizer = build_optimizer::<B, TopographicRnn<B>>(&self.plan, &self.config.optimizer);
        let mut schedule = Schedule::new(
            self.plan.scheduler,
            self.config.optimizer.lr,
            train.len() * self.config.epochs,
        );
        let options = ForwardOptions::new(self.config.num_steps)
            .with_loss_all_timesteps(self.plan.all_timesteps);
        let log_freq = self.config.log_freq.max(1);
        let mut global_step = 0;

        for epoch in 0..self.config.epochs {
            sink.emit(MetricEvent::EpochStarted { epoch, global_step });

            let mut epoch_tally = Tally::default();
            let mut running = Tally::default();
            for (i, batch) in train.iter().enumerate() {
                let output = model.forward_with(batch.inputs.clone(), &options)?;
                let loss = self.plan.criterion.output_loss(
                    &output,
                    batch.targets.clone(),
                    self.plan.all_timesteps,
                );
                let loss_value = loss.clone().detach().into_scalar().elem::<f64>();
                let correct = num_correct(output.logits.detach(), batch.targets.clone());

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(schedule.next_lr(), model, grads);

                epoch_tally.add(loss_value, correct, batch.len());
                running.add(loss_value, correct, batch.len());
                if (i + 1) % log_freq == 0 {
                    sink.emit(MetricEvent::Running {
                        epoch,
                        global_step,
                        loss: running.mean_loss(),
                        accuracy: running.accuracy(),
                    });
                    running = Tally::default();
                }
                global_step += batch.len();
            }

            let valid_tally = self.validate(&model.valid(), valid, &options)?;
            sink.emit(MetricEvent::EpochFinished {
                epoch,
                global_step,
                train_loss: epoch_tally.mean_loss(),
                train_accuracy: epoch_tally.accuracy(),
                valid_loss: valid_tally.mean_loss(),
                valid_accuracy: valid_tally.accuracy(),
            });

            let pointer =
                save_checkpoint(&self.config.checkpoint_dir, epoch, &model, optimizer.as_ref())?;
            debug!(epoch, path = %pointer.model.display(), "saved checkpoint");
            sink.emit(MetricEvent::CheckpointSaved {
                epoch,
                path: pointer.model,
            });
        }

        Ok(model)
    }

    /// Score `batches` without tracking gradients. An empty set reports zero loss
    /// and zero accuracy.
    fn validate<B: Backend>(
        &self,
        model: &TopographicRnn<B>,
        batches: &[ClassificationBatch<B>],
        options: &ForwardOptions,
    ) -> Result<Tally> {
        let mut tally = Tally::default();
        for batch in batches {
            let output = model.forward_with(batch.inputs.clone(), options)?;
            let loss = self
                .plan
                .criterion
                .output_loss(&output, batch.targets.clone(), self.plan.all_timesteps)
                .into_scalar()
                .elem::<f64>();
            let correct = num_correct(output.logits, batch.targets.clone());
            tally.add(loss, correct, batch.len());
        }
        Ok(tally)
    }
}
