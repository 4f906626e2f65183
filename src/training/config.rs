use std::str::FromStr;

use burn::config::Config;

use crate::error::{Result, TopographyError};

/// Optimizer settings. `name` is one of `sgd`, `adam` or `adamw`.
#[derive(Config, Debug)]
pub struct OptimizerSettings {
    #[config(default = "String::from(\"adam\")")]
    pub name: String,
    #[config(default = 1e-3)]
    pub lr: f64,
    /// SGD only
    #[config(default = 0.9)]
    pub momentum: f64,
    #[config(default = 0.9)]
    pub beta1: f32,
    #[config(default = 0.9)]
    pub beta2: f32,
    pub weight_decay: Option<f32>,
}

/// Loss settings. `name` is `ce` or `edl`.
#[derive(Config, Debug)]
pub struct CriterionSettings {
    #[config(default = "String::from(\"ce\")")]
    pub name: String,
    /// Score the readout of every step instead of only the last one
    #[config(default = false)]
    pub all_timesteps: bool,
}

/// Gradient clipping. `kind` is `norm` or `value`.
#[derive(Config, Debug)]
pub struct GradClipSettings {
    #[config(default = false)]
    pub enable: bool,
    #[config(default = "String::from(\"norm\")")]
    pub kind: String,
    #[config(default = 1.0)]
    pub value: f32,
}

#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "OptimizerSettings::new()")]
    pub optimizer: OptimizerSettings,
    /// `one_cycle` or nothing for a constant learning rate
    pub scheduler: Option<String>,
    #[config(default = "CriterionSettings::new()")]
    pub criterion: CriterionSettings,
    #[config(default = "GradClipSettings::new()")]
    pub grad_clip: GradClipSettings,
    #[config(default = 10)]
    pub epochs: usize,
    /// Recurrent steps per forward pass
    #[config(default = 10)]
    pub num_steps: usize,
    /// Batches between running-metric events
    #[config(default = 10)]
    pub log_freq: usize,
    #[config(default = "String::from(\"checkpoints\")")]
    pub checkpoint_dir: String,
    pub seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizerKind {
    Sgd,
    Adam,
    AdamW,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerKind {
    OneCycle,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CriterionKind {
    CrossEntropy,
    Evidential,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClipKind {
    Norm,
    Value,
}

impl FromStr for OptimizerKind {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sgd" => Ok(Self::Sgd),
            "adam" => Ok(Self::Adam),
            "adamw" => Ok(Self::AdamW),
            other => Err(TopographyError::unknown("optimizer", other)),
        }
    }
}

impl FromStr for SchedulerKind {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "one_cycle" => Ok(Self::OneCycle),
            other => Err(TopographyError::unknown("scheduler", other)),
        }
    }
}

impl FromStr for CriterionKind {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ce" => Ok(Self::CrossEntropy),
            "edl" => Ok(Self::Evidential),
            other => Err(TopographyError::unknown("criterion", other)),
        }
    }
}

impl FromStr for ClipKind {
    type Err = TopographyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "norm" => Ok(Self::Norm),
            "value" => Ok(Self::Value),
            other => Err(TopographyError::unknown("gradient clipping", other)),
        }
    }
}

/// A [`TrainingConfig`] with every name resolved.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingPlan {
    pub optimizer: OptimizerKind,
    pub scheduler: Option<SchedulerKind>,
    pub criterion: CriterionKind,
    pub all_timesteps: bool,
    pub grad_clip: Option<(ClipKind, f32)>,
}

impl TrainingConfig {
    /// Resolve every named option, failing on the first unknown name.
    pub fn plan(&self) -> Result<TrainingPlan> {
        let grad_clip = if self.grad_clip.enable {
            Some((self.grad_clip.kind.parse()?, self.grad_clip.value))
        } else {
            None
        };
        Ok(TrainingPlan {
            optimizer: self.optimizer.name.parse()?,
            scheduler: self.scheduler.as_deref().map(str::parse).transpose()?,
            criterion: self.criterion.name.parse()?,
            all_timesteps: self.criterion.all_timesteps,
            grad_clip,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan() {
        let plan = TrainingConfig::new().plan().unwrap();
        assert_eq!(plan.optimizer, OptimizerKind::Adam);
        assert_eq!(plan.scheduler, None);
        assert_eq!(plan.criterion, CriterionKind::CrossEntropy);
        assert_eq!(plan.grad_clip, None);
    }

    #[test]
    fn test_unknown_names_rejected() {
        let bad_optimizer = TrainingConfig::new()
            .with_optimizer(OptimizerSettings::new().with_name("rmsprop".into()));
        assert!(matches!(
            bad_optimizer.plan(),
            Err(TopographyError::UnknownName { kind: "optimizer", .. })
        ));

        let bad_scheduler = TrainingConfig::new().with_scheduler(Some("step".into()));
        assert!(bad_scheduler.plan().is_err());

        let bad_clip = TrainingConfig::new().with_grad_clip(
            GradClipSettings::new()
                .with_enable(true)
                .with_kind("l1".into()),
        );
        assert!(bad_clip.plan().is_err());

        // disabled clipping never looks at the kind
        let ignored_clip = TrainingConfig::new()
            .with_grad_clip(GradClipSettings::new().with_kind("l1".into()));
        assert!(ignored_clip.plan().is_ok());
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = TrainingConfig::new()
            .with_scheduler(Some("one_cycle".into()))
            .with_epochs(3);
        let json = serde_json::to_string(&config).unwrap();
        let back: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.epochs, 3);
        assert_eq!(back.plan().unwrap().scheduler, Some(SchedulerKind::OneCycle));
    }
}
