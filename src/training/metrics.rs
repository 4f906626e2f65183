//! Metric events emitted by the trainer.
//!
//! The trainer never logs metrics itself; it hands [`MetricEvent`]s to a
//! [`MetricSink`] supplied by the caller, which decides where they go.

use std::path::PathBuf;
use std::sync::mpsc::Sender;

use tracing::{error, info};

#[derive(Clone, Debug, PartialEq)]
pub enum MetricEvent {
    EpochStarted {
        epoch: usize,
        global_step: usize,
    },
    /// Averages over the last `log_freq` training batches
    Running {
        epoch: usize,
        global_step: usize,
        loss: f64,
        accuracy: f64,
    },
    EpochFinished {
        epoch: usize,
        global_step: usize,
        train_loss: f64,
        train_accuracy: f64,
        valid_loss: f64,
        valid_accuracy: f64,
    },
    CheckpointSaved {
        epoch: usize,
        path: PathBuf,
    },
    Error {
        message: String,
    },
}

/// Destination for metric events.
pub trait MetricSink {
    fn emit(&mut self, event: MetricEvent);
}

impl MetricSink for Vec<MetricEvent> {
    fn emit(&mut self, event: MetricEvent) {
        self.push(event);
    }
}

impl MetricSink for Sender<MetricEvent> {
    fn emit(&mut self, event: MetricEvent) {
        // a dropped receiver means nobody is listening any more
        let _ = self.send(event);
    }
}

/// Writes every event to the `tracing` log.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn emit(&mut self, event: MetricEvent) {
        match event {
            MetricEvent::EpochStarted { epoch, global_step } => {
                info!(epoch, global_step, "epoch started")
            }
            MetricEvent::Running {
                epoch,
                global_step,
                loss,
                accuracy,
            } => info!(epoch, global_step, loss, accuracy, "running"),
            MetricEvent::EpochFinished {
                epoch,
                global_step,
                train_loss,
                train_accuracy,
                valid_loss,
                valid_accuracy,
            } => info!(
                epoch,
                global_step,
                train_loss,
                train_accuracy,
                valid_loss,
                valid_accuracy,
                "epoch finished"
            ),
            MetricEvent::CheckpointSaved { epoch, path } => {
                info!(epoch, path = %path.display(), "checkpoint saved")
            }
            MetricEvent::Error { message } => error!(%message, "training failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_sink_forwards() {
        let (mut tx, rx) = mpsc::channel();
        tx.emit(MetricEvent::EpochStarted {
            epoch: 0,
            global_step: 0,
        });
        assert_eq!(
            rx.recv().unwrap(),
            MetricEvent::EpochStarted {
                epoch: 0,
                global_step: 0
            }
        );

        drop(rx);
        tx.emit(MetricEvent::Error {
            message: "closed".into(),
        });
    }
}
