//! Per-epoch checkpoints.
//!
//! Each epoch writes `model_{epoch}.mpk` and `optimizer_{epoch}.mpk` and rewrites
//! `checkpoint.json` to point at them.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use burn::module::{AutodiffModule, Module};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::{AutodiffBackend, Backend};
use serde::{Deserialize, Serialize};

use super::optim::TrainingOptimizer;
use crate::error::Result;

pub const POINTER_FILE: &str = "checkpoint.json";
const RECORD_EXTENSION: &str = "mpk";

/// Contents of `checkpoint.json`: the newest saved epoch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointPointer {
    pub epoch: usize,
    pub model: PathBuf,
    pub optimizer: PathBuf,
}

fn recorder() -> NamedMpkFileRecorder<FullPrecisionSettings> {
    NamedMpkFileRecorder::new()
}

/// Save model and optimizer state for `epoch` and move the pointer to it.
pub fn save_checkpoint<B, M>(
    dir: impl AsRef<Path>,
    epoch: usize,
    model: &M,
    optimizer: &dyn TrainingOptimizer<B, M>,
) -> Result<CheckpointPointer>
where
    B: AutodiffBackend,
    M: AutodiffModule<B>,
{
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let model_path = dir.join(format!("model_{epoch}.{RECORD_EXTENSION}"));
    let optimizer_path = dir.join(format!("optimizer_{epoch}.{RECORD_EXTENSION}"));
    model.clone().save_file(model_path.clone(), &recorder())?;
    optimizer.save(&optimizer_path)?;

    let pointer = CheckpointPointer {
        epoch,
        model: model_path,
        optimizer: optimizer_path,
    };
    let tmp = dir.join(format!("{POINTER_FILE}.tmp"));
    let mut writer = BufWriter::new(File::create(&tmp)?);
    serde_json::to_writer_pretty(&mut writer, &pointer)?;
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp, dir.join(POINTER_FILE))?;
    Ok(pointer)
}

/// Read `checkpoint.json` from a checkpoint directory.
pub fn latest_checkpoint(dir: impl AsRef<Path>) -> Result<CheckpointPointer> {
    let file = File::open(dir.as_ref().join(POINTER_FILE))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Load the model weights a pointer refers to into `model`.
pub fn load_model<B: Backend, M: Module<B>>(
    model: M,
    pointer: &CheckpointPointer,
    device: &B::Device,
) -> Result<M> {
    Ok(model.load_file(pointer.model.clone(), &recorder(), device)?)
}
