//! # Recurrent Sheet Models
//!
//! Multi-step drivers built on the cells in [`crate::cells`]. **These are the primary
//! APIs most users should use.**
//!
//! ## Quick Start
//!
//! ```ignore
//! use bioplnn::prelude::*;
//!
//! let model = TopographicRnnConfig::new()
//!     .with_sheet_size(SheetSize::new(32, 32))
//!     .with_synapses_per_neuron(Some(8))
//!     .with_synapse_std(Some(2.0))
//!     .init::<Backend>(&device)?;
//!
//! // [batch=4, channels=3, 32, 32] images are averaged over channels
//! let logits = model.forward(images, 10)?; // [4, num_classes]
//! ```
//!
//! ## Tensor Shapes
//!
//! | Input | Shape |
//! |-------|-------|
//! | [`SheetInput::Flat`] | `[batch, features]` (`[features, batch]` if not batch-first) |
//! | [`SheetInput::Channels`] | `[batch, channels, features]` |
//! | [`SheetInput::Images`] | `[batch, channels, height, width]` |
//! | [`SheetInput::PerChannel`] | `Vec` of `[batch, features]` |
//!
//! `features` is the number of input indices, or `N` when none are configured.
//!
//! ## Recording Activity
//!
//! ```ignore
//! let out = model.forward_with(x, &ForwardOptions::new(10).with_return_activations(true))?;
//! let trace = out.activations.unwrap(); // 11 frames of [batch, N]
//! ```
//!
//! Recording copies every step to the host, so it is off by default.

pub mod topographic;

pub use topographic::{
    ForwardOptions, SheetInput, TopographicOutput, TopographicRnn, TopographicRnnConfig,
};
