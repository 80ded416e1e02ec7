// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Training objectives for sequence-to-sequence energy disaggregation.
//!
//! Two families live here. The balancing family compares a predicted
//! appliance trace against its target while giving the rare "appliance on"
//! samples as much weight as the abundant "appliance off" ones. The
//! mixture-density objective scores a predicted mixture of Gaussians against
//! the observed power.
//!
//! An objective is configured once and then evaluated on every minibatch:
//!
//! ```
//! use ndarray::{Array2, ArrayD};
//! use nilm_objectives::{BalancedLoss, BalancingStrategy, Objective};
//!
//! let objective = BalancedLoss::new(BalancingStrategy::PerSequenceNanSafe)
//!     .with_sequence_length(Some(4));
//! let target: ArrayD<f32> = Array2::from_shape_fn((8, 1), |(i, _)| i as f32).into_dyn();
//! let loss = objective.evaluate(&target, &target).unwrap();
//! assert_eq!(loss, 0.0);
//! ```

pub mod balanced;
pub mod mixture_density;
pub mod objective;
pub mod sequence;

use thiserror::Error;

pub use balanced::{balanced_loss, BalancedLoss, BalancingStrategy};
pub use mixture_density::{mixture_density_nll, MixtureDensityNll};
pub use nilm_core::{elementwise_loss, log_sum_exp, nanmean, Kernel};
pub use objective::{Objective, TrainingObjective};
pub use sequence::DEFAULT_THRESHOLD;

/// Errors surfaced by the objectives crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ObjectiveError {
    /// Prediction and target (or theta and target) disagree on shape.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },
    /// The batch axis cannot be split into whole sequences.
    #[error("batch of {batch} rows is not divisible by sequence length {sequence_length}")]
    IndivisibleBatch { batch: usize, sequence_length: usize },
    /// A tensor has a rank or layout the objective cannot interpret.
    #[error("shape error: {0}")]
    Shape(String),
    /// Raised when an invalid parameter (sequence length, component count, ...) is provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ObjectiveError>;

impl From<nilm_core::Error> for ObjectiveError {
    fn from(err: nilm_core::Error) -> Self {
        match err {
            nilm_core::Error::Shape(msg) => ObjectiveError::Shape(msg),
            nilm_core::Error::InvalidArgument(msg) => ObjectiveError::InvalidArgument(msg),
        }
    }
}
