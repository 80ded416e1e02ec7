// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Numerical building blocks shared by the NILM training objectives.
//!
//! Everything here operates on `ndarray` arrays of `f32` and is pure: no
//! function keeps state between calls. The elementwise kernels turn a
//! prediction/target pair into an error tensor, and the reductions collapse
//! those errors while tolerating the NaNs produced by empty masks.

pub mod error;
pub mod ops;

pub use error::{Error, Result};
pub use ops::elementwise::{elementwise_loss, Kernel};
pub use ops::reductions::{log_sum_exp, masked_mean, masked_mean_along, nanmean, nanmean_all};
