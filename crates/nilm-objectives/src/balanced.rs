// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


//! Threshold-balanced objectives.
//!
//! Appliance traces are mostly "off". A plain mean over the error lets the
//! off periods dominate, so every strategy here splits the target into an
//! active part (`t > threshold`) and an inactive part and balances the two.

use std::fmt;
use std::str::FromStr;

use ndarray::{Array3, ArrayBase, ArrayD, Axis, Data, Dimension, Zip};
use nilm_core::{masked_mean, masked_mean_along, nanmean_all, Kernel};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::sequence::{
    active_mask, ensure_same_shape, fold_sequences, inactive_mask, DEFAULT_THRESHOLD, TIME_AXIS,
};
use crate::{ObjectiveError, Result};

/// How the active and inactive halves of a batch are combined.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancingStrategy {
    /// Whole-tensor masking: mean error over active samples and over inactive
    /// samples, an empty side counting as 0, averaged.
    #[serde(alias = "scaled_cost")]
    MaskAndAverage,
    /// Per (sequence, output) masked means over time, combined across slices
    /// with a NaN-skipping mean so slices without "on" samples drop out.
    #[default]
    #[serde(alias = "scaled_cost3")]
    PerSequenceNanSafe,
    /// Keep only (sequence, output) slices that are active at least once and
    /// take the plain mean of their error.
    #[serde(alias = "ignore_inactive")]
    DropInactiveSlices,
    /// Reweight each slice in place (half the weight spread over active
    /// samples, half over inactive ones) and sum. Slices that are never
    /// active are zeroed. Alternate policy; the result scales with the
    /// number of active slices.
    #[serde(alias = "scaled_cost_ignore_inactive")]
    ReweightInPlace,
    /// Per-slice balanced mean with empty halves counted as 0, averaged over
    /// the slices considered. Honours `ignore_inactive`.
    PerSliceGuarded,
    /// Mean error without any balancing.
    Unbalanced,
}

impl BalancingStrategy {
    pub const ALL: [BalancingStrategy; 6] = [
        BalancingStrategy::MaskAndAverage,
        BalancingStrategy::PerSequenceNanSafe,
        BalancingStrategy::DropInactiveSlices,
        BalancingStrategy::ReweightInPlace,
        BalancingStrategy::PerSliceGuarded,
        BalancingStrategy::Unbalanced,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BalancingStrategy::MaskAndAverage => "mask_and_average",
            BalancingStrategy::PerSequenceNanSafe => "per_sequence_nan_safe",
            BalancingStrategy::DropInactiveSlices => "drop_inactive_slices",
            BalancingStrategy::ReweightInPlace => "reweight_in_place",
            BalancingStrategy::PerSliceGuarded => "per_slice_guarded",
            BalancingStrategy::Unbalanced => "unbalanced",
        }
    }

    /// Whether the strategy needs a `(sequences, time, outputs)` view.
    pub fn is_sequence_aware(&self) -> bool {
        !matches!(
            self,
            BalancingStrategy::MaskAndAverage | BalancingStrategy::Unbalanced
        )
    }
}

impl fmt::Display for BalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BalancingStrategy {
    type Err = ObjectiveError;

    fn from_str(raw: &str) -> Result<Self> {
        let key = raw.trim().to_ascii_lowercase();
        let strategy = match key.as_str() {
            "mask_and_average" | "scaled_cost" => BalancingStrategy::MaskAndAverage,
            "per_sequence_nan_safe" | "scaled_cost3" => BalancingStrategy::PerSequenceNanSafe,
            "drop_inactive_slices" | "ignore_inactive" => BalancingStrategy::DropInactiveSlices,
            "reweight_in_place" | "scaled_cost_ignore_inactive" => {
                BalancingStrategy::ReweightInPlace
            }
            "per_slice_guarded" => BalancingStrategy::PerSliceGuarded,
            "unbalanced" => BalancingStrategy::Unbalanced,
            other => {
                return Err(ObjectiveError::InvalidArgument(format!(
                    "unknown balancing strategy '{other}'"
                )))
            }
        };
        Ok(strategy)
    }
}

/// A configured balanced objective: strategy, kernel, threshold and optional
/// sequence folding, fixed at construction.
#[derive(Clone, Copy, Debug)]
pub struct BalancedLoss {
    strategy: BalancingStrategy,
    kernel: Kernel,
    threshold: f32,
    sequence_length: Option<usize>,
    ignore_inactive: bool,
}

impl Default for BalancedLoss {
    fn default() -> Self {
        Self {
            strategy: BalancingStrategy::default(),
            kernel: Kernel::default(),
            threshold: DEFAULT_THRESHOLD,
            sequence_length: None,
            ignore_inactive: true,
        }
    }
}

impl BalancedLoss {
    pub fn new(strategy: BalancingStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_sequence_length(mut self, sequence_length: Option<usize>) -> Self {
        self.sequence_length = sequence_length;
        self
    }

    pub fn with_ignore_inactive(mut self, ignore_inactive: bool) -> Self {
        self.ignore_inactive = ignore_inactive;
        self
    }

    pub fn strategy(&self) -> BalancingStrategy {
        self.strategy
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn sequence_length(&self) -> Option<usize> {
        self.sequence_length
    }

    pub fn ignore_inactive(&self) -> bool {
        self.ignore_inactive
    }

    /// Computes the scalar loss for one minibatch.
    ///
    /// Shape faults (prediction/target disagreement, a batch that does not
    /// split into whole sequences) are returned as errors. Empty active or
    /// inactive partitions are absorbed and never turn the result into NaN.
    pub fn evaluate<S, T, D>(
        &self,
        prediction: &ArrayBase<S, D>,
        target: &ArrayBase<T, D>,
    ) -> Result<f32>
    where
        S: Data<Elem = f32>,
        T: Data<Elem = f32>,
        D: Dimension,
    {
        ensure_same_shape(prediction, target)?;
        let error = self.kernel.apply(prediction, target)?;
        trace!(
            strategy = self.strategy.name(),
            kernel = self.kernel.name(),
            shape = ?target.shape(),
            "evaluating balanced objective"
        );

        if self.sequence_length.is_none() && !self.strategy.is_sequence_aware() {
            return self.reduce_whole(&error, target);
        }

        let error = fold_sequences(&error, self.sequence_length)?;
        let target = fold_sequences(target, self.sequence_length)?;
        match self.strategy {
            BalancingStrategy::MaskAndAverage | BalancingStrategy::Unbalanced => {
                self.reduce_whole(&error, &target)
            }
            BalancingStrategy::PerSequenceNanSafe => {
                per_sequence_nan_safe(&error, &target, self.threshold)
            }
            BalancingStrategy::DropInactiveSlices => {
                Ok(drop_inactive_slices(&error, &target, self.threshold))
            }
            BalancingStrategy::ReweightInPlace => {
                Ok(reweight_in_place(&error, &target, self.threshold))
            }
            BalancingStrategy::PerSliceGuarded => Ok(per_slice_guarded(
                &error,
                &target,
                self.threshold,
                self.ignore_inactive,
            )),
        }
    }

    fn reduce_whole<S, T, D>(&self, error: &ArrayBase<S, D>, target: &ArrayBase<T, D>) -> Result<f32>
    where
        S: Data<Elem = f32>,
        T: Data<Elem = f32>,
        D: Dimension,
    {
        match self.strategy {
            BalancingStrategy::Unbalanced => Ok(unbalanced(error)),
            _ => mask_and_average(error, target, self.threshold),
        }
    }
}

/// Balanced loss with the production strategy ([`BalancingStrategy::PerSequenceNanSafe`])
/// and the default threshold.
///
/// Without `sequence_length` the tensors must already be
/// `(sequences, time, outputs)`.
pub fn balanced_loss(
    prediction: &ArrayD<f32>,
    target: &ArrayD<f32>,
    kernel: Kernel,
    sequence_length: Option<usize>,
) -> Result<f32> {
    BalancedLoss::default()
        .with_kernel(kernel)
        .with_sequence_length(sequence_length)
        .evaluate(prediction, target)
}

/// Whole-tensor balancing: `(mean(active) + mean(inactive)) / 2`, where an
/// empty side contributes 0.
pub fn mask_and_average<S, T, D>(
    error: &ArrayBase<S, D>,
    target: &ArrayBase<T, D>,
    threshold: f32,
) -> Result<f32>
where
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
    D: Dimension,
{
    let active = active_mask(target, threshold);
    let inactive = inactive_mask(&active);
    let above = masked_mean(error, &active)?.unwrap_or_else(|| {
        debug!("no active samples in batch; active half contributes zero");
        0.0
    });
    let below = masked_mean(error, &inactive)?.unwrap_or_else(|| {
        debug!("no inactive samples in batch; inactive half contributes zero");
        0.0
    });
    Ok((above + below) / 2.0)
}

/// Per-sequence, per-output balancing with a NaN-skipping outer mean.
pub fn per_sequence_nan_safe(
    error: &Array3<f32>,
    target: &Array3<f32>,
    threshold: f32,
) -> Result<f32> {
    let active = active_mask(target, threshold);
    let inactive = inactive_mask(&active);
    let above = nan_safe_half(error, &active, "active")?;
    let below = nan_safe_half(error, &inactive, "inactive")?;
    Ok((above + below) / 2.0)
}

fn nan_safe_half(error: &Array3<f32>, mask: &Array3<bool>, half: &'static str) -> Result<f32> {
    // (sequences, outputs); NaN wherever the mask never fires along time
    let per_slice = masked_mean_along(error, mask, TIME_AXIS)?;
    let mean = nanmean_all(&per_slice);
    if mean.is_nan() {
        debug!(
            half,
            slices = per_slice.len(),
            "no slice has samples in this half; it contributes zero"
        );
        return Ok(0.0);
    }
    Ok(mean)
}

/// Mean error over the (sequence, output) slices that are active at least
/// once. Returns 0 when no slice is active.
pub fn drop_inactive_slices(error: &Array3<f32>, target: &Array3<f32>, threshold: f32) -> f32 {
    let (sum, count) = Zip::from(error.lanes(Axis(TIME_AXIS)))
        .and(target.lanes(Axis(TIME_AXIS)))
        .fold((0.0f32, 0usize), |(sum, count), err, tgt| {
            if tgt.iter().any(|&t| t > threshold) {
                (sum + err.sum(), count + err.len())
            } else {
                (sum, count)
            }
        });
    if count == 0 {
        debug!("every slice is inactive; nothing left to average");
        return 0.0;
    }
    sum / count as f32
}

/// Sum of the error after reweighting each slice: active samples share a
/// weight of 0.5, inactive samples share the other 0.5. Slices that are
/// never active contribute nothing.
pub fn reweight_in_place(error: &Array3<f32>, target: &Array3<f32>, threshold: f32) -> f32 {
    Zip::from(error.lanes(Axis(TIME_AXIS)))
        .and(target.lanes(Axis(TIME_AXIS)))
        .fold(0.0f32, |total, err, tgt| {
            let split = SliceSplit::measure(err.iter().copied(), tgt.iter().copied(), threshold);
            if split.n_active == 0 {
                return total;
            }
            let mut weighted = split.sum_active * (0.5 / split.n_active as f32);
            if split.n_inactive > 0 {
                weighted += split.sum_inactive * (0.5 / split.n_inactive as f32);
            }
            total + weighted
        })
}

/// Mean over slices of `(mean(active) + mean(inactive)) / 2`, empty halves
/// counting as 0. With `ignore_inactive`, slices that are never active are
/// skipped entirely. Returns 0 when no slice is counted.
pub fn per_slice_guarded(
    error: &Array3<f32>,
    target: &Array3<f32>,
    threshold: f32,
    ignore_inactive: bool,
) -> f32 {
    let (total, counted) = Zip::from(error.lanes(Axis(TIME_AXIS)))
        .and(target.lanes(Axis(TIME_AXIS)))
        .fold((0.0f32, 0usize), |(total, counted), err, tgt| {
            let split = SliceSplit::measure(err.iter().copied(), tgt.iter().copied(), threshold);
            if ignore_inactive && split.n_active == 0 {
                return (total, counted);
            }
            let above = split.active_mean().unwrap_or(0.0);
            let below = split.inactive_mean().unwrap_or(0.0);
            (total + (above + below) / 2.0, counted + 1)
        });
    if counted == 0 {
        debug!("no slice counted towards the guarded mean");
        return 0.0;
    }
    total / counted as f32
}

/// Plain mean of the error.
pub fn unbalanced<S, D>(error: &ArrayBase<S, D>) -> f32
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    error.mean().unwrap_or(0.0)
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct SliceSplit {
    sum_active: f32,
    n_active: usize,
    sum_inactive: f32,
    n_inactive: usize,
}

impl SliceSplit {
    fn measure(
        error: impl Iterator<Item = f32>,
        target: impl Iterator<Item = f32>,
        threshold: f32,
    ) -> Self {
        error.zip(target).fold(Self::default(), |mut split, (e, t)| {
            if t > threshold {
                split.sum_active += e;
                split.n_active += 1;
            } else {
                split.sum_inactive += e;
                split.n_inactive += 1;
            }
            split
        })
    }

    fn active_mean(&self) -> Option<f32> {
        (self.n_active > 0).then(|| self.sum_active / self.n_active as f32)
    }

    fn inactive_mean(&self) -> Option<f32> {
        (self.n_inactive > 0).then(|| self.sum_inactive / self.n_inactive as f32)
    }
}
