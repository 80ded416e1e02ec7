// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


use ndarray::{ArrayBase, ArrayD, Axis, Data, Dimension, IxDyn, Zip};

use super::{check_axis, check_same_shape};
use crate::error::Result;

/// Mean along `axis` that leaves NaN entries out of both the sum and the
/// count. `None` reduces every axis into a 0-d array.
///
/// A slice with no valid entries comes out as NaN; callers that reduce
/// further are expected to filter it (usually with another `nanmean`).
pub fn nanmean<S, D>(x: &ArrayBase<S, D>, axis: Option<usize>) -> Result<ArrayD<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let x = x.view().into_dyn();
    let valid = x.mapv(|v| if v.is_nan() { 0.0f32 } else { 1.0 });
    let zeroed = x.mapv(|v| if v.is_nan() { 0.0f32 } else { v });
    match axis {
        Some(ax) => {
            check_axis(x.ndim(), ax, "nanmean")?;
            Ok(zeroed.sum_axis(Axis(ax)) / valid.sum_axis(Axis(ax)))
        }
        None => Ok(ArrayD::from_elem(
            IxDyn(&[]),
            zeroed.sum() / valid.sum(),
        )),
    }
}

/// Scalar form of [`nanmean`] over every element.
pub fn nanmean_all<S, D>(x: &ArrayBase<S, D>) -> f32
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let (sum, count) = x
        .iter()
        .filter(|v| !v.is_nan())
        .fold((0.0f32, 0usize), |(sum, count), &v| (sum + v, count + 1));
    sum / count as f32
}

/// Mean of the entries selected by `mask`, or `None` when the mask is empty.
pub fn masked_mean<S, M, D>(values: &ArrayBase<S, D>, mask: &ArrayBase<M, D>) -> Result<Option<f32>>
where
    S: Data<Elem = f32>,
    M: Data<Elem = bool>,
    D: Dimension,
{
    check_same_shape(values.shape(), mask.shape(), "masked_mean")?;
    let (sum, count) = Zip::from(values)
        .and(mask)
        .fold((0.0f32, 0usize), |(sum, count), &v, &keep| {
            if keep {
                (sum + v, count + 1)
            } else {
                (sum, count)
            }
        });
    Ok((count > 0).then(|| sum / count as f32))
}

/// `sum(values * mask, axis) / sum(mask, axis)`.
///
/// Every slice along `axis` whose mask is entirely false yields NaN (0/0);
/// masked-out entries never reach the numerator.
pub fn masked_mean_along<S, M, D>(
    values: &ArrayBase<S, D>,
    mask: &ArrayBase<M, D>,
    axis: usize,
) -> Result<ArrayD<f32>>
where
    S: Data<Elem = f32>,
    M: Data<Elem = bool>,
    D: Dimension,
{
    check_same_shape(values.shape(), mask.shape(), "masked_mean_along")?;
    check_axis(values.ndim(), axis, "masked_mean_along")?;
    let values = values.view().into_dyn();
    let mask = mask.view().into_dyn();
    let masked = Zip::from(&values)
        .and(&mask)
        .map_collect(|&v, &keep| if keep { v } else { 0.0f32 });
    let counts = mask.mapv(|keep| if keep { 1.0f32 } else { 0.0 });
    Ok(masked.sum_axis(Axis(axis)) / counts.sum_axis(Axis(axis)))
}

/// Numerically stable `log(sum(exp(x)))` along `axis` (every axis when
/// `None`).
///
/// The per-slice maximum is subtracted before exponentiating and added back
/// after the log, so finite inputs never overflow. With `keep_reduced_axis`
/// the reduced axis stays as a length-1 dimension and the result broadcasts
/// against `x`.
///
/// A slice made only of `-inf` has no defined result: the shift becomes
/// `-inf - -inf` and the output for that slice is NaN. Upstream layers must
/// not emit such slices.
pub fn log_sum_exp<S, D>(
    x: &ArrayBase<S, D>,
    axis: Option<usize>,
    keep_reduced_axis: bool,
) -> Result<ArrayD<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let x = x.view().into_dyn();
    match axis {
        Some(ax) => {
            check_axis(x.ndim(), ax, "log_sum_exp")?;
            let max = x.fold_axis(Axis(ax), f32::NEG_INFINITY, |&acc, &v| acc.max(v));
            let shifted = &x - &max.view().insert_axis(Axis(ax));
            let summed = shifted.mapv(f32::exp).sum_axis(Axis(ax));
            let out = summed.mapv(f32::ln) + &max;
            Ok(if keep_reduced_axis {
                out.insert_axis(Axis(ax))
            } else {
                out
            })
        }
        None => {
            let max = x.iter().fold(f32::NEG_INFINITY, |acc, &v| acc.max(v));
            let summed: f32 = x.iter().map(|&v| (v - max).exp()).sum();
            let shape = if keep_reduced_axis {
                vec![1; x.ndim()]
            } else {
                Vec::new()
            };
            Ok(ArrayD::from_elem(IxDyn(&shape), summed.ln() + max))
        }
    }
}
