// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


//! Negative log-likelihood for mixture-density output heads.
//!
//! The head emits, for every (batch, time) position, `components` Gaussians
//! described by `(mean, spread, mixing weight)`. The mixing weights must
//! already be a probability distribution and every spread must be positive;
//! both are the producing layer's contract and are not checked here. A
//! non-positive spread yields `-inf`/NaN log terms.

use ndarray::{Array2, ArrayBase, ArrayD, Axis, Data, Dimension, Ix4, Zip};
use nilm_core::log_sum_exp;

use crate::{ObjectiveError, Result};

/// `0.5 * ln(2π)`
pub const HALF_LOG_2PI: f32 = 0.918_938_5;

/// Index of each Gaussian parameter along theta's last axis.
pub const MEAN: usize = 0;
pub const SPREAD: usize = 1;
pub const MIXING: usize = 2;

const PARAMS: usize = 3;
const COMPONENT_AXIS: usize = 2;

/// Log of one weighted Gaussian component evaluated at `x`.
#[inline]
pub fn normal_log_likelihood_per_component(x: f32, mean: f32, spread: f32, mixing: f32) -> f32 {
    let z = x - mean;
    -HALF_LOG_2PI - spread.ln() - 0.5 * z * z / (spread * spread) + mixing.ln()
}

/// Per-output negative log-likelihood of `target` under the mixture `theta`.
///
/// `theta` is `(batch, time, components, 3)`; `target` is `(batch, time)`,
/// optionally with trailing unit axes. The result has `target`'s shape and is
/// left unreduced.
pub fn mixture_density_nll<S, T, D, E>(
    theta: &ArrayBase<S, D>,
    target: &ArrayBase<T, E>,
) -> Result<ArrayD<f32>>
where
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
    D: Dimension,
    E: Dimension,
{
    let theta = theta.view().into_dimensionality::<Ix4>().map_err(|_| {
        ObjectiveError::Shape(format!(
            "mixture parameters must be (batch, time, components, 3), got {:?}",
            theta.shape()
        ))
    })?;
    let (batch, time, components, params) = theta.dim();
    if params != PARAMS {
        return Err(ObjectiveError::Shape(format!(
            "mixture parameters need {PARAMS} values per component, got {params}"
        )));
    }
    if components == 0 {
        return Err(ObjectiveError::InvalidArgument(
            "mixture needs at least one component".to_string(),
        ));
    }
    let shape = target.shape();
    if shape.len() < 2 || shape[..2] != [batch, time] || shape[2..].iter().any(|&d| d != 1) {
        return Err(ObjectiveError::ShapeMismatch {
            expected: vec![batch, time],
            got: shape.to_vec(),
        });
    }

    let observed = Array2::from_shape_vec((batch, time), target.iter().copied().collect())
        .map_err(|err| ObjectiveError::Shape(err.to_string()))?;
    let observed = observed.view().insert_axis(Axis(COMPONENT_AXIS));
    let observed = observed
        .broadcast((batch, time, components))
        .ok_or_else(|| ObjectiveError::Shape("target does not broadcast over components".into()))?;

    let log_likelihood = Zip::from(observed)
        .and(theta.index_axis(Axis(3), MEAN))
        .and(theta.index_axis(Axis(3), SPREAD))
        .and(theta.index_axis(Axis(3), MIXING))
        .map_collect(|&x, &mean, &spread, &mixing| {
            normal_log_likelihood_per_component(x, mean, spread, mixing)
        });

    let summed = log_sum_exp(&log_likelihood, Some(COMPONENT_AXIS), false)?;
    summed
        .mapv(|v| -v)
        .into_shape(target.raw_dim().into_dyn())
        .map_err(|err| ObjectiveError::Shape(err.to_string()))
}

/// Mixture-density objective reduced to one scalar with a mean over every
/// output.
#[derive(Debug, Default, Clone, Copy)]
pub struct MixtureDensityNll;

impl MixtureDensityNll {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate<S, T, D, E>(&self, theta: &ArrayBase<S, D>, target: &ArrayBase<T, E>) -> Result<f32>
    where
        S: Data<Elem = f32>,
        T: Data<Elem = f32>,
        D: Dimension,
        E: Dimension,
    {
        let nll = mixture_density_nll(theta, target)?;
        Ok(nll.mean().unwrap_or(0.0))
    }
}
