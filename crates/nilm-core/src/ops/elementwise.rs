// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


use std::fmt;
use std::str::FromStr;

use ndarray::{Array, ArrayBase, Data, Dimension, Zip};
use serde::{Deserialize, Serialize};

use super::check_same_shape;
use crate::error::{invalid, Error, Result};

/// Probabilities fed to the cross-entropy kernel are clamped into
/// `[BCE_EPSILON, 1 - BCE_EPSILON]`.
pub const BCE_EPSILON: f32 = 1e-7;

/// Per-element error measure applied before any masking or reduction.
///
/// The kernel is chosen once when an objective is configured; the balancing
/// and reduction code never branches on it.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kernel {
    /// `(x - t)^2`
    #[default]
    #[serde(alias = "mse")]
    SquaredError,
    /// `|x - t|`
    #[serde(alias = "mae")]
    AbsoluteError,
    /// `-(t ln p + (1 - t) ln(1 - p))` with `p` the clamped prediction.
    #[serde(alias = "crossentropy")]
    BinaryCrossEntropy,
    /// Any other elementwise rule. Not serialisable.
    #[serde(skip)]
    Custom(fn(f32, f32) -> f32),
}

impl Kernel {
    pub fn name(&self) -> &'static str {
        match self {
            Kernel::SquaredError => "squared_error",
            Kernel::AbsoluteError => "absolute_error",
            Kernel::BinaryCrossEntropy => "binary_cross_entropy",
            Kernel::Custom(_) => "custom",
        }
    }

    /// Error for a single prediction/target pair.
    #[inline]
    pub fn eval(&self, prediction: f32, target: f32) -> f32 {
        match self {
            Kernel::SquaredError => {
                let diff = prediction - target;
                diff * diff
            }
            Kernel::AbsoluteError => (prediction - target).abs(),
            Kernel::BinaryCrossEntropy => {
                let p = prediction.clamp(BCE_EPSILON, 1.0 - BCE_EPSILON);
                -(target * p.ln() + (1.0 - target) * (1.0 - p).ln())
            }
            Kernel::Custom(rule) => rule(prediction, target),
        }
    }

    /// Applies the kernel elementwise. Both arrays must share one shape.
    pub fn apply<S, T, D>(
        &self,
        prediction: &ArrayBase<S, D>,
        target: &ArrayBase<T, D>,
    ) -> Result<Array<f32, D>>
    where
        S: Data<Elem = f32>,
        T: Data<Elem = f32>,
        D: Dimension,
    {
        check_same_shape(prediction.shape(), target.shape(), self.name())?;
        Ok(Zip::from(prediction)
            .and(target)
            .map_collect(|&x, &t| self.eval(x, t)))
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Kernel {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "squared_error" | "mse" => Ok(Kernel::SquaredError),
            "absolute_error" | "mae" => Ok(Kernel::AbsoluteError),
            "binary_cross_entropy" | "crossentropy" => Ok(Kernel::BinaryCrossEntropy),
            other => Err(invalid(&format!("unknown loss kernel '{other}'"))),
        }
    }
}

/// Squared error between `prediction` and `target`, elementwise.
pub fn elementwise_loss<S, T, D>(
    prediction: &ArrayBase<S, D>,
    target: &ArrayBase<T, D>,
) -> Result<Array<f32, D>>
where
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
    D: Dimension,
{
    Kernel::SquaredError.apply(prediction, target)
}
