// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


use ndarray::ArrayD;

use crate::{BalancedLoss, MixtureDensityNll, Result};

/// Trait implemented by objectives a trainer evaluates once per minibatch.
pub trait Objective {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Reduces one minibatch to a scalar training signal.
    ///
    /// For balanced objectives `prediction` has the target's shape; for the
    /// mixture-density objective it holds the mixture parameters.
    fn evaluate(&self, prediction: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<f32>;
}

impl Objective for BalancedLoss {
    fn name(&self) -> &'static str {
        self.strategy().name()
    }

    fn evaluate(&self, prediction: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<f32> {
        BalancedLoss::evaluate(self, prediction, target)
    }
}

impl Objective for MixtureDensityNll {
    fn name(&self) -> &'static str {
        "mixture_density_nll"
    }

    fn evaluate(&self, theta: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<f32> {
        MixtureDensityNll::evaluate(self, theta, target)
    }
}

/// The objective selected for a training run.
#[derive(Debug, Clone, Copy)]
pub enum TrainingObjective {
    Balanced(BalancedLoss),
    MixtureDensity(MixtureDensityNll),
}

impl Default for TrainingObjective {
    fn default() -> Self {
        TrainingObjective::Balanced(BalancedLoss::default())
    }
}

impl Objective for TrainingObjective {
    fn name(&self) -> &'static str {
        match self {
            TrainingObjective::Balanced(loss) => Objective::name(loss),
            TrainingObjective::MixtureDensity(loss) => Objective::name(loss),
        }
    }

    fn evaluate(&self, prediction: &ArrayD<f32>, target: &ArrayD<f32>) -> Result<f32> {
        match self {
            TrainingObjective::Balanced(loss) => loss.evaluate(prediction, target),
            TrainingObjective::MixtureDensity(loss) => loss.evaluate(prediction, target),
        }
    }
}

impl From<BalancedLoss> for TrainingObjective {
    fn from(loss: BalancedLoss) -> Self {
        TrainingObjective::Balanced(loss)
    }
}

impl From<MixtureDensityNll> for TrainingObjective {
    fn from(loss: MixtureDensityNll) -> Self {
        TrainingObjective::MixtureDensity(loss)
    }
}
