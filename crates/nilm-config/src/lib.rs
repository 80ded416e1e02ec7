// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Configuration surface for NILM training objectives.
//!
//! A trainer loads an [`ObjectiveConfig`] (TOML file, environment overrides
//! or both), builds the [`TrainingObjective`](nilm_objectives::TrainingObjective)
//! once, and evaluates it on every minibatch.

pub mod objective;
pub mod tracing;

pub use objective::{ConfigError, ObjectiveConfig, ObjectiveKind};
