// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("Shape error: {0}")]
    Shape(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub fn shape(m: &str) -> Error {
    Error::Shape(m.to_string())
}

pub fn invalid(m: &str) -> Error {
    Error::InvalidArgument(m.to_string())
}
