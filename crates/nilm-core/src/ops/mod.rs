// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


pub mod elementwise;
pub mod reductions;

use crate::error::{shape, Result};

pub(crate) fn check_axis(ndim: usize, axis: usize, op: &str) -> Result<()> {
    if axis >= ndim {
        return Err(shape(&format!(
            "{op}: axis {axis} out of range for rank {ndim}"
        )));
    }
    Ok(())
}

pub(crate) fn check_same_shape(left: &[usize], right: &[usize], op: &str) -> Result<()> {
    if left != right {
        return Err(shape(&format!(
            "{op}: shapes {left:?} and {right:?} differ"
        )));
    }
    Ok(())
}
