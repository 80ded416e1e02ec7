// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.


//! Sequence folding and activity masks shared by the balancing strategies.

use ndarray::{Array, Array3, ArrayBase, Data, Dimension, Ix3};

use crate::{ObjectiveError, Result};

/// Targets strictly above this value count as "appliance on".
pub const DEFAULT_THRESHOLD: f32 = 0.0;

/// Axis of a folded `(sequences, time, outputs)` tensor that holds time.
pub const TIME_AXIS: usize = 1;

pub fn ensure_same_shape<S, T, D>(prediction: &ArrayBase<S, D>, target: &ArrayBase<T, D>) -> Result<()>
where
    S: Data<Elem = f32>,
    T: Data<Elem = f32>,
    D: Dimension,
{
    if prediction.shape() != target.shape() {
        return Err(ObjectiveError::ShapeMismatch {
            expected: target.shape().to_vec(),
            got: prediction.shape().to_vec(),
        });
    }
    Ok(())
}

/// Views `x` as `(sequences, time, outputs)`.
///
/// With a sequence length the leading (batch) axis is split into
/// `batch / sequence_length` sequences; the tensor must be laid out as
/// `(batch, outputs)`, optionally with unit axes in between. Without one the
/// tensor must already be rank 3.
pub fn fold_sequences<S, D>(x: &ArrayBase<S, D>, sequence_length: Option<usize>) -> Result<Array3<f32>>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let shape = x.shape();
    let Some(sequence_length) = sequence_length else {
        return x
            .to_owned()
            .into_dimensionality::<Ix3>()
            .map_err(|_| {
                ObjectiveError::Shape(format!(
                    "expected (sequences, time, outputs), got {shape:?}"
                ))
            });
    };

    if sequence_length == 0 {
        return Err(ObjectiveError::InvalidArgument(
            "sequence length must be > 0".to_string(),
        ));
    }
    if shape.len() < 2 {
        return Err(ObjectiveError::Shape(format!(
            "cannot fold rank-{} tensor {shape:?} into sequences",
            shape.len()
        )));
    }
    let batch = shape[0];
    let outputs = shape[shape.len() - 1];
    if batch % sequence_length != 0 {
        return Err(ObjectiveError::IndivisibleBatch {
            batch,
            sequence_length,
        });
    }
    if x.len() != batch * outputs {
        return Err(ObjectiveError::Shape(format!(
            "folding expects (batch, outputs) rows, got {shape:?}"
        )));
    }
    Array3::from_shape_vec(
        (batch / sequence_length, sequence_length, outputs),
        x.iter().copied().collect(),
    )
    .map_err(|err| ObjectiveError::Shape(err.to_string()))
}

/// `target > threshold`, elementwise.
pub fn active_mask<S, D>(target: &ArrayBase<S, D>, threshold: f32) -> Array<bool, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    target.mapv(|t| t > threshold)
}

/// Logical complement of [`active_mask`]; a target equal to the threshold is
/// inactive.
pub fn inactive_mask<D: Dimension>(active: &Array<bool, D>) -> Array<bool, D> {
    active.mapv(|on| !on)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2, Array4};

    #[test]
    fn folds_flat_batch_into_sequences() {
        let flat = Array2::from_shape_fn((8, 2), |(row, col)| (row * 2 + col) as f32);
        let folded = fold_sequences(&flat, Some(4)).unwrap();
        assert_eq!(folded.dim(), (2, 4, 2));
        assert_eq!(folded[[1, 0, 0]], 8.0);
        assert_eq!(folded[[1, 3, 1]], 15.0);
    }

    #[test]
    fn unit_middle_axes_are_folded_away() {
        let x = Array4::<f32>::ones((6, 1, 1, 3));
        let folded = fold_sequences(&x, Some(3)).unwrap();
        assert_eq!(folded.dim(), (2, 3, 3));
    }

    #[test]
    fn indivisible_batch_fails_loudly() {
        let flat = Array2::<f32>::zeros((10, 1));
        let err = fold_sequences(&flat, Some(4)).unwrap_err();
        assert_eq!(
            err,
            ObjectiveError::IndivisibleBatch {
                batch: 10,
                sequence_length: 4
            }
        );
    }

    #[test]
    fn zero_sequence_length_is_invalid() {
        let flat = Array2::<f32>::zeros((4, 1));
        assert!(matches!(
            fold_sequences(&flat, Some(0)),
            Err(ObjectiveError::InvalidArgument(_))
        ));
    }

    #[test]
    fn unfolded_input_must_be_rank_three() {
        let flat = Array2::<f32>::zeros((4, 1));
        assert!(matches!(
            fold_sequences(&flat, None),
            Err(ObjectiveError::Shape(_))
        ));
        let seq = ndarray::Array3::<f32>::zeros((2, 4, 1)).into_dyn();
        assert_eq!(fold_sequences(&seq, None).unwrap().dim(), (2, 4, 1));
    }

    #[test]
    fn threshold_is_strict_for_activity() {
        let target = array![-1.0f32, 0.0, 1e-6, 5.0];
        let active = active_mask(&target, DEFAULT_THRESHOLD);
        assert_eq!(active, array![false, false, true, true]);
        assert_eq!(inactive_mask(&active), array![true, true, false, false]);
    }
}
