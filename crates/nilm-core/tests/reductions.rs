use approx::assert_relative_eq;
use ndarray::{Array3, ArrayD};
use nilm_core::{log_sum_exp, masked_mean_along, nanmean, nanmean_all};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn synthetic(seed: u64, shape: (usize, usize, usize), scale: f32) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_fn(shape, |_| rng.gen_range(-scale..scale))
}

#[test]
fn log_sum_exp_is_shift_invariant() {
    let x = synthetic(7, (4, 5, 6), 3.0);
    for &shift in &[-50.0f32, -1.5, 0.0, 2.25, 80.0] {
        let shifted = x.mapv(|v| v + shift);
        let base = log_sum_exp(&x, Some(2), true).unwrap();
        let moved = log_sum_exp(&shifted, Some(2), true).unwrap();
        for (a, b) in base.iter().zip(moved.iter()) {
            assert_relative_eq!(*a, *b - shift, epsilon = 1e-4);
        }
    }
}

#[test]
fn log_sum_exp_stays_finite_at_large_magnitudes() {
    let x = synthetic(19, (3, 2, 8), 1.0e4);
    let out = log_sum_exp(&x, Some(2), false).unwrap();
    assert_eq!(out.shape(), &[3, 2]);
    for ((s, o), value) in (0..3)
        .flat_map(|s| (0..2).map(move |o| (s, o)))
        .zip(out.iter())
    {
        assert!(value.is_finite());
        let max = (0..8).map(|c| x[[s, o, c]]).fold(f32::NEG_INFINITY, f32::max);
        assert!(*value >= max);
        assert!(*value <= max + 8.0f32.ln() + 1e-2);
    }
}

#[test]
fn log_sum_exp_result_broadcasts_back_against_its_input() {
    let x = synthetic(3, (2, 3, 4), 2.0);
    let lse = log_sum_exp(&x, Some(2), true).unwrap();
    let x_dyn: ArrayD<f32> = x.clone().into_dyn();
    let normalised = &x_dyn - &lse;
    let probability_mass = normalised.mapv(f32::exp).sum_axis(ndarray::Axis(2));
    for mass in probability_mass.iter() {
        assert_relative_eq!(*mass, 1.0, epsilon = 1e-5);
    }
}

#[test]
fn nan_safe_outer_mean_skips_degenerate_slices() {
    let error = Array3::from_shape_fn((3, 4, 2), |(s, t, o)| (s * 8 + t * 2 + o) as f32);
    let mask = Array3::from_shape_fn((3, 4, 2), |(s, _, o)| s != 1 && o == 0);
    let per_slice = masked_mean_along(&error, &mask, 1).unwrap();
    let nan_slices = per_slice.iter().filter(|v| v.is_nan()).count();
    assert_eq!(nan_slices, 4);

    let expected = [3.0f32, 19.0];
    let outer = nanmean_all(&per_slice);
    assert_relative_eq!(outer, expected.iter().sum::<f32>() / 2.0);

    let reduced = nanmean(&per_slice, Some(0)).unwrap();
    assert_relative_eq!(reduced[[0]], 11.0);
    assert!(reduced[[1]].is_nan());
}
