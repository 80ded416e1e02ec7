use approx::assert_relative_eq;
use ndarray::{Array2, Array3, ArrayD};
use nilm_objectives::balanced::{mask_and_average, unbalanced};
use nilm_objectives::{
    balanced_loss, elementwise_loss, BalancedLoss, BalancingStrategy, Kernel, Objective,
    ObjectiveError,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Appliance-like targets: mostly zero with occasional "on" runs.
fn synthetic_batch(seed: u64, sequences: usize, time: usize, outputs: usize) -> (Array3<f32>, Array3<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let target = Array3::from_shape_fn((sequences, time, outputs), |_| {
        if rng.gen_bool(0.2) {
            rng.gen_range(0.1f32..3.0)
        } else {
            0.0
        }
    });
    let prediction = target.mapv(|t| t + rng.gen_range(-0.5f32..0.5));
    (prediction, target)
}

#[test]
fn perfect_prediction_gives_zero_for_every_strategy() {
    let (_, target) = synthetic_batch(5, 4, 16, 2);
    let quiet = Array3::<f32>::zeros((4, 16, 2));
    let busy = Array3::<f32>::from_elem((4, 16, 2), 1.5);
    for strategy in BalancingStrategy::ALL {
        for kernel in [Kernel::SquaredError, Kernel::AbsoluteError] {
            for t in [&target, &quiet, &busy] {
                let loss = BalancedLoss::new(strategy)
                    .with_kernel(kernel)
                    .evaluate(t, t)
                    .unwrap();
                assert_eq!(loss, 0.0, "{strategy} with {kernel}");
            }
        }
    }
}

#[test]
fn fully_active_target_matches_active_only_reference() {
    let mut rng = StdRng::seed_from_u64(17);
    let target = Array2::from_shape_fn((12, 3), |_| rng.gen_range(0.5f32..2.0));
    let prediction = target.mapv(|t| t * 0.8);
    let error = elementwise_loss(&prediction, &target).unwrap();

    let loss = BalancedLoss::new(BalancingStrategy::MaskAndAverage)
        .evaluate(&prediction, &target)
        .unwrap();
    let active_only = error.mean().unwrap();
    assert!(loss.is_finite());
    assert_relative_eq!(loss, active_only / 2.0, epsilon = 1e-6);
    assert_relative_eq!(mask_and_average(&error, &target, 0.0).unwrap(), loss);
}

#[test]
fn degenerate_sequence_is_excluded_from_each_half() {
    // batch of 8 rows, folded into 2 sequences of 4
    let target = Array2::from_shape_vec(
        (8, 1),
        vec![0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0],
    )
    .unwrap()
    .into_dyn();
    let prediction = Array2::from_shape_vec(
        (8, 1),
        vec![1.0, 1.0, 1.0, 1.0, 1.0, 2.0, 3.0, 6.0],
    )
    .unwrap()
    .into_dyn();

    let loss = balanced_loss(&prediction, &target, Kernel::SquaredError, Some(4)).unwrap();
    // active half: only sequence 2, mean error 4 / 4 = 1
    // inactive half: only sequence 1, mean error 1
    assert!(!loss.is_nan());
    assert_relative_eq!(loss, 1.0);
}

#[test]
fn per_sequence_balancing_is_not_whole_batch_balancing() {
    // sequence 1 is on for most of its length, sequence 2 for one step
    let target = Array3::from_shape_vec(
        (2, 4, 1),
        vec![1.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0],
    )
    .unwrap();
    let prediction = Array3::from_shape_vec(
        (2, 4, 1),
        vec![1.0, 1.0, 1.0, 0.0, 3.0, 0.0, 0.0, 0.0],
    )
    .unwrap();
    let per_sequence = BalancedLoss::new(BalancingStrategy::PerSequenceNanSafe)
        .evaluate(&prediction, &target)
        .unwrap();
    let whole = BalancedLoss::new(BalancingStrategy::MaskAndAverage)
        .evaluate(&prediction, &target)
        .unwrap();
    // per sequence: active (0 + 4) / 2 = 2, inactive 0 -> 1
    assert_relative_eq!(per_sequence, 1.0);
    // whole batch: active 4 / 4 = 1, inactive 0 -> 0.5
    assert_relative_eq!(whole, 0.5);
}

#[test]
fn empty_masks_never_surface_as_nan() {
    for seed in 0..8 {
        let (prediction, mut target) = synthetic_batch(seed, 3, 10, 2);
        if seed % 2 == 0 {
            target.fill(0.0);
        }
        for strategy in BalancingStrategy::ALL {
            let loss = BalancedLoss::new(strategy)
                .evaluate(&prediction, &target)
                .unwrap();
            assert!(loss.is_finite(), "{strategy} produced {loss} for seed {seed}");
            assert!(loss >= 0.0);
        }
    }
}

#[test]
fn folding_matches_pre_folded_input() {
    let (prediction, target) = synthetic_batch(23, 3, 8, 1);
    let flat_prediction = prediction.clone().into_shape((24, 1)).unwrap();
    let flat_target = target.clone().into_shape((24, 1)).unwrap();
    for strategy in BalancingStrategy::ALL {
        let folded = BalancedLoss::new(strategy)
            .evaluate(&prediction, &target)
            .unwrap();
        let flat = BalancedLoss::new(strategy)
            .with_sequence_length(Some(8))
            .evaluate(&flat_prediction, &flat_target)
            .unwrap();
        assert_relative_eq!(folded, flat, epsilon = 1e-6);
    }
}

#[test]
fn shape_faults_reach_the_caller() {
    let prediction: ArrayD<f32> = Array2::zeros((8, 1)).into_dyn();
    let target: ArrayD<f32> = Array2::zeros((8, 2)).into_dyn();
    assert!(matches!(
        balanced_loss(&prediction, &target, Kernel::SquaredError, Some(4)),
        Err(ObjectiveError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        balanced_loss(&target, &target, Kernel::SquaredError, Some(3)),
        Err(ObjectiveError::IndivisibleBatch {
            batch: 8,
            sequence_length: 3
        })
    ));
}

#[test]
fn trait_object_and_direct_calls_agree() {
    let (prediction, target) = synthetic_batch(41, 2, 12, 3);
    let prediction = prediction.into_dyn();
    let target = target.into_dyn();
    for strategy in BalancingStrategy::ALL {
        let loss = BalancedLoss::new(strategy);
        let direct = loss.evaluate(&prediction, &target).unwrap();
        let via_trait = Objective::evaluate(&loss, &prediction, &target).unwrap();
        assert_eq!(direct, via_trait);
    }
}

#[test]
fn unbalanced_is_the_plain_mean() {
    let (prediction, target) = synthetic_batch(3, 2, 6, 1);
    let error = elementwise_loss(&prediction, &target).unwrap();
    let loss = BalancedLoss::new(BalancingStrategy::Unbalanced)
        .evaluate(&prediction, &target)
        .unwrap();
    assert_relative_eq!(loss, unbalanced(&error));
}
