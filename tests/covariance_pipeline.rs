//! End-to-end scenarios across the estimation transforms.

use approx::assert_relative_eq;
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use riemest::{
    linalg::{eigen_symmetric, EigenConfig},
    CospConfig, CospCovariances, Covariances, ErpCovariances, Estimator, EstimationError, Fit,
    SpectralError, Transform, XdawnCovariances,
};

const N_TRIALS: usize = 10;
const N_CHANNELS: usize = 4;
const N_SAMPLES: usize = 200;

/// Uniform noise plus a class-1 evoked bump on a fixed spatial pattern.
fn erp_batch(seed: u64) -> (Array3<f64>, Vec<usize>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let labels: Vec<usize> = (0..N_TRIALS).map(|i| i % 2).collect();

    let trials = Array3::from_shape_fn((N_TRIALS, N_CHANNELS, N_SAMPLES), |(n, c, t)| {
        let phase = t as f64 / N_SAMPLES as f64;
        let bump = if labels[n] == 1 {
            3.0 * (1.0 - 0.25 * c as f64) * (std::f64::consts::PI * phase).sin()
        } else {
            0.0
        };
        bump + rng.gen::<f64>() - 0.5
    });

    (trials, labels)
}

/// Biased sample covariance computed with plain loops.
fn naive_scm(trial: ArrayView2<'_, f64>) -> Array2<f64> {
    let (c, t) = trial.dim();
    let means: Vec<f64> = trial.rows().into_iter().map(|r| r.sum() / t as f64).collect();
    Array2::from_shape_fn((c, c), |(i, j)| {
        (0..t)
            .map(|k| (trial[[i, k]] - means[i]) * (trial[[j, k]] - means[j]))
            .sum::<f64>()
            / t as f64
    })
}

fn min_eigenvalue(matrix: ArrayView2<'_, f64>) -> f64 {
    let eig = eigen_symmetric(matrix, &EigenConfig::default()).unwrap();
    eig.eigenvalues[eig.len() - 1]
}

#[test]
fn scm_matches_independent_sample_covariance() {
    let (trials, _) = erp_batch(1);
    let covs = Covariances::new(Estimator::Scm)
        .transform(trials.view())
        .unwrap();

    assert_eq!(covs.dim(), (N_TRIALS, N_CHANNELS, N_CHANNELS));
    for (trial, cov) in trials.outer_iter().zip(covs.outer_iter()) {
        let expected = naive_scm(trial);
        for (a, b) in cov.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-10);
        }
    }
}

#[test]
fn erp_covariances_two_balanced_classes() {
    let (trials, labels) = erp_batch(2);
    let (fitted, covs) = ErpCovariances::default()
        .fit_transform(trials.view(), Some(&labels))
        .unwrap();

    assert_eq!(covs.dim(), (N_TRIALS, 12, 12));
    assert_eq!(fitted.prototypes().dim(), (8, N_SAMPLES));

    // Bottom-right block is the plain trial covariance
    for (trial, cov) in trials.outer_iter().zip(covs.outer_iter()) {
        let expected = naive_scm(trial);
        let block = cov.slice(ndarray::s![8.., 8..]);
        for (a, b) in block.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12, max_relative = 1e-10);
        }
    }
}

#[test]
fn erp_covariances_reduced_rank_are_positive_definite() {
    let (trials, labels) = erp_batch(3);
    let erp = ErpCovariances::new(Estimator::Lwf).with_svd(2);
    let (_, covs) = erp.fit_transform(trials.view(), Some(&labels)).unwrap();

    // r·K + C = 2·2 + 4
    assert_eq!(covs.dim(), (N_TRIALS, 8, 8));
    for cov in covs.outer_iter() {
        assert!(min_eigenvalue(cov) > 0.0);
    }
}

#[test]
fn fitted_erp_transform_on_new_batch() {
    let (train, labels) = erp_batch(4);
    let (test, _) = erp_batch(5);
    let fitted = ErpCovariances::default()
        .fit(train.view(), Some(&labels))
        .unwrap();

    let first = fitted.transform(test.view()).unwrap();
    let second = fitted.transform(test.view()).unwrap();
    assert_eq!(first, second);

    // Prototype block is shared by every output matrix
    let reference = first.index_axis(Axis(0), 0).slice(ndarray::s![..8, ..8]).to_owned();
    for cov in first.outer_iter() {
        for (a, b) in cov.slice(ndarray::s![..8, ..8]).iter().zip(reference.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }
}

#[test]
fn xdawn_covariances_end_to_end() {
    let (trials, labels) = erp_batch(6);

    let xdawn = XdawnCovariances::new(2).unwrap().with_estimator(Estimator::Oas);
    let (fitted, covs) = xdawn.fit_transform(trials.view(), Some(&labels)).unwrap();

    assert_eq!(fitted.xdawn().filters().dim(), (4, N_CHANNELS));
    assert_eq!(covs.dim(), (N_TRIALS, 8, 8));
    for cov in covs.outer_iter() {
        assert!(min_eigenvalue(cov) > 0.0);
    }

    let unfiltered = XdawnCovariances::new(2).unwrap().apply_filters(false);
    let (_, covs) = unfiltered
        .fit_transform(trials.view(), Some(&labels))
        .unwrap();
    assert_eq!(covs.dim(), (N_TRIALS, 8, 8));
}

#[test]
fn supervised_transforms_need_labels() {
    let (trials, _) = erp_batch(7);
    assert_eq!(
        ErpCovariances::default().fit(trials.view(), None),
        Err(EstimationError::MissingLabels)
    );
}

#[test]
fn cospectra_of_a_single_trial() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(8);
    let trials = Array3::from_shape_fn((1, 4, 256), |_| rng.gen::<f64>() - 0.5);

    let cosp = CospCovariances::new(CospConfig::default().with_window(128));
    let out = cosp.transform(trials.view()).unwrap();
    assert_eq!(out.dim(), (1, 64, 4, 4));

    for matrix in out.index_axis(Axis(0), 0).outer_iter() {
        assert!(min_eigenvalue(matrix) > -1e-12);
    }
}

#[test]
fn phase_correction_does_not_change_cospectra() {
    let fs = 128.0;
    let trials = Array3::from_shape_fn((3, 3, 512), |(n, c, t)| {
        let t = t as f64 / fs;
        let lag = 0.6 * c as f64 + 0.1 * n as f64;
        (2.0 * std::f64::consts::PI * 10.0 * t - lag).sin() + 0.1 * ((c + 1) as f64 * 3.1 * t).cos()
    });

    let config = CospConfig::default()
        .with_sample_rate(fs)
        .with_band(8.0, 12.0)
        .with_phase_correction(true);
    let corrected = CospCovariances::new(config).transform(trials.view()).unwrap();
    let plain = CospCovariances::new(config.with_phase_correction(false))
        .transform(trials.view())
        .unwrap();

    assert_eq!(corrected.dim(), (3, 5, 3, 3));
    for (a, b) in corrected.iter().zip(plain.iter()) {
        assert_relative_eq!(*a, *b, epsilon = 1e-10, max_relative = 1e-10);
    }
    for trial in corrected.outer_iter() {
        for matrix in trial.outer_iter() {
            assert!(min_eigenvalue(matrix) > -1e-10);
        }
    }
}

#[test]
fn cospectra_without_sample_rate_reject_band() {
    let trials = Array3::<f64>::zeros((1, 2, 256));
    let cosp = CospCovariances::new(CospConfig::default().with_band(8.0, 30.0));
    assert_eq!(
        cosp.transform(trials.view()),
        Err(EstimationError::Spectral(SpectralError::MissingSampleRate))
    );
}
