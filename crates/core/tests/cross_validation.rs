//! Integration test: cross-validated penalty selection.
//!
//! Simulates biallelic markers and traits with a shared genetic factor,
//! then checks the public cross-validation entry points end to end.

use approx::assert_relative_eq;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Binomial, Distribution, Normal};
use traitnet_core::network::GraphicalLasso;
use traitnet_core::{cross_validate, CrossValidator, CvResult, Loss, NetError, PathOptions};

/// N individuals, P markers, Q traits. The first `signal` traits load on
/// marker 0 with effect `effect`; all traits get unit noise.
fn simulate(
    n: usize,
    p: usize,
    q: usize,
    signal: usize,
    effect: f64,
    seed: u64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let geno = Binomial::new(2, 0.5).unwrap();
    let noise = Normal::new(0.0, 1.0).unwrap();

    let x = DMatrix::from_fn(n, p, |_, _| geno.sample(&mut rng) as f64);
    let mut b = DMatrix::<f64>::zeros(p, q);
    for l in 0..signal.min(q) {
        b[(0, l)] = effect;
    }
    let e = DMatrix::from_fn(n, q, |_, _| noise.sample(&mut rng));
    (x.clone(), &x * &b + e)
}

fn argmin(v: &[f64]) -> usize {
    let mut best = 0;
    for (i, &e) in v.iter().enumerate() {
        if e < v[best] {
            best = i;
        }
    }
    best
}

#[test]
fn test_nfolds_must_be_at_least_three() {
    let (x, y) = simulate(60, 10, 3, 2, 1.0, 1);
    let opts = PathOptions::new().nrho(5);

    let err = cross_validate(&x, &y, 2, Loss::Mse, &opts).unwrap_err();
    assert!(matches!(err, NetError::InvalidArgument(_)));

    let ok = cross_validate(&x, &y, 3, Loss::Mse, &opts).unwrap();
    assert_eq!(ok.fold_means.nrows(), 3);
}

#[test]
fn test_rho_min_is_argmin_of_curve() {
    let (x, y) = simulate(150, 20, 4, 2, 1.0, 2);
    let result = CrossValidator::new(5)
        .seed(42)
        .path_options(PathOptions::new().nrho(12))
        .run(&x, &y)
        .unwrap();

    let i = argmin(&result.mean_error);
    assert_eq!(result.selection.index_min, i);
    assert_eq!(result.rho_min, result.rho[i]);
}

#[test]
fn test_one_standard_error_rule() {
    let (x, y) = simulate(150, 20, 4, 3, 1.5, 3);
    let result = CrossValidator::new(5)
        .seed(8)
        .path_options(PathOptions::new().nrho(15).log_spacing(true))
        .run(&x, &y)
        .unwrap();

    let i_min = result.selection.index_min;
    let i_1se = result.selection.index_1se;
    let bound = result.mean_error[i_min] + result.std_error[i_min];

    assert!(i_1se <= i_min);
    assert!(result.rho_1se >= result.rho_min);
    for j in i_1se..=i_min {
        assert!(result.mean_error[j] <= bound);
    }
    if i_1se > 0 {
        assert!(result.mean_error[i_1se - 1] > bound);
    }
}

#[test]
fn test_null_signal_curve_is_flat() {
    let (x, y) = simulate(200, 20, 5, 0, 0.0, 4);
    let result = CrossValidator::new(5)
        .seed(4)
        .path_options(PathOptions::new().nrho(10))
        .run(&x, &y)
        .unwrap();

    let max = result.mean_error.iter().cloned().fold(f64::MIN, f64::max);
    let min = result.mean_error.iter().cloned().fold(f64::MAX, f64::min);
    assert!(min > 0.0);
    assert!(max / min < 1.5, "error curve not flat: {:?}", result.mean_error);
}

#[test]
fn test_null_signal_selection_is_not_pinned_to_an_end() {
    // With no genetic signal the curve is flat, so rho_min may land
    // anywhere, the diagonal end included. It must not sit at an end of the
    // path for every data set.
    let seeds: Vec<u64> = (100..112).collect();
    let mut at_ends = 0;
    for &seed in &seeds {
        let (x, y) = simulate(200, 20, 5, 0, 0.0, seed);
        let result = CrossValidator::new(5)
            .seed(seed)
            .path_options(PathOptions::new().nrho(10))
            .run(&x, &y)
            .unwrap();

        let max = result.mean_error.iter().cloned().fold(f64::MIN, f64::max);
        let min = result.mean_error.iter().cloned().fold(f64::MAX, f64::min);
        assert!(max / min < 1.5, "seed {}: {:?}", seed, result.mean_error);

        let i = result.selection.index_min;
        if i == 0 || i == result.rho.len() - 1 {
            at_ends += 1;
        }
    }
    assert!(
        at_ends < seeds.len(),
        "rho_min at an end of the path for all {} seeds",
        seeds.len()
    );
}

#[test]
fn test_large_response_scale() {
    let (x, y) = simulate(150, 20, 4, 2, 1.0, 12);
    let scaled = &y * 1e7;
    let result = cross_validate(&x, &scaled, 5, Loss::Mse, &PathOptions::new().nrho(5)).unwrap();

    assert!(result.mean_error.iter().all(|v| v.is_finite() && *v > 0.0));
    assert!(result.std_error.iter().all(|v| v.is_finite()));
    assert!(result.rho_1se >= result.rho_min);
}

#[test]
fn test_single_trait_runs() {
    let (x, y) = simulate(80, 10, 1, 1, 1.0, 5);
    let result = cross_validate(&x, &y, 4, Loss::Mae, &PathOptions::new().nrho(4)).unwrap();
    assert_eq!(result.mean_error.len(), 4);
    assert!(result.mean_error.iter().all(|v| v.is_finite()));
    assert_eq!(result.clusters_min(1e-8), vec![0]);
}

#[test]
fn test_user_rho_must_have_two_values() {
    let (x, y) = simulate(60, 10, 3, 2, 1.0, 6);
    for rho in [vec![0.3], vec![0.1, 0.3], vec![0.3, f64::NAN]] {
        let err = cross_validate(&x, &y, 3, Loss::Mse, &PathOptions::new().rho(rho)).unwrap_err();
        assert!(matches!(err, NetError::InvalidArgument(_)));
    }
}

#[test]
fn test_solver_divergence_reports_location() {
    let (x, y) = simulate(60, 10, 3, 3, 2.0, 7);
    let err = CrossValidator::new(3)
        .seed(1)
        .path_options(PathOptions::new().nrho(4))
        .solver(GraphicalLasso::new().max_iter(1))
        .run(&x, &y)
        .unwrap_err();

    match &err {
        NetError::NumericDivergence { iterations, .. } => assert_eq!(*iterations, 1),
        other => panic!("expected NumericDivergence, got {:?}", other),
    }
    let loc = err.location().unwrap();
    assert_eq!(loc.fold, None);
    assert!(loc.rho_index.is_some());
}

#[test]
fn test_result_serializes() {
    let (x, y) = simulate(60, 10, 3, 2, 1.0, 9);
    let result = CrossValidator::new(3)
        .seed(3)
        .path_options(PathOptions::new().nrho(4))
        .run(&x, &y)
        .unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let back: CvResult = serde_json::from_str(&json).unwrap();

    assert_eq!(back.selection.index_min, result.selection.index_min);
    assert_eq!(back.loss, result.loss);
    assert_eq!(back.fold_means.shape(), result.fold_means.shape());
    for (a, b) in back.mean_error.iter().zip(&result.mean_error) {
        assert_relative_eq!(*a, *b, max_relative = 1e-12);
    }
    assert_eq!(back.full_fit.precision.len(), 4);
}
