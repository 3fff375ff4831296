//! K-fold cross-validation of the graphical lasso penalty.
//!
//! The full data are fitted once to freeze the penalty path. Each fold
//! then works only from its training rows:
//!   1. Cross-fit polygenic scores: training rows are scored by marker
//!      models that never saw them, held-out rows by a model fitted on all
//!      training rows. No held-out response reaches any score.
//!   2. Refit the path on those scores (scores as design) along the frozen
//!      penalties.
//!   3. Predict each trait from its conditionally adjusted score, calibrated
//!      by least squares on the training rows.
//!   4. Rotate held-out residuals by the square root of the fold precision
//!      matrix rescaled to unit diagonal, and record squared or absolute
//!      error for every held-out row and trait.
//!
//! The rescaling keeps the rotation free of units, so multiplying the
//! responses by a constant multiplies every error by the same constant.
//!
//! Folds run in parallel and return owned partial results that are merged
//! once all of them have finished.
//!
//! # Example
//!
//! ```ignore
//! use traitnet_core::diagnostics::{CrossValidator, Loss};
//!
//! let cv = CrossValidator::new(5).loss(Loss::Mse).seed(42);
//! let result = cv.run(&genotypes, &phenotypes)?;
//! println!("{}", result.summary());
//! ```

use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVectorView};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::diagnostics::folds::{fold_members, partition_folds};
use crate::diagnostics::selection::{select_rho, Selection};
use crate::error::{NetError, Result};
use crate::genetics::PrsModel;
use crate::matrix::dense::{sqrt_spd, unit_diagonal};
use crate::network::clusters::trait_clusters;
use crate::network::glasso::{GraphicalLasso, PrecisionSolver};
use crate::network::path::{check_dimensions, PathFit, PathFitter, PathOptions, ResponseType};

/// Prediction loss used to score held-out rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Loss {
    /// Squared error.
    #[default]
    Mse,
    /// Absolute error.
    Mae,
}

impl Loss {
    fn error(self, predicted: f64, observed: f64) -> f64 {
        match self {
            Loss::Mse => (predicted - observed).powi(2),
            Loss::Mae => (predicted - observed).abs(),
        }
    }
}

impl FromStr for Loss {
    type Err = NetError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mse" => Ok(Loss::Mse),
            "mae" => Ok(Loss::Mae),
            other => Err(NetError::InvalidArgument(format!(
                "unknown loss '{}', expected 'mse' or 'mae'",
                other
            ))),
        }
    }
}

impl fmt::Display for Loss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loss::Mse => write!(f, "mse"),
            Loss::Mae => write!(f, "mae"),
        }
    }
}

/// Configuration for k-fold cross-validation.
pub struct CrossValidator<S: PrecisionSolver = GraphicalLasso> {
    /// Number of folds (default: 10).
    n_folds: usize,
    /// Held-out loss.
    loss: Loss,
    /// Random seed; `None` draws fresh entropy on every run.
    seed: Option<u64>,
    /// Worker threads for the fold loop; `None` uses the global rayon pool.
    threads: Option<usize>,
    /// Path options and precision solver shared by every fit.
    fitter: PathFitter<S>,
}

/// Results from cross-validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CvResult {
    /// Penalty path (strictly decreasing), shared by every fold.
    pub rho: Vec<f64>,
    /// Mean held-out error per penalty.
    pub mean_error: Vec<f64>,
    /// Standard error of `mean_error` per penalty.
    pub std_error: Vec<f64>,
    /// Penalty with the smallest mean error.
    pub rho_min: f64,
    /// Largest penalty within one standard error of the minimum.
    pub rho_1se: f64,
    /// Indices behind `rho_min` and `rho_1se`.
    pub selection: Selection,
    /// Mean error of each fold per penalty (n_folds × n_rho).
    pub fold_means: DMatrix<f64>,
    /// Loss the errors were measured with.
    pub loss: Loss,
    /// Fit on the full data.
    pub full_fit: PathFit,
}

/// Held-out errors of one fold.
#[derive(Debug, Clone)]
pub struct FoldErrors {
    /// Fold index (0-based).
    pub fold: usize,
    /// Held-out observation indices.
    pub rows: Vec<usize>,
    /// Per penalty, an n_test × Q matrix of errors.
    pub errors: Vec<DMatrix<f64>>,
    /// Per penalty, the mean over held-out rows and traits.
    pub means: Vec<f64>,
}

impl CrossValidator<GraphicalLasso> {
    /// Create a cross-validator with the given number of folds.
    pub fn new(n_folds: usize) -> Self {
        Self {
            n_folds,
            loss: Loss::default(),
            seed: None,
            threads: None,
            fitter: PathFitter::new(PathOptions::default()),
        }
    }
}

impl Default for CrossValidator<GraphicalLasso> {
    fn default() -> Self {
        Self::new(10)
    }
}

impl<S: PrecisionSolver> CrossValidator<S> {
    /// Set the held-out loss (default: MSE).
    pub fn loss(mut self, loss: Loss) -> Self {
        self.loss = loss;
        self
    }

    /// Set the random seed for reproducible folds.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Run folds on a dedicated pool with this many threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Set the penalty path options.
    pub fn path_options(mut self, options: PathOptions) -> Self {
        self.fitter = self.fitter.with_options(options);
        self
    }

    /// Use a different precision solver.
    pub fn solver<T: PrecisionSolver>(self, solver: T) -> CrossValidator<T> {
        CrossValidator {
            n_folds: self.n_folds,
            loss: self.loss,
            seed: self.seed,
            threads: self.threads,
            fitter: self.fitter.with_solver(solver),
        }
    }

    /// Run k-fold cross-validation.
    ///
    /// # Arguments
    ///
    /// * `x` - Marker matrix (N × P)
    /// * `y` - Trait matrix (N × Q)
    ///
    /// # Returns
    ///
    /// A [`CvResult`] with the error curve, the selected penalties and the
    /// full-data fit. Any failing fold fails the whole call.
    pub fn run(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<CvResult> {
        self.validate(x, y)?;
        let n = y.nrows();
        let q = y.ncols();

        let full_fit = self.fitter.fit(x, y)?;
        let n_rho = full_fit.n_rho();
        log::info!(
            "Cross-validating {} folds over {} penalties (n = {}, q = {}, loss = {})",
            self.n_folds,
            n_rho,
            n,
            q,
            self.loss
        );

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let assignment = partition_folds(n, self.n_folds, &mut rng)?;
        let folds = fold_members(&assignment, self.n_folds);

        let run_folds = || {
            folds
                .par_iter()
                .enumerate()
                .map(|(f, rows)| {
                    self.run_fold(f, rows, &assignment, &full_fit, x, y)
                        .map_err(|e| e.in_fold(f))
                })
                .collect::<Result<Vec<FoldErrors>>>()
        };
        let fold_errors = match self.threads {
            Some(threads) => rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?
                .install(run_folds)?,
            None => run_folds()?,
        };

        let (mean_error, std_error, fold_means) = reduce(&fold_errors, n, q, n_rho);
        let selection = select_rho(&full_fit.rho, &mean_error, &std_error)?;
        log::info!(
            "Selected rho_min = {:.4e} (index {}), rho_1se = {:.4e} (index {})",
            selection.rho_min,
            selection.index_min,
            selection.rho_1se,
            selection.index_1se
        );

        Ok(CvResult {
            rho: full_fit.rho.clone(),
            mean_error,
            std_error,
            rho_min: selection.rho_min,
            rho_1se: selection.rho_1se,
            selection,
            fold_means,
            loss: self.loss,
            full_fit,
        })
    }

    /// Argument checks that must pass before any numeric work.
    fn validate(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<()> {
        if self.n_folds < 3 {
            return Err(NetError::InvalidArgument(format!(
                "nfolds must be at least 3, got {}",
                self.n_folds
            )));
        }
        self.fitter.options().validate()?;
        check_dimensions(x, y)?;

        let n = y.nrows();
        if n < self.n_folds {
            return Err(NetError::InvalidArgument(format!(
                "Number of observations ({}) must be >= number of folds ({})",
                n, self.n_folds
            )));
        }
        // Inner score models drop two folds from the data.
        let largest_fold = n.div_ceil(self.n_folds);
        if n < 2 * largest_fold + 2 {
            return Err(NetError::InvalidArgument(format!(
                "{} observations leave fewer than 2 inner training rows with {} folds",
                n, self.n_folds
            )));
        }
        Ok(())
    }

    /// Refit on the training rows of one fold and score its held-out rows.
    fn run_fold(
        &self,
        fold: usize,
        test_rows: &[usize],
        assignment: &[usize],
        full_fit: &PathFit,
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
    ) -> Result<FoldErrors> {
        let q = y.ncols();
        let train_rows: Vec<usize> = (0..y.nrows()).filter(|&i| assignment[i] != fold).collect();

        let (prs_train, prs_test) = self.cross_fitted_scores(fold, &train_rows, test_rows, assignment, x, y)?;
        let y_train = y.select_rows(&train_rows);
        let y_test = y.select_rows(test_rows);

        let fold_fit = self.fitter.refit(&prs_train, &y_train, &full_fit.rho)?;
        let pred_train = fold_fit.predict(&prs_train, ResponseType::Link)?;
        let pred_test = fold_fit.predict(&prs_test, ResponseType::Link)?;

        let mut errors = Vec::with_capacity(fold_fit.n_rho());
        let mut means = Vec::with_capacity(fold_fit.n_rho());
        for (j, theta) in fold_fit.precision.iter().enumerate() {
            let w = unit_diagonal(theta)
                .and_then(|p| sqrt_spd(&p))
                .ok_or_else(|| NetError::singular("square root of fold precision matrix").at_rho(j))?;

            let mut fitted = DMatrix::zeros(test_rows.len(), q);
            for l in 0..q {
                let (intercept, slope) = least_squares(pred_train[j].column(l), y_train.column(l));
                for i in 0..test_rows.len() {
                    fitted[(i, l)] = intercept + slope * pred_test[j][(i, l)];
                }
            }
            let predicted = &fitted * &w;
            let observed = &y_test * &w;

            let err = predicted.zip_map(&observed, |p, o| self.loss.error(p, o));
            means.push(err.mean());
            errors.push(err);
        }

        log::debug!(
            "Fold {}: {} training rows, {} held out",
            fold,
            train_rows.len(),
            test_rows.len()
        );

        Ok(FoldErrors {
            fold,
            rows: test_rows.to_vec(),
            errors,
            means,
        })
    }

    /// Polygenic scores for one fold that never used its held-out responses.
    ///
    /// Each training row is scored by a marker model fitted on the training
    /// rows outside its own fold, so in-sample overfit does not leak into the
    /// refit. Held-out rows are scored by a model fitted on every training row.
    /// Returns (training scores in `train_rows` order, held-out scores).
    fn cross_fitted_scores(
        &self,
        fold: usize,
        train_rows: &[usize],
        test_rows: &[usize],
        assignment: &[usize],
        x: &DMatrix<f64>,
        y: &DMatrix<f64>,
    ) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let ridge = self.fitter.options().ridge;
        let mut prs_train = DMatrix::zeros(train_rows.len(), y.ncols());

        for inner in (0..self.n_folds).filter(|&g| g != fold) {
            let (scored, fit_rows): (Vec<usize>, Vec<usize>) =
                (0..train_rows.len()).partition(|&r| assignment[train_rows[r]] == inner);
            if scored.is_empty() {
                continue;
            }
            let fit_rows: Vec<usize> = fit_rows.iter().map(|&r| train_rows[r]).collect();
            let score_rows: Vec<usize> = scored.iter().map(|&r| train_rows[r]).collect();

            let model = PrsModel::fit(&x.select_rows(&fit_rows), &y.select_rows(&fit_rows), ridge)?;
            let scores = model.scores(&x.select_rows(&score_rows))?;
            for (k, &r) in scored.iter().enumerate() {
                prs_train.set_row(r, &scores.row(k));
            }
        }

        let outer = PrsModel::fit(&x.select_rows(train_rows), &y.select_rows(train_rows), ridge)?;
        let prs_test = outer.scores(&x.select_rows(test_rows))?;
        Ok((prs_train, prs_test))
    }
}

/// Run k-fold cross-validation with the default graphical lasso solver.
pub fn cross_validate(
    x: &DMatrix<f64>,
    y: &DMatrix<f64>,
    n_folds: usize,
    loss: Loss,
    options: &PathOptions,
) -> Result<CvResult> {
    CrossValidator::new(n_folds)
        .loss(loss)
        .path_options(options.clone())
        .run(x, y)
}

/// Merge fold results into the mean and standard error curves.
///
/// Errors are scattered into one N × Q matrix per penalty (NaN where no fold
/// wrote). The mean runs over all filled entries. The standard error uses
/// the folds as replicates: the weighted spread of fold means around the
/// overall mean, with weights equal to each fold's filled entries, scaled
/// by 1 / (Q·N - 1).
fn reduce(
    folds: &[FoldErrors],
    n: usize,
    q: usize,
    n_rho: usize,
) -> (Vec<f64>, Vec<f64>, DMatrix<f64>) {
    let mut accum: Vec<DMatrix<f64>> = vec![DMatrix::from_element(n, q, f64::NAN); n_rho];
    let mut fold_means = DMatrix::from_element(folds.len(), n_rho, f64::NAN);

    for (f, fold) in folds.iter().enumerate() {
        for (j, err) in fold.errors.iter().enumerate() {
            for (r, &row) in fold.rows.iter().enumerate() {
                for l in 0..q {
                    accum[j][(row, l)] = err[(r, l)];
                }
            }
            fold_means[(f, j)] = fold.means[j];
        }
    }

    let dof = (q * n).saturating_sub(1).max(1) as f64;
    let mut mean_error = Vec::with_capacity(n_rho);
    let mut std_error = Vec::with_capacity(n_rho);
    for (j, acc) in accum.iter().enumerate() {
        let (sum, count) = acc
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        let mean = if count > 0 { sum / count as f64 } else { f64::NAN };

        let mut weighted_ss = 0.0;
        let mut total_weight = 0.0;
        for (f, fold) in folds.iter().enumerate() {
            let weight = fold.errors[j].iter().filter(|v| v.is_finite()).count() as f64;
            let m = fold_means[(f, j)];
            if weight > 0.0 && m.is_finite() {
                weighted_ss += weight * (m - mean).powi(2);
                total_weight += weight;
            }
        }
        let var = if total_weight > 0.0 {
            weighted_ss / total_weight / dof
        } else {
            f64::NAN
        };

        mean_error.push(mean);
        std_error.push(var.sqrt());
    }

    (mean_error, std_error, fold_means)
}

/// Intercept and slope of the least-squares line of `y` on `x`.
///
/// A predictor with zero variance gets slope 0 (predict the mean of `y`).
fn least_squares(x: DVectorView<'_, f64>, y: DVectorView<'_, f64>) -> (f64, f64) {
    let n = x.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean_x = x.mean();
    let mean_y = y.mean();

    let mut num = 0.0;
    let mut denom = 0.0;
    for i in 0..n {
        let dx = x[i] - mean_x;
        num += dx * (y[i] - mean_y);
        denom += dx * dx;
    }

    let slope = if denom < 1e-15 { 0.0 } else { num / denom };
    (mean_y - slope * mean_x, slope)
}

impl CvResult {
    /// Precision matrix of the full-data fit at `rho_min`.
    pub fn precision_min(&self) -> &DMatrix<f64> {
        &self.full_fit.precision[self.selection.index_min]
    }

    /// Precision matrix of the full-data fit at `rho_1se`.
    pub fn precision_1se(&self) -> &DMatrix<f64> {
        &self.full_fit.precision[self.selection.index_1se]
    }

    /// Trait clusters of the full-data fit at `rho_min`.
    pub fn clusters_min(&self, tol: f64) -> Vec<usize> {
        trait_clusters(self.precision_min(), tol)
    }

    /// Trait clusters of the full-data fit at `rho_1se`.
    pub fn clusters_1se(&self, tol: f64) -> Vec<usize> {
        trait_clusters(self.precision_1se(), tol)
    }

    /// Print a formatted summary of the cross-validation results.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("=== Cross-Validation Results ===\n\n");
        s.push_str(&format!("Number of folds: {}\n", self.fold_means.nrows()));
        s.push_str(&format!("Number of traits: {}\n", self.full_fit.n_traits()));
        s.push_str(&format!("Loss: {}\n\n", self.loss));

        s.push_str(&format!(
            "{:<6} {:<12} {:<12} {:<12}\n",
            "Index", "Rho", "Mean", "Std.Err"
        ));
        for j in 0..self.rho.len() {
            let mark = match (j == self.selection.index_min, j == self.selection.index_1se) {
                (true, true) => " min,1se",
                (true, false) => " min",
                (false, true) => " 1se",
                (false, false) => "",
            };
            s.push_str(&format!(
                "{:<6} {:<12.4e} {:<12.4} {:<12.4}{}\n",
                j, self.rho[j], self.mean_error[j], self.std_error[j], mark
            ));
        }

        s.push_str(&format!("\nrho.min: {:.4e}\n", self.rho_min));
        s.push_str(&format!("rho.1se: {:.4e}\n", self.rho_1se));
        s
    }
}
