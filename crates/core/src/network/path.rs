//! Precision-matrix path over a sequence of graphical lasso penalties.
//!
//! A path fit regresses every trait on the design (markers, or scores when
//! refitting inside cross-validation) to obtain polygenic scores, then
//! estimates one sparse trait precision matrix per penalty from the
//! covariance of those scores. The network therefore describes genetic
//! rather than phenotypic correlation: it moves with the design even when
//! the responses stay fixed.

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::genetics::PrsModel;
use crate::matrix::dense::{empirical_covariance, inverse_spd, symmetrize};
use crate::matrix::sparse::sparse_from_symmetric;
use crate::network::clusters::{partial_correlations, trait_clusters};
use crate::network::conditional::ConditionalAdjustment;
use crate::network::glasso::{GraphicalLasso, PrecisionSolver};
use crate::network::rho::{rho_sequence, validate_rho};
use crate::types::SparseMat;

/// Options controlling the penalty path and the score regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathOptions {
    /// Caller-supplied penalties (strictly decreasing). `None` derives a path
    /// from the data.
    pub rho: Option<Vec<f64>>,
    /// Number of generated penalties (default: 40).
    pub nrho: usize,
    /// Log-spaced rather than linearly spaced generated path.
    pub log_spacing: bool,
    /// Smallest generated penalty as a fraction of the largest (default: 1e-3).
    pub rho_min_ratio: f64,
    /// Ridge penalty for the score regression (default: 1.0).
    pub ridge: f64,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            rho: None,
            nrho: 40,
            log_spacing: false,
            rho_min_ratio: 1e-3,
            ridge: 1.0,
        }
    }
}

impl PathOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed penalty sequence.
    pub fn rho(mut self, rho: Vec<f64>) -> Self {
        self.rho = Some(rho);
        self
    }

    /// Set the number of generated penalties.
    pub fn nrho(mut self, nrho: usize) -> Self {
        self.nrho = nrho;
        self
    }

    /// Toggle log spacing of the generated path.
    pub fn log_spacing(mut self, log_spacing: bool) -> Self {
        self.log_spacing = log_spacing;
        self
    }

    /// Set the smallest-to-largest ratio of the generated path.
    pub fn rho_min_ratio(mut self, ratio: f64) -> Self {
        self.rho_min_ratio = ratio;
        self
    }

    /// Set the ridge penalty of the score regression.
    pub fn ridge(mut self, ridge: f64) -> Self {
        self.ridge = ridge;
        self
    }

    /// Validate everything that can be checked without data.
    pub(crate) fn validate(&self) -> Result<()> {
        match &self.rho {
            Some(rho) => validate_rho(rho)?,
            None => {
                if self.nrho < 2 {
                    return Err(NetError::InvalidArgument(format!(
                        "nrho must be at least 2, got {}",
                        self.nrho
                    )));
                }
                if !(self.rho_min_ratio.is_finite()
                    && self.rho_min_ratio > 0.0
                    && self.rho_min_ratio < 1.0)
                {
                    return Err(NetError::InvalidArgument(format!(
                        "rho_min_ratio must lie in (0, 1), got {}",
                        self.rho_min_ratio
                    )));
                }
            }
        }
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            return Err(NetError::InvalidArgument(format!(
                "ridge penalty must be finite and non-negative, got {}",
                self.ridge
            )));
        }
        Ok(())
    }
}

/// Scale on which `PathFit::predict` returns values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResponseType {
    /// Linear predictor.
    #[default]
    Link,
}

/// Fits precision-matrix paths with a given solver.
pub struct PathFitter<S: PrecisionSolver = GraphicalLasso> {
    options: PathOptions,
    solver: S,
}

impl PathFitter<GraphicalLasso> {
    pub fn new(options: PathOptions) -> Self {
        Self {
            options,
            solver: GraphicalLasso::default(),
        }
    }
}

impl<S: PrecisionSolver> PathFitter<S> {
    /// Use a different precision solver.
    pub fn with_solver<T: PrecisionSolver>(self, solver: T) -> PathFitter<T> {
        PathFitter {
            options: self.options,
            solver,
        }
    }

    /// Replace the path options, keeping the solver.
    pub fn with_options(mut self, options: PathOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PathOptions {
        &self.options
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    /// Fit the full penalty path on design `x` (N × P) and responses `y` (N × Q).
    pub fn fit(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<PathFit> {
        self.options.validate()?;
        check_dimensions(x, y)?;

        let (model, prs) = self.regress(x, y)?;
        let s = empirical_covariance(&prs);
        let rho = match &self.options.rho {
            Some(rho) => rho.clone(),
            None => rho_sequence(
                &s,
                self.options.nrho,
                self.options.rho_min_ratio,
                self.options.log_spacing,
            )?,
        };
        self.fit_with(model, prs, s, rho)
    }

    /// Refit on new data along an already fixed penalty path.
    pub fn refit(&self, x: &DMatrix<f64>, y: &DMatrix<f64>, rho: &[f64]) -> Result<PathFit> {
        validate_rho(rho)?;
        check_dimensions(x, y)?;

        let (model, prs) = self.regress(x, y)?;
        let s = empirical_covariance(&prs);
        self.fit_with(model, prs, s, rho.to_vec())
    }

    /// Score regression and the in-sample scores it produces.
    fn regress(&self, x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<(PrsModel, DMatrix<f64>)> {
        let model = PrsModel::fit(x, y, self.options.ridge)?;
        let prs = model.scores(x)?;
        Ok((model, prs))
    }

    fn fit_with(
        &self,
        model: PrsModel,
        prs: DMatrix<f64>,
        s: DMatrix<f64>,
        rho: Vec<f64>,
    ) -> Result<PathFit> {
        log::debug!(
            "Fitting precision path: n = {}, q = {}, {} penalties ({:.4e} .. {:.4e})",
            prs.nrows(),
            prs.ncols(),
            rho.len(),
            rho[0],
            rho[rho.len() - 1]
        );

        let fits: Vec<(DMatrix<f64>, DMatrix<f64>)> = rho
            .par_iter()
            .enumerate()
            .map(|(j, &r)| self.fit_one(&s, r).map_err(|e| e.at_rho(j)))
            .collect::<Result<Vec<_>>>()?;
        let (precision, covariance): (Vec<_>, Vec<_>) = fits.into_iter().unzip();

        Ok(PathFit {
            rho,
            prs,
            model,
            score_covariance: s,
            precision,
            covariance,
        })
    }

    /// Precision matrix and its inverse for one penalty.
    fn fit_one(&self, s: &DMatrix<f64>, rho: f64) -> Result<(DMatrix<f64>, DMatrix<f64>)> {
        let theta = symmetrize(&self.solver.solve(s, rho)?);
        if let Some(j) = (0..theta.nrows()).find(|&j| !(theta[(j, j)] > 0.0)) {
            return Err(NetError::singular(format!(
                "precision matrix diagonal entry {} is {}",
                j,
                theta[(j, j)]
            )));
        }
        let sigma = inverse_spd(&theta)
            .ok_or_else(|| NetError::singular("inverse of fitted precision matrix"))?;
        Ok((theta, sigma))
    }
}

/// Fit a precision path with the default graphical lasso solver.
pub fn fit_path(x: &DMatrix<f64>, y: &DMatrix<f64>, options: &PathOptions) -> Result<PathFit> {
    PathFitter::new(options.clone()).fit(x, y)
}

pub(crate) fn check_dimensions(x: &DMatrix<f64>, y: &DMatrix<f64>) -> Result<()> {
    if x.nrows() != y.nrows() {
        return Err(NetError::InvalidArgument(format!(
            "design has {} rows but response has {}",
            x.nrows(),
            y.nrows()
        )));
    }
    if y.nrows() < 2 {
        return Err(NetError::InvalidArgument(format!(
            "need at least 2 observations, got {}",
            y.nrows()
        )));
    }
    if x.ncols() == 0 || y.ncols() == 0 {
        return Err(NetError::InvalidArgument(format!(
            "design and response need at least one column (got {} and {})",
            x.ncols(),
            y.ncols()
        )));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(NetError::InvalidArgument(
            "design and response must be finite".into(),
        ));
    }
    Ok(())
}

/// A fitted precision path. All per-penalty vectors line up with `rho`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathFit {
    /// Penalty path, strictly decreasing.
    pub rho: Vec<f64>,
    /// In-sample polygenic scores (N × Q).
    pub prs: DMatrix<f64>,
    /// Score regression (coefficients and centring).
    pub model: PrsModel,
    /// Covariance of `prs` (divisor N); the graphical lasso input.
    pub score_covariance: DMatrix<f64>,
    /// Precision matrix per penalty (Q × Q, exactly symmetric).
    pub precision: Vec<DMatrix<f64>>,
    /// Covariance matrix (inverse precision) per penalty.
    pub covariance: Vec<DMatrix<f64>>,
}

impl PathFit {
    pub fn n_rho(&self) -> usize {
        self.rho.len()
    }

    pub fn n_traits(&self) -> usize {
        self.prs.ncols()
    }

    /// Raw polygenic scores for new rows of the design.
    pub fn scores(&self, new_x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        self.model.scores(new_x)
    }

    /// Per-penalty predictions for new rows, one N_new × Q matrix per rho.
    ///
    /// Column l holds trait l's score adjusted for the other traits under
    /// that penalty's fitted covariance. With a single trait there is
    /// nothing to condition on and the raw score is returned.
    pub fn predict(&self, new_x: &DMatrix<f64>, response: ResponseType) -> Result<Vec<DMatrix<f64>>> {
        let scores = self.scores(new_x)?;
        match response {
            ResponseType::Link => self
                .covariance
                .iter()
                .enumerate()
                .map(|(j, sigma)| conditional_scores(sigma, &scores).map_err(|e| e.at_rho(j)))
                .collect(),
        }
    }

    /// Sparse copy of the precision matrix at penalty index `j`.
    pub fn sparse_precision(&self, j: usize, tol: f64) -> Option<SparseMat> {
        self.precision.get(j).map(|theta| sparse_from_symmetric(theta, tol))
    }

    /// Partial correlations implied by the precision matrix at index `j`.
    pub fn partial_correlations(&self, j: usize) -> Option<DMatrix<f64>> {
        self.precision.get(j).map(partial_correlations)
    }

    /// Trait cluster labels at penalty index `j`.
    pub fn clusters(&self, j: usize, tol: f64) -> Option<Vec<usize>> {
        self.precision.get(j).map(|theta| trait_clusters(theta, tol))
    }
}

/// Condition every column of `scores` on the others under `sigma`.
fn conditional_scores(sigma: &DMatrix<f64>, scores: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let q = scores.ncols();
    if q < 2 {
        return Ok(scores.clone());
    }
    let mut out = DMatrix::zeros(scores.nrows(), q);
    for l in 0..q {
        let cond = ConditionalAdjustment::new(sigma, l)?;
        out.set_column(l, &cond.adjust(scores)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hash-style uniform draw in [0, 1).
    fn uniform(k: usize) -> f64 {
        ((k as f64 * 12.9898).sin() * 43758.5453).fract().abs()
    }

    /// Deterministic small dataset: 12 individuals, 3 markers, 3 traits.
    fn toy() -> (DMatrix<f64>, DMatrix<f64>) {
        let x = DMatrix::from_fn(12, 3, |i, j| (uniform(i * 3 + j + 1) * 3.0).floor());
        let y = DMatrix::from_fn(12, 3, |i, j| {
            let g = x[(i, 0)];
            let noise = uniform(100 + i * 3 + j) - 0.5;
            match j {
                0 => g + noise,
                1 => 0.8 * g + noise,
                _ => noise,
            }
        });
        (x, y)
    }

    #[test]
    fn test_path_lengths_match_rho() {
        let (x, y) = toy();
        let fit = fit_path(&x, &y, &PathOptions::new().nrho(6)).unwrap();
        assert_eq!(fit.rho.len(), 6);
        assert_eq!(fit.precision.len(), 6);
        assert_eq!(fit.covariance.len(), 6);
        assert!(fit.rho.windows(2).all(|w| w[1] < w[0]));
        assert_eq!(fit.prs.shape(), (12, 3));
    }

    #[test]
    fn test_precision_invariants() {
        let (x, y) = toy();
        let fit = fit_path(&x, &y, &PathOptions::new().nrho(5).log_spacing(true)).unwrap();
        for theta in &fit.precision {
            assert_eq!(theta, &theta.transpose());
            for j in 0..3 {
                assert!(theta[(j, j)] > 0.0);
            }
        }
        // Largest penalty gives a diagonal precision matrix.
        let first = &fit.precision[0];
        assert_eq!(first[(0, 1)], 0.0);
        assert_eq!(first[(0, 2)], 0.0);
        assert_eq!(first[(1, 2)], 0.0);
    }

    #[test]
    fn test_user_rho_is_kept() {
        let (x, y) = toy();
        let fit = fit_path(&x, &y, &PathOptions::new().rho(vec![0.3, 0.2, 0.1])).unwrap();
        assert_eq!(fit.rho, vec![0.3, 0.2, 0.1]);
    }

    #[test]
    fn test_invalid_user_rho() {
        let (x, y) = toy();
        for rho in [vec![], vec![0.1], vec![0.1, 0.2], vec![0.2, -0.1]] {
            let res = fit_path(&x, &y, &PathOptions::new().rho(rho));
            assert!(matches!(res, Err(NetError::InvalidArgument(_))));
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let (x, _) = toy();
        let y = DMatrix::zeros(5, 2);
        assert!(matches!(
            fit_path(&x, &y, &PathOptions::default()),
            Err(NetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = toy();
        let opts = PathOptions::new().nrho(8);
        let a = fit_path(&x, &y, &opts).unwrap();
        let b = fit_path(&x, &y, &opts).unwrap();
        assert_eq!(a.rho, b.rho);
        assert_eq!(a.precision, b.precision);
        assert_eq!(a.covariance, b.covariance);
    }

    #[test]
    fn test_refit_keeps_frozen_path() {
        let (x, y) = toy();
        let full = fit_path(&x, &y, &PathOptions::new().nrho(5)).unwrap();
        let sub_x = full.prs.rows(0, 9).into_owned();
        let sub_y = y.rows(0, 9).into_owned();
        let fitter = PathFitter::new(PathOptions::new().nrho(5));
        let fold = fitter.refit(&sub_x, &sub_y, &full.rho).unwrap();
        assert_eq!(fold.rho, full.rho);
        assert_eq!(fold.precision.len(), 5);
        assert_eq!(fold.model.coefficients.shape(), (3, 3));
    }

    #[test]
    fn test_predict_shapes() {
        let (x, y) = toy();
        let fit = fit_path(&x, &y, &PathOptions::new().nrho(4)).unwrap();
        let new_x = x.rows(0, 5).into_owned();
        let pred = fit.predict(&new_x, ResponseType::Link).unwrap();
        assert_eq!(pred.len(), 4);
        for p in &pred {
            assert_eq!(p.shape(), (5, 3));
        }
        // At the diagonal end of the path predictions are the raw scores.
        let scores = fit.scores(&new_x).unwrap();
        for i in 0..5 {
            for l in 0..3 {
                approx::assert_relative_eq!(pred[0][(i, l)], scores[(i, l)], epsilon = 1e-12);
            }
        }
        assert!(fit.predict(&DMatrix::zeros(2, 4), ResponseType::Link).is_err());
    }

    #[test]
    fn test_single_trait_predict_skips_conditioning() {
        let (x, y) = toy();
        let y1 = y.columns(0, 1).into_owned();
        let fit = fit_path(&x, &y1, &PathOptions::new().nrho(3)).unwrap();
        let pred = fit.predict(&x, ResponseType::Link).unwrap();
        assert_eq!(pred[2], fit.prs);
    }

    #[test]
    fn test_network_follows_the_design() {
        let (x, y) = toy();
        let unrelated = DMatrix::from_fn(12, 3, |i, j| (uniform(300 + i * 3 + j) * 3.0).floor());
        let row_index = DMatrix::from_fn(12, 1, |i, _| i as f64);
        let opts = PathOptions::new().nrho(5);

        let a = fit_path(&x, &y, &opts).unwrap();
        let b = fit_path(&unrelated, &y, &opts).unwrap();
        // One predictor gives rank-one scores; stay away from tiny penalties.
        let c = fit_path(&row_index, &y, &opts.clone().rho_min_ratio(0.5)).unwrap();

        assert_eq!(a.score_covariance, crate::matrix::dense::empirical_covariance(&a.prs));
        assert_ne!(a.rho[0], b.rho[0]);
        assert_ne!(a.precision, b.precision);
        assert_ne!(a.precision, c.precision);
        assert_ne!(b.precision, c.precision);
    }

    struct FailingSolver;

    impl PrecisionSolver for FailingSolver {
        fn solve(&self, s: &DMatrix<f64>, rho: f64) -> Result<DMatrix<f64>> {
            if rho < 0.15 {
                Ok(DMatrix::zeros(s.nrows(), s.ncols()))
            } else {
                GraphicalLasso::new().solve(s, rho)
            }
        }
    }

    #[test]
    fn test_singular_precision_reports_rho_index() {
        let (x, y) = toy();
        let fitter = PathFitter::new(PathOptions::new().rho(vec![0.3, 0.2, 0.1])).with_solver(FailingSolver);
        let err = fitter.fit(&x, &y).unwrap_err();
        assert!(matches!(err, NetError::SingularFit { .. }));
        assert_eq!(err.location().unwrap().rho_index, Some(2));
        assert_eq!(err.location().unwrap().fold, None);
    }
}
