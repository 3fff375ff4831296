use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};
use crate::matrix::dense::{center_columns, column_means, solve_spd};

/// Per-trait ridge regression of responses on markers (or on scores).
///
/// Model, fitted jointly for all Q traits:
///
/// ```text
/// Y - ȳ = (X - x̄) B + E,   B̂ = (X_c'X_c + λI)⁻¹ X_c'Y_c
/// ```
///
/// The polygenic score of an individual is its linear predictor
/// `ȳ + (x - x̄) B̂`, one column per trait.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrsModel {
    /// Marker effects B̂ (P × Q).
    pub coefficients: DMatrix<f64>,
    /// Training column means of X, used to centre new genotypes.
    pub x_means: Vec<f64>,
    /// Training means of Y (intercepts).
    pub y_means: Vec<f64>,
    /// Ridge penalty λ.
    pub ridge: f64,
}

impl PrsModel {
    /// Fit marker effects for every trait with a known ridge penalty.
    pub fn fit(x: &DMatrix<f64>, y: &DMatrix<f64>, ridge: f64) -> Result<Self> {
        if x.nrows() != y.nrows() {
            return Err(NetError::InvalidArgument(format!(
                "design has {} rows but response has {}",
                x.nrows(),
                y.nrows()
            )));
        }
        if !(ridge.is_finite() && ridge >= 0.0) {
            return Err(NetError::InvalidArgument(format!(
                "ridge penalty must be finite and non-negative, got {}",
                ridge
            )));
        }

        let p = x.ncols();
        let x_means = column_means(x);
        let y_means = column_means(y);
        let xc = center_columns(x, &x_means);
        let yc = center_columns(y, &y_means);

        let xt = xc.transpose();
        let mut xtx = &xt * &xc;
        for i in 0..p {
            xtx[(i, i)] += ridge;
        }
        let xty = &xt * &yc;

        let coefficients = solve_spd(&xtx, &xty)
            .ok_or_else(|| NetError::singular("ridge normal equations X'X + λI"))?;

        Ok(Self {
            coefficients,
            x_means,
            y_means,
            ridge,
        })
    }

    /// Number of predictor columns the model expects.
    pub fn n_predictors(&self) -> usize {
        self.coefficients.nrows()
    }

    /// Number of traits.
    pub fn n_traits(&self) -> usize {
        self.coefficients.ncols()
    }

    /// Scores for new rows: ȳ + (X_new - x̄) B̂.
    pub fn scores(&self, x_new: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if x_new.ncols() != self.n_predictors() {
            return Err(NetError::InvalidArgument(format!(
                "expected {} predictor columns, got {}",
                self.n_predictors(),
                x_new.ncols()
            )));
        }
        let mut s = center_columns(x_new, &self.x_means) * &self.coefficients;
        for (l, &mu) in self.y_means.iter().enumerate() {
            s.column_mut(l).add_scalar_mut(mu);
        }
        Ok(s)
    }
}
