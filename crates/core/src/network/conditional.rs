use nalgebra::{DMatrix, DVector};

use crate::error::{NetError, Result};
use crate::matrix::dense::inverse_spd;

/// Conditioning of one trait on all others under a trait covariance Σ.
///
/// With Σ partitioned around the target trait l,
///
/// ```text
/// Σ = | Σ11  Σ12 |     Σ11: 1 × 1,  Σ12: 1 × (Q-1),  Σ22: (Q-1) × (Q-1)
///     | Σ21  Σ22 |
/// ```
///
/// the adjusted score for each row is `m_l + Σ12 Σ22⁻¹ m_{-l}'`, where
/// `m_{-l}` are the other traits' values in their original order.
#[derive(Debug, Clone)]
pub struct ConditionalAdjustment {
    target: usize,
    n_traits: usize,
    /// Σ12 Σ22⁻¹, indexed over the other traits.
    weights: DVector<f64>,
    sigma11: f64,
}

impl ConditionalAdjustment {
    /// Partition `sigma` around trait `target` and invert Σ22.
    pub fn new(sigma: &DMatrix<f64>, target: usize) -> Result<Self> {
        let q = sigma.nrows();
        if sigma.ncols() != q {
            return Err(NetError::InvalidArgument(format!(
                "covariance must be square, got {}x{}",
                sigma.nrows(),
                sigma.ncols()
            )));
        }
        if q < 2 {
            return Err(NetError::InvalidArgument(
                "conditioning needs at least two traits".into(),
            ));
        }
        if target >= q {
            return Err(NetError::InvalidArgument(format!(
                "target trait {} out of range for {} traits",
                target, q
            )));
        }

        let others: Vec<usize> = (0..q).filter(|&k| k != target).collect();
        let sigma22 = sigma.select_rows(&others).select_columns(&others);
        let sigma12 = DVector::from_iterator(q - 1, others.iter().map(|&k| sigma[(target, k)]));

        let sigma22_inv = inverse_spd(&sigma22).ok_or_else(|| {
            NetError::singular(format!("conditional covariance of traits other than {}", target))
                .for_trait(target)
        })?;
        // Σ22⁻¹ is symmetric, so (Σ12 Σ22⁻¹)' = Σ22⁻¹ Σ21.
        let weights = sigma22_inv * sigma12;

        Ok(Self {
            target,
            n_traits: q,
            weights,
            sigma11: sigma[(target, target)],
        })
    }

    /// Index of the conditioned trait.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Regression weights Σ12 Σ22⁻¹ over the other traits.
    pub fn weights(&self) -> &DVector<f64> {
        &self.weights
    }

    /// Conditional variance Σ11 - Σ12 Σ22⁻¹ Σ21 of the target trait.
    pub fn conditional_variance(&self, sigma: &DMatrix<f64>) -> f64 {
        let others = (0..self.n_traits).filter(|&k| k != self.target);
        let explained: f64 = others
            .zip(self.weights.iter())
            .map(|(k, w)| w * sigma[(self.target, k)])
            .sum();
        self.sigma11 - explained
    }

    /// Adjusted target series for a full N × Q score matrix.
    pub fn adjust(&self, m: &DMatrix<f64>) -> Result<DVector<f64>> {
        if m.ncols() != self.n_traits {
            return Err(NetError::InvalidArgument(format!(
                "score matrix has {} columns, expected {}",
                m.ncols(),
                self.n_traits
            )));
        }
        let others: Vec<usize> = (0..self.n_traits).filter(|&k| k != self.target).collect();
        let m_others = m.select_columns(&others);
        let target: DVector<f64> = m.column(self.target).into_owned();
        Ok(target + m_others * &self.weights)
    }

    /// Adjust a target series given the other traits' values (N × (Q-1)).
    pub fn adjust_others(
        &self,
        target: &DVector<f64>,
        m_others: &DMatrix<f64>,
    ) -> Result<DVector<f64>> {
        if m_others.ncols() != self.n_traits - 1 || m_others.nrows() != target.len() {
            return Err(NetError::InvalidArgument(format!(
                "expected {} x {} matrix of other traits, got {} x {}",
                target.len(),
                self.n_traits - 1,
                m_others.nrows(),
                m_others.ncols()
            )));
        }
        Ok(target + m_others * &self.weights)
    }
}
