use std::fmt;

use thiserror::Error;

/// Where inside a path fit or cross-validation run a numeric failure occurred.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FitLocation {
    /// Fold index (0-based); `None` for the full-data fit.
    pub fold: Option<usize>,
    /// Index into the rho path.
    pub rho_index: Option<usize>,
    /// Trait (response column) index.
    pub trait_index: Option<usize>,
}

impl fmt::Display for FitLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fold {
            Some(fold) => write!(f, "fold {}", fold)?,
            None => write!(f, "full fit")?,
        }
        if let Some(j) = self.rho_index {
            write!(f, ", rho index {}", j)?;
        }
        if let Some(l) = self.trait_index {
            write!(f, ", trait {}", l)?;
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum NetError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Singular matrix encountered in {context} ({location})")]
    SingularFit {
        context: String,
        location: FitLocation,
    },

    #[error("Precision solver did not converge after {iterations} iterations ({location})")]
    NumericDivergence {
        iterations: usize,
        location: FitLocation,
    },

    #[error("Could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl NetError {
    pub(crate) fn singular(context: impl Into<String>) -> Self {
        NetError::SingularFit {
            context: context.into(),
            location: FitLocation::default(),
        }
    }

    /// Tag a numeric failure with the rho index it happened at.
    pub fn at_rho(self, rho_index: usize) -> Self {
        self.relocate(|loc| loc.rho_index = Some(rho_index))
    }

    /// Tag a numeric failure with the trait it happened for.
    pub fn for_trait(self, trait_index: usize) -> Self {
        self.relocate(|loc| loc.trait_index = Some(trait_index))
    }

    /// Tag a numeric failure with the fold it happened in.
    pub fn in_fold(self, fold: usize) -> Self {
        self.relocate(|loc| loc.fold = Some(fold))
    }

    /// Location of a numeric failure, if this is one.
    pub fn location(&self) -> Option<&FitLocation> {
        match self {
            NetError::SingularFit { location, .. }
            | NetError::NumericDivergence { location, .. } => Some(location),
            _ => None,
        }
    }

    fn relocate(mut self, update: impl FnOnce(&mut FitLocation)) -> Self {
        match &mut self {
            NetError::SingularFit { location, .. }
            | NetError::NumericDivergence { location, .. } => update(location),
            _ => {}
        }
        self
    }
}

pub type Result<T> = std::result::Result<T, NetError>;
