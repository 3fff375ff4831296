//! Sparse trait networks: penalty paths, graphical lasso fits, conditioning
//! and clustering of traits.

pub mod clusters;
pub mod conditional;
pub mod glasso;
pub mod path;
pub mod rho;

pub use clusters::{n_clusters, partial_correlations, trait_clusters};
pub use conditional::ConditionalAdjustment;
pub use glasso::{GraphicalLasso, PrecisionSolver};
pub use path::{fit_path, PathFit, PathFitter, PathOptions, ResponseType};
pub use rho::{rho_max, rho_sequence, validate_rho};
