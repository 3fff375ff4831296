//! Cross-validation of the penalty path and selection of the penalty.

pub mod crossval;
pub mod folds;
pub mod selection;

pub use crossval::{cross_validate, CrossValidator, CvResult, FoldErrors, Loss};
pub use folds::{fold_members, partition_folds};
pub use selection::{select_rho, Selection};
