pub mod diagnostics;
pub mod error;
pub mod genetics;
pub mod matrix;
pub mod network;
pub mod types;

pub use diagnostics::{cross_validate, CrossValidator, CvResult, Loss};
pub use error::{FitLocation, NetError, Result};
pub use network::{fit_path, PathFit, PathFitter, PathOptions, ResponseType};
