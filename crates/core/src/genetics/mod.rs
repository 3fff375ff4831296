//! Polygenic scores from marker matrices.

pub mod prs;

pub use prs::PrsModel;
