//! Errors
//!
//! Custom error types used throughout the `histree` crate.
use thiserror::Error;

/// Errors that can occur while growing or persisting a tree.
///
/// Running out of splittable nodes is the grow loop's normal termination
/// signal and is never reported through this type.
#[derive(Debug, Error)]
pub enum TreeGrowError {
    /// First value is the name of the parameter, second is expected, third is what was passed.
    #[error("Invalid parameter value passed for {0}, expected {1} but {2} provided.")]
    InvalidParameter(String, String, String),
    /// A bin value in the feature matrix is outside of the configured range.
    #[error("Feature {1} holds bin {0} at row {2}, but n_bins is {3}.")]
    BinOutOfRange(u8, usize, usize, usize),
    /// Gradient array not aligned with the feature matrix.
    #[error("Gradient array has {0} values, but the feature matrix has {1} rows.")]
    MisalignedGradients(usize, usize),
    /// Hessian array not aligned with the feature matrix.
    #[error("Hessian array has {0} values, expected {1} or a single broadcast constant.")]
    MisalignedHessians(usize, usize),
    /// Unable to write predictor to file.
    #[error("Unable to write predictor to file: {0}")]
    UnableToWrite(String),
    /// Unable to read predictor from file.
    #[error("Unable to read predictor from a file {0}")]
    UnableToRead(String),
}
