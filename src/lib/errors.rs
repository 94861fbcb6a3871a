//! Custom error types for bayescall operations.

use thiserror::Error;

/// Result type alias for bayescall operations
pub type Result<T> = std::result::Result<T, CallerError>;

/// Error type for bayescall operations
#[derive(Error, Debug)]
pub enum CallerError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// Fraction-valued parameter outside [min, max]
    #[error("Invalid fraction for '{parameter}': {value} (must be between {min} and {max})")]
    InvalidFraction {
        /// The parameter name
        parameter: String,
        /// The invalid value
        value: f64,
        /// Minimum valid value
        min: f64,
        /// Maximum valid value
        max: f64,
    },

    /// Invalid quality threshold
    #[error("Invalid quality threshold: {value} (must be between 0 and {max})")]
    InvalidQuality {
        /// The invalid quality value
        value: u8,
        /// Maximum valid value (93 for standard Phred encodings)
        max: u8,
    },

    /// Malformed pileup input
    #[error("Invalid pileup input at line {line}: {reason}")]
    InvalidPileup {
        /// 1-based line number of the offending record
        line: u64,
        /// Explanation of the problem
        reason: String,
    },

    /// Observation stream out of reference-coordinate order
    #[error("Pileup out of order at line {line}: {chrom}:{pos} seen after {prev_chrom}:{prev_pos}")]
    PileupOutOfOrder {
        /// 1-based line number of the offending record
        line: u64,
        /// Chromosome of the offending record
        chrom: String,
        /// Position of the offending record
        pos: u64,
        /// Chromosome of the previous record
        prev_chrom: String,
        /// Position of the previous record
        prev_pos: u64,
    },
}
