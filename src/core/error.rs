// This module defines error types for the bit-heap compressor using the thiserror crate for
// idiomatic Rust error handling. BitHeapError is the main error enum covering the failure
// classes of a compression run: weights outside the heap range, invalid column ranges,
// bits that bookkeeping claims exist but cannot be found, compressor applications with a
// mismatched input vector, a timing window that never converges, the unimplemented optimal
// strategy, and failures reported by the backend. Each variant carries the weight, column
// or shape involved so the compiler-level caller gets a precise reason. The module also
// provides BitHeapResult<T> as a convenience alias for Result<T, BitHeapError>.

//! Error types for bit-heap construction and compression.
//!
//! Out-of-range weights passed to [`BitHeap::add_bit`](crate::core::BitHeap::add_bit)
//! are not errors: they are logged and ignored. Everything else below aborts the
//! operation that raised it.

use thiserror::Error;

/// Main error type for bit-heap operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BitHeapError {
    #[error("Weight {weight} out of bit heap range [{lsb}, {msb}] in {operation}")]
    WeightOutOfRange {
        operation: &'static str,
        weight: i32,
        lsb: i32,
        msb: i32,
    },

    #[error("Invalid range in {operation}: msb={msb}, lsb={lsb}")]
    InvalidRange {
        operation: &'static str,
        msb: i32,
        lsb: i32,
    },

    #[error("Bit with uid={uid} not found in column with weight={weight}")]
    BitNotFound { weight: i32, uid: u32 },

    #[error("Column with weight={weight} only contains {height} bits, but bit number={index} was requested")]
    ColumnTooShort {
        weight: i32,
        height: usize,
        index: usize,
    },

    #[error("Compressor {shape} expects {expected} bits in column {column}, got {found}")]
    CompressorInputMismatch {
        shape: String,
        column: usize,
        expected: usize,
        found: usize,
    },

    #[error("Invalid compressor shape {heights:?}: {reason}")]
    InvalidShape {
        heights: Vec<u32>,
        reason: &'static str,
    },

    #[error("Compression did not converge after {retries} window widenings (lowest open weight {open_weight})")]
    NonConvergence { retries: u32, open_weight: i32 },

    #[error("Compression strategy {strategy} is not implemented")]
    Unimplemented { strategy: &'static str },

    #[error("Cannot merge bit heaps belonging to different circuits ({ours} vs {theirs})")]
    MergeMismatch { ours: String, theirs: String },

    #[error("Unknown signal: {name}")]
    UnknownSignal { name: String },

    #[error("Backend failure: {reason}")]
    Backend { reason: String },
}

/// Result type alias for bit-heap operations.
pub type BitHeapResult<T> = Result<T, BitHeapError>;

impl BitHeapError {
    /// Shorthand for a range violation.
    pub fn out_of_range(operation: &'static str, weight: i32, lsb: i32, msb: i32) -> Self {
        BitHeapError::WeightOutOfRange {
            operation,
            weight,
            lsb,
            msb,
        }
    }

    /// Whether this error leaves the heap untouched and can be skipped by the caller.
    ///
    /// Only range violations qualify; invariant violations always abort the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BitHeapError::WeightOutOfRange { .. })
    }
}
