//! Counting primitives.
//!
//! A [`CompressorShape`] reduces a few bits of one or two adjacent columns to
//! their weighted population count. The [`CompressorCatalog`] fixes which
//! shapes a strategy may place and in which order it tries them.

pub mod catalog;
pub mod shape;

pub use catalog::{CompressorCatalog, STANDARD_HEIGHTS};
pub use shape::{CompactRow, CompressorShape};
