//! bitheap - Weighted bit-heap compression for arithmetic circuits.
//!
//! A bit heap collects the partial products and addends of a multi-operand
//! sum as single weighted bits, each tagged with the time it becomes
//! available. Compression places counting primitives until every column holds
//! at most two bits, then a final carry-propagate adder produces the sum.
//!
//! # Primary Usage
//!
//! ```ignore
//! use bitheap::core::{BitHeap, CompressionSession};
//! use bitheap::netlist::NetlistBackend;
//! use bitheap::strategy::{StrategyConfig, StrategyKind};
//! use bumpalo::Bump;
//!
//! let arena = Bump::new();
//! let session = CompressionSession::new(&arena);
//! let mut backend = NetlistBackend::default();
//!
//! let x = backend.add_input("x", 8, false);
//! let y = backend.add_input("y", 8, false);
//! let mut heap = BitHeap::integer(&mut backend, 9, false, "sum")?;
//! heap.add_signal(&mut backend, x, 0)?;
//! heap.add_signal(&mut backend, y, 0)?;
//!
//! let config = StrategyConfig::default().with_kind(StrategyKind::MaxEfficiency);
//! let sum = heap.start_compression(&mut backend, &session, config)?;
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Bits, the heap, constants, the backend bridge and sessions
//! - [`compressor`] - Compressor shapes and the catalog
//! - [`strategy`] - The compression engine and its placement policies
//! - [`netlist`] - In-memory backend with bit-accurate evaluation

pub mod compressor;
pub mod core;
pub mod netlist;
pub mod strategy;

// Re-export common types from organized modules
pub use crate::core::{
    // Heap
    Bit, BitHeap, BitId, BitStatus, ArrivalTime, RemoveFrom,
    // Backend bridge
    BitExpr, CircuitBackend, Primitive, SignalId, SignalInfo, TechnologyParams, WireExpr,
    // Errors
    BitHeapError, BitHeapResult,
    // Session management
    CompressionSession, SessionStats,
};
pub use compressor::{CompressorCatalog, CompressorShape};
pub use netlist::NetlistBackend;
pub use strategy::{CompressionStrategy, Solution, SolutionStatus, StrategyConfig, StrategyKind};
