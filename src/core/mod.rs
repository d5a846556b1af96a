// This module serves as the central hub for the bit-heap core, providing the building blocks
// shared by every compression strategy and every backend. It exports and organizes the key
// subsystems: error handling (BitHeapError and its result alias), bits and their arrival times,
// the BitHeap data structure with its constant accumulator, the two's-complement constant
// folding helpers, the CircuitBackend trait through which the core declares wires and
// instantiates primitives, and arena-based session management with compression statistics.

//! Core bit-heap infrastructure.
//!
//! # Key Components
//!
//! ## Bit heap (`heap`, `bit`)
//! - Arena of bits referenced by index from arrival-sorted columns
//! - Arbitrary-precision constant accumulator, lowered only before compression
//!
//! ## Constant folding (`sign_extension`)
//! - Sign extension and negation as runs of constant ones
//!
//! ## Backend bridge (`adaptor`)
//! - Arrival times, technology parameters and signal lookup
//! - Wire declaration and primitive instantiation
//!
//! ## Session Management (`session`)
//! - Arena-based name interning using `bumpalo`
//! - Compression statistics

pub mod adaptor;
pub mod bit;
pub mod error;
pub mod heap;
pub mod session;
pub mod sign_extension;
pub mod test_utils;

pub use adaptor::{
    BitExpr,
    CircuitBackend,
    Primitive,
    SignalId,
    SignalInfo,
    TechnologyParams,
    Vendor,
    WireExpr,
};

pub use bit::{ArrivalTime, Bit, BitId, BitStatus};

pub use error::{BitHeapError, BitHeapResult};

pub use heap::{BitHeap, RemoveFrom};

pub use session::{CompressionSession, SessionStats};
