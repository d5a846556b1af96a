//! Test utilities for arena-based testing.
//!
//! Bundles the arena, a compression session and a fresh netlist backend so
//! that tests can build and compress heaps in a few lines.
