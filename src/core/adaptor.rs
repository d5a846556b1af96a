// This module defines the CircuitBackend trait, which serves as the bridge between the bit-heap
// core and the surrounding circuit compiler. The core never emits hardware text itself: it
// asks the backend for the arrival time of a signal, the technology timing parameters and the
// shape of a named multi-bit signal, and it asks the backend to declare wires and instantiate
// primitives (compressors and the final adder). The handles returned are opaque SignalIds that
// the core stores in its bits and hands back later. WireExpr is the small expression language
// the core uses to describe what a declared wire or a primitive input is made of: a single bit
// of a signal (optionally inverted), a constant, or a concatenation listed lsb first.

//! Backend responsibilities.
//!
//! The backend is the glue between the bit heap and the code generator and
//! pipeline scheduler of the surrounding compiler. The core assumes:
//! - Every signal handle has a well-defined arrival time once it has been declared.
//! - A primitive output's arrival time is decided by the backend's scheduler.
//! - Declared names are unique; the core derives them from heap and bit uids.
//!
//! [`crate::netlist::NetlistBackend`] is the in-memory implementation used by the
//! driver binary and the tests.

use std::fmt;

use super::bit::ArrivalTime;
use super::error::BitHeapResult;
use crate::compressor::CompressorShape;

/// Opaque handle of a signal owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(pub u32);

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Shape of a multi-bit signal as known to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalInfo {
    pub name: String,
    pub width: u32,
    pub is_signed: bool,
    /// Weight of the most significant bit (fixed-point format).
    pub msb: i32,
    /// Weight of the least significant bit (fixed-point format).
    pub lsb: i32,
}

impl SignalInfo {
    /// Integer signal of the given width, weights `[width-1, 0]`.
    pub fn integer(name: impl Into<String>, width: u32, is_signed: bool) -> Self {
        Self {
            name: name.into(),
            width,
            is_signed,
            msb: width as i32 - 1,
            lsb: 0,
        }
    }
}

/// FPGA family, only used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Vendor {
    #[default]
    Generic,
    Xilinx,
    Intel,
}

/// Timing model of the target, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TechnologyParams {
    pub lut_delay: f64,
    pub wire_delay: f64,
    pub clock_period: f64,
    pub lut_inputs: u32,
    pub vendor: Vendor,
}

impl Default for TechnologyParams {
    fn default() -> Self {
        Self {
            lut_delay: 0.5,
            wire_delay: 0.3,
            clock_period: 2.5,
            lut_inputs: 6,
            vendor: Vendor::Generic,
        }
    }
}

impl TechnologyParams {
    /// Duration of one compression stage: a LUT plus local routing.
    pub fn compressor_delay(&self) -> f64 {
        self.lut_delay + self.wire_delay
    }

    /// Number of compression stages that fit in one clock cycle (at least one).
    pub fn stages_per_cycle(&self) -> u32 {
        let stages = (self.clock_period / self.compressor_delay()).floor();
        if stages < 1.0 {
            1
        } else {
            stages as u32
        }
    }

    /// Absolute time of an arrival, `cycle * period + critical_path`.
    pub fn absolute(&self, arrival: ArrivalTime) -> f64 {
        arrival.cycle as f64 * self.clock_period + arrival.critical_path
    }
}

/// One bit as seen by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitExpr {
    /// Bit `index` of `signal`.
    Signal { signal: SignalId, index: u32 },
    /// Complement of bit `index` of `signal`.
    Inverted { signal: SignalId, index: u32 },
    /// Constant one.
    One,
}

impl BitExpr {
    pub fn bit(signal: SignalId, index: u32) -> Self {
        BitExpr::Signal { signal, index }
    }

    pub fn inverted(signal: SignalId, index: u32) -> Self {
        BitExpr::Inverted { signal, index }
    }

    /// Signal this bit is read from, if any.
    pub fn signal(&self) -> Option<SignalId> {
        match *self {
            BitExpr::Signal { signal, .. } | BitExpr::Inverted { signal, .. } => Some(signal),
            BitExpr::One => None,
        }
    }
}

impl fmt::Display for BitExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitExpr::Signal { signal, index } => write!(f, "{signal}({index})"),
            BitExpr::Inverted { signal, index } => write!(f, "not({signal}({index}))"),
            BitExpr::One => write!(f, "'1'"),
        }
    }
}

/// Right-hand side of a declared wire or a primitive input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireExpr {
    Zero,
    Bit(BitExpr),
    /// Concatenation, least significant element first.
    Concat(Vec<WireExpr>),
}

impl WireExpr {
    /// Concatenation of single bits, least significant first; `None` is a constant zero.
    pub fn from_bits<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = Option<BitExpr>>,
    {
        WireExpr::Concat(
            bits.into_iter()
                .map(|b| b.map_or(WireExpr::Zero, WireExpr::Bit))
                .collect(),
        )
    }

    /// Number of bits this expression produces.
    pub fn width(&self) -> u32 {
        match self {
            WireExpr::Zero | WireExpr::Bit(_) => 1,
            WireExpr::Concat(parts) => parts.iter().map(WireExpr::width).sum(),
        }
    }

    /// Every bit expression referenced, in order.
    pub fn bits(&self) -> Vec<BitExpr> {
        let mut out = Vec::new();
        self.collect_bits(&mut out);
        out
    }

    fn collect_bits(&self, out: &mut Vec<BitExpr>) {
        match self {
            WireExpr::Zero => {}
            WireExpr::Bit(b) => out.push(*b),
            WireExpr::Concat(parts) => parts.iter().for_each(|p| p.collect_bits(out)),
        }
    }
}

/// Hardware block the core asks the backend to instantiate.
#[derive(Debug, Clone, Copy)]
pub enum Primitive<'a> {
    /// A counting primitive; one input port per relative column.
    Compressor(&'a CompressorShape),
    /// Carry-propagate adder of `width` bits. Inputs are two rows plus a single bit
    /// injected at the most significant position; the carry out is discarded.
    Adder { width: u32 },
}

/// Bridge between the bit-heap core and the circuit compiler.
pub trait CircuitBackend {
    /// Arrival time currently associated with a signal.
    fn arrival_time(&self, signal: SignalId) -> ArrivalTime;

    /// Timing model of the target.
    fn technology(&self) -> TechnologyParams;

    /// Width, signedness and format of a declared signal.
    fn lookup_signal(&self, signal: SignalId) -> BitHeapResult<SignalInfo>;

    /// Declare a new signal and wire it to `rhs`.
    fn declare_and_wire(
        &mut self,
        name: &str,
        width: u32,
        rhs: WireExpr,
    ) -> BitHeapResult<SignalId>;

    /// Instantiate a primitive and return the handle of its output.
    fn instantiate_primitive(
        &mut self,
        primitive: Primitive<'_>,
        inputs: &[WireExpr],
    ) -> BitHeapResult<SignalId>;

    /// Fresh identifier, unique within this backend.
    fn fresh_uid(&mut self) -> u32;

    /// Area of a compressor in LUTs. One LUT per output bit unless the backend knows better.
    fn primitive_area(&self, shape: &CompressorShape) -> f64 {
        shape.output_width() as f64
    }

    /// Arrival time of a single bit expression.
    fn bit_arrival(&self, bit: &BitExpr) -> ArrivalTime {
        match bit.signal() {
            Some(signal) => self.arrival_time(signal),
            None => ArrivalTime::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_expr_width_and_bits() {
        let a = SignalId(1);
        let expr = WireExpr::from_bits([Some(BitExpr::bit(a, 0)), None, Some(BitExpr::One)]);
        assert_eq!(expr.width(), 3);
        assert_eq!(expr.bits(), vec![BitExpr::bit(a, 0), BitExpr::One]);
    }

    #[test]
    fn test_stages_per_cycle() {
        let tech = TechnologyParams::default();
        assert!((tech.compressor_delay() - 0.8).abs() < 1e-9);
        assert_eq!(tech.stages_per_cycle(), 3);

        let slow = TechnologyParams {
            clock_period: 0.1,
            ..TechnologyParams::default()
        };
        assert_eq!(slow.stages_per_cycle(), 1);
    }

    #[test]
    fn test_absolute_arrival() {
        let tech = TechnologyParams::default();
        let t = ArrivalTime::new(2, 0.25);
        assert!((tech.absolute(t) - 5.25).abs() < 1e-9);
    }
}
