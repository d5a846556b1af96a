//! Single bits of a bit heap.
//!
//! A [`Bit`] lives in the heap's arena and is referred to everywhere else by
//! its [`BitId`]. Columns only hold ids, so removing a bit from a column never
//! invalidates the bit itself: it stays reachable from the heap history.

use std::cmp::Ordering;
use std::fmt;

use super::adaptor::{BitExpr, SignalId};

/// Index of a bit in the owning heap's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitId(pub u32);

impl BitId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Processing state of a bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitStatus {
    /// Available for compression.
    Free,
    /// Selected by a compressor that has not been emitted yet.
    BeingCompressed,
    /// Consumed; will be garbage collected from its column.
    Compressed,
}

/// Simulated hardware time at which a wire becomes valid.
///
/// Ordered lexicographically on `(cycle, critical_path)`.
#[derive(Debug, Clone, Copy)]
pub struct ArrivalTime {
    pub cycle: u32,
    pub critical_path: f64,
}

impl ArrivalTime {
    pub const ZERO: ArrivalTime = ArrivalTime {
        cycle: 0,
        critical_path: 0.0,
    };

    pub fn new(cycle: u32, critical_path: f64) -> Self {
        debug_assert!(critical_path >= 0.0, "negative critical path");
        Self {
            cycle,
            critical_path,
        }
    }

    /// The later of two arrivals.
    pub fn latest(self, other: ArrivalTime) -> ArrivalTime {
        if other > self {
            other
        } else {
            self
        }
    }

    /// Arrival after a combinational delay, rolling into the next cycle when the
    /// clock period would be exceeded.
    pub fn delayed(self, delay: f64, clock_period: f64) -> ArrivalTime {
        let cp = self.critical_path + delay;
        if cp > clock_period {
            ArrivalTime::new(self.cycle + 1, delay)
        } else {
            ArrivalTime::new(self.cycle, cp)
        }
    }
}

impl PartialEq for ArrivalTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ArrivalTime {}

impl PartialOrd for ArrivalTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ArrivalTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cycle
            .cmp(&other.cycle)
            .then_with(|| self.critical_path.total_cmp(&other.critical_path))
    }
}

impl fmt::Display for ArrivalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(cycle={}, cp={:.3})", self.cycle, self.critical_path)
    }
}

/// A single weighted signal in a bit heap.
#[derive(Debug, Clone)]
pub struct Bit {
    /// Column the bit belongs to.
    pub weight: i32,
    /// Unique within the bit's column, assigned in increasing order.
    pub uid: u32,
    /// Declared name, `heap_bh{guid}_w{weight}_{uid}`.
    pub name: String,
    /// Wire declared by the backend for this bit.
    pub signal: SignalId,
    /// What the wire was assigned from.
    pub rhs: BitExpr,
    pub arrival: ArrivalTime,
    pub status: BitStatus,
    /// Output of the compressor that consumed this bit.
    pub consumed_by: Option<SignalId>,
}

impl Bit {
    pub fn is_free(&self) -> bool {
        self.status == BitStatus::Free
    }

    /// Expression the compression network reads this bit through.
    pub fn as_expr(&self) -> BitExpr {
        BitExpr::bit(self.signal, 0)
    }
}
