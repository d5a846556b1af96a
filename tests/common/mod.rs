//! Shared fixtures for the integration tests.
//!
//! A [`Fixture`] builds a heap from primary inputs of a [`NetlistBackend`] and
//! remembers how every input entered it, so that the value computed by the
//! compressed netlist can be compared with the arithmetic sum.

#![allow(dead_code)]

use hashbrown::HashMap;
use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::Rng;

use bitheap::core::{ArrivalTime, BitExpr, CircuitBackend};
use bitheap::{
    BitHeap, BitHeapResult, CompressionSession, CompressionStrategy, CompressorCatalog,
    NetlistBackend, SignalId, StrategyConfig, StrategyKind,
};

/// Policies that can run to completion.
pub const STRATEGIES: [StrategyKind; 3] = [
    StrategyKind::FirstFitting,
    StrategyKind::MaxEfficiency,
    StrategyKind::ParandehAfshar,
];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A primary input as it was added to the heap.
#[derive(Debug, Clone)]
pub struct Operand {
    pub signal: SignalId,
    pub width: u32,
    pub is_signed: bool,
    /// Weight of bit 0, relative to the heap lsb.
    pub weight: i32,
    pub negated: bool,
}

/// Heap under test together with its backend and input bookkeeping.
pub struct Fixture {
    pub backend: NetlistBackend,
    pub heap: BitHeap,
    pub operands: Vec<Operand>,
    /// Sum of the constants added, in units of `2^lsb`.
    pub constant: BigInt,
}

impl Fixture {
    /// Integer heap of `width` columns.
    pub fn new(width: u32, is_signed: bool) -> Self {
        Self::fixed(width as i32 - 1, 0, is_signed)
    }

    /// Heap covering weights `[lsb, msb]`.
    pub fn fixed(msb: i32, lsb: i32, is_signed: bool) -> Self {
        init_logging();
        let mut backend = NetlistBackend::default();
        let heap = BitHeap::new(&mut backend, msb, lsb, is_signed, "fixture").unwrap();
        Self {
            backend,
            heap,
            operands: Vec::new(),
            constant: BigInt::zero(),
        }
    }

    fn input(&mut self, name: &str, width: u32, is_signed: bool, arrival: ArrivalTime) -> SignalId {
        self.backend.add_input_at(name, width, is_signed, arrival)
    }

    /// Add an integer input shifted by `shift`.
    pub fn add(
        &mut self,
        name: &str,
        width: u32,
        is_signed: bool,
        shift: i32,
        arrival: ArrivalTime,
    ) -> SignalId {
        let signal = self.input(name, width, is_signed, arrival);
        self.heap.add_signal(&mut self.backend, signal, shift).unwrap();
        self.record(signal, width, is_signed, shift, false);
        signal
    }

    /// Subtract an integer input shifted by `shift`.
    pub fn subtract(
        &mut self,
        name: &str,
        width: u32,
        is_signed: bool,
        shift: i32,
        arrival: ArrivalTime,
    ) -> SignalId {
        let signal = self.input(name, width, is_signed, arrival);
        self.heap.subtract_signal(&mut self.backend, signal, shift).unwrap();
        self.record(signal, width, is_signed, shift, true);
        signal
    }

    /// Add a fixed-point input with weights `[lsb, msb]`.
    pub fn add_fixed(&mut self, name: &str, msb: i32, lsb: i32, is_signed: bool) -> SignalId {
        let signal = self.backend.add_fixed_input(name, msb, lsb, is_signed, ArrivalTime::ZERO);
        self.heap.add_signal(&mut self.backend, signal, 0).unwrap();
        let weight = lsb - self.heap.lsb();
        self.operands.push(Operand {
            signal,
            width: (msb - lsb + 1) as u32,
            is_signed,
            weight,
            negated: false,
        });
        signal
    }

    /// Add a single-bit input at `weight`.
    pub fn add_bit(&mut self, name: &str, weight: i32, arrival: ArrivalTime) -> SignalId {
        let signal = self.input(name, 1, false, arrival);
        self.heap.add_bit(&mut self.backend, weight, BitExpr::bit(signal, 0)).unwrap();
        self.record(signal, 1, false, weight, false);
        signal
    }

    /// Add one single-bit input per unit of height, column by column.
    pub fn add_columns(&mut self, heights: &[u32], arrival: impl Fn(usize, u32) -> ArrivalTime) {
        for (c, &h) in heights.iter().enumerate() {
            for k in 0..h {
                let weight = self.heap.weight_of(c);
                self.add_bit(&format!("c{c}_{k}"), weight, arrival(c, k));
            }
        }
    }

    /// Add `value * 2^weight` (negative values are subtracted).
    pub fn add_constant(&mut self, value: i64, weight: i32) {
        let magnitude = BigInt::from(value.unsigned_abs());
        if value >= 0 {
            self.heap.add_constant(&magnitude, weight).unwrap();
        } else {
            self.heap.sub_constant(&magnitude, weight).unwrap();
        }
        self.constant += BigInt::from(value) << (weight - self.heap.lsb()) as usize;
    }

    fn record(&mut self, signal: SignalId, width: u32, is_signed: bool, shift: i32, negated: bool) {
        let weight = shift - self.heap.lsb();
        self.operands.push(Operand {
            signal,
            width,
            is_signed,
            weight,
            negated,
        });
    }

    /// Compress with a fresh engine over the standard catalog.
    pub fn compress(
        &mut self,
        session: &CompressionSession<'_>,
        config: StrategyConfig,
    ) -> BitHeapResult<(SignalId, CompressionStrategy)> {
        self.compress_with(session, config, CompressorCatalog::standard())
    }

    pub fn compress_with(
        &mut self,
        session: &CompressionSession<'_>,
        config: StrategyConfig,
        catalog: CompressorCatalog,
    ) -> BitHeapResult<(SignalId, CompressionStrategy)> {
        let mut strategy = CompressionStrategy::new(config, catalog);
        let sum = strategy.start_compression(&mut self.heap, &mut self.backend, session)?;
        Ok((sum, strategy))
    }

    pub fn input_bits(&self) -> u32 {
        self.operands.iter().map(|op| op.width).sum()
    }

    /// Arithmetic sum of the operands and constants, modulo `2^width`.
    pub fn expected(&self, inputs: &HashMap<SignalId, BigUint>) -> BigUint {
        let mut total = self.constant.clone();
        for op in &self.operands {
            let raw = inputs.get(&op.signal).cloned().unwrap_or_default();
            let mut value = BigInt::from_biguint(Sign::Plus, raw);
            if op.is_signed && value.bit(op.width as u64 - 1) {
                value -= BigInt::one() << op.width as usize;
            }
            let value = value << op.weight as usize;
            if op.negated {
                total -= value;
            } else {
                total += value;
            }
        }

        let modulus = BigInt::one() << self.heap.width();
        let reduced = ((total % &modulus) + &modulus) % &modulus;
        reduced.to_biguint().unwrap_or_default()
    }

    /// Value of `sum` computed by the netlist.
    pub fn actual(&self, sum: SignalId, inputs: &HashMap<SignalId, BigUint>) -> BigUint {
        let values = self.backend.evaluate(inputs).unwrap();
        values.get(&sum).cloned().unwrap()
    }

    /// Split an assignment of all input bits into per-operand values.
    pub fn assignment(&self, pattern: u64) -> HashMap<SignalId, BigUint> {
        let mut inputs = HashMap::new();
        let mut offset = 0;
        for op in &self.operands {
            let mask = (1u64 << op.width) - 1;
            inputs.insert(op.signal, BigUint::from((pattern >> offset) & mask));
            offset += op.width;
        }
        inputs
    }

    /// Compare the netlist with the arithmetic sum on every input assignment.
    pub fn check_exhaustive(&self, sum: SignalId) {
        let bits = self.input_bits();
        assert!(bits <= 16, "{bits} input bits are too many to enumerate");
        for pattern in 0..(1u64 << bits) {
            let inputs = self.assignment(pattern);
            assert_eq!(
                self.actual(sum, &inputs),
                self.expected(&inputs),
                "wrong sum for input pattern {pattern:#b}"
            );
        }
    }

    /// Compare the netlist with the arithmetic sum on random assignments.
    pub fn check_random(&self, sum: SignalId, rng: &mut StdRng, count: usize) {
        for _ in 0..count {
            let mut inputs = HashMap::new();
            for op in &self.operands {
                let digits = (0..op.width.div_ceil(32)).map(|_| rng.random::<u32>()).collect();
                let mask = (BigUint::one() << op.width as usize) - BigUint::one();
                inputs.insert(op.signal, BigUint::new(digits) & mask);
            }
            assert_eq!(
                self.actual(sum, &inputs),
                self.expected(&inputs),
                "wrong sum for {inputs:?}"
            );
        }
    }

    /// Whether a signal name exists in the backend.
    pub fn has_signal(&self, name: &str) -> bool {
        self.backend.signal_id(name).is_some()
    }

    pub fn technology(&self) -> bitheap::TechnologyParams {
        self.backend.technology()
    }
}
