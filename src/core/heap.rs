// This module implements the BitHeap, the weighted multiset of single-bit signals awaiting
// compression. Bits are stored once in an arena (Vec<Bit>) and referenced by BitId from the
// per-weight columns, which keep them sorted by arrival time so that matching always sees the
// earliest bits first. A parallel history keeps every bit that ever entered a column. Compile-time
// constants (rounding bits, sign-extension runs, additive constants) are folded into an
// arbitrary-precision accumulator instead of becoming hardware bits, and are only lowered to
// constant-one bits right before compression, incrementally, so re-running compression never
// lowers the same constant twice. Signed and subtracted vectors are decomposed with the
// two's-complement tricks of the sign_extension module.

//! Bit heap data structure.
//!
//! Columns are indexed by `weight - lsb`. Every mutation clears the
//! `is_compressed` flag so that a later [`start_compression`] call sees the new
//! content.
//!
//! [`start_compression`]: crate::strategy::CompressionStrategy::start_compression

use log::{debug, trace, warn};
use num_bigint::{BigInt, Sign};
use num_traits::{One, Signed, Zero};

use super::adaptor::{BitExpr, CircuitBackend, SignalId, SignalInfo, WireExpr};
use super::bit::{ArrivalTime, Bit, BitId, BitStatus};
use super::error::{BitHeapError, BitHeapResult};
use super::sign_extension;

/// End of a column a bit is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveFrom {
    /// Earliest arrival, the front of the column.
    Oldest,
    /// Latest arrival, the back of the column.
    Newest,
}

/// How a multi-bit signal enters the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VectorMode {
    AddUnsigned,
    SubtractUnsigned,
    AddSigned,
    SubtractSigned,
}

/// Weighted bit heap.
#[derive(Debug)]
pub struct BitHeap {
    guid: u32,
    name: String,
    /// Circuit this heap belongs to; only heaps of the same circuit can be merged.
    owner: String,
    msb: i32,
    lsb: i32,
    is_signed: bool,

    /// Arena of every bit ever created in this heap.
    bits: Vec<Bit>,
    /// Live bits per column, sorted by arrival.
    columns: Vec<Vec<BitId>>,
    /// Every bit that entered a column, including removed ones.
    history: Vec<Vec<BitId>>,
    /// Next uid per column.
    bit_uids: Vec<u32>,

    /// Sum of constant contributions, in units of `2^lsb`.
    constant: BigInt,
    /// Part of `constant` already materialized as constant-one bits.
    lowered_constant: BigInt,

    is_compressed: bool,
    sum: Option<SignalId>,
    sum_name: Option<String>,
}

impl BitHeap {
    /// Create a fixed-point heap covering weights `[lsb, msb]`.
    pub fn new<B: CircuitBackend + ?Sized>(
        backend: &mut B,
        msb: i32,
        lsb: i32,
        is_signed: bool,
        name: &str,
    ) -> BitHeapResult<Self> {
        if msb < lsb {
            return Err(BitHeapError::InvalidRange {
                operation: "BitHeap::new",
                msb,
                lsb,
            });
        }

        let size = (msb - lsb + 1) as usize;
        let guid = backend.fresh_uid();
        debug!("Creating BitHeap {name} (guid {guid}) with weights [{lsb}, {msb}]");

        Ok(Self {
            guid,
            name: name.to_string(),
            owner: String::new(),
            msb,
            lsb,
            is_signed,
            bits: Vec::new(),
            columns: vec![Vec::new(); size],
            history: vec![Vec::new(); size],
            bit_uids: vec![0; size],
            constant: BigInt::zero(),
            lowered_constant: BigInt::zero(),
            is_compressed: false,
            sum: None,
            sum_name: None,
        })
    }

    /// Create an integer heap of `width` columns, weights `[0, width-1]`.
    pub fn integer<B: CircuitBackend + ?Sized>(
        backend: &mut B,
        width: u32,
        is_signed: bool,
        name: &str,
    ) -> BitHeapResult<Self> {
        Self::new(backend, width as i32 - 1, 0, is_signed, name)
    }

    /// Tag the circuit this heap belongs to.
    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    pub fn guid(&self) -> u32 {
        self.guid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn msb(&self) -> i32 {
        self.msb
    }

    pub fn lsb(&self) -> i32 {
        self.lsb
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn is_signed(&self) -> bool {
        self.is_signed
    }

    pub fn set_signed(&mut self, is_signed: bool) {
        self.is_signed = is_signed;
    }

    pub fn is_compressed(&self) -> bool {
        self.is_compressed
    }

    /// Accumulated constant, in units of `2^lsb`.
    pub fn constant(&self) -> &BigInt {
        &self.constant
    }

    /// Constant not yet lowered into the heap as bits.
    pub fn pending_constant(&self) -> BigInt {
        &self.constant - &self.lowered_constant
    }

    /// Handle of the compressed sum, once compression has run.
    pub fn sum_handle(&self) -> Option<SignalId> {
        self.sum
    }

    /// Name of the compressed sum.
    pub fn sum_name(&self) -> String {
        self.sum_name
            .clone()
            .unwrap_or_else(|| format!("bitheapResult_bh{}", self.guid))
    }

    /// Name of a slice of the compressed sum.
    pub fn sum_name_range(&self, msb: i32, lsb: i32) -> BitHeapResult<String> {
        if msb < lsb || lsb < self.lsb || msb > self.msb {
            return Err(BitHeapError::InvalidRange {
                operation: "sum_name_range",
                msb,
                lsb,
            });
        }
        Ok(format!(
            "{}({} downto {})",
            self.sum_name(),
            msb - self.lsb,
            lsb - self.lsb
        ))
    }

    pub(crate) fn set_compressed(&mut self, sum: SignalId, name: &str) {
        self.sum = Some(sum);
        self.sum_name = Some(name.to_string());
        self.is_compressed = true;
    }

    // ---------------------------------------------------------------------
    // Range helpers
    // ---------------------------------------------------------------------

    fn in_range(&self, weight: i32) -> bool {
        weight >= self.lsb && weight <= self.msb
    }

    fn check_weight(&self, weight: i32, operation: &'static str) -> BitHeapResult<usize> {
        if self.in_range(weight) {
            Ok((weight - self.lsb) as usize)
        } else {
            Err(BitHeapError::out_of_range(operation, weight, self.lsb, self.msb))
        }
    }

    fn check_range(&self, msb: i32, lsb: i32, operation: &'static str) -> BitHeapResult<()> {
        if msb < lsb || lsb < self.lsb || msb > self.msb {
            return Err(BitHeapError::InvalidRange { operation, msb, lsb });
        }
        Ok(())
    }

    /// Weight of a column index.
    pub fn weight_of(&self, column: usize) -> i32 {
        self.lsb + column as i32
    }

    // ---------------------------------------------------------------------
    // Bits
    // ---------------------------------------------------------------------

    /// Fresh uid for a bit of the given weight.
    pub fn new_bit_uid(&mut self, weight: i32) -> BitHeapResult<u32> {
        let idx = self.check_weight(weight, "new_bit_uid")?;
        let uid = self.bit_uids[idx];
        self.bit_uids[idx] += 1;
        Ok(uid)
    }

    /// Add one bit, wired from `rhs`.
    ///
    /// Weights outside `[lsb, msb]` are ignored with a warning and `Ok(None)` is
    /// returned.
    pub fn add_bit<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        weight: i32,
        rhs: BitExpr,
    ) -> BitHeapResult<Option<BitId>> {
        if !self.in_range(weight) {
            warn!(
                "in add_bit, weight={weight} outside [{}, {}] of {}... ignoring it",
                self.lsb, self.msb, self.name
            );
            return Ok(None);
        }

        let uid = self.new_bit_uid(weight)?;
        let name = format!("heap_bh{}_w{}_{}", self.guid, weight, uid);
        let signal = backend.declare_and_wire(&name, 1, WireExpr::Bit(rhs))?;
        let arrival = backend.arrival_time(signal);

        let id = BitId(self.bits.len() as u32);
        self.bits.push(Bit {
            weight,
            uid,
            name,
            signal,
            rhs,
            arrival,
            status: BitStatus::Free,
            consumed_by: None,
        });

        let column = (weight - self.lsb) as usize;
        self.insert_bit_in_column(id, column);
        self.history[column].push(id);

        trace!(
            "added bit {} on column {weight} at {arrival}",
            self.bits[id.index()].name
        );
        self.is_compressed = false;
        Ok(Some(id))
    }

    /// Insert keeping the column sorted by arrival; ties go after existing bits.
    fn insert_bit_in_column(&mut self, id: BitId, column: usize) {
        let arrival = self.bits[id.index()].arrival;
        let bits = &self.bits;
        let position = self.columns[column]
            .iter()
            .position(|other| arrival < bits[other.index()].arrival)
            .unwrap_or(self.columns[column].len());
        self.columns[column].insert(position, id);
        self.is_compressed = false;
    }

    pub fn bit(&self, id: BitId) -> &Bit {
        &self.bits[id.index()]
    }

    /// Live bit ids of a column, earliest first.
    pub fn column(&self, weight: i32) -> BitHeapResult<&[BitId]> {
        let idx = self.check_weight(weight, "column")?;
        Ok(&self.columns[idx])
    }

    /// Every bit that ever entered a column.
    pub fn history(&self, weight: i32) -> BitHeapResult<&[BitId]> {
        let idx = self.check_weight(weight, "history")?;
        Ok(&self.history[idx])
    }

    /// Free bits of a column, earliest first.
    pub fn free_bits(&self, weight: i32) -> BitHeapResult<Vec<BitId>> {
        Ok(self
            .column(weight)?
            .iter()
            .copied()
            .filter(|id| self.bits[id.index()].is_free())
            .collect())
    }

    /// Snapshot of all live columns, lsb first.
    pub fn get_bits(&self) -> Vec<Vec<&Bit>> {
        self.columns
            .iter()
            .map(|col| col.iter().map(|id| &self.bits[id.index()]).collect())
            .collect()
    }

    /// Remove one bit from an end of a column.
    pub fn remove_bit(&mut self, weight: i32, from: RemoveFrom) -> BitHeapResult<BitId> {
        let idx = self.check_weight(weight, "remove_bit")?;
        let column = &mut self.columns[idx];
        let empty = BitHeapError::ColumnTooShort {
            weight,
            height: 0,
            index: 0,
        };
        let id = match from {
            RemoveFrom::Oldest if !column.is_empty() => column.remove(0),
            RemoveFrom::Oldest => return Err(empty),
            RemoveFrom::Newest => column.pop().ok_or(empty)?,
        };
        debug!("removed bit {} from column {weight}", self.bits[id.index()].name);
        self.is_compressed = false;
        Ok(id)
    }

    /// Remove a specific bit from its column.
    pub fn remove_bit_by_id(&mut self, weight: i32, id: BitId) -> BitHeapResult<()> {
        let idx = self.check_weight(weight, "remove_bit")?;
        let position = self.columns[idx].iter().position(|&other| other == id);
        match position {
            Some(pos) => {
                self.columns[idx].remove(pos);
                debug!("removed bit {} from column {weight}", self.bits[id.index()].name);
                self.is_compressed = false;
                Ok(())
            }
            None => Err(BitHeapError::BitNotFound {
                weight,
                uid: self.bits.get(id.index()).map_or(u32::MAX, |b| b.uid),
            }),
        }
    }

    /// Remove up to `count` bits from an end of a column.
    pub fn remove_bits(
        &mut self,
        weight: i32,
        count: usize,
        from: RemoveFrom,
    ) -> BitHeapResult<Vec<BitId>> {
        let idx = self.check_weight(weight, "remove_bits")?;
        let height = self.columns[idx].len();
        let count = if count > height {
            debug!(
                "column with weight={weight} only contains {height} bits, but {count} are to be removed"
            );
            height
        } else {
            count
        };

        (0..count).map(|_| self.remove_bit(weight, from)).collect()
    }

    /// Remove up to `count` bits from every column in `[lsb, msb]`.
    pub fn remove_bits_in_range(
        &mut self,
        msb: i32,
        lsb: i32,
        count: usize,
        from: RemoveFrom,
    ) -> BitHeapResult<Vec<BitId>> {
        self.check_range(msb, lsb, "remove_bits_in_range")?;
        let mut removed = Vec::new();
        for weight in lsb..=msb {
            removed.extend(self.remove_bits(weight, count, from)?);
        }
        Ok(removed)
    }

    /// Drop every bit marked [`BitStatus::Compressed`] from the columns.
    pub fn remove_compressed_bits(&mut self) -> usize {
        let bits = &self.bits;
        let mut removed = 0;
        for column in &mut self.columns {
            let before = column.len();
            column.retain(|id| bits[id.index()].status != BitStatus::Compressed);
            removed += before - column.len();
        }
        if removed > 0 {
            trace!("garbage collected {removed} compressed bits");
        }
        removed
    }

    /// Mark the `number`-th bit (earliest first) of a column.
    pub fn mark_bit(
        &mut self,
        weight: i32,
        number: usize,
        status: BitStatus,
    ) -> BitHeapResult<BitId> {
        let idx = self.check_weight(weight, "mark_bit")?;
        let height = self.columns[idx].len();
        let id = *self.columns[idx]
            .get(number)
            .ok_or(BitHeapError::ColumnTooShort {
                weight,
                height,
                index: number,
            })?;
        self.bits[id.index()].status = status;
        Ok(id)
    }

    /// Mark a specific live bit.
    pub fn mark_bit_id(&mut self, id: BitId, status: BitStatus) -> BitHeapResult<()> {
        let bit = self.bits.get(id.index()).ok_or(BitHeapError::BitNotFound {
            weight: self.lsb,
            uid: u32::MAX,
        })?;
        let weight = bit.weight;
        let idx = self.check_weight(weight, "mark_bit")?;
        if !self.columns[idx].contains(&id) {
            return Err(BitHeapError::BitNotFound { weight, uid: bit.uid });
        }
        self.bits[id.index()].status = status;
        Ok(())
    }

    /// Mark the first `number` bits (all when `None`) of every column in `[lsb, msb]`.
    pub fn mark_bits_in_range(
        &mut self,
        msb: i32,
        lsb: i32,
        status: BitStatus,
        number: Option<usize>,
    ) -> BitHeapResult<()> {
        self.check_range(msb, lsb, "mark_bits_in_range")?;
        for weight in lsb..=msb {
            let height = self.columns[(weight - self.lsb) as usize].len();
            let count = match number {
                Some(n) if n > height => {
                    debug!(
                        "column with weight={weight} only contains {height} bits, but {n} are to be marked"
                    );
                    height
                }
                Some(n) => n,
                None => height,
            };
            for j in 0..count {
                self.mark_bit(weight, j, status)?;
            }
        }
        Ok(())
    }

    /// Mark a set of live bits.
    pub fn mark_bits(&mut self, ids: &[BitId], status: BitStatus) -> BitHeapResult<()> {
        ids.iter().try_for_each(|&id| self.mark_bit_id(id, status))
    }

    /// Record the compressor output that consumed a bit.
    pub(crate) fn set_consumer(&mut self, id: BitId, consumer: SignalId) {
        self.bits[id.index()].consumed_by = Some(consumer);
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Number of live bits in a column.
    pub fn column_height(&self, weight: i32) -> BitHeapResult<usize> {
        let idx = self.check_weight(weight, "column_height")?;
        Ok(self.columns[idx].len())
    }

    pub fn max_height(&self) -> usize {
        self.columns.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Total number of live bits.
    pub fn bit_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Whether the heap needs compressors before the final addition.
    ///
    /// Every column may hold two rows; the topmost may hold three since the
    /// final adder takes its third bit as an extra operand. A compressed heap
    /// never requires compression.
    pub fn compression_required(&self) -> bool {
        if self.is_compressed {
            return false;
        }
        let top = self.columns.len() - 1;
        self.columns
            .iter()
            .enumerate()
            .any(|(i, col)| col.len() > if i == top { 3 } else { 2 })
    }

    /// Earliest free bit with weight in `[lsb, msb]`.
    pub fn soonest_bit(&self, lsb: i32, msb: i32) -> Option<BitId> {
        self.free_in_range(lsb, msb)
            .min_by(|a, b| self.bits[a.index()].arrival.cmp(&self.bits[b.index()].arrival))
    }

    /// Latest free bit with weight in `[lsb, msb]`.
    pub fn latest_bit(&self, lsb: i32, msb: i32) -> Option<BitId> {
        self.free_in_range(lsb, msb)
            .max_by(|a, b| self.bits[a.index()].arrival.cmp(&self.bits[b.index()].arrival))
    }

    fn free_in_range(&self, lsb: i32, msb: i32) -> impl Iterator<Item = BitId> + '_ {
        let lo = (lsb.max(self.lsb) - self.lsb) as usize;
        let hi = (msb.min(self.msb) - self.lsb + 1).max(0) as usize;
        self.columns
            .get(lo..hi.max(lo))
            .unwrap_or(&[])
            .iter()
            .flatten()
            .copied()
            .filter(|id| self.bits[id.index()].is_free())
    }

    // ---------------------------------------------------------------------
    // Constants
    // ---------------------------------------------------------------------

    fn shift_of(&self, weight: i32, operation: &'static str) -> BitHeapResult<usize> {
        self.check_weight(weight, operation)
    }

    /// Add `2^weight`.
    pub fn add_constant_one_bit(&mut self, weight: i32) -> BitHeapResult<()> {
        let shift = self.shift_of(weight, "add_constant_one_bit")?;
        self.constant += BigInt::one() << shift;
        self.is_compressed = false;
        Ok(())
    }

    /// Subtract `2^weight`.
    pub fn sub_constant_one_bit(&mut self, weight: i32) -> BitHeapResult<()> {
        let shift = self.shift_of(weight, "sub_constant_one_bit")?;
        self.constant -= BigInt::one() << shift;
        self.is_compressed = false;
        Ok(())
    }

    /// Add `constant * 2^weight`. The constant must fit inside the heap.
    pub fn add_constant(&mut self, constant: &BigInt, weight: i32) -> BitHeapResult<()> {
        let shifted = self.checked_constant(constant, weight, "add_constant")?;
        self.constant += shifted;
        self.is_compressed = false;
        Ok(())
    }

    /// Subtract `constant * 2^weight`. The constant must fit inside the heap.
    pub fn sub_constant(&mut self, constant: &BigInt, weight: i32) -> BitHeapResult<()> {
        let shifted = self.checked_constant(constant, weight, "sub_constant")?;
        self.constant -= shifted;
        self.is_compressed = false;
        Ok(())
    }

    fn checked_constant(
        &self,
        constant: &BigInt,
        weight: i32,
        operation: &'static str,
    ) -> BitHeapResult<BigInt> {
        let shift = self.shift_of(weight, operation)?;
        let top = weight + constant.bits() as i32 - 1;
        if top > self.msb {
            return Err(BitHeapError::out_of_range(operation, top, self.lsb, self.msb));
        }
        Ok(constant << shift)
    }

    /// Add a fixed-point constant whose integer mantissa has its lsb at `value_lsb`.
    ///
    /// Bits below the heap lsb are truncated.
    pub fn add_constant_in_format(
        &mut self,
        mantissa: &BigInt,
        value_lsb: i32,
    ) -> BitHeapResult<()> {
        let aligned = if value_lsb < self.lsb {
            let dropped = (self.lsb - value_lsb) as usize;
            debug!("truncating {dropped} bits of constant {mantissa} below lsb={}", self.lsb);
            mantissa >> dropped
        } else {
            mantissa << ((value_lsb - self.lsb) as usize)
        };
        let top = self.lsb + aligned.bits() as i32 - 1;
        if top > self.msb {
            return Err(BitHeapError::out_of_range(
                "add_constant_in_format",
                top,
                self.lsb,
                self.msb,
            ));
        }
        self.constant += aligned;
        self.is_compressed = false;
        Ok(())
    }

    /// Lower the pending part of the constant accumulator into constant-one bits.
    ///
    /// The pending value is reduced modulo `2^width`; the accumulator itself is
    /// left untouched so lowering twice adds nothing.
    pub fn lower_constant<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> BitHeapResult<usize> {
        let pending = self.pending_constant();
        if pending.is_zero() {
            return Ok(0);
        }

        let modulus = BigInt::one() << self.width();
        let mut reduced = pending.clone() % &modulus;
        if reduced.sign() == Sign::Minus {
            reduced += &modulus;
        }

        let mut added = 0;
        for column in 0..self.width() {
            if reduced.bit(column as u64) {
                self.add_bit(backend, self.weight_of(column), BitExpr::One)?;
                added += 1;
            }
        }
        debug!("lowered constant {pending} into {added} constant bits");
        self.lowered_constant = self.constant.clone();
        Ok(added)
    }

    // ---------------------------------------------------------------------
    // Multi-bit signals
    // ---------------------------------------------------------------------

    /// Add `signal * 2^shift`, signed or unsigned according to the signal.
    pub fn add_signal<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        shift: i32,
    ) -> BitHeapResult<()> {
        let info = backend.lookup_signal(signal)?;
        self.warn_signedness(&info, "adding");
        let mode = if info.is_signed {
            VectorMode::AddSigned
        } else {
            VectorMode::AddUnsigned
        };
        self.add_vector(backend, signal, &info, info.msb, info.lsb, shift, mode)
    }

    /// Subtract `signal * 2^shift`, signed or unsigned according to the signal.
    pub fn subtract_signal<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        shift: i32,
    ) -> BitHeapResult<()> {
        let info = backend.lookup_signal(signal)?;
        self.warn_signedness(&info, "subtracting");
        let mode = if info.is_signed {
            VectorMode::SubtractSigned
        } else {
            VectorMode::SubtractUnsigned
        };
        self.add_vector(backend, signal, &info, info.msb, info.lsb, shift, mode)
    }

    /// Add bits `[src_lsb, src_msb]` of a signal as an unsigned value.
    pub fn add_unsigned_bit_vector<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        src_msb: i32,
        src_lsb: i32,
        shift: i32,
    ) -> BitHeapResult<()> {
        let info = backend.lookup_signal(signal)?;
        if info.is_signed {
            debug!("adding signed signal {} as an unsigned bit vector", info.name);
        }
        self.add_vector(backend, signal, &info, src_msb, src_lsb, shift, VectorMode::AddUnsigned)
    }

    /// Subtract bits `[src_lsb, src_msb]` of a signal, read as an unsigned value.
    pub fn subtract_unsigned_bit_vector<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        src_msb: i32,
        src_lsb: i32,
        shift: i32,
    ) -> BitHeapResult<()> {
        let info = backend.lookup_signal(signal)?;
        if info.is_signed {
            debug!("subtracting signed signal {} as an unsigned bit vector", info.name);
        }
        self.add_vector(
            backend,
            signal,
            &info,
            src_msb,
            src_lsb,
            shift,
            VectorMode::SubtractUnsigned,
        )
    }

    /// Add bits `[src_lsb, src_msb]` of a signal as a two's-complement value whose
    /// sign is bit `src_msb`.
    pub fn add_signed_bit_vector<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        src_msb: i32,
        src_lsb: i32,
        shift: i32,
    ) -> BitHeapResult<()> {
        let info = backend.lookup_signal(signal)?;
        if !self.is_signed {
            debug!("adding signed signal {} to an unsigned bitheap", info.name);
        }
        self.add_vector(backend, signal, &info, src_msb, src_lsb, shift, VectorMode::AddSigned)
    }

    /// Subtract bits `[src_lsb, src_msb]` of a signal, read as a two's-complement value.
    pub fn subtract_signed_bit_vector<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        src_msb: i32,
        src_lsb: i32,
        shift: i32,
    ) -> BitHeapResult<()> {
        let info = backend.lookup_signal(signal)?;
        if !self.is_signed {
            debug!("subtracting signed signal {} from an unsigned bitheap", info.name);
        }
        self.add_vector(backend, signal, &info, src_msb, src_lsb, shift, VectorMode::SubtractSigned)
    }

    fn warn_signedness(&self, info: &SignalInfo, verb: &str) {
        if info.is_signed != self.is_signed {
            warn!(
                "{verb} a {} signal {} {} a {} bitheap",
                if info.is_signed { "signed" } else { "unsigned" },
                info.name,
                if verb == "adding" { "to" } else { "from" },
                if self.is_signed { "signed" } else { "unsigned" },
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn add_vector<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        signal: SignalId,
        info: &SignalInfo,
        src_msb: i32,
        src_lsb: i32,
        shift: i32,
        mode: VectorMode,
    ) -> BitHeapResult<()> {
        if src_msb < src_lsb || src_lsb < info.lsb || src_msb > info.msb {
            return Err(BitHeapError::InvalidRange {
                operation: "add_vector",
                msb: src_msb,
                lsb: src_lsb,
            });
        }

        let start = (src_lsb + shift).max(self.lsb);
        let end = (src_msb + shift).min(self.msb);
        if start > end {
            warn!(
                "signal {} shifted by {shift} does not overlap bitheap [{}, {}]",
                info.name, self.lsb, self.msb
            );
            return Ok(());
        }

        let index_of = |weight: i32| (weight - shift - info.lsb) as u32;
        let (msb, lsb) = (self.msb, self.lsb);

        match mode {
            VectorMode::AddUnsigned => {
                for w in start..=end {
                    self.add_bit(backend, w, BitExpr::bit(signal, index_of(w)))?;
                }
            }
            VectorMode::SubtractUnsigned => {
                for w in start..=end {
                    self.add_bit(backend, w, BitExpr::inverted(signal, index_of(w)))?;
                }
                self.constant += sign_extension::negation_constant(start, end, msb, lsb);
            }
            VectorMode::AddSigned => {
                for w in start..end {
                    self.add_bit(backend, w, BitExpr::bit(signal, index_of(w)))?;
                }
                self.add_bit(backend, end, BitExpr::inverted(signal, index_of(end)))?;
                self.constant += sign_extension::sign_extension_constant(end, msb, lsb);
            }
            VectorMode::SubtractSigned => {
                for w in start..end {
                    self.add_bit(backend, w, BitExpr::inverted(signal, index_of(w)))?;
                }
                self.add_bit(backend, end, BitExpr::bit(signal, index_of(end)))?;
                self.constant += sign_extension::signed_negation_constant(start, end, msb, lsb);
            }
        }

        self.is_compressed = false;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Resize and merge
    // ---------------------------------------------------------------------

    /// Change the weight range, dropping the bits of removed columns.
    pub fn resize(&mut self, new_msb: i32, new_lsb: i32) -> BitHeapResult<()> {
        if new_msb < new_lsb {
            return Err(BitHeapError::InvalidRange {
                operation: "resize",
                msb: new_msb,
                lsb: new_lsb,
            });
        }
        if new_msb < self.msb {
            warn!(
                "resizing {}: will lose the information in the msb columns above {new_msb}",
                self.name
            );
        }
        if new_lsb > self.lsb {
            warn!(
                "resizing {}: will lose the information in the lsb columns below {new_lsb}",
                self.name
            );
        }

        let size = (new_msb - new_lsb + 1) as usize;
        let mut columns = vec![Vec::new(); size];
        let mut history = vec![Vec::new(); size];
        let mut uids = vec![0; size];
        for w in new_lsb.max(self.lsb)..=new_msb.min(self.msb) {
            let old = (w - self.lsb) as usize;
            let new = (w - new_lsb) as usize;
            columns[new] = std::mem::take(&mut self.columns[old]);
            history[new] = std::mem::take(&mut self.history[old]);
            uids[new] = self.bit_uids[old];
        }

        let realign = |value: &BigInt| -> BigInt {
            if new_lsb <= self.lsb {
                value << ((self.lsb - new_lsb) as usize)
            } else {
                value >> ((new_lsb - self.lsb) as usize)
            }
        };
        self.constant = realign(&self.constant);
        self.lowered_constant = realign(&self.lowered_constant);

        self.columns = columns;
        self.history = history;
        self.bit_uids = uids;
        self.msb = new_msb;
        self.lsb = new_lsb;
        self.is_compressed = false;
        debug!("resized {} to [{new_lsb}, {new_msb}]", self.name);
        Ok(())
    }

    /// Splice the bits and pending constant of another heap into this one.
    pub fn merge(&mut self, other: BitHeap) -> BitHeapResult<()> {
        if self.owner != other.owner {
            return Err(BitHeapError::MergeMismatch {
                ours: self.owner.clone(),
                theirs: other.owner,
            });
        }
        if self.is_signed != other.is_signed {
            warn!("merging bitheaps with different signedness");
        }

        if other.lsb < self.lsb || other.msb > self.msb {
            self.resize(self.msb.max(other.msb), self.lsb.min(other.lsb))?;
        }

        for (column, ids) in other.columns.iter().enumerate() {
            let weight = other.lsb + column as i32;
            for &id in ids {
                let mut bit = other.bits[id.index()].clone();
                bit.uid = self.new_bit_uid(weight)?;
                let new_id = BitId(self.bits.len() as u32);
                self.bits.push(bit);
                let target = (weight - self.lsb) as usize;
                self.insert_bit_in_column(new_id, target);
                self.history[target].push(new_id);
            }
        }

        let pending = other.pending_constant();
        if !pending.is_zero() {
            let shift = (other.lsb - self.lsb) as usize;
            self.constant += pending << shift;
        }

        self.is_compressed = false;
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Reporting
    // ---------------------------------------------------------------------

    /// Log the bits of a column.
    pub fn print_column_info(&self, weight: i32) -> BitHeapResult<()> {
        for id in self.column(weight)? {
            let bit = &self.bits[id.index()];
            trace!(
                "\t column weight={weight} name={} arrival={} status={:?}",
                bit.name,
                bit.arrival,
                bit.status
            );
        }
        Ok(())
    }

    /// Log the whole heap.
    pub fn print_status(&self) {
        debug!("Bitheap {} status:", self.name);
        for column in 0..self.width() {
            let weight = self.weight_of(column);
            debug!("Column weight={weight}:\t height={}", self.columns[column].len());
            let _ = self.print_column_info(weight);
        }
        if !self.constant.is_zero() {
            debug!(
                "constant accumulator = {} (pending {})",
                self.constant,
                self.pending_constant()
            );
        }
    }

    /// Arrival of a column's earliest free bit, if any.
    pub fn earliest_arrival(&self, weight: i32) -> Option<ArrivalTime> {
        self.column(weight)
            .ok()?
            .iter()
            .map(|id| &self.bits[id.index()])
            .find(|b| b.is_free())
            .map(|b| b.arrival)
    }

    /// Whether the accumulator is negative (only meaningful for reporting).
    pub fn constant_is_negative(&self) -> bool {
        self.constant.is_negative()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::NetlistBackend;

    fn heap(backend: &mut NetlistBackend, msb: i32, lsb: i32) -> BitHeap {
        BitHeap::new(backend, msb, lsb, false, "test").unwrap()
    }

    #[test]
    fn test_add_bit_keeps_columns_sorted() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input_at("a", 1, false, ArrivalTime::new(0, 0.2));
        let b = backend.add_input_at("b", 1, false, ArrivalTime::new(0, 0.1));
        let c = backend.add_input_at("c", 1, false, ArrivalTime::new(1, 0.0));
        let mut heap = heap(&mut backend, 7, 0);

        heap.add_bit(&mut backend, 3, BitExpr::bit(c, 0)).unwrap();
        heap.add_bit(&mut backend, 3, BitExpr::bit(a, 0)).unwrap();
        heap.add_bit(&mut backend, 3, BitExpr::bit(b, 0)).unwrap();

        let arrivals: Vec<_> = heap
            .column(3)
            .unwrap()
            .iter()
            .map(|&id| heap.bit(id).arrival)
            .collect();
        assert_eq!(
            arrivals,
            vec![
                ArrivalTime::new(0, 0.1),
                ArrivalTime::new(0, 0.2),
                ArrivalTime::new(1, 0.0)
            ]
        );
        assert_eq!(heap.column_height(3).unwrap(), 3);
        assert!(heap.compression_required());
    }

    #[test]
    fn test_equal_arrivals_keep_insertion_order() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 2, false);
        let mut heap = heap(&mut backend, 3, 0);
        let first = heap.add_bit(&mut backend, 0, BitExpr::bit(a, 0)).unwrap().unwrap();
        let second = heap.add_bit(&mut backend, 0, BitExpr::bit(a, 1)).unwrap().unwrap();
        assert_eq!(heap.column(0).unwrap(), &[first, second]);
        assert_eq!(heap.bit(first).uid, 0);
        assert_eq!(heap.bit(second).uid, 1);
    }

    #[test]
    fn test_add_bit_out_of_range_is_ignored() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 1, false);
        let mut heap = heap(&mut backend, 3, 0);
        assert_eq!(heap.add_bit(&mut backend, 4, BitExpr::bit(a, 0)).unwrap(), None);
        assert_eq!(heap.add_bit(&mut backend, -1, BitExpr::bit(a, 0)).unwrap(), None);
        assert_eq!(heap.bit_count(), 0);
    }

    #[test]
    fn test_constant_errors_are_hard() {
        let mut backend = NetlistBackend::default();
        let mut heap = heap(&mut backend, 3, 0);
        assert!(heap.add_constant_one_bit(4).is_err());
        assert!(heap.add_constant(&BigInt::from(3), 3).is_err());
        assert!(heap.add_constant(&BigInt::from(3), 2).is_ok());
        assert_eq!(heap.constant(), &BigInt::from(12));
    }

    #[test]
    fn test_sub_then_add_constant_cancels() {
        let mut backend = NetlistBackend::default();
        let mut heap = heap(&mut backend, 7, 0);
        heap.sub_constant_one_bit(0).unwrap();
        heap.add_constant_one_bit(0).unwrap();
        assert!(heap.constant().is_zero());
        assert_eq!(heap.bit_count(), 0);
        assert_eq!(heap.lower_constant(&mut backend).unwrap(), 0);
    }

    #[test]
    fn test_lower_constant_is_incremental() {
        let mut backend = NetlistBackend::default();
        let mut heap = heap(&mut backend, 3, 0);
        heap.add_constant(&BigInt::from(5), 0).unwrap();
        assert_eq!(heap.lower_constant(&mut backend).unwrap(), 2);
        assert_eq!(heap.lower_constant(&mut backend).unwrap(), 0);
        assert_eq!(heap.column_height(0).unwrap(), 1);
        assert_eq!(heap.column_height(2).unwrap(), 1);

        // only the delta since the last lowering, -6 mod 16
        heap.sub_constant_one_bit(0).unwrap();
        heap.sub_constant(&BigInt::from(5), 0).unwrap();
        assert_eq!(heap.pending_constant(), BigInt::from(-6));
        assert_eq!(heap.lower_constant(&mut backend).unwrap(), 2); // 10 = 0b1010
    }

    #[test]
    fn test_remove_and_mark_operate_on_real_columns() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 3, false);
        let mut heap = heap(&mut backend, 3, 0);
        for i in 0..3 {
            heap.add_bit(&mut backend, 1, BitExpr::bit(a, i)).unwrap();
        }

        let newest = heap.remove_bit(1, RemoveFrom::Newest).unwrap();
        assert_eq!(heap.column_height(1).unwrap(), 2);
        assert!(!heap.column(1).unwrap().contains(&newest));
        assert_eq!(heap.history(1).unwrap().len(), 3);

        let first = heap.mark_bit(1, 0, BitStatus::Compressed).unwrap();
        assert_eq!(heap.free_bits(1).unwrap().len(), 1);
        assert_eq!(heap.remove_compressed_bits(), 1);
        assert!(!heap.column(1).unwrap().contains(&first));

        let remaining = heap.column(1).unwrap()[0];
        heap.remove_bit_by_id(1, remaining).unwrap();
        assert!(matches!(
            heap.remove_bit_by_id(1, remaining),
            Err(BitHeapError::BitNotFound { weight: 1, .. })
        ));
        assert!(matches!(
            heap.mark_bit(1, 0, BitStatus::Free),
            Err(BitHeapError::ColumnTooShort { .. })
        ));
        assert!(heap.remove_bit(9, RemoveFrom::Oldest).is_err());
    }

    #[test]
    fn test_remove_bits_clamps_count() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 2, false);
        let mut heap = heap(&mut backend, 3, 0);
        heap.add_bit(&mut backend, 2, BitExpr::bit(a, 0)).unwrap();
        heap.add_bit(&mut backend, 2, BitExpr::bit(a, 1)).unwrap();
        let removed = heap.remove_bits(2, 5, RemoveFrom::Oldest).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(heap.column_height(2).unwrap(), 0);
    }

    #[test]
    fn test_compression_required_top_column_may_hold_three() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 4, false);
        let mut heap = heap(&mut backend, 3, 0);
        for i in 0..3 {
            heap.add_bit(&mut backend, 3, BitExpr::bit(a, i)).unwrap();
        }
        assert_eq!(heap.max_height(), 3);
        assert!(!heap.compression_required());
        heap.add_bit(&mut backend, 3, BitExpr::bit(a, 3)).unwrap();
        assert!(heap.compression_required());
    }

    #[test]
    fn test_signed_vector_folds_sign_extension() {
        let mut backend = NetlistBackend::default();
        let x = backend.add_input("x", 3, true);
        let mut heap = BitHeap::integer(&mut backend, 8, true, "signed").unwrap();
        heap.add_signal(&mut backend, x, 1).unwrap();

        assert_eq!(heap.column_height(1).unwrap(), 1);
        assert_eq!(heap.column_height(3).unwrap(), 1);
        assert_eq!(heap.column_height(4).unwrap(), 0);
        let sign = heap.bit(heap.column(3).unwrap()[0]).rhs;
        assert_eq!(sign, BitExpr::inverted(x, 2));
        // ones from weight 3 to 7
        assert_eq!(heap.constant(), &BigInt::from(0b1111_1000));
    }

    #[test]
    fn test_resize_realigns_columns_and_constant() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 1, false);
        let mut heap = heap(&mut backend, 3, 0);
        heap.add_bit(&mut backend, 2, BitExpr::bit(a, 0)).unwrap();
        heap.add_constant_one_bit(1).unwrap();

        heap.resize(5, -2).unwrap();
        assert_eq!(heap.width(), 8);
        assert_eq!(heap.column_height(2).unwrap(), 1);
        assert_eq!(heap.constant(), &BigInt::from(8)); // 2^1 in units of 2^-2

        heap.resize(5, 3).unwrap();
        assert_eq!(heap.bit_count(), 0);
        assert!(heap.resize(1, 2).is_err());
    }

    #[test]
    fn test_merge_requires_same_owner() {
        let mut backend = NetlistBackend::default();
        let a = backend.add_input("a", 2, false);
        let mut left = heap(&mut backend, 3, 0).with_owner("mult");
        let mut right = BitHeap::new(&mut backend, 5, 2, false, "right")
            .unwrap()
            .with_owner("mult");
        left.add_bit(&mut backend, 2, BitExpr::bit(a, 0)).unwrap();
        right.add_bit(&mut backend, 2, BitExpr::bit(a, 1)).unwrap();
        right.add_constant_one_bit(5).unwrap();

        left.merge(right).unwrap();
        assert_eq!(left.msb(), 5);
        assert_eq!(left.column_height(2).unwrap(), 2);
        assert_eq!(left.constant(), &BigInt::from(32));

        let other = heap(&mut backend, 3, 0).with_owner("filter");
        assert!(matches!(left.merge(other), Err(BitHeapError::MergeMismatch { .. })));
    }

    #[test]
    fn test_soonest_and_latest_bit() {
        let mut backend = NetlistBackend::default();
        let early = backend.add_input_at("early", 1, false, ArrivalTime::new(0, 0.3));
        let late = backend.add_input_at("late", 1, false, ArrivalTime::new(2, 0.0));
        let mut heap = heap(&mut backend, 3, 0);
        let e = heap.add_bit(&mut backend, 2, BitExpr::bit(early, 0)).unwrap().unwrap();
        let l = heap.add_bit(&mut backend, 0, BitExpr::bit(late, 0)).unwrap().unwrap();

        assert_eq!(heap.soonest_bit(0, 3), Some(e));
        assert_eq!(heap.latest_bit(0, 3), Some(l));
        assert_eq!(heap.soonest_bit(0, 1), Some(l));
        heap.mark_bit_id(e, BitStatus::Compressed).unwrap();
        assert_eq!(heap.soonest_bit(0, 3), Some(l));
        assert_eq!(heap.soonest_bit(3, 3), None);
    }
}
