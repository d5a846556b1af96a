// This module implements CompressionStrategy, the generic engine that drives one compression
// run over a BitHeap. A run first folds back the sum of a previous run (if new bits were added
// since), lowers the pending constant into constant-one bits, and freezes the low-order columns
// that are already final. A planning policy may then place compressors on the stage x column
// matrix, and the resulting Solution is applied stage by stage. Whatever is left is compressed
// by the first-fit sweep: take the soonest free bit, then for each catalog shape and each open
// column apply the shape as long as enough free bits arrive within the timing window. A sweep
// that applies nothing widens the window by one clock period. Widenings are free until the window
// reaches the latest open free bit; past that point only a fixed number of consecutive retries
// is allowed before the run reports non-convergence. After every sweep compressed bits are
// garbage collected and the prefix of columns holding at most one bit is frozen into chunks;
// frozen columns are never reopened.
// Finally a carry-propagate adder sums the remaining rows and the chunks and adder output are
// concatenated into the published sum.

//! Generic compression engine.

use std::collections::VecDeque;

use log::{debug, info, log_enabled, trace, warn, Level};

use super::bit_amounts::BitAmounts;
use super::config::StrategyConfig;
use super::solution::{Solution, SolutionStatus};
use super::{CompressionAlgorithm, PlanContext};
use crate::compressor::{CompressorCatalog, CompressorShape};
use crate::core::{
    BitExpr, BitHeap, BitHeapError, BitHeapResult, BitId, BitStatus, CircuitBackend,
    CompressionSession, Primitive, SignalId, TechnologyParams, WireExpr,
};

/// Inputs of one compressor: per relative column, the bits fed to its port;
/// `None` is an input tied to zero.
pub type CompressorInputs = Vec<Vec<Option<BitId>>>;

/// Tolerance on absolute arrival comparisons.
const TIME_EPSILON: f64 = 1e-9;

/// Drives one compression run of a bit heap.
pub struct CompressionStrategy {
    config: StrategyConfig,
    catalog: CompressorCatalog,
    algorithm: Box<dyn CompressionAlgorithm>,

    /// Index of the lowest column still open for compression.
    compression_done_index: usize,
    /// One entry per frozen column, lowest first.
    chunks: Vec<Option<BitExpr>>,
    /// `compression_done_index` after each freezing step.
    done_index_trace: Vec<usize>,

    solution: Solution,
    /// Stages taken by the applied plan; sweeps are recorded after them.
    planned_stages: usize,
}

impl CompressionStrategy {
    /// Engine for the policy named in `config`.
    pub fn new(config: StrategyConfig, catalog: CompressorCatalog) -> Self {
        let algorithm = config.kind.algorithm();
        Self::with_algorithm(config, catalog, algorithm)
    }

    /// Engine with an explicit policy.
    pub fn with_algorithm(
        config: StrategyConfig,
        catalog: CompressorCatalog,
        algorithm: Box<dyn CompressionAlgorithm>,
    ) -> Self {
        Self {
            config,
            catalog,
            algorithm,
            compression_done_index: 0,
            chunks: Vec::new(),
            done_index_trace: Vec::new(),
            solution: Solution::new(),
            planned_stages: 0,
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn catalog(&self) -> &CompressorCatalog {
        &self.catalog
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.algorithm.name()
    }

    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    pub fn compression_done_index(&self) -> usize {
        self.compression_done_index
    }

    /// Frozen-prefix index after every freezing step of the last run.
    pub fn done_index_trace(&self) -> &[usize] {
        &self.done_index_trace
    }

    fn reset(&mut self) {
        self.compression_done_index = 0;
        self.chunks.clear();
        self.done_index_trace.clear();
        self.solution = Solution::new();
        self.planned_stages = 0;
    }

    /// Compress `heap` and publish its sum.
    ///
    /// On an already compressed heap this returns the published sum without
    /// touching anything.
    pub fn start_compression<B: CircuitBackend + ?Sized>(
        &mut self,
        heap: &mut BitHeap,
        backend: &mut B,
        session: &CompressionSession<'_>,
    ) -> BitHeapResult<SignalId> {
        if let (true, Some(sum)) = (heap.is_compressed(), heap.sum_handle()) {
            debug!("bitheap {} is already compressed", heap.name());
            return Ok(sum);
        }
        self.algorithm.check_available()?;

        self.reset();
        session.set_current_heap(heap.name());
        session.record_run_started();
        info!(
            "Compressing bitheap {} ({} bits, max height {}) with the {} strategy",
            heap.name(),
            heap.bit_count(),
            heap.max_height(),
            self.algorithm.name()
        );

        if let Some(previous) = heap.sum_handle() {
            let info = backend.lookup_signal(previous)?;
            debug!("folding previous sum {} back into the bitheap", info.name);
            heap.add_unsigned_bit_vector(backend, previous, info.msb, info.lsb, heap.lsb())?;
        }
        heap.lower_constant(backend)?;
        heap.print_status();

        if log_enabled!(Level::Trace) {
            for shape in self.catalog.iter() {
                trace!("{shape}:\n{}", shape.table_listing(self.config.compact_truth_tables));
            }
        }

        self.concatenate_lsb_columns(heap, session)?;

        if !heap.compression_required() {
            debug!("no compression needed");
            self.solution.set_status(SolutionStatus::NoCompressionNeeded);
        } else {
            self.solution.set_status(self.algorithm.initial_status());
            let tech = backend.technology();

            let mut amounts = BitAmounts::from_heap(heap, &tech)?;
            let ctx = PlanContext {
                catalog: &self.catalog,
                areas: self.catalog.iter().map(|s| backend.primitive_area(s)).collect(),
                config: &self.config,
            };
            if self.algorithm.plan(&ctx, &mut amounts, &mut self.solution)? {
                self.solution.clean_up();
                self.planned_stages = self.solution.stage_count();
                self.apply_solution(heap, backend, session)?;
                self.concatenate_lsb_columns(heap, session)?;
            }

            self.compress_remaining(heap, backend, session, &tech)?;
            self.solution.clean_up();
            self.solution.mark_complete();
        }

        self.finalize(heap, backend, session)
    }

    /// First-fit sweeps until no column needs compression.
    fn compress_remaining<B: CircuitBackend + ?Sized>(
        &mut self,
        heap: &mut BitHeap,
        backend: &mut B,
        session: &CompressionSession<'_>,
        tech: &TechnologyParams,
    ) -> BitHeapResult<()> {
        let delay = tech.compressor_delay();
        let mut window = delay;
        let mut widenings = 0u32;
        let mut stage = self.planned_stages;

        while heap.compression_required() {
            session.record_round();
            let open_weight = heap.weight_of(self.compression_done_index);
            let Some(soonest) = heap.soonest_bit(open_weight, heap.msb()) else {
                break;
            };
            let soonest_time = tech.absolute(heap.bit(soonest).arrival);
            debug!(
                "sweep at stage {stage}: soonest bit {} at {}, window {window:.3}",
                heap.bit(soonest).name,
                heap.bit(soonest).arrival
            );

            let mut applied = 0;
            for (index, shape) in self.catalog.iter().enumerate() {
                for column in self.compression_done_index..heap.width() {
                    while let Some(inputs) =
                        Self::can_apply(heap, tech, column, shape, soonest_time, window)?
                    {
                        Self::apply_compressor(heap, backend, session, column, shape, &inputs)?;
                        self.solution.add_compressor(stage, column, index, 0);
                        applied += 1;
                    }
                }
            }

            session.record_bits_removed(heap.remove_compressed_bits());
            self.concatenate_lsb_columns(heap, session)?;

            if applied == 0 {
                // Widening counts against the ceiling only once every open bit is inside
                // the window.
                let covered = heap.latest_bit(open_weight, heap.msb()).map_or(true, |latest| {
                    window + TIME_EPSILON >= tech.absolute(heap.bit(latest).arrival) - soonest_time
                });
                if covered {
                    if widenings == self.config.max_window_widenings {
                        return Err(BitHeapError::NonConvergence {
                            retries: widenings,
                            open_weight: self.lowest_overfull_weight(heap),
                        });
                    }
                    widenings += 1;
                }
                window += tech.clock_period;
                session.record_window_widened();
                debug!("no compressor fits, widening the window to {window:.3}");
            } else {
                widenings = 0;
                window = delay;
                stage += 1;
            }
        }
        Ok(())
    }

    fn lowest_overfull_weight(&self, heap: &BitHeap) -> i32 {
        let top = heap.width() - 1;
        (self.compression_done_index..heap.width())
            .find(|&c| {
                let height = heap.column_height(heap.weight_of(c)).unwrap_or(0);
                height > if c == top { 3 } else { 2 }
            })
            .map_or(heap.msb(), |c| heap.weight_of(c))
    }

    /// Free bits for `shape` anchored at `column`, all arriving within `window`
    /// of `soonest_time`, earliest first.
    pub fn can_apply(
        heap: &BitHeap,
        tech: &TechnologyParams,
        column: usize,
        shape: &CompressorShape,
        soonest_time: f64,
        window: f64,
    ) -> BitHeapResult<Option<CompressorInputs>> {
        let mut inputs = Vec::with_capacity(shape.column_count());
        for j in 0..shape.column_count() {
            let needed = shape.column_size(j) as usize;
            if column + j >= heap.width() {
                if needed > 0 {
                    return Ok(None);
                }
                inputs.push(Vec::new());
                continue;
            }

            let picked: Vec<Option<BitId>> = heap
                .free_bits(heap.weight_of(column + j))?
                .into_iter()
                .filter(|&id| {
                    tech.absolute(heap.bit(id).arrival) - soonest_time <= window + TIME_EPSILON
                })
                .take(needed)
                .map(Some)
                .collect();
            if picked.len() < needed {
                return Ok(None);
            }
            inputs.push(picked);
        }
        Ok(Some(inputs))
    }

    /// Instantiate `shape` on `inputs`, mark them compressed and add its output
    /// bits at the anchor weight.
    ///
    /// Every input is checked before anything is modified.
    pub fn apply_compressor<B: CircuitBackend + ?Sized>(
        heap: &mut BitHeap,
        backend: &mut B,
        session: &CompressionSession<'_>,
        column: usize,
        shape: &CompressorShape,
        inputs: &[Vec<Option<BitId>>],
    ) -> BitHeapResult<SignalId> {
        if inputs.len() != shape.column_count() {
            return Err(BitHeapError::CompressorInputMismatch {
                shape: shape.name(),
                column,
                expected: shape.column_count(),
                found: inputs.len(),
            });
        }
        for (j, port) in inputs.iter().enumerate() {
            let expected = shape.column_size(j) as usize;
            if port.len() != expected {
                return Err(BitHeapError::CompressorInputMismatch {
                    shape: shape.name(),
                    column: j,
                    expected,
                    found: port.len(),
                });
            }
            let weight = heap.weight_of(column + j);
            for &id in port.iter().flatten() {
                let bit = heap.bit(id);
                if bit.weight != weight || !bit.is_free() {
                    return Err(BitHeapError::BitNotFound { weight, uid: bit.uid });
                }
            }
        }

        let ports: Vec<WireExpr> = inputs
            .iter()
            .map(|port| {
                WireExpr::from_bits(port.iter().map(|id| id.map(|id| heap.bit(id).as_expr())))
            })
            .collect();
        let output = backend.instantiate_primitive(Primitive::Compressor(shape), &ports)?;

        for &id in inputs.iter().flatten().flatten() {
            heap.mark_bit_id(id, BitStatus::Compressed)?;
            heap.set_consumer(id, output);
        }

        let anchor = heap.weight_of(column);
        let out_msb = shape.output_width() as i32 - 1;
        let kept = (heap.msb() - anchor).min(out_msb) + 1;
        if kept <= out_msb {
            warn!(
                "{shape} at weight {anchor}: {} output bits above msb={} are dropped",
                out_msb + 1 - kept,
                heap.msb()
            );
        }
        heap.add_unsigned_bit_vector(backend, output, out_msb, 0, anchor)?;

        session.record_compressor_placed(&shape.name());
        session.record_bits_added(kept as usize);
        debug!("applied {shape} at weight {anchor}");
        Ok(output)
    }

    /// Apply the planned solution, stage by stage.
    ///
    /// Each stage only uses the bits that were free when it started, earliest
    /// first; missing inputs are tied to zero and compressors with no input bit
    /// at all are skipped.
    fn apply_solution<B: CircuitBackend + ?Sized>(
        &mut self,
        heap: &mut BitHeap,
        backend: &mut B,
        session: &CompressionSession<'_>,
    ) -> BitHeapResult<()> {
        for stage in 0..self.solution.stage_count() {
            session.record_round();
            let mut pool = (0..heap.width())
                .map(|c| heap.free_bits(heap.weight_of(c)).map(VecDeque::from))
                .collect::<BitHeapResult<Vec<_>>>()?;

            for column in 0..self.solution.column_count_at(stage).unwrap_or(0) {
                for (index, _middle_length) in self.solution.compressors_at(stage, column) {
                    let shape = self.catalog.get(index).ok_or_else(|| BitHeapError::InvalidShape {
                        heights: Vec::new(),
                        reason: "solution refers to a shape outside the catalog",
                    })?;
                    if column < self.compression_done_index {
                        debug!("skipping {shape} at frozen column {column}");
                        continue;
                    }

                    let inputs: CompressorInputs = (0..shape.column_count())
                        .map(|j| {
                            (0..shape.column_size(j))
                                .map(|_| pool.get_mut(column + j).and_then(VecDeque::pop_front))
                                .collect()
                        })
                        .collect();
                    if inputs.iter().flatten().all(Option::is_none) {
                        debug!(
                            "skipping {shape} at stage {stage}, column {column}: no input bits left"
                        );
                        continue;
                    }
                    Self::apply_compressor(heap, backend, session, column, shape, &inputs)?;
                }
            }
            session.record_bits_removed(heap.remove_compressed_bits());
        }
        Ok(())
    }

    /// Freeze the prefix of open columns holding at most one bit.
    fn concatenate_lsb_columns(
        &mut self,
        heap: &mut BitHeap,
        session: &CompressionSession<'_>,
    ) -> BitHeapResult<()> {
        let start = self.compression_done_index;
        while self.compression_done_index < heap.width() {
            let weight = heap.weight_of(self.compression_done_index);
            let column = heap.column(weight)?;
            if column.len() > 1 {
                break;
            }
            match column.first().copied() {
                Some(id) => {
                    heap.mark_bit_id(id, BitStatus::Compressed)?;
                    self.chunks.push(Some(heap.bit(id).as_expr()));
                }
                None => self.chunks.push(None),
            }
            self.compression_done_index += 1;
        }

        if self.compression_done_index > start {
            heap.remove_compressed_bits();
            session.record_chunk_frozen(self.compression_done_index - start);
            debug!(
                "froze columns [{}, {}]",
                heap.weight_of(start),
                heap.weight_of(self.compression_done_index - 1)
            );
        }
        self.done_index_trace.push(self.compression_done_index);
        Ok(())
    }

    /// Final adder over the open columns, then publish the concatenated sum.
    fn finalize<B: CircuitBackend + ?Sized>(
        &mut self,
        heap: &mut BitHeap,
        backend: &mut B,
        session: &CompressionSession<'_>,
    ) -> BitHeapResult<SignalId> {
        self.concatenate_lsb_columns(heap, session)?;
        let width = heap.width();
        let mut result = self.chunks.clone();

        if self.compression_done_index < width {
            let adder_width = (width - self.compression_done_index) as u32;
            let top = width - 1;
            let (mut x, mut y) = (Vec::new(), Vec::new());
            let mut top_bit = None;
            let mut consumed = Vec::new();

            for c in self.compression_done_index..width {
                let column = heap.column(heap.weight_of(c))?.to_vec();
                let limit = if c == top { 3 } else { 2 };
                if column.len() > limit {
                    return Err(BitHeapError::CompressorInputMismatch {
                        shape: format!("Adder{adder_width}"),
                        column: c,
                        expected: limit,
                        found: column.len(),
                    });
                }
                x.push(column.first().map(|&id| heap.bit(id).as_expr()));
                y.push(column.get(1).map(|&id| heap.bit(id).as_expr()));
                if c == top {
                    top_bit = column.get(2).map(|&id| heap.bit(id).as_expr());
                }
                consumed.extend(column);
            }

            let ports = [
                WireExpr::from_bits(x),
                WireExpr::from_bits(y),
                top_bit.map_or(WireExpr::Zero, WireExpr::Bit),
            ];
            let sum =
                backend.instantiate_primitive(Primitive::Adder { width: adder_width }, &ports)?;
            for id in consumed {
                heap.mark_bit_id(id, BitStatus::Compressed)?;
                heap.set_consumer(id, sum);
            }
            session.record_bits_removed(heap.remove_compressed_bits());
            session.record_final_adder(adder_width);
            debug!("final adder of {adder_width} bits");

            result.extend((0..adder_width).map(|i| Some(BitExpr::bit(sum, i))));
        }

        let name = match heap.sum_handle() {
            None => heap.sum_name(),
            Some(_) => format!("bitheapResult_bh{}_{}", heap.guid(), backend.fresh_uid()),
        };
        let name = session.intern_str(&name);
        let sum = backend.declare_and_wire(name, width as u32, WireExpr::from_bits(result))?;
        heap.set_compressed(sum, name);
        info!(
            "bitheap {} compressed into {name}: {} compressors, {}",
            heap.name(),
            self.solution.compressor_count(),
            self.solution.status()
        );
        Ok(sum)
    }
}

impl BitHeap {
    /// Compress this heap with a fresh engine over the standard catalog.
    pub fn start_compression<B: CircuitBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        session: &CompressionSession<'_>,
        config: StrategyConfig,
    ) -> BitHeapResult<SignalId> {
        let mut strategy = CompressionStrategy::new(config, CompressorCatalog::standard());
        strategy.start_compression(self, backend, session)
    }
}
