// This module implements BitAmounts, the dense stage x column matrix of bit counts that the
// planning policies work on instead of individual bits. Every free bit of the heap is assigned
// to a compression stage from its arrival time: a clock cycle holds stages_per_cycle stages of
// one compressor delay each, and stages are renumbered so that the earliest occupied stage is
// stage zero. Placing a compressor subtracts its heights from the stage it is placed in (a
// negative count means inputs tied to zero) and adds its output bits to the next stage.
// Leftover bits are carried forward to the next stage once a stage is finished.

//! Stage x column bit counts.

use std::fmt;

use log::debug;

use crate::compressor::CompressorShape;
use crate::core::{ArrivalTime, BitHeap, BitHeapResult, TechnologyParams};

/// Dense bit-count matrix, columns relative to the heap lsb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitAmounts {
    amounts: Vec<Vec<i64>>,
    width: usize,
}

/// Stage of an arrival, counting `stages_per_cycle` stages per clock cycle.
pub fn stage_of(arrival: ArrivalTime, tech: &TechnologyParams) -> usize {
    let per_cycle = tech.stages_per_cycle() as usize;
    let within = (arrival.critical_path / tech.compressor_delay()).floor() as usize;
    arrival.cycle as usize * per_cycle + within.min(per_cycle - 1)
}

impl BitAmounts {
    /// Empty matrix with one stage.
    pub fn new(width: usize) -> Self {
        Self {
            amounts: vec![vec![0; width]],
            width,
        }
    }

    /// Count the free bits of a heap per stage and column.
    pub fn from_heap(heap: &BitHeap, tech: &TechnologyParams) -> BitHeapResult<Self> {
        let mut entries = Vec::new();
        for column in 0..heap.width() {
            for id in heap.free_bits(heap.weight_of(column))? {
                entries.push((stage_of(heap.bit(id).arrival, tech), column));
            }
        }

        let first = entries.iter().map(|&(s, _)| s).min().unwrap_or(0);
        let mut amounts = Self::new(heap.width());
        for (stage, column) in entries {
            let stage = stage - first;
            amounts.ensure_stage(stage);
            amounts.amounts[stage][column] += 1;
        }
        debug!("bit amounts per stage:\n{amounts}");
        Ok(amounts)
    }

    /// Matrix from explicit counts, one row per stage.
    pub fn from_rows(rows: Vec<Vec<i64>>) -> Self {
        let width = rows.first().map_or(0, Vec::len);
        let mut amounts = Self { amounts: rows, width };
        if amounts.amounts.is_empty() {
            amounts.amounts.push(vec![0; width]);
        }
        amounts
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn stage_count(&self) -> usize {
        self.amounts.len()
    }

    pub fn get(&self, stage: usize, column: usize) -> i64 {
        self.amounts
            .get(stage)
            .and_then(|row| row.get(column))
            .copied()
            .unwrap_or(0)
    }

    pub fn row(&self, stage: usize) -> &[i64] {
        self.amounts.get(stage).map_or(&[], Vec::as_slice)
    }

    /// Grow the matrix so that `stage` exists.
    pub fn ensure_stage(&mut self, stage: usize) {
        while self.amounts.len() <= stage {
            self.amounts.push(vec![0; self.width]);
        }
    }

    /// Bits of `column` in `stage` and every later stage.
    pub fn pending(&self, stage: usize, column: usize) -> i64 {
        self.amounts
            .iter()
            .skip(stage)
            .map(|row| row[column].max(0))
            .sum()
    }

    /// Whether a final adder can absorb everything from `stage` on: at most
    /// `rows` bits per column, one more in the topmost.
    pub fn reached_adder(&self, rows: i64, stage: usize) -> bool {
        (0..self.width).all(|c| {
            let limit = if c + 1 == self.width { rows + 1 } else { rows };
            self.pending(stage, c) <= limit
        })
    }

    /// Efficiency of `shape` anchored at `column` given the bits of `stage`.
    pub fn achieved_efficiency(
        &self,
        stage: usize,
        column: usize,
        shape: &CompressorShape,
        area: f64,
    ) -> f64 {
        let available: Vec<u32> = (0..shape.column_count())
            .map(|j| self.get(stage, column + j).max(0) as u32)
            .collect();
        shape.achieved_efficiency(&available, area)
    }

    /// Bits `shape` would remove at `column` of `stage`, counting only covered inputs
    /// and outputs inside the heap.
    pub fn reduction(&self, stage: usize, column: usize, shape: &CompressorShape) -> i64 {
        let covered: i64 = (0..shape.column_count())
            .map(|j| (shape.column_size(j) as i64).min(self.get(stage, column + j).max(0)))
            .sum();
        let outputs = (shape.output_width() as usize).min(self.width.saturating_sub(column)) as i64;
        covered - outputs
    }

    /// Consume the shape's inputs in `stage` and produce its outputs in `stage + 1`.
    pub fn place(&mut self, stage: usize, column: usize, shape: &CompressorShape) {
        self.ensure_stage(stage + 1);
        for j in 0..shape.column_count() {
            if column + j < self.width {
                self.amounts[stage][column + j] -= shape.column_size(j) as i64;
            }
        }
        for k in 0..shape.output_width() as usize {
            if column + k < self.width {
                self.amounts[stage + 1][column + k] += 1;
            }
        }
    }

    /// Move the leftover bits of `stage` into `stage + 1`, returning the row as
    /// it was before the move.
    pub fn carry_forward(&mut self, stage: usize) -> Vec<i64> {
        self.ensure_stage(stage + 1);
        let row = self.amounts[stage].clone();
        for c in 0..self.width {
            let left = self.amounts[stage][c];
            if left > 0 {
                self.amounts[stage + 1][c] += left;
                self.amounts[stage][c] = 0;
            }
        }
        row
    }

    /// Last stage holding any bit.
    pub fn last_occupied_stage(&self) -> usize {
        self.amounts
            .iter()
            .rposition(|row| row.iter().any(|&n| n > 0))
            .unwrap_or(0)
    }

    /// Total number of bits in the matrix.
    pub fn total(&self) -> i64 {
        self.amounts.iter().flatten().map(|&n| n.max(0)).sum()
    }
}

impl fmt::Display for BitAmounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (s, row) in self.amounts.iter().enumerate() {
            let cells: Vec<String> = row.iter().rev().map(|n| format!("{n:>3}")).collect();
            writeln!(f, "stage {s:>2}: {}", cells.join(""))?;
        }
        Ok(())
    }
}
