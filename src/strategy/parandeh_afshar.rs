//! Column-by-column placement with a forward and backward search.
//!
//! Columns are visited from the lsb up. While a column holds more bits than
//! the final adder accepts, every shape is tried anchored at the column itself
//! (forward) and, for two-column shapes, anchored one column lower so that its
//! upper inputs land on the column (backward). The candidate removing the most
//! bits wins; ties go to the earlier shape, forward before backward. The
//! anchor column must hold a full set of inputs.

use log::debug;

use super::{plan_by_stage, BitAmounts, CompressionAlgorithm, PlanContext, Solution};
use crate::core::BitHeapResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParandehAfshar;

impl ParandehAfshar {
    /// Best `(shape, anchor column)` to relieve `column` in `stage`.
    pub fn search(
        ctx: &PlanContext<'_>,
        amounts: &BitAmounts,
        stage: usize,
        column: usize,
    ) -> Option<(usize, usize)> {
        let mut best: Option<(i64, usize, usize)> = None;

        for (index, shape) in ctx.catalog.iter().enumerate() {
            let forward = Some(column);
            let backward = (column > 0 && shape.column_size(1) > 0).then(|| column - 1);

            for anchor in [forward, backward].into_iter().flatten() {
                if amounts.get(stage, anchor) < shape.column_size(0) as i64 {
                    continue;
                }
                let reduction = amounts.reduction(stage, anchor, shape);
                if reduction > 0 && best.map_or(true, |(r, _, _)| reduction > r) {
                    best = Some((reduction, index, anchor));
                }
            }
        }

        best.map(|(_, index, anchor)| (index, anchor))
    }
}

impl CompressionAlgorithm for ParandehAfshar {
    fn name(&self) -> &'static str {
        "ParandehAfshar"
    }

    fn plan(
        &self,
        ctx: &PlanContext<'_>,
        amounts: &mut BitAmounts,
        solution: &mut Solution,
    ) -> BitHeapResult<bool> {
        let width = amounts.width();
        plan_by_stage(amounts, solution, |stage, amounts, solution| {
            let mut placed = 0;
            for column in 0..width {
                let limit = if column + 1 == width { 3 } else { 2 };
                while amounts.get(stage, column) > limit {
                    let Some((index, anchor)) = Self::search(ctx, amounts, stage, column) else {
                        break;
                    };
                    let shape = &ctx.catalog.shapes()[index];
                    debug!(
                        "placed compressor {shape} in stage {stage} and column {anchor} \
                         for column {column}"
                    );
                    amounts.place(stage, anchor, shape);
                    solution.add_compressor(stage, anchor, index, 0);
                    placed += 1;
                }
            }
            placed
        });
        Ok(true)
    }
}
