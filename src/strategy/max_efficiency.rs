//! Greedy placement on achieved efficiency.
//!
//! Within a stage the policy repeatedly places the (shape, column) pair with
//! the best achieved efficiency, trying shapes by decreasing nominal
//! efficiency and columns by decreasing bit count. A shape whose nominal
//! efficiency cannot beat the best pair found so far is not examined.

use log::debug;

use super::{plan_by_stage, BitAmounts, CompressionAlgorithm, PlanContext, Solution};
use crate::core::BitHeapResult;

/// Efficiencies closer than this are treated as equal, so earlier shapes win.
const EPSILON: f64 = 1e-4;

#[derive(Debug, Clone, Copy, Default)]
pub struct MaxEfficiency;

struct Candidate {
    efficiency: f64,
    shape: usize,
    column: usize,
}

impl MaxEfficiency {
    /// Best placement in `stage`, if any beats the lower bound.
    fn best_placement(
        ctx: &PlanContext<'_>,
        order: &[usize],
        amounts: &BitAmounts,
        stage: usize,
    ) -> Option<Candidate> {
        let mut columns: Vec<usize> = (0..amounts.width()).collect();
        columns.sort_by(|&a, &b| amounts.get(stage, b).cmp(&amounts.get(stage, a)));

        let mut best: Option<Candidate> = None;
        for &index in order {
            let shape = &ctx.catalog.shapes()[index];
            let nominal = ctx.efficiency(index);

            for &column in &columns {
                if best.as_ref().is_some_and(|b| nominal - b.efficiency < EPSILON) {
                    break;
                }
                let achieved = amounts.achieved_efficiency(stage, column, shape, ctx.areas[index]);
                let beats_best = best.as_ref().map_or(true, |b| achieved > b.efficiency + EPSILON);
                if beats_best
                    && achieved > ctx.config.lower_bound
                    && amounts.reduction(stage, column, shape) > 0
                {
                    debug!(
                        "checked {shape} in stage {stage} and column {column} \
                         with an efficiency of {achieved:.3}"
                    );
                    best = Some(Candidate {
                        efficiency: achieved,
                        shape: index,
                        column,
                    });
                }
            }
        }
        best
    }
}

impl CompressionAlgorithm for MaxEfficiency {
    fn name(&self) -> &'static str {
        "MaxEfficiency"
    }

    fn plan(
        &self,
        ctx: &PlanContext<'_>,
        amounts: &mut BitAmounts,
        solution: &mut Solution,
    ) -> BitHeapResult<bool> {
        // stable, so equal efficiencies keep catalog order
        let mut order: Vec<usize> = (0..ctx.catalog.len()).collect();
        order.sort_by(|&a, &b| ctx.efficiency(b).total_cmp(&ctx.efficiency(a)));

        plan_by_stage(amounts, solution, |stage, amounts, solution| {
            let mut placed = 0;
            while let Some(best) = Self::best_placement(ctx, &order, amounts, stage) {
                let shape = &ctx.catalog.shapes()[best.shape];
                debug!(
                    "placed compressor {shape} in stage {stage} and column {} (efficiency {:.3})",
                    best.column, best.efficiency
                );
                amounts.place(stage, best.column, shape);
                solution.add_compressor(stage, best.column, best.shape, 0);
                placed += 1;
            }
            placed
        });
        Ok(true)
    }
}
