// This module organizes the compression strategies. CompressionStrategy (engine.rs) owns the
// generic iterate, freeze and finalize skeleton; the placement policy is a CompressionAlgorithm
// chosen through StrategyKind. Policies that plan ahead (MaxEfficiency, ParandehAfshar) work on
// the BitAmounts matrix and record their placements in a Solution, which the engine then applies
// to the real heap; whatever a plan leaves uncompressed is finished by the engine's own
// first-fit sweep. FirstFitting plans nothing and relies on the sweep alone, and Optimal is a
// named placeholder that fails before the heap is touched.

//! Compression strategies.
//!
//! ```ignore
//! use bitheap::strategy::{CompressionStrategy, StrategyConfig, StrategyKind};
//! use bitheap::compressor::CompressorCatalog;
//!
//! let config = StrategyConfig::default().with_kind(StrategyKind::MaxEfficiency);
//! let mut strategy = CompressionStrategy::new(config, CompressorCatalog::standard());
//! let sum = strategy.start_compression(&mut heap, &mut backend, &session)?;
//! println!("{}", strategy.solution().render(strategy.catalog()));
//! ```

pub mod bit_amounts;
pub mod config;
pub mod engine;
pub mod first_fitting;
pub mod max_efficiency;
pub mod optimal;
pub mod parandeh_afshar;
pub mod solution;

pub use bit_amounts::BitAmounts;
pub use config::{StrategyConfig, StrategyKind};
pub use engine::CompressionStrategy;
pub use first_fitting::FirstFitting;
pub use max_efficiency::MaxEfficiency;
pub use optimal::Optimal;
pub use parandeh_afshar::ParandehAfshar;
pub use solution::{Solution, SolutionEntry, SolutionStatus};

use log::debug;

use crate::compressor::CompressorCatalog;
use crate::core::BitHeapResult;

/// What a policy may look at while planning.
pub struct PlanContext<'a> {
    pub catalog: &'a CompressorCatalog,
    /// Area of each catalog shape, same order as the catalog.
    pub areas: Vec<f64>,
    pub config: &'a StrategyConfig,
}

impl PlanContext<'_> {
    /// Nominal efficiency of a catalog shape.
    pub fn efficiency(&self, shape: usize) -> f64 {
        self.catalog.shapes()[shape].efficiency(self.areas[shape])
    }
}

/// Placement policy plugged into [`CompressionStrategy`].
pub trait CompressionAlgorithm {
    fn name(&self) -> &'static str;

    /// Fail early, before the heap is modified, if the policy cannot run.
    fn check_available(&self) -> BitHeapResult<()> {
        Ok(())
    }

    /// Status of a fresh solution.
    fn initial_status(&self) -> SolutionStatus {
        SolutionStatus::HeuristicPartial
    }

    /// Place compressors on `amounts`, recording them in `solution`.
    ///
    /// Returns `false` when the policy leaves everything to the engine's sweep.
    fn plan(
        &self,
        ctx: &PlanContext<'_>,
        amounts: &mut BitAmounts,
        solution: &mut Solution,
    ) -> BitHeapResult<bool>;
}

/// Drive a per-stage placement routine until the matrix fits a final adder.
///
/// `place_stage` returns the number of compressors it placed in the stage.
/// Leftover bits move on to the next stage. Planning stops early once a stage
/// at or past the last occupied one places nothing.
pub(crate) fn plan_by_stage<F>(
    amounts: &mut BitAmounts,
    solution: &mut Solution,
    mut place_stage: F,
) where
    F: FnMut(usize, &mut BitAmounts, &mut Solution) -> usize,
{
    let mut stage = 0;
    loop {
        amounts.ensure_stage(stage + 1);
        if amounts.reached_adder(2, stage) {
            debug!("bit amounts fit a final adder at stage {stage}");
            break;
        }

        let placed = place_stage(stage, amounts, solution);
        let remaining = amounts.carry_forward(stage);
        solution.set_empty_inputs_by_remaining_bits(stage, &remaining);
        debug!("finished stage {stage} with {placed} compressors");

        if placed == 0 && stage >= amounts.last_occupied_stage() {
            debug!("no further placement possible at stage {stage}, leaving the rest to the sweep");
            break;
        }
        stage += 1;
    }
}
