//! Strategy selection and tuning knobs.

use clap::ValueEnum;

use super::first_fitting::FirstFitting;
use super::max_efficiency::MaxEfficiency;
use super::optimal::Optimal;
use super::parandeh_afshar::ParandehAfshar;
use super::CompressionAlgorithm;

/// Placement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum StrategyKind {
    /// Catalog order, lowest column first.
    #[default]
    FirstFitting,
    /// Greedy on achieved efficiency, stage by stage.
    MaxEfficiency,
    /// Forward/backward column search per stage.
    ParandehAfshar,
    /// Exact formulation; not available.
    Optimal,
}

impl StrategyKind {
    /// Algorithm object for this policy.
    pub fn algorithm(self) -> Box<dyn CompressionAlgorithm> {
        match self {
            StrategyKind::FirstFitting => Box::new(FirstFitting),
            StrategyKind::MaxEfficiency => Box::new(MaxEfficiency),
            StrategyKind::ParandehAfshar => Box::new(ParandehAfshar),
            StrategyKind::Optimal => Box::new(Optimal),
        }
    }
}

/// Configuration of a compression run.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub kind: StrategyKind,
    /// Consecutive sweeps without a placement tolerated, once the window
    /// already covers every open free bit, before giving up.
    pub max_window_widenings: u32,
    /// Achieved efficiency a MaxEfficiency placement must strictly exceed.
    pub lower_bound: f64,
    /// Log compressor truth tables grouped by output value.
    pub compact_truth_tables: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: StrategyKind::FirstFitting,
            max_window_widenings: 64,
            lower_bound: 0.0,
            compact_truth_tables: false,
        }
    }
}

impl StrategyConfig {
    pub fn with_kind(mut self, kind: StrategyKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_max_window_widenings(mut self, retries: u32) -> Self {
        self.max_window_widenings = retries;
        self
    }

    pub fn with_lower_bound(mut self, lower_bound: f64) -> Self {
        self.lower_bound = lower_bound;
        self
    }

    pub fn with_compact_truth_tables(mut self, compact: bool) -> Self {
        self.compact_truth_tables = compact;
        self
    }
}
