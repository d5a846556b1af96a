//! Placeholder for an exact (ILP) placement.

use super::{BitAmounts, CompressionAlgorithm, PlanContext, Solution, SolutionStatus};
use crate::core::{BitHeapError, BitHeapResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct Optimal;

impl CompressionAlgorithm for Optimal {
    fn name(&self) -> &'static str {
        "Optimal"
    }

    fn check_available(&self) -> BitHeapResult<()> {
        Err(BitHeapError::Unimplemented { strategy: self.name() })
    }

    fn initial_status(&self) -> SolutionStatus {
        SolutionStatus::OptimalPartial
    }

    fn plan(
        &self,
        _ctx: &PlanContext<'_>,
        _amounts: &mut BitAmounts,
        _solution: &mut Solution,
    ) -> BitHeapResult<bool> {
        Err(BitHeapError::Unimplemented { strategy: self.name() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimal_is_unavailable() {
        assert_eq!(
            Optimal.check_available(),
            Err(BitHeapError::Unimplemented { strategy: "Optimal" })
        );
    }
}
