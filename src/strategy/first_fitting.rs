//! First-fit placement: catalog order, lowest column first.
//!
//! This is the engine's own sweep, so the policy plans nothing.

use super::{BitAmounts, CompressionAlgorithm, PlanContext, Solution};
use crate::core::BitHeapResult;

#[derive(Debug, Clone, Copy, Default)]
pub struct FirstFitting;

impl CompressionAlgorithm for FirstFitting {
    fn name(&self) -> &'static str {
        "FirstFitting"
    }

    fn plan(
        &self,
        _ctx: &PlanContext<'_>,
        _amounts: &mut BitAmounts,
        _solution: &mut Solution,
    ) -> BitHeapResult<bool> {
        Ok(false)
    }
}
