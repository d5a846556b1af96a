// This module defines Solution, the audit record of a compression run: which compressor shape
// was placed how many times at which (stage, column), together with the inputs of each stage
// that had to be tied to zero because a placed compressor wanted more bits than the column
// held. The planning policies fill it before anything touches the heap; the engine then
// applies it stage by stage. Trailing stages and columns without compressors are trimmed
// before the solution is consumed.

//! Placement record of a compression run.

use std::fmt;

use log::warn;

use crate::compressor::CompressorCatalog;

/// Progress of a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolutionStatus {
    #[default]
    Empty,
    NoCompressionNeeded,
    HeuristicPartial,
    HeuristicComplete,
    OptimalPartial,
    OptimalComplete,
    MixedPartial,
    MixedComplete,
}

/// `amount` instances of one shape at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolutionEntry {
    /// Index in the catalog.
    pub shape: usize,
    pub amount: u32,
    /// Length of the middle section for variable-length shapes, zero otherwise.
    pub middle_length: u32,
}

/// Compressors placed per stage and column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Solution {
    comps: Vec<Vec<Vec<SolutionEntry>>>,
    empty_inputs: Vec<Vec<u32>>,
    status: SolutionStatus,
}

impl Solution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place one compressor; identical shapes at one position are counted together.
    pub fn add_compressor(
        &mut self,
        stage: usize,
        column: usize,
        shape: usize,
        middle_length: u32,
    ) {
        if stage >= self.comps.len() {
            self.comps.resize(stage + 1, Vec::new());
        }
        let columns = &mut self.comps[stage];
        if column >= columns.len() {
            columns.resize(column + 1, Vec::new());
        }

        let entries = &mut columns[column];
        match entries
            .iter_mut()
            .find(|e| e.shape == shape && e.middle_length == middle_length)
        {
            Some(entry) => entry.amount += 1,
            None => entries.push(SolutionEntry {
                shape,
                amount: 1,
                middle_length,
            }),
        }
    }

    /// Every compressor at a position, one element per instance.
    pub fn compressors_at(&self, stage: usize, column: usize) -> Vec<(usize, u32)> {
        self.comps
            .get(stage)
            .and_then(|columns| columns.get(column))
            .map(|entries| {
                entries
                    .iter()
                    .flat_map(|e| {
                        std::iter::repeat((e.shape, e.middle_length)).take(e.amount as usize)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn stage_count(&self) -> usize {
        self.comps.len()
    }

    /// Number of columns recorded for a stage, `None` past the last stage.
    pub fn column_count_at(&self, stage: usize) -> Option<usize> {
        self.comps.get(stage).map(Vec::len)
    }

    /// Total number of compressor instances.
    pub fn compressor_count(&self) -> usize {
        self.comps
            .iter()
            .flatten()
            .flatten()
            .map(|e| e.amount as usize)
            .sum()
    }

    /// Record, from the bit balance left after a stage, how many inputs of each
    /// column had no bit.
    pub fn set_empty_inputs_by_remaining_bits(&mut self, stage: usize, remaining: &[i64]) {
        if self.empty_inputs.len() <= stage {
            self.empty_inputs.resize(stage + 1, Vec::new());
        }
        self.empty_inputs[stage] = remaining
            .iter()
            .map(|&r| if r < 0 { (-r) as u32 } else { 0 })
            .collect();
    }

    /// Zero-tied inputs per column of a stage.
    pub fn empty_inputs(&self, stage: usize) -> &[u32] {
        self.empty_inputs.get(stage).map_or(&[], Vec::as_slice)
    }

    pub fn status(&self) -> SolutionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: SolutionStatus) {
        self.status = status;
    }

    pub fn mark_complete(&mut self) {
        self.status = match self.status {
            SolutionStatus::MixedPartial => SolutionStatus::MixedComplete,
            SolutionStatus::OptimalPartial => SolutionStatus::OptimalComplete,
            SolutionStatus::HeuristicPartial => SolutionStatus::HeuristicComplete,
            SolutionStatus::Empty => {
                warn!("tried to mark a solution as complete although it is empty");
                SolutionStatus::Empty
            }
            done => done,
        };
    }

    /// Drop trailing stages without compressors, then trailing empty columns of
    /// every stage.
    pub fn clean_up(&mut self) {
        while self
            .comps
            .last()
            .is_some_and(|columns| columns.iter().all(Vec::is_empty))
        {
            self.comps.pop();
        }
        for columns in &mut self.comps {
            while columns.last().is_some_and(Vec::is_empty) {
                columns.pop();
            }
        }
    }

    /// Human-readable listing using the catalog's shape names.
    pub fn render(&self, catalog: &CompressorCatalog) -> String {
        let mut out = format!(
            "Solution ({:?}, {} compressors)\n",
            self.status,
            self.compressor_count()
        );
        for (s, columns) in self.comps.iter().enumerate() {
            out.push_str(&format!("  stage {s}:\n"));
            for (c, entries) in columns.iter().enumerate() {
                for e in entries {
                    let name = catalog
                        .get(e.shape)
                        .map_or_else(|| format!("shape#{}", e.shape), |s| s.name());
                    out.push_str(&format!("    column {c}: {} x {name}\n", e.amount));
                }
            }
            let empty = self.empty_inputs(s);
            if empty.iter().any(|&n| n > 0) {
                out.push_str(&format!("    zero inputs: {empty:?}\n"));
            }
        }
        out
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SolutionStatus::Empty => "empty",
            SolutionStatus::NoCompressionNeeded => "no compression needed",
            SolutionStatus::HeuristicPartial => "heuristic (partial)",
            SolutionStatus::HeuristicComplete => "heuristic (complete)",
            SolutionStatus::OptimalPartial => "optimal (partial)",
            SolutionStatus::OptimalComplete => "optimal (complete)",
            SolutionStatus::MixedPartial => "mixed (partial)",
            SolutionStatus::MixedComplete => "mixed (complete)",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_compressor_merges_identical_entries() {
        let mut solution = Solution::new();
        solution.add_compressor(1, 2, 0, 0);
        solution.add_compressor(1, 2, 0, 0);
        solution.add_compressor(1, 2, 6, 0);

        assert_eq!(solution.stage_count(), 2);
        assert_eq!(solution.column_count_at(1), Some(3));
        assert_eq!(solution.column_count_at(0), Some(0));
        assert_eq!(solution.column_count_at(2), None);
        assert_eq!(solution.compressors_at(1, 2), vec![(0, 0), (0, 0), (6, 0)]);
        assert!(solution.compressors_at(0, 2).is_empty());
        assert_eq!(solution.compressor_count(), 3);
    }

    #[test]
    fn test_clean_up_trims_trailing_empties() {
        let mut solution = Solution::new();
        solution.add_compressor(0, 1, 0, 0);
        solution.add_compressor(3, 0, 0, 0);
        solution.comps[3][0].clear();
        solution.comps[0].resize(5, Vec::new());

        solution.clean_up();
        assert_eq!(solution.stage_count(), 1);
        assert_eq!(solution.column_count_at(0), Some(2));
    }

    #[test]
    fn test_status_transitions() {
        let mut solution = Solution::new();
        solution.mark_complete();
        assert_eq!(solution.status(), SolutionStatus::Empty);

        solution.set_status(SolutionStatus::HeuristicPartial);
        solution.mark_complete();
        assert_eq!(solution.status(), SolutionStatus::HeuristicComplete);

        solution.set_status(SolutionStatus::NoCompressionNeeded);
        solution.mark_complete();
        assert_eq!(solution.status(), SolutionStatus::NoCompressionNeeded);
    }

    #[test]
    fn test_empty_inputs_from_remaining_bits() {
        let mut solution = Solution::new();
        solution.set_empty_inputs_by_remaining_bits(2, &[0, -2, 3]);
        assert_eq!(solution.empty_inputs(2), &[0, 2, 0]);
        assert!(solution.empty_inputs(0).is_empty());
        assert!(solution.empty_inputs(7).is_empty());
    }
}
