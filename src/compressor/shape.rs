// This module defines CompressorShape, the immutable description of a counting primitive: how
// many bits it consumes in each column relative to its anchor, and how many output bits (at
// increasing weights from the anchor) it produces. The output width is the number of bits
// needed for the largest weighted population count. The truth table, the semantic definition of
// the primitive, is built once by exhaustively enumerating every input pattern; a compact view
// groups the patterns that produce the same output, which is how the primitive is listed when
// the table is printed as a single case statement.

//! Compressor shapes and their truth tables.

use std::fmt;

use crate::core::{BitHeapError, BitHeapResult};

/// Input patterns of a shape are enumerated exhaustively; keep them small.
const MAX_INPUT_WIDTH: u32 = 16;

/// A counting primitive.
///
/// Input pattern bit layout: the bits of column 0 come first (least
/// significant), then those of column 1, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressorShape {
    heights: Vec<u32>,
    input_width: u32,
    output_width: u32,
    max_value: u32,
    truth_table: Vec<u32>,
}

/// Rows of a truth table sharing one output value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactRow {
    pub output: u32,
    pub inputs: Vec<u32>,
}

impl CompressorShape {
    /// Build a shape from its per-column heights, anchor column first.
    ///
    /// Trailing zero-height columns are trimmed.
    pub fn new(heights: &[u32]) -> BitHeapResult<Self> {
        let mut trimmed = heights.to_vec();
        while trimmed.last() == Some(&0) {
            trimmed.pop();
        }

        let invalid = |reason| BitHeapError::InvalidShape {
            heights: heights.to_vec(),
            reason,
        };
        if trimmed.is_empty() {
            return Err(invalid("shape consumes no bits"));
        }
        if trimmed[0] == 0 {
            return Err(invalid("anchor column must consume at least one bit"));
        }

        let input_width: u32 = trimmed.iter().sum();
        if input_width > MAX_INPUT_WIDTH {
            return Err(invalid("too many inputs to enumerate"));
        }

        let max_value: u32 = trimmed.iter().enumerate().map(|(j, &h)| h << j).sum();
        let output_width = u32::BITS - max_value.leading_zeros();

        let mut shape = Self {
            heights: trimmed,
            input_width,
            output_width,
            max_value,
            truth_table: Vec::new(),
        };
        shape.truth_table = (0..1u32 << input_width)
            .map(|pattern| shape.count(pattern))
            .collect();
        Ok(shape)
    }

    /// Weighted population count of one input pattern.
    fn count(&self, pattern: u32) -> u32 {
        let mut rest = pattern;
        let mut sum = 0;
        for (j, &h) in self.heights.iter().enumerate() {
            let column = rest & ((1 << h) - 1);
            sum += column.count_ones() << j;
            rest >>= h;
        }
        sum
    }

    /// Heights per relative column, anchor first.
    pub fn heights(&self) -> &[u32] {
        &self.heights
    }

    /// Bits consumed in relative column `column`; zero past the shape.
    pub fn column_size(&self, column: usize) -> u32 {
        self.heights.get(column).copied().unwrap_or(0)
    }

    /// Number of relative columns the shape reads.
    pub fn column_count(&self) -> usize {
        self.heights.len()
    }

    pub fn input_width(&self) -> u32 {
        self.input_width
    }

    pub fn output_width(&self) -> u32 {
        self.output_width
    }

    /// Largest achievable output.
    pub fn max_value(&self) -> u32 {
        self.max_value
    }

    /// Bits removed from the heap by one instance.
    pub fn reduction(&self) -> i32 {
        self.input_width as i32 - self.output_width as i32
    }

    /// Nominal efficiency `(inputs - outputs) / area`.
    pub fn efficiency(&self, area: f64) -> f64 {
        self.reduction() as f64 / area
    }

    /// Efficiency when only `available[j]` bits can be fed to column `j`.
    ///
    /// Inputs without a bit are tied to zero and do not count.
    pub fn achieved_efficiency(&self, available: &[u32], area: f64) -> f64 {
        let covered: u32 = self
            .heights
            .iter()
            .enumerate()
            .map(|(j, &h)| h.min(available.get(j).copied().unwrap_or(0)))
            .sum();
        (covered as f64 - self.output_width as f64) / area
    }

    /// Output for an input pattern.
    pub fn lookup(&self, pattern: u32) -> u32 {
        self.truth_table[pattern as usize]
    }

    /// Output for given per-column counts of ones.
    pub fn evaluate(&self, ones_per_column: &[u32]) -> u32 {
        ones_per_column
            .iter()
            .enumerate()
            .map(|(j, &ones)| ones.min(self.column_size(j)) << j)
            .sum()
    }

    /// Full truth table indexed by input pattern.
    pub fn truth_table(&self) -> &[u32] {
        &self.truth_table
    }

    /// Truth table rows grouped by output value, ascending.
    pub fn compact_truth_table(&self) -> Vec<CompactRow> {
        let mut rows: Vec<CompactRow> = (0..=self.max_value)
            .map(|output| CompactRow {
                output,
                inputs: Vec::new(),
            })
            .collect();
        for (pattern, &output) in self.truth_table.iter().enumerate() {
            rows[output as usize].inputs.push(pattern as u32);
        }
        rows.retain(|row| !row.inputs.is_empty());
        rows
    }

    /// Primitive name, heights listed most significant column first.
    pub fn name(&self) -> String {
        let heights: String = self.heights.iter().rev().map(u32::to_string).collect();
        format!("Compressor_{}_{}", heights, self.output_width)
    }

    /// Truth table as case-statement text, one row per line.
    pub fn table_listing(&self, compact: bool) -> String {
        let bin = |value: u32, width: u32| format!("{:0width$b}", value, width = width as usize);
        let mut out = String::new();
        if compact {
            for row in self.compact_truth_table() {
                let inputs: Vec<String> = row
                    .inputs
                    .iter()
                    .map(|&p| format!("\"{}\"", bin(p, self.input_width)))
                    .collect();
                out.push_str(&format!(
                    "\"{}\" when {},\n",
                    bin(row.output, self.output_width),
                    inputs.join(" | ")
                ));
            }
        } else {
            for (pattern, &output) in self.truth_table.iter().enumerate() {
                out.push_str(&format!(
                    "\"{}\" when \"{}\",\n",
                    bin(output, self.output_width),
                    bin(pattern as u32, self.input_width)
                ));
            }
        }
        out.push_str(&format!(
            "\"{}\" when others;\n",
            "-".repeat(self.output_width as usize)
        ));
        out
    }
}

impl fmt::Display for CompressorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_three_to_two_counter() {
        let shape = CompressorShape::new(&[3, 0]).unwrap();
        assert_eq!(shape.heights(), &[3]);
        assert_eq!(shape.input_width(), 3);
        assert_eq!(shape.output_width(), 2);
        assert_eq!(shape.lookup(0b111), 3);
        assert_eq!(shape.lookup(0b101), 2);
        assert_eq!(shape.name(), "Compressor_3_2");
    }

    #[test]
    fn test_two_column_shape_weights_upper_column() {
        let shape = CompressorShape::new(&[3, 2]).unwrap();
        assert_eq!(shape.max_value(), 7);
        assert_eq!(shape.output_width(), 3);
        // two ones in column 1, none in column 0
        assert_eq!(shape.lookup(0b11_000), 4);
        assert_eq!(shape.lookup(0b01_011), 4);
        assert_eq!(shape.evaluate(&[3, 2]), 7);
        assert_eq!(shape.name(), "Compressor_23_3");
    }

    #[test]
    fn test_invalid_shapes_are_rejected() {
        assert!(matches!(
            CompressorShape::new(&[0, 0]),
            Err(BitHeapError::InvalidShape { .. })
        ));
        assert!(CompressorShape::new(&[0, 3]).is_err());
        assert!(CompressorShape::new(&[17]).is_err());
    }

    #[test]
    fn test_compact_table_groups_outputs() {
        let shape = CompressorShape::new(&[3]).unwrap();
        let rows = shape.compact_truth_table();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].inputs, vec![0b001, 0b010, 0b100]);
        assert_eq!(rows[3].inputs, vec![0b111]);

        let listing = shape.table_listing(true);
        assert!(listing.contains("\"01\" when \"001\" | \"010\" | \"100\","));
        assert!(listing.ends_with("\"--\" when others;\n"));
    }

    #[test]
    fn test_achieved_efficiency() {
        let shape = CompressorShape::new(&[6]).unwrap();
        let area = shape.output_width() as f64;
        assert!((shape.efficiency(area) - 1.0).abs() < 1e-9);
        assert!((shape.achieved_efficiency(&[4], area) - 1.0 / 3.0).abs() < 1e-9);
        assert!(shape.achieved_efficiency(&[3], area) <= 0.0);
    }

    proptest! {
        #[test]
        fn prop_truth_table_is_weighted_popcount(
            h0 in 1u32..=6,
            h1 in 0u32..=3,
            pattern in any::<u32>(),
        ) {
            let shape = CompressorShape::new(&[h0, h1]).unwrap();
            let pattern = pattern & ((1 << shape.input_width()) - 1);
            let low = (pattern & ((1 << h0) - 1)).count_ones();
            let high = (pattern >> h0).count_ones();
            prop_assert_eq!(shape.lookup(pattern), low + 2 * high);
            prop_assert!(shape.lookup(pattern) < 1 << shape.output_width());
        }
    }
}
