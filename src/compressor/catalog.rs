//! Ranked list of compressor shapes.
//!
//! The standard catalog is hand-picked for compression ratio and its order is
//! part of the algorithm: strategies walk it front to back, so earlier shapes
//! win ties.

use log::debug;

use super::shape::CompressorShape;
use crate::core::{BitHeapResult, CircuitBackend};

/// Standard shapes, anchor column first, in decreasing preference.
pub const STANDARD_HEIGHTS: [[u32; 2]; 7] = [
    [6, 0],
    [4, 1],
    [5, 0],
    [3, 1],
    [4, 0],
    [3, 2],
    [3, 0],
];

/// Immutable, ordered set of shapes handed to a strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressorCatalog {
    shapes: Vec<CompressorShape>,
}

impl CompressorCatalog {
    /// The standard seven-shape catalog.
    pub fn standard() -> Self {
        let shapes = STANDARD_HEIGHTS
            .iter()
            .filter_map(|h| CompressorShape::new(h).ok())
            .collect();
        Self { shapes }
    }

    /// Catalog from explicit heights, kept in the given order.
    pub fn from_heights(heights: &[Vec<u32>]) -> BitHeapResult<Self> {
        let shapes = heights
            .iter()
            .map(|h| CompressorShape::new(h))
            .collect::<BitHeapResult<Vec<_>>>()?;
        debug!("Built catalog of {} compressor shapes", shapes.len());
        Ok(Self { shapes })
    }

    pub fn shapes(&self) -> &[CompressorShape] {
        &self.shapes
    }

    pub fn get(&self, index: usize) -> Option<&CompressorShape> {
        self.shapes.get(index)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompressorShape> {
        self.shapes.iter()
    }

    /// Nominal efficiency of every shape, using the backend's area model.
    pub fn efficiencies<B: CircuitBackend + ?Sized>(&self, backend: &B) -> Vec<f64> {
        self.shapes
            .iter()
            .map(|s| s.efficiency(backend.primitive_area(s)))
            .collect()
    }

    /// Shape indices sorted by decreasing efficiency; equal efficiencies keep
    /// catalog order.
    pub fn ranked<B: CircuitBackend + ?Sized>(&self, backend: &B) -> Vec<usize> {
        let eff = self.efficiencies(backend);
        let mut order: Vec<usize> = (0..self.shapes.len()).collect();
        order.sort_by(|&a, &b| eff[b].total_cmp(&eff[a]));
        order
    }

    /// Index of the first shape with these heights.
    pub fn position(&self, heights: &[u32]) -> Option<usize> {
        let probe = CompressorShape::new(heights).ok()?;
        self.shapes.iter().position(|s| s.heights() == probe.heights())
    }
}

impl Default for CompressorCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netlist::NetlistBackend;

    #[test]
    fn test_standard_catalog_order_and_widths() {
        let catalog = CompressorCatalog::standard();
        let names: Vec<String> = catalog.iter().map(CompressorShape::name).collect();
        assert_eq!(
            names,
            vec![
                "Compressor_6_3",
                "Compressor_14_3",
                "Compressor_5_3",
                "Compressor_13_3",
                "Compressor_4_3",
                "Compressor_23_3",
                "Compressor_3_2",
            ]
        );
        assert!(catalog.iter().all(|s| s.reduction() >= 1));
    }

    #[test]
    fn test_ranking_is_stable() {
        let backend = NetlistBackend::default();
        let catalog = CompressorCatalog::standard();
        // [6] first, then the 2/3 group in catalog order, then [3] and the 1/3 group
        assert_eq!(catalog.ranked(&backend), vec![0, 1, 2, 5, 6, 3, 4]);
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = CompressorCatalog::from_heights(&[vec![2, 2], vec![3]]).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.position(&[3, 0]), Some(1));
        assert!(CompressorCatalog::from_heights(&[vec![0]]).is_err());
    }
}
