//! Heap bookkeeping and catalog properties.

mod common;

use num_bigint::BigInt;
use num_traits::Zero;
use proptest::prelude::*;

use bitheap::core::{ArrivalTime, BitExpr, BitStatus};
use bitheap::{BitHeap, CompressorCatalog, CompressorShape, NetlistBackend, RemoveFrom};

/// Every live bit sits in the column of its weight, columns sorted by arrival.
fn assert_columns_consistent(heap: &BitHeap) {
    for column in 0..heap.width() {
        let weight = heap.weight_of(column);
        let ids = heap.column(weight).unwrap();
        for &id in ids {
            assert_eq!(heap.bit(id).weight, weight);
        }
        for pair in ids.windows(2) {
            assert!(heap.bit(pair[0]).arrival <= heap.bit(pair[1]).arrival);
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Add { weight: i32, cycle: u32, delay: u8 },
    RemoveOldest { weight: i32 },
    RemoveNewest { weight: i32 },
    Mark { weight: i32, number: usize },
    Collect,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (-3i32..12, 0u32..3, 0u8..20)
            .prop_map(|(weight, cycle, delay)| Op::Add { weight, cycle, delay }),
        1 => (0i32..8).prop_map(|weight| Op::RemoveOldest { weight }),
        1 => (0i32..8).prop_map(|weight| Op::RemoveNewest { weight }),
        1 => (0i32..8, 0usize..4).prop_map(|(weight, number)| Op::Mark { weight, number }),
        1 => Just(Op::Collect),
    ]
}

proptest! {
    #[test]
    fn prop_column_invariant_holds(ops in prop::collection::vec(op(), 1..80)) {
        common::init_logging();
        let mut backend = NetlistBackend::default();
        let mut heap = BitHeap::integer(&mut backend, 8, false, "prop").unwrap();

        for (i, op) in ops.into_iter().enumerate() {
            match op {
                Op::Add { weight, cycle, delay } => {
                    let arrival = ArrivalTime::new(cycle, f64::from(delay) * 0.1);
                    let signal = backend.add_input_at(&format!("in{i}"), 1, false, arrival);
                    let added =
                        heap.add_bit(&mut backend, weight, BitExpr::bit(signal, 0)).unwrap();
                    prop_assert_eq!(added.is_some(), (0..8).contains(&weight));
                }
                Op::RemoveOldest { weight } => {
                    let height = heap.column_height(weight).unwrap();
                    let removed = heap.remove_bit(weight, RemoveFrom::Oldest);
                    prop_assert_eq!(removed.is_ok(), height > 0);
                }
                Op::RemoveNewest { weight } => {
                    let height = heap.column_height(weight).unwrap();
                    let removed = heap.remove_bit(weight, RemoveFrom::Newest);
                    prop_assert_eq!(removed.is_ok(), height > 0);
                }
                Op::Mark { weight, number } => {
                    let height = heap.column_height(weight).unwrap();
                    let marked = heap.mark_bit(weight, number, BitStatus::Compressed);
                    prop_assert_eq!(marked.is_ok(), number < height);
                }
                Op::Collect => {
                    heap.remove_compressed_bits();
                    let all_free = (0..8).all(|w| {
                        heap.free_bits(w).unwrap().len() == heap.column_height(w).unwrap()
                    });
                    prop_assert!(all_free);
                }
            }
            assert_columns_consistent(&heap);
        }
    }
}

#[test]
fn test_constant_one_bit_round_trip_creates_no_bits() {
    common::init_logging();
    let mut backend = NetlistBackend::default();
    let mut heap = BitHeap::integer(&mut backend, 8, false, "constants").unwrap();

    heap.sub_constant_one_bit(0).unwrap();
    heap.add_constant_one_bit(0).unwrap();
    assert!(heap.constant().is_zero());
    assert_eq!(heap.lower_constant(&mut backend).unwrap(), 0);
    assert_eq!(heap.bit_count(), 0);
    assert!(backend.signals().is_empty());
}

#[test]
fn test_range_errors_are_hard_except_for_add_bit() {
    common::init_logging();
    let mut backend = NetlistBackend::default();
    let a = backend.add_input("a", 1, false);
    let mut heap = BitHeap::new(&mut backend, 7, 0, false, "ranges").unwrap();

    assert_eq!(heap.add_bit(&mut backend, 8, BitExpr::bit(a, 0)).unwrap(), None);
    let err = heap.add_constant(&BigInt::from(1), 8).unwrap_err();
    assert!(err.is_recoverable());
    assert!(heap.remove_bit(9, RemoveFrom::Oldest).is_err());
    assert!(heap.mark_bits_in_range(9, 0, BitStatus::Compressed, None).is_err());
    assert!(heap.remove_bits_in_range(3, 5, 1, RemoveFrom::Oldest).is_err());
}

#[test]
fn test_standard_catalog_counts_ones() {
    let catalog = CompressorCatalog::standard();
    assert_eq!(catalog.len(), 7);

    for shape in catalog.iter() {
        for pattern in 0..(1u32 << shape.input_width()) {
            let mut expected = 0;
            let mut offset = 0;
            for (j, &height) in shape.heights().iter().enumerate() {
                let ones = ((pattern >> offset) & ((1 << height) - 1)).count_ones();
                expected += ones << j;
                offset += height;
            }
            assert_eq!(shape.lookup(pattern), expected, "{shape} on {pattern:#b}");
        }
    }

    let full_adder = CompressorShape::new(&[3, 0]).unwrap();
    assert_eq!(full_adder.lookup(0b111), 3);
    assert_eq!(full_adder.output_width(), 2);
}
