// This module provides arena-based session management for bit-heap compression using the
// bumpalo crate. CompressionSession is the hub shared by every compression run of a circuit:
// it owns a reference to the arena allocator, interns the signal names generated for bits,
// compressor outputs and chunks (so names handed to reports live as long as the session), and
// tracks statistics in a RefCell so that the engine can record progress through a shared
// reference. SessionStats counts compression rounds, timing-window widenings, compressors
// placed per shape, frozen chunks, bits added and removed, and the width of each final adder,
// and renders them through Display for the driver binary.

//! Arena-based compression session management.
//!
//! All interned names are tied to the session lifetime, so reports and
//! statistics can borrow them without cloning.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena-based compression session.
pub struct CompressionSession<'arena> {
    /// Arena allocator for session objects.
    arena: &'arena Bump,

    /// Session statistics.
    stats: RefCell<SessionStats>,

    /// String interning for generated names.
    interned_strings: RefCell<HashMap<String, &'arena str>>,

    /// Heap currently being compressed.
    current_heap: RefCell<Option<String>>,
}

impl<'arena> CompressionSession<'arena> {
    /// Create a new compression session with the given arena.
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
            current_heap: RefCell::new(None),
        }
    }

    /// Intern a string in the arena.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }

        let interned = self.arena.alloc_str(s);
        strings.insert(s.to_string(), interned);
        interned
    }

    /// Set the heap being compressed.
    pub fn set_current_heap(&self, name: &str) {
        *self.current_heap.borrow_mut() = Some(name.to_string());
    }

    pub fn current_heap(&self) -> Option<String> {
        self.current_heap.borrow().clone()
    }

    /// Record the start of a compression run.
    pub fn record_run_started(&self) {
        self.stats.borrow_mut().runs += 1;
    }

    /// Record one matching sweep over the catalog.
    pub fn record_round(&self) {
        self.stats.borrow_mut().rounds += 1;
    }

    /// Record a widening of the timing window.
    pub fn record_window_widened(&self) {
        self.stats.borrow_mut().window_widenings += 1;
    }

    /// Record a compressor instance.
    pub fn record_compressor_placed(&self, shape: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.compressors_placed += 1;
        *stats
            .compressor_counts
            .entry(shape.to_string())
            .or_insert(0) += 1;
    }

    /// Record a frozen chunk of `columns` low-order columns.
    pub fn record_chunk_frozen(&self, columns: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.chunks_frozen += 1;
        stats.columns_frozen += columns;
    }

    pub fn record_bits_added(&self, count: usize) {
        self.stats.borrow_mut().bits_added += count;
    }

    pub fn record_bits_removed(&self, count: usize) {
        self.stats.borrow_mut().bits_removed += count;
    }

    /// Record the final carry-propagate adder.
    pub fn record_final_adder(&self, width: u32) {
        let mut stats = self.stats.borrow_mut();
        stats.final_adders += 1;
        stats.final_adder_bits += width as usize;
    }

    /// Get compression statistics.
    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Compression session statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    /// Number of compression runs started.
    pub runs: usize,

    /// Catalog sweeps over the heap.
    pub rounds: usize,

    /// Times the timing window had to be widened.
    pub window_widenings: usize,

    /// Compressor instances emitted.
    pub compressors_placed: usize,

    /// Count of each compressor shape placed.
    pub compressor_counts: HashMap<String, usize>,

    /// Chunks frozen by the low-order column scan.
    pub chunks_frozen: usize,

    /// Columns covered by those chunks.
    pub columns_frozen: usize,

    /// Bits created by compressor outputs.
    pub bits_added: usize,

    /// Bits garbage collected after compression.
    pub bits_removed: usize,

    /// Final adders emitted.
    pub final_adders: usize,

    /// Total width of the final adders.
    pub final_adder_bits: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Compression Session Statistics:")?;
        writeln!(f, "  Compression runs: {}", self.runs)?;
        writeln!(f, "  Rounds: {}", self.rounds)?;
        writeln!(f, "  Window widenings: {}", self.window_widenings)?;
        writeln!(f, "  Compressors placed: {}", self.compressors_placed)?;
        writeln!(
            f,
            "  Chunks frozen: {} ({} columns)",
            self.chunks_frozen, self.columns_frozen
        )?;
        writeln!(f, "  Bits added: {}", self.bits_added)?;
        writeln!(f, "  Bits removed: {}", self.bits_removed)?;
        writeln!(
            f,
            "  Final adders: {} ({} bits)",
            self.final_adders, self.final_adder_bits
        )?;

        if !self.compressor_counts.is_empty() {
            writeln!(f, "  Compressor breakdown:")?;
            let mut sorted: Vec<_> = self.compressor_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

            for (shape, count) in sorted {
                writeln!(f, "    {}: {}", shape, count)?;
            }
        }

        Ok(())
    }
}
