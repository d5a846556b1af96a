//! Two's-complement constant folding.
//!
//! Adding a signed value whose sign bit sits at weight `w` to a heap whose top
//! column is `msb` would normally require sign-extending it up to `msb`. Since
//!
//! ```text
//! -s * 2^w  ==  (1 - s) * 2^w - 2^w
//!           ==  not(s) * 2^w + (2^w + 2^(w+1) + ... + 2^msb)   (mod 2^(msb+1))
//! ```
//!
//! the sign bit can be replaced by its complement and the sign extension by a run
//! of constant ones from `w` to `msb`, which is folded into the constant
//! accumulator instead of being materialized as hardware bits.
//!
//! The same identity gives subtraction: `-x == not(x) + 1` over the vector's own
//! bits, with the ones above the vector again folded into the accumulator.

use num_bigint::BigInt;
use num_traits::{One, Zero};

/// Constant `2^from + 2^(from+1) + ... + 2^to`, zero if `from > to`.
pub fn ones_run(from: i32, to: i32, heap_lsb: i32) -> BigInt {
    let mut run = BigInt::zero();
    for weight in from..=to {
        run += BigInt::one() << ((weight - heap_lsb) as usize);
    }
    run
}

/// Constant that replaces the sign extension of a sign bit at `sign_weight`,
/// once that bit has been complemented.
///
/// Weights are absolute; the result is expressed relative to `heap_lsb`.
pub fn sign_extension_constant(sign_weight: i32, heap_msb: i32, heap_lsb: i32) -> BigInt {
    ones_run(sign_weight, heap_msb, heap_lsb)
}

/// Constant that completes the negation of an unsigned vector spanning
/// `[start, end]` once all of its bits have been complemented: one at `start`
/// plus the run of ones strictly above `end`.
pub fn negation_constant(start: i32, end: i32, heap_msb: i32, heap_lsb: i32) -> BigInt {
    (BigInt::one() << ((start - heap_lsb) as usize)) + ones_run(end + 1, heap_msb, heap_lsb)
}

/// Constant that completes the negation of a signed vector spanning
/// `[start, end]`: the data bits are complemented, the sign bit is kept, one is
/// added at `start` and the run from `end` to the heap msb absorbs the sign.
pub fn signed_negation_constant(start: i32, end: i32, heap_msb: i32, heap_lsb: i32) -> BigInt {
    (BigInt::one() << ((start - heap_lsb) as usize)) + ones_run(end, heap_msb, heap_lsb)
}
