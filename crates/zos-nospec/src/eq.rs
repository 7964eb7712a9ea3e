//! Equality mask generator
//!
//! `neq_mask_nospec(x, y)` returns `!0` when `x == y` and `0` when they
//! differ: a mask that zeroes a value whenever the operands are not equal.
//!
//! With `d = x ^ y`:
//!
//! ```text
//! mask = ((d ^ (d - 1)) as isize) >> (W - 1)
//! ```
//!
//! For `d == 0`, `d - 1` wraps to all-ones and so does the mask. For
//! `d != 0`, `d ^ (d - 1)` is the run of ones from bit 0 up to and including
//! the lowest set bit of `d`, so its sign bit is clear unless that lowest set
//! bit *is* the sign bit.
//!
//! # Sign-Bit Edge Case
//!
//! When `x ^ y == 1 << (W - 1)`, i.e. the operands differ in the sign bit and
//! nowhere else, `neq_mask_nospec` reports them as equal. Operands narrower
//! than a machine word are zero-extended and can never differ in the sign
//! bit, so guard fields of `u8`/`u16`/`u32` (on 64-bit) cannot hit it.
//! [`neq_mask_exact_nospec`] is exact for every input.

use crate::hide::hide_var;
use crate::word::WORD_BITS;

/// Generate `!0` when `x == y`, `0` otherwise, without branching.
///
/// Misclassifies exactly one family of unequal inputs: those whose XOR is the
/// lone sign bit. See the module documentation.
#[inline(always)]
pub fn neq_mask_nospec(mut x: usize, mut y: usize) -> usize {
    // Always compute and emit the mask: the compiler does not account for
    // the values of `x` and `y` under speculation.
    hide_var(&mut x);
    hide_var(&mut y);
    let d = x ^ y;
    ((d ^ d.wrapping_sub(1)) as isize >> (WORD_BITS - 1)) as usize
}

/// Generate `!0` when `x == y`, `0` otherwise, exact for all inputs.
///
/// `d | -d` has its sign bit set for every non-zero `d` (either `d` or its
/// two's complement negation is at least `2^(W-1)`), and is zero for `d == 0`.
#[inline(always)]
pub fn neq_mask_exact_nospec(mut x: usize, mut y: usize) -> usize {
    hide_var(&mut x);
    hide_var(&mut y);
    let d = x ^ y;
    !(((d | d.wrapping_neg()) as isize >> (WORD_BITS - 1)) as usize)
}

// ============================================================================
// Kani Proofs
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    const SIGN_BIT: usize = 1 << (WORD_BITS - 1);

    /// Proof: the mask is full and correct everywhere except the sign-bit case
    #[kani::proof]
    fn neq_mask_correct_off_sign_bit() {
        let x: usize = kani::any();
        let y: usize = kani::any();

        let mask = neq_mask_nospec(x, y);

        kani::assert(mask == 0 || mask == usize::MAX, "Mask must be full");
        if x ^ y != SIGN_BIT {
            kani::assert((mask == usize::MAX) == (x == y), "Mask must match equality");
        }
    }

    /// Proof: the exact mask is correct for all inputs
    #[kani::proof]
    fn neq_mask_exact_correct() {
        let x: usize = kani::any();
        let y: usize = kani::any();

        let mask = neq_mask_exact_nospec(x, y);

        kani::assert(mask == 0 || mask == usize::MAX, "Mask must be full");
        kani::assert((mask == usize::MAX) == (x == y), "Mask must match equality");
    }
}
