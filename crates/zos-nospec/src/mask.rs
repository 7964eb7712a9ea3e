//! Index mask generator and index sanitizer
//!
//! For a code sequence like:
//!
//! ```
//! # use zos_nospec::array_index_nospec;
//! # let array = [0u8; 16];
//! # let index = 3usize;
//! # let size = array.len();
//! if index < size {
//!     let index = array_index_nospec(index, size);
//!     let _val = array[index];
//! }
//! ```
//!
//! ...if the CPU speculates past the bounds check, `array_index_nospec`
//! still clamps the index into `[0, size)`, because the clamp is computed
//! with arithmetic rather than another branch.
//!
//! # Mask Identity
//!
//! With `W = usize::BITS` and wrapping arithmetic:
//!
//! ```text
//! t    = index | (size - 1 - index)
//! mask = (!t as isize) >> (W - 1)
//! ```
//!
//! If `index < size`, both `index` and `size - 1 - index` lie in
//! `[0, size - 1]`, so the sign bit of `t` is clear. If `index >= size`, the
//! subtraction wraps and sets the sign bit of `t`. Complementing and
//! arithmetic-shifting replicates that bit across the word, so the mask is
//! all-ones in bounds and all-zeros out of bounds. It is never a partial
//! pattern.
//!
//! Requires `size >= 1`. The identity also needs `size <= isize::MAX + 1`,
//! which every real array length satisfies.

use crate::barrier::{ArchBarrier, SpeculationBarrier};
use crate::hide::hide;
use crate::word::{NospecWord, WORD_BITS};

/// Generate `!0` when `index < size`, `0` otherwise, without branching.
#[inline(always)]
pub fn array_index_mask_nospec(index: usize, size: usize) -> usize {
    // Always compute and emit the mask: the compiler does not account for
    // the value of `index` under speculation.
    let index = hide(index);
    let t = index | size.wrapping_sub(1).wrapping_sub(index);
    let mask = ((!t) as isize >> (WORD_BITS - 1)) as usize;
    <ArchBarrier as SpeculationBarrier>::mask_barrier();
    mask
}

/// Sanitize an array index after a bounds check.
///
/// Returns `index` when `index < size` and `0` otherwise, in the index's own
/// type. A negative signed index sign-extends to a huge word and is clamped
/// to `0`.
///
/// Both operands must be at most one machine word wide; a wider type is a
/// compile error.
///
/// This is a second, speculation-safe layer. It does not replace the
/// ordinary bounds check that gates the code path.
#[inline(always)]
pub fn array_index_nospec<I: NospecWord, S: NospecWord>(index: I, size: S) -> I {
    let () = I::WIDTH_OK;
    let () = S::WIDTH_OK;

    let mask = array_index_mask_nospec(index.to_word(), size.to_word());
    I::from_word(index.to_word() & mask)
}

/// Bounds-checked, speculation-safe slice access.
///
/// Performs the architectural check and feeds the sanitized index to the
/// load. Empty slices return `None` without computing a mask.
#[inline]
pub fn slice_index_nospec<T>(slice: &[T], index: usize) -> Option<&T> {
    let len = slice.len();
    if index >= len {
        return None;
    }
    let index = array_index_nospec(index, len);
    // SAFETY: `index` is either the original index, which passed the
    // `index < len` check above, or 0, which is in bounds because len >= 1.
    Some(unsafe { slice.get_unchecked(index) })
}

/// Mutable twin of [`slice_index_nospec`].
#[inline]
pub fn slice_index_nospec_mut<T>(slice: &mut [T], index: usize) -> Option<&mut T> {
    let len = slice.len();
    if index >= len {
        return None;
    }
    let index = array_index_nospec(index, len);
    // SAFETY: Same argument as `slice_index_nospec`.
    Some(unsafe { slice.get_unchecked_mut(index) })
}

// ============================================================================
// Kani Proofs for the Full-Mask Invariant
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    /// Proof: the mask is always all-ones or all-zeros, and all-ones exactly
    /// when the index is in bounds.
    #[kani::proof]
    fn index_mask_is_full_and_exact() {
        let index: usize = kani::any();
        let size: usize = kani::any();
        kani::assume(size >= 1 && size <= isize::MAX as usize);

        let mask = array_index_mask_nospec(index, size);

        kani::assert(mask == 0 || mask == usize::MAX, "Mask must be full");
        kani::assert(
            (mask == usize::MAX) == (index < size),
            "Mask must be all-ones exactly when index < size",
        );
    }

    /// Proof: the sanitized index is always in bounds
    #[kani::proof]
    fn sanitized_index_in_bounds() {
        let index: usize = kani::any();
        let size: usize = kani::any();
        kani::assume(size >= 1 && size <= isize::MAX as usize);

        let sanitized = array_index_nospec(index, size);

        kani::assert(sanitized < size, "Sanitized index must be in bounds");
        if index < size {
            kani::assert(sanitized == index, "In-bounds index must be unchanged");
        } else {
            kani::assert(sanitized == 0, "Out-of-bounds index must clamp to 0");
        }
    }

    /// Proof: sanitizing twice is the same as sanitizing once
    #[kani::proof]
    fn sanitize_idempotent() {
        let index: u32 = kani::any();
        let size: u32 = kani::any();
        kani::assume(size >= 1);

        let once = array_index_nospec(index, size);
        let twice = array_index_nospec(once, size);

        kani::assert(once == twice, "Sanitizer must be idempotent");
    }
}
