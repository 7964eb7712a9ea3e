//! Magic-guarded pointer sanitizer
//!
//! Structures that may be reached through a speculatively mis-steered
//! pointer carry a guard field holding a known constant. Before the pointer
//! is dereferenced, the guard is compared with the expected constant using
//! [`neq_mask_nospec`] and the pointer's address is masked with the result:
//!
//! ```
//! use zos_nospec::{impl_spec_magic, magic_ref_nospec};
//!
//! const ENDPOINT_MAGIC: u16 = 0xABCD;
//!
//! struct Endpoint {
//!     spec_magic: u16,
//!     queue_depth: u32,
//! }
//!
//! impl_spec_magic!(Endpoint, spec_magic: u16);
//!
//! let ep = Endpoint { spec_magic: ENDPOINT_MAGIC, queue_depth: 3 };
//! let ep = magic_ref_nospec(&ep, ENDPOINT_MAGIC).map(|ep| ep.queue_depth);
//! assert_eq!(ep, Some(3));
//! ```
//!
//! If the CPU speculates on a pointer to the wrong object, the guard read
//! differs, the mask is zero and every later access goes through null.
//!
//! # Caller Obligations
//!
//! - The pointer must already have passed the architectural validity check
//!   (non-null, in range). The sanitizer is the second layer.
//! - The guard field must be initialized to the expected constant, ideally
//!   in the object's constructor, before any caller relies on it. An
//!   uninitialized or attacker-writable guard defeats the guarantee.

use crate::eq::neq_mask_nospec;
use crate::word::NospecWord;

/// A structure exposing a guard field of known offset and width.
///
/// # Safety
///
/// `spec_magic_ptr(this)` must return a pointer to a properly aligned field
/// of type `Self::Magic` that lies inside the object `this` points to. Use
/// [`impl_spec_magic!`](crate::impl_spec_magic) rather than implementing this
/// by hand.
pub unsafe trait SpecMagic {
    /// Guard field type. At most one machine word wide.
    type Magic: NospecWord;

    /// Locate the guard field of the object at `this` without reading it.
    fn spec_magic_ptr(this: *const Self) -> *const Self::Magic;
}

/// Implement [`SpecMagic`] for a struct given its guard field.
///
/// ```
/// struct Process {
///     pid: u64,
///     spec_magic: u32,
/// }
///
/// zos_nospec::impl_spec_magic!(Process, spec_magic: u32);
/// ```
#[macro_export]
macro_rules! impl_spec_magic {
    ($ty:ty, $field:ident : $magic:ty) => {
        // SAFETY: The pointer is computed from `offset_of!` on the named
        // field, whose type is checked against `$magic` below.
        unsafe impl $crate::magic::SpecMagic for $ty {
            type Magic = $magic;

            #[inline(always)]
            fn spec_magic_ptr(this: *const Self) -> *const Self::Magic {
                let _field_type_check: fn(&$ty) -> &$magic = |s| &s.$field;
                this.wrapping_byte_add(::core::mem::offset_of!($ty, $field))
                    .cast::<$magic>()
            }
        }
    };
}

/// Sanitize a struct pointer by comparing its guard field with `magic`.
///
/// Returns `p` if the guard equals `magic`, null otherwise, without
/// branching on the comparison.
///
/// # Safety
///
/// `p` must be valid for reads of its guard field: this function always
/// dereferences it. See the module-level caller obligations.
#[inline(always)]
pub unsafe fn magic_neq_nospec<T: SpecMagic>(p: *const T, magic: T::Magic) -> *const T {
    let () = <T::Magic as NospecWord>::WIDTH_OK;
    const {
        assert!(
            core::mem::size_of::<*const T>() <= core::mem::size_of::<usize>(),
            "nospec pointer is wider than a machine word"
        )
    };

    // SAFETY: The caller guarantees `p` is valid for reading its guard field,
    // and `SpecMagic` guarantees the field pointer is in bounds and aligned.
    // Volatile so the guard load is always emitted.
    let guard = unsafe { core::ptr::read_volatile(T::spec_magic_ptr(p)) };
    let mask = neq_mask_nospec(guard.to_word(), magic.to_word());
    p.with_addr(p.addr() & mask)
}

/// Mutable twin of [`magic_neq_nospec`].
///
/// # Safety
///
/// Same requirements as [`magic_neq_nospec`].
#[inline(always)]
pub unsafe fn magic_neq_nospec_mut<T: SpecMagic>(p: *mut T, magic: T::Magic) -> *mut T {
    // SAFETY: Forwarded caller obligation.
    let sanitized = unsafe { magic_neq_nospec(p.cast_const(), magic) };
    p.with_addr(sanitized.addr())
}

/// Reference form of [`magic_neq_nospec`].
///
/// Returns `Some(r)` if the guard equals `magic`, `None` otherwise. The
/// `Option` is built from the masked pointer, so code using the result
/// dereferences either `r` or null, never an unmasked pointer.
#[inline(always)]
pub fn magic_ref_nospec<T: SpecMagic>(r: &T, magic: T::Magic) -> Option<&T> {
    // SAFETY: `r` is a live reference, so its guard field is readable. The
    // result is either `r` itself or null, and `as_ref` maps null to None.
    unsafe { magic_neq_nospec(r as *const T, magic).as_ref() }
}
