//! Speculation fence
//!
//! A speculation barrier stops the CPU from using data loaded after the
//! barrier to steer speculative execution past it until earlier loads have
//! resolved. It is used at trust-boundary crossings where the mask-based
//! sanitizers do not apply, e.g. the unsafe operation is not an array index.
//!
//! The fence is a pipeline ordering directive for the calling thread only.
//! It is not a memory-ordering barrier and has no acquire/release effect on
//! other threads.
//!
//! # Architecture Overrides
//!
//! | Target | `barrier_nospec` | `mask_barrier` |
//! |--------|------------------|----------------|
//! | x86_64, x86 + SSE2 | `lfence` | no-op |
//! | aarch64 | `dsb nsh; isb` | `csdb` |
//! | everything else | no-op | no-op |
//!
//! The `no-barrier` feature selects [`NoBarrier`] on every target.

/// A per-architecture speculation barrier.
///
/// Both methods default to no-ops; an implementation overrides only what its
/// architecture provides.
pub trait SpeculationBarrier {
    /// Block speculation past this point on not-yet-validated data.
    #[inline(always)]
    fn barrier_nospec() {}

    /// Emitted right after an index mask is computed. Architectures whose
    /// conditional-select results may themselves be speculated (aarch64)
    /// need a dedicated data barrier here.
    #[inline(always)]
    fn mask_barrier() {}
}

/// Barrier that emits nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoBarrier;

impl SpeculationBarrier for NoBarrier {}

/// x86 `lfence` barrier.
#[cfg(any(
    target_arch = "x86_64",
    all(target_arch = "x86", target_feature = "sse2")
))]
#[derive(Clone, Copy, Debug, Default)]
pub struct Lfence;

#[cfg(any(
    target_arch = "x86_64",
    all(target_arch = "x86", target_feature = "sse2")
))]
impl SpeculationBarrier for Lfence {
    #[inline(always)]
    fn barrier_nospec() {
        // SAFETY: lfence has no operands and no architectural side effects
        // beyond instruction ordering. It is not marked `nomem` so the
        // compiler keeps memory accesses on their side of it.
        unsafe {
            core::arch::asm!("lfence", options(nostack, preserves_flags));
        }
    }
}

/// aarch64 barrier: `dsb nsh; isb` as the fence, `csdb` after masks.
#[cfg(target_arch = "aarch64")]
#[derive(Clone, Copy, Debug, Default)]
pub struct Aarch64Barrier;

#[cfg(target_arch = "aarch64")]
impl SpeculationBarrier for Aarch64Barrier {
    #[inline(always)]
    fn barrier_nospec() {
        // SAFETY: Barrier instructions only; no registers or flags change.
        unsafe {
            core::arch::asm!("dsb nsh", "isb", options(nostack, preserves_flags));
        }
    }

    #[inline(always)]
    fn mask_barrier() {
        // SAFETY: `hint #20` is CSDB, a NOP on cores without the extension.
        unsafe {
            core::arch::asm!("hint #20", options(nostack, preserves_flags));
        }
    }
}

/// Barrier used by this build.
#[cfg(all(
    not(feature = "no-barrier"),
    not(kani),
    not(miri),
    any(
        target_arch = "x86_64",
        all(target_arch = "x86", target_feature = "sse2")
    )
))]
pub type ArchBarrier = Lfence;

/// Barrier used by this build.
#[cfg(all(
    not(feature = "no-barrier"),
    not(kani),
    not(miri),
    target_arch = "aarch64"
))]
pub type ArchBarrier = Aarch64Barrier;

/// Barrier used by this build.
#[cfg(any(
    feature = "no-barrier",
    kani,
    miri,
    not(any(
        target_arch = "x86_64",
        all(target_arch = "x86", target_feature = "sse2"),
        target_arch = "aarch64"
    ))
))]
pub type ArchBarrier = NoBarrier;

/// Speculation fence for the build target.
///
/// ```
/// fn read_user_word(words: &[u64], offset: usize) -> Option<u64> {
///     if offset >= words.len() {
///         return None;
///     }
///     zos_nospec::barrier_nospec();
///     Some(words[offset])
/// }
///
/// assert_eq!(read_user_word(&[1, 2, 3], 1), Some(2));
/// assert_eq!(read_user_word(&[1, 2, 3], 3), None);
/// ```
#[inline(always)]
pub fn barrier_nospec() {
    <ArchBarrier as SpeculationBarrier>::barrier_nospec();
}
