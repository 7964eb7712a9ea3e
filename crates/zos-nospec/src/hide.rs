//! Optimizer-opacity hint
//!
//! The compiler reasons about values under architectural execution only. If
//! it can prove from the surrounding bounds check that a mask is always
//! all-ones, it is free to delete the mask arithmetic, and the mispredicted
//! path then runs with the raw, unchecked value.
//!
//! `hide_var` severs that reasoning: after the call the value has an unknown
//! origin, so no later computation on it can be folded, hoisted or turned
//! back into a branch.

/// Make `var` opaque to the optimizer.
///
/// The value is passed through an empty assembly block in a register and
/// taken back as that block's output. The bits are unchanged.
#[cfg(all(
    not(miri),
    not(kani),
    any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "arm",
        target_arch = "aarch64",
        target_arch = "riscv32",
        target_arch = "riscv64",
        target_arch = "loongarch64",
    )
))]
#[inline(always)]
pub fn hide_var(var: &mut usize) {
    // SAFETY: The template is a comment; no instruction is emitted. The
    // operand is only tied in and out of a register, so no memory, stack or
    // flags are touched.
    unsafe {
        core::arch::asm!(
            "/* {0} */",
            inout(reg) *var,
            options(nomem, nostack, preserves_flags),
        );
    }
}

/// Make `var` opaque to the optimizer.
///
/// Fallback for targets without stable inline assembly (wasm32 among them).
#[cfg(not(all(
    not(miri),
    not(kani),
    any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "arm",
        target_arch = "aarch64",
        target_arch = "riscv32",
        target_arch = "riscv64",
        target_arch = "loongarch64",
    )
)))]
#[inline(always)]
pub fn hide_var(var: &mut usize) {
    *var = core::hint::black_box(*var);
}

/// By-value form of [`hide_var`].
#[inline(always)]
pub fn hide(mut value: usize) -> usize {
    hide_var(&mut value);
    value
}
