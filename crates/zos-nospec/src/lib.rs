//! Zero OS NoSpec - Speculation-Safe Sanitization Primitives
//!
//! This crate contains the branchless primitives the kernel uses to harden
//! bounds-checked array access and pointer validation against transient
//! execution (Spectre v1 style) attacks.
//!
//! A CPU may execute past a bounds check before the branch outcome is known.
//! Every primitive here lets a caller who has *already* performed the
//! ordinary check re-derive the checked value without a data-dependent
//! branch, so the value that reaches the memory access is safe even on the
//! mispredicted path.
//!
//! # Usage
//!
//! ```
//! use zos_nospec::array_index_nospec;
//!
//! let table = [10u32, 20, 30, 40];
//! let index = 2usize;
//! if index < table.len() {
//!     let index = array_index_nospec(index, table.len());
//!     assert_eq!(table[index], 30);
//! }
//! ```
//!
//! Placement is the caller's contract: a sanitizer must follow the
//! architectural check it protects. Nothing in this crate can detect a
//! missing check or an uninitialized guard field.
//!
//! # Module Organization
//!
//! - `hide` - Optimizer-opacity hint (`hide_var`)
//! - `word` - Machine-word width contract (`NospecWord`)
//! - `mask` - Index mask generator and index sanitizer
//! - `barrier` - Speculation fence with per-architecture overrides
//! - `eq` - Equality mask generator
//! - `magic` - Magic-guarded pointer sanitizer
//! - `loom_tests` - Concurrency tests using loom (with `loom` feature)
//!
//! # Verification
//!
//! 1. **Kani proofs** (`cargo kani`): full-mask invariant for all inputs
//! 2. **Loom tests** (`cargo test --features loom`): sanitized lookups under concurrency
//! 3. **Unit and integration tests**: output contract for each primitive
//!
//! # Width Violations
//!
//! Operands wider than a machine word are rejected at build time:
//!
//! ```compile_fail
//! let _ = zos_nospec::array_index_nospec(5u128, 10u128);
//! ```

#![no_std]

pub mod barrier;
pub mod eq;
pub mod hide;
pub mod magic;
pub mod mask;
pub mod word;


// Re-export commonly used items
pub use barrier::{barrier_nospec, ArchBarrier, NoBarrier, SpeculationBarrier};
pub use eq::{neq_mask_exact_nospec, neq_mask_nospec};
pub use hide::{hide, hide_var};
pub use magic::{magic_neq_nospec, magic_neq_nospec_mut, magic_ref_nospec, SpecMagic};
pub use mask::{array_index_mask_nospec, array_index_nospec, slice_index_nospec, slice_index_nospec_mut};
pub use word::{NospecWord, WORD_BITS};
