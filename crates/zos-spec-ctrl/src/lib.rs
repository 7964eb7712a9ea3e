//! Zero OS Speculation Control - Per-Task Mitigation Interface
//!
//! This crate is the boundary between the nospec primitives and the parts of
//! the system that decide *how hard* a task is mitigated:
//!
//! - A supervisor queries or changes a task's speculation posture
//!   (speculative store bypass, indirect branch prediction, L1D flush).
//! - The sandbox forces a task into the strictest posture available.
//!
//! Platforms provide the real implementation behind [`SpeculationControl`].
//! [`TaskMitigationTable`] is the pure state-machine implementation used on
//! platforms that track mitigation state in software, and in tests.
//!
//! # Module Organization
//!
//! - `types` - Control categories, state flags, task ids, platform support
//! - `error` - `SpecCtrlError` and its errno mapping
//! - `control` - The `SpeculationControl` trait
//! - `table` - `TaskMitigationTable` state machine
//! - `sink` - Debug output sink

#![no_std]
extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod control;
pub mod error;
pub mod sink;
pub mod table;
pub mod types;

// Re-export all public types for convenient access
pub use control::SpeculationControl;
pub use error::SpecCtrlError;
pub use sink::{DebugSink, NullSink};
pub use table::TaskMitigationTable;
pub use types::{PlatformSupport, SpecCtrlState, SpecCtrlWhich, TaskId, TaskSpecState};
