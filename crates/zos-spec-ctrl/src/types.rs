//! Speculation-control types
//!
//! Numbering follows the platform prctl ABI so raw values can cross the
//! syscall boundary unchanged.

use core::ops::BitOr;
use serde::{Deserialize, Serialize};

/// Task identifier (slot in the mitigation table)
pub type TaskId = u32;

/// Mitigation category
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u64)]
pub enum SpecCtrlWhich {
    /// Speculative store bypass (Spectre v4)
    StoreBypass = 0,
    /// Indirect branch prediction (Spectre v2, user space)
    IndirectBranch = 1,
    /// L1 data cache flush on context switch
    L1dFlush = 2,
}

impl SpecCtrlWhich {
    /// Every category, in raw-value order
    pub const ALL: [SpecCtrlWhich; 3] = [
        SpecCtrlWhich::StoreBypass,
        SpecCtrlWhich::IndirectBranch,
        SpecCtrlWhich::L1dFlush,
    ];

    /// Decode a raw category number.
    pub fn from_raw(raw: u64) -> Option<Self> {
        match raw {
            0 => Some(SpecCtrlWhich::StoreBypass),
            1 => Some(SpecCtrlWhich::IndirectBranch),
            2 => Some(SpecCtrlWhich::L1dFlush),
            _ => None,
        }
    }

    /// Raw category number
    pub fn as_raw(self) -> u64 {
        self as u64
    }

    pub(crate) fn slot(self) -> usize {
        self as usize
    }

    /// Short name for debug output
    pub fn name(self) -> &'static str {
        match self {
            SpecCtrlWhich::StoreBypass => "store_bypass",
            SpecCtrlWhich::IndirectBranch => "indirect_branch",
            SpecCtrlWhich::L1dFlush => "l1d_flush",
        }
    }
}

/// Speculation-control state flags
///
/// Returned by queries and accepted (one flag at a time) by updates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpecCtrlState(pub u64);

impl SpecCtrlState {
    /// The platform is not affected; no control exists
    pub const NOT_AFFECTED: Self = Self(0);
    /// The mitigation is controllable per task
    pub const PRCTL: Self = Self(1 << 0);
    /// Speculation enabled (mitigation off)
    pub const ENABLE: Self = Self(1 << 1);
    /// Speculation disabled (mitigation on)
    pub const DISABLE: Self = Self(1 << 2);
    /// Disabled and cannot be re-enabled
    pub const FORCE_DISABLE: Self = Self(1 << 3);
    /// Disabled until the next exec
    pub const DISABLE_NOEXEC: Self = Self(1 << 4);

    /// Raw flag bits
    pub fn bits(self) -> u64 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the state can no longer be relaxed
    pub fn is_force_disabled(self) -> bool {
        self.contains(Self::FORCE_DISABLE)
    }
}

impl BitOr for SpecCtrlState {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Which categories this platform can control per task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSupport {
    /// Speculative store bypass disable is available
    pub store_bypass: bool,
    /// Indirect branch prediction control is available
    pub indirect_branch: bool,
    /// L1D flush on context switch is available
    pub l1d_flush: bool,
}

impl PlatformSupport {
    /// No controllable mitigations
    pub fn none() -> Self {
        Self::default()
    }

    /// Every category controllable
    pub fn all() -> Self {
        Self {
            store_bypass: true,
            indirect_branch: true,
            l1d_flush: true,
        }
    }

    /// Whether `which` is controllable
    pub fn supports(&self, which: SpecCtrlWhich) -> bool {
        match which {
            SpecCtrlWhich::StoreBypass => self.store_bypass,
            SpecCtrlWhich::IndirectBranch => self.indirect_branch,
            SpecCtrlWhich::L1dFlush => self.l1d_flush,
        }
    }
}

/// Per-task mitigation posture
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpecState {
    /// Current state per category, indexed by raw category number
    pub controls: [SpecCtrlState; 3],
}

impl TaskSpecState {
    /// Posture of a freshly registered task: speculation allowed, no L1D flush
    pub fn new() -> Self {
        Self {
            controls: [
                SpecCtrlState::ENABLE,
                SpecCtrlState::ENABLE,
                SpecCtrlState::DISABLE,
            ],
        }
    }

    /// Current state of one category
    pub fn get(&self, which: SpecCtrlWhich) -> SpecCtrlState {
        self.controls[which.slot()]
    }

    pub(crate) fn put(&mut self, which: SpecCtrlWhich, state: SpecCtrlState) {
        self.controls[which.slot()] = state;
    }
}

impl Default for TaskSpecState {
    fn default() -> Self {
        Self::new()
    }
}
