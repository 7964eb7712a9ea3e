//! Speculation-control errors

use core::fmt;

/// Speculation-control errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecCtrlError {
    /// Unknown mitigation category
    UnknownControl,
    /// Category exists but is not controllable on this platform
    NotSupported,
    /// Request would relax a force-disabled mitigation
    Forbidden,
    /// Value is not valid for this category
    InvalidValue,
    /// No such task
    UnknownTask,
}

/// errno values used by the raw interface
const EPERM: i64 = 1;
const ESRCH: i64 = 3;
const ENXIO: i64 = 6;
const ERANGE: i64 = 34;

impl SpecCtrlError {
    /// Negative errno for the raw syscall interface.
    pub fn errno(self) -> i64 {
        match self {
            SpecCtrlError::UnknownControl | SpecCtrlError::InvalidValue => -ERANGE,
            SpecCtrlError::NotSupported => -ENXIO,
            SpecCtrlError::Forbidden => -EPERM,
            SpecCtrlError::UnknownTask => -ESRCH,
        }
    }
}

impl fmt::Display for SpecCtrlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecCtrlError::UnknownControl => write!(f, "unknown speculation control"),
            SpecCtrlError::NotSupported => write!(f, "speculation control not supported"),
            SpecCtrlError::Forbidden => write!(f, "mitigation is force-disabled"),
            SpecCtrlError::InvalidValue => write!(f, "invalid speculation control value"),
            SpecCtrlError::UnknownTask => write!(f, "no such task"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SpecCtrlError {}
