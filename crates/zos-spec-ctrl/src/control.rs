//! Speculation-control interface
//!
//! The supervisor and the sandbox consume this trait; each platform provides
//! an implementation. The raw methods translate to and from the numeric
//! syscall ABI (category number in, flags or negative errno out).

use crate::error::SpecCtrlError;
use crate::types::{SpecCtrlState, SpecCtrlWhich, TaskId};

/// Per-task speculation-mitigation control
pub trait SpeculationControl {
    /// Query a task's state for one category.
    ///
    /// # Returns
    /// * `Ok(SpecCtrlState::NOT_AFFECTED)` - Category not controllable here
    /// * `Ok(state)` - `PRCTL` plus the task's current flag
    /// * `Err(SpecCtrlError::UnknownTask)` - Task doesn't exist
    fn get_speculation_control(
        &self,
        task: TaskId,
        which: SpecCtrlWhich,
    ) -> Result<SpecCtrlState, SpecCtrlError>;

    /// Update a task's state for one category.
    ///
    /// `value` is exactly one of `ENABLE`, `DISABLE`, `FORCE_DISABLE` or
    /// `DISABLE_NOEXEC`.
    ///
    /// # Returns
    /// * `Ok(())` - State updated
    /// * `Err(SpecCtrlError::NotSupported)` - Category not controllable here
    /// * `Err(SpecCtrlError::Forbidden)` - Would relax a force-disabled state
    /// * `Err(SpecCtrlError::InvalidValue)` - Value not valid for the category
    /// * `Err(SpecCtrlError::UnknownTask)` - Task doesn't exist
    fn set_speculation_control(
        &mut self,
        task: TaskId,
        which: SpecCtrlWhich,
        value: SpecCtrlState,
    ) -> Result<(), SpecCtrlError>;

    /// Force a task into the strictest available posture.
    ///
    /// Invoked by the sandbox. Must be idempotent.
    fn apply_sandboxed_speculation_mitigation(&mut self, task: TaskId);

    /// Raw query: category number in, flag bits or negative errno out.
    fn spec_ctrl_get_raw(&self, task: TaskId, which: u64) -> i64 {
        let result = SpecCtrlWhich::from_raw(which)
            .ok_or(SpecCtrlError::UnknownControl)
            .and_then(|which| self.get_speculation_control(task, which));
        match result {
            Ok(state) => state.bits() as i64,
            Err(e) => e.errno(),
        }
    }

    /// Raw update: category number and flag value in, 0 or negative errno out.
    fn spec_ctrl_set_raw(&mut self, task: TaskId, which: u64, ctrl: u64) -> i64 {
        let which = match SpecCtrlWhich::from_raw(which) {
            Some(which) => which,
            None => return SpecCtrlError::UnknownControl.errno(),
        };
        match self.set_speculation_control(task, which, SpecCtrlState(ctrl)) {
            Ok(()) => 0,
            Err(e) => e.errno(),
        }
    }
}
