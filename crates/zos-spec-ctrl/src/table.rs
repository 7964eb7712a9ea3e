//! Software mitigation table
//!
//! A pure state machine holding each task's speculation posture. Tasks live
//! in a dense slot table indexed by `TaskId`; every lookup is bounds-checked
//! and then sanitized with `zos_nospec`, since task ids arrive from
//! untrusted callers.
//!
//! # Transitions
//!
//! | Request | From | Result |
//! |---------|------|--------|
//! | `ENABLE` | force-disabled | `Forbidden` |
//! | `ENABLE` | otherwise | `ENABLE` |
//! | `DISABLE` | force-disabled | unchanged |
//! | `DISABLE` | otherwise | `DISABLE` |
//! | `FORCE_DISABLE` | any | `FORCE_DISABLE` |
//! | `DISABLE_NOEXEC` | force-disabled | `Forbidden` |
//! | `DISABLE_NOEXEC` | otherwise | `DISABLE_NOEXEC` (store bypass only) |
//!
//! L1D flush accepts only `ENABLE` and `DISABLE` and is never forced.

use alloc::format;
use alloc::vec::Vec;

use zos_nospec::{slice_index_nospec, slice_index_nospec_mut};

use crate::control::SpeculationControl;
use crate::error::SpecCtrlError;
use crate::sink::{DebugSink, NullSink};
use crate::types::{PlatformSupport, SpecCtrlState, SpecCtrlWhich, TaskId, TaskSpecState};

/// Categories the sandbox forces off
const SANDBOX_FORCED: [SpecCtrlWhich; 2] = [SpecCtrlWhich::StoreBypass, SpecCtrlWhich::IndirectBranch];

/// Per-task speculation posture, tracked in software.
pub struct TaskMitigationTable<S: DebugSink = NullSink> {
    /// What this platform can control
    support: PlatformSupport,
    /// Task slots; `None` marks a free slot
    slots: Vec<Option<TaskSpecState>>,
    /// Debug output
    sink: S,
}

impl TaskMitigationTable<NullSink> {
    /// Create an empty table that discards debug output.
    pub fn new(support: PlatformSupport) -> Self {
        Self::with_sink(support, NullSink)
    }
}

impl<S: DebugSink> TaskMitigationTable<S> {
    /// Create an empty table reporting to `sink`.
    pub fn with_sink(support: PlatformSupport, sink: S) -> Self {
        Self {
            support,
            slots: Vec::new(),
            sink,
        }
    }

    /// Platform support this table was created with
    pub fn support(&self) -> PlatformSupport {
        self.support
    }

    /// Number of live tasks
    pub fn task_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Register a new task with the default posture.
    ///
    /// Reuses the lowest free slot.
    pub fn register_task(&mut self) -> TaskId {
        let index = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(TaskSpecState::new());
                free
            }
            None => {
                self.slots.push(Some(TaskSpecState::new()));
                self.slots.len() - 1
            }
        };
        self.sink
            .debug_write(&format!("[spec-ctrl] task {} registered", index));
        index as TaskId
    }

    /// Remove a task, returning its final posture.
    pub fn remove_task(&mut self, task: TaskId) -> Result<TaskSpecState, SpecCtrlError> {
        let state = slice_index_nospec_mut(&mut self.slots, task as usize)
            .and_then(Option::take)
            .ok_or(SpecCtrlError::UnknownTask)?;
        self.sink
            .debug_write(&format!("[spec-ctrl] task {} removed", task));
        Ok(state)
    }

    /// Current posture of a task.
    pub fn task_state(&self, task: TaskId) -> Result<&TaskSpecState, SpecCtrlError> {
        slice_index_nospec(&self.slots, task as usize)
            .and_then(Option::as_ref)
            .ok_or(SpecCtrlError::UnknownTask)
    }

    fn task_state_mut(&mut self, task: TaskId) -> Result<&mut TaskSpecState, SpecCtrlError> {
        slice_index_nospec_mut(&mut self.slots, task as usize)
            .and_then(Option::as_mut)
            .ok_or(SpecCtrlError::UnknownTask)
    }

    /// Apply exec semantics: a `DISABLE_NOEXEC` store-bypass mitigation
    /// lapses and speculation is enabled again.
    pub fn exec_task(&mut self, task: TaskId) -> Result<(), SpecCtrlError> {
        let state = self.task_state_mut(task)?;
        let which = SpecCtrlWhich::StoreBypass;
        if state.get(which) == SpecCtrlState::DISABLE_NOEXEC {
            state.put(which, SpecCtrlState::ENABLE);
            self.sink.debug_write(&format!(
                "[spec-ctrl] task {} exec: {} noexec mitigation cleared",
                task,
                which.name()
            ));
        }
        Ok(())
    }

    /// All live tasks and their posture, in task order.
    pub fn snapshot(&self) -> Vec<(TaskId, TaskSpecState)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.map(|s| (i as TaskId, s)))
            .collect()
    }

    /// Compute the next state for one category.
    fn transition(
        which: SpecCtrlWhich,
        current: SpecCtrlState,
        value: SpecCtrlState,
    ) -> Result<SpecCtrlState, SpecCtrlError> {
        if which == SpecCtrlWhich::L1dFlush {
            return match value {
                SpecCtrlState::ENABLE | SpecCtrlState::DISABLE => Ok(value),
                _ => Err(SpecCtrlError::InvalidValue),
            };
        }

        match value {
            SpecCtrlState::ENABLE if current.is_force_disabled() => Err(SpecCtrlError::Forbidden),
            SpecCtrlState::ENABLE => Ok(SpecCtrlState::ENABLE),
            SpecCtrlState::DISABLE if current.is_force_disabled() => Ok(current),
            SpecCtrlState::DISABLE => Ok(SpecCtrlState::DISABLE),
            SpecCtrlState::FORCE_DISABLE => Ok(SpecCtrlState::FORCE_DISABLE),
            SpecCtrlState::DISABLE_NOEXEC if which != SpecCtrlWhich::StoreBypass => {
                Err(SpecCtrlError::InvalidValue)
            }
            SpecCtrlState::DISABLE_NOEXEC if current.is_force_disabled() => {
                Err(SpecCtrlError::Forbidden)
            }
            SpecCtrlState::DISABLE_NOEXEC => Ok(SpecCtrlState::DISABLE_NOEXEC),
            _ => Err(SpecCtrlError::InvalidValue),
        }
    }
}

impl<S: DebugSink> SpeculationControl for TaskMitigationTable<S> {
    fn get_speculation_control(
        &self,
        task: TaskId,
        which: SpecCtrlWhich,
    ) -> Result<SpecCtrlState, SpecCtrlError> {
        let state = self.task_state(task)?;
        if !self.support.supports(which) {
            return Ok(SpecCtrlState::NOT_AFFECTED);
        }
        Ok(SpecCtrlState::PRCTL | state.get(which))
    }

    fn set_speculation_control(
        &mut self,
        task: TaskId,
        which: SpecCtrlWhich,
        value: SpecCtrlState,
    ) -> Result<(), SpecCtrlError> {
        if !self.support.supports(which) {
            self.sink.debug_write(&format!(
                "[spec-ctrl] task {} {}: not supported on this platform",
                task,
                which.name()
            ));
            return Err(SpecCtrlError::NotSupported);
        }

        let current = self.task_state(task)?.get(which);
        let next = match Self::transition(which, current, value) {
            Ok(next) => next,
            Err(e) => {
                self.sink.debug_write(&format!(
                    "[spec-ctrl] task {} {}: rejected {:#x} ({})",
                    task,
                    which.name(),
                    value.bits(),
                    e
                ));
                return Err(e);
            }
        };

        self.task_state_mut(task)?.put(which, next);
        if next != current {
            self.sink.debug_write(&format!(
                "[spec-ctrl] task {} {}: {:#x} -> {:#x}",
                task,
                which.name(),
                current.bits(),
                next.bits()
            ));
        }
        Ok(())
    }

    fn apply_sandboxed_speculation_mitigation(&mut self, task: TaskId) {
        if self.task_state(task).is_err() {
            self.sink.debug_write(&format!(
                "[spec-ctrl] sandbox mitigation for unknown task {}",
                task
            ));
            return;
        }

        let support = self.support;
        let Ok(state) = self.task_state_mut(task) else {
            return;
        };

        let mut changed = false;
        for which in SANDBOX_FORCED {
            if support.supports(which) && !state.get(which).is_force_disabled() {
                state.put(which, SpecCtrlState::FORCE_DISABLE);
                changed = true;
            }
        }

        if changed {
            self.sink.debug_write(&format!(
                "[spec-ctrl] task {} sandboxed: speculation force-disabled",
                task
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_task() -> (TaskMitigationTable, TaskId) {
        let mut table = TaskMitigationTable::new(PlatformSupport::all());
        let task = table.register_task();
        (table, task)
    }

    #[test]
    fn test_register_reuses_free_slot() {
        let mut table = TaskMitigationTable::new(PlatformSupport::all());
        let a = table.register_task();
        let b = table.register_task();
        assert_eq!((a, b), (0, 1));

        table.remove_task(a).unwrap();
        assert_eq!(table.task_count(), 1);
        assert_eq!(table.register_task(), 0);
    }

    #[test]
    fn test_unknown_task() {
        let (mut table, _) = table_with_task();
        assert_eq!(table.task_state(7).unwrap_err(), SpecCtrlError::UnknownTask);
        assert_eq!(table.task_state(TaskId::MAX).unwrap_err(), SpecCtrlError::UnknownTask);
        assert_eq!(table.remove_task(7).unwrap_err(), SpecCtrlError::UnknownTask);
        assert_eq!(
            table
                .get_speculation_control(7, SpecCtrlWhich::StoreBypass)
                .unwrap_err(),
            SpecCtrlError::UnknownTask
        );
    }

    #[test]
    fn test_removed_slot_is_unknown() {
        let (mut table, task) = table_with_task();
        table.remove_task(task).unwrap();
        assert_eq!(table.task_state(task).unwrap_err(), SpecCtrlError::UnknownTask);
    }

    #[test]
    fn test_enable_disable_toggle() {
        let (mut table, task) = table_with_task();
        let which = SpecCtrlWhich::IndirectBranch;

        table
            .set_speculation_control(task, which, SpecCtrlState::DISABLE)
            .unwrap();
        assert_eq!(
            table.get_speculation_control(task, which).unwrap(),
            SpecCtrlState::PRCTL | SpecCtrlState::DISABLE
        );

        table
            .set_speculation_control(task, which, SpecCtrlState::ENABLE)
            .unwrap();
        assert_eq!(
            table.get_speculation_control(task, which).unwrap(),
            SpecCtrlState::PRCTL | SpecCtrlState::ENABLE
        );
    }

    #[test]
    fn test_force_disable_is_sticky() {
        let (mut table, task) = table_with_task();
        let which = SpecCtrlWhich::StoreBypass;

        table
            .set_speculation_control(task, which, SpecCtrlState::FORCE_DISABLE)
            .unwrap();
        assert_eq!(
            table.set_speculation_control(task, which, SpecCtrlState::ENABLE),
            Err(SpecCtrlError::Forbidden)
        );
        assert_eq!(
            table.set_speculation_control(task, which, SpecCtrlState::DISABLE_NOEXEC),
            Err(SpecCtrlError::Forbidden)
        );

        // DISABLE is accepted but does not weaken the forced state
        table
            .set_speculation_control(task, which, SpecCtrlState::DISABLE)
            .unwrap();
        assert!(table
            .get_speculation_control(task, which)
            .unwrap()
            .is_force_disabled());
    }

    #[test]
    fn test_noexec_only_for_store_bypass() {
        let (mut table, task) = table_with_task();
        assert_eq!(
            table.set_speculation_control(
                task,
                SpecCtrlWhich::IndirectBranch,
                SpecCtrlState::DISABLE_NOEXEC
            ),
            Err(SpecCtrlError::InvalidValue)
        );
        table
            .set_speculation_control(task, SpecCtrlWhich::StoreBypass, SpecCtrlState::DISABLE_NOEXEC)
            .unwrap();
    }

    #[test]
    fn test_exec_clears_noexec() {
        let (mut table, task) = table_with_task();
        let which = SpecCtrlWhich::StoreBypass;
        table
            .set_speculation_control(task, which, SpecCtrlState::DISABLE_NOEXEC)
            .unwrap();
        table.exec_task(task).unwrap();
        assert_eq!(table.task_state(task).unwrap().get(which), SpecCtrlState::ENABLE);
    }

    #[test]
    fn test_exec_keeps_plain_disable() {
        let (mut table, task) = table_with_task();
        let which = SpecCtrlWhich::StoreBypass;
        table
            .set_speculation_control(task, which, SpecCtrlState::DISABLE)
            .unwrap();
        table.exec_task(task).unwrap();
        assert_eq!(table.task_state(task).unwrap().get(which), SpecCtrlState::DISABLE);
    }

    #[test]
    fn test_l1d_flush_values() {
        let (mut table, task) = table_with_task();
        let which = SpecCtrlWhich::L1dFlush;
        table
            .set_speculation_control(task, which, SpecCtrlState::ENABLE)
            .unwrap();
        assert_eq!(
            table.set_speculation_control(task, which, SpecCtrlState::FORCE_DISABLE),
            Err(SpecCtrlError::InvalidValue)
        );
    }

    #[test]
    fn test_invalid_values() {
        let (mut table, task) = table_with_task();
        for raw in [0u64, 1, 3, 6, 32, u64::MAX] {
            assert_eq!(
                table.set_speculation_control(task, SpecCtrlWhich::StoreBypass, SpecCtrlState(raw)),
                Err(SpecCtrlError::InvalidValue),
                "value {:#x}",
                raw
            );
        }
    }

    #[test]
    fn test_unsupported_category() {
        let support = PlatformSupport {
            store_bypass: true,
            indirect_branch: false,
            l1d_flush: false,
        };
        let mut table = TaskMitigationTable::new(support);
        let task = table.register_task();

        assert_eq!(
            table.get_speculation_control(task, SpecCtrlWhich::IndirectBranch),
            Ok(SpecCtrlState::NOT_AFFECTED)
        );
        assert_eq!(
            table.set_speculation_control(task, SpecCtrlWhich::IndirectBranch, SpecCtrlState::DISABLE),
            Err(SpecCtrlError::NotSupported)
        );
    }

    #[test]
    fn test_sandbox_is_idempotent() {
        let (mut table, task) = table_with_task();
        table.apply_sandboxed_speculation_mitigation(task);
        let first = *table.task_state(task).unwrap();
        table.apply_sandboxed_speculation_mitigation(task);
        assert_eq!(*table.task_state(task).unwrap(), first);

        assert!(first.get(SpecCtrlWhich::StoreBypass).is_force_disabled());
        assert!(first.get(SpecCtrlWhich::IndirectBranch).is_force_disabled());
        assert_eq!(first.get(SpecCtrlWhich::L1dFlush), SpecCtrlState::DISABLE);
    }

    #[test]
    fn test_sandbox_skips_unsupported() {
        let support = PlatformSupport {
            store_bypass: false,
            indirect_branch: true,
            l1d_flush: false,
        };
        let mut table = TaskMitigationTable::new(support);
        let task = table.register_task();
        table.apply_sandboxed_speculation_mitigation(task);

        let state = table.task_state(task).unwrap();
        assert_eq!(state.get(SpecCtrlWhich::StoreBypass), SpecCtrlState::ENABLE);
        assert!(state.get(SpecCtrlWhich::IndirectBranch).is_force_disabled());
    }

    #[test]
    fn test_sandbox_unknown_task_is_noop() {
        let (mut table, task) = table_with_task();
        let before = table.snapshot();
        table.apply_sandboxed_speculation_mitigation(task + 100);
        assert_eq!(table.snapshot(), before);
    }

    #[test]
    fn test_snapshot_order() {
        let mut table = TaskMitigationTable::new(PlatformSupport::all());
        for _ in 0..3 {
            table.register_task();
        }
        table.remove_task(1).unwrap();
        let ids: Vec<TaskId> = table.snapshot().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, alloc::vec![0, 2]);
    }
}
