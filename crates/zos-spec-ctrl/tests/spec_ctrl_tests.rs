//! Speculation-control integration tests
//!
//! Drives `TaskMitigationTable` through the `SpeculationControl` trait, the
//! way the supervisor and the sandbox consume it.

use std::cell::RefCell;

use zos_spec_ctrl::{
    DebugSink, PlatformSupport, SpecCtrlError, SpecCtrlState, SpecCtrlWhich, SpeculationControl,
    TaskMitigationTable, TaskSpecState,
};

// ============================================================================
// Recording sink
// ============================================================================

#[derive(Default)]
struct RecordingSink {
    lines: RefCell<Vec<String>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl DebugSink for RecordingSink {
    fn debug_write(&self, msg: &str) {
        self.lines.borrow_mut().push(msg.to_string());
    }
}

/// Apply the sandbox through the trait object the sandbox holds.
fn sandbox(ctrl: &mut dyn SpeculationControl, task: u32) {
    ctrl.apply_sandboxed_speculation_mitigation(task);
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn supervisor_round_trip_through_trait() {
    let mut table = TaskMitigationTable::new(PlatformSupport::all());
    let task = table.register_task();

    let ctrl: &mut dyn SpeculationControl = &mut table;
    ctrl.set_speculation_control(task, SpecCtrlWhich::StoreBypass, SpecCtrlState::DISABLE)
        .unwrap();
    let state = ctrl
        .get_speculation_control(task, SpecCtrlWhich::StoreBypass)
        .unwrap();

    assert!(state.contains(SpecCtrlState::PRCTL));
    assert!(state.contains(SpecCtrlState::DISABLE));
}

#[test]
fn raw_interface_values() {
    let mut table = TaskMitigationTable::new(PlatformSupport::all());
    let task = table.register_task();

    // ENABLE | PRCTL
    assert_eq!(table.spec_ctrl_get_raw(task, 0), 3);
    // FORCE_DISABLE on indirect branch
    assert_eq!(table.spec_ctrl_set_raw(task, 1, 8), 0);
    assert_eq!(table.spec_ctrl_get_raw(task, 1), 9);
    // Re-enable after force: EPERM
    assert_eq!(table.spec_ctrl_set_raw(task, 1, 2), -1);
    // Unknown category: ERANGE
    assert_eq!(table.spec_ctrl_get_raw(task, 9), -34);
    assert_eq!(table.spec_ctrl_set_raw(task, 9, 4), -34);
    // Unknown task: ESRCH
    assert_eq!(table.spec_ctrl_get_raw(task + 1, 0), -3);
}

#[test]
fn raw_interface_unsupported_platform() {
    let mut table = TaskMitigationTable::new(PlatformSupport::none());
    let task = table.register_task();

    assert_eq!(table.spec_ctrl_get_raw(task, 0), 0);
    assert_eq!(table.spec_ctrl_set_raw(task, 0, 4), -6);
}

#[test]
fn sandbox_through_trait_object_is_idempotent() {
    let sink = RecordingSink::default();
    let mut table = TaskMitigationTable::with_sink(PlatformSupport::all(), &sink);
    let task = table.register_task();

    sandbox(&mut table, task);
    sandbox(&mut table, task);

    for which in [SpecCtrlWhich::StoreBypass, SpecCtrlWhich::IndirectBranch] {
        assert_eq!(
            table.get_speculation_control(task, which),
            Ok(SpecCtrlState::PRCTL | SpecCtrlState::FORCE_DISABLE)
        );
    }
    assert_eq!(
        table.set_speculation_control(task, SpecCtrlWhich::StoreBypass, SpecCtrlState::ENABLE),
        Err(SpecCtrlError::Forbidden)
    );

    let sandboxed = sink
        .lines()
        .iter()
        .filter(|l| l.contains("sandboxed"))
        .count();
    assert_eq!(sandboxed, 1, "second application must not change anything");
}

#[test]
fn debug_output_format() {
    let sink = RecordingSink::default();
    let mut table = TaskMitigationTable::with_sink(PlatformSupport::all(), &sink);
    let task = table.register_task();

    table
        .set_speculation_control(task, SpecCtrlWhich::IndirectBranch, SpecCtrlState::DISABLE)
        .unwrap();
    let _ = table.set_speculation_control(
        task,
        SpecCtrlWhich::IndirectBranch,
        SpecCtrlState::DISABLE_NOEXEC,
    );

    let lines = sink.lines();
    assert!(lines.iter().all(|l| l.starts_with("[spec-ctrl] ")));
    assert!(lines.contains(&"[spec-ctrl] task 0 registered".to_string()));
    assert!(lines.contains(&"[spec-ctrl] task 0 indirect_branch: 0x2 -> 0x4".to_string()));
    assert!(lines
        .iter()
        .any(|l| l.contains("rejected 0x10") && l.contains("invalid speculation control value")));
}

#[test]
fn unchanged_state_is_not_logged() {
    let sink = RecordingSink::default();
    let mut table = TaskMitigationTable::with_sink(PlatformSupport::all(), &sink);
    let task = table.register_task();
    let before = sink.lines().len();

    table
        .set_speculation_control(task, SpecCtrlWhich::StoreBypass, SpecCtrlState::ENABLE)
        .unwrap();
    assert_eq!(sink.lines().len(), before);
}

#[test]
fn snapshot_serializes() {
    let mut table = TaskMitigationTable::new(PlatformSupport::all());
    let task = table.register_task();
    table.apply_sandboxed_speculation_mitigation(task);

    let snapshot = table.snapshot();
    let json = serde_json::to_string(&snapshot).unwrap();
    assert_eq!(json, r#"[[0,{"controls":[8,8,4]}]]"#);

    let back: Vec<(u32, TaskSpecState)> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}
