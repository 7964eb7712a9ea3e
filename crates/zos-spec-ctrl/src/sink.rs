//! Debug output sink
//!
//! Mitigation changes are reported as `[spec-ctrl] ...` lines, the same way
//! the kernel reports through the HAL's debug output. The table takes the
//! sink by value so the supervisor can route it to its console.

/// Destination for debug lines
pub trait DebugSink {
    /// Write one debug line
    fn debug_write(&self, msg: &str);
}

/// Sink that discards everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn debug_write(&self, _msg: &str) {}
}

impl<S: DebugSink + ?Sized> DebugSink for &S {
    fn debug_write(&self, msg: &str) {
        (**self).debug_write(msg)
    }
}
