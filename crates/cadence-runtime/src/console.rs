//! Transient host-visible output.

use parking_lot::Mutex;

/// Lines shown to the host user while contexts run. Cleared on shutdown.
#[derive(Debug, Default)]
pub struct HostConsole {
    lines: Mutex<Vec<String>>,
}

impl HostConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}
