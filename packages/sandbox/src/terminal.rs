// ABOUTME: Single-slot terminal sink that receives forwarded process output
// ABOUTME: Writes while no sink is registered are dropped, not buffered

use std::sync::{Arc, RwLock};

pub trait TerminalSink: Send + Sync {
    fn write(&self, data: &str);
}

impl<F> TerminalSink for F
where
    F: Fn(&str) + Send + Sync,
{
    fn write(&self, data: &str) {
        self(data)
    }
}

#[derive(Clone, Default)]
pub struct TerminalSlot {
    sink: Arc<RwLock<Option<Arc<dyn TerminalSink>>>>,
}

impl TerminalSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any previously registered sink.
    pub fn register(&self, sink: Arc<dyn TerminalSink>) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    pub fn unregister(&self) {
        *self.sink.write().unwrap_or_else(|e| e.into_inner()) = None;
    }

    pub fn is_registered(&self) -> bool {
        self.sink
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn write(&self, data: &str) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(sink) = sink {
            sink.write(data);
        }
    }
}

impl std::fmt::Debug for TerminalSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalSlot")
            .field("registered", &self.is_registered())
            .finish()
    }
}
