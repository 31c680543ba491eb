//! Diagnostic Collector
//!
//! A clonable handle that operations report failures into when it is
//! attached to a builder. Collection is best-effort and never required
//! for correctness; the `INVALID` sentinel alone carries the failure
//! through the value layer.

use crate::error::Diagnostic;
use std::sync::{Arc, Mutex};

/// Shared sink for failure reports.
#[derive(Clone, Default)]
pub struct DiagCollector {
    inner: Arc<Mutex<Vec<Diagnostic>>>,
}

impl DiagCollector {
    pub fn new() -> DiagCollector {
        DiagCollector::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        if let Ok(mut reports) = self.inner.lock() {
            reports.push(diagnostic);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map_or(0, |r| r.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        self.inner
            .lock()
            .map_or_else(|_| Vec::new(), |mut r| std::mem::take(&mut *r))
    }

    /// Render every report, one per line, the way CLI wrappers print to
    /// stderr on failure.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Ok(reports) = self.inner.lock() {
            for d in reports.iter() {
                out.push_str(&d.to_string());
                out.push('\n');
            }
        }
        out
    }
}

impl std::fmt::Debug for DiagCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DiagCollector({} reports)", self.len())
    }
}
