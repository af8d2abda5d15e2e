pub mod ingestion;
pub mod orchestrator;
pub mod processing;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-run cancellation token. Tasks check it at suspension points and
/// finish their smallest safe unit before exiting.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
