//! Caller-owned collaborators of an export: progress reporting and
//! cooperative cancellation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ExportError;

// =============================================================================
// ProgressSink
// =============================================================================

/// Receives progress and completion signals from an export.
///
/// Every method defaults to a no-op so implementors only override what they
/// display.
pub trait ProgressSink: Send + Sync {
    /// Overall progress, 0 to 100.
    fn progress(&self, _percent: u8) {}

    /// One batch combination finished (`done` of `total`).
    fn combination(&self, _done: usize, _total: usize) {}

    /// The output file was written.
    fn finished(&self, _path: &Path) {}

    /// The export failed or was cancelled. Called exactly once per failure.
    fn failed(&self, _error: &ExportError) {}
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

// =============================================================================
// CancellationToken
// =============================================================================

/// Shared cancellation flag, polled between plan steps.
///
/// Clones share the flag. A default token is never cancelled unless
/// [`cancel`](Self::cancel) is called.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Takes effect at the next check.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`ExportError::Cancelled`] once cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<(), ExportError> {
        if self.is_cancelled() {
            Err(ExportError::Cancelled)
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// ExportHooks
// =============================================================================

/// The collaborator hooks of one export call.
#[derive(Clone)]
pub struct ExportHooks {
    pub progress: Arc<dyn ProgressSink>,
    pub cancel: CancellationToken,
}

impl ExportHooks {
    pub fn new(progress: Arc<dyn ProgressSink>, cancel: CancellationToken) -> Self {
        Self { progress, cancel }
    }
}

impl Default for ExportHooks {
    fn default() -> Self {
        Self {
            progress: Arc::new(NoopProgress),
            cancel: CancellationToken::default(),
        }
    }
}
