//! Running one export in the background.
//!
//! The pipeline is synchronous, so the worker moves it onto tokio's blocking
//! pool and turns the progress hooks into [`ExportEvent`]s on a channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::hooks::{CancellationToken, ExportHooks, ProgressSink};
use super::pipeline::{export_path, export_stack, ExportRequest};
use super::serialize::ContainerWriter;
use crate::error::ExportError;
use crate::source::{LazySource, SourceOptions};

/// Something that happened during a background export.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    /// Overall progress, 0 to 100
    Progress(u8),
    /// Batch combinations done so far
    Combination { done: usize, total: usize },
    Finished(PathBuf),
    Failed(ExportError),
    Cancelled,
}

/// Forwards hook calls as events. A closed receiver is ignored.
struct ChannelSink {
    events: mpsc::UnboundedSender<ExportEvent>,
}

impl ChannelSink {
    fn send(&self, event: ExportEvent) {
        if self.events.send(event).is_err() {
            debug!("Export event receiver dropped");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn progress(&self, percent: u8) {
        self.send(ExportEvent::Progress(percent));
    }

    fn combination(&self, done: usize, total: usize) {
        self.send(ExportEvent::Combination { done, total });
    }

    fn finished(&self, path: &Path) {
        self.send(ExportEvent::Finished(path.to_path_buf()));
    }

    fn failed(&self, error: &ExportError) {
        if error.is_cancelled() {
            self.send(ExportEvent::Cancelled);
        } else {
            self.send(ExportEvent::Failed(error.clone()));
        }
    }
}

/// Starts exports on the blocking pool.
///
/// Must be used from within a tokio runtime.
pub struct ExportWorker {
    request: ExportRequest,
    cancel: CancellationToken,
}

impl ExportWorker {
    pub fn new(request: ExportRequest) -> Self {
        Self {
            request,
            cancel: CancellationToken::new(),
        }
    }

    /// A token that cancels the export this worker starts, usable before
    /// it is spawned.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open `input` and export it with the TIFF stack writer.
    pub fn spawn_file(self, input: PathBuf, options: SourceOptions) -> ExportHandle {
        self.spawn_with(move |request, hooks| export_path(&input, request, &options, hooks))
    }

    /// Export from an already-open source through `writer`.
    pub fn spawn(
        self,
        source: Box<dyn LazySource>,
        writer: Box<dyn ContainerWriter>,
    ) -> ExportHandle {
        self.spawn_with(move |request, hooks| {
            export_stack(request, source.as_ref(), writer.as_ref(), hooks)
        })
    }

    fn spawn_with<F>(self, job: F) -> ExportHandle
    where
        F: FnOnce(&ExportRequest, &ExportHooks) -> Result<PathBuf, ExportError> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let hooks = ExportHooks::new(Arc::new(ChannelSink { events: tx }), self.cancel.clone());
        let request = self.request;

        let task = tokio::task::spawn_blocking(move || job(&request, &hooks));

        ExportHandle {
            events: rx,
            cancel: self.cancel,
            task,
        }
    }
}

/// Handle to a running export.
///
/// Dropping the handle does not stop the export; call
/// [`cancel`](Self::cancel) for that.
pub struct ExportHandle {
    events: mpsc::UnboundedReceiver<ExportEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<PathBuf, ExportError>>,
}

impl ExportHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this export.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next event, or `None` once the export has ended and every event was
    /// received.
    pub async fn next_event(&mut self) -> Option<ExportEvent> {
        self.events.recv().await
    }

    /// Wait for the export and return its outcome.
    pub async fn join(self) -> Result<PathBuf, ExportError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Export task did not complete");
                Err(ExportError::Aborted(e.to_string()))
            }
        }
    }
}
