//! Exporting a selection of a lazy source to a stack file.
//!
//! The flow of one export:
//!
//! ```text
//! resolve selections -> plan -> extract -> (T,P,C,Y,X) -> normalize
//!     -> collapse to (T,C',Y,X) -> write (with fallbacks)
//! ```
//!
//! [`export_stack`] runs it synchronously against any [`LazySource`] and
//! [`ContainerWriter`]; [`ExportWorker`] runs it on tokio's blocking pool and
//! reports [`ExportEvent`]s.
//!
//! [`LazySource`]: crate::source::LazySource

mod collapse;
mod hooks;
mod pipeline;
mod serialize;
mod worker;

pub use collapse::{collapse, derive_metadata, ChannelLayout};
pub use hooks::{CancellationToken, ExportHooks, NoopProgress, ProgressSink};
pub use pipeline::{export_file, export_path, export_stack, extract_subset, ExportRequest};
pub use serialize::{serialize, ContainerWriter, WriteOptions, PRIMARY_AXES};
pub use worker::{ExportEvent, ExportHandle, ExportWorker};
