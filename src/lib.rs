//! # hyperstack
//!
//! Out-of-core slicing and export of multi-dimensional microscopy stacks.
//!
//! A stack is a lazily-read N-dimensional array over the named axes T
//! (time), P (stage position), C (channel), Z, Y and X. This library selects
//! sub-ranges along the non-spatial axes, extracts them into one dense
//! buffer without transposing, normalizes the data type and writes the
//! result as a 4-axis (T, C, Y, X) OME-TIFF, merging positions into the
//! channel axis.
//!
//! ## Features
//!
//! - **Sparse selections**: single indices, inclusive ranges or explicit
//!   lists per axis, with strict or lenient bounds checking
//! - **Batched extraction**: one read per combination of batched indices,
//!   written in place into a pre-allocated buffer
//! - **Lazy TIFF reading**: uncompressed TIFF/BigTIFF hyperstacks described by
//!   OME-XML or ImageJ metadata, read page by page through a block cache
//! - **Robust output**: OME BigTIFF with ImageJ and plain-stack fallbacks,
//!   persisted atomically
//! - **Cancellation and progress**: cooperative cancellation and progress
//!   hooks, or a background worker reporting events
//!
//! ## Architecture
//!
//! - [`array`] - axes, selections, batch plans, extraction and dense arrays
//! - [`source`] - the lazy source trait and its implementations
//! - [`export`] - the export pipeline, container writer trait and worker
//! - [`mod@format`] - TIFF parsing and writing, OME-XML and ImageJ metadata
//! - [`io`] - range readers and the block cache
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use hyperstack::array::{Selection, SelectionRequest};
//! use hyperstack::export::{export_file, ExportHooks};
//! use std::path::Path;
//!
//! let selections = SelectionRequest::default()
//!     .with_time(Selection::range(0, 9))
//!     .with_channel(Selection::single(1));
//!
//! export_file(
//!     Path::new("timelapse.ome.tif"),
//!     Path::new("subset.ome.tif"),
//!     selections,
//!     &ExportHooks::default(),
//! )?;
//! # Ok::<(), hyperstack::error::ExportError>(())
//! ```

pub mod array;
pub mod config;
pub mod error;
pub mod export;
pub mod format;
pub mod io;
pub mod source;

// Re-export commonly used types
pub use array::{
    Axis, AxisModel, BatchPlan, BoundsPolicy, DataType, DenseArray, Selection, SelectionRequest,
};
pub use config::{Cli, Command, ExportConfig, InfoConfig, InfoFormat};
pub use error::{ExportError, IoError, SelectionError, SourceError, TiffError, WriteError};
pub use export::{
    export_file, export_path, export_stack, CancellationToken, ContainerWriter, ExportEvent,
    ExportHooks, ExportRequest, ExportWorker, ProgressSink,
};
pub use format::TiffStackWriter;
pub use io::{BlockCache, BytesRangeReader, FileRangeReader, RangeReader};
pub use source::{open_source, LazySource, MemorySource, SourceInfo, TiffStackSource};
