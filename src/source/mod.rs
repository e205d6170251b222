//! Lazy multi-dimensional sources.
//!
//! A [`LazySource`] describes its axes up front and only reads pixel data
//! when asked to materialize a selection. Two implementations ship with the
//! crate:
//!
//! - [`MemorySource`]: an already-decoded array held in memory
//! - [`TiffStackSource`]: an uncompressed multi-page TIFF/BigTIFF hyperstack,
//!   read one page at a time through a block cache

mod info;
mod memory;
mod metadata;
mod tiff_stack;

use std::path::Path;

pub use info::{AxisSummary, SourceInfo};
pub use memory::MemorySource;
pub use metadata::{Attributes, MetadataRepr, PixelSize, SourceMetadata};
pub use tiff_stack::TiffStackSource;

use crate::array::{AxisModel, DataType, DenseArray, IndexSelection};
use crate::error::SourceError;
use crate::io::{BlockCache, FileRangeReader, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};

/// A labelled N-dimensional array that is read on demand.
pub trait LazySource: Send + Sync {
    /// Identifier for logs and derived metadata (usually the file path).
    fn identifier(&self) -> &str;

    /// Axes and sizes in native order.
    fn axes(&self) -> &AxisModel;

    /// Element type of the stored data.
    fn data_type(&self) -> DataType;

    /// Normalized metadata.
    fn metadata(&self) -> &SourceMetadata;

    /// Select one index on every axis in `selection`, keep the others whole,
    /// and read the result into memory.
    ///
    /// The result is in native axis order; selected axes keep extent 1.
    /// Implementations may return a wider data type than
    /// [`data_type`](Self::data_type); callers cast back.
    fn materialize(&self, selection: &IndexSelection) -> Result<DenseArray, SourceError>;
}

/// Options for opening file-backed sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceOptions {
    /// Block size of the read cache in bytes.
    pub block_size: usize,
    /// Number of blocks the read cache holds.
    pub cache_blocks: usize,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_BLOCK_CACHE_CAPACITY,
        }
    }
}

/// Open a stack file as a lazy source.
pub fn open_source(
    path: impl AsRef<Path>,
    options: &SourceOptions,
) -> Result<Box<dyn LazySource>, SourceError> {
    let reader = FileRangeReader::open(path)?;
    let cached = BlockCache::with_capacity(reader, options.block_size, options.cache_blocks);
    Ok(Box::new(TiffStackSource::open(cached)?))
}
