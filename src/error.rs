use thiserror::Error;

use crate::array::Axis;

/// I/O errors that can occur when reading byte ranges from a stack file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the underlying file system
    #[error("I/O error: {0}")]
    Io(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Io(err.to_string())
    }
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (only uncompressed stacks are supported)")]
    UnsupportedCompression(String),

    /// File uses tiles instead of strips
    #[error("Unsupported organization: file uses tiles instead of strips")]
    TileOrganization,

    /// Sample layout that does not map onto a supported data type
    #[error("Unsupported sample format: {bits} bits per sample, sample format {format}")]
    UnsupportedSampleFormat { bits: u16, format: u16 },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised by a container writer
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// I/O error while writing or persisting the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Axis-order string does not match the array
    #[error("Axis order '{axes}' does not match array with {ndim} dimensions")]
    AxesMismatch { axes: String, ndim: usize },

    /// The array cannot be laid out as pages of rows and columns
    #[error("Unsupported layout: {0}")]
    UnsupportedLayout(String),

    /// Classic TIFF offsets cannot address the payload
    #[error("Payload of {size} bytes exceeds the classic TIFF 4GB limit")]
    TooLargeForClassicTiff { size: u64 },

    /// Data type the target layout cannot represent
    #[error("Data type {0} is not supported by this layout")]
    UnsupportedDataType(String),
}

/// Errors raised while resolving per-axis selections
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// An explicit index lies outside the axis
    #[error("Index {index} out of range for axis {axis} (size {size}, max index {max})", max = .size.saturating_sub(1))]
    OutOfRange { axis: Axis, index: usize, size: usize },

    /// A range whose start lies after its end
    #[error("Inverted range for axis {axis}: start {start} > end {end}")]
    InvertedRange { axis: Axis, start: usize, end: usize },

    /// An explicit index list with no members
    #[error("Empty index list for axis {0}")]
    EmptySelection(Axis),
}

/// Errors raised by a lazy source when opening or materializing data
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// TIFF parsing error
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// File layout cannot be mapped onto named axes
    #[error("Unsupported layout: {reason}")]
    UnsupportedLayout { reason: String },

    /// Metadata could not be interpreted
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// A selection names an index that the source does not have
    #[error("Index {index} out of bounds for axis {axis} (size {size})")]
    IndexOutOfBounds { axis: Axis, index: usize, size: usize },
}

/// Errors surfaced by the export pipeline
#[derive(Debug, Clone, Error)]
pub enum ExportError {
    /// The lazy source could not be opened
    #[error("Failed to open source: {0}")]
    Open(SourceError),

    /// A per-axis selection is invalid
    #[error("Invalid selection: {0}")]
    Selection(#[from] SelectionError),

    /// The lazy source failed while materializing a chunk
    #[error("Extraction failed: {0}")]
    Extraction(#[from] SourceError),

    /// A buffer or chunk does not have the shape the plan requires
    #[error("Unexpected shape: expected {expected}, got {actual:?}")]
    UnexpectedShape { expected: String, actual: Vec<usize> },

    /// The primary write and every fallback layout failed
    #[error("Serialization failed: {}", .attempts.join("; "))]
    Serialization { attempts: Vec<String> },

    /// Cooperative cancellation was observed
    #[error("Operation cancelled")]
    Cancelled,

    /// The background task running the export panicked or was aborted
    #[error("Export task aborted: {0}")]
    Aborted(String),
}

impl ExportError {
    /// Whether this outcome is a cancellation rather than a failure.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }
}
