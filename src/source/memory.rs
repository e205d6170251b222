use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{LazySource, SourceMetadata};
use crate::array::{AxisModel, DataType, DenseArray, IndexSelection};
use crate::error::{IoError, SourceError};

/// A source over an array that is already in memory.
///
/// Used for decoded data handed in by a caller and as the synthetic source of
/// the test suite. It can also imitate lazy back-ends that widen results to
/// `f64`, and fail on a chosen materialize call.
pub struct MemorySource {
    identifier: String,
    axes: AxisModel,
    data: DenseArray,
    metadata: SourceMetadata,
    upcast_to_f64: bool,
    fail_on_call: Option<usize>,
    calls: AtomicUsize,
}

impl MemorySource {
    /// Wrap `data`, whose shape must equal the model's native shape.
    pub fn new(
        identifier: impl Into<String>,
        axes: AxisModel,
        data: DenseArray,
    ) -> Result<Self, SourceError> {
        if data.shape() != axes.shape().as_slice() {
            return Err(SourceError::UnsupportedLayout {
                reason: format!(
                    "array shape {:?} does not match axis sizes {:?}",
                    data.shape(),
                    axes.shape()
                ),
            });
        }
        Ok(Self {
            identifier: identifier.into(),
            axes,
            data,
            metadata: SourceMetadata::default(),
            upcast_to_f64: false,
            fail_on_call: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Return every materialized chunk as `f64`.
    pub fn with_upcast_to_f64(mut self, upcast: bool) -> Self {
        self.upcast_to_f64 = upcast;
        self
    }

    /// Fail the `call`-th materialize call (1-based) with an I/O error.
    pub fn with_failure_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    /// Number of materialize calls so far, failed ones included.
    pub fn materialize_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LazySource for MemorySource {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn axes(&self) -> &AxisModel {
        &self.axes
    }

    fn data_type(&self) -> DataType {
        self.data.data_type()
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn materialize(&self, selection: &IndexSelection) -> Result<DenseArray, SourceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_call == Some(call) {
            return Err(SourceError::Io(IoError::Io(format!(
                "injected failure on materialize call {}",
                call
            ))));
        }

        let mut region: Vec<Range<usize>> = Vec::with_capacity(self.axes.shape().len());
        for (axis, info) in self.axes.iter() {
            match selection.get(&axis) {
                Some(&index) if index >= info.size => {
                    return Err(SourceError::IndexOutOfBounds {
                        axis,
                        index,
                        size: info.size,
                    })
                }
                Some(&index) => region.push(index..index + 1),
                None => region.push(0..info.size),
            }
        }

        let chunk = self.data.region(&region);
        Ok(if self.upcast_to_f64 {
            chunk.cast(DataType::F64)
        } else {
            chunk
        })
    }
}
