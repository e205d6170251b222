//! Batched extraction from a lazy source into one dense buffer.

use tracing::debug;

use super::axis::{axes_to_string, Axis};
use super::dense::{AssignError, DenseArray};
use super::plan::BatchPlan;
use crate::error::ExportError;
use crate::export::{CancellationToken, ProgressSink};
use crate::source::LazySource;

/// Materializes a [`BatchPlan`] against a source.
///
/// The buffer is laid out in the source's native axis order, so chunks are
/// copied in place and never transposed.
pub struct Extractor<'a> {
    source: &'a dyn LazySource,
    progress: &'a dyn ProgressSink,
    cancel: &'a CancellationToken,
}

impl<'a> Extractor<'a> {
    pub fn new(
        source: &'a dyn LazySource,
        progress: &'a dyn ProgressSink,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            source,
            progress,
            cancel,
        }
    }

    /// Run the plan and return the buffer in native order with the source's
    /// data type.
    ///
    /// On cancellation or error the partially filled buffer is dropped.
    pub fn run(&self, plan: &BatchPlan) -> Result<DenseArray, ExportError> {
        let dtype = self.source.data_type();
        let shape = plan.final_shape();

        if !plan.is_batched() {
            debug!(shape = ?shape, "Single direct extraction");
            let data = self.source.materialize(&plan.fixed())?.cast(dtype);
            if data.shape() != shape.as_slice() {
                return Err(ExportError::UnexpectedShape {
                    expected: format!("{:?}", shape),
                    actual: data.shape().to_vec(),
                });
            }
            return Ok(data);
        }

        let combinations = plan.combinations();
        let total = combinations.len();
        let chunk_shape = plan.chunk_shape();
        debug!(
            batched = %axes_to_string(&plan.batched_axes()),
            combinations = total,
            shape = ?shape,
            "Batched extraction"
        );

        let mut buffer = DenseArray::zeros(dtype, &shape);
        for (done, combination) in combinations.iter().enumerate() {
            self.cancel.check()?;

            let chunk = self
                .source
                .materialize(&plan.selection_for(combination))?
                .cast(dtype);
            if chunk.shape() != chunk_shape.as_slice() {
                return Err(ExportError::UnexpectedShape {
                    expected: format!("{:?}", chunk_shape),
                    actual: chunk.shape().to_vec(),
                });
            }

            buffer
                .assign_region(&plan.region_for(combination), &chunk)
                .map_err(|e| match e {
                    AssignError::ShapeMismatch { region, chunk } => ExportError::UnexpectedShape {
                        expected: format!("{:?}", region),
                        actual: chunk,
                    },
                    AssignError::DataTypeMismatch { target, chunk: found } => {
                        ExportError::UnexpectedShape {
                            expected: format!("{} chunk, got {}", target, found),
                            actual: chunk.shape().to_vec(),
                        }
                    }
                })?;

            self.progress.combination(done + 1, total);
        }

        Ok(buffer)
    }
}

/// Reorder a native-order buffer into (T, P, C, Y, X).
///
/// Axes the buffer lacks become extent 1. A Z axis of extent 1 is dropped;
/// any other Z extent cannot be expressed in five axes and fails.
pub fn to_canonical(buffer: DenseArray, native_axes: &[Axis]) -> Result<DenseArray, ExportError> {
    let unexpected = |actual: &[usize]| ExportError::UnexpectedShape {
        expected: format!("{} reducible to TPCYX", axes_to_string(native_axes)),
        actual: actual.to_vec(),
    };

    if buffer.ndim() != native_axes.len()
        || !native_axes.contains(&Axis::Y)
        || !native_axes.contains(&Axis::X)
    {
        return Err(unexpected(buffer.shape()));
    }

    let mut axes = Vec::with_capacity(native_axes.len());
    let mut sizes = Vec::with_capacity(native_axes.len());
    for (&axis, &size) in native_axes.iter().zip(buffer.shape()) {
        if axis == Axis::Z {
            if size != 1 {
                return Err(unexpected(buffer.shape()));
            }
            continue;
        }
        axes.push(axis);
        sizes.push(size);
    }

    let squeezed = if sizes.len() == buffer.ndim() {
        buffer
    } else {
        buffer
            .into_shape(&sizes)
            .map_err(|_| ExportError::UnexpectedShape {
                expected: format!("{:?}", sizes),
                actual: Vec::new(),
            })?
    };

    let order: Vec<usize> = Axis::CANONICAL
        .iter()
        .filter_map(|c| axes.iter().position(|a| a == c))
        .collect();
    let permuted = squeezed.permuted(&order);

    let target: Vec<usize> = Axis::CANONICAL
        .iter()
        .map(|c| {
            axes.iter()
                .position(|a| a == c)
                .map_or(1, |i| sizes[i])
        })
        .collect();

    let actual = permuted.shape().to_vec();
    permuted.into_shape(&target).map_err(|_| ExportError::UnexpectedShape {
        expected: format!("{:?}", target),
        actual,
    })
}

// =============================================================================
// Tests
// =============================================================================
