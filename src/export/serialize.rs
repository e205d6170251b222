//! Writing the merged (T, C', Y, X) buffer through a container writer, with
//! fallback layouts when the primary write fails.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::array::{Axis, DenseArray};
use crate::error::{ExportError, WriteError};
use crate::format::ome::{build_imagej, build_ome_xml};
use crate::format::{OmeMetadata, TiffStackWriter};

/// Axes of the primary output layout.
pub const PRIMARY_AXES: &str = "TCYX";

/// Flavour of one write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// 64-bit offsets.
    pub bigtiff: bool,
    /// OME-XML description instead of an ImageJ one.
    pub ome: bool,
}

/// Persists a dense array with an axis-order string and metadata.
///
/// `axes` names every dimension of `array`, except that a plain `"YX"`
/// accepts any number of leading dimensions, written as an undescribed
/// sequence of planes. Implementations either persist the whole file or
/// leave nothing at `path`.
pub trait ContainerWriter: Send + Sync {
    fn write(
        &self,
        path: &Path,
        array: &DenseArray,
        axes: &str,
        metadata: &OmeMetadata,
        options: WriteOptions,
    ) -> Result<(), WriteError>;
}

impl ContainerWriter for TiffStackWriter {
    fn write(
        &self,
        path: &Path,
        array: &DenseArray,
        axes: &str,
        metadata: &OmeMetadata,
        options: WriteOptions,
    ) -> Result<(), WriteError> {
        let parsed: Vec<Axis> = axes
            .chars()
            .map(|c| {
                Axis::from_char(c).ok_or_else(|| {
                    WriteError::UnsupportedLayout(format!("unknown axis '{}' in '{}'", c, axes))
                })
            })
            .collect::<Result<_, _>>()?;

        if parsed == [Axis::Y, Axis::X] && array.ndim() > 2 {
            let leading = array.ndim() - 2;
            let axes: Vec<Axis> = std::iter::repeat(Axis::Z)
                .take(leading)
                .chain([Axis::Y, Axis::X])
                .collect();
            return self.write_stack(path, array, &axes, None, options.bigtiff);
        }

        if parsed.len() != array.ndim() {
            return Err(WriteError::AxesMismatch {
                axes: axes.to_string(),
                ndim: array.ndim(),
            });
        }

        let description = if options.ome {
            build_ome_xml(metadata, &parsed, array.shape(), array.data_type())
        } else {
            build_imagej(metadata, &parsed, array.shape())
        };
        self.write_stack(path, array, &parsed, Some(&description), options.bigtiff)
    }
}

/// Write `merged` (T, C', Y, X) to `path`.
///
/// The primary attempt is OME BigTIFF over "TCYX". When it fails, a
/// 3-axis ImageJ stack is tried if T or C' is 1, and finally every leading
/// axis is flattened into a plain plane sequence. The error lists each
/// attempt's failure.
pub fn serialize(
    writer: &dyn ContainerWriter,
    path: &Path,
    merged: DenseArray,
    metadata: &OmeMetadata,
) -> Result<(), ExportError> {
    let shape = merged.shape().to_vec();
    let [t, c, y, x] = shape[..] else {
        return Err(ExportError::UnexpectedShape {
            expected: format!("4 axes ({})", PRIMARY_AXES),
            actual: shape,
        });
    };

    let mut attempts = Vec::new();

    debug!(path = %path.display(), shape = ?shape, "Writing OME-TIFF");
    match writer.write(
        path,
        &merged,
        PRIMARY_AXES,
        metadata,
        WriteOptions {
            bigtiff: true,
            ome: true,
        },
    ) {
        Ok(()) => return Ok(()),
        Err(e) => {
            warn!(error = %e, "OME-TIFF write failed, trying fallback layouts");
            attempts.push(format!("OME-TIFF {}: {}", PRIMARY_AXES, e));
        }
    }

    if t == 1 || c == 1 {
        let (axes, leading) = if t == 1 { ("CYX", c) } else { ("TYX", t) };
        let stack = reshape(merged.clone(), &[leading, y, x])?;
        match writer.write(
            path,
            &stack,
            axes,
            metadata,
            WriteOptions {
                bigtiff: false,
                ome: false,
            },
        ) {
            Ok(()) => {
                info!(axes, "Wrote ImageJ stack instead of OME-TIFF");
                return Ok(());
            }
            Err(e) => attempts.push(format!("ImageJ {}: {}", axes, e)),
        }
    }

    let planes = reshape(merged, &[t * c, y, x])?;
    warn!(
        planes = t * c,
        "Writing a plain plane sequence; time and channel structure is lost"
    );
    match writer.write(
        path,
        &planes,
        "YX",
        metadata,
        WriteOptions {
            bigtiff: true,
            ome: false,
        },
    ) {
        Ok(()) => Ok(()),
        Err(e) => {
            attempts.push(format!("plain YX stack: {}", e));
            Err(ExportError::Serialization { attempts })
        }
    }
}

fn reshape(array: DenseArray, shape: &[usize]) -> Result<DenseArray, ExportError> {
    let actual = array.shape().to_vec();
    array
        .into_shape(shape)
        .map_err(|_| ExportError::UnexpectedShape {
            expected: format!("{:?}", shape),
            actual,
        })
}

// =============================================================================
// Tests
// =============================================================================
