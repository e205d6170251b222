//! Packing the canonical (T, P, C, Y, X) buffer into the 4-axis container
//! layout, and deriving the metadata written with it.

use std::path::Path;

use tracing::{debug, warn};

use crate::array::DenseArray;
use crate::error::ExportError;
use crate::format::OmeMetadata;
use crate::source::SourceMetadata;

/// Merge position and channel: (t, p, c, y, x) -> (t, p·c, y, x).
///
/// Element (t, p, c, y, x) lands at merged channel `p * c_size + c`.
pub fn collapse(canonical: DenseArray) -> Result<DenseArray, ExportError> {
    let shape = canonical.shape().to_vec();
    let [t, p, c, y, x] = shape[..] else {
        return Err(ExportError::UnexpectedShape {
            expected: "5 axes (T, P, C, Y, X)".to_string(),
            actual: shape,
        });
    };

    canonical
        .into_shape(&[t, p * c, y, x])
        .map_err(|_| ExportError::UnexpectedShape {
            expected: format!("[{}, {}, {}, {}]", t, p * c, y, x),
            actual: shape,
        })
}

/// What the export kept along the position and channel axes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Whether the source has a position axis at all.
    pub has_position: bool,
    /// Extent of the exported position axis.
    pub positions: usize,
    /// Source channel indices in export order.
    pub channels: Vec<usize>,
}

/// Derive the output metadata of one export.
pub fn derive_metadata(
    identifier: &str,
    source: &SourceMetadata,
    layout: &ChannelLayout,
    caller_names: Option<&[String]>,
) -> OmeMetadata {
    let file_name = Path::new(identifier)
        .file_name()
        .map_or_else(|| identifier.to_string(), |n| n.to_string_lossy().into_owned());

    OmeMetadata {
        description: format!("Exported from {}", file_name),
        physical_size_x: source.pixel_size.map(|p| p.x),
        physical_size_y: source.pixel_size.map(|p| p.y),
        physical_size_z: source.pixel_size.and_then(|p| p.z),
        channel_names: channel_names(source, layout, caller_names),
        time_increment_ms: source.time_increment_ms,
    }
}

fn channel_names(
    source: &SourceMetadata,
    layout: &ChannelLayout,
    caller_names: Option<&[String]>,
) -> Vec<String> {
    let merged = layout.positions * layout.channels.len();

    if let Some(names) = caller_names {
        if names.len() == merged {
            return names.to_vec();
        }
        warn!(
            given = names.len(),
            expected = merged,
            "Ignoring channel names that do not match the merged channel count"
        );
    }

    if layout.has_position {
        if merged <= 1 {
            return Vec::new();
        }
        return (0..layout.positions)
            .flat_map(|p| (0..layout.channels.len()).map(move |c| format!("{}-{}", p, c)))
            .collect();
    }

    // Passthrough only when every selected channel has a name
    let names: Option<Vec<String>> = layout
        .channels
        .iter()
        .map(|&i| source.channel_names.get(i).cloned())
        .collect();
    match names {
        Some(names) => names,
        None => {
            debug!("Source lacks names for some selected channels, writing none");
            Vec::new()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
