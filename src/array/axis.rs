//! Named axes and the per-source axis model.
//!
//! Every array handled by the crate is described by a small fixed vocabulary
//! of axes. A source reports its axes in its own native order; the model
//! keeps that order because the extractor lays out buffers in it.

use std::fmt;

use serde::Serialize;

// =============================================================================
// Axis
// =============================================================================

/// One named dimension of a microscopy array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Axis {
    /// Time point
    T,
    /// Stage position / view
    P,
    /// Channel
    C,
    /// Z-slice (depth)
    Z,
    /// Row
    Y,
    /// Column
    X,
}

impl Axis {
    /// Canonical order of the extraction buffer handed to serialization.
    pub const CANONICAL: [Axis; 5] = [Axis::T, Axis::P, Axis::C, Axis::Y, Axis::X];

    /// Axes a caller may select on. Y and X are always kept whole.
    pub const SELECTABLE: [Axis; 4] = [Axis::T, Axis::P, Axis::C, Axis::Z];

    /// Single-letter name of the axis.
    pub const fn as_char(self) -> char {
        match self {
            Axis::T => 'T',
            Axis::P => 'P',
            Axis::C => 'C',
            Axis::Z => 'Z',
            Axis::Y => 'Y',
            Axis::X => 'X',
        }
    }

    /// Parse a single-letter axis name (case-insensitive).
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'T' => Some(Axis::T),
            'P' => Some(Axis::P),
            'C' => Some(Axis::C),
            'Z' => Some(Axis::Z),
            'Y' => Some(Axis::Y),
            'X' => Some(Axis::X),
            _ => None,
        }
    }

    /// Whether the axis is one of the two spatial plane axes.
    #[inline]
    pub const fn is_spatial(self) -> bool {
        matches!(self, Axis::Y | Axis::X)
    }

    /// Human-readable name of the axis.
    pub const fn name(self) -> &'static str {
        match self {
            Axis::T => "time",
            Axis::P => "position",
            Axis::C => "channel",
            Axis::Z => "z",
            Axis::Y => "y",
            Axis::X => "x",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Render an axis sequence as an axis-order string such as `"TCYX"`.
pub fn axes_to_string(axes: &[Axis]) -> String {
    axes.iter().map(|a| a.as_char()).collect()
}

// =============================================================================
// AxisInfo / AxisModel
// =============================================================================

/// Size and optional display labels of one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AxisInfo {
    pub size: usize,
    pub labels: Vec<Option<String>>,
}

impl AxisInfo {
    /// An axis of the given size without labels.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            labels: Vec::new(),
        }
    }
}

/// The axes of one source, in the source's native order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AxisModel {
    axes: Vec<(Axis, AxisInfo)>,
}

impl AxisModel {
    /// Build a model from axes and sizes in native order.
    pub fn from_sizes(sizes: impl IntoIterator<Item = (Axis, usize)>) -> Self {
        Self {
            axes: sizes
                .into_iter()
                .map(|(axis, size)| (axis, AxisInfo::new(size)))
                .collect(),
        }
    }

    /// Attach display labels to an axis. Unknown axes are ignored.
    pub fn with_labels(mut self, axis: Axis, labels: Vec<Option<String>>) -> Self {
        if let Some((_, info)) = self.axes.iter_mut().find(|(a, _)| *a == axis) {
            info.labels = labels;
        }
        self
    }

    /// Info for one axis, if the source has it.
    pub fn get(&self, axis: Axis) -> Option<&AxisInfo> {
        self.axes
            .iter()
            .find_map(|(a, info)| (*a == axis).then_some(info))
    }

    /// Size of one axis, if the source has it.
    #[inline]
    pub fn size(&self, axis: Axis) -> Option<usize> {
        self.get(axis).map(|info| info.size)
    }

    #[inline]
    pub fn contains(&self, axis: Axis) -> bool {
        self.get(axis).is_some()
    }

    /// Axes in native order.
    pub fn axes(&self) -> impl Iterator<Item = Axis> + '_ {
        self.axes.iter().map(|(a, _)| *a)
    }

    /// Axes with their info, in native order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &AxisInfo)> {
        self.axes.iter().map(|(a, info)| (*a, info))
    }

    /// Native shape of the source.
    pub fn shape(&self) -> Vec<usize> {
        self.axes.iter().map(|(_, info)| info.size).collect()
    }

    /// Position of an axis in native order.
    pub fn position(&self, axis: Axis) -> Option<usize> {
        self.axes.iter().position(|(a, _)| *a == axis)
    }

    /// Maximum valid index per axis.
    pub fn limits(&self) -> Vec<(Axis, usize)> {
        self.axes
            .iter()
            .map(|(a, info)| (*a, info.size.saturating_sub(1)))
            .collect()
    }

    /// Format the model for display: size and the first few labels per axis.
    pub fn describe(&self) -> String {
        let mut lines = vec!["=== Dimension Details ===".to_string()];
        for ((axis, info), (_, last)) in self.axes.iter().zip(self.limits()) {
            lines.push(format!("Axis {}:", axis));
            lines.push(format!("  Size: {}", info.size));
            lines.push(format!("  Indices: 0-{}", last));
            if !info.labels.is_empty() {
                let shown: Vec<&str> = info
                    .labels
                    .iter()
                    .take(5)
                    .map(|l| l.as_deref().unwrap_or("-"))
                    .collect();
                let more = if info.labels.len() > 5 { ", ..." } else { "" };
                lines.push(format!("  Labels: [{}{}]", shown.join(", "), more));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

// =============================================================================
// Tests
// =============================================================================
