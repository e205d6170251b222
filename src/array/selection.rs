//! Per-axis selections and their resolution against an axis model.
//!
//! A caller may select on any of the four non-spatial axes. Selections for
//! axes the source does not have are ignored; axes the source has but the
//! caller left unselected are kept whole.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, warn};

use super::axis::{Axis, AxisModel};
use crate::error::SelectionError;

// =============================================================================
// Selection
// =============================================================================

/// Explicit selection on one axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Inclusive index range. A single index is the range `(v, v)`.
    Range { start: usize, end: usize },
    /// Explicit index list, in the order the output should hold them.
    Indices(Vec<usize>),
}

impl Selection {
    /// Select exactly one index.
    pub fn single(index: usize) -> Self {
        Selection::Range {
            start: index,
            end: index,
        }
    }

    /// Select the inclusive range `start..=end`.
    pub fn range(start: usize, end: usize) -> Self {
        Selection::Range { start, end }
    }

    pub fn indices(indices: Vec<usize>) -> Self {
        Selection::Indices(indices)
    }

    /// Reject inverted ranges and empty lists.
    fn check_shape(&self, axis: Axis) -> Result<(), SelectionError> {
        match self {
            Selection::Range { start, end } if start > end => Err(SelectionError::InvertedRange {
                axis,
                start: *start,
                end: *end,
            }),
            Selection::Indices(list) if list.is_empty() => Err(SelectionError::EmptySelection(axis)),
            _ => Ok(()),
        }
    }

    /// First index outside `axis`, found without expanding ranges.
    fn first_out_of_range(&self, model: &AxisModel, axis: Axis) -> Option<SelectionError> {
        match self {
            Selection::Range { start, end } => {
                let size = model.size(axis)?;
                (*end >= size).then(|| SelectionError::OutOfRange {
                    axis,
                    index: (*start).max(size),
                    size,
                })
            }
            Selection::Indices(list) => list
                .iter()
                .find_map(|&i| validate_single_index(model, axis, i).err()),
        }
    }

    /// Explicit index list. Only call once bounds are known to hold.
    fn expand(&self) -> Vec<usize> {
        match self {
            Selection::Range { start, end } => (*start..=*end).collect(),
            Selection::Indices(list) => list.clone(),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Range { start, end } if start == end => write!(f, "{}", start),
            Selection::Range { start, end } => write!(f, "{}-{}", start, end),
            Selection::Indices(list) => {
                let parts: Vec<String> = list.iter().map(|i| i.to_string()).collect();
                f.write_str(&parts.join(","))
            }
        }
    }
}

/// Parses `N`, `A-B` (inclusive) or `A,B,C`.
impl FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<usize>()
                .map_err(|_| format!("invalid index '{}' in selection '{}'", part.trim(), s))
        };

        if s.contains(',') {
            let indices = s.split(',').map(parse).collect::<Result<Vec<_>, _>>()?;
            return Ok(Selection::Indices(indices));
        }

        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (parse(start)?, parse(end)?);
            if start > end {
                return Err(format!("range '{}' has start after end", s));
            }
            return Ok(Selection::range(start, end));
        }

        parse(s).map(Selection::single)
    }
}

// =============================================================================
// SelectionRequest
// =============================================================================

/// The four optional selections of one export request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionRequest {
    pub position: Option<Selection>,
    pub channel: Option<Selection>,
    pub time: Option<Selection>,
    pub z: Option<Selection>,
}

impl SelectionRequest {
    pub fn with_position(mut self, selection: Selection) -> Self {
        self.position = Some(selection);
        self
    }

    pub fn with_channel(mut self, selection: Selection) -> Self {
        self.channel = Some(selection);
        self
    }

    pub fn with_time(mut self, selection: Selection) -> Self {
        self.time = Some(selection);
        self
    }

    pub fn with_z(mut self, selection: Selection) -> Self {
        self.z = Some(selection);
        self
    }

    /// Selection for one axis, if any. Y and X never carry one.
    pub fn get(&self, axis: Axis) -> Option<&Selection> {
        match axis {
            Axis::P => self.position.as_ref(),
            Axis::C => self.channel.as_ref(),
            Axis::T => self.time.as_ref(),
            Axis::Z => self.z.as_ref(),
            Axis::Y | Axis::X => None,
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// What to do with explicit indices that fall outside their axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundsPolicy {
    /// Fail the request with [`SelectionError::OutOfRange`].
    #[default]
    Strict,
    /// Drop the selection with a warning and keep the axis whole.
    Lenient,
}

/// Requested value for one axis after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requested {
    /// Not explicitly selected: the full inclusive range, kept at native size.
    Whole,
    /// Explicit, bounds-checked index list.
    Indices(Vec<usize>),
}

/// Per-axis requested values, for the selectable axes of a source in native
/// order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSelection {
    axes: Vec<(Axis, Requested)>,
}

impl ResolvedSelection {
    pub fn get(&self, axis: Axis) -> Option<&Requested> {
        self.axes
            .iter()
            .find_map(|(a, r)| (*a == axis).then_some(r))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Axis, &Requested)> {
        self.axes.iter().map(|(a, r)| (*a, r))
    }
}

/// Check that `index` is a valid position on `axis`.
///
/// Axes the model does not have accept any index; the selection is ignored
/// elsewhere.
pub fn validate_single_index(
    model: &AxisModel,
    axis: Axis,
    index: usize,
) -> Result<(), SelectionError> {
    match model.size(axis) {
        Some(size) if index >= size => Err(SelectionError::OutOfRange { axis, index, size }),
        _ => Ok(()),
    }
}

/// Resolve a request against a model.
///
/// Every selectable axis the model has gets an entry. Shape errors
/// (inverted ranges, empty lists) always fail; out-of-bounds indices follow
/// `policy`.
pub fn resolve(
    request: &SelectionRequest,
    model: &AxisModel,
    policy: BoundsPolicy,
) -> Result<ResolvedSelection, SelectionError> {
    for axis in Axis::SELECTABLE {
        if request.get(axis).is_some() && !model.contains(axis) {
            debug!(axis = %axis, "Ignoring selection for axis absent from source");
        }
    }

    let mut axes = Vec::new();
    for axis in model.axes().filter(|a| !a.is_spatial()) {
        let Some(selection) = request.get(axis) else {
            axes.push((axis, Requested::Whole));
            continue;
        };

        selection.check_shape(axis)?;
        let requested = match (selection.first_out_of_range(model, axis), policy) {
            (None, _) => Requested::Indices(selection.expand()),
            (Some(err), BoundsPolicy::Strict) => return Err(err),
            (Some(err), BoundsPolicy::Lenient) => {
                warn!(
                    axis = %axis,
                    selection = %selection,
                    error = %err,
                    "Dropping out-of-range selection, keeping full axis"
                );
                Requested::Whole
            }
        };
        axes.push((axis, requested));
    }

    Ok(ResolvedSelection { axes })
}

// =============================================================================
// Tests
// =============================================================================
