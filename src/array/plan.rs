//! Execution plan for one extraction.
//!
//! Each native axis of the source is either fixed at one index, batched over
//! an index list, or kept whole. The plan enumerates the cartesian product of
//! the batched lists and knows where each combination lands in the output
//! buffer.

use std::collections::BTreeMap;
use std::ops::Range;

use itertools::Itertools;

use super::axis::{Axis, AxisModel};
use super::selection::{Requested, ResolvedSelection};

/// Per-call selection handed to a lazy source: one index per fixed axis.
///
/// Axes not in the map are materialized whole.
pub type IndexSelection = BTreeMap<Axis, usize>;

/// How one native axis is treated by the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisPlan {
    /// Exactly one index for the whole export.
    Fixed(usize),
    /// More than one index; looped over.
    Batched(Vec<usize>),
    /// Materialized at native size.
    Whole,
}

/// One step of the batch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    /// Source index per batched axis, in batched-axis order.
    pub indices: Vec<usize>,
    /// Position of each index within its axis's index list.
    pub positions: Vec<usize>,
}

/// The plan for one export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Every native axis with its size and treatment, in native order.
    axes: Vec<(Axis, usize, AxisPlan)>,
}

impl BatchPlan {
    /// Classify every native axis of `model` from the resolved selection.
    ///
    /// A one-element index list is fixed, never batched.
    pub fn new(model: &AxisModel, resolved: &ResolvedSelection) -> Self {
        let axes = model
            .iter()
            .map(|(axis, info)| {
                let plan = match resolved.get(axis) {
                    Some(Requested::Indices(list)) if list.len() == 1 => AxisPlan::Fixed(list[0]),
                    Some(Requested::Indices(list)) => AxisPlan::Batched(list.clone()),
                    Some(Requested::Whole) | None => AxisPlan::Whole,
                };
                (axis, info.size, plan)
            })
            .collect();
        Self { axes }
    }

    /// Plan entries in native order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, &AxisPlan)> {
        self.axes.iter().map(|(a, _, p)| (*a, p))
    }

    /// Native axis order.
    pub fn native_axes(&self) -> Vec<Axis> {
        self.axes.iter().map(|(a, _, _)| *a).collect()
    }

    /// Batched axes in encounter (native) order.
    pub fn batched_axes(&self) -> Vec<Axis> {
        self.axes
            .iter()
            .filter(|(_, _, p)| matches!(p, AxisPlan::Batched(_)))
            .map(|(a, _, _)| *a)
            .collect()
    }

    /// Index list of a batched axis.
    pub fn index_list(&self, axis: Axis) -> Option<&[usize]> {
        self.axes.iter().find_map(|(a, _, p)| match p {
            AxisPlan::Batched(list) if *a == axis => Some(list.as_slice()),
            _ => None,
        })
    }

    /// The fixed-axis index map.
    pub fn fixed(&self) -> IndexSelection {
        self.axes
            .iter()
            .filter_map(|(a, _, p)| match p {
                AxisPlan::Fixed(i) => Some((*a, *i)),
                _ => None,
            })
            .collect()
    }

    #[inline]
    pub fn is_batched(&self) -> bool {
        self.axes
            .iter()
            .any(|(_, _, p)| matches!(p, AxisPlan::Batched(_)))
    }

    /// Number of combinations; zero when nothing is batched.
    pub fn combination_count(&self) -> usize {
        if !self.is_batched() {
            return 0;
        }
        self.axes
            .iter()
            .filter_map(|(_, _, p)| match p {
                AxisPlan::Batched(list) => Some(list.len()),
                _ => None,
            })
            .product()
    }

    /// The combination sequence, first batched axis varying slowest.
    ///
    /// Empty when nothing is batched.
    pub fn combinations(&self) -> Vec<Combination> {
        let lists: Vec<&Vec<usize>> = self
            .axes
            .iter()
            .filter_map(|(_, _, p)| match p {
                AxisPlan::Batched(list) => Some(list),
                _ => None,
            })
            .collect();

        if lists.is_empty() {
            return Vec::new();
        }

        lists
            .into_iter()
            .map(|list| list.iter().copied().enumerate())
            .multi_cartesian_product()
            .map(|pairs| {
                let (positions, indices): (Vec<usize>, Vec<usize>) = pairs.into_iter().unzip();
                Combination { indices, positions }
            })
            .collect()
    }

    /// Shape of the extraction buffer in native order.
    pub fn final_shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .map(|(_, size, p)| match p {
                AxisPlan::Fixed(_) => 1,
                AxisPlan::Batched(list) => list.len(),
                AxisPlan::Whole => *size,
            })
            .collect()
    }

    /// Shape of one materialized chunk: batched and fixed axes are extent 1.
    pub fn chunk_shape(&self) -> Vec<usize> {
        self.axes
            .iter()
            .map(|(_, size, p)| match p {
                AxisPlan::Whole => *size,
                _ => 1,
            })
            .collect()
    }

    /// Per-call selection for one combination: the fixed map plus one index
    /// per batched axis.
    pub fn selection_for(&self, combination: &Combination) -> IndexSelection {
        let mut selection = self.fixed();
        let batched = self.batched_axes();
        for (axis, index) in batched.into_iter().zip(&combination.indices) {
            selection.insert(axis, *index);
        }
        selection
    }

    /// Where a combination's chunk lands in the buffer.
    pub fn region_for(&self, combination: &Combination) -> Vec<Range<usize>> {
        let mut positions = combination.positions.iter();
        self.axes
            .iter()
            .map(|(_, size, p)| match p {
                AxisPlan::Batched(_) => {
                    let pos = positions.next().copied().unwrap_or(0);
                    pos..pos + 1
                }
                AxisPlan::Fixed(_) => 0..1,
                AxisPlan::Whole => 0..*size,
            })
            .collect()
    }
}

// =============================================================================
// Tests
// =============================================================================
