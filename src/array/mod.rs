//! The slicing and extraction engine.
//!
//! Pipeline order: an [`AxisModel`] describes the source, [`resolve`] turns a
//! [`SelectionRequest`] into per-axis requests, [`BatchPlan`] classifies axes
//! as fixed or batched, the [`Extractor`] fills one dense buffer in native
//! order, [`to_canonical`] reorders it to (T, P, C, Y, X) and [`normalize`]
//! applies the output data type policy.

mod axis;
mod dense;
mod extract;
mod normalize;
mod plan;
mod selection;

pub use axis::{axes_to_string, Axis, AxisInfo, AxisModel};
pub use dense::{AssignError, DataType, DenseArray, Element};
pub use extract::{to_canonical, Extractor};
pub use normalize::{normalize, output_type};
pub use plan::{AxisPlan, BatchPlan, Combination, IndexSelection};
pub use selection::{
    resolve, validate_single_index, BoundsPolicy, Requested, ResolvedSelection, Selection,
    SelectionRequest,
};
