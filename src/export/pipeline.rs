//! The export pipeline: resolve, plan, extract, canonicalize, normalize,
//! collapse and write.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::collapse::{collapse, derive_metadata, ChannelLayout};
use super::hooks::ExportHooks;
use super::serialize::{serialize, ContainerWriter};
use crate::array::{
    axes_to_string, normalize, resolve, to_canonical, validate_single_index, Axis, AxisPlan,
    BatchPlan, BoundsPolicy, DenseArray, Extractor, IndexSelection, SelectionRequest,
};
use crate::error::ExportError;
use crate::format::TiffStackWriter;
use crate::source::{open_source, LazySource, SourceOptions};

/// Progress reported after each pipeline stage.
mod stage {
    pub const RESOLVED: u8 = 10;
    pub const PLANNED: u8 = 20;
    pub const EXTRACTED: u8 = 40;
    pub const CANONICAL: u8 = 60;
    pub const NORMALIZED: u8 = 80;
    pub const WRITTEN: u8 = 90;
    pub const DONE: u8 = 100;
}

/// One export: where to write and what to keep.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRequest {
    pub output: PathBuf,
    pub selections: SelectionRequest,
    /// Names for the merged channel axis; used when their count matches.
    pub channel_names: Option<Vec<String>>,
    pub bounds_policy: BoundsPolicy,
}

impl ExportRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            selections: SelectionRequest::default(),
            channel_names: None,
            bounds_policy: BoundsPolicy::default(),
        }
    }

    pub fn with_selections(mut self, selections: SelectionRequest) -> Self {
        self.selections = selections;
        self
    }

    pub fn with_channel_names(mut self, names: Vec<String>) -> Self {
        self.channel_names = Some(names);
        self
    }

    pub fn with_bounds_policy(mut self, policy: BoundsPolicy) -> Self {
        self.bounds_policy = policy;
        self
    }
}

/// Export a selection of `source` through `writer`.
///
/// The writer runs only once the buffer is complete and normalized, so an
/// error or cancellation never leaves a partial output. Failures (including
/// cancellation) are reported exactly once to the progress sink.
pub fn export_stack(
    request: &ExportRequest,
    source: &dyn LazySource,
    writer: &dyn ContainerWriter,
    hooks: &ExportHooks,
) -> Result<PathBuf, ExportError> {
    let result = run(request, source, writer, hooks);
    report(&result, hooks);
    result
}

/// Open `input` and export it to `output` with the given selections.
pub fn export_file(
    input: &Path,
    output: &Path,
    selections: SelectionRequest,
    hooks: &ExportHooks,
) -> Result<PathBuf, ExportError> {
    let request = ExportRequest::new(output).with_selections(selections);
    export_path(input, &request, &SourceOptions::default(), hooks)
}

/// Open `input` with `options` and run `request` against it with the TIFF
/// stack writer.
pub fn export_path(
    input: &Path,
    request: &ExportRequest,
    options: &SourceOptions,
    hooks: &ExportHooks,
) -> Result<PathBuf, ExportError> {
    let opened = hooks
        .cancel
        .check()
        .and_then(|_| open_source(input, options).map_err(ExportError::Open));
    let source = match opened {
        Ok(source) => source,
        Err(e) => {
            report::<PathBuf>(&Err(e.clone()), hooks);
            return Err(e);
        }
    };
    export_stack(request, source.as_ref(), &TiffStackWriter::new(), hooks)
}

fn report<T>(result: &Result<T, ExportError>, hooks: &ExportHooks)
where
    T: AsRef<Path>,
{
    match result {
        Ok(path) => {
            hooks.progress.progress(stage::DONE);
            hooks.progress.finished(path.as_ref());
        }
        Err(e) if e.is_cancelled() => {
            info!("Export cancelled");
            hooks.progress.failed(e);
        }
        Err(e) => {
            warn!(error = %e, "Export failed");
            hooks.progress.failed(e);
        }
    }
}

fn run(
    request: &ExportRequest,
    source: &dyn LazySource,
    writer: &dyn ContainerWriter,
    hooks: &ExportHooks,
) -> Result<PathBuf, ExportError> {
    let progress = hooks.progress.as_ref();
    let cancel = &hooks.cancel;
    let model = source.axes();

    info!(
        source = source.identifier(),
        output = %request.output.display(),
        axes = %axes_to_string(&model.axes().collect::<Vec<_>>()),
        "Starting export"
    );

    cancel.check()?;
    let resolved = resolve(&request.selections, model, request.bounds_policy)?;
    progress.progress(stage::RESOLVED);

    let plan = BatchPlan::new(model, &resolved);
    debug!(
        combinations = plan.combination_count(),
        final_shape = ?plan.final_shape(),
        "Planned extraction"
    );
    progress.progress(stage::PLANNED);

    cancel.check()?;
    let buffer = Extractor::new(source, progress, cancel).run(&plan)?;
    progress.progress(stage::EXTRACTED);

    let canonical = to_canonical(buffer, &plan.native_axes())?;
    progress.progress(stage::CANONICAL);

    cancel.check()?;
    let normalized = normalize(canonical);
    let merged = collapse(normalized)?;
    let layout = channel_layout(source, &plan);
    let metadata = derive_metadata(
        source.identifier(),
        source.metadata(),
        &layout,
        request.channel_names.as_deref(),
    );
    progress.progress(stage::NORMALIZED);

    cancel.check()?;
    serialize(writer, &request.output, merged, &metadata)?;
    progress.progress(stage::WRITTEN);

    info!(output = %request.output.display(), "Export finished");
    Ok(request.output.clone())
}

/// Exported extent along P and the source channel indices kept along C.
fn channel_layout(source: &dyn LazySource, plan: &BatchPlan) -> ChannelLayout {
    let model = source.axes();
    let kept = |axis: Axis| -> Vec<usize> {
        match plan.iter().find(|(a, _)| *a == axis).map(|(_, p)| p) {
            Some(AxisPlan::Fixed(i)) => vec![*i],
            Some(AxisPlan::Batched(list)) => list.clone(),
            Some(AxisPlan::Whole) => (0..model.size(axis).unwrap_or(1)).collect(),
            None => vec![0],
        }
    };

    ChannelLayout {
        has_position: model.contains(Axis::P),
        positions: kept(Axis::P).len(),
        channels: kept(Axis::C),
    }
}

/// Materialize one index per axis from `source`.
///
/// Indices outside their axis are dropped with a warning and that axis is
/// read whole.
pub fn extract_subset(
    source: &dyn LazySource,
    indices: &IndexSelection,
) -> Result<DenseArray, ExportError> {
    let model = source.axes();
    let mut selection = IndexSelection::new();
    for (&axis, &index) in indices {
        match validate_single_index(model, axis, index) {
            Ok(()) if model.contains(axis) => {
                selection.insert(axis, index);
            }
            Ok(()) => debug!(axis = %axis, "Ignoring index for axis absent from source"),
            Err(e) => warn!(error = %e, "Dropping out-of-range index"),
        }
    }
    Ok(source.materialize(&selection)?)
}

// =============================================================================
// Tests
// =============================================================================
