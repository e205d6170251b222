//! Export pipeline integration tests.
//!
//! Tests verify:
//! - Output shape per axis (batched, fixed, absent)
//! - Fixed index and length-1 range give identical output
//! - Direct and batched extraction agree bit for bit
//! - Cancellation mid-batch stops materialization
//! - Fallback layouts when the primary write fails
//! - End-to-end export to a real file and back

use std::sync::Arc;

use hyperstack::array::{Axis, BoundsPolicy, DataType, DenseArray, Selection, SelectionRequest};
use hyperstack::error::{ExportError, SelectionError};
use hyperstack::export::{
    export_file, export_stack, CancellationToken, ContainerWriter, ExportHooks, ExportRequest,
    WriteOptions,
};
use hyperstack::format::OmeMetadata;
use hyperstack::source::{open_source, LazySource, SourceOptions};
use hyperstack::{MemorySource, TiffStackWriter};

use super::test_utils::{ramp, ramp_source, CancelAfter, RecordingProgress, RecordingWriter};

fn export(source: &MemorySource, selections: SelectionRequest) -> DenseArray {
    let writer = RecordingWriter::new();
    let request = ExportRequest::new("out.ome.tif").with_selections(selections);
    export_stack(&request, source, &writer, &ExportHooks::default()).unwrap();
    writer.written().unwrap().array
}

// =============================================================================
// Shape Law
// =============================================================================

#[test]
fn test_shape_law_per_axis() {
    let source = ramp_source(&[
        (Axis::T, 5),
        (Axis::P, 3),
        (Axis::C, 4),
        (Axis::Y, 6),
        (Axis::X, 7),
    ]);

    // Batched T (3), fixed P (1), whole C (4)
    let out = export(
        &source,
        SelectionRequest::default()
            .with_time(Selection::range(1, 3))
            .with_position(Selection::single(2)),
    );
    assert_eq!(out.shape(), &[3, 4, 6, 7]);

    // Everything whole: P and C merge
    let out = export(&source, SelectionRequest::default());
    assert_eq!(out.shape(), &[5, 12, 6, 7]);

    // Explicit lists on two axes
    let out = export(
        &source,
        SelectionRequest::default()
            .with_position(Selection::indices(vec![0, 2]))
            .with_channel(Selection::indices(vec![3, 1, 0])),
    );
    assert_eq!(out.shape(), &[5, 6, 6, 7]);
}

#[test]
fn test_absent_axes_become_extent_one() {
    let source = ramp_source(&[(Axis::C, 2), (Axis::Y, 3), (Axis::X, 3)]);
    let out = export(
        &source,
        SelectionRequest::default().with_time(Selection::range(0, 9)),
    );
    assert_eq!(out.shape(), &[1, 2, 3, 3]);
}

#[test]
fn test_merged_channel_index_is_position_major() {
    let source = ramp_source(&[(Axis::P, 2), (Axis::C, 3), (Axis::Y, 2), (Axis::X, 2)]);
    let out = export(&source, SelectionRequest::default());
    let out = out.typed::<u16>().unwrap();

    let original = ramp(&[2, 3, 2, 2]);
    let original = original.typed::<u16>().unwrap();
    for p in 0..2 {
        for c in 0..3 {
            assert_eq!(out[[0, p * 3 + c, 1, 1]], original[[p, c, 1, 1]]);
        }
    }
}

// =============================================================================
// Equivalences
// =============================================================================

#[test]
fn test_fixed_index_equals_length_one_range() {
    let source = ramp_source(&[(Axis::T, 4), (Axis::C, 3), (Axis::Y, 4), (Axis::X, 4)]);

    let fixed = export(&source, SelectionRequest::default().with_channel(Selection::single(1)));
    let range = export(&source, SelectionRequest::default().with_channel(Selection::range(1, 1)));
    let list = export(&source, SelectionRequest::default().with_channel(Selection::indices(vec![1])));

    assert_eq!(fixed, range);
    assert_eq!(fixed, list);
}

#[test]
fn test_direct_and_batched_paths_agree() {
    let source = ramp_source(&[(Axis::T, 3), (Axis::C, 2), (Axis::Y, 5), (Axis::X, 5)]);

    // No selection: one direct materialize call
    let direct = export(&source, SelectionRequest::default());
    let direct_calls = source.materialize_calls();
    assert_eq!(direct_calls, 1);

    // Full ranges on both axes: batched over 3 x 2 combinations
    let batched = export(
        &source,
        SelectionRequest::default()
            .with_time(Selection::range(0, 2))
            .with_channel(Selection::range(0, 1)),
    );
    assert_eq!(source.materialize_calls() - direct_calls, 6);

    assert_eq!(direct, batched);
}

#[test]
fn test_upcasting_source_keeps_dtype() {
    let model = hyperstack::AxisModel::from_sizes([(Axis::T, 3), (Axis::Y, 2), (Axis::X, 2)]);
    let source = MemorySource::new("mem://up", model, ramp(&[3, 2, 2]))
        .unwrap()
        .with_upcast_to_f64(true);

    let out = export(&source, SelectionRequest::default().with_time(Selection::indices(vec![2, 0])));
    assert_eq!(out.data_type(), DataType::U16);
    assert_eq!(out.typed::<u16>().unwrap()[[0, 0, 0, 0]], 8);
    assert_eq!(out.typed::<u16>().unwrap()[[1, 0, 0, 0]], 0);
}

// =============================================================================
// Errors and Cancellation
// =============================================================================

#[test]
fn test_out_of_range_strict_and_lenient() {
    let source = ramp_source(&[(Axis::T, 4), (Axis::Y, 2), (Axis::X, 2)]);
    let selections = SelectionRequest::default().with_time(Selection::range(2, 9));

    let progress = Arc::new(RecordingProgress::default());
    let hooks = ExportHooks::new(progress.clone(), CancellationToken::new());
    let err = export_stack(
        &ExportRequest::new("out.tif").with_selections(selections.clone()),
        &source,
        &RecordingWriter::new(),
        &hooks,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        ExportError::Selection(SelectionError::OutOfRange { axis: Axis::T, .. })
    ));
    assert_eq!(progress.failure_count(), 1);
    assert!(progress.finished.lock().unwrap().is_empty());

    let writer = RecordingWriter::new();
    export_stack(
        &ExportRequest::new("out.tif")
            .with_selections(selections)
            .with_bounds_policy(BoundsPolicy::Lenient),
        &source,
        &writer,
        &ExportHooks::default(),
    )
    .unwrap();
    assert_eq!(writer.written().unwrap().array.shape(), &[4, 1, 2, 2]);
}

#[test]
fn test_cancel_mid_batch() {
    let source = ramp_source(&[(Axis::T, 5), (Axis::Y, 2), (Axis::X, 2)]);
    let token = CancellationToken::new();
    let recorder = Arc::new(RecordingProgress::default());
    let sink = Arc::new(CancelAfter {
        token: token.clone(),
        after: 1,
        inner: recorder.clone(),
    });
    let writer = RecordingWriter::new();

    let err = export_stack(
        &ExportRequest::new("out.tif")
            .with_selections(SelectionRequest::default().with_time(Selection::range(0, 4))),
        &source,
        &writer,
        &ExportHooks::new(sink, token),
    )
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(source.materialize_calls(), 1);
    assert_eq!(*recorder.combinations.lock().unwrap(), vec![(1, 5)]);
    assert_eq!(recorder.cancellations.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(writer.calls().is_empty());
}

#[test]
fn test_cancelled_before_start() {
    let source = ramp_source(&[(Axis::T, 2), (Axis::Y, 2), (Axis::X, 2)]);
    let token = CancellationToken::new();
    token.cancel();

    let err = export_stack(
        &ExportRequest::new("out.tif"),
        &source,
        &RecordingWriter::new(),
        &ExportHooks::new(Arc::new(RecordingProgress::default()), token),
    )
    .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(source.materialize_calls(), 0);
}

#[test]
fn test_source_failure_reported_once() {
    let model = hyperstack::AxisModel::from_sizes([(Axis::T, 3), (Axis::Y, 2), (Axis::X, 2)]);
    let source = MemorySource::new("mem://fail", model, ramp(&[3, 2, 2]))
        .unwrap()
        .with_failure_on_call(2);
    let progress = Arc::new(RecordingProgress::default());
    let writer = RecordingWriter::new();

    let err = export_stack(
        &ExportRequest::new("out.tif")
            .with_selections(SelectionRequest::default().with_time(Selection::range(0, 2))),
        &source,
        &writer,
        &ExportHooks::new(progress.clone(), CancellationToken::new()),
    )
    .unwrap_err();

    assert!(matches!(err, ExportError::Extraction(_)));
    assert_eq!(source.materialize_calls(), 2);
    assert_eq!(progress.failure_count(), 1);
    assert!(writer.calls().is_empty());
}

#[test]
fn test_progress_sequence() {
    let source = ramp_source(&[(Axis::T, 2), (Axis::Y, 2), (Axis::X, 2)]);
    let progress = Arc::new(RecordingProgress::default());

    export_stack(
        &ExportRequest::new("out.tif")
            .with_selections(SelectionRequest::default().with_time(Selection::range(0, 1))),
        &source,
        &RecordingWriter::new(),
        &ExportHooks::new(progress.clone(), CancellationToken::new()),
    )
    .unwrap();

    assert_eq!(*progress.percents.lock().unwrap(), vec![10, 20, 40, 60, 80, 90, 100]);
    assert_eq!(*progress.combinations.lock().unwrap(), vec![(1, 2), (2, 2)]);
    assert_eq!(progress.finished.lock().unwrap().len(), 1);
}

// =============================================================================
// Serialization Fallbacks
// =============================================================================

#[test]
fn test_fallback_to_imagej_when_single_timepoint() {
    let source = ramp_source(&[(Axis::C, 3), (Axis::Y, 2), (Axis::X, 2)]);
    let writer = RecordingWriter::failing_on(&["TCYX"]);

    export_stack(&ExportRequest::new("out.tif"), &source, &writer, &ExportHooks::default()).unwrap();

    let written = writer.written().unwrap();
    assert_eq!(written.axes, "CYX");
    assert_eq!(written.array.shape(), &[3, 2, 2]);
}

#[test]
fn test_every_layout_failing() {
    let source = ramp_source(&[(Axis::T, 2), (Axis::C, 2), (Axis::Y, 2), (Axis::X, 2)]);
    let writer = RecordingWriter::failing_on(&["TCYX", "YX"]);
    let progress = Arc::new(RecordingProgress::default());

    let err = export_stack(
        &ExportRequest::new("out.tif"),
        &source,
        &writer,
        &ExportHooks::new(progress.clone(), CancellationToken::new()),
    )
    .unwrap_err();

    match err {
        ExportError::Serialization { attempts } => assert_eq!(attempts.len(), 2),
        other => panic!("expected Serialization, got {:?}", other),
    }
    assert_eq!(progress.failure_count(), 1);
}

// =============================================================================
// Metadata
// =============================================================================

#[test]
fn test_position_channels_are_named() {
    let source = ramp_source(&[(Axis::P, 2), (Axis::C, 2), (Axis::Y, 2), (Axis::X, 2)]);
    let writer = RecordingWriter::new();
    export_stack(&ExportRequest::new("out.tif"), &source, &writer, &ExportHooks::default()).unwrap();

    let written = writer.written().unwrap();
    assert_eq!(written.metadata.channel_names, vec!["0-0", "0-1", "1-0", "1-1"]);
    assert_eq!(written.metadata.description, "Exported from ramp.tif");
}

// =============================================================================
// End to End
// =============================================================================

#[test]
fn test_end_to_end_time_range() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input.tif");
    let output = dir.path().join("output.ome.tif");

    // T=4, C=2, Y=8, X=8 ImageJ hyperstack
    let data = ramp(&[4, 2, 8, 8]);
    TiffStackWriter::new()
        .write(
            &input,
            &data,
            "TCYX",
            &OmeMetadata::default(),
            WriteOptions {
                bigtiff: false,
                ome: false,
            },
        )
        .unwrap();

    let path = export_file(
        &input,
        &output,
        SelectionRequest::default().with_time(Selection::range(1, 2)),
        &ExportHooks::default(),
    )
    .unwrap();
    assert_eq!(path, output);

    let exported = open_source(&output, &SourceOptions::default()).unwrap();
    let order: Vec<Axis> = exported.axes().axes().collect();
    assert_eq!(order, vec![Axis::T, Axis::C, Axis::Y, Axis::X]);
    assert_eq!(exported.axes().shape(), vec![2, 2, 8, 8]);
    assert!(exported.metadata().channel_names.is_empty());

    let pixels = exported.materialize(&Default::default()).unwrap();
    assert_eq!(pixels, data.region(&[1..3, 0..2, 0..8, 0..8]));
}

#[test]
fn test_export_file_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let progress = Arc::new(RecordingProgress::default());
    let err = export_file(
        &dir.path().join("missing.tif"),
        &dir.path().join("out.tif"),
        SelectionRequest::default(),
        &ExportHooks::new(progress.clone(), CancellationToken::new()),
    )
    .unwrap_err();

    assert!(matches!(err, ExportError::Open(_)));
    assert_eq!(progress.failure_count(), 1);
    assert!(!dir.path().join("out.tif").exists());
}
