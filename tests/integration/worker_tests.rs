//! Background export worker integration tests.
//!
//! Tests verify:
//! - Events arrive in order and end with Finished
//! - Cancellation is reported as Cancelled, not Failed
//! - Open failures come back as events and from join

use std::path::PathBuf;

use hyperstack::array::{Axis, Selection, SelectionRequest};
use hyperstack::error::ExportError;
use hyperstack::export::{ExportEvent, ExportRequest, ExportWorker};
use hyperstack::source::SourceOptions;
use hyperstack::TiffStackWriter;

use super::test_utils::{ramp_source, RecordingWriter};

async fn drain(handle: &mut hyperstack::export::ExportHandle) -> Vec<ExportEvent> {
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_worker_reports_progress_then_finished() {
    let source = ramp_source(&[(Axis::T, 3), (Axis::C, 2), (Axis::Y, 4), (Axis::X, 4)]);
    let request = ExportRequest::new("out.ome.tif")
        .with_selections(SelectionRequest::default().with_time(Selection::range(0, 2)));

    let mut handle =
        ExportWorker::new(request).spawn(Box::new(source), Box::new(RecordingWriter::new()));
    let events = drain(&mut handle).await;

    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            ExportEvent::Progress(p) => Some(*p),
            _ => None,
        })
        .collect();
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));

    let combinations = events
        .iter()
        .filter(|e| matches!(e, ExportEvent::Combination { total: 3, .. }))
        .count();
    assert_eq!(combinations, 3);

    match events.last() {
        Some(ExportEvent::Finished(path)) => assert_eq!(path, &PathBuf::from("out.ome.tif")),
        other => panic!("expected Finished, got {:?}", other),
    }
    assert_eq!(handle.join().await.unwrap(), PathBuf::from("out.ome.tif"));
}

#[tokio::test]
async fn test_worker_cancelled_before_start() {
    let source = ramp_source(&[(Axis::T, 3), (Axis::Y, 2), (Axis::X, 2)]);
    let writer = RecordingWriter::new();
    let worker = ExportWorker::new(ExportRequest::new("out.tif"));
    worker.cancellation_token().cancel();

    let mut handle = worker.spawn(Box::new(source), Box::new(writer));
    let events = drain(&mut handle).await;

    assert!(matches!(events.as_slice(), [ExportEvent::Cancelled]));
    assert!(handle.join().await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_worker_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let request = ExportRequest::new(dir.path().join("out.ome.tif"));

    let mut handle = ExportWorker::new(request)
        .spawn_file(dir.path().join("missing.tif"), SourceOptions::default());
    let events = drain(&mut handle).await;

    assert!(matches!(
        events.as_slice(),
        [ExportEvent::Failed(ExportError::Open(_))]
    ));
    assert!(matches!(handle.join().await, Err(ExportError::Open(_))));
    assert!(!dir.path().join("out.ome.tif").exists());
}

#[tokio::test]
async fn test_worker_writes_real_file() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.ome.tif");
    let source = ramp_source(&[(Axis::P, 2), (Axis::C, 2), (Axis::Y, 4), (Axis::X, 4)]);

    let mut handle = ExportWorker::new(ExportRequest::new(&output))
        .spawn(Box::new(source), Box::new(TiffStackWriter::new()));
    let events = drain(&mut handle).await;

    assert!(matches!(events.last(), Some(ExportEvent::Finished(_))));
    assert_eq!(handle.join().await.unwrap(), output);
    assert!(output.exists());
}
