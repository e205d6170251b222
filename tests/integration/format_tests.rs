//! Format-specific integration tests.
//!
//! Tests verify:
//! - Little-endian and big-endian stacks read back identically
//! - BigTIFF stacks and multi-strip pages are parsed correctly
//! - Compressed and tiled pages are rejected with a clear error
//! - ImageJ descriptions define the page order
//! - The writer emits classic TIFF or BigTIFF headers on request

use hyperstack::array::{Axis, DenseArray, IndexSelection};
use hyperstack::error::{SourceError, TiffError};
use hyperstack::io::BytesRangeReader;
use hyperstack::source::LazySource;
use hyperstack::{TiffStackSource, TiffStackWriter};

use super::test_utils::{
    is_bigtiff_magic, is_tiff_magic, ramp, ByteOrderType, StripTiffBuilder,
};

const WIDTH: u32 = 4;
const HEIGHT: u32 = 3;
const PAGES: usize = 3;

fn page(index: usize) -> Vec<u16> {
    let n = (WIDTH * HEIGHT) as usize;
    (0..n).map(|i| (index * 100 + i) as u16).collect()
}

fn stack(builder: StripTiffBuilder, pages: usize) -> Vec<u8> {
    (0..pages)
        .fold(builder, |builder, i| builder.add_page(page(i)))
        .build()
}

fn open(bytes: Vec<u8>) -> Result<TiffStackSource<BytesRangeReader>, SourceError> {
    TiffStackSource::open(BytesRangeReader::new(bytes, "mem://stack.tif"))
}

fn read_all(bytes: Vec<u8>) -> DenseArray {
    open(bytes)
        .unwrap()
        .materialize(&IndexSelection::new())
        .unwrap()
}

fn expected() -> DenseArray {
    let data: Vec<u16> = (0..PAGES).flat_map(page).collect();
    DenseArray::from_vec(&[PAGES, HEIGHT as usize, WIDTH as usize], data).unwrap()
}

// =============================================================================
// TIFF Byte Order Tests
// =============================================================================

#[test]
fn test_little_endian_stack() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT), PAGES);
    assert!(is_tiff_magic(&bytes));
    assert_eq!(read_all(bytes), expected());
}

#[test]
fn test_big_endian_stack() {
    let bytes = stack(
        StripTiffBuilder::new(WIDTH, HEIGHT).with_byte_order(ByteOrderType::BigEndian),
        PAGES,
    );
    assert_eq!(&bytes[0..2], b"MM");
    assert_eq!(read_all(bytes), expected());
}

// =============================================================================
// BigTIFF and Strip Layout Tests
// =============================================================================

#[test]
fn test_bigtiff_stack() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT).with_bigtiff(true), PAGES);
    assert!(is_bigtiff_magic(&bytes));
    assert_eq!(read_all(bytes), expected());
}

#[test]
fn test_big_endian_bigtiff_stack() {
    let bytes = stack(
        StripTiffBuilder::new(WIDTH, HEIGHT)
            .with_bigtiff(true)
            .with_byte_order(ByteOrderType::BigEndian),
        PAGES,
    );
    assert_eq!(read_all(bytes), expected());
}

#[test]
fn test_one_row_per_strip() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT).with_rows_per_strip(1), PAGES);
    assert_eq!(read_all(bytes), expected());
}

#[test]
fn test_uneven_last_strip() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT).with_rows_per_strip(2), PAGES);
    assert_eq!(read_all(bytes), expected());
}

#[test]
fn test_single_page_has_no_z() {
    let source = open(stack(StripTiffBuilder::new(WIDTH, HEIGHT), 1)).unwrap();
    let axes: Vec<Axis> = source.axes().axes().collect();
    assert_eq!(axes, vec![Axis::Y, Axis::X]);
}

// =============================================================================
// Unsupported Pages
// =============================================================================

#[test]
fn test_lzw_compression_rejected() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT).with_compression(5), PAGES);
    match open(bytes) {
        Err(SourceError::Tiff(TiffError::UnsupportedCompression(name))) => {
            assert_eq!(name, "LZW")
        }
        other => panic!("expected UnsupportedCompression, got {:?}", other.err()),
    }
}

#[test]
fn test_unknown_compression_rejected() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT).with_compression(999), 1);
    assert!(matches!(
        open(bytes),
        Err(SourceError::Tiff(TiffError::UnsupportedCompression(_)))
    ));
}

#[test]
fn test_tiled_pages_rejected() {
    let bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT).tiled(), PAGES);
    assert!(matches!(
        open(bytes),
        Err(SourceError::Tiff(TiffError::TileOrganization))
    ));
}

#[test]
fn test_truncated_file_rejected() {
    let mut bytes = stack(StripTiffBuilder::new(WIDTH, HEIGHT), PAGES);
    bytes.truncate(6);
    assert!(open(bytes).is_err());
}

// =============================================================================
// ImageJ Page Order
// =============================================================================

#[test]
fn test_imagej_hyperstack_page_order() {
    // 3 frames x 2 channels: pages run t0c0, t0c1, t1c0, ...
    let description = "ImageJ=1.11a\nimages=6\nchannels=2\nframes=3\nhyperstack=true\n";
    let bytes = stack(
        StripTiffBuilder::new(WIDTH, HEIGHT).with_description(description),
        6,
    );
    let source = open(bytes).unwrap();

    let axes: Vec<Axis> = source.axes().axes().collect();
    assert_eq!(axes, vec![Axis::T, Axis::C, Axis::Y, Axis::X]);
    assert_eq!(source.axes().shape(), vec![3, 2, 3, 4]);

    let selection = IndexSelection::from([(Axis::T, 1), (Axis::C, 0)]);
    let chunk = source.materialize(&selection).unwrap();
    let expected =
        DenseArray::from_vec(&[1, 1, HEIGHT as usize, WIDTH as usize], page(2)).unwrap();
    assert_eq!(chunk, expected);
}

#[test]
fn test_imagej_big_endian() {
    let description = "ImageJ=1.11a\nimages=2\nslices=2\n";
    let bytes = stack(
        StripTiffBuilder::new(WIDTH, HEIGHT)
            .with_byte_order(ByteOrderType::BigEndian)
            .with_description(description),
        2,
    );
    let source = open(bytes).unwrap();
    assert_eq!(source.axes().size(Axis::Z), Some(2));
}

// =============================================================================
// Writer Output
// =============================================================================

#[test]
fn test_writer_header_magic() {
    let dir = tempfile::tempdir().unwrap();
    let array = ramp(&[2, 3, 4]);
    let axes = [Axis::Z, Axis::Y, Axis::X];

    let classic = dir.path().join("classic.tif");
    TiffStackWriter::new()
        .write_stack(&classic, &array, &axes, None, false)
        .unwrap();
    let bytes = std::fs::read(&classic).unwrap();
    assert!(is_tiff_magic(&bytes));
    assert!(!is_bigtiff_magic(&bytes));

    let big = dir.path().join("big.tif");
    TiffStackWriter::new()
        .write_stack(&big, &array, &axes, None, true)
        .unwrap();
    let bytes = std::fs::read(&big).unwrap();
    assert!(is_bigtiff_magic(&bytes));

    assert_eq!(read_all(bytes), array);
}
