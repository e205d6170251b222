//! Block cache effectiveness integration tests.
//!
//! Tests verify:
//! - Opening a stack through the cache issues far fewer reads
//! - Materializing after open is served from cached blocks
//! - Repeated plane reads hit the cache
//! - Tiny, thrashing caches still return correct data

use hyperstack::array::{Axis, IndexSelection};
use hyperstack::io::BlockCache;
use hyperstack::source::LazySource;
use hyperstack::TiffStackSource;

use super::test_utils::{StripTiffBuilder, TrackingReader};

const WIDTH: u32 = 16;
const HEIGHT: u32 = 16;
const PAGES: usize = 8;

fn stack_bytes() -> Vec<u8> {
    let n = (WIDTH * HEIGHT) as usize;
    (0..PAGES)
        .fold(
            StripTiffBuilder::new(WIDTH, HEIGHT).with_rows_per_strip(4),
            |builder, p| builder.add_page((0..n).map(|i| (p * 1000 + i) as u16).collect()),
        )
        .build()
}

// =============================================================================
// Open
// =============================================================================

#[test]
fn test_block_cache_reduces_open_requests() {
    let bytes = stack_bytes();

    let uncached = TrackingReader::new(bytes.clone(), "mem://stack.tif");
    TiffStackSource::open(uncached.clone()).unwrap();
    let direct_requests = uncached.request_count();

    // The whole file fits in one 64KB block
    let tracked = TrackingReader::new(bytes, "mem://stack.tif");
    let cached = BlockCache::new(tracked.clone());
    TiffStackSource::open(cached).unwrap();

    assert_eq!(tracked.request_count(), 1);
    assert!(
        direct_requests > PAGES,
        "expected one read per IFD at least, got {}",
        direct_requests
    );
}

// =============================================================================
// Materialize
// =============================================================================

#[test]
fn test_materialize_after_open_is_cached() {
    let tracked = TrackingReader::new(stack_bytes(), "mem://stack.tif");
    let source = TiffStackSource::open(BlockCache::new(tracked.clone())).unwrap();
    tracked.reset_tracking();

    let whole = source.materialize(&IndexSelection::new()).unwrap();
    assert_eq!(whole.shape(), &[PAGES, HEIGHT as usize, WIDTH as usize]);
    assert_eq!(tracked.request_count(), 0);
}

#[test]
fn test_repeated_plane_reads_hit_cache() {
    let tracked = TrackingReader::new(stack_bytes(), "mem://stack.tif");
    let source =
        TiffStackSource::open(BlockCache::with_capacity(tracked.clone(), 1024, 64)).unwrap();
    let selection = IndexSelection::from([(Axis::Z, 5)]);

    tracked.reset_tracking();
    let first = source.materialize(&selection).unwrap();
    let after_first = tracked.request_count();

    let second = source.materialize(&selection).unwrap();
    assert_eq!(tracked.request_count(), after_first);
    assert_eq!(first, second);
}

#[test]
fn test_thrashing_cache_returns_same_data() {
    let bytes = stack_bytes();
    let direct = TiffStackSource::open(TrackingReader::new(bytes.clone(), "mem://a")).unwrap();
    let cached = TiffStackSource::open(BlockCache::with_capacity(
        TrackingReader::new(bytes, "mem://b"),
        64,
        2,
    ))
    .unwrap();

    let whole = IndexSelection::new();
    assert_eq!(
        direct.materialize(&whole).unwrap(),
        cached.materialize(&whole).unwrap()
    );

    let plane = IndexSelection::from([(Axis::Z, 7)]);
    assert_eq!(
        direct.materialize(&plane).unwrap(),
        cached.materialize(&plane).unwrap()
    );
}
