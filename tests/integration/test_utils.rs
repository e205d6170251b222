//! Test utilities for integration tests.
//!
//! Synthetic sources, recording writers and progress sinks, a read-tracking
//! range reader, and a builder for hand-made strip TIFF files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;

use hyperstack::array::{Axis, AxisModel, DenseArray};
use hyperstack::error::{ExportError, IoError, WriteError};
use hyperstack::export::{CancellationToken, ContainerWriter, ProgressSink, WriteOptions};
use hyperstack::format::OmeMetadata;
use hyperstack::io::RangeReader;
use hyperstack::source::MemorySource;

// =============================================================================
// Synthetic Sources
// =============================================================================

/// A u16 array whose elements count up from 0 in row-major order.
pub fn ramp(shape: &[usize]) -> DenseArray {
    let n: usize = shape.iter().product();
    DenseArray::from_vec(shape, (0..n).map(|v| v as u16).collect()).unwrap()
}

/// A memory source over `axes` with ramp data.
pub fn ramp_source(axes: &[(Axis, usize)]) -> MemorySource {
    let model = AxisModel::from_sizes(axes.iter().copied());
    let data = ramp(&model.shape());
    MemorySource::new("mem://ramp.tif", model, data).unwrap()
}

// =============================================================================
// Writers
// =============================================================================

/// One call to a [`RecordingWriter`].
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub path: PathBuf,
    pub array: DenseArray,
    pub axes: String,
    pub metadata: OmeMetadata,
    pub options: WriteOptions,
}

/// Records every write and fails the ones whose axes are listed.
#[derive(Default)]
pub struct RecordingWriter {
    fail_axes: Vec<String>,
    calls: Mutex<Vec<WriteCall>>,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(axes: &[&str]) -> Self {
        Self {
            fail_axes: axes.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The last successful write.
    pub fn written(&self) -> Option<WriteCall> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| !self.fail_axes.contains(&c.axes))
    }
}

impl ContainerWriter for RecordingWriter {
    fn write(
        &self,
        path: &Path,
        array: &DenseArray,
        axes: &str,
        metadata: &OmeMetadata,
        options: WriteOptions,
    ) -> Result<(), WriteError> {
        self.calls.lock().unwrap().push(WriteCall {
            path: path.to_path_buf(),
            array: array.clone(),
            axes: axes.to_string(),
            metadata: metadata.clone(),
            options,
        });
        if self.fail_axes.iter().any(|a| a == axes) {
            return Err(WriteError::UnsupportedLayout(format!("scripted failure for {}", axes)));
        }
        Ok(())
    }
}

// =============================================================================
// Progress Sinks
// =============================================================================

/// Records every hook call.
#[derive(Default)]
pub struct RecordingProgress {
    pub percents: Mutex<Vec<u8>>,
    pub combinations: Mutex<Vec<(usize, usize)>>,
    pub finished: Mutex<Vec<PathBuf>>,
    pub failures: Mutex<Vec<String>>,
    pub cancellations: AtomicUsize,
}

impl RecordingProgress {
    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len() + self.cancellations.load(Ordering::SeqCst)
    }
}

impl ProgressSink for RecordingProgress {
    fn progress(&self, percent: u8) {
        self.percents.lock().unwrap().push(percent);
    }

    fn combination(&self, done: usize, total: usize) {
        self.combinations.lock().unwrap().push((done, total));
    }

    fn finished(&self, path: &Path) {
        self.finished.lock().unwrap().push(path.to_path_buf());
    }

    fn failed(&self, error: &ExportError) {
        if error.is_cancelled() {
            self.cancellations.fetch_add(1, Ordering::SeqCst);
        } else {
            self.failures.lock().unwrap().push(error.to_string());
        }
    }
}

/// Cancels a token once `after` combinations have finished.
pub struct CancelAfter {
    pub token: CancellationToken,
    pub after: usize,
    pub inner: Arc<RecordingProgress>,
}

impl ProgressSink for CancelAfter {
    fn progress(&self, percent: u8) {
        self.inner.progress(percent);
    }

    fn combination(&self, done: usize, total: usize) {
        self.inner.combination(done, total);
        if done >= self.after {
            self.token.cancel();
        }
    }

    fn finished(&self, path: &Path) {
        self.inner.finished(path);
    }

    fn failed(&self, error: &ExportError) {
        self.inner.failed(error);
    }
}

// =============================================================================
// Range Reader with Request Tracking
// =============================================================================

/// An in-memory range reader that counts read requests.
#[derive(Clone)]
pub struct TrackingReader {
    data: Bytes,
    identifier: String,
    requests: Arc<Mutex<Vec<(u64, usize)>>>,
}

impl TrackingReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn reset_tracking(&self) {
        self.requests.lock().unwrap().clear();
    }
}

impl RangeReader for TrackingReader {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.requests.lock().unwrap().push((offset, len));

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Strip TIFF Builder
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

/// Builds multi-page u16 strip TIFFs with control over byte order,
/// BigTIFF, strips per page and extra tags.
pub struct StripTiffBuilder {
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    width: u32,
    height: u32,
    rows_per_strip: u32,
    description: Option<String>,
    compression: u16,
    tiled: bool,
    pages: Vec<Vec<u16>>,
}

impl StripTiffBuilder {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            width,
            height,
            rows_per_strip: height,
            description: None,
            compression: 1,
            tiled: false,
            pages: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, is_bigtiff: bool) -> Self {
        self.is_bigtiff = is_bigtiff;
        self
    }

    pub fn with_rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = rows.max(1);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_compression(mut self, compression: u16) -> Self {
        self.compression = compression;
        self
    }

    /// Add TileWidth/TileLength tags to every page.
    pub fn tiled(mut self) -> Self {
        self.tiled = true;
        self
    }

    pub fn add_page(mut self, pixels: Vec<u16>) -> Self {
        assert_eq!(pixels.len(), (self.width * self.height) as usize);
        self.pages.push(pixels);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header_size = if self.is_bigtiff { 16 } else { 8 };
        let mut data = Vec::new();

        match self.byte_order {
            ByteOrderType::LittleEndian => data.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => data.extend_from_slice(b"MM"),
        }
        if self.is_bigtiff {
            self.write_u16(&mut data, 43);
            self.write_u16(&mut data, 8);
            self.write_u16(&mut data, 0);
            self.write_u64(&mut data, 0);
        } else {
            self.write_u16(&mut data, 42);
            self.write_u32(&mut data, 0);
        }
        assert_eq!(data.len(), header_size);

        // Pixel data, one run of strips per page
        let row_bytes = self.width as usize * 2;
        let mut strips: Vec<Vec<(u64, u64)>> = Vec::new();
        for page in &self.pages {
            let mut page_strips = Vec::new();
            for rows in page.chunks(self.width as usize * self.rows_per_strip as usize) {
                let offset = data.len() as u64;
                for &v in rows {
                    self.write_u16(&mut data, v);
                }
                page_strips.push((offset, (rows.len() / self.width as usize * row_bytes) as u64));
            }
            strips.push(page_strips);
        }

        // IFDs, each followed by its out-of-line arrays and description
        let mut ifd_offsets = Vec::new();
        let mut next_fields = Vec::new();
        for (index, page_strips) in strips.iter().enumerate() {
            if data.len() % 2 == 1 {
                data.push(0);
            }
            ifd_offsets.push(data.len() as u64);

            let mut entries: Vec<(u16, u16, u64, Vec<u8>)> = vec![
                (256, 4, 1, self.u32_bytes(self.width)),
                (257, 4, 1, self.u32_bytes(self.height)),
                (258, 3, 1, self.u16_bytes(16)),
                (259, 3, 1, self.u16_bytes(self.compression)),
                (262, 3, 1, self.u16_bytes(1)),
            ];
            if index == 0 {
                if let Some(desc) = &self.description {
                    let mut bytes = desc.as_bytes().to_vec();
                    bytes.push(0);
                    entries.push((270, 2, bytes.len() as u64, bytes));
                }
            }
            let offsets: Vec<u8> = page_strips
                .iter()
                .flat_map(|(o, _)| self.u32_bytes(*o as u32))
                .collect();
            let counts: Vec<u8> = page_strips
                .iter()
                .flat_map(|(_, c)| self.u32_bytes(*c as u32))
                .collect();
            entries.push((273, 4, page_strips.len() as u64, offsets));
            entries.push((277, 3, 1, self.u16_bytes(1)));
            entries.push((278, 4, 1, self.u32_bytes(self.rows_per_strip)));
            entries.push((279, 4, page_strips.len() as u64, counts));
            if self.tiled {
                entries.push((322, 4, 1, self.u32_bytes(self.width)));
                entries.push((323, 4, 1, self.u32_bytes(self.height)));
            }

            let inline_size = if self.is_bigtiff { 8 } else { 4 };
            let entry_size = if self.is_bigtiff { 20 } else { 12 };
            let count_size = if self.is_bigtiff { 8 } else { 2 };
            let ifd_start = data.len() as u64;
            let table_len = count_size + entries.len() * entry_size + inline_size;
            let mut overflow = Vec::new();

            if self.is_bigtiff {
                self.write_u64(&mut data, entries.len() as u64);
            } else {
                self.write_u16(&mut data, entries.len() as u16);
            }
            for (tag, field_type, count, bytes) in &entries {
                self.write_u16(&mut data, *tag);
                self.write_u16(&mut data, *field_type);
                if self.is_bigtiff {
                    self.write_u64(&mut data, *count);
                } else {
                    self.write_u32(&mut data, *count as u32);
                }
                if bytes.len() <= inline_size {
                    let mut field = bytes.clone();
                    field.resize(inline_size, 0);
                    data.extend_from_slice(&field);
                } else {
                    let at = ifd_start + table_len as u64 + overflow.len() as u64;
                    if self.is_bigtiff {
                        self.write_u64(&mut data, at);
                    } else {
                        self.write_u32(&mut data, at as u32);
                    }
                    overflow.extend_from_slice(bytes);
                    if overflow.len() % 2 == 1 {
                        overflow.push(0);
                    }
                }
            }
            next_fields.push(data.len());
            data.extend(std::iter::repeat(0u8).take(inline_size));
            data.extend_from_slice(&overflow);
        }

        // Chain: header -> IFD 0 -> IFD 1 -> ... -> 0
        let first = ifd_offsets.first().copied().unwrap_or(0);
        let header_field = if self.is_bigtiff { 8 } else { 4 };
        self.patch(&mut data, header_field, first);
        for (i, &field) in next_fields.iter().enumerate() {
            let next = ifd_offsets.get(i + 1).copied().unwrap_or(0);
            self.patch(&mut data, field, next);
        }

        data
    }

    fn patch(&self, data: &mut [u8], at: usize, value: u64) {
        let bytes = if self.is_bigtiff {
            match self.byte_order {
                ByteOrderType::LittleEndian => value.to_le_bytes().to_vec(),
                ByteOrderType::BigEndian => value.to_be_bytes().to_vec(),
            }
        } else {
            self.u32_bytes(value as u32)
        };
        data[at..at + bytes.len()].copy_from_slice(&bytes);
    }

    fn u16_bytes(&self, value: u16) -> Vec<u8> {
        match self.byte_order {
            ByteOrderType::LittleEndian => value.to_le_bytes().to_vec(),
            ByteOrderType::BigEndian => value.to_be_bytes().to_vec(),
        }
    }

    fn u32_bytes(&self, value: u32) -> Vec<u8> {
        match self.byte_order {
            ByteOrderType::LittleEndian => value.to_le_bytes().to_vec(),
            ByteOrderType::BigEndian => value.to_be_bytes().to_vec(),
        }
    }

    fn write_u16(&self, data: &mut Vec<u8>, value: u16) {
        data.extend(self.u16_bytes(value));
    }

    fn write_u32(&self, data: &mut Vec<u8>, value: u32) {
        data.extend(self.u32_bytes(value));
    }

    fn write_u64(&self, data: &mut Vec<u8>, value: u64) {
        match self.byte_order {
            ByteOrderType::LittleEndian => data.extend(&value.to_le_bytes()),
            ByteOrderType::BigEndian => data.extend(&value.to_be_bytes()),
        }
    }
}

/// Check for TIFF magic bytes (II*\0 or MM\0*).
pub fn is_tiff_magic(data: &[u8]) -> bool {
    data.len() >= 4 && (data[0..4] == [0x49, 0x49, 0x2A, 0x00] || data[0..4] == [0x4D, 0x4D, 0x00, 0x2A])
}

/// Check for little-endian BigTIFF magic bytes.
pub fn is_bigtiff_magic(data: &[u8]) -> bool {
    data.len() >= 4 && data[0..4] == [0x49, 0x49, 0x2B, 0x00]
}
