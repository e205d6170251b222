//! Uncompressed multi-page TIFF/BigTIFF writer.
//!
//! Layout of a written file (always little-endian):
//!
//! ```text
//! header | page 0 pixels | page 1 pixels | ... | IFD 0 (+ description) | IFD 1 | ...
//! ```
//!
//! Every page is one strip. The description, when present, is stored on the
//! first page only. The file is assembled in a temporary file next to the
//! target and renamed into place, so a failed write never leaves a partial
//! output behind.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::array::{axes_to_string, Axis, DenseArray};
use crate::error::{IoError, WriteError};

use super::parser::{VERSION_BIGTIFF, VERSION_TIFF};
use super::tags::{sample_layout, Compression, FieldType, TiffTag};

const PHOTOMETRIC_MIN_IS_BLACK: u16 = 1;
const PLANAR_CONTIGUOUS: u16 = 1;

// =============================================================================
// Tag values
// =============================================================================

#[derive(Debug, Clone)]
enum TagValue {
    Short(u16),
    Long(u32),
    Long8(u64),
    Ascii(Vec<u8>),
}

impl TagValue {
    fn field_type(&self) -> FieldType {
        match self {
            TagValue::Short(_) => FieldType::Short,
            TagValue::Long(_) => FieldType::Long,
            TagValue::Long8(_) => FieldType::Long8,
            TagValue::Ascii(_) => FieldType::Ascii,
        }
    }

    fn count(&self) -> u64 {
        match self {
            TagValue::Ascii(bytes) => bytes.len() as u64,
            _ => 1,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            TagValue::Short(v) => v.to_le_bytes().to_vec(),
            TagValue::Long(v) => v.to_le_bytes().to_vec(),
            TagValue::Long8(v) => v.to_le_bytes().to_vec(),
            TagValue::Ascii(bytes) => bytes.clone(),
        }
    }

    fn ascii(text: &str) -> Self {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        TagValue::Ascii(bytes)
    }

    /// An offset or byte count, sized for the file flavour.
    fn offset(value: u64, bigtiff: bool) -> Self {
        if bigtiff {
            TagValue::Long8(value)
        } else {
            TagValue::Long(value as u32)
        }
    }
}

// =============================================================================
// IFD encoding
// =============================================================================

/// Encode one IFD placed at `offset`, followed by its out-of-line values.
///
/// `entries` must be sorted by tag. The next-IFD field is left zero and
/// patched by the caller.
fn encode_ifd(entries: &[(TiffTag, TagValue)], offset: u64, bigtiff: bool) -> Vec<u8> {
    let (count_size, entry_size, field_size) = if bigtiff { (8, 20, 8) } else { (2, 12, 4) };
    let table_len = count_size + entries.len() * entry_size + field_size;

    let mut table = Vec::with_capacity(table_len);
    let mut overflow = Vec::new();

    if bigtiff {
        table.extend_from_slice(&(entries.len() as u64).to_le_bytes());
    } else {
        table.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    }

    for (tag, value) in entries {
        let field_type = value.field_type();
        let count = value.count();
        let data = value.bytes();

        table.extend_from_slice(&tag.as_u16().to_le_bytes());
        table.extend_from_slice(&(field_type as u16).to_le_bytes());
        if bigtiff {
            table.extend_from_slice(&count.to_le_bytes());
        } else {
            table.extend_from_slice(&(count as u32).to_le_bytes());
        }

        let mut field = vec![0u8; field_size];
        if field_type.fits_inline(count, bigtiff) {
            field[..data.len()].copy_from_slice(&data);
        } else {
            let at = offset + table_len as u64 + overflow.len() as u64;
            if bigtiff {
                field.copy_from_slice(&at.to_le_bytes());
            } else {
                field.copy_from_slice(&(at as u32).to_le_bytes());
            }
            overflow.extend_from_slice(&data);
            if overflow.len() % 2 == 1 {
                overflow.push(0);
            }
        }
        table.extend_from_slice(&field);
    }

    // next IFD offset, patched later
    table.extend(std::iter::repeat(0u8).take(field_size));
    table.extend_from_slice(&overflow);
    table
}

fn patch_next_offset(block: &mut [u8], entry_count: usize, next: u64, bigtiff: bool) {
    if bigtiff {
        let at = 8 + entry_count * 20;
        block[at..at + 8].copy_from_slice(&next.to_le_bytes());
    } else {
        let at = 2 + entry_count * 12;
        block[at..at + 4].copy_from_slice(&(next as u32).to_le_bytes());
    }
}

// =============================================================================
// TiffStackWriter
// =============================================================================

/// Writes a dense array as a stack of uncompressed pages.
///
/// The last two axes must be Y and X; every combination of leading axes
/// becomes one page, in row-major order.
#[derive(Debug, Clone)]
pub struct TiffStackWriter {
    software: String,
}

impl Default for TiffStackWriter {
    fn default() -> Self {
        Self {
            software: format!("hyperstack {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TiffStackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `array` over `axes` to `path`.
    pub fn write_stack(
        &self,
        path: &Path,
        array: &DenseArray,
        axes: &[Axis],
        description: Option<&str>,
        bigtiff: bool,
    ) -> Result<(), WriteError> {
        let shape = array.shape();
        if axes.len() != shape.len() {
            return Err(WriteError::AxesMismatch {
                axes: axes_to_string(axes),
                ndim: shape.len(),
            });
        }
        if shape.len() < 2 || axes[axes.len() - 2..] != [Axis::Y, Axis::X] {
            return Err(WriteError::UnsupportedLayout(format!(
                "axes '{}' do not end in YX",
                axes_to_string(axes)
            )));
        }

        let (height, width) = (shape[shape.len() - 2], shape[shape.len() - 1]);
        if height == 0 || width == 0 {
            return Err(WriteError::UnsupportedLayout(format!(
                "empty plane {}x{}",
                height, width
            )));
        }
        let pages: usize = shape[..shape.len() - 2].iter().product();
        let data_type = array.data_type();
        let page_bytes = (height * width * data_type.size_in_bytes()) as u64;
        let (bits, sample_format) = sample_layout(data_type);

        let header_len: u64 = if bigtiff { 16 } else { 8 };
        let pixels = array.to_le_bytes();
        let mut next_ifd = header_len + pixels.len() as u64;
        next_ifd += next_ifd % 2;
        let first_ifd = next_ifd;

        let mut blocks = Vec::with_capacity(pages);
        for page in 0..pages {
            let strip_offset = header_len + page as u64 * page_bytes;
            let mut entries = vec![
                (TiffTag::ImageWidth, TagValue::Long(width as u32)),
                (TiffTag::ImageLength, TagValue::Long(height as u32)),
                (TiffTag::BitsPerSample, TagValue::Short(bits)),
                (TiffTag::Compression, TagValue::Short(Compression::None as u16)),
                (
                    TiffTag::PhotometricInterpretation,
                    TagValue::Short(PHOTOMETRIC_MIN_IS_BLACK),
                ),
            ];
            if page == 0 {
                if let Some(text) = description {
                    entries.push((TiffTag::ImageDescription, TagValue::ascii(text)));
                }
            }
            entries.extend([
                (TiffTag::StripOffsets, TagValue::offset(strip_offset, bigtiff)),
                (TiffTag::SamplesPerPixel, TagValue::Short(1)),
                (TiffTag::RowsPerStrip, TagValue::Long(height as u32)),
                (TiffTag::StripByteCounts, TagValue::offset(page_bytes, bigtiff)),
                (TiffTag::PlanarConfiguration, TagValue::Short(PLANAR_CONTIGUOUS)),
            ]);
            if page == 0 {
                entries.push((TiffTag::Software, TagValue::ascii(&self.software)));
            }
            entries.push((TiffTag::SampleFormat, TagValue::Short(sample_format)));

            let mut block = encode_ifd(&entries, next_ifd, bigtiff);
            if block.len() % 2 == 1 {
                block.push(0);
            }
            next_ifd += block.len() as u64;
            blocks.push((entries.len(), block));
        }

        let total = next_ifd;
        if !bigtiff && total > u32::MAX as u64 {
            return Err(WriteError::TooLargeForClassicTiff { size: total });
        }

        // Chain the IFDs
        let mut offset = first_ifd;
        let last = blocks.len().saturating_sub(1);
        for (i, (count, block)) in blocks.iter_mut().enumerate() {
            let len = block.len() as u64;
            let next = if i == last { 0 } else { offset + len };
            patch_next_offset(block, *count, next, bigtiff);
            offset += len;
        }

        let mut header = Vec::with_capacity(header_len as usize);
        header.extend_from_slice(b"II");
        if bigtiff {
            header.extend_from_slice(&VERSION_BIGTIFF.to_le_bytes());
            header.extend_from_slice(&8u16.to_le_bytes());
            header.extend_from_slice(&0u16.to_le_bytes());
            header.extend_from_slice(&first_ifd.to_le_bytes());
        } else {
            header.extend_from_slice(&VERSION_TIFF.to_le_bytes());
            header.extend_from_slice(&(first_ifd as u32).to_le_bytes());
        }

        debug!(
            path = %path.display(),
            axes = %axes_to_string(axes),
            pages,
            bigtiff,
            bytes = total,
            "Writing TIFF stack"
        );

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(IoError::from)?;

        let tmp = NamedTempFile::new_in(dir).map_err(IoError::from)?;
        let mut out = BufWriter::new(tmp);
        out.write_all(&header).map_err(IoError::from)?;
        out.write_all(&pixels).map_err(IoError::from)?;
        if (header_len + pixels.len() as u64) % 2 == 1 {
            out.write_all(&[0]).map_err(IoError::from)?;
        }
        for (_, block) in &blocks {
            out.write_all(block).map_err(IoError::from)?;
        }
        let tmp = out
            .into_inner()
            .map_err(|e| IoError::Io(e.error().to_string()))?;
        tmp.as_file().sync_all().map_err(IoError::from)?;
        tmp.persist(path)
            .map_err(|e| IoError::Io(e.error.to_string()))?;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
