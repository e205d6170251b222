//! Multi-page TIFF/BigTIFF hyperstacks.
//!
//! Each page is one uncompressed 2-D plane. The order in which pages
//! enumerate the non-spatial axes comes from the first page's description:
//!
//! - OME-XML: `DimensionOrder` per `<Image>`, one image per stage position
//! - ImageJ: pages ordered T, Z, C (slowest first)
//! - none: every page is a Z slice

use itertools::Itertools;
use tracing::{debug, warn};

use super::{Attributes, LazySource, MetadataRepr, PixelSize, SourceMetadata};
use crate::array::{Axis, AxisModel, DataType, DenseArray, IndexSelection};
use crate::error::{SourceError, TiffError};
use crate::format::ome::{
    imagej_page_axes, is_imagej, is_ome_xml, ome_pixel_type, parse_imagej, parse_ome_xml,
};
use crate::format::tiff::{
    data_type_for, read_ifd_chain, Compression, Ifd, TiffHeader, TiffTag, ValueReader,
    SAMPLE_FORMAT_UINT,
};
use crate::io::RangeReader;

// =============================================================================
// Page layout
// =============================================================================

/// Where one page's pixel data lives.
#[derive(Debug, Clone)]
struct PageStrips {
    offsets: Vec<u64>,
    byte_counts: Vec<u64>,
}

/// Geometry shared by every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PageFormat {
    width: usize,
    height: usize,
    data_type: DataType,
}

impl PageFormat {
    fn byte_len(&self) -> usize {
        self.width * self.height * self.data_type.size_in_bytes()
    }
}

fn page_format(ifd: &Ifd, index: usize, header: &TiffHeader) -> Result<PageFormat, TiffError> {
    let bo = header.byte_order;

    if ifd.get_entry_by_tag(TiffTag::TileWidth).is_some()
        || ifd.get_entry_by_tag(TiffTag::TileOffsets).is_some()
    {
        return Err(TiffError::TileOrganization);
    }

    let compression = ifd.inline_value(TiffTag::Compression, bo).unwrap_or(1) as u16;
    match Compression::from_u16(compression) {
        Some(c) if c.is_supported() => {}
        Some(c) => return Err(TiffError::UnsupportedCompression(c.name().to_string())),
        None => {
            return Err(TiffError::UnsupportedCompression(format!(
                "unknown ({})",
                compression
            )))
        }
    }

    let samples = ifd.inline_value(TiffTag::SamplesPerPixel, bo).unwrap_or(1);
    if samples != 1 {
        return Err(TiffError::InvalidTagValue {
            tag: TiffTag::SamplesPerPixel.name(),
            message: format!("page {} has {} samples per pixel, expected 1", index, samples),
        });
    }

    let width = ifd
        .inline_value(TiffTag::ImageWidth, bo)
        .ok_or(TiffError::MissingTag(TiffTag::ImageWidth.name()))? as usize;
    let height = ifd
        .inline_value(TiffTag::ImageLength, bo)
        .ok_or(TiffError::MissingTag(TiffTag::ImageLength.name()))? as usize;
    let bits = ifd.inline_value(TiffTag::BitsPerSample, bo).unwrap_or(1) as u16;
    let format = ifd
        .inline_value(TiffTag::SampleFormat, bo)
        .map_or(SAMPLE_FORMAT_UINT, |v| v as u16);
    let data_type =
        data_type_for(bits, format).ok_or(TiffError::UnsupportedSampleFormat { bits, format })?;

    Ok(PageFormat {
        width,
        height,
        data_type,
    })
}

// =============================================================================
// Axis discovery
// =============================================================================

/// Axes of the page sequence (slowest first) and the metadata to normalize.
struct Layout {
    page_axes: Vec<(Axis, usize)>,
    channel_labels: Vec<Option<String>>,
    metadata: MetadataRepr,
    /// OME pixel type the description declares
    pixel_type: Option<String>,
}

fn layout_from_description(description: Option<&str>, pages: usize) -> Result<Layout, SourceError> {
    match description {
        Some(text) if is_ome_xml(text) => layout_from_ome(text),
        Some(text) if is_imagej(text) => {
            let pairs = parse_imagej(text);
            Ok(Layout {
                page_axes: imagej_page_axes(&pairs),
                channel_labels: Vec::new(),
                metadata: MetadataRepr::Pairs(pairs),
                pixel_type: None,
            })
        }
        _ => Ok(Layout {
            page_axes: if pages > 1 {
                vec![(Axis::Z, pages)]
            } else {
                Vec::new()
            },
            channel_labels: Vec::new(),
            metadata: MetadataRepr::Attributes(Attributes::default()),
            pixel_type: None,
        }),
    }
}

fn layout_from_ome(xml: &str) -> Result<Layout, SourceError> {
    let images = parse_ome_xml(xml)?;
    let first = images.first().ok_or_else(|| SourceError::UnsupportedLayout {
        reason: "OME-XML without Image elements".to_string(),
    })?;

    if let Some(other) = images.iter().find(|img| {
        img.page_axes() != first.page_axes()
            || (img.size_x, img.size_y) != (first.size_x, first.size_y)
    }) {
        return Err(SourceError::UnsupportedLayout {
            reason: format!(
                "stage positions differ in layout: {} vs {}",
                first.dimension_order, other.dimension_order
            ),
        });
    }

    let ordered: usize = first.page_axes().iter().map(|(_, n)| n).product();
    if ordered != first.plane_count() {
        return Err(SourceError::UnsupportedLayout {
            reason: format!(
                "DimensionOrder '{}' does not order all {} planes",
                first.dimension_order,
                first.plane_count()
            ),
        });
    }

    let mut page_axes = Vec::new();
    if images.len() > 1 {
        page_axes.push((Axis::P, images.len()));
    }
    page_axes.extend(first.page_axes());

    // Unnamed channels only get placeholder names when some channel is named
    let channel_names: Vec<String> = if first.channel_names.iter().any(Option::is_some) {
        first
            .channel_names
            .iter()
            .enumerate()
            .map(|(i, name)| name.clone().unwrap_or_else(|| format!("Channel {}", i)))
            .collect()
    } else {
        Vec::new()
    };

    let pixel_size = match (first.physical_size_x, first.physical_size_y) {
        (Some(x), Some(y)) => Some(PixelSize {
            x,
            y,
            z: first.physical_size_z,
        }),
        _ => None,
    };

    Ok(Layout {
        page_axes,
        channel_labels: first.channel_names.clone(),
        metadata: MetadataRepr::Attributes(Attributes {
            pixel_size_um: pixel_size,
            channel_names,
            period_ms: first.time_increment_ms,
        }),
        pixel_type: first.pixel_type.clone(),
    })
}

// =============================================================================
// TiffStackSource
// =============================================================================

/// A lazy source over an uncompressed multi-page TIFF or BigTIFF.
///
/// Opening reads only the header, the IFD chain and the first page's
/// description. Pixel data is fetched page by page on
/// [`materialize`](LazySource::materialize).
pub struct TiffStackSource<R: RangeReader> {
    reader: R,
    header: TiffHeader,
    axes: AxisModel,
    /// Every page axis, slowest first, including those of extent 1
    page_axes: Vec<(Axis, usize)>,
    format: PageFormat,
    pages: Vec<PageStrips>,
    metadata: SourceMetadata,
}

impl<R: RangeReader> TiffStackSource<R> {
    pub fn open(reader: R) -> Result<Self, SourceError> {
        let header = TiffHeader::read(&reader)?;
        let ifds = read_ifd_chain(&reader, &header)?;
        let first = ifds.first().ok_or_else(|| SourceError::UnsupportedLayout {
            reason: "file has no pages".to_string(),
        })?;

        let values = ValueReader::new(&reader, &header);
        let description = first
            .get_entry_by_tag(TiffTag::ImageDescription)
            .map(|entry| values.read_string(entry))
            .transpose()?;

        let layout = layout_from_description(description.as_deref(), ifds.len())?;
        let expected: usize = layout.page_axes.iter().map(|(_, n)| n).product();
        if ifds.len() < expected {
            return Err(SourceError::UnsupportedLayout {
                reason: format!(
                    "description implies {} pages but the file has {}",
                    expected,
                    ifds.len()
                ),
            });
        }
        if ifds.len() > expected {
            warn!(
                identifier = reader.identifier(),
                expected,
                found = ifds.len(),
                "Ignoring pages beyond the described stack"
            );
        }

        let format = page_format(first, 0, &header)?;
        if let Some(declared) = &layout.pixel_type {
            if declared.as_str() != ome_pixel_type(format.data_type) {
                return Err(SourceError::UnsupportedLayout {
                    reason: format!(
                        "description declares {} pixels but pages hold {}",
                        declared, format.data_type
                    ),
                });
            }
        }
        let mut pages = Vec::with_capacity(expected);
        for (index, ifd) in ifds.iter().take(expected).enumerate() {
            let this = page_format(ifd, index, &header)?;
            if this != format {
                return Err(SourceError::UnsupportedLayout {
                    reason: format!(
                        "page {} is {}x{} {} but page 0 is {}x{} {}",
                        index,
                        this.width,
                        this.height,
                        this.data_type,
                        format.width,
                        format.height,
                        format.data_type
                    ),
                });
            }
            let offsets = values.read_u64_array(ifd.require(TiffTag::StripOffsets)?)?;
            let byte_counts = values.read_u64_array(ifd.require(TiffTag::StripByteCounts)?)?;
            if offsets.len() != byte_counts.len() {
                return Err(TiffError::InvalidTagValue {
                    tag: TiffTag::StripByteCounts.name(),
                    message: format!(
                        "page {} has {} strip offsets and {} byte counts",
                        index,
                        offsets.len(),
                        byte_counts.len()
                    ),
                }
                .into());
            }
            let stored: u64 = byte_counts.iter().sum();
            if stored < format.byte_len() as u64 {
                return Err(TiffError::InvalidTagValue {
                    tag: TiffTag::StripByteCounts.name(),
                    message: format!(
                        "page {} stores {} bytes, expected {}",
                        index,
                        stored,
                        format.byte_len()
                    ),
                }
                .into());
            }
            pages.push(PageStrips {
                offsets,
                byte_counts,
            });
        }

        let axes = AxisModel::from_sizes(
            layout
                .page_axes
                .iter()
                .copied()
                .filter(|(_, n)| *n > 1)
                .chain([(Axis::Y, format.height), (Axis::X, format.width)]),
        )
        .with_labels(Axis::C, layout.channel_labels);
        let metadata = SourceMetadata::from_repr(layout.metadata)?;

        debug!(
            identifier = reader.identifier(),
            axes = %axes.axes().map(|a| a.as_char()).collect::<String>(),
            shape = ?axes.shape(),
            data_type = %format.data_type,
            bigtiff = header.is_bigtiff,
            "Opened TIFF stack"
        );

        Ok(Self {
            reader,
            header,
            axes,
            page_axes: layout.page_axes,
            format,
            pages,
            metadata,
        })
    }

    /// Page holding the plane at the given index per page axis.
    fn page_index(&self, indices: &[(Axis, usize)]) -> usize {
        let mut page = 0;
        for (axis, size) in &self.page_axes {
            let index = indices
                .iter()
                .find_map(|(a, i)| (a == axis).then_some(*i))
                .unwrap_or(0);
            page = page * size + index;
        }
        page
    }

    fn read_page(&self, page: usize, out: &mut Vec<u8>) -> Result<(), SourceError> {
        let strips = self
            .pages
            .get(page)
            .ok_or_else(|| SourceError::UnsupportedLayout {
                reason: format!("page {} is outside the {}-page stack", page, self.pages.len()),
            })?;
        let want = self.format.byte_len();
        let mut remaining = want;
        for (&offset, &count) in strips.offsets.iter().zip(&strips.byte_counts) {
            if remaining == 0 {
                break;
            }
            let len = (count as usize).min(remaining);
            let bytes = self.reader.read_exact_at(offset, len)?;
            out.extend_from_slice(&bytes);
            remaining -= len;
        }
        Ok(())
    }
}

impl<R: RangeReader> LazySource for TiffStackSource<R> {
    fn identifier(&self) -> &str {
        self.reader.identifier()
    }

    fn axes(&self) -> &AxisModel {
        &self.axes
    }

    fn data_type(&self) -> DataType {
        self.format.data_type
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }

    fn materialize(&self, selection: &IndexSelection) -> Result<DenseArray, SourceError> {
        let mut ranges: Vec<(Axis, Vec<usize>)> = Vec::new();
        let mut shape = Vec::with_capacity(self.axes.shape().len());

        for (axis, info) in self.axes.iter() {
            if axis.is_spatial() {
                shape.push(info.size);
                continue;
            }
            match selection.get(&axis) {
                Some(&index) if index >= info.size => {
                    return Err(SourceError::IndexOutOfBounds {
                        axis,
                        index,
                        size: info.size,
                    })
                }
                Some(&index) => {
                    ranges.push((axis, vec![index]));
                    shape.push(1);
                }
                None => {
                    ranges.push((axis, (0..info.size).collect()));
                    shape.push(info.size);
                }
            }
        }

        let combinations: Vec<Vec<usize>> = if ranges.is_empty() {
            vec![Vec::new()]
        } else {
            ranges
                .iter()
                .map(|(_, list)| list.iter().copied())
                .multi_cartesian_product()
                .collect()
        };

        let mut bytes = Vec::with_capacity(combinations.len() * self.format.byte_len());
        for combination in &combinations {
            let indices: Vec<(Axis, usize)> = ranges
                .iter()
                .map(|(axis, _)| *axis)
                .zip(combination.iter().copied())
                .collect();
            let page = self.page_index(&indices);
            self.read_page(page, &mut bytes)?;
        }

        debug!(
            identifier = self.identifier(),
            pages = combinations.len(),
            shape = ?shape,
            "Materialized selection"
        );

        DenseArray::from_raw_bytes(
            self.format.data_type,
            &shape,
            &bytes,
            self.header.byte_order.is_little_endian(),
        )
        .map_err(|e| SourceError::UnsupportedLayout {
            reason: format!("page data does not fill shape {:?}: {}", shape, e),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
