//! Stack descriptions stored in the first page's ImageDescription tag.
//!
//! Two dialects are supported:
//!
//! - **OME-XML**: an `<OME>` document with one `<Image>` per stage position,
//!   each carrying `<Pixels>` sizes, a `DimensionOrder`, physical sizes and
//!   channel names.
//! - **ImageJ**: `key=value` lines (`images`, `channels`, `slices`, `frames`,
//!   `spacing`, `finterval`, ...).

use std::fmt::Write as _;

use roxmltree::{Document, Node};

use crate::array::{Axis, DataType};
use crate::error::SourceError;

const OME_NAMESPACE: &str = "http://www.openmicroscopy.org/Schemas/OME/2016-06";

// =============================================================================
// OmeMetadata
// =============================================================================

/// Metadata written alongside an exported stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmeMetadata {
    pub description: String,
    /// Micrometers
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    /// Names of the (merged) channel axis
    pub channel_names: Vec<String>,
    /// Milliseconds
    pub time_increment_ms: Option<f64>,
}

// =============================================================================
// OME-XML
// =============================================================================

/// One `<Image>` element of an OME document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OmeImage {
    pub dimension_order: String,
    pub size_x: usize,
    pub size_y: usize,
    pub size_c: usize,
    pub size_z: usize,
    pub size_t: usize,
    pub pixel_type: Option<String>,
    pub channel_names: Vec<Option<String>>,
    /// Micrometers
    pub physical_size_x: Option<f64>,
    pub physical_size_y: Option<f64>,
    pub physical_size_z: Option<f64>,
    /// Milliseconds
    pub time_increment_ms: Option<f64>,
}

impl OmeImage {
    /// Non-spatial axes from slowest to fastest varying page index.
    ///
    /// `DimensionOrder` lists axes fastest first, starting with X and Y.
    pub fn page_axes(&self) -> Vec<(Axis, usize)> {
        self.dimension_order
            .chars()
            .rev()
            .filter_map(Axis::from_char)
            .filter(|a| matches!(a, Axis::T | Axis::C | Axis::Z))
            .map(|a| {
                let size = match a {
                    Axis::T => self.size_t,
                    Axis::C => self.size_c,
                    _ => self.size_z,
                };
                (a, size)
            })
            .collect()
    }

    /// Number of pages this image occupies.
    pub fn plane_count(&self) -> usize {
        self.size_c * self.size_z * self.size_t
    }
}

/// Whether a description looks like OME-XML.
pub fn is_ome_xml(description: &str) -> bool {
    let trimmed = description.trim_start();
    (trimmed.starts_with("<?xml") && trimmed.contains("<OME")) || trimmed.starts_with("<OME")
}

/// Parse the `<Image>` elements of an OME-XML document.
pub fn parse_ome_xml(xml: &str) -> Result<Vec<OmeImage>, SourceError> {
    let doc = Document::parse(xml).map_err(|e| SourceError::Metadata(format!("OME-XML: {}", e)))?;

    let images: Vec<OmeImage> = doc
        .descendants()
        .filter(|n| n.tag_name().name() == "Image")
        .filter_map(|image| {
            image
                .children()
                .find(|c| c.tag_name().name() == "Pixels")
                .map(parse_pixels)
        })
        .collect::<Result<_, _>>()?;

    if images.is_empty() {
        return Err(SourceError::Metadata(
            "OME-XML contains no Image/Pixels element".to_string(),
        ));
    }
    Ok(images)
}

fn parse_pixels(pixels: Node<'_, '_>) -> Result<OmeImage, SourceError> {
    let size = |name: &str| -> Result<usize, SourceError> {
        match pixels.attribute(name) {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(0) => Err(SourceError::Metadata(format!("{} must be at least 1", name))),
                Ok(n) => Ok(n),
                Err(_) => Err(SourceError::Metadata(format!("invalid {} '{}'", name, v))),
            },
            None => Ok(1),
        }
    };
    let float = |name: &str| pixels.attribute(name).and_then(|v| v.trim().parse::<f64>().ok());

    let length_um = |name: &str| {
        let unit = pixels.attribute(format!("{}Unit", name).as_str()).unwrap_or("µm");
        float(name).map(|v| v * micrometers_per(unit))
    };

    let time_increment_ms = float("TimeIncrement").map(|v| {
        let unit = pixels.attribute("TimeIncrementUnit").unwrap_or("s");
        v * milliseconds_per(unit)
    });

    let channel_names = pixels
        .children()
        .filter(|c| c.tag_name().name() == "Channel")
        .map(|c| c.attribute("Name").map(str::to_string))
        .collect();

    Ok(OmeImage {
        dimension_order: pixels.attribute("DimensionOrder").unwrap_or("XYCZT").to_string(),
        size_x: size("SizeX")?,
        size_y: size("SizeY")?,
        size_c: size("SizeC")?,
        size_z: size("SizeZ")?,
        size_t: size("SizeT")?,
        pixel_type: pixels.attribute("Type").map(str::to_string),
        channel_names,
        physical_size_x: length_um("PhysicalSizeX"),
        physical_size_y: length_um("PhysicalSizeY"),
        physical_size_z: length_um("PhysicalSizeZ"),
        time_increment_ms,
    })
}

fn micrometers_per(unit: &str) -> f64 {
    match unit {
        "nm" => 1e-3,
        "mm" => 1e3,
        "cm" => 1e4,
        "m" => 1e6,
        _ => 1.0,
    }
}

fn milliseconds_per(unit: &str) -> f64 {
    match unit {
        "ms" => 1.0,
        "µs" | "us" => 1e-3,
        "min" => 60_000.0,
        "h" => 3_600_000.0,
        _ => 1_000.0,
    }
}

/// OME pixel type name of a data type.
pub fn ome_pixel_type(data_type: DataType) -> &'static str {
    data_type.name()
}

/// Build an OME-XML document for a stack of `shape` over `axes`.
///
/// `axes` must end in Y, X; leading axes may be any of T, C, Z in any
/// order and map onto the page order.
pub fn build_ome_xml(
    metadata: &OmeMetadata,
    axes: &[Axis],
    shape: &[usize],
    data_type: DataType,
) -> String {
    let size_of = |axis: Axis| {
        axes.iter()
            .position(|a| *a == axis)
            .map_or(1, |i| shape[i])
    };
    let leading: Vec<Axis> = axes.iter().copied().filter(|a| !a.is_spatial()).collect();

    let mut order = String::from("XY");
    for axis in leading.iter().rev() {
        order.push(axis.as_char());
    }
    for axis in [Axis::C, Axis::Z, Axis::T] {
        if !leading.contains(&axis) {
            order.push(axis.as_char());
        }
    }

    let size_c = size_of(Axis::C);
    let planes: usize = leading.iter().map(|&a| size_of(a)).product();

    let mut pixels_attrs = format!(
        r#"ID="Pixels:0" DimensionOrder="{}" Type="{}" SizeX="{}" SizeY="{}" SizeC="{}" SizeZ="{}" SizeT="{}""#,
        order,
        ome_pixel_type(data_type),
        size_of(Axis::X),
        size_of(Axis::Y),
        size_c,
        size_of(Axis::Z),
        size_of(Axis::T),
    );
    for (name, value) in [
        ("PhysicalSizeX", metadata.physical_size_x),
        ("PhysicalSizeY", metadata.physical_size_y),
        ("PhysicalSizeZ", metadata.physical_size_z),
    ] {
        if let Some(v) = value {
            let _ = write!(pixels_attrs, r#" {0}="{1}" {0}Unit="µm""#, name, v);
        }
    }
    if let Some(ms) = metadata.time_increment_ms {
        let _ = write!(pixels_attrs, r#" TimeIncrement="{}" TimeIncrementUnit="ms""#, ms);
    }
    pixels_attrs.push_str(r#" BigEndian="false" Interleaved="false""#);

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = write!(
        xml,
        r#"<OME xmlns="{}" Creator="hyperstack {}"><Image ID="Image:0" Name="{}">"#,
        OME_NAMESPACE,
        env!("CARGO_PKG_VERSION"),
        escape_xml(&image_name(&metadata.description)),
    );
    if !metadata.description.is_empty() {
        let _ = write!(
            xml,
            "<Description>{}</Description>",
            escape_xml(&metadata.description)
        );
    }
    let _ = write!(xml, "<Pixels {}>", pixels_attrs);
    for c in 0..size_c {
        let _ = write!(xml, r#"<Channel ID="Channel:0:{}" SamplesPerPixel="1""#, c);
        if let Some(name) = metadata.channel_names.get(c) {
            let _ = write!(xml, r#" Name="{}""#, escape_xml(name));
        }
        xml.push_str("/>");
    }
    let _ = write!(xml, r#"<TiffData IFD="0" PlaneCount="{}"/>"#, planes);
    xml.push_str("</Pixels></Image></OME>");
    xml
}

fn image_name(description: &str) -> String {
    description
        .strip_prefix("Exported from ")
        .unwrap_or(description)
        .to_string()
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

// =============================================================================
// ImageJ
// =============================================================================

/// Whether a description is an ImageJ one.
pub fn is_imagej(description: &str) -> bool {
    description.starts_with("ImageJ=")
}

/// Split an ImageJ description into its `key=value` pairs.
pub fn parse_imagej(description: &str) -> Vec<(String, String)> {
    description
        .lines()
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

/// Axes of an ImageJ hyperstack, slowest first: T, Z, C.
///
/// Axes of size 1 are left out. A plain stack with only `images` is
/// treated as Z slices.
pub fn imagej_page_axes(pairs: &[(String, String)]) -> Vec<(Axis, usize)> {
    let count = |key: &str| {
        pairs
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(1)
    };
    let (frames, slices, channels) = (count("frames"), count("slices"), count("channels"));
    let images = count("images");

    let mut axes: Vec<(Axis, usize)> = [(Axis::T, frames), (Axis::Z, slices), (Axis::C, channels)]
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .collect();
    if axes.is_empty() && images > 1 {
        axes.push((Axis::Z, images));
    }
    axes
}

/// Build an ImageJ description for a stack over `axes` (leading axes among
/// T, Z, C in that order, then Y, X).
pub fn build_imagej(metadata: &OmeMetadata, axes: &[Axis], shape: &[usize]) -> String {
    let size_of = |axis: Axis| {
        axes.iter()
            .position(|a| *a == axis)
            .map_or(1, |i| shape[i])
    };
    let (frames, slices, channels) = (size_of(Axis::T), size_of(Axis::Z), size_of(Axis::C));

    let mut lines = vec![
        "ImageJ=1.11a".to_string(),
        format!("images={}", frames * slices * channels),
    ];
    if channels > 1 {
        lines.push(format!("channels={}", channels));
    }
    if slices > 1 {
        lines.push(format!("slices={}", slices));
    }
    if frames > 1 {
        lines.push(format!("frames={}", frames));
    }
    if [frames, slices, channels].iter().filter(|n| **n > 1).count() > 1 {
        lines.push("hyperstack=true".to_string());
    }
    if let Some(z) = metadata.physical_size_z {
        lines.push("unit=micron".to_string());
        lines.push(format!("spacing={}", z));
    }
    if let Some(ms) = metadata.time_increment_ms {
        lines.push(format!("finterval={}", ms / 1000.0));
    }
    lines.push("loop=false".to_string());
    if !metadata.description.is_empty() {
        let info = metadata.description.lines().collect::<Vec<_>>().join(" ");
        lines.push(format!("info={}", info));
    }
    lines.join("\n") + "\n"
}

// =============================================================================
// Tests
// =============================================================================
