//! On-disk container formats.
//!
//! [`tiff`] reads and writes multi-page TIFF/BigTIFF stacks. [`ome`] handles
//! the OME-XML and ImageJ descriptions that give those pages their axes.

pub mod ome;
pub mod tiff;

pub use ome::{is_imagej, is_ome_xml, OmeImage, OmeMetadata};
pub use tiff::TiffStackWriter;
