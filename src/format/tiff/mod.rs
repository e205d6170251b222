//! TIFF and BigTIFF container support.
//!
//! # Key Concepts
//!
//! - **Byte order**: the header declares endianness (II = little-endian,
//!   MM = big-endian) and every multi-byte value is read accordingly.
//!
//! - **Classic TIFF vs BigTIFF**: classic TIFF uses 32-bit offsets (max 4GB
//!   files), BigTIFF uses 64-bit offsets. Both are read transparently; the
//!   writer produces either.
//!
//! - **IFD (Image File Directory)**: one per page. A multi-dimensional stack
//!   is a chain of 2-D pages whose order is described by the OME-XML or
//!   ImageJ description on the first page.
//!
//! - **Inline vs offset values**: small values live in the IFD entry, larger
//!   values at an offset the entry points to.

mod parser;
mod tags;
mod values;
mod writer;

pub use parser::{
    read_ifd_chain, ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, MAX_IFDS,
    TIFF_HEADER_SIZE,
};
pub use tags::{
    data_type_for, sample_layout, Compression, FieldType, TiffTag, SAMPLE_FORMAT_FLOAT,
    SAMPLE_FORMAT_INT, SAMPLE_FORMAT_UINT,
};
pub use values::{parse_u64_array, ValueReader};
pub use writer::TiffStackWriter;
