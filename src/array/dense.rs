//! Dynamically typed dense arrays.
//!
//! Sources report their element type at runtime, so the buffers that flow
//! through extraction, normalization and serialization carry their data type
//! as an enum tag over one `ndarray::ArrayD` per supported element type.

use std::fmt;
use std::ops::Range;

use ndarray::{ArrayD, IxDyn, ShapeError, Slice};
use serde::Serialize;

// =============================================================================
// DataType
// =============================================================================

/// Element type of a dense array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DataType {
    /// Size of a single element in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::I8 | DataType::I16 | DataType::I32 | DataType::I64
        )
    }

    /// Lower-case name, as used in metadata and CLI output.
    pub const fn name(self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float",
            DataType::F64 => "double",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Element
// =============================================================================

/// A primitive element type that can live in a [`DenseArray`].
pub trait Element: Copy + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DATA_TYPE: DataType;

    /// Wrap a typed array into the dynamic array.
    fn wrap(array: ArrayD<Self>) -> DenseArray;

    /// Borrow the typed array back out, if the tag matches.
    fn unwrap_ref(array: &DenseArray) -> Option<&ArrayD<Self>>;

    /// Decode one element from its raw bytes.
    fn from_bytes(bytes: &[u8], little_endian: bool) -> Self;

    /// Append the little-endian encoding of this element.
    fn extend_le(self, out: &mut Vec<u8>);
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DATA_TYPE: DataType = DataType::$variant;

            fn wrap(array: ArrayD<Self>) -> DenseArray {
                DenseArray::$variant(array)
            }

            fn unwrap_ref(array: &DenseArray) -> Option<&ArrayD<Self>> {
                match array {
                    DenseArray::$variant(a) => Some(a),
                    _ => None,
                }
            }

            #[inline]
            fn from_bytes(bytes: &[u8], little_endian: bool) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$t>()];
                raw.copy_from_slice(&bytes[..std::mem::size_of::<$t>()]);
                if little_endian {
                    <$t>::from_le_bytes(raw)
                } else {
                    <$t>::from_be_bytes(raw)
                }
            }

            #[inline]
            fn extend_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_element!(u8, U8);
impl_element!(u16, U16);
impl_element!(u32, U32);
impl_element!(u64, U64);
impl_element!(i8, I8);
impl_element!(i16, I16);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);

// =============================================================================
// DenseArray
// =============================================================================

/// A dense N-dimensional array whose element type is known at runtime.
#[derive(Debug, Clone, PartialEq)]
pub enum DenseArray {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Apply the same expression to whichever typed array is inside.
macro_rules! dispatch {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DenseArray::U8($a) => $body,
            DenseArray::U16($a) => $body,
            DenseArray::U32($a) => $body,
            DenseArray::U64($a) => $body,
            DenseArray::I8($a) => $body,
            DenseArray::I16($a) => $body,
            DenseArray::I32($a) => $body,
            DenseArray::I64($a) => $body,
            DenseArray::F32($a) => $body,
            DenseArray::F64($a) => $body,
        }
    };
}

/// Like `dispatch!`, but re-wraps the result in the same variant.
macro_rules! map_same {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DenseArray::U8($a) => DenseArray::U8($body),
            DenseArray::U16($a) => DenseArray::U16($body),
            DenseArray::U32($a) => DenseArray::U32($body),
            DenseArray::U64($a) => DenseArray::U64($body),
            DenseArray::I8($a) => DenseArray::I8($body),
            DenseArray::I16($a) => DenseArray::I16($body),
            DenseArray::I32($a) => DenseArray::I32($body),
            DenseArray::I64($a) => DenseArray::I64($body),
            DenseArray::F32($a) => DenseArray::F32($body),
            DenseArray::F64($a) => DenseArray::F64($body),
        }
    };
}

/// Numeric `as` conversion of every element into `$t`.
macro_rules! cast_elements {
    ($value:expr, $t:ty) => {
        dispatch!($value, a => a.mapv(|v| v as $t))
    };
}

/// Error from an element-wise region write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    DataTypeMismatch { target: DataType, chunk: DataType },
    ShapeMismatch { region: Vec<usize>, chunk: Vec<usize> },
}

impl DenseArray {
    /// Allocate a zero-filled array.
    pub fn zeros(data_type: DataType, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match data_type {
            DataType::U8 => DenseArray::U8(ArrayD::zeros(dim)),
            DataType::U16 => DenseArray::U16(ArrayD::zeros(dim)),
            DataType::U32 => DenseArray::U32(ArrayD::zeros(dim)),
            DataType::U64 => DenseArray::U64(ArrayD::zeros(dim)),
            DataType::I8 => DenseArray::I8(ArrayD::zeros(dim)),
            DataType::I16 => DenseArray::I16(ArrayD::zeros(dim)),
            DataType::I32 => DenseArray::I32(ArrayD::zeros(dim)),
            DataType::I64 => DenseArray::I64(ArrayD::zeros(dim)),
            DataType::F32 => DenseArray::F32(ArrayD::zeros(dim)),
            DataType::F64 => DenseArray::F64(ArrayD::zeros(dim)),
        }
    }

    /// Build an array from a flat row-major vector.
    pub fn from_vec<T: Element>(shape: &[usize], data: Vec<T>) -> Result<Self, ShapeError> {
        ArrayD::from_shape_vec(IxDyn(shape), data).map(T::wrap)
    }

    /// Decode a flat row-major byte buffer.
    ///
    /// `bytes` must hold exactly `product(shape) * size_in_bytes` bytes.
    pub fn from_raw_bytes(
        data_type: DataType,
        shape: &[usize],
        bytes: &[u8],
        little_endian: bool,
    ) -> Result<Self, ShapeError> {
        fn decode<T: Element>(
            shape: &[usize],
            bytes: &[u8],
            little_endian: bool,
        ) -> Result<DenseArray, ShapeError> {
            let size = std::mem::size_of::<T>();
            let values: Vec<T> = bytes
                .chunks_exact(size)
                .map(|c| T::from_bytes(c, little_endian))
                .collect();
            DenseArray::from_vec(shape, values)
        }

        match data_type {
            DataType::U8 => decode::<u8>(shape, bytes, little_endian),
            DataType::U16 => decode::<u16>(shape, bytes, little_endian),
            DataType::U32 => decode::<u32>(shape, bytes, little_endian),
            DataType::U64 => decode::<u64>(shape, bytes, little_endian),
            DataType::I8 => decode::<i8>(shape, bytes, little_endian),
            DataType::I16 => decode::<i16>(shape, bytes, little_endian),
            DataType::I32 => decode::<i32>(shape, bytes, little_endian),
            DataType::I64 => decode::<i64>(shape, bytes, little_endian),
            DataType::F32 => decode::<f32>(shape, bytes, little_endian),
            DataType::F64 => decode::<f64>(shape, bytes, little_endian),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            DenseArray::U8(_) => DataType::U8,
            DenseArray::U16(_) => DataType::U16,
            DenseArray::U32(_) => DataType::U32,
            DenseArray::U64(_) => DataType::U64,
            DenseArray::I8(_) => DataType::I8,
            DenseArray::I16(_) => DataType::I16,
            DenseArray::I32(_) => DataType::I32,
            DenseArray::I64(_) => DataType::I64,
            DenseArray::F32(_) => DataType::F32,
            DenseArray::F64(_) => DataType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    #[inline]
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    #[inline]
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the typed array, if the element type matches.
    pub fn typed<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::unwrap_ref(self)
    }

    /// Convert every element to `data_type` with numeric `as` semantics.
    ///
    /// Returns `self` untouched when the type already matches.
    pub fn cast(self, data_type: DataType) -> Self {
        if self.data_type() == data_type {
            return self;
        }
        match data_type {
            DataType::U8 => DenseArray::U8(cast_elements!(&self, u8)),
            DataType::U16 => DenseArray::U16(cast_elements!(&self, u16)),
            DataType::U32 => DenseArray::U32(cast_elements!(&self, u32)),
            DataType::U64 => DenseArray::U64(cast_elements!(&self, u64)),
            DataType::I8 => DenseArray::I8(cast_elements!(&self, i8)),
            DataType::I16 => DenseArray::I16(cast_elements!(&self, i16)),
            DataType::I32 => DenseArray::I32(cast_elements!(&self, i32)),
            DataType::I64 => DenseArray::I64(cast_elements!(&self, i64)),
            DataType::F32 => DenseArray::F32(cast_elements!(&self, f32)),
            DataType::F64 => DenseArray::F64(cast_elements!(&self, f64)),
        }
    }

    /// Copy `chunk` into the hyper-rectangle `region` of this array.
    ///
    /// `region` holds one index range per axis; the chunk's shape must equal
    /// the region's extents exactly (no broadcasting).
    pub fn assign_region(
        &mut self,
        region: &[Range<usize>],
        chunk: &DenseArray,
    ) -> Result<(), AssignError> {
        let extents: Vec<usize> = region.iter().map(|r| r.end.saturating_sub(r.start)).collect();
        if extents.as_slice() != chunk.shape() {
            return Err(AssignError::ShapeMismatch {
                region: extents,
                chunk: chunk.shape().to_vec(),
            });
        }

        macro_rules! assign_typed {
            ($target:expr, $chunk:expr; $($variant:ident),*) => {
                match ($target, $chunk) {
                    $(
                        (DenseArray::$variant(dst), DenseArray::$variant(src)) => {
                            dst.slice_each_axis_mut(|d| Slice::from(region[d.axis.index()].clone()))
                                .assign(src);
                            Ok(())
                        }
                    )*
                    (dst, src) => Err(AssignError::DataTypeMismatch {
                        target: dst.data_type(),
                        chunk: src.data_type(),
                    }),
                }
            };
        }

        assign_typed!(self, chunk; U8, U16, U32, U64, I8, I16, I32, I64, F32, F64)
    }

    /// Owned copy of the hyper-rectangle `region`, one range per axis.
    ///
    /// Ranges must lie within the array.
    pub fn region(&self, region: &[Range<usize>]) -> Self {
        map_same!(self, a => a
            .slice_each_axis(|d| Slice::from(region[d.axis.index()].clone()))
            .to_owned())
    }

    /// Reinterpret the array with a new shape of the same element count.
    ///
    /// Data already in standard (row-major) layout is not copied.
    pub fn into_shape(self, shape: &[usize]) -> Result<Self, ShapeError> {
        Ok(map_same!(self, a => {
            let a = if a.is_standard_layout() {
                a
            } else {
                a.as_standard_layout().into_owned()
            };
            a.into_shape_with_order(IxDyn(shape))?
        }))
    }

    /// Reorder axes so that output axis `i` is input axis `order[i]`.
    ///
    /// The result is always in standard layout.
    pub fn permuted(self, order: &[usize]) -> Self {
        let identity = order.iter().enumerate().all(|(i, &o)| i == o);
        if identity {
            return self;
        }
        map_same!(self, a => a.permuted_axes(IxDyn(order)).as_standard_layout().into_owned())
    }

    /// Row-major little-endian bytes of every element.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.data_type().size_in_bytes());
        dispatch!(self, a => {
            for v in a.iter() {
                v.extend_le(&mut out);
            }
        });
        out
    }
}

impl<T: Element> From<ArrayD<T>> for DenseArray {
    fn from(array: ArrayD<T>) -> Self {
        T::wrap(array)
    }
}

// =============================================================================
// Tests
// =============================================================================
