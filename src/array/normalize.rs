//! Output data type policy.
//!
//! Containers are written as 8-bit, 16-bit or 32-bit float samples. Other
//! integer types are cast straight to `u16`; wider floats are rescaled to
//! the full `u16` range. Both conversions are lossy.

use ndarray::ArrayD;

use super::dense::{DataType, DenseArray};

/// Data type an array of `data_type` is written as.
pub fn output_type(data_type: DataType) -> DataType {
    match data_type {
        DataType::U8 | DataType::U16 | DataType::F32 => data_type,
        _ => DataType::U16,
    }
}

/// Apply the output type policy. Idempotent.
///
/// - `u8`, `u16`, `f32`: unchanged
/// - other integers: `as u16` (wraps or truncates, not corrected)
/// - `f64`: `round(v / max * 65535)` where `max` is the largest finite
///   value; all zeros when `max <= 0`
pub fn normalize(array: DenseArray) -> DenseArray {
    match array {
        DenseArray::U8(_) | DenseArray::U16(_) | DenseArray::F32(_) => array,
        DenseArray::F64(a) => DenseArray::U16(rescale_to_u16(&a)),
        other => other.cast(DataType::U16),
    }
}

fn rescale_to_u16(a: &ArrayD<f64>) -> ArrayD<u16> {
    let max = a
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(f64::NEG_INFINITY, f64::max);

    if max > 0.0 {
        // `as` saturates: NaN and negatives land on 0
        a.mapv(|v| (v / max * 65535.0).round() as u16)
    } else {
        ArrayD::zeros(a.raw_dim())
    }
}
