//! Conversion between scalar values and register images.
//!
//! Register images are little-endian and exactly [`ScalarKind::byte_width`]
//! bytes long. Signed integers use two's complement, floats IEEE-754.
//! A boolean occupies a whole byte: it is never a bit inside a wider
//! register, and writing one overwrites the full byte.

use thiserror::Error;

use crate::catalog::ScalarKind;
use crate::value::ScalarValue;

/// Errors raised while converting values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MarshalError {
    #[error("truncated buffer for {kind}: expected {expected} bytes, got {actual}")]
    TruncatedBuffer {
        kind: ScalarKind,
        expected: usize,
        actual: usize,
    },

    #[error("value {value} does not fit in {kind} ({width} bytes)", width = .kind.byte_width())]
    ValueOutOfRange { value: ScalarValue, kind: ScalarKind },

    #[error("cannot convert {} value {value} to {kind}", .value.kind_name())]
    TypeMismatch { value: ScalarValue, kind: ScalarKind },
}

impl MarshalError {
    pub fn kind(&self) -> &'static str {
        match self {
            MarshalError::TruncatedBuffer { .. } => "truncated_buffer",
            MarshalError::ValueOutOfRange { .. } => "value_out_of_range",
            MarshalError::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

/// Decode a register image.
///
/// Bytes past the kind's width are ignored.
pub fn decode(bytes: &[u8], kind: ScalarKind) -> Result<ScalarValue, MarshalError> {
    let width = kind.byte_width();
    if bytes.len() < width {
        return Err(MarshalError::TruncatedBuffer {
            kind,
            expected: width,
            actual: bytes.len(),
        });
    }

    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&bytes[..width]);

    let value = match kind {
        ScalarKind::Bool => ScalarValue::Bool(buf[0] != 0),
        ScalarKind::Int8 => ScalarValue::Int(i8::from_le_bytes([buf[0]]).into()),
        ScalarKind::Int16 => ScalarValue::Int(i16::from_le_bytes([buf[0], buf[1]]).into()),
        ScalarKind::Int32 => {
            ScalarValue::Int(i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).into())
        }
        ScalarKind::Int64 => ScalarValue::Int(i64::from_le_bytes(buf)),
        ScalarKind::Uint8 | ScalarKind::Uint16 | ScalarKind::Uint32 | ScalarKind::Uint64 => {
            // Zero-filled upper bytes make the widening free.
            ScalarValue::UInt(u64::from_le_bytes(buf))
        }
        ScalarKind::Float32 => {
            ScalarValue::Float(f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]).into())
        }
        ScalarKind::Float64 => ScalarValue::Float(f64::from_le_bytes(buf)),
    };

    Ok(value)
}

/// Encode a value into a register image of exactly `kind.byte_width()` bytes.
pub fn encode(value: &ScalarValue, kind: ScalarKind) -> Result<Vec<u8>, MarshalError> {
    let width = kind.byte_width();

    match kind {
        ScalarKind::Bool => encode_bool(value, kind),
        ScalarKind::Float32 => {
            let v = float_of(value, kind)?;
            if v.is_finite() && v.abs() > f32::MAX as f64 {
                return Err(out_of_range(value, kind));
            }
            Ok((v as f32).to_le_bytes().to_vec())
        }
        ScalarKind::Float64 => Ok(float_of(value, kind)?.to_le_bytes().to_vec()),
        _ => {
            let v = integer_of(value, kind)?;
            let (min, max) = integer_range(kind);
            if v < min || v > max {
                return Err(out_of_range(value, kind));
            }
            // In range, so truncating the two's complement image is exact.
            let image = if kind.is_unsigned() {
                (v as u64).to_le_bytes()
            } else {
                (v as i64).to_le_bytes()
            };
            Ok(image[..width].to_vec())
        }
    }
}

fn encode_bool(value: &ScalarValue, kind: ScalarKind) -> Result<Vec<u8>, MarshalError> {
    let bit = match value {
        ScalarValue::Bool(b) => *b,
        ScalarValue::Int(0) | ScalarValue::UInt(0) => false,
        ScalarValue::Int(1) | ScalarValue::UInt(1) => true,
        ScalarValue::Int(_) | ScalarValue::UInt(_) => return Err(out_of_range(value, kind)),
        ScalarValue::Float(_) | ScalarValue::Text(_) => return Err(mismatch(value, kind)),
    };
    Ok(vec![u8::from(bit)])
}

fn integer_of(value: &ScalarValue, kind: ScalarKind) -> Result<i128, MarshalError> {
    match value {
        ScalarValue::Int(v) => Ok(i128::from(*v)),
        ScalarValue::UInt(v) => Ok(i128::from(*v)),
        ScalarValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Ok(*v as i128),
        _ => Err(mismatch(value, kind)),
    }
}

fn float_of(value: &ScalarValue, kind: ScalarKind) -> Result<f64, MarshalError> {
    match value {
        ScalarValue::Float(v) => Ok(*v),
        ScalarValue::Int(v) => Ok(*v as f64),
        ScalarValue::UInt(v) => Ok(*v as f64),
        ScalarValue::Bool(_) | ScalarValue::Text(_) => Err(mismatch(value, kind)),
    }
}

fn integer_range(kind: ScalarKind) -> (i128, i128) {
    match kind {
        ScalarKind::Int8 => (i8::MIN.into(), i8::MAX.into()),
        ScalarKind::Int16 => (i16::MIN.into(), i16::MAX.into()),
        ScalarKind::Int32 => (i32::MIN.into(), i32::MAX.into()),
        ScalarKind::Int64 => (i64::MIN.into(), i64::MAX.into()),
        ScalarKind::Uint8 => (0, u8::MAX.into()),
        ScalarKind::Uint16 => (0, u16::MAX.into()),
        ScalarKind::Uint32 => (0, u32::MAX.into()),
        ScalarKind::Uint64 => (0, u64::MAX.into()),
        ScalarKind::Bool => (0, 1),
        ScalarKind::Float32 | ScalarKind::Float64 => (i128::MIN, i128::MAX),
    }
}

fn out_of_range(value: &ScalarValue, kind: ScalarKind) -> MarshalError {
    MarshalError::ValueOutOfRange {
        value: value.clone(),
        kind,
    }
}

fn mismatch(value: &ScalarValue, kind: ScalarKind) -> MarshalError {
    MarshalError::TypeMismatch {
        value: value.clone(),
        kind,
    }
}
