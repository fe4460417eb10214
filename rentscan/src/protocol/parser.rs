// rentscan/src/protocol/parser.rs
//! Bounds-checked readers for fixed-layout buffers.

use crate::{Error, Result};

/// Ensure the slice has at least `min` bytes.
pub fn ensure_len(data: &[u8], min: usize) -> Result<()> {
    if data.len() < min {
        return Err(Error::InvalidLength {
            expected: min,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Byte at `idx`, or `InvalidLength` when `data` is too short.
pub fn byte_at(data: &[u8], idx: usize) -> Result<u8> {
    ensure_len(data, idx + 1)?;
    Ok(data[idx])
}

pub fn slice_at(data: &[u8], idx: usize, len: usize) -> Result<&[u8]> {
    ensure_len(data, idx + len)?;
    Ok(&data[idx..idx + len])
}

/// Little-endian u32 starting at `idx`.
pub fn le_u32_at(data: &[u8], idx: usize) -> Result<u32> {
    let s = slice_at(data, idx, 4)?;
    Ok(u32::from_le_bytes([s[0], s[1], s[2], s[3]]))
}

/// Read a length byte at `idx` and reject values above `max`.
pub fn bounded_len_at(data: &[u8], idx: usize, max: usize, field: &'static str) -> Result<usize> {
    let len = byte_at(data, idx)? as usize;
    if len > max {
        return Err(Error::FieldTooLong {
            field,
            max,
            actual: len,
        });
    }
    Ok(len)
}
