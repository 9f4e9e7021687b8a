//! Bounds-checked byte order helpers for code buffers.
//!
//! Class-file bytecode stores its operands in big-endian order. Once a method has been
//! rewritten, cache indices are stored in the host's native order so the interpreter can
//! load them directly. This module provides both views over a byte slice, always checking
//! bounds and returning [`crate::Error::OutOfBounds`] rather than panicking.
//!
//! All functions follow the same convention: the `offset` argument is advanced by the size of
//! the value that was read or written.
//!
//! # Examples
//!
//! ```rust,ignore
//! use classlink::classfile::io::{read_be_at, write_ne_at};
//!
//! let mut code = [0xB4, 0x00, 0x07];
//! let mut offset = 1;
//! let cp_index: u16 = read_be_at(&code, &mut offset)?;
//! assert_eq!(cp_index, 7);
//!
//! let mut offset = 1;
//! write_ne_at(&mut code, &mut offset, 3u16)?;
//! # Ok::<(), classlink::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for reading and writing primitive values in the byte orders used by code buffers.
pub trait ByteIO: Sized {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;
    /// Read T from a byte buffer in native order
    fn from_ne_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
    fn to_be_bytes(self) -> Self::Bytes;
    /// Write T to a byte buffer in native order
    fn to_ne_bytes(self) -> Self::Bytes;
}

macro_rules! impl_byte_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ByteIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn from_ne_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_ne_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }

                fn to_ne_bytes(self) -> Self::Bytes {
                    <$ty>::to_ne_bytes(self)
                }
            }
        )*
    };
}

impl_byte_io!(u8 => 1, i8 => 1, u16 => 2, i16 => 2, u32 => 4, i32 => 4);

fn read_at<T: ByteIO>(data: &[u8], offset: &mut usize, convert: fn(T::Bytes) -> T) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(convert(read))
}

fn write_at<T: ByteIO>(data: &mut [u8], offset: &mut usize, bytes: T::Bytes) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes.as_ref());
    *offset = end;
    Ok(())
}

/// Safely reads a big-endian value of type `T` at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    read_at(data, offset, T::from_be_bytes)
}

/// Safely reads a native-order value of type `T` at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_ne_at<T: ByteIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    read_at(data, offset, T::from_ne_bytes)
}

/// Safely writes a big-endian value of type `T` at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn write_be_at<T: ByteIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    write_at::<T>(data, offset, value.to_be_bytes())
}

/// Safely writes a native-order value of type `T` at `offset`, advancing the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn write_ne_at<T: ByteIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    write_at::<T>(data, offset, value.to_ne_bytes())
}

/// Reads a big-endian value at a fixed position without tracking an offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_be<T: ByteIO>(data: &[u8], position: usize) -> Result<T> {
    let mut offset = position;
    read_be_at(data, &mut offset)
}

/// Reads a native-order value at a fixed position without tracking an offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_ne<T: ByteIO>(data: &[u8], position: usize) -> Result<T> {
    let mut offset = position;
    read_ne_at(data, &mut offset)
}

/// Writes a big-endian value at a fixed position without tracking an offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn write_be<T: ByteIO>(data: &mut [u8], position: usize, value: T) -> Result<()> {
    let mut offset = position;
    write_be_at(data, &mut offset, value)
}

/// Writes a native-order value at a fixed position without tracking an offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the buffer is too short.
pub fn write_ne<T: ByteIO>(data: &mut [u8], position: usize, value: T) -> Result<()> {
    let mut offset = position;
    write_ne_at(data, &mut offset, value)
}
