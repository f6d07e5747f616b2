//! Binary encoding primitives for the data file.
//!
//! All numbers are little-endian and fixed-width. Strings are a `u16`
//! byte length followed by UTF-8 bytes. A truncated stream is a decode
//! fault, not an I/O fault: the file was readable, its contents are not.

use std::io::{ErrorKind, Read, Write};

use crate::error::{Error, Result};

/// A payload that can live in a [`CollectionStore`](crate::storage::CollectionStore).
///
/// The store only ever needs this one capability pair: write the item to a
/// byte stream, and restore it from one.
pub trait Record: Clone + Send + Sync + 'static {
    fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> Result<()>;

    fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self>;
}

fn read_exact<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Decode("unexpected end of data".to_string()),
        _ => Error::Io(e),
    })
}

pub fn write_u8<W: Write + ?Sized>(w: &mut W, v: u8) -> Result<()> {
    w.write_all(&[v])?;
    Ok(())
}

pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf)?;
    Ok(buf[0])
}

pub fn write_u16<W: Write + ?Sized>(w: &mut W, v: u16) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_u16<R: Read + ?Sized>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(r, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub fn write_u64<W: Write + ?Sized>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_u64<R: Read + ?Sized>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn write_i32<W: Write + ?Sized>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub fn read_i32<R: Read + ?Sized>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

/// Write a length-prefixed string. Fails if the string does not fit a `u16`.
pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str) -> Result<()> {
    let len = u16::try_from(s.len())
        .map_err(|_| Error::InvalidRecord(format!("string of {} bytes is too long", s.len())))?;
    write_u16(w, len)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

/// Read a length-prefixed string, rejecting a declared length above `max_len`.
pub fn read_string<R: Read + ?Sized>(r: &mut R, max_len: usize) -> Result<String> {
    let len = usize::from(read_u16(r)?);
    if len > max_len {
        return Err(Error::Decode(format!(
            "string length {len} exceeds maximum {max_len}"
        )));
    }

    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf)?;
    String::from_utf8(buf).map_err(|e| Error::Decode(format!("string is not UTF-8: {e}")))
}
