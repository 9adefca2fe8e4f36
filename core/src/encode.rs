//! Consensus binary encoding for BLAST
//!
//! Little-endian integers and Bitcoin-style compact-size prefixed vectors.
//! Writers append to a `Vec<u8>` and cannot fail; readers pull from any
//! `std::io::Read` and report truncation or non-canonical input.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

use crate::Hash;

/// Upper bound on any length prefix we are willing to honour
pub const MAX_VECTOR_SIZE: u64 = 0x0200_0000;

/// Binary codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    /// Input ended early or could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    
    /// Compact-size integer encoded with more bytes than necessary
    #[error("Non-canonical compact size: {0}")]
    NonCanonicalSize(u64),
    
    /// Length prefix above `MAX_VECTOR_SIZE`
    #[error("Vector too large: {0}")]
    OversizedVector(u64),
    
    /// Bytes left over after a complete object was decoded
    #[error("{0} trailing bytes after object")]
    TrailingBytes(usize),
}

pub fn put_u32(buf: &mut Vec<u8>, value: u32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_u32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn put_i32(buf: &mut Vec<u8>, value: i32) {
    let mut bytes = [0u8; 4];
    LittleEndian::write_i32(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn put_i64(buf: &mut Vec<u8>, value: i64) {
    let mut bytes = [0u8; 8];
    LittleEndian::write_i64(&mut bytes, value);
    buf.extend_from_slice(&bytes);
}

pub fn put_hash(buf: &mut Vec<u8>, hash: &Hash) {
    buf.extend_from_slice(hash);
}

/// Append a compact-size integer (1, 3, 5 or 9 bytes)
pub fn put_compact_size(buf: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        buf.push(value as u8);
    } else if value <= 0xffff {
        buf.push(0xfd);
        let mut bytes = [0u8; 2];
        LittleEndian::write_u16(&mut bytes, value as u16);
        buf.extend_from_slice(&bytes);
    } else if value <= 0xffff_ffff {
        buf.push(0xfe);
        put_u32(buf, value as u32);
    } else {
        buf.push(0xff);
        let mut bytes = [0u8; 8];
        LittleEndian::write_u64(&mut bytes, value);
        buf.extend_from_slice(&bytes);
    }
}

/// Append a length-prefixed byte string
pub fn put_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Append a length-prefixed list of hashes
pub fn put_hash_vec(buf: &mut Vec<u8>, hashes: &[Hash]) {
    put_compact_size(buf, hashes.len() as u64);
    for hash in hashes {
        put_hash(buf, hash);
    }
}

pub fn read_hash<R: Read>(reader: &mut R) -> Result<Hash, CodecError> {
    let mut hash = [0u8; 32];
    reader.read_exact(&mut hash)?;
    Ok(hash)
}

/// Read a compact-size integer, rejecting non-minimal encodings
pub fn read_compact_size<R: Read>(reader: &mut R) -> Result<u64, CodecError> {
    let first = reader.read_u8()?;
    let value = match first {
        0xfd => {
            let v = reader.read_u16::<LittleEndian>()? as u64;
            if v < 0xfd {
                return Err(CodecError::NonCanonicalSize(v));
            }
            v
        }
        0xfe => {
            let v = reader.read_u32::<LittleEndian>()? as u64;
            if v <= 0xffff {
                return Err(CodecError::NonCanonicalSize(v));
            }
            v
        }
        0xff => {
            let v = reader.read_u64::<LittleEndian>()?;
            if v <= 0xffff_ffff {
                return Err(CodecError::NonCanonicalSize(v));
            }
            v
        }
        small => small as u64,
    };
    
    if value > MAX_VECTOR_SIZE {
        return Err(CodecError::OversizedVector(value));
    }
    Ok(value)
}

pub fn read_var_bytes<R: Read>(reader: &mut R) -> Result<Vec<u8>, CodecError> {
    let len = read_compact_size(reader)? as usize;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

pub fn read_hash_vec<R: Read>(reader: &mut R) -> Result<Vec<Hash>, CodecError> {
    let len = read_compact_size(reader)?;
    let mut hashes = Vec::with_capacity(len.min(1024) as usize);
    for _ in 0..len {
        hashes.push(read_hash(reader)?);
    }
    Ok(hashes)
}
