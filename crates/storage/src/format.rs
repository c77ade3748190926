//! On-disk byte format for persisted records.
//!
//! Each record lives in its own file:
//!
//! ```text
//! +---------+---------+-----------+-------------+---------+-----------+
//! | magic   | version | record id | payload len | crc32   | payload   |
//! | 4 bytes | u16     | u64       | u32         | u32     | len bytes |
//! +---------+---------+-----------+-------------+---------+-----------+
//! ```
//!
//! All integers are little-endian. The CRC covers the payload only.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use shardreg_core::error::{Error, Result};
use shardreg_core::types::RecordId;
use std::io::{Cursor, Read};

/// Magic bytes at the start of every record file
pub const RECORD_MAGIC: [u8; 4] = *b"SRST";

/// Current record format version
pub const RECORD_FORMAT_VERSION: u16 = 1;

/// Size of the fixed header preceding the payload
pub const RECORD_HEADER_SIZE: usize = 4 + 2 + 8 + 4 + 4;

/// Encode a record file
pub fn encode_record(id: RecordId, payload: &[u8]) -> Result<Vec<u8>> {
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::InvalidInput(format!("record payload too large: {} bytes", payload.len())))?;

    let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + payload.len());
    buf.extend_from_slice(&RECORD_MAGIC);
    buf.write_u16::<LittleEndian>(RECORD_FORMAT_VERSION)?;
    buf.write_u64::<LittleEndian>(id)?;
    buf.write_u32::<LittleEndian>(len)?;
    buf.write_u32::<LittleEndian>(crc32fast::hash(payload))?;
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode and validate a record file, returning its id and payload
pub fn decode_record(bytes: &[u8]) -> Result<(RecordId, Vec<u8>)> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(Error::Corruption(format!(
            "record truncated: {} bytes, header needs {}",
            bytes.len(),
            RECORD_HEADER_SIZE
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    cursor.read_exact(&mut magic)?;
    if magic != RECORD_MAGIC {
        return Err(Error::Corruption(format!("bad record magic {:?}", magic)));
    }

    let version = cursor.read_u16::<LittleEndian>()?;
    if version != RECORD_FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported record format version {}",
            version
        )));
    }

    let id = cursor.read_u64::<LittleEndian>()?;
    let len = cursor.read_u32::<LittleEndian>()? as usize;
    let expected_crc = cursor.read_u32::<LittleEndian>()?;

    let payload = &bytes[RECORD_HEADER_SIZE..];
    if payload.len() != len {
        return Err(Error::Corruption(format!(
            "record payload length {} does not match header {}",
            payload.len(),
            len
        )));
    }

    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(Error::Corruption(format!(
            "record checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    Ok((id, payload.to_vec()))
}
