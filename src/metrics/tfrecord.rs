// TFRecord framing used by TensorBoard event files
//
// Each record on disk:
//   u64 LE  length
//   u32 LE  masked crc32c of the length bytes
//   [u8]    data
//   u32 LE  masked crc32c of data

use anyhow::{Context, Result};
use std::io::Write;

use crate::errors::TelemetryError;

const CRC32C_POLY: u32 = 0x82F6_3B78;
const MASK_DELTA: u32 = 0xa282_ead8;
const HEADER_LEN: usize = 12;
const FOOTER_LEN: usize = 4;

const CRC32C_TABLE: [u32; 256] = build_crc32c_table();

const fn build_crc32c_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32C_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-32C (Castagnoli)
pub fn crc32c(data: &[u8]) -> u32 {
    let mut crc = !0u32;
    for &byte in data {
        crc = CRC32C_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

pub fn masked_crc32c(data: &[u8]) -> u32 {
    let crc = crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Frame and write one record
pub fn write_record<W: Write>(writer: &mut W, data: &[u8]) -> Result<()> {
    let len = (data.len() as u64).to_le_bytes();
    writer.write_all(&len)?;
    writer.write_all(&masked_crc32c(&len).to_le_bytes())?;
    writer.write_all(data)?;
    writer.write_all(&masked_crc32c(data).to_le_bytes())?;
    Ok(())
}

/// Split a buffer of framed records, verifying both checksums of each
pub fn read_records(buf: &[u8]) -> Result<Vec<&[u8]>> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset < buf.len() {
        let corrupt = |reason: &str| TelemetryError::CorruptRecord {
            offset: offset as u64,
            reason: reason.to_string(),
        };

        let header = buf
            .get(offset..offset + HEADER_LEN)
            .ok_or_else(|| corrupt("truncated header"))?;
        let len_bytes = &header[..8];
        if read_u32(&header[8..12]) != masked_crc32c(len_bytes) {
            return Err(corrupt("length checksum mismatch").into());
        }

        let len = u64::from_le_bytes(len_bytes.try_into().context("length field")?) as usize;
        let data_start = offset + HEADER_LEN;
        let data_end = data_start
            .checked_add(len)
            .ok_or_else(|| corrupt("length overflow"))?;
        let data = buf
            .get(data_start..data_end)
            .ok_or_else(|| corrupt("truncated data"))?;
        let footer = buf
            .get(data_end..data_end + FOOTER_LEN)
            .ok_or_else(|| corrupt("truncated footer"))?;
        if read_u32(footer) != masked_crc32c(data) {
            return Err(corrupt("data checksum mismatch").into());
        }

        records.push(data);
        offset = data_end + FOOTER_LEN;
    }

    Ok(records)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32c_known_vectors() {
        assert_eq!(crc32c(b"123456789"), 0xE306_9283);
        assert_eq!(crc32c(&[0u8; 32]), 0x8A91_36AA);
        assert_eq!(crc32c(b""), 0);
    }

    #[test]
    fn test_framed_records_split_back_out() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"first").unwrap();
        write_record(&mut buf, b"").unwrap();
        write_record(&mut buf, b"third record").unwrap();

        let records = read_records(&buf).unwrap();
        assert_eq!(records, vec![&b"first"[..], &b""[..], &b"third record"[..]]);
        assert_eq!(buf.len(), 3 * (HEADER_LEN + FOOTER_LEN) + 5 + 12);
    }

    #[test]
    fn test_flipped_data_byte_reports_offset() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"ok").unwrap();
        let second = buf.len();
        write_record(&mut buf, b"payload").unwrap();
        buf[second + HEADER_LEN + 2] ^= 0x01;

        let err = read_records(&buf).unwrap_err();
        match err.downcast_ref::<TelemetryError>() {
            Some(TelemetryError::CorruptRecord { offset, reason }) => {
                assert_eq!(*offset, second as u64);
                assert!(reason.contains("data checksum"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_tail_is_corrupt() {
        let mut buf = Vec::new();
        write_record(&mut buf, b"payload").unwrap();
        buf.truncate(buf.len() - 2);
        assert!(read_records(&buf).is_err());
    }
}
