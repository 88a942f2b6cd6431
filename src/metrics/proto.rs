// Minimal protobuf encoding for TensorBoard Event messages
//
// Only the fields needed for scalar summaries are written:
//   Event   { 1: double wall_time, 2: int64 step, 3: string file_version, 5: Summary summary }
//   Summary { 1: repeated Value value }
//   Value   { 1: string tag, 2: float simple_value }
// Unknown fields are skipped on decode.

use anyhow::{bail, Context, Result};

const WIRE_VARINT: u8 = 0;
const WIRE_FIXED64: u8 = 1;
const WIRE_LEN: u8 = 2;
const WIRE_FIXED32: u8 = 5;

/// Decoded event, reduced to what the scalar reader needs
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Event {
    pub wall_time: f64,
    pub step: i64,
    pub file_version: Option<String>,
    pub scalars: Vec<(String, f32)>,
}

pub fn encode_file_version(wall_time: f64, version: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    put_fixed64_field(&mut buf, 1, wall_time.to_bits());
    put_varint_field(&mut buf, 2, 0);
    put_bytes_field(&mut buf, 3, version.as_bytes());
    buf
}

pub fn encode_scalar(wall_time: f64, step: i64, tag: &str, value: f32) -> Vec<u8> {
    let mut value_msg = Vec::with_capacity(tag.len() + 8);
    put_bytes_field(&mut value_msg, 1, tag.as_bytes());
    put_key(&mut value_msg, 2, WIRE_FIXED32);
    value_msg.extend_from_slice(&value.to_bits().to_le_bytes());

    let mut summary = Vec::with_capacity(value_msg.len() + 4);
    put_bytes_field(&mut summary, 1, &value_msg);

    let mut buf = Vec::with_capacity(summary.len() + 24);
    put_fixed64_field(&mut buf, 1, wall_time.to_bits());
    put_varint_field(&mut buf, 2, step as u64);
    put_bytes_field(&mut buf, 5, &summary);
    buf
}

pub fn decode_event(buf: &[u8]) -> Result<Event> {
    let mut event = Event::default();
    let mut reader = FieldReader::new(buf);

    while let Some((field, value)) = reader.next_field()? {
        match (field, value) {
            (1, FieldValue::Fixed64(bits)) => event.wall_time = f64::from_bits(bits),
            (2, FieldValue::Varint(step)) => event.step = step as i64,
            (3, FieldValue::Bytes(bytes)) => {
                event.file_version =
                    Some(String::from_utf8(bytes.to_vec()).context("file_version is not UTF-8")?);
            }
            (5, FieldValue::Bytes(summary)) => decode_summary(summary, &mut event.scalars)?,
            _ => {}
        }
    }

    Ok(event)
}

fn decode_summary(buf: &[u8], out: &mut Vec<(String, f32)>) -> Result<()> {
    let mut reader = FieldReader::new(buf);
    while let Some((field, value)) = reader.next_field()? {
        if let (1, FieldValue::Bytes(value_msg)) = (field, value) {
            if let Some(scalar) = decode_value(value_msg)? {
                out.push(scalar);
            }
        }
    }
    Ok(())
}

/// Returns None for non-scalar values (images, histograms)
fn decode_value(buf: &[u8]) -> Result<Option<(String, f32)>> {
    let mut tag = None;
    let mut simple_value = None;
    let mut reader = FieldReader::new(buf);

    while let Some((field, value)) = reader.next_field()? {
        match (field, value) {
            (1, FieldValue::Bytes(bytes)) => {
                tag = Some(String::from_utf8(bytes.to_vec()).context("tag is not UTF-8")?);
            }
            (2, FieldValue::Fixed32(bits)) => simple_value = Some(f32::from_bits(bits)),
            _ => {}
        }
    }

    Ok(tag.zip(simple_value))
}

fn put_key(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(buf, ((field as u64) << 3) | wire_type as u64);
}

fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_varint_field(buf: &mut Vec<u8>, field: u32, value: u64) {
    put_key(buf, field, WIRE_VARINT);
    put_varint(buf, value);
}

fn put_fixed64_field(buf: &mut Vec<u8>, field: u32, bits: u64) {
    put_key(buf, field, WIRE_FIXED64);
    buf.extend_from_slice(&bits.to_le_bytes());
}

fn put_bytes_field(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_key(buf, field, WIRE_LEN);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

enum FieldValue<'a> {
    Varint(u64),
    Fixed64(u64),
    Bytes(&'a [u8]),
    Fixed32(u32),
}

struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn next_field(&mut self) -> Result<Option<(u32, FieldValue<'a>)>> {
        if self.pos >= self.buf.len() {
            return Ok(None);
        }

        let key = self.varint()?;
        let field = (key >> 3) as u32;
        let value = match (key & 0x7) as u8 {
            WIRE_VARINT => FieldValue::Varint(self.varint()?),
            WIRE_FIXED64 => {
                let bytes = self.take(8)?;
                FieldValue::Fixed64(u64::from_le_bytes(bytes.try_into()?))
            }
            WIRE_LEN => {
                let len = self.varint()? as usize;
                FieldValue::Bytes(self.take(len)?)
            }
            WIRE_FIXED32 => {
                let bytes = self.take(4)?;
                FieldValue::Fixed32(u32::from_le_bytes(bytes.try_into()?))
            }
            other => bail!("unsupported wire type {} for field {}", other, field),
        };

        Ok(Some((field, value)))
    }

    fn varint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        for shift in (0..64).step_by(7) {
            let byte = *self.buf.get(self.pos).context("truncated varint")?;
            self.pos += 1;
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        bail!("varint longer than 10 bytes")
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).context("field length overflow")?;
        let bytes = self.buf.get(self.pos..end).context("truncated field")?;
        self.pos = end;
        Ok(bytes)
    }
}
