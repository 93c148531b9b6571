//! Self-describing byte compression: stored, run-length, and a small-window LZ77.
//!
//! Every output starts with a 13-byte envelope
//! `{magic: u32 = 'CHZP', type: u8, original_size: u32, compressed_size: u32}` (little-endian)
//! followed by `compressed_size` payload bytes.

use crate::binary::read_bytes;
use crate::error::{AssetError, AssetResult};
use std::io::{Read, Write};
use thiserror::Error;

pub const MAGIC: u32 = 0x4348_5A50;
pub const ENVELOPE_SIZE: usize = 13;

const RLE_MAX_RUN: usize = 255;
const LZ77_WINDOW: usize = 256;
const LZ77_MAX_MATCH: usize = 255;
const LZ77_MIN_MATCH: usize = 3;
const LZ77_MARKER: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionType {
    None = 0,
    Rle = 1,
    Lz77 = 2,
}

impl CompressionType {
    pub const ALL: [CompressionType; 3] = [CompressionType::None, CompressionType::Rle, CompressionType::Lz77];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Rle),
            2 => Some(Self::Lz77),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Rle => "rle",
            Self::Lz77 => "lz77",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedData {
    /// Envelope followed by the payload.
    pub bytes: Vec<u8>,
    pub kind: CompressionType,
    pub original_size: u32,
    /// Total size of `bytes`, envelope included.
    pub compressed_size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub kind: CompressionType,
    pub original_size: u32,
    pub payload_size: u32,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompressionError {
    #[error("input truncated")]
    Truncated,
    #[error("bad magic {0:#010x}")]
    BadMagic(u32),
    #[error("unknown compression type {0}")]
    UnknownType(u8),
    #[error("size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("corrupt {0} stream")]
    Corrupt(&'static str),
}

pub fn compress(data: &[u8], kind: CompressionType) -> CompressedData {
    let original_size = u32::try_from(data.len()).expect("compression input exceeds u32::MAX bytes");
    let payload = match kind {
        CompressionType::None => data.to_vec(),
        CompressionType::Rle => rle_encode(data),
        CompressionType::Lz77 => lz77_encode(data),
    };
    let mut bytes = Vec::with_capacity(ENVELOPE_SIZE + payload.len());
    bytes.extend_from_slice(&MAGIC.to_le_bytes());
    bytes.push(kind as u8);
    bytes.extend_from_slice(&original_size.to_le_bytes());
    bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&payload);
    let compressed_size = bytes.len() as u32;
    CompressedData { bytes, kind, original_size, compressed_size }
}

/// Runs every algorithm and keeps the smallest output; ties favour the simpler algorithm.
pub fn compress_best(data: &[u8]) -> CompressedData {
    let stored = compress(data, CompressionType::None);
    [CompressionType::Rle, CompressionType::Lz77]
        .into_iter()
        .map(|kind| compress(data, kind))
        .fold(stored, |best, candidate| if candidate.compressed_size < best.compressed_size { candidate } else { best })
}

/// Decodes an envelope, returning an empty buffer on any failure.
pub fn decompress(bytes: &[u8]) -> Vec<u8> {
    match try_decompress(bytes) {
        Ok(data) => data,
        Err(err) => {
            log::error!(target: "compression", "decompression failed: {err}");
            Vec::new()
        }
    }
}

pub fn try_decompress(bytes: &[u8]) -> Result<Vec<u8>, CompressionError> {
    let header = read_header(bytes)?;
    let payload = &bytes[ENVELOPE_SIZE..];
    if payload.len() != header.payload_size as usize {
        return Err(CompressionError::SizeMismatch {
            expected: header.payload_size as usize,
            actual: payload.len(),
        });
    }
    let expected = header.original_size as usize;
    let data = match header.kind {
        CompressionType::None => payload.to_vec(),
        CompressionType::Rle => rle_decode(payload, expected)?,
        CompressionType::Lz77 => lz77_decode(payload, expected)?,
    };
    if data.len() != expected {
        return Err(CompressionError::SizeMismatch { expected, actual: data.len() });
    }
    Ok(data)
}

pub fn read_header(bytes: &[u8]) -> Result<EnvelopeHeader, CompressionError> {
    if bytes.len() < ENVELOPE_SIZE {
        return Err(CompressionError::Truncated);
    }
    let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    if magic != MAGIC {
        return Err(CompressionError::BadMagic(magic));
    }
    let kind = CompressionType::from_u8(bytes[4]).ok_or(CompressionError::UnknownType(bytes[4]))?;
    let original_size = u32::from_le_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
    let payload_size = u32::from_le_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
    Ok(EnvelopeHeader { kind, original_size, payload_size })
}

/// Writes a payload stream whose length the reader already knows.
///
/// With `compress` set the stream is the smallest envelope. Otherwise the bytes are written as
/// they are, unless they begin with [`MAGIC`], in which case they go into a stored envelope so
/// [`read_stream`] cannot mistake them for one. Streams under four bytes are always raw.
pub fn write_stream(writer: &mut dyn Write, data: &[u8], compress: bool) -> AssetResult<()> {
    if data.len() < 4 {
        writer.write_all(data)?;
    } else if compress {
        writer.write_all(&compress_best(data).bytes)?;
    } else if data[..4] == MAGIC.to_le_bytes() {
        writer.write_all(&self::compress(data, CompressionType::None).bytes)?;
    } else {
        writer.write_all(data)?;
    }
    Ok(())
}

/// Reads a stream written by [`write_stream`]. Returns the bytes and whether they were enveloped.
pub fn read_stream(reader: &mut dyn Read, len: usize) -> AssetResult<(Vec<u8>, bool)> {
    if len < 4 {
        return Ok((read_bytes(reader, len).map_err(AssetError::from_payload_read)?, false));
    }
    let mut head = read_bytes(reader, 4).map_err(AssetError::from_payload_read)?;
    if head[..] != MAGIC.to_le_bytes() {
        let rest = read_bytes(reader, len - 4).map_err(AssetError::from_payload_read)?;
        head.extend_from_slice(&rest);
        return Ok((head, false));
    }
    head.extend_from_slice(&read_bytes(reader, ENVELOPE_SIZE - 4).map_err(AssetError::from_payload_read)?);
    let header = read_header(&head).map_err(|err| AssetError::FormatMismatch(format!("payload envelope: {err}")))?;
    if header.original_size as usize != len {
        return Err(AssetError::FormatMismatch(format!(
            "payload envelope holds {} bytes, {len} expected",
            header.original_size
        )));
    }
    head.extend_from_slice(
        &read_bytes(reader, header.payload_size as usize).map_err(AssetError::from_payload_read)?,
    );
    let data = try_decompress(&head).map_err(|err| AssetError::FormatMismatch(format!("payload envelope: {err}")))?;
    log::trace!(target: "compression", "read {} stream of {len} bytes", header.kind.label());
    Ok((data, true))
}

fn rle_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let value = data[pos];
        let run = data[pos..].iter().take(RLE_MAX_RUN).take_while(|&&b| b == value).count();
        out.push(run as u8);
        out.push(value);
        pos += run;
    }
    out
}

fn rle_decode(payload: &[u8], expected: usize) -> Result<Vec<u8>, CompressionError> {
    if payload.len() % 2 != 0 {
        return Err(CompressionError::Truncated);
    }
    let mut out = Vec::with_capacity(expected);
    for pair in payload.chunks_exact(2) {
        let count = pair[0] as usize;
        if count == 0 {
            return Err(CompressionError::Corrupt("rle"));
        }
        if out.len() + count > expected {
            return Err(CompressionError::SizeMismatch { expected, actual: out.len() + count });
        }
        out.resize(out.len() + count, pair[1]);
    }
    Ok(out)
}

fn lz77_encode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut pos = 0;
    while pos < data.len() {
        let (distance, length) = lz77_longest_match(data, pos);
        if length >= LZ77_MIN_MATCH {
            out.extend_from_slice(&[LZ77_MARKER, distance as u8, length as u8]);
            pos += length;
            continue;
        }
        let byte = data[pos];
        if byte == LZ77_MARKER {
            out.extend_from_slice(&[LZ77_MARKER, 0x00, LZ77_MARKER]);
        } else {
            out.push(byte);
        }
        pos += 1;
    }
    out
}

/// Matches may run past `pos`; the decoder copies byte by byte so overlaps reproduce runs.
fn lz77_longest_match(data: &[u8], pos: usize) -> (usize, usize) {
    let max_distance = pos.min(LZ77_WINDOW - 1);
    let max_length = (data.len() - pos).min(LZ77_MAX_MATCH);
    let mut best = (0, 0);
    for distance in 1..=max_distance {
        let start = pos - distance;
        let length = (0..max_length).take_while(|&i| data[start + i] == data[pos + i]).count();
        if length > best.1 {
            best = (distance, length);
            if length == max_length {
                break;
            }
        }
    }
    best
}

fn lz77_decode(payload: &[u8], expected: usize) -> Result<Vec<u8>, CompressionError> {
    let mut out = Vec::with_capacity(expected);
    let mut pos = 0;
    while pos < payload.len() {
        let byte = payload[pos];
        if byte != LZ77_MARKER {
            out.push(byte);
            pos += 1;
        } else {
            if pos + 3 > payload.len() {
                return Err(CompressionError::Truncated);
            }
            let distance = payload[pos + 1] as usize;
            let length = payload[pos + 2] as usize;
            pos += 3;
            if distance == 0 {
                if length != LZ77_MARKER as usize {
                    return Err(CompressionError::Corrupt("lz77"));
                }
                out.push(LZ77_MARKER);
            } else {
                if distance > out.len() || length == 0 {
                    return Err(CompressionError::Corrupt("lz77"));
                }
                for _ in 0..length {
                    let value = out[out.len() - distance];
                    out.push(value);
                }
            }
        }
        if out.len() > expected {
            return Err(CompressionError::SizeMismatch { expected, actual: out.len() });
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Vec<u8>> {
        let mut text = Vec::new();
        for _ in 0..40 {
            text.extend_from_slice(b"the quick brown fox jumps over the lazy dog; ");
        }
        let noise: Vec<u8> = (0..2048u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        vec![
            Vec::new(),
            vec![0x42],
            vec![0xFF; 700],
            vec![0x42; 1000],
            (0..=255u8).cycle().take(3000).collect(),
            text,
            noise,
            vec![0xFF, 0x00, 0xFF, 0xFF, 0x01, 0xFF, 0x00, 0x00, 0xFF],
        ]
    }

    #[test]
    fn every_algorithm_round_trips() {
        for data in samples() {
            for kind in CompressionType::ALL {
                let packed = compress(&data, kind);
                assert_eq!(packed.kind, kind);
                assert_eq!(packed.original_size as usize, data.len());
                assert_eq!(packed.compressed_size as usize, packed.bytes.len());
                assert_eq!(try_decompress(&packed.bytes).unwrap(), data, "{} failed", kind.label());
            }
        }
    }

    #[test]
    fn rle_run_of_a_thousand_bytes() {
        let data = vec![0x42u8; 1000];
        let packed = compress(&data, CompressionType::Rle);
        assert_eq!(packed.compressed_size as usize, ENVELOPE_SIZE + 2 * 1000usize.div_ceil(255));
        assert_eq!(packed.compressed_size as usize, ENVELOPE_SIZE + 8);
        assert_eq!(decompress(&packed.bytes), data);
    }

    #[test]
    fn best_is_never_worse_than_stored() {
        for data in samples() {
            let best = compress_best(&data);
            let stored = compress(&data, CompressionType::None);
            assert!(best.compressed_size <= stored.compressed_size);
            assert_eq!(decompress(&best.bytes), data);
        }
        assert_eq!(compress_best(&[0x42; 1000]).kind, CompressionType::Rle);
    }

    #[test]
    fn lz77_escapes_marker_literals() {
        let packed = compress(&[0xFF], CompressionType::Lz77);
        assert_eq!(&packed.bytes[ENVELOPE_SIZE..], &[0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn lz77_uses_overlapping_matches_for_runs() {
        let packed = compress(b"abababababababab", CompressionType::Lz77);
        assert_eq!(&packed.bytes[ENVELOPE_SIZE..], &[b'a', b'b', 0xFF, 2, 14]);
    }

    #[test]
    fn malformed_envelopes_decode_to_empty() {
        let packed = compress(b"hello hello hello", CompressionType::Lz77);

        assert_eq!(try_decompress(&packed.bytes[..5]), Err(CompressionError::Truncated));
        assert!(decompress(&packed.bytes[..5]).is_empty());

        let mut bad_magic = packed.bytes.clone();
        bad_magic[0] ^= 0xFF;
        assert!(matches!(try_decompress(&bad_magic), Err(CompressionError::BadMagic(_))));

        let mut bad_type = packed.bytes.clone();
        bad_type[4] = 9;
        assert_eq!(try_decompress(&bad_type), Err(CompressionError::UnknownType(9)));

        let mut short_payload = packed.bytes.clone();
        short_payload.pop();
        assert!(matches!(try_decompress(&short_payload), Err(CompressionError::SizeMismatch { .. })));

        let mut wrong_size = packed.bytes.clone();
        wrong_size[5] = wrong_size[5].wrapping_add(1);
        assert!(matches!(try_decompress(&wrong_size), Err(CompressionError::SizeMismatch { .. })));
        assert!(decompress(&wrong_size).is_empty());
    }

    #[test]
    fn streams_are_raw_unless_asked_to_compress() {
        let data = vec![7u8; 600];
        let mut raw = Vec::new();
        write_stream(&mut raw, &data, false).unwrap();
        assert_eq!(raw, data);
        assert_eq!(read_stream(&mut raw.as_slice(), 600).unwrap(), (data.clone(), false));

        let mut packed = Vec::new();
        write_stream(&mut packed, &data, true).unwrap();
        assert!(packed.len() < 32);
        packed.extend_from_slice(b"next");
        let mut reader = packed.as_slice();
        assert_eq!(read_stream(&mut reader, 600).unwrap(), (data, true));
        assert_eq!(reader, b"next");
    }

    #[test]
    fn raw_streams_that_look_like_envelopes_are_wrapped() {
        let mut data = MAGIC.to_le_bytes().to_vec();
        data.extend_from_slice(&[2, 9, 9, 9, 9, 1, 2, 3]);
        let mut out = Vec::new();
        write_stream(&mut out, &data, false).unwrap();
        assert_eq!(out.len(), ENVELOPE_SIZE + data.len());
        assert_eq!(out[4], CompressionType::None as u8);
        assert_eq!(read_stream(&mut out.as_slice(), data.len()).unwrap().0, data);

        let mut tiny = Vec::new();
        write_stream(&mut tiny, &[1, 2, 3], true).unwrap();
        assert_eq!(tiny, [1, 2, 3]);
    }

    #[test]
    fn stream_envelopes_must_match_the_expected_length() {
        let mut out = Vec::new();
        write_stream(&mut out, &[5u8; 64], true).unwrap();
        assert!(matches!(read_stream(&mut out.as_slice(), 65), Err(AssetError::FormatMismatch(_))));
        out.truncate(out.len() - 1);
        assert!(matches!(read_stream(&mut out.as_slice(), 64), Err(AssetError::FormatMismatch(_))));
    }

    #[test]
    fn corrupt_back_references_are_rejected() {
        let mut bytes = compress(b"abc", CompressionType::Lz77).bytes;
        bytes.truncate(ENVELOPE_SIZE);
        bytes.extend_from_slice(&[0xFF, 9, 3]);
        bytes[9..13].copy_from_slice(&3u32.to_le_bytes());
        assert_eq!(try_decompress(&bytes), Err(CompressionError::Corrupt("lz77")));
    }
}
