//! Little-endian stream helpers shared by the envelope and payload codecs.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use std::io::{self, Read, Write};

// Fixed-layout records are written with their in-memory representation.
const _: () = assert!(cfg!(target_endian = "little"), "on-disk records assume a little-endian target");

pub fn write_pod<T: Pod>(writer: &mut dyn Write, value: &T) -> io::Result<()> {
    writer.write_all(bytemuck::bytes_of(value))
}

pub fn read_pod<T: Pod + Zeroable>(reader: &mut dyn Read) -> io::Result<T> {
    let mut value = T::zeroed();
    reader.read_exact(bytemuck::bytes_of_mut(&mut value))?;
    Ok(value)
}

pub fn write_u32(writer: &mut dyn Write, value: u32) -> io::Result<()> {
    writer.write_all(&value.to_le_bytes())
}

pub fn read_u32(reader: &mut dyn Read) -> io::Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Writes the matrix as 16 floats, row by row.
pub fn write_mat4(writer: &mut dyn Write, matrix: &Mat4) -> io::Result<()> {
    for value in matrix.transpose().to_cols_array() {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

pub fn read_mat4(reader: &mut dyn Read) -> io::Result<Mat4> {
    let mut rows = [0.0f32; 16];
    for value in &mut rows {
        let mut bytes = [0u8; 4];
        reader.read_exact(&mut bytes)?;
        *value = f32::from_le_bytes(bytes);
    }
    Ok(Mat4::from_cols_array(&rows).transpose())
}

/// Reads exactly `len` bytes without trusting `len` for the up-front allocation.
pub fn read_bytes(reader: &mut dyn Read, len: usize) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(len.min(1 << 20));
    Read::take(&mut *reader, len as u64).read_to_end(&mut buffer)?;
    if buffer.len() != len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected {len} bytes, stream ended after {}", buffer.len()),
        ));
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::io::Cursor;

    #[test]
    fn matrices_are_written_row_major() {
        let matrix = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let mut out = Vec::new();
        write_mat4(&mut out, &matrix).unwrap();
        let fourth = f32::from_le_bytes(out[12..16].try_into().unwrap());
        assert_eq!(fourth, 1.0);
        assert_eq!(read_mat4(&mut Cursor::new(out)).unwrap(), matrix);
    }

    #[test]
    fn short_reads_are_errors() {
        let err = read_bytes(&mut Cursor::new(vec![1u8, 2, 3]), 8).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
