//! MRC2014 volume decoding (`.mrc`, `.rec`).
//!
//! The fixed 1024-byte header is followed by an optional extended header of
//! `nsymbt` bytes and then the voxel data, x varying fastest. Byte order comes
//! from the machine stamp at offset 212.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use half::f16;
use ndarray::Array3;

use crate::error::{DatasetError, Result};

pub const HEADER_LEN: usize = 1024;

const MACHST_OFFSET: usize = 212;
const MAP_OFFSET: usize = 208;

/// Voxel size in Å along each axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelSpacing {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl VoxelSpacing {
    /// The common spacing when all three axes agree.
    pub fn isotropic(&self) -> Option<f32> {
        (self.x == self.y && self.y == self.z).then_some(self.x)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MrcHeader {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub mode: i32,
    pub sampling: [i32; 3],
    pub cell: [f32; 3],
    pub extended_header_len: usize,
    little_endian: bool,
}

impl MrcHeader {
    pub fn parse(bytes: &[u8], path: &Path) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(DatasetError::malformed(
                path,
                format!("need {HEADER_LEN} header bytes, got {}", bytes.len()),
            ));
        }

        let endian = detect_endian(bytes);
        let read_i32 = |offset: usize| match endian {
            Endian::Little => LittleEndian::read_i32(&bytes[offset..offset + 4]),
            Endian::Big => BigEndian::read_i32(&bytes[offset..offset + 4]),
        };
        let read_f32 = |offset: usize| match endian {
            Endian::Little => LittleEndian::read_f32(&bytes[offset..offset + 4]),
            Endian::Big => BigEndian::read_f32(&bytes[offset..offset + 4]),
        };

        let dims = [read_i32(0), read_i32(4), read_i32(8)];
        if dims.iter().any(|&d| d <= 0) {
            return Err(DatasetError::malformed(
                path,
                format!("invalid dimensions {dims:?}"),
            ));
        }
        let nsymbt = read_i32(92);
        if nsymbt < 0 {
            return Err(DatasetError::malformed(path, "negative extended header size"));
        }

        Ok(Self {
            nx: dims[0] as usize,
            ny: dims[1] as usize,
            nz: dims[2] as usize,
            mode: read_i32(12),
            sampling: [read_i32(28), read_i32(32), read_i32(36)],
            cell: [read_f32(40), read_f32(44), read_f32(48)],
            extended_header_len: nsymbt as usize,
            little_endian: endian == Endian::Little,
        })
    }

    /// Array shape in (z, y, x) order.
    pub fn shape(&self) -> [usize; 3] {
        [self.nz, self.ny, self.nx]
    }

    /// `None` when the dimensions overflow `usize`.
    pub fn voxel_count(&self) -> Option<usize> {
        self.nx.checked_mul(self.ny)?.checked_mul(self.nz)
    }

    /// Bytes of voxel data the header promises.
    fn data_len(&self, path: &Path) -> Result<usize> {
        let bytes_per_voxel = self.bytes_per_voxel(path)?;
        self.voxel_count()
            .and_then(|count| count.checked_mul(bytes_per_voxel))
            .ok_or_else(|| {
                DatasetError::malformed(
                    path,
                    format!("dimensions {:?} overflow the data size", self.shape()),
                )
            })
    }

    /// Cell length divided by sampling, per axis. `None` when the sampling is
    /// unset, which some writers leave at zero.
    pub fn voxel_spacing(&self) -> Option<VoxelSpacing> {
        if self.sampling.iter().any(|&m| m <= 0) {
            return None;
        }
        Some(VoxelSpacing {
            x: self.cell[0] / self.sampling[0] as f32,
            y: self.cell[1] / self.sampling[1] as f32,
            z: self.cell[2] / self.sampling[2] as f32,
        })
    }

    pub fn data_offset(&self) -> u64 {
        (HEADER_LEN + self.extended_header_len) as u64
    }

    fn bytes_per_voxel(&self, path: &Path) -> Result<usize> {
        match self.mode {
            0 => Ok(1),
            1 | 6 | 12 => Ok(2),
            2 => Ok(4),
            other => Err(DatasetError::unsupported(
                path,
                format!("MRC mode {other} is not supported"),
            )),
        }
    }
}

/// The stamp is `0x44 0x44` (or `0x44 0x41`) for little-endian and `0x11 0x11`
/// for big-endian. Files without a valid `MAP ` word are assumed little-endian.
fn detect_endian(bytes: &[u8]) -> Endian {
    if &bytes[MAP_OFFSET..MAP_OFFSET + 4] == b"MAP " && bytes[MACHST_OFFSET] == 0x11 {
        Endian::Big
    } else {
        Endian::Little
    }
}

/// Read only the fixed header.
pub fn read_header(path: &Path) -> Result<MrcHeader> {
    let mut file = File::open(path)?;
    let mut bytes = [0u8; HEADER_LEN];
    file.read_exact(&mut bytes)
        .map_err(|_| DatasetError::malformed(path, "file too small for an MRC header"))?;
    MrcHeader::parse(&bytes, path)
}

/// Read the header and the full volume, converted to `f32`.
pub fn read_volume(path: &Path) -> Result<(MrcHeader, Array3<f32>)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut header_bytes = [0u8; HEADER_LEN];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|_| DatasetError::malformed(path, "file too small for an MRC header"))?;
    let header = MrcHeader::parse(&header_bytes, path)?;

    let data_len = header.data_len(path)?;
    let file_len = reader.get_ref().metadata()?.len();
    let available = file_len.saturating_sub(header.data_offset());
    if (data_len as u64) > available {
        return Err(DatasetError::malformed(
            path,
            format!("header promises {data_len} data bytes, file has {available}"),
        ));
    }

    reader.seek(SeekFrom::Start(header.data_offset()))?;
    let mut raw = vec![0u8; data_len];
    reader
        .read_exact(&mut raw)
        .map_err(|_| DatasetError::malformed(path, "truncated voxel data"))?;

    let values = if header.little_endian {
        decode_voxels::<LittleEndian>(&raw, header.mode)
    } else {
        decode_voxels::<BigEndian>(&raw, header.mode)
    };

    let data = Array3::from_shape_vec(header.shape(), values)
        .map_err(|e| DatasetError::malformed(path, e.to_string()))?;
    Ok((header, data))
}

fn decode_voxels<B: ByteOrder>(raw: &[u8], mode: i32) -> Vec<f32> {
    match mode {
        0 => bytemuck::cast_slice::<u8, i8>(raw)
            .iter()
            .map(|&v| v as f32)
            .collect(),
        1 => {
            let mut values = vec![0i16; raw.len() / 2];
            B::read_i16_into(raw, &mut values);
            values.into_iter().map(f32::from).collect()
        }
        6 => {
            let mut values = vec![0u16; raw.len() / 2];
            B::read_u16_into(raw, &mut values);
            values.into_iter().map(f32::from).collect()
        }
        12 => {
            let mut bits = vec![0u16; raw.len() / 2];
            B::read_u16_into(raw, &mut bits);
            bits.into_iter().map(|b| f16::from_bits(b).to_f32()).collect()
        }
        _ => {
            let mut values = vec![0f32; raw.len() / 4];
            B::read_f32_into(raw, &mut values);
            values
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use byteorder::WriteBytesExt;

    use super::*;

    /// A minimal little-endian MRC file with float32 data (mode 2).
    pub(crate) fn mrc_bytes(shape: [usize; 3], values: &[f32], spacing: f32) -> Vec<u8> {
        mrc_bytes_with_mode(shape, 2, spacing, |buf| {
            for v in values {
                buf.write_f32::<LittleEndian>(*v).unwrap();
            }
        })
    }

    pub(crate) fn mrc_bytes_with_mode(
        shape: [usize; 3],
        mode: i32,
        spacing: f32,
        write_data: impl FnOnce(&mut Vec<u8>),
    ) -> Vec<u8> {
        let [nz, ny, nx] = shape;
        let mut header = vec![0u8; HEADER_LEN];
        LittleEndian::write_i32(&mut header[0..4], nx as i32);
        LittleEndian::write_i32(&mut header[4..8], ny as i32);
        LittleEndian::write_i32(&mut header[8..12], nz as i32);
        LittleEndian::write_i32(&mut header[12..16], mode);
        LittleEndian::write_i32(&mut header[28..32], nx as i32);
        LittleEndian::write_i32(&mut header[32..36], ny as i32);
        LittleEndian::write_i32(&mut header[36..40], nz as i32);
        LittleEndian::write_f32(&mut header[40..44], nx as f32 * spacing);
        LittleEndian::write_f32(&mut header[44..48], ny as f32 * spacing);
        LittleEndian::write_f32(&mut header[48..52], nz as f32 * spacing);
        header[MAP_OFFSET..MAP_OFFSET + 4].copy_from_slice(b"MAP ");
        header[MACHST_OFFSET] = 0x44;
        header[MACHST_OFFSET + 1] = 0x44;
        write_data(&mut header);
        header
    }
}
