//! Reader for NumPy `.npy` arrays holding a pre-decoded volume.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::LazyLock;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt};
use ndarray::{Array3, ShapeBuilder};
use regex::Regex;

use crate::error::{DatasetError, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";

static DESCR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'descr'\s*:\s*'([^']+)'").expect("descr pattern is valid"));
static FORTRAN_ORDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'fortran_order'\s*:\s*(True|False)").expect("fortran_order pattern is valid")
});
static SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"'shape'\s*:\s*\(([^)]*)\)").expect("shape pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Int,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dtype {
    kind: Kind,
    size: usize,
    big_endian: bool,
}

impl Dtype {
    fn parse(descr: &str, path: &Path) -> Result<Self> {
        let unsupported = || DatasetError::unsupported(path, format!("dtype {descr:?}"));
        let mut chars = descr.chars();
        let order = chars.next().ok_or_else(unsupported)?;
        let kind = match chars.next().ok_or_else(unsupported)? {
            'f' => Kind::Float,
            'i' => Kind::Int,
            'u' => Kind::Uint,
            _ => return Err(unsupported()),
        };
        let size: usize = chars.as_str().parse().map_err(|_| unsupported())?;
        let supported = matches!(
            (kind, size),
            (Kind::Float, 4 | 8) | (Kind::Int, 1 | 2 | 4) | (Kind::Uint, 1 | 2 | 4)
        );
        if !supported || !matches!(order, '<' | '>' | '|' | '=') {
            return Err(unsupported());
        }

        Ok(Self {
            kind,
            size,
            big_endian: order == '>',
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    pub dtype: Dtype,
    pub fortran_order: bool,
    pub shape: [usize; 3],
    /// Where the array data starts in the file.
    pub data_offset: u64,
}

pub fn read_header(path: &Path) -> Result<NpyHeader> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    parse_header(&mut BufReader::new(file), path, file_len)
}

pub fn read_volume(path: &Path) -> Result<(NpyHeader, Array3<f32>)> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader, path, file_len)?;

    let data_len = header
        .shape
        .iter()
        .try_fold(header.dtype.size, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| {
            DatasetError::malformed(path, format!("shape {:?} overflows the data size", header.shape))
        })?;
    let available = file_len.saturating_sub(header.data_offset);
    if (data_len as u64) > available {
        return Err(DatasetError::malformed(
            path,
            format!("header promises {data_len} data bytes, file has {available}"),
        ));
    }

    let mut raw = vec![0u8; data_len];
    reader
        .read_exact(&mut raw)
        .map_err(|_| DatasetError::malformed(path, "truncated array data"))?;

    let values = if header.dtype.big_endian {
        decode::<BigEndian>(&raw, header.dtype)
    } else {
        decode::<LittleEndian>(&raw, header.dtype)
    };

    let data = if header.fortran_order {
        Array3::from_shape_vec(header.shape.f(), values)
    } else {
        Array3::from_shape_vec(header.shape, values)
    }
    .map_err(|e| DatasetError::malformed(path, e.to_string()))?;

    Ok((header, data.as_standard_layout().into_owned()))
}

fn parse_header<R: Read>(reader: &mut R, path: &Path, file_len: u64) -> Result<NpyHeader> {
    let mut magic = [0u8; 6];
    reader
        .read_exact(&mut magic)
        .map_err(|_| DatasetError::malformed(path, "file too small for a .npy header"))?;
    if &magic != MAGIC {
        return Err(DatasetError::malformed(path, "missing NUMPY magic"));
    }

    let major = reader.read_u8()?;
    let _minor = reader.read_u8()?;
    let (header_len, prefix_len) = match major {
        1 => (reader.read_u16::<LittleEndian>()? as u64, 10),
        2 | 3 => (reader.read_u32::<LittleEndian>()? as u64, 12),
        other => {
            return Err(DatasetError::unsupported(
                path,
                format!(".npy format version {other}"),
            ));
        }
    };
    let data_offset = prefix_len + header_len;
    if data_offset > file_len {
        return Err(DatasetError::malformed(path, "truncated .npy header"));
    }
    let header_len = header_len as usize;

    let mut text = vec![0u8; header_len];
    reader
        .read_exact(&mut text)
        .map_err(|_| DatasetError::malformed(path, "truncated .npy header"))?;
    let text = String::from_utf8_lossy(&text);

    let descr = capture(&DESCR, &text)
        .ok_or_else(|| DatasetError::malformed(path, "missing descr"))?;
    let fortran_order = capture(&FORTRAN_ORDER, &text)
        .ok_or_else(|| DatasetError::malformed(path, "missing fortran_order"))?
        == "True";
    let shape_text = capture(&SHAPE, &text)
        .ok_or_else(|| DatasetError::malformed(path, "missing shape"))?;

    let dims = shape_text
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| DatasetError::malformed(path, format!("bad shape ({shape_text})")))?;
    let shape: [usize; 3] = dims.as_slice().try_into().map_err(|_| {
        DatasetError::unsupported(path, format!("expected a 3D array, got shape {dims:?}"))
    })?;

    Ok(NpyHeader {
        dtype: Dtype::parse(&descr, path)?,
        fortran_order,
        shape,
        data_offset,
    })
}

fn capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn decode<B: ByteOrder>(raw: &[u8], dtype: Dtype) -> Vec<f32> {
    match (dtype.kind, dtype.size) {
        (Kind::Float, 4) => {
            let mut values = vec![0f32; raw.len() / 4];
            B::read_f32_into(raw, &mut values);
            values
        }
        (Kind::Float, _) => {
            let mut values = vec![0f64; raw.len() / 8];
            B::read_f64_into(raw, &mut values);
            values.into_iter().map(|v| v as f32).collect()
        }
        (Kind::Int, 1) => bytemuck::cast_slice::<u8, i8>(raw)
            .iter()
            .map(|&v| f32::from(v))
            .collect(),
        (Kind::Uint, 1) => raw.iter().map(|&v| f32::from(v)).collect(),
        (Kind::Int, 2) => {
            let mut values = vec![0i16; raw.len() / 2];
            B::read_i16_into(raw, &mut values);
            values.into_iter().map(f32::from).collect()
        }
        (Kind::Uint, 2) => {
            let mut values = vec![0u16; raw.len() / 2];
            B::read_u16_into(raw, &mut values);
            values.into_iter().map(f32::from).collect()
        }
        (Kind::Int, _) => {
            let mut values = vec![0i32; raw.len() / 4];
            B::read_i32_into(raw, &mut values);
            values.into_iter().map(|v| v as f32).collect()
        }
        (Kind::Uint, _) => {
            let mut values = vec![0u32; raw.len() / 4];
            B::read_u32_into(raw, &mut values);
            values.into_iter().map(|v| v as f32).collect()
        }
    }
}
