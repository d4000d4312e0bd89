//! Reader for IMOD binary model files (`.mod`).
//!
//! Models are big-endian and chunked: a fixed header follows the `IMODV1.2`
//! magic, then tagged chunks until `IEOF`. Only what point extraction and
//! shape inference need is decoded: the header bounds, contour points and
//! slicer-angle centers. Every other chunk is skipped.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use crate::error::{DatasetError, Result};

const MAGIC: &[u8; 8] = b"IMODV1.2";
const MODEL_NAME_LEN: usize = 128;
/// Header bytes after the name: 26 four-byte fields.
const HEADER_TAIL_LEN: usize = 26 * 4;
/// Fixed size of an `OBJT` chunk body.
const OBJECT_LEN: usize = 176;
const CONTOUR_HEADER_LEN: usize = 16;
const MESH_HEADER_LEN: usize = 16;
const SLICER_LABEL_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelHeader {
    pub xmax: i32,
    pub ymax: i32,
    pub zmax: i32,
    pub objects: i32,
}

impl ModelHeader {
    /// Shape of the volume the model was drawn on, as `(zmax, xmax, ymax)`.
    pub fn parent_shape(&self) -> [usize; 3] {
        [self.zmax, self.xmax, self.ymax].map(|v| v.max(0) as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlicerAngle {
    pub time: i32,
    pub angles: [f32; 3],
    /// Center in (x, y, z)
    pub center: [f32; 3],
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub header: Option<ModelHeader>,
    /// Contour points in (x, y, z)
    pub contour_points: Vec<[f32; 3]>,
    pub slicer_angles: Vec<SlicerAngle>,
}

impl Model {
    /// Points to use as annotation points, in (x, y, z).
    ///
    /// Slicer-angle centers take precedence when the model has any.
    pub fn points(&self) -> Vec<[f32; 3]> {
        if self.slicer_angles.is_empty() {
            self.contour_points.clone()
        } else {
            self.slicer_angles.iter().map(|s| s.center).collect()
        }
    }
}

pub fn read_model(path: &Path) -> Result<Model> {
    let mut reader = BufReader::new(File::open(path)?);
    parse_model(&mut reader, path)
}

pub(crate) fn parse_model<R: Read>(reader: &mut R, path: &Path) -> Result<Model> {
    let header = parse_header(reader, path)?;
    let mut model = Model {
        header: Some(header),
        ..Model::default()
    };

    loop {
        let mut tag = [0u8; 4];
        match reader.read_exact(&mut tag) {
            Ok(()) => {}
            // Some writers omit the trailer.
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        match &tag {
            b"IEOF" => break,
            b"OBJT" => skip(reader, OBJECT_LEN as u64, path)?,
            b"CONT" => read_contour(reader, &mut model, path)?,
            b"MESH" => skip_mesh(reader, path)?,
            b"SLAN" => read_slicer_angle(reader, &mut model, path)?,
            _ => {
                let size = read_i32(reader, path)?;
                if size < 0 {
                    return Err(DatasetError::malformed(
                        path,
                        format!("negative size for chunk {}", String::from_utf8_lossy(&tag)),
                    ));
                }
                skip(reader, size as u64, path)?;
            }
        }
    }

    Ok(model)
}

fn parse_header<R: Read>(reader: &mut R, path: &Path) -> Result<ModelHeader> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|_| DatasetError::malformed(path, "file too small for an IMOD header"))?;
    if &magic != MAGIC {
        return Err(DatasetError::malformed(path, "missing IMODV1.2 magic"));
    }

    skip(reader, MODEL_NAME_LEN as u64, path)?;

    let mut tail = [0u8; HEADER_TAIL_LEN];
    reader
        .read_exact(&mut tail)
        .map_err(|_| DatasetError::malformed(path, "truncated IMOD header"))?;
    let mut fields = &tail[..];
    let xmax = fields.read_i32::<BigEndian>()?;
    let ymax = fields.read_i32::<BigEndian>()?;
    let zmax = fields.read_i32::<BigEndian>()?;
    let objects = fields.read_i32::<BigEndian>()?;

    Ok(ModelHeader {
        xmax,
        ymax,
        zmax,
        objects,
    })
}

fn read_contour<R: Read>(reader: &mut R, model: &mut Model, path: &Path) -> Result<()> {
    let mut header = [0u8; CONTOUR_HEADER_LEN];
    read_exact(reader, &mut header, path)?;
    let psize = (&header[..]).read_i32::<BigEndian>()?;
    if psize < 0 {
        return Err(DatasetError::malformed(path, "negative contour size"));
    }

    let raw = read_chunk(reader, psize as u64 * 12, path)?;
    let mut coords = vec![0f32; raw.len() / 4];
    BigEndian::read_f32_into(&raw, &mut coords);
    model
        .contour_points
        .extend(coords.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
    Ok(())
}

fn skip_mesh<R: Read>(reader: &mut R, path: &Path) -> Result<()> {
    let mut header = [0u8; MESH_HEADER_LEN];
    read_exact(reader, &mut header, path)?;
    let mut fields = &header[..];
    let vsize = fields.read_i32::<BigEndian>()?;
    let lsize = fields.read_i32::<BigEndian>()?;
    if vsize < 0 || lsize < 0 {
        return Err(DatasetError::malformed(path, "negative mesh size"));
    }
    skip(reader, vsize as u64 * 12 + lsize as u64 * 4, path)
}

fn read_slicer_angle<R: Read>(reader: &mut R, model: &mut Model, path: &Path) -> Result<()> {
    let size = read_i32(reader, path)?;
    let expected = (4 + 6 * 4 + SLICER_LABEL_LEN) as i32;
    if size < expected {
        return Err(DatasetError::malformed(path, "slicer angle chunk too small"));
    }

    let body = read_chunk(reader, size as u64, path)?;
    let mut fields = &body[..];
    let time = fields.read_i32::<BigEndian>()?;
    let mut angles = [0f32; 3];
    fields.read_f32_into::<BigEndian>(&mut angles)?;
    let mut center = [0f32; 3];
    fields.read_f32_into::<BigEndian>(&mut center)?;
    let label_bytes = &fields[..SLICER_LABEL_LEN];
    let label_end = label_bytes.iter().position(|&b| b == 0).unwrap_or(SLICER_LABEL_LEN);
    let label = String::from_utf8_lossy(&label_bytes[..label_end]).into_owned();

    model.slicer_angles.push(SlicerAngle {
        time,
        angles,
        center,
        label,
    });
    Ok(())
}

fn read_i32<R: Read>(reader: &mut R, path: &Path) -> Result<i32> {
    reader
        .read_i32::<BigEndian>()
        .map_err(|_| DatasetError::malformed(path, "truncated chunk"))
}

fn read_exact<R: Read>(reader: &mut R, buf: &mut [u8], path: &Path) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|_| DatasetError::malformed(path, "truncated chunk"))
}

/// Read exactly `len` bytes, growing the buffer only as data arrives so a
/// corrupt size cannot force a huge allocation.
fn read_chunk<R: Read>(reader: &mut R, len: u64, path: &Path) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(len).read_to_end(&mut buf)?;
    if buf.len() as u64 != len {
        return Err(DatasetError::malformed(path, "truncated chunk"));
    }
    Ok(buf)
}

fn skip<R: Read>(reader: &mut R, len: u64, path: &Path) -> Result<()> {
    let copied = std::io::copy(&mut reader.take(len), &mut std::io::sink())?;
    if copied != len {
        return Err(DatasetError::malformed(path, "truncated chunk"));
    }
    Ok(())
}
