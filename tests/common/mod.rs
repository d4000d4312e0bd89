//! Writers for tiny scan and annotation files.

#![allow(dead_code)] // Not every test binary uses every writer

use std::fs;
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};

pub fn write(path: &Path, bytes: &[u8]) -> PathBuf {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

/// Deterministic, non-constant test data.
pub fn ramp(len: usize) -> Vec<f32> {
    (0..len).map(|i| ((i * 37) % 101) as f32 - 20.0).collect()
}

/// Little-endian float32 MRC2014 file with isotropic spacing.
pub fn mrc(shape: [usize; 3], values: &[f32], spacing: f32) -> Vec<u8> {
    let [nz, ny, nx] = shape;
    let mut bytes = vec![0u8; 1024];
    for (i, v) in [nx, ny, nz].iter().enumerate() {
        LittleEndian::write_i32(&mut bytes[i * 4..i * 4 + 4], *v as i32);
        LittleEndian::write_i32(&mut bytes[28 + i * 4..32 + i * 4], *v as i32);
        LittleEndian::write_f32(&mut bytes[40 + i * 4..44 + i * 4], *v as f32 * spacing);
    }
    LittleEndian::write_i32(&mut bytes[12..16], 2);
    bytes[208..212].copy_from_slice(b"MAP ");
    bytes[212] = 0x44;
    bytes[213] = 0x44;
    for v in values {
        bytes.write_f32::<LittleEndian>(*v).unwrap();
    }
    bytes
}

/// Version 1.0 `.npy` of little-endian float32 in C order.
pub fn npy(shape: [usize; 3], values: &[f32]) -> Vec<u8> {
    let mut dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}, {}), }}",
        shape[0], shape[1], shape[2]
    );
    while (10 + dict.len() + 1) % 64 != 0 {
        dict.push(' ');
    }
    dict.push('\n');

    let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
    bytes.write_u16::<LittleEndian>(dict.len() as u16).unwrap();
    bytes.extend_from_slice(dict.as_bytes());
    for v in values {
        bytes.write_f32::<LittleEndian>(*v).unwrap();
    }
    bytes
}

/// IMOD model with one object holding one contour of `points` in (x, y, z).
pub fn imod(max: [i32; 3], points: &[[f32; 3]]) -> Vec<u8> {
    let mut bytes = b"IMODV1.2".to_vec();
    bytes.extend_from_slice(&[0u8; 128]);
    let mut tail = [0u8; 104];
    BigEndian::write_i32(&mut tail[0..4], max[0]);
    BigEndian::write_i32(&mut tail[4..8], max[1]);
    BigEndian::write_i32(&mut tail[8..12], max[2]);
    BigEndian::write_i32(&mut tail[12..16], 1);
    bytes.extend_from_slice(&tail);

    bytes.extend_from_slice(b"OBJT");
    bytes.extend_from_slice(&[0u8; 176]);

    bytes.extend_from_slice(b"CONT");
    bytes.write_i32::<BigEndian>(points.len() as i32).unwrap();
    bytes.extend_from_slice(&[0u8; 12]);
    for p in points {
        for v in p {
            bytes.write_f32::<BigEndian>(*v).unwrap();
        }
    }

    bytes.extend_from_slice(b"IEOF");
    bytes
}

/// CryoET Data Portal style annotation lines, points given in (x, y, z).
pub fn ndjson(points: &[[f64; 3]]) -> Vec<u8> {
    let mut text = String::new();
    for [x, y, z] in points {
        let line = serde_json::json!({
            "type": "orientedPoint",
            "location": { "x": x, "y": y, "z": z },
            "xyz_rotation_matrix": [[1, 0, 0], [0, 1, 0], [0, 0, 1]],
        });
        text.push_str(&line.to_string());
        text.push('\n');
    }
    text.push('\n');
    text.into_bytes()
}
