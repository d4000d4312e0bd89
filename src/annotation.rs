//! Named point annotations attached to a tomogram.
//!
//! Points are always stored in array index order, (z, y, x) for IMOD models
//! and (z, x, y) for portal ndjson files. The two orders differ and both are
//! kept as-is because downstream consumers depend on them.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::enums::AnnotationFormat;
use crate::error::{DatasetError, Result};
use crate::imod;

pub type Point = [f64; 3];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationSource {
    pub path: PathBuf,
    pub format: AnnotationFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    points: Vec<Point>,
    name: String,
    source: Option<AnnotationSource>,
    parent_shape: Option<[usize; 3]>,
}

#[derive(Deserialize)]
struct NdjsonRecord {
    #[serde(rename = "type")]
    kind: Option<String>,
    location: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct NdjsonLocation {
    x: f64,
    y: f64,
    z: f64,
}

impl Annotation {
    pub fn new(points: Vec<Point>, name: impl Into<String>) -> Self {
        Self {
            points,
            name: name.into(),
            source: None,
            parent_shape: None,
        }
    }

    /// Parse an annotation file, choosing the parser from its extension.
    pub fn from_file(path: impl AsRef<Path>, name: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let format =
            AnnotationFormat::from_path(path).ok_or_else(|| DatasetError::InvalidFormat {
                path: path.to_path_buf(),
                expected: ".mod or .ndjson",
            })?;

        let (points, parent_shape) = match format {
            AnnotationFormat::Mod => {
                let model = imod::read_model(path)?;
                (
                    model.points().into_iter().map(zyx_from_xyz).collect(),
                    model.header.map(|h| h.parent_shape()),
                )
            }
            AnnotationFormat::Ndjson => (Self::ndjson_points(path)?, None),
        };
        debug!(path = %path.display(), points = points.len(), "Loaded annotation");

        Ok(Self {
            points,
            name: name.into(),
            source: Some(AnnotationSource {
                path: path.to_path_buf(),
                format,
            }),
            parent_shape,
        })
    }

    /// Fail with [`DatasetError::InvalidFormat`] unless `path` has the
    /// extension of `expected`.
    pub fn check_extension(path: impl AsRef<Path>, expected: AnnotationFormat) -> Result<()> {
        let path = path.as_ref();
        if AnnotationFormat::from_path(path) == Some(expected) {
            Ok(())
        } else {
            Err(DatasetError::InvalidFormat {
                path: path.to_path_buf(),
                expected: expected.extension(),
            })
        }
    }

    /// Points of an IMOD model, permuted from (x, y, z) to (z, y, x).
    pub fn mod_points(path: impl AsRef<Path>) -> Result<Vec<Point>> {
        let path = path.as_ref();
        Self::check_extension(path, AnnotationFormat::Mod)?;
        let model = imod::read_model(path)?;
        Ok(model.points().into_iter().map(zyx_from_xyz).collect())
    }

    /// `orientedPoint` locations of a portal ndjson file, as (z, x, y).
    pub fn ndjson_points(path: impl AsRef<Path>) -> Result<Vec<Point>> {
        let path = path.as_ref();
        Self::check_extension(path, AnnotationFormat::Ndjson)?;
        parse_ndjson(BufReader::new(File::open(path)?))
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&AnnotationSource> {
        self.source.as_ref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Shape of the tomogram this annotation was drawn on, from the IMOD
    /// header bounds as `(zmax, xmax, ymax)`.
    pub fn infer_parent_shape(&self) -> Result<[usize; 3]> {
        match (&self.source, self.parent_shape) {
            (Some(source), Some(shape)) if source.format == AnnotationFormat::Mod => Ok(shape),
            (Some(_), _) => Err(DatasetError::UnsupportedOperation(
                "only .mod annotations carry the parent tomogram shape",
            )),
            (None, _) => Err(DatasetError::UnsupportedOperation(
                "in-memory annotations carry no parent tomogram shape",
            )),
        }
    }

    pub fn can_infer_parent_shape(&self) -> bool {
        self.infer_parent_shape().is_ok()
    }
}

/// Concatenate the points of every annotation, in order.
pub fn concat_points(annotations: &[Annotation]) -> Vec<Point> {
    annotations
        .iter()
        .flat_map(|a| a.points().iter().copied())
        .collect()
}

fn zyx_from_xyz(p: [f32; 3]) -> Point {
    [p[2] as f64, p[1] as f64, p[0] as f64]
}

pub(crate) fn parse_ndjson<R: BufRead>(reader: R) -> Result<Vec<Point>> {
    let mut points = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: NdjsonRecord = serde_json::from_str(&line)?;
        if record.kind.as_deref() != Some("orientedPoint") {
            continue;
        }
        let Some(location) = record.location.filter(|l| !l.is_null()) else {
            continue;
        };
        let location: NdjsonLocation = serde_json::from_value(location)?;
        points.push([location.z, location.x, location.y]);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imod::fixtures::ModelBuilder;
    use tempfile::TempDir;

    const NDJSON: &str = concat!(
        r#"{"type": "orientedPoint", "location": {"x": 100, "y": 110, "z": 120}, "xyz_rotation_matrix": [[1,0,0],[0,1,0],[0,0,1]]}"#,
        "\n",
        r#"{"type": "point", "location": {"x": 1, "y": 2, "z": 3}}"#,
        "\n\n",
        r#"{"type": "orientedPoint", "location": {"x": 200, "y": 210, "z": 220}}"#,
        "\n",
    );

    #[test]
    fn test_check_extension() {
        let fake_mod = "testing/file/path/with/a/mod/file/test.mod";
        assert!(Annotation::check_extension(fake_mod, AnnotationFormat::Mod).is_ok());
        let err = Annotation::check_extension(fake_mod, AnnotationFormat::Ndjson).unwrap_err();
        assert!(err.to_string().contains("Annotation must be a .ndjson file"));

        let fake_ndjson = "j.ndjson";
        assert!(Annotation::check_extension(fake_ndjson, AnnotationFormat::Ndjson).is_ok());
        assert!(matches!(
            Annotation::check_extension(fake_ndjson, AnnotationFormat::Mod),
            Err(DatasetError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_ndjson_points_put_z_first() {
        let points = parse_ndjson(NDJSON.as_bytes()).unwrap();
        assert_eq!(points, vec![[120.0, 100.0, 110.0], [220.0, 200.0, 210.0]]);
    }

    #[test]
    fn test_ndjson_malformed_line() {
        let err = parse_ndjson("{not json}\n".as_bytes()).unwrap_err();
        assert!(matches!(err, DatasetError::Json(_)));
    }

    #[test]
    fn test_from_file_mod() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("FM.mod");
        let bytes = ModelBuilder::new(318, 319, 109)
            .object()
            .contour(&[[10.0, 20.0, 30.0]])
            .finish();
        std::fs::write(&path, bytes).unwrap();

        let annotation = Annotation::from_file(&path, "Flagellar Motor").unwrap();
        assert_eq!(annotation.name(), "Flagellar Motor");
        assert_eq!(annotation.points(), &[[30.0, 20.0, 10.0]]);
        assert_eq!(annotation.infer_parent_shape().unwrap(), [109, 318, 319]);
        assert_eq!(annotation.source().unwrap().path, path);
        assert_eq!(Annotation::mod_points(&path).unwrap(), annotation.points());
    }

    #[test]
    fn test_from_file_ndjson_cannot_infer_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("points.ndjson");
        std::fs::write(&path, NDJSON).unwrap();

        let annotation = Annotation::from_file(&path, "motor").unwrap();
        assert_eq!(annotation.len(), 2);
        assert!(matches!(
            annotation.infer_parent_shape(),
            Err(DatasetError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_from_file_unknown_extension() {
        let err = Annotation::from_file("points.csv", "x").unwrap_err();
        assert!(matches!(err, DatasetError::InvalidFormat { .. }));
    }

    #[test]
    fn test_in_memory_annotation() {
        let annotation = Annotation::new(vec![[1.0, 2.0, 3.0]], "0");
        assert!(annotation.source().is_none());
        assert!(!annotation.can_infer_parent_shape());
        assert!(!annotation.is_empty());
    }

    #[test]
    fn test_concat_points_keeps_order() {
        let annotations = vec![
            Annotation::new(vec![[1.0, 1.0, 1.0]], "a"),
            Annotation::new(vec![], "empty"),
            Annotation::new(vec![[2.0, 2.0, 2.0], [3.0, 3.0, 3.0]], "b"),
        ];
        let points = concat_points(&annotations);
        assert_eq!(points.len(), 3);
        assert_eq!(points[2], [3.0, 3.0, 3.0]);
    }
}
