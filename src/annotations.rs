//! Pose annotations for the background photographs.
//!
//! The capture rig records one CSV row per photograph:
//! `filename, tx, ty, tz, qx, qy, qz, qw`. The first line is a header.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use nalgebra::{Quaternion, Vector3};
use thiserror::Error;

/// Camera/drone pose recorded when the background photograph was captured.
///
/// The quaternion is stored exactly as parsed; no normalization is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundPose {
    pub translation: Vector3<f64>,
    pub orientation: Quaternion<f64>,
}

/// Lookup from background filename to its capture pose.
pub type PoseTable = HashMap<String, BackgroundPose>;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("annotations file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed annotation record at {path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },
}

/// Parse an `annotations.csv` file into a pose table.
///
/// The header line is discarded. Rows with fewer than eight fields or
/// non-numeric pose components are rejected. Extra trailing fields are
/// ignored.
pub fn parse(path: &Path) -> Result<PoseTable, AnnotationError> {
    if !path.is_file() {
        return Err(AnnotationError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|source| AnnotationError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut table = PoseTable::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| AnnotationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if idx == 0 {
            // Header row.
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let (filename, pose) = parse_record(&line).map_err(|reason| AnnotationError::Parse {
            path: path.to_path_buf(),
            line: idx + 1,
            reason,
        })?;
        table.insert(filename, pose);
    }

    Ok(table)
}

fn parse_record(line: &str) -> Result<(String, BackgroundPose), String> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 8 {
        return Err(format!("expected 8 fields, got {}", fields.len()));
    }
    let mut values = [0f64; 7];
    for (slot, field) in values.iter_mut().zip(&fields[1..8]) {
        *slot = field
            .parse::<f64>()
            .map_err(|e| format!("invalid number {field:?}: {e}"))?;
    }
    let [tx, ty, tz, qx, qy, qz, qw] = values;
    Ok((
        fields[0].to_string(),
        BackgroundPose {
            translation: Vector3::new(tx, ty, tz),
            // nalgebra orders quaternions (w, i, j, k); the CSV stores x,y,z,w.
            orientation: Quaternion::new(qw, qx, qy, qz),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_rows_and_skips_header() {
        let csv = write_csv(
            "filename,tx,ty,tz,qx,qy,qz,qw\n\
             img_0.jpg, 1.0, -2.5, 0.25, 0.0, 0.0, 0.0, 1.0\n\
             img_1.jpg,0,0,1,0.5,0.5,0.5,0.5\n",
        );
        let table = parse(csv.path()).unwrap();
        assert_eq!(table.len(), 2);

        let pose = &table["img_0.jpg"];
        assert_eq!(pose.translation, Vector3::new(1.0, -2.5, 0.25));
        assert_eq!(pose.orientation, Quaternion::new(1.0, 0.0, 0.0, 0.0));
    }

    #[test]
    fn missing_file_is_not_found() {
        let err = parse(Path::new("/nonexistent/annotations.csv")).unwrap_err();
        assert!(matches!(err, AnnotationError::NotFound(_)));
    }

    #[test]
    fn malformed_number_is_a_parse_error() {
        let csv = write_csv("header\nimg.jpg,1,2,three,0,0,0,1\n");
        let err = parse(csv.path()).unwrap_err();
        match err {
            AnnotationError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn short_row_is_a_parse_error() {
        let csv = write_csv("header\nimg.jpg,1,2,3\n");
        assert!(matches!(
            parse(csv.path()),
            Err(AnnotationError::Parse { .. })
        ));
    }

    #[test]
    fn quaternion_is_stored_unnormalized() {
        let csv = write_csv("header\nimg.jpg,0,0,0,2,0,0,2\n");
        let table = parse(csv.path()).unwrap();
        assert_eq!(
            table["img.jpg"].orientation,
            Quaternion::new(2.0, 2.0, 0.0, 0.0)
        );
    }
}
