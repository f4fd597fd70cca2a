//! Camera calibration parameters.
//!
//! The CLI takes the YAML file produced by OpenCV's calibration tool and
//! hands the parsed intrinsics to the renderer factory. Calibration math
//! itself lives in the renderer, not here.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Row-major matrix as serialized by OpenCV's `FileStorage`.
#[derive(Debug, Clone, Deserialize)]
pub struct CvMatrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraParameters {
    pub image_width: u32,
    pub image_height: u32,
    pub camera_matrix: CvMatrix,
    #[serde(default)]
    pub distortion_coefficients: Option<CvMatrix>,
}

/// Load camera parameters from an OpenCV calibration YAML file.
///
/// OpenCV prefixes its output with a `%YAML:1.0` directive that standard
/// YAML parsers reject; the directive line is stripped before parsing.
pub fn load(path: &Path) -> Result<CameraParameters> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read camera parameters {}", path.display()))?;
    let cleaned: String = raw
        .lines()
        .filter(|line| !line.starts_with("%YAML"))
        .collect::<Vec<_>>()
        .join("\n");
    let params: CameraParameters = serde_yaml::from_str(&cleaned)
        .with_context(|| format!("malformed camera parameters {}", path.display()))?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_opencv_style_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "%YAML:1.0\n---\n\
             image_width: 640\n\
             image_height: 480\n\
             camera_matrix:\n\
             \x20\x20rows: 3\n\
             \x20\x20cols: 3\n\
             \x20\x20data: [500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0]\n"
        )
        .unwrap();

        let params = load(file.path()).unwrap();
        assert_eq!(params.image_width, 640);
        assert_eq!(params.camera_matrix.data.len(), 9);
        assert!(params.distortion_coefficients.is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/camera.yaml")).is_err());
    }
}
