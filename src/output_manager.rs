//! Output path management.
//!
//! Handles where generated files land:
//! - With `--output-dir`, outputs get clean names inside that directory
//! - Without it, outputs sit next to their input with a suffix
//! - Metadata sidecars always keep the `.fender.toml` extension

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::PredictConfig;

pub struct OutputManager<'a> {
    config: &'a PredictConfig,
    input_path: &'a Path,
}

impl<'a> OutputManager<'a> {
    pub fn new(config: &'a PredictConfig, input_path: &'a Path) -> Self {
        Self { config, input_path }
    }

    /// Get the input file stem (filename without extension)
    fn input_stem(&self) -> &str {
        self.input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output")
    }

    fn place(&self, filename: &str) -> Result<PathBuf> {
        if let Some(output_dir) = &self.config.base.output_dir {
            let output_dir = Path::new(output_dir);
            std::fs::create_dir_all(output_dir)?;
            Ok(output_dir.join(filename))
        } else {
            Ok(self
                .input_path
                .parent()
                .unwrap_or(Path::new("."))
                .join(filename))
        }
    }

    /// Path for the annotated overlay image. PNG inputs stay PNG to keep
    /// transparency; everything else becomes JPEG.
    pub fn annotated_image_path(&self) -> Result<PathBuf> {
        let extension = annotated_extension(self.input_path);
        let stem = self.input_stem();
        let filename = if self.config.base.output_dir.is_some() {
            // Clean filename when using output directory
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_annotated.{extension}")
        };
        self.place(&filename)
    }

    /// Path for the per-file metadata sidecar.
    pub fn metadata_path(&self) -> Result<PathBuf> {
        let stem = self.input_stem();
        self.place(&format!("{stem}.fender.toml"))
    }
}

/// PNG stays PNG (transparency), everything else outputs JPEG.
fn annotated_extension(input_path: &Path) -> &'static str {
    if let Some(ext) = input_path.extension() {
        if ext.to_string_lossy().to_lowercase() == "png" {
            "png"
        } else {
            "jpg"
        }
    } else {
        "jpg"
    }
}

/// Where the batch-level raw prediction dump lands.
pub fn batch_dump_path(output_dir: Option<&str>) -> PathBuf {
    match output_dir {
        Some(dir) => Path::new(dir).join("predictions.json"),
        None => PathBuf::from("predictions.json"),
    }
}
