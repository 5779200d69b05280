use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for image collection behavior
#[derive(Debug, Clone)]
pub struct ImageInputConfig {
    pub require_glob_matches: bool,
    pub strict_mode: bool,
}

impl Default for ImageInputConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            require_glob_matches: true,
        }
    }
}

impl ImageInputConfig {
    /// Create a configuration for strict mode (fail on unsupported/missing files)
    pub fn strict() -> Self {
        Self {
            strict_mode: true,
            require_glob_matches: true,
        }
    }

    /// Create a configuration for permissive mode (warn and continue)
    pub fn permissive() -> Self {
        Self {
            strict_mode: false,
            require_glob_matches: false,
        }
    }

    /// Create a configuration based on strict flag
    pub fn from_strict_flag(strict: bool) -> Self {
        if strict {
            Self::strict()
        } else {
            Self::permissive()
        }
    }
}

/// Check if a file has a format the inspection API accepts.
/// Supports: bmp, dng, jpeg, jpg, mpo, png, tif, tiff, webp, pfm
pub fn is_supported_image_file(path: &Path) -> bool {
    if let Some(ext) = path.extension() {
        let ext_lower = ext.to_string_lossy().to_lowercase();
        matches!(
            ext_lower.as_str(),
            "bmp" | "dng" | "jpeg" | "jpg" | "mpo" | "png" | "tif" | "tiff" | "webp" | "pfm"
        )
    } else {
        false
    }
}

/// Find all image files in a directory (non-recursive)
pub fn find_images_in_directory(dir_path: &Path) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();

    for entry in fs::read_dir(dir_path)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && is_supported_image_file(&path) {
            image_files.push(path);
        }
    }

    // Sort for consistent ordering
    image_files.sort();
    Ok(image_files)
}

/// Collect all image files from multiple sources (files, directories, or glob patterns)
pub fn collect_images_from_sources(
    sources: &[String],
    config: &ImageInputConfig,
) -> Result<Vec<PathBuf>> {
    let mut all_image_files = Vec::new();

    for source in sources {
        let source_path = Path::new(source);

        if source_path.is_file() {
            if is_supported_image_file(source_path) {
                all_image_files.push(source_path.to_path_buf());
            } else if config.strict_mode {
                return Err(anyhow::anyhow!(
                    "File format is not accepted by the inspection API: {}",
                    source_path.display()
                ));
            }
            // In permissive mode, silently skip unsupported files
        } else if source_path.is_dir() {
            let dir_images = find_images_in_directory(source_path)?;
            all_image_files.extend(dir_images);
        } else if !source.contains('*') && !source.contains('?') && !source.contains('[') {
            // Looks like a simple file path (not a glob pattern) but doesn't exist
            if config.strict_mode {
                return Err(anyhow::anyhow!("File does not exist: {}", source));
            } else {
                log::warn!(
                    "{}File does not exist: {}",
                    crate::color_utils::symbols::warning(),
                    source
                );
            }
        } else {
            // Could be a glob pattern
            match glob::glob(source) {
                Ok(paths) => {
                    let mut found_any = false;
                    for path_result in paths {
                        match path_result {
                            Ok(path) => {
                                if path.is_file() && is_supported_image_file(&path) {
                                    all_image_files.push(path);
                                    found_any = true;
                                }
                            }
                            Err(e) => {
                                log::warn!(
                                    "{}Error reading path in glob {source}: {e}",
                                    crate::color_utils::symbols::warning()
                                );
                            }
                        }
                    }
                    if !found_any && config.require_glob_matches {
                        return Err(anyhow::anyhow!(
                            "No image files found matching pattern: {}",
                            source
                        ));
                    }
                }
                Err(_) => {
                    if config.strict_mode {
                        return Err(anyhow::anyhow!(
                            "Source path does not exist and is not a valid glob pattern: {}",
                            source
                        ));
                    } else {
                        log::warn!(
                            "{}Source path does not exist: {}",
                            crate::color_utils::symbols::warning(),
                            source
                        );
                    }
                }
            }
        }
    }

    // Sort all collected files for consistent ordering
    all_image_files.sort();

    // Remove duplicates (in case same file is specified multiple ways)
    all_image_files.dedup();

    if all_image_files.is_empty() && config.strict_mode {
        return Err(anyhow::anyhow!(
            "No image files found in the specified sources"
        ));
    }

    Ok(all_image_files)
}
