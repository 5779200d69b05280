//! Per-file TOML sidecar (`<image>.fender.toml`) describing a prediction run.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::detections::{Damage, Plate};

/// Root of the sidecar file. Kept as a struct of optional sections so a
/// future tool can add its own section without clobbering this one.
#[derive(Serialize, Deserialize, Default, Debug)]
pub struct FenderMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predict: Option<PredictSections>,
}

/// Everything recorded for one prediction run of one image.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct PredictSections {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub damages: Vec<Damage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plates: Vec<Plate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<toml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionContext>,
}

/// Execution context for a tool invocation
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ExecutionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fender_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_line: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

/// Load existing metadata from a file, or create new empty metadata.
/// A sidecar that no longer parses is dropped with a warning rather than
/// blocking the run.
pub fn load_or_create_metadata(path: &Path) -> Result<FenderMetadata> {
    if path.exists() {
        let content = fs::read_to_string(path)?;
        match toml::from_str::<FenderMetadata>(&content) {
            Ok(metadata) => Ok(metadata),
            Err(e) => {
                let colored_error = crate::color_utils::colors::warning_level(&e.to_string());
                warn!(
                    "{} Dropping existing metadata from {}:\n{}",
                    crate::color_utils::symbols::warning(),
                    path.display(),
                    colored_error
                );
                Ok(FenderMetadata::default())
            }
        }
    } else {
        Ok(FenderMetadata::default())
    }
}

pub fn save_metadata(metadata: &FenderMetadata, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(metadata)?;
    fs::write(path, content)?;
    Ok(())
}

/// Merge this run's predict section into the sidecar and write it back.
pub fn save_predict_sections(path: &Path, sections: PredictSections) -> Result<()> {
    let mut metadata = load_or_create_metadata(path)?;
    metadata.predict = Some(sections);
    save_metadata(&metadata, path)?;
    log::debug!("📋 Saved run metadata to: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detections::aggregate;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn sections_with_one_damage() -> PredictSections {
        let result = aggregate(
            json!({"damages": [{"file": "a.jpg", "coords": [10.0, 10.0, 50.0, 50.0], "type": "hood_damage", "action": "REPLACE", "severity": "0.7"}]}),
            Value::Null,
        );
        PredictSections {
            damages: result.damages,
            plates: Vec::new(),
            config: None,
            execution: Some(ExecutionContext {
                timestamp: Some(Utc::now()),
                fender_version: Some("0.4.0".to_string()),
                command_line: Some(vec!["fender".to_string(), "predict".to_string()]),
                api_url: Some("http://127.0.0.1:5000/".to_string()),
            }),
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("car.fender.toml");

        save_predict_sections(&path, sections_with_one_damage()).unwrap();

        let loaded = load_or_create_metadata(&path).unwrap();
        let predict = loaded.predict.unwrap();
        assert_eq!(predict.damages.len(), 1);
        assert_eq!(predict.damages[0].kind, "hood_damage");
        assert_eq!(
            predict.execution.unwrap().api_url.as_deref(),
            Some("http://127.0.0.1:5000/")
        );
    }

    #[test]
    fn test_unparseable_sidecar_is_dropped_not_fatal() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("car.fender.toml");
        fs::write(&path, "this is { not toml").unwrap();

        let metadata = load_or_create_metadata(&path).unwrap();
        assert!(metadata.predict.is_none());

        // A fresh save over the broken file works
        save_predict_sections(&path, sections_with_one_damage()).unwrap();
        let loaded = load_or_create_metadata(&path).unwrap();
        assert!(loaded.predict.is_some());
    }

    #[test]
    fn test_missing_file_creates_default() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nope.fender.toml");
        let metadata = load_or_create_metadata(&path).unwrap();
        assert!(metadata.predict.is_none());
    }
}
