//! Batch upload against the two prediction endpoints.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::color_utils::symbols;
use crate::detections::{aggregate, BatchResult};
use crate::transport::Transport;

pub const DAMAGES_ENDPOINT: &str = "predict_damages";
pub const PLATES_ENDPOINT: &str = "predict_plates";

/// One user-selected image, held in memory for the duration of a batch.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// Multipart filename; the server tags every detection with it, so it
    /// must be unique within the batch.
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Input path has no usable file name: {}", path.display()))?
            .to_string();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read image {}", path.display()))?;
        Ok(Self { name, bytes })
    }
}

/// Read a set of image paths into memory, preserving order.
///
/// Detections are joined back to their image purely by file name, so two
/// inputs sharing a basename would produce ambiguous results; that is a hard
/// error regardless of permissive mode.
pub fn load_upload_files(paths: &[PathBuf]) -> Result<Vec<UploadFile>> {
    let mut seen = HashSet::new();
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let file = UploadFile::from_path(path)?;
        if !seen.insert(file.name.clone()) {
            return Err(anyhow!(
                "Duplicate file name '{}' in batch; results are joined by file name, rename one of the inputs",
                file.name
            ));
        }
        files.push(file);
    }
    Ok(files)
}

/// Optional customer car details forwarded with the damages request.
#[derive(Debug, Clone, Default)]
pub struct CarInfo {
    pub trade: Option<String>,
    pub model: Option<String>,
    pub year: Option<String>,
}

fn endpoint_url(api_url: &str, endpoint: &str) -> String {
    format!("{}/{}", api_url.trim_end_matches('/'), endpoint)
}

/// Build the multipart body: every batch file as a repeated `file` part with
/// its filename preserved, plus any car-info text fields.
fn multipart_form(files: &[UploadFile], car_info: Option<&CarInfo>) -> Result<Form> {
    let mut form = Form::new();
    for file in files {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str("application/octet-stream")?;
        form = form.part("file", part);
    }
    if let Some(info) = car_info {
        if let Some(trade) = &info.trade {
            form = form.text("trade", trade.clone());
        }
        if let Some(model) = &info.model {
            form = form.text("model", model.clone());
        }
        if let Some(year) = &info.year {
            form = form.text("year", year.clone());
        }
    }
    Ok(form)
}

/// POST the batch to one endpoint and return the response body as JSON.
///
/// A response that arrives is never retried, whatever its status: non-2xx
/// statuses and unparseable bodies degrade to `Value::Null` (empty
/// detections downstream) with a warning. Only transport-level failure is
/// an error, and it is terminal for the batch.
fn fetch_predictions(
    transport: &Transport,
    url: &str,
    files: &[UploadFile],
    car_info: Option<&CarInfo>,
) -> Result<Value> {
    let response = transport.post_multipart(url, || multipart_form(files, car_info))?;
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("Failed to read response body from {url}"))?;

    if !status.is_success() {
        log::warn!(
            "{} {url} returned HTTP {status}; treating the response as empty predictions",
            symbols::warning()
        );
    }

    match serde_json::from_str(&body) {
        Ok(value) => Ok(value),
        Err(e) => {
            log::warn!(
                "{} Response from {url} is not valid JSON ({e}); treating as empty predictions",
                symbols::warning()
            );
            Ok(Value::Null)
        }
    }
}

/// Upload a whole batch and merge the responses.
///
/// Exactly two requests are issued per batch, each carrying all files:
/// the damages endpoint first, then the plates endpoint. The order is a
/// contract of the remote API; the calls are sequential, never concurrent.
/// If either call fails terminally the batch produces no result at all.
pub fn upload_batch(
    transport: &Transport,
    api_url: &str,
    files: &[UploadFile],
    car_info: Option<&CarInfo>,
) -> Result<BatchResult> {
    log::info!(
        "{} Uploading {} file(s) to {}",
        symbols::upload_start(),
        files.len(),
        api_url
    );

    let raw_damages = fetch_predictions(
        transport,
        &endpoint_url(api_url, DAMAGES_ENDPOINT),
        files,
        car_info,
    )?;
    let raw_plates = fetch_predictions(
        transport,
        &endpoint_url(api_url, PLATES_ENDPOINT),
        files,
        None,
    )?;

    Ok(aggregate(raw_damages, raw_plates))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_normalizes_trailing_slash() {
        assert_eq!(
            endpoint_url("http://127.0.0.1:5000/", DAMAGES_ENDPOINT),
            "http://127.0.0.1:5000/predict_damages"
        );
        assert_eq!(
            endpoint_url("http://127.0.0.1:5000", PLATES_ENDPOINT),
            "http://127.0.0.1:5000/predict_plates"
        );
    }

    #[test]
    fn test_load_upload_files_rejects_duplicate_names() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir_a = temp_dir.path().join("a");
        let dir_b = temp_dir.path().join("b");
        std::fs::create_dir_all(&dir_a).unwrap();
        std::fs::create_dir_all(&dir_b).unwrap();
        std::fs::write(dir_a.join("car.jpg"), b"one").unwrap();
        std::fs::write(dir_b.join("car.jpg"), b"two").unwrap();

        let paths = vec![dir_a.join("car.jpg"), dir_b.join("car.jpg")];
        let err = load_upload_files(&paths).unwrap_err();
        assert!(err.to_string().contains("Duplicate file name"));
    }

    #[test]
    fn test_load_upload_files_preserves_order() {
        let temp_dir = tempfile::tempdir().unwrap();
        let front = temp_dir.path().join("front.jpg");
        let rear = temp_dir.path().join("rear.jpg");
        std::fs::write(&front, b"front bytes").unwrap();
        std::fs::write(&rear, b"rear bytes").unwrap();

        let files = load_upload_files(&[front, rear]).unwrap();
        assert_eq!(files[0].name, "front.jpg");
        assert_eq!(files[1].name, "rear.jpg");
        assert_eq!(files[0].bytes, b"front bytes");
    }
}
