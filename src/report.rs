//! Plain-text presentation of batch results, one section per uploaded file.

use anyhow::Result;

use crate::detections::{BatchResult, Damage, Plate};
use crate::upload::UploadFile;

/// One damage as an indented bullet list. Only a fixed subset of fields is
/// shown (action, severity, type, price, file); everything else stays in
/// the raw dump.
pub fn damage_section(damage: &Damage, index: usize) -> String {
    let marker = if damage.probable_duplicate {
        " (probable duplicate)"
    } else {
        ""
    };
    let mut out = format!("  Damage {index}{marker}\n");
    out.push_str(&format!("    - action: {}\n", damage.action));
    if let Some(severity) = &damage.severity {
        out.push_str(&format!("    - severity: {severity}\n"));
    }
    out.push_str(&format!("    - type: {}\n", damage.kind));
    if let Some(price) = &damage.price {
        out.push_str(&format!("    - price: {price}\n"));
    }
    out.push_str(&format!("    - file: {}\n", damage.file));
    out
}

/// One plate as an indented bullet list; only the recognized text is shown.
pub fn plate_section(plate: &Plate, index: usize) -> String {
    format!("  Plate {index}\n    - text: {}\n", plate.text)
}

/// The report section for one file: its plates, then its damages, each
/// numbered in response order. Detections joined to other files don't
/// appear here.
pub fn file_report(file: &UploadFile, result: &BatchResult) -> String {
    let mut out = format!("{}\n", file.name);
    for (index, plate) in result.plates_for(&file.name).enumerate() {
        out.push_str(&plate_section(plate, index));
    }
    for (index, damage) in result.damages_for(&file.name).enumerate() {
        out.push_str(&damage_section(damage, index));
    }
    out
}

/// The full batch report, one section per uploaded file. Detections whose
/// `file` matches no uploaded file are left out entirely.
pub fn batch_report(files: &[UploadFile], result: &BatchResult) -> String {
    files
        .iter()
        .map(|file| file_report(file, result))
        .collect()
}

/// Both endpoint responses exactly as received, pretty-printed.
pub fn raw_json_dump(result: &BatchResult) -> Result<String> {
    let dump = serde_json::json!({
        "damages": result.raw_damages,
        "plates": result.raw_plates,
    });
    Ok(serde_json::to_string_pretty(&dump)?)
}
