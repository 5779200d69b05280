//! Detection records returned by the inspection API, and the merge of the
//! two endpoint responses into one per-batch result.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Recommended action for a detected damage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Repair,
    Replace,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Repair => write!(f, "REPAIR"),
            Action::Replace => write!(f, "REPLACE"),
        }
    }
}

/// One damage detection. `file` names the uploaded image the box belongs to
/// and is the join key for rendering and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Damage {
    pub file: String,
    /// `[x0, y0, x1, y1]` in original-image pixel coordinates
    pub coords: [f64; 4],
    #[serde(rename = "type")]
    pub kind: String,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// Computed server-side; two detections flagged together likely refer to
    /// the same physical damage. Carried through untouched.
    #[serde(default)]
    pub probable_duplicate: bool,
}

/// One license-plate detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plate {
    pub file: String,
    /// `[x0, y0, x1, y1]` in original-image pixel coordinates
    pub coords: [f64; 4],
    pub text: String,
    /// OCR candidates the server rejected; not presented, kept for the raw dump
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid: Vec<String>,
}

/// Boxes arrive as `[x0, y0, x1, y1]` with `x1 >= x0` and `y1 >= y0`;
/// anything else is malformed input and gets skipped.
pub fn box_is_valid(coords: &[f64; 4]) -> bool {
    coords[2] >= coords[0] && coords[3] >= coords[1]
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DamagesResponse {
    #[serde(default)]
    pub damage_model: Option<String>,
    #[serde(default)]
    pub damages: Vec<Damage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlatesResponse {
    #[serde(default)]
    pub plate_model: Option<String>,
    #[serde(default)]
    pub plates: Vec<Plate>,
}

/// The merged detections of one batch, plus the verbatim endpoint responses.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    pub damages: Vec<Damage>,
    pub plates: Vec<Plate>,
    pub raw_damages: Value,
    pub raw_plates: Value,
}

impl BatchResult {
    /// Damages belonging to `file`, in response order.
    pub fn damages_for<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a Damage> {
        self.damages.iter().filter(move |d| d.file == file)
    }

    /// Plates belonging to `file`, in response order.
    pub fn plates_for<'a>(&'a self, file: &'a str) -> impl Iterator<Item = &'a Plate> {
        self.plates.iter().filter(move |p| p.file == file)
    }
}

fn parse_section<T: Default + DeserializeOwned>(raw: &Value, what: &str) -> T {
    if raw.is_null() {
        return T::default();
    }
    match serde_json::from_value(raw.clone()) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!(
                "{} Malformed {what} payload ({e}); continuing with no {what}",
                crate::color_utils::symbols::warning()
            );
            T::default()
        }
    }
}

/// Merge the two endpoint responses into one result. Purely structural: a
/// missing or malformed detection array degrades to an empty list so the
/// rest of the batch still renders.
pub fn aggregate(raw_damages: Value, raw_plates: Value) -> BatchResult {
    let damages = parse_section::<DamagesResponse>(&raw_damages, "damages").damages;
    let plates = parse_section::<PlatesResponse>(&raw_plates, "plates").plates;
    BatchResult {
        damages,
        plates,
        raw_damages,
        raw_plates,
    }
}

/// The duplicate flag is computed server-side and arrives on each damage
/// record; the client only carries it through to rendering and reporting,
/// never recomputes it. Returns the number of flagged damages.
pub fn annotate_duplicates(result: &mut BatchResult) -> usize {
    let flagged = result
        .damages
        .iter()
        .filter(|d| d.probable_duplicate)
        .count();
    if flagged > 0 {
        log::debug!(
            "🔁 {flagged} of {} damage(s) flagged as probable duplicates",
            result.damages.len()
        );
    }
    flagged
}
