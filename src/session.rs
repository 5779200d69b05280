//! Per-batch pipeline state.
//!
//! Every batch gets a fresh identifier when it begins; a new selection
//! replaces the previous batch wholesale, and results arriving for a
//! superseded batch are discarded instead of overwriting newer state.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::detections::BatchResult;
use crate::upload::UploadFile;

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier tagging one in-flight batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BatchId(u64);

impl BatchId {
    fn next() -> Self {
        BatchId(NEXT_BATCH_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch {}", self.0)
    }
}

/// The set of files selected together, processed and rendered as a unit.
#[derive(Debug)]
pub struct Batch {
    pub id: BatchId,
    pub files: Vec<UploadFile>,
}

/// Owner of the active batch and its completed result.
#[derive(Debug, Default)]
pub struct PredictSession {
    active: Option<BatchId>,
    completed: Option<(BatchId, BatchResult)>,
}

impl PredictSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new batch, superseding any batch still in flight and
    /// dropping its result.
    pub fn begin(&mut self, files: Vec<UploadFile>) -> Batch {
        let id = BatchId::next();
        if let Some(previous) = self.active.replace(id) {
            log::debug!("🗂  {previous} superseded by {id}");
        }
        self.completed = None;
        Batch { id, files }
    }

    /// Record a finished upload. Returns false (and keeps existing state
    /// untouched) when `id` no longer names the active batch.
    pub fn complete(&mut self, id: BatchId, result: BatchResult) -> bool {
        if self.active != Some(id) {
            log::warn!(
                "{} Discarding stale results from superseded {id}",
                crate::color_utils::symbols::warning()
            );
            return false;
        }
        self.completed = Some((id, result));
        true
    }

    /// The completed result of the active batch, if any.
    pub fn result(&self) -> Option<&BatchResult> {
        self.completed.as_ref().map(|(_, result)| result)
    }
}
