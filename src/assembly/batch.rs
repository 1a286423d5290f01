//! Scene batching.
//!
//! Units are grouped into fixed windows aligned to the extraction cadence.
//! A finalized batch never changes on later calls; only the newest batch is
//! volatile. Boundaries are a pure function of `(units, batch_size)`.

use serde::{Deserialize, Serialize};

use crate::models::SceneUnit;

/// A fixed, cache-aligned grouping of sequential narrative units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneBatch {
    /// 0-based batch position.
    pub index: usize,
    pub start_sequence: usize,
    pub end_sequence: usize,
    /// Unit texts joined in sequence order.
    pub text: String,
    /// The newest batch is volatile; all earlier batches are finalized.
    pub volatile: bool,
}

/// Group units into batches of `batch_size`.
///
/// Returns the empty vec for zero units and a single volatile batch when
/// fewer than `batch_size` units exist. The newest batch is volatile even
/// when full; it is reclassified as stable once a later unit exists.
pub fn batch_units(units: &[SceneUnit], batch_size: usize) -> Vec<SceneBatch> {
    assert!(batch_size > 0, "batch_size must be positive");

    if units.is_empty() {
        return Vec::new();
    }

    let mut ordered: Vec<&SceneUnit> = units.iter().collect();
    ordered.sort_by_key(|u| u.sequence);

    let batch_count = ordered.len().div_ceil(batch_size);
    let mut batches = Vec::with_capacity(batch_count);

    for (index, window) in ordered.chunks(batch_size).enumerate() {
        let text = window
            .iter()
            .map(|u| u.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        batches.push(SceneBatch {
            index,
            start_sequence: window[0].sequence,
            end_sequence: window[window.len() - 1].sequence,
            text,
            volatile: index == batch_count - 1,
        });
    }

    batches
}
