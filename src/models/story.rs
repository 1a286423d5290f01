use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Story metadata as provided by the structured data collaborator.
///
/// Read-only inside the engine; field order here is the order the
/// foundation section renders in.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub genre: String,
    pub tone: String,
    pub setting: String,
    #[serde(default)]
    pub premise: Option<String>,
    /// Cumulative summary of everything before the current chapter.
    /// Maintained by the extraction pipeline, not by this engine.
    #[serde(default)]
    pub history_summary: Option<String>,
}
