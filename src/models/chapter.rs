use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Current chapter state.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    /// Static plot direction for the chapter. Set once at chapter start,
    /// so it renders in the stable portion of the prefix.
    #[serde(default)]
    pub direction: Option<String>,
    /// Milestones the chapter should hit, in intended order.
    #[serde(default)]
    pub milestones: Vec<String>,
    /// Rolling summary of the chapter so far. Updated periodically by the
    /// extraction pipeline, so it renders in the volatile portion.
    #[serde(default)]
    pub rolling_summary: Option<String>,
    /// Pacing guidance for the next unit (beat position, tension notes).
    #[serde(default)]
    pub pacing: Option<String>,
}
