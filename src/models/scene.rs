use serde::{Deserialize, Serialize};

/// One sequential narrative unit (a generated scene or passage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneUnit {
    pub id: String,
    /// 1-based position within the chapter. Batch boundaries are computed
    /// from this, never from vector index order.
    pub sequence: usize,
    pub text: String,
}

/// An extracted chronicle event. These form the retrieval corpus: vector
/// hits resolve back to chronicle entries by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChronicleEntry {
    pub id: String,
    /// Chronological position across the whole story.
    pub sequence: usize,
    pub text: String,
    /// Character ids involved in the event.
    #[serde(default)]
    pub subjects: Vec<String>,
}

/// A continuity contradiction flagged by the consistency pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionWarning {
    /// Sequence of the unit the contradiction was detected in.
    pub unit_sequence: usize,
    pub description: String,
}

/// Who produced an interaction turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Reader,
    Narrator,
}

/// One turn of reader/narrator interaction outside the prose itself
/// (directives, choices taken, clarifications).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionTurn {
    pub speaker: Speaker,
    pub text: String,
}
