use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Grammatical gender used for pronoun resolution. `Unknown` characters
/// never win a gendered-pronoun match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Nonbinary,
    #[default]
    Unknown,
}

/// Character roster entry.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub gender: Gender,
    /// One-line summary for the foundation section.
    #[serde(default)]
    pub summary: Option<String>,
    /// Voice and dialogue style notes for the voice section.
    #[serde(default)]
    pub voice: Option<String>,
    /// Flexible character profile. Keys are fiction-framework categories
    /// (e.g. "wound", "desire", "secret"), values are lists of entries.
    #[serde(default)]
    pub profile: HashMap<String, Vec<String>>,
}

impl Character {
    /// Whether `candidate` names this character (exact, case-insensitive,
    /// against name and aliases).
    pub fn matches_name(&self, candidate: &str) -> bool {
        let candidate = candidate.trim();
        self.name.eq_ignore_ascii_case(candidate)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(candidate))
    }

    /// Whether a gendered pronoun can refer to this character.
    pub fn answers_to_pronoun(&self, pronoun: &str) -> bool {
        match pronoun.to_ascii_lowercase().as_str() {
            "he" | "him" | "his" => self.gender == Gender::Male,
            "she" | "her" | "hers" => self.gender == Gender::Female,
            "they" | "them" | "their" | "theirs" => self.gender != Gender::Unknown,
            _ => false,
        }
    }
}
