//! Test data builders for engine contexts.
//!
//! Provides fluent construction of stories, rosters and histories with
//! sensible defaults.

#![allow(dead_code)]

use fabula::context::GenerationContext;
use fabula::models::{Character, ChronicleEntry, Gender, SceneUnit, Story};

/// Builder for test stories.
pub struct StoryBuilder {
    id: String,
    title: String,
    genre: String,
    history_summary: Option<String>,
}

impl StoryBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: "Emberfall".into(),
            genre: "fantasy".into(),
            history_summary: None,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn history_summary(mut self, summary: impl Into<String>) -> Self {
        self.history_summary = Some(summary.into());
        self
    }

    pub fn build(self) -> Story {
        Story {
            id: self.id,
            title: self.title,
            genre: self.genre,
            tone: "somber".into(),
            setting: "a mountain city".into(),
            premise: None,
            history_summary: self.history_summary,
        }
    }
}

/// Builder for test characters.
pub struct CharacterBuilder {
    name: String,
    gender: Gender,
    aliases: Vec<String>,
    voice: Option<String>,
}

impl CharacterBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            gender: Gender::Unknown,
            aliases: Vec::new(),
            voice: None,
        }
    }

    pub fn gender(mut self, gender: Gender) -> Self {
        self.gender = gender;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn build(self) -> Character {
        Character {
            id: format!("character:{}", self.name.to_lowercase()),
            name: self.name,
            aliases: self.aliases,
            gender: self.gender,
            summary: None,
            voice: self.voice,
            profile: Default::default(),
        }
    }
}

/// `n` sequential scene units with deterministic prose.
pub fn scene_units(n: usize) -> Vec<SceneUnit> {
    (1..=n)
        .map(|i| SceneUnit {
            id: format!("unit:{}", i),
            sequence: i,
            text: format!("Scene {} prose unfolds here.", i),
        })
        .collect()
}

/// A chronicle entry with explicit sequence.
pub fn chronicle_entry(id: &str, sequence: usize, text: &str) -> ChronicleEntry {
    ChronicleEntry {
        id: id.to_string(),
        sequence,
        text: text.to_string(),
        subjects: Vec::new(),
    }
}

/// A baseline context: one story, two characters, 25 units.
pub fn base_context(story_id: &str) -> GenerationContext {
    let story = StoryBuilder::new(story_id).build();
    let roster = vec![
        CharacterBuilder::new("Aria").gender(Gender::Female).build(),
        CharacterBuilder::new("Brin").gender(Gender::Male).build(),
    ];
    let mut ctx = GenerationContext::new(story, roster);
    ctx.units = scene_units(25);
    ctx
}
