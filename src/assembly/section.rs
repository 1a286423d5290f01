//! Named context sections and their renderers.
//!
//! A section either renders to a text block or is omitted entirely. An
//! empty-but-headered block would destabilize the prefix, so renderers
//! return `None` when the underlying data is absent. Ordering within a
//! block is the stored order of the source records, never re-sorted per
//! call.

use serde::{Deserialize, Serialize};

use crate::assembly::batch::SceneBatch;
use crate::assembly::message::Role;
use crate::context::GenerationContext;
use crate::models::Speaker;

/// Interaction turns rendered into the prefix. Older turns are already
/// reflected in summaries and the chronicle.
const INTERACTION_WINDOW: usize = 12;

/// Stability tier of a section. Stable sections always precede volatile
/// ones; editing a block invalidates it and everything after, never before.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    Stable,
    Volatile,
}

/// Context domains in prefix order, most-stable first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Genre, tone, setting, premise, character roster.
    Foundation,
    /// Character voice and dialogue style notes.
    Voice,
    /// Cumulative summary of prior chapters.
    HistorySummary,
    /// Static chapter direction and milestones.
    ChapterDirection,
    /// Finalized scene batches (one block per batch).
    StableScenes,
    /// Recent reader/narrator interaction turns.
    Interaction,
    /// Development log of extracted chronicle events.
    Chronicle,
    /// Rolling current-chapter summary, refreshed periodically.
    RollingSummary,
    /// The newest, still-growing scene batch.
    RecentScenes,
    /// Continuity contradiction warnings.
    Warnings,
    /// Retrieved earlier events relevant to the directive.
    Retrieved,
    /// Pacing guidance. Always last for maximal attention.
    Pacing,
}

impl Section {
    /// All sections in prefix order.
    pub fn ordered() -> [Section; 12] {
        [
            Section::Foundation,
            Section::Voice,
            Section::HistorySummary,
            Section::ChapterDirection,
            Section::StableScenes,
            Section::Interaction,
            Section::Chronicle,
            Section::RollingSummary,
            Section::RecentScenes,
            Section::Warnings,
            Section::Retrieved,
            Section::Pacing,
        ]
    }

    /// Position in the prefix ordering.
    pub fn tier(&self) -> u8 {
        *self as u8
    }

    pub fn stability(&self) -> Stability {
        match self {
            Section::Foundation
            | Section::Voice
            | Section::HistorySummary
            | Section::ChapterDirection
            | Section::StableScenes
            | Section::Interaction
            | Section::Chronicle => Stability::Stable,
            Section::RollingSummary
            | Section::RecentScenes
            | Section::Warnings
            | Section::Retrieved
            | Section::Pacing => Stability::Volatile,
        }
    }

    /// Backend role for blocks of this section. Guidance reads as system
    /// instructions; narrative history reads as conversation content.
    pub fn role(&self) -> Role {
        match self {
            Section::Foundation
            | Section::Voice
            | Section::ChapterDirection
            | Section::Pacing => Role::System,
            _ => Role::User,
        }
    }

    pub fn heading(&self) -> &'static str {
        match self {
            Section::Foundation => "Story foundation",
            Section::Voice => "Character voices",
            Section::HistorySummary => "The story so far",
            Section::ChapterDirection => "Chapter direction",
            Section::StableScenes => "Earlier scenes",
            Section::Interaction => "Recent interaction",
            Section::Chronicle => "Chronicle",
            Section::RollingSummary => "This chapter so far",
            Section::RecentScenes => "Latest scenes",
            Section::Warnings => "Continuity warnings",
            Section::Retrieved => "Relevant earlier events",
            Section::Pacing => "Pacing",
        }
    }

    /// Render this section against the context, or omit it.
    ///
    /// Scene and chronicle sections are rendered by the assembler, which
    /// holds the pre-computed batches and budget caps; they return `None`
    /// here.
    pub fn render(&self, ctx: &GenerationContext) -> Option<String> {
        match self {
            Section::Foundation => render_foundation(ctx),
            Section::Voice => render_voice(ctx),
            Section::HistorySummary => ctx
                .story
                .history_summary
                .as_deref()
                .map(|s| with_heading(self, s)),
            Section::ChapterDirection => render_chapter_direction(ctx),
            Section::StableScenes | Section::RecentScenes => None,
            Section::Interaction => render_interaction(ctx),
            Section::Chronicle => None,
            Section::RollingSummary => ctx
                .chapter
                .as_ref()
                .and_then(|c| c.rolling_summary.as_deref())
                .map(|s| with_heading(self, s)),
            Section::Warnings => render_warnings(ctx),
            Section::Retrieved => ctx
                .search
                .retrieved
                .as_ref()
                .filter(|r| !r.text.is_empty())
                .map(|r| with_heading(self, &r.text)),
            Section::Pacing => ctx
                .chapter
                .as_ref()
                .and_then(|c| c.pacing.as_deref())
                .map(|s| with_heading(self, s)),
        }
    }
}

fn with_heading(section: &Section, body: &str) -> String {
    format!("## {}\n\n{}", section.heading(), body)
}

fn render_foundation(ctx: &GenerationContext) -> Option<String> {
    let story = &ctx.story;
    let mut lines = vec![
        format!("Title: {}", story.title),
        format!("Genre: {}", story.genre),
        format!("Tone: {}", story.tone),
        format!("Setting: {}", story.setting),
    ];
    if let Some(premise) = &story.premise {
        lines.push(format!("Premise: {}", premise));
    }
    if !ctx.roster.is_empty() {
        lines.push(String::new());
        lines.push("Characters:".to_string());
        for character in &ctx.roster {
            match &character.summary {
                Some(summary) => lines.push(format!("- {}: {}", character.name, summary)),
                None => lines.push(format!("- {}", character.name)),
            }
            // Profile categories sort by key; map iteration order would
            // destabilize the prefix.
            let mut categories: Vec<_> = character.profile.iter().collect();
            categories.sort_by(|a, b| a.0.cmp(b.0));
            for (key, entries) in categories {
                if !entries.is_empty() {
                    lines.push(format!("  {}: {}", key, entries.join("; ")));
                }
            }
        }
    }
    Some(with_heading(&Section::Foundation, &lines.join("\n")))
}

fn render_voice(ctx: &GenerationContext) -> Option<String> {
    let voiced: Vec<String> = ctx
        .roster
        .iter()
        .filter_map(|c| c.voice.as_deref().map(|v| format!("- {}: {}", c.name, v)))
        .collect();
    if voiced.is_empty() {
        return None;
    }
    Some(with_heading(&Section::Voice, &voiced.join("\n")))
}

fn render_chapter_direction(ctx: &GenerationContext) -> Option<String> {
    let chapter = ctx.chapter.as_ref()?;
    let mut lines = Vec::new();
    if let Some(direction) = &chapter.direction {
        lines.push(direction.clone());
    }
    if !chapter.milestones.is_empty() {
        lines.push(String::new());
        lines.push("Milestones:".to_string());
        for (i, milestone) in chapter.milestones.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, milestone));
        }
    }
    if lines.is_empty() {
        return None;
    }
    Some(with_heading(&Section::ChapterDirection, &lines.join("\n")))
}

fn render_interaction(ctx: &GenerationContext) -> Option<String> {
    if ctx.interactions.is_empty() {
        return None;
    }
    let start = ctx.interactions.len().saturating_sub(INTERACTION_WINDOW);
    let lines: Vec<String> = ctx.interactions[start..]
        .iter()
        .map(|turn| {
            let speaker = match turn.speaker {
                Speaker::Reader => "Reader",
                Speaker::Narrator => "Narrator",
            };
            format!("{}: {}", speaker, turn.text)
        })
        .collect();
    Some(with_heading(&Section::Interaction, &lines.join("\n")))
}

fn render_warnings(ctx: &GenerationContext) -> Option<String> {
    if ctx.warnings.is_empty() {
        return None;
    }
    let lines: Vec<String> = ctx
        .warnings
        .iter()
        .map(|w| format!("- (unit {}) {}", w.unit_sequence, w.description))
        .collect();
    Some(with_heading(&Section::Warnings, &lines.join("\n")))
}

/// Render one scene batch as a block body.
pub fn render_batch(batch: &SceneBatch) -> String {
    format!(
        "## Scenes {}-{}\n\n{}",
        batch.start_sequence, batch.end_sequence, batch.text
    )
}

/// A rendered section block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionBlock {
    pub section: Section,
    pub text: String,
}

impl SectionBlock {
    pub fn new(section: Section, text: impl Into<String>) -> Self {
        Self {
            section,
            text: text.into(),
        }
    }

    pub fn stability(&self) -> Stability {
        self.section.stability()
    }
}
