//! Task composition.
//!
//! Every generation task ends with exactly one always-volatile message
//! appended after the prefix. Extraction sub-tasks can instead take a
//! minimal two-message form: when they run on a different backend, or when
//! prefix reuse is disabled for cost control, a cached prefix buys nothing
//! and the material is inlined directly.

use serde::{Deserialize, Serialize};

use crate::assembly::Message;
use crate::context::GenerationContext;

/// Extraction sub-task flavors the engine composes prompts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionKind {
    /// Pull chronicle-worthy events out of recent prose.
    ChronicleEvents,
    /// Track character development beats.
    Development,
    /// Refresh the rolling chapter summary.
    RollingSummary,
    /// Scan for continuity contradictions.
    Contradictions,
}

impl ExtractionKind {
    fn instruction(&self) -> &'static str {
        match self {
            ExtractionKind::ChronicleEvents => {
                "List the story events in these scenes worth remembering long-term. \
                 Answer with a JSON array of short event strings, nothing else."
            }
            ExtractionKind::Development => {
                "Describe how each character changed or revealed themselves in these \
                 scenes. Answer with a JSON array of short strings, nothing else."
            }
            ExtractionKind::RollingSummary => {
                "Summarize everything that has happened in this chapter so far in one \
                 tight paragraph. Answer with the paragraph only."
            }
            ExtractionKind::Contradictions => {
                "List any continuity contradictions between these scenes and the \
                 established story facts. Answer with a JSON array of short strings, \
                 an empty array if none."
            }
        }
    }
}

/// The content-generation tasks the engine builds prompts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A new narrative unit driven by the reader directive.
    NewUnit,
    /// Regenerate the latest unit with a different approach.
    Variant,
    /// Continue the current unit where it stops.
    Continuation,
    /// Conclude the chapter.
    Conclusion,
    /// Offer the reader a list of possible next actions.
    ChoiceList,
    Extraction(ExtractionKind),
}

impl TaskKind {
    /// Whether replaying a historical prefix is semantically safe for this
    /// task. Regenerating a unit must see the exact prefix the original
    /// generation saw; a continuation is structurally different and must
    /// rebuild from current state.
    pub fn replay_safe(&self) -> bool {
        matches!(self, TaskKind::Variant | TaskKind::ChoiceList)
    }

    pub fn is_extraction(&self) -> bool {
        matches!(self, TaskKind::Extraction(_))
    }

    /// Diagnostics label.
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::NewUnit => "new_unit",
            TaskKind::Variant => "variant",
            TaskKind::Continuation => "continuation",
            TaskKind::Conclusion => "conclusion",
            TaskKind::ChoiceList => "choice_list",
            TaskKind::Extraction(ExtractionKind::ChronicleEvents) => "extraction:chronicle_events",
            TaskKind::Extraction(ExtractionKind::Development) => "extraction:development",
            TaskKind::Extraction(ExtractionKind::RollingSummary) => "extraction:rolling_summary",
            TaskKind::Extraction(ExtractionKind::Contradictions) => "extraction:contradictions",
        }
    }
}

/// Builds the final volatile message for each task kind.
pub struct TaskComposer;

impl TaskComposer {
    /// The always-volatile task message appended after the prefix.
    pub fn compose(task: &TaskKind, ctx: &GenerationContext) -> Message {
        let directive = ctx.search.directive.as_deref().map(str::trim);

        let text = match task {
            TaskKind::NewUnit => match directive {
                Some(directive) if !directive.is_empty() => format!(
                    "The reader directs: {}\n\nWrite the next scene following this \
                     direction, staying true to every established fact.",
                    directive
                ),
                _ => "Write the next scene, staying true to every established fact."
                    .to_string(),
            },
            TaskKind::Variant => {
                "Rewrite the most recent scene taking a meaningfully different \
                 approach. Keep every established fact intact."
                    .to_string()
            }
            TaskKind::Continuation => {
                "Continue the most recent scene exactly where it stops, without \
                 repeating any of it."
                    .to_string()
            }
            TaskKind::Conclusion => {
                "Write the chapter's concluding scene. Resolve the chapter's open \
                 milestones and land the ending the direction calls for."
                    .to_string()
            }
            TaskKind::ChoiceList => {
                "Offer the reader three to five distinct actions they could take \
                 next. Answer with a JSON array of short strings, nothing else."
                    .to_string()
            }
            TaskKind::Extraction(kind) => kind.instruction().to_string(),
        };

        Message::user(text)
    }

    /// Minimal two-message form: system framing plus the task with its
    /// material inlined, no prefix. A deliberate trade-off, used when the
    /// prefix would buy no cache hit.
    pub fn compose_minimal(task: &TaskKind, ctx: &GenerationContext) -> Vec<Message> {
        let system = format!(
            "You are the extraction assistant for the story \"{}\". Answer in the \
             exact format each task demands, with no commentary.",
            ctx.story.title
        );

        let mut material = String::new();
        let recent: Vec<&str> = ctx
            .units
            .iter()
            .rev()
            .take(10)
            .map(|u| u.text.as_str())
            .collect();
        for text in recent.iter().rev() {
            material.push_str(text);
            material.push_str("\n\n");
        }

        let task_message = Self::compose(task, ctx);
        let body = if material.is_empty() {
            task_message.content
        } else {
            format!("{}---\n\n{}", material, task_message.content)
        };

        vec![Message::system(system), Message::user(body)]
    }
}
