//! Message assembly.
//!
//! Renders sections in tier order into a `MessagePrefix`, allocating the
//! prefix token budget across competing sources. The biggest consumers
//! (scene batches, chronicle) are capped by fixed shares of the budget;
//! dropping always happens from the oldest material so the retained blocks
//! stay byte-identical across calls.

use std::sync::Arc;

use crate::assembly::batch::{batch_units, SceneBatch};
use crate::assembly::message::MessagePrefix;
use crate::assembly::section::{render_batch, Section, SectionBlock};
use crate::config::AssemblyConfig;
use crate::context::GenerationContext;
use crate::tokens::TokenCounter;

/// Budget share reserved for finalized scene batches.
const SCENE_SHARE: f32 = 0.5;
/// Budget share reserved for the chronicle log.
const CHRONICLE_SHARE: f32 = 0.15;

/// What the assembler did, for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct AssemblyReport {
    /// Sections that rendered, in prefix order (repeated per batch block).
    pub included: Vec<Section>,
    /// Sections omitted because their data was absent.
    pub omitted: Vec<Section>,
    /// Approximate tokens across all blocks.
    pub token_estimate: usize,
    /// Finalized batches dropped to honor the scene share.
    pub dropped_batches: usize,
    /// Whether a sibling's cached prefix was returned instead of rebuilding.
    pub reused_cached: bool,
}

/// Assembles the ordered message prefix for one operation.
pub struct MessageAssembler {
    config: AssemblyConfig,
    counter: TokenCounter,
}

impl MessageAssembler {
    pub fn new(config: AssemblyConfig, counter: TokenCounter) -> Self {
        Self { config, counter }
    }

    /// Build the prefix, or return the sibling-cached one unchanged.
    ///
    /// The built prefix is cached on the context so every later sub-call of
    /// this operation observes the exact same blocks.
    pub fn assemble(&self, ctx: &mut GenerationContext) -> (Arc<MessagePrefix>, AssemblyReport) {
        if let Some(prefix) = ctx.cached_prefix() {
            tracing::debug!(
                operation = %ctx.operation_id,
                "Reusing sibling-cached prefix ({} blocks)",
                prefix.blocks().len()
            );
            let report = AssemblyReport {
                included: prefix.blocks().iter().map(|b| b.section).collect(),
                token_estimate: self
                    .counter
                    .count_all(prefix.blocks().iter().map(|b| b.text.as_str())),
                reused_cached: true,
                ..AssemblyReport::default()
            };
            return (prefix, report);
        }

        let batches = batch_units(&ctx.units, self.config.batch_size);
        let (stable_batches, volatile_batch) = split_batches(&batches);

        let scene_budget = (self.config.prefix_token_budget as f32 * SCENE_SHARE) as usize;
        let chronicle_budget = (self.config.prefix_token_budget as f32 * CHRONICLE_SHARE) as usize;

        let (kept_batches, dropped_batches) = self.fit_stable_batches(stable_batches, scene_budget);

        let mut blocks = Vec::new();
        let mut report = AssemblyReport {
            dropped_batches,
            ..AssemblyReport::default()
        };

        for section in Section::ordered() {
            match section {
                Section::StableScenes => {
                    if kept_batches.is_empty() {
                        report.omitted.push(section);
                    }
                    for batch in &kept_batches {
                        blocks.push(SectionBlock::new(section, render_batch(batch)));
                        report.included.push(section);
                    }
                }
                Section::RecentScenes => match volatile_batch {
                    Some(batch) => {
                        blocks.push(SectionBlock::new(section, render_batch(batch)));
                        report.included.push(section);
                    }
                    None => report.omitted.push(section),
                },
                Section::Chronicle => {
                    match self.render_chronicle(ctx, chronicle_budget) {
                        Some(text) => {
                            blocks.push(SectionBlock::new(section, text));
                            report.included.push(section);
                        }
                        None => report.omitted.push(section),
                    }
                }
                _ => match section.render(ctx) {
                    Some(text) => {
                        blocks.push(SectionBlock::new(section, text));
                        report.included.push(section);
                    }
                    None => report.omitted.push(section),
                },
            }
        }

        report.token_estimate = self
            .counter
            .count_all(blocks.iter().map(|b| b.text.as_str()));

        tracing::debug!(
            operation = %ctx.operation_id,
            blocks = blocks.len(),
            tokens = report.token_estimate,
            dropped_batches = report.dropped_batches,
            "Assembled prefix"
        );

        let prefix = Arc::new(MessagePrefix::new(blocks));
        ctx.cache_prefix(prefix.clone());
        (prefix, report)
    }

    /// Keep the newest finalized batches that fit the scene budget.
    /// Returns batches in chronological order plus the dropped count.
    fn fit_stable_batches<'a>(
        &self,
        stable: Vec<&'a SceneBatch>,
        budget: usize,
    ) -> (Vec<&'a SceneBatch>, usize) {
        let mut kept = Vec::new();
        let mut spent = 0;
        for batch in stable.iter().rev() {
            let cost = self.counter.count(&batch.text);
            if spent + cost > budget && !kept.is_empty() {
                break;
            }
            if spent + cost > budget && kept.is_empty() && cost > budget {
                // Even one batch overflows; keep the newest anyway rather
                // than losing all finalized scenes.
                kept.push(*batch);
                break;
            }
            spent += cost;
            kept.push(*batch);
        }
        kept.reverse();
        let dropped = stable.len() - kept.len();
        (kept, dropped)
    }

    /// Render the chronicle capped to its share, newest entries retained,
    /// output in chronological order.
    fn render_chronicle(&self, ctx: &GenerationContext, budget: usize) -> Option<String> {
        if ctx.chronicle.is_empty() {
            return None;
        }
        let mut kept = Vec::new();
        let mut spent = 0;
        for entry in ctx.chronicle.iter().rev() {
            let line = format!("- {}", entry.text);
            let cost = self.counter.count(&line);
            if spent + cost > budget && !kept.is_empty() {
                break;
            }
            spent += cost;
            kept.push(line);
        }
        kept.reverse();
        Some(format!(
            "## {}\n\n{}",
            Section::Chronicle.heading(),
            kept.join("\n")
        ))
    }
}

fn split_batches(batches: &[SceneBatch]) -> (Vec<&SceneBatch>, Option<&SceneBatch>) {
    let stable: Vec<&SceneBatch> = batches.iter().filter(|b| !b.volatile).collect();
    let volatile = batches.iter().find(|b| b.volatile);
    (stable, volatile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::section::Stability;
    use crate::models::{SceneUnit, Story};

    fn story() -> Story {
        Story {
            id: "story:test".into(),
            title: "Test".into(),
            genre: "fantasy".into(),
            tone: "light".into(),
            setting: "nowhere".into(),
            premise: None,
            history_summary: Some("Much has happened.".into()),
        }
    }

    fn units(n: usize) -> Vec<SceneUnit> {
        (1..=n)
            .map(|i| SceneUnit {
                id: format!("unit:{}", i),
                sequence: i,
                text: format!("Scene {} prose.", i),
            })
            .collect()
    }

    fn assembler() -> MessageAssembler {
        MessageAssembler::new(AssemblyConfig::default(), TokenCounter::heuristic())
    }

    #[test]
    fn test_assemble_twice_is_byte_identical() {
        let assembler = assembler();
        let mut a = GenerationContext::new(story(), Vec::new());
        a.units = units(25);
        let mut b = GenerationContext::new(story(), Vec::new());
        b.units = units(25);

        let (prefix_a, _) = assembler.assemble(&mut a);
        let (prefix_b, _) = assembler.assemble(&mut b);
        assert_eq!(prefix_a.blocks(), prefix_b.blocks());
        assert_eq!(prefix_a.messages(), prefix_b.messages());
    }

    #[test]
    fn test_sibling_call_reuses_cached_prefix() {
        let assembler = assembler();
        let mut ctx = GenerationContext::new(story(), Vec::new());
        ctx.units = units(25);

        let (first, first_report) = assembler.assemble(&mut ctx);
        assert!(!first_report.reused_cached);

        // Mutating volatile inputs after the first call must not change
        // what siblings see.
        ctx.units.push(SceneUnit {
            id: "unit:26".into(),
            sequence: 26,
            text: "Scene 26 prose.".into(),
        });
        let (second, second_report) = assembler.assemble(&mut ctx);
        assert!(second_report.reused_cached);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_stable_blocks_precede_volatile_blocks() {
        let assembler = assembler();
        let mut ctx = GenerationContext::new(story(), Vec::new());
        ctx.units = units(25);

        let (prefix, _) = assembler.assemble(&mut ctx);
        let tiers: Vec<Stability> = prefix.blocks().iter().map(|b| b.stability()).collect();
        let first_volatile = tiers.iter().position(|s| *s == Stability::Volatile);
        if let Some(pos) = first_volatile {
            assert!(tiers[pos..].iter().all(|s| *s == Stability::Volatile));
        }
    }

    #[test]
    fn test_omitted_sections_produce_no_blocks() {
        let assembler = assembler();
        let mut ctx = GenerationContext::new(story(), Vec::new());
        let (prefix, report) = assembler.assemble(&mut ctx);

        assert!(prefix
            .blocks()
            .iter()
            .all(|b| b.section != Section::Warnings));
        assert!(report.omitted.contains(&Section::Warnings));
        assert!(report.omitted.contains(&Section::Retrieved));
    }

    #[test]
    fn test_scene_budget_drops_oldest_batches_first() {
        let config = AssemblyConfig {
            // Tiny budget: room for roughly one batch in the 50% share.
            prefix_token_budget: 40,
            ..AssemblyConfig::default()
        };
        let assembler = MessageAssembler::new(config, TokenCounter::heuristic());
        let mut ctx = GenerationContext::new(story(), Vec::new());
        ctx.units = units(35);

        let (prefix, report) = assembler.assemble(&mut ctx);
        assert!(report.dropped_batches > 0);

        // The newest finalized batch must survive; dropping starts at the
        // oldest.
        let stable_blocks: Vec<_> = prefix
            .blocks()
            .iter()
            .filter(|b| b.section == Section::StableScenes)
            .collect();
        assert!(!stable_blocks.is_empty());
        assert!(stable_blocks
            .last()
            .unwrap()
            .text
            .contains("Scene 30 prose."));
    }
}
