//! Prefix stability: identical inputs must produce byte-identical message
//! prefixes, sibling sub-calls must observe the first call's prefix, and
//! stable blocks must always precede volatile ones.

mod common;

use common::builders::{base_context, chronicle_entry, CharacterBuilder};
use common::harness::EngineHarness;
use fabula::assembly::{MessageAssembler, Section, Stability};
use fabula::compose::TaskKind;
use fabula::config::AssemblyConfig;
use fabula::models::{ContradictionWarning, Gender, InteractionTurn, Speaker};
use fabula::tokens::TokenCounter;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_identical_contexts_build_identical_messages() {
    let harness = EngineHarness::new();
    let mut a = base_context("story:ember");
    let mut b = base_context("story:ember");

    let (messages_a, _) = harness.engine.build_messages(TaskKind::NewUnit, &mut a).await;
    let (messages_b, _) = harness.engine.build_messages(TaskKind::NewUnit, &mut b).await;

    assert_eq!(messages_a, messages_b);
}

#[tokio::test]
async fn test_sibling_sub_calls_reuse_first_prefix_exactly() {
    let harness = EngineHarness::new();
    let mut ctx = base_context("story:ember");

    let (first, first_diag) = harness.engine.build_messages(TaskKind::NewUnit, &mut ctx).await;
    assert!(!first_diag.prefix_reused);

    // A sibling sub-call within the same operation, different task.
    let (second, second_diag) = harness
        .engine
        .build_messages(TaskKind::ChoiceList, &mut ctx)
        .await;
    assert!(second_diag.prefix_reused);

    // Everything except the final volatile task message is identical.
    assert_eq!(first[..first.len() - 1], second[..second.len() - 1]);
}

fn rich_context() -> fabula::context::GenerationContext {
    let mut ctx = base_context("story:ember");
    ctx.roster.push(
        CharacterBuilder::new("Mira")
            .gender(Gender::Female)
            .voice("clipped, formal")
            .build(),
    );
    ctx.story.history_summary = Some("Two chapters of siege and loss.".into());
    ctx.chronicle = vec![
        chronicle_entry("chronicle:forge", 2, "Aria promised the blacksmith a favor"),
        chronicle_entry("chronicle:gate", 7, "Brin opened the northern gate"),
    ];
    ctx.warnings = vec![ContradictionWarning {
        unit_sequence: 9,
        description: "Brin's sword was already lost".into(),
    }];
    ctx.interactions = vec![InteractionTurn {
        speaker: Speaker::Reader,
        text: "I follow the smoke.".into(),
    }];
    ctx
}

#[test]
fn test_stable_blocks_always_precede_volatile_blocks() {
    let assembler = MessageAssembler::new(AssemblyConfig::default(), TokenCounter::heuristic());
    let mut ctx = rich_context();
    let (prefix, _) = assembler.assemble(&mut ctx);

    let stabilities: Vec<Stability> = prefix.blocks().iter().map(|b| b.stability()).collect();
    let first_volatile = stabilities
        .iter()
        .position(|s| *s == Stability::Volatile)
        .expect("volatile blocks present");
    assert!(
        stabilities[..first_volatile]
            .iter()
            .all(|s| *s == Stability::Stable),
        "no stable block may follow a volatile block"
    );
    assert!(stabilities[first_volatile..]
        .iter()
        .all(|s| *s == Stability::Volatile));
}

#[test]
fn test_block_sections_appear_in_tier_order() {
    let assembler = MessageAssembler::new(AssemblyConfig::default(), TokenCounter::heuristic());
    let mut ctx = rich_context();
    let (prefix, _) = assembler.assemble(&mut ctx);

    let tiers: Vec<u8> = prefix.blocks().iter().map(|b| b.section.tier()).collect();
    let mut sorted = tiers.clone();
    sorted.sort_unstable();
    assert_eq!(tiers, sorted, "blocks must render in section tier order");
}

#[test]
fn test_pacing_block_is_last_when_present() {
    let assembler = MessageAssembler::new(AssemblyConfig::default(), TokenCounter::heuristic());
    let mut ctx = rich_context();
    ctx.chapter = Some(fabula::models::Chapter {
        id: "chapter:3".into(),
        title: "Smoke".into(),
        direction: Some("Reach the forge by nightfall.".into()),
        milestones: vec!["Cross the gate".into()],
        rolling_summary: Some("The chapter opened in ash.".into()),
        pacing: Some("Hold tension; no resolution yet.".into()),
    });
    let (prefix, _) = assembler.assemble(&mut ctx);

    let last = prefix.blocks().last().expect("blocks present");
    assert_eq!(last.section, Section::Pacing);
}

#[test]
fn test_empty_sections_are_omitted_not_headered() {
    let assembler = MessageAssembler::new(AssemblyConfig::default(), TokenCounter::heuristic());
    let mut ctx = base_context("story:ember");
    ctx.warnings.clear();
    let (prefix, report) = assembler.assemble(&mut ctx);

    assert!(prefix
        .blocks()
        .iter()
        .all(|b| b.section != Section::Warnings));
    assert!(report.omitted.contains(&Section::Warnings));
    assert!(prefix.blocks().iter().all(|b| !b.text.trim().is_empty()));
}
