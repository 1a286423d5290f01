//! Scene batcher boundaries and determinism.

mod common;

use common::builders::scene_units;
use fabula::assembly::batch_units;
use proptest::prelude::*;

#[test]
fn test_25_units_batch_10_yields_two_stable_one_volatile() {
    let batches = batch_units(&scene_units(25), 10);

    assert_eq!(batches.len(), 3);
    assert_eq!((batches[0].start_sequence, batches[0].end_sequence), (1, 10));
    assert!(!batches[0].volatile);
    assert_eq!((batches[1].start_sequence, batches[1].end_sequence), (11, 20));
    assert!(!batches[1].volatile);
    assert_eq!((batches[2].start_sequence, batches[2].end_sequence), (21, 25));
    assert!(batches[2].volatile);
}

#[test]
fn test_identical_inputs_yield_identical_boundaries() {
    let units = scene_units(47);
    assert_eq!(batch_units(&units, 10), batch_units(&units, 10));
    assert_eq!(batch_units(&units, 7), batch_units(&units, 7));
}

proptest! {
    #[test]
    fn prop_batching_covers_all_units_once(n in 0usize..120, batch_size in 1usize..20) {
        let units = scene_units(n);
        let batches = batch_units(&units, batch_size);

        let covered: usize = batches
            .iter()
            .map(|b| b.end_sequence - b.start_sequence + 1)
            .sum::<usize>();
        if n == 0 {
            prop_assert!(batches.is_empty());
        } else {
            prop_assert_eq!(covered, n);
        }
    }

    #[test]
    fn prop_exactly_one_volatile_batch(n in 1usize..120, batch_size in 1usize..20) {
        let batches = batch_units(&scene_units(n), batch_size);
        prop_assert_eq!(batches.iter().filter(|b| b.volatile).count(), 1);
        prop_assert!(batches.last().unwrap().volatile);
    }

    #[test]
    fn prop_finalized_batches_survive_growth(n in 1usize..100, extra in 1usize..30) {
        let early = batch_units(&scene_units(n), 10);
        let late = batch_units(&scene_units(n + extra), 10);

        for (before, after) in early.iter().zip(late.iter()) {
            if !before.volatile && !after.volatile {
                prop_assert_eq!(before, after);
            }
        }
    }
}
