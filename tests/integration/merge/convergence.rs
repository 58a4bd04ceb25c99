//! Ten machines with overlapping, diverging stores converge no matter in
//! which order their stores are merged.

use memsync::core::{MemoryEntry, MemoryStore, Timestamp};
use memsync::integrity::validate_entry;
use memsync::test_harness::fixture_entry;
use memsync::{MergeEngine, TieBreakPolicy};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::json;

const MACHINES: usize = 10;
const OWN_ENTRIES: usize = 3;

fn host(i: usize) -> String {
    format!("host{i:02}")
}

/// Entries every machine might hold a copy or an edit of.
fn shared_base() -> Vec<MemoryEntry> {
    (0..4)
        .map(|n| fixture_entry("host00", &format!("shared{n}"), 1_000, 1_000, json!({"n": n})))
        .collect()
}

fn machine_stores(rng: &mut StdRng) -> Vec<MemoryStore> {
    let shared = shared_base();
    let own: Vec<Vec<MemoryEntry>> = (0..MACHINES)
        .map(|m| {
            (0..OWN_ENTRIES)
                .map(|k| {
                    let created = 2_000 + (m * OWN_ENTRIES + k) as i64;
                    fixture_entry(&host(m), &format!("note{k}"), created, created, json!([m, k]))
                })
                .collect()
        })
        .collect();

    (0..MACHINES)
        .map(|m| {
            let mut store = MemoryStore::from_entries(own[m].iter().cloned());
            // a random view of what other machines wrote
            for (other, entries) in own.iter().enumerate() {
                if other != m && rng.random_bool(0.3) {
                    for entry in entries {
                        store.insert(entry.clone());
                    }
                }
            }
            for base in &shared {
                if !rng.random_bool(0.6) {
                    continue;
                }
                let mut entry = base.clone();
                if rng.random_bool(0.7) {
                    // coarse clock so equal timestamps with different content happen
                    let at = 1_000 + rng.random_range(1..4) * 100;
                    let content = json!({"edited_by": m, "pick": rng.random_range(0..3)});
                    entry
                        .edit(content, Timestamp::from_unix_millis(at * 1_000).unwrap())
                        .unwrap();
                }
                store.insert(entry);
            }
            store
        })
        .collect()
}

fn fold_in_order(engine: MergeEngine, stores: &[MemoryStore]) -> MemoryStore {
    stores.iter().fold(MemoryStore::new(), |acc, store| {
        engine.merge(&acc, store).merged
    })
}

/// Repeatedly merge two randomly chosen stores until one remains.
fn reduce_randomly(engine: MergeEngine, mut pool: Vec<MemoryStore>, rng: &mut StdRng) -> MemoryStore {
    while pool.len() > 1 {
        let i = rng.random_range(0..pool.len());
        let a = pool.swap_remove(i);
        let j = rng.random_range(0..pool.len());
        let b = pool.swap_remove(j);
        let merged = if rng.random_bool(0.5) {
            engine.merge(&a, &b)
        } else {
            engine.merge(&b, &a)
        };
        pool.push(merged.merged);
    }
    pool.pop().unwrap_or_default()
}

fn check_converges(policy: TieBreakPolicy, seed: u64) {
    let engine = MergeEngine::new(policy);
    let mut rng = StdRng::seed_from_u64(seed);
    let stores = machine_stores(&mut rng);
    let reference = fold_in_order(engine, &stores);

    let mut shuffled = stores.clone();
    shuffled.shuffle(&mut rng);
    assert_eq!(fold_in_order(engine, &shuffled), reference, "fold, seed {seed}");
    assert_eq!(
        reduce_randomly(engine, stores.clone(), &mut rng),
        reference,
        "pairwise, seed {seed}"
    );

    // merging the result back into any machine changes nothing further
    let again = engine.merge(&reference, &stores[seed as usize % MACHINES]).merged;
    assert_eq!(again, reference);
    assert!(reference.iter().all(|entry| validate_entry(entry).valid));
}

#[test]
fn ten_machines_converge_with_host_policy() {
    for seed in 0..20 {
        check_converges(TieBreakPolicy::HostLexicographic, seed);
    }
}

#[test]
fn ten_machines_converge_with_sibling_policy() {
    for seed in 0..20 {
        check_converges(TieBreakPolicy::PreserveSiblings, seed);
    }
}

#[test]
fn no_authored_entry_is_lost() {
    let mut rng = StdRng::seed_from_u64(7);
    let stores = machine_stores(&mut rng);
    let merged = fold_in_order(MergeEngine::default(), &stores);
    for m in 0..MACHINES {
        let authored = merged
            .iter()
            .filter(|e| e.source_host() == host(m) && e.id.parts().original_id.starts_with("note"))
            .count();
        assert_eq!(authored, OWN_ENTRIES, "host {m}");
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn any_seed_converges(seed in any::<u64>(), siblings in any::<bool>()) {
        let policy = if siblings {
            TieBreakPolicy::PreserveSiblings
        } else {
            TieBreakPolicy::HostLexicographic
        };
        check_converges(policy, seed);
    }
}
