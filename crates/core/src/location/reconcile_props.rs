//! Property-based tests for batch import.
//!
//! - Every accepted node ends with `access_path == parent.access_path ++ [id]`
//!   no matter in which order the batch lists parents and children.
//! - Importing the same batch twice changes nothing.
//! - A batch that names the same external key twice keeps the first record.

use std::collections::HashMap;

use proptest::prelude::*;

use locus_shared::types::PartitionKey;

use super::types::{AccessPath, LocationCandidate, LocationNode, Tombstones};
use crate::location::LocationStore;
use crate::location_type::{ImportMode, LocationTypeInput};
use crate::memory::{MemoryCatalog, MemoryLocationStore, MemoryTypeStore};
use crate::pipeline::{LocationImport, bootstrap_partition, import_location_types, import_locations};

const MAX_NODES: usize = 24;

/// Parent index per node; a parent always has a smaller index.
fn forest() -> impl Strategy<Value = Vec<Option<usize>>> {
    (1..MAX_NODES).prop_flat_map(|n| {
        (0..n)
            .map(|i| {
                if i == 0 {
                    Just(None).boxed()
                } else {
                    prop_oneof![Just(None), (0..i).prop_map(Some)].boxed()
                }
            })
            .collect::<Vec<_>>()
    })
}

/// A forest plus the order in which its nodes appear in the batch.
fn shuffled_forest() -> impl Strategy<Value = (Vec<Option<usize>>, Vec<usize>)> {
    forest().prop_flat_map(|parents| {
        let order: Vec<usize> = (0..parents.len()).collect();
        (Just(parents), Just(order).prop_shuffle())
    })
}

fn depth(parents: &[Option<usize>], mut i: usize) -> usize {
    let mut d = 1;
    while let Some(p) = parents[i] {
        d += 1;
        i = p;
    }
    d
}

fn batch(parents: &[Option<usize>], order: &[usize]) -> Vec<LocationCandidate> {
    order
        .iter()
        .map(|&i| {
            LocationCandidate::new(
                format!("p{i}"),
                format!("Location {i}"),
                format!("t{}", depth(parents, i)),
                parents[i].map(|p| format!("p{p}")).unwrap_or_default(),
            )
        })
        .collect()
}

struct Setup {
    locations: MemoryLocationStore,
    types: MemoryTypeStore,
}

async fn setup() -> Setup {
    let partition = PartitionKey::new("props").unwrap();
    let catalog = MemoryCatalog::new();
    let locations = catalog.locations(&partition);
    let types = catalog.types(&partition);
    bootstrap_partition(&locations, &types, "org", "Org").await.unwrap();

    let chain: Vec<LocationTypeInput> = (1..=MAX_NODES)
        .map(|k| {
            let parent = if k == 1 { "org".to_string() } else { format!("t{}", k - 1) };
            LocationTypeInput::new(format!("t{k}"), format!("Tier {k}"), parent)
        })
        .collect();
    import_location_types(&types, &locations, "org", &chain, ImportMode::AllOrNothing)
        .await
        .unwrap();

    Setup { locations, types }
}

async fn run(s: &Setup, candidates: &[LocationCandidate]) -> LocationImport {
    import_locations(&s.locations, &s.types, "org", candidates)
        .await
        .unwrap()
}

fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(fut)
}

fn assert_paths_consistent(nodes: &[LocationNode]) -> Result<(), TestCaseError> {
    let by_id: HashMap<_, _> = nodes.iter().map(|n| (n.id, n)).collect();
    for node in nodes {
        let expected = match node.parent_id {
            None => AccessPath::root(node.id),
            Some(parent) => by_id[&parent].access_path.child(node.id),
        };
        prop_assert_eq!(&node.access_path, &expected);
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Paths are consistent for any batch order.
    #[test]
    fn prop_paths_consistent_for_any_order((parents, order) in shuffled_forest()) {
        let candidates = batch(&parents, &order);
        let nodes = block_on(async {
            let s = setup().await;
            let outcome = run(&s, &candidates).await;
            assert!(outcome.report.is_clean(), "{:?}", outcome.report);
            s.locations.list_all(Tombstones::Include).await.unwrap()
        });

        prop_assert_eq!(nodes.len(), parents.len() + 1);
        assert_paths_consistent(&nodes)?;
    }

    /// Re-importing a batch keeps ids, pointers and paths.
    #[test]
    fn prop_reimport_is_idempotent((parents, order) in shuffled_forest()) {
        let candidates = batch(&parents, &order);
        let (first, second, rewritten) = block_on(async {
            let s = setup().await;
            run(&s, &candidates).await;
            let first = s.locations.list_all(Tombstones::Include).await.unwrap();
            let again = run(&s, &candidates).await;
            let second = s.locations.list_all(Tombstones::Include).await.unwrap();
            (first, second, again.paths_rewritten)
        });

        prop_assert_eq!(rewritten, 0);
        prop_assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(a.id, b.id);
            prop_assert_eq!(a.parent_id, b.parent_id);
            prop_assert_eq!(&a.access_path, &b.access_path);
        }
    }

    /// Duplicated external keys keep the first record and reject the rest.
    #[test]
    fn prop_duplicates_keep_first((parents, order) in shuffled_forest(), dup in 0..MAX_NODES) {
        let mut candidates = batch(&parents, &order);
        let original = candidates[dup % candidates.len()].clone();
        let mut copy = original.clone();
        copy.name = "Shadow".to_string();
        candidates.push(copy);

        let (report, stored) = block_on(async {
            let s = setup().await;
            let outcome = run(&s, &candidates).await;
            let stored = s
                .locations
                .get_by_partner_id(&original.partner_id, Tombstones::Exclude)
                .await
                .unwrap();
            (outcome.report, stored)
        });

        prop_assert_eq!(report.rejections().count(), 1);
        prop_assert_eq!(report.accepted_count(), candidates.len() - 1);
        prop_assert_eq!(stored.map(|n| n.name), Some(original.name));
    }
}
