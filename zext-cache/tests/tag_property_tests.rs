//! Property-Based Tests for Tag Resolution
//!
//! **Property 1: Union** - `keys_by_tag(tags, false)` returns exactly the
//! keys tagged with at least one of `tags`.
//!
//! **Property 2: Intersection** - `keys_by_tag(tags, true)` returns exactly
//! the keys tagged with every one of `tags`.
//!
//! **Property 3: Removal** - `remove_by_tag` deletes exactly the resolved
//! keys and leaves every other entry in place.
//!
//! **Property 4: Namespace Isolation** - tag operations in one namespace
//! never observe or delete entries of another.

use std::collections::BTreeSet;

use proptest::prelude::*;
use serde_json::json;
use tokio::runtime::Runtime;
use zext_cache::Factory;
use zext_core::{CacheConfig, CacheError};
use zext_test_utils::generators::{arb_keys, arb_pooled_tags, arb_value};

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn fail(e: impl std::fmt::Display) -> TestCaseError {
    TestCaseError::fail(e.to_string())
}

/// Distinct keys, each with its own non-empty tag set.
fn arb_tagged_entries() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    arb_keys(1, 12).prop_flat_map(|keys| {
        let n = keys.len();
        (Just(keys), prop::collection::vec(arb_pooled_tags(), n))
            .prop_map(|(keys, tags)| keys.into_iter().zip(tags).collect())
    })
}

fn expected(
    entries: &[(String, Vec<String>)],
    query: &[String],
    intersect: bool,
) -> BTreeSet<String> {
    entries
        .iter()
        .filter(|(_, tags)| {
            if intersect {
                query.iter().all(|q| tags.contains(q))
            } else {
                query.iter().any(|q| tags.contains(q))
            }
        })
        .map(|(key, _)| key.clone())
        .collect()
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_union_resolves_any_tag(
        entries in arb_tagged_entries(),
        query in arb_pooled_tags(),
    ) {
        let rt = test_runtime()?;
        let factory = Factory::new(CacheConfig::default()).map_err(fail)?;
        let cache = factory.create_frontend(None).map_err(fail)?;

        let found = rt.block_on(async {
            for (key, tags) in &entries {
                cache.set_tagged(key, json!(key), tags).await?;
            }
            let found = cache.keys_by_tag(&query, false).await?;
            Ok::<_, CacheError>(found)
        }).map_err(fail)?;

        let found: BTreeSet<String> = found.into_iter().collect();
        prop_assert_eq!(found, expected(&entries, &query, false));
    }

    #[test]
    fn prop_intersection_resolves_every_tag(
        entries in arb_tagged_entries(),
        query in arb_pooled_tags(),
    ) {
        let rt = test_runtime()?;
        let factory = Factory::new(CacheConfig::default()).map_err(fail)?;
        let cache = factory.create_frontend(None).map_err(fail)?;

        let found = rt.block_on(async {
            for (key, tags) in &entries {
                cache.set_tagged(key, json!(key), tags).await?;
            }
            let found = cache.get_by_tag(&query, true).await?;
            Ok::<_, CacheError>(found)
        }).map_err(fail)?;

        let want = expected(&entries, &query, true);
        prop_assert_eq!(found.keys().cloned().collect::<BTreeSet<_>>(), want);
        for (key, value) in &found {
            prop_assert_eq!(value, &json!(key));
        }
    }

    #[test]
    fn prop_remove_by_tag_removes_exactly_resolved(
        entries in arb_tagged_entries(),
        query in arb_pooled_tags(),
        intersect in any::<bool>(),
    ) {
        let rt = test_runtime()?;
        let factory = Factory::new(CacheConfig::default()).map_err(fail)?;
        let cache = factory.create_frontend(Some("p3")).map_err(fail)?;
        let doomed = expected(&entries, &query, intersect);

        let (removed, survivors) = rt.block_on(async {
            for (key, tags) in &entries {
                cache.set_tagged(key, json!(1), tags).await?;
            }
            let removed = cache.remove_by_tag(&query, intersect).await?;
            let keys: Vec<&str> = entries.iter().map(|(k, _)| k.as_str()).collect();
            let survivors = cache.get_many(&keys).await?;
            Ok::<_, CacheError>((removed, survivors))
        }).map_err(fail)?;

        prop_assert_eq!(removed, doomed.len() as u64);
        for (key, _) in &entries {
            prop_assert_eq!(survivors.contains_key(key), !doomed.contains(key));
        }
    }

    #[test]
    fn prop_namespaces_isolate_tags(
        keys in arb_keys(1, 8),
        value in arb_value(),
    ) {
        let rt = test_runtime()?;
        let factory = Factory::new(CacheConfig::default()).map_err(fail)?;
        let left = factory.create_frontend(Some("left")).map_err(fail)?;
        let right = factory.create_frontend(Some("right")).map_err(fail)?;
        let tag = ["shared".to_string()];

        let (removed, right_found) = rt.block_on(async {
            for key in &keys {
                left.set_tagged(key, value.clone(), &tag).await?;
                right.set_tagged(key, value.clone(), &tag).await?;
            }
            let removed = left.remove_by_tag(&tag, false).await?;
            let right_found = right.get_by_tag(&tag, false).await?;
            Ok::<_, CacheError>((removed, right_found))
        }).map_err(fail)?;

        prop_assert_eq!(removed, keys.len() as u64);
        prop_assert_eq!(right_found.len(), keys.len());
        for found in right_found.values() {
            prop_assert_eq!(found, &value);
        }
    }
}
