use bson::doc;
use hospital_registry::auth::InMemoryTokens;
use hospital_registry::engine::Engine;
use hospital_registry::query::ListParams;
use hospital_registry::records::{RecordService, ServiceSettings};
use hospital_registry::store::{HOSPITALS, RecordStore};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const DOMAINS: &[&str] = &["alpha.org", "beta.org"];

/// Seeds `n` records alternating between the two domains and returns a
/// service over them.
async fn seeded(n: usize) -> RecordService {
    let engine = Arc::new(Engine::new());
    for i in 0..n {
        let email = format!("user{i}@{}", DOMAINS[i % DOMAINS.len()]);
        engine
            .insert(HOSPITALS, doc! { "basic": { "firstName": format!("U{i}"), "lastName": "P", "email": email, "roles": [] } })
            .await
            .unwrap();
    }
    let tokens = Arc::new(InMemoryTokens::new(Duration::from_secs(60), Duration::from_secs(60)));
    RecordService::new(engine, tokens, ServiceSettings::default())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, .. ProptestConfig::default() })]

    #[test]
    fn page_length_follows_skip_and_limit(n in 0usize..40, limit in 1i64..15, page in 1i64..6) {
        let rt = runtime();
        let out = rt.block_on(async {
            let service = seeded(n).await;
            service
                .list(ListParams { page_number: page, limit: Some(limit), ..ListParams::default() })
                .await
                .unwrap()
        });
        let skip = usize::try_from((page - 1) * limit).unwrap();
        let expected = n.saturating_sub(skip).min(usize::try_from(limit).unwrap());
        prop_assert_eq!(out.items.len(), expected);
        prop_assert_eq!(out.total, n as u64);
        prop_assert_eq!(out.limit, usize::try_from(limit).unwrap());
    }

    #[test]
    fn pages_partition_the_listing(n in 0usize..30, limit in 1i64..8) {
        let rt = runtime();
        let seen = rt.block_on(async {
            let service = seeded(n).await;
            let mut ids = Vec::new();
            for page in 1..=(n as i64 / limit + 1) {
                let out = service
                    .list(ListParams { page_number: page, limit: Some(limit), key: 2, order: 1, ..ListParams::default() })
                    .await
                    .unwrap();
                ids.extend(out.items.into_iter().map(|r| r.id));
            }
            ids
        });
        let unique: HashSet<_> = seen.iter().collect();
        prop_assert_eq!(seen.len(), n);
        prop_assert_eq!(unique.len(), n);
    }

    #[test]
    fn total_counts_every_pattern_match(n in 0usize..30, domain in 0usize..2) {
        let rt = runtime();
        let out = rt.block_on(async {
            let service = seeded(n).await;
            service
                .list(ListParams { pattern: Some(format!("@{}", DOMAINS[domain].to_uppercase())), limit: Some(3), ..ListParams::default() })
                .await
                .unwrap()
        });
        let matching = (0..n).filter(|i| i % DOMAINS.len() == domain).count();
        prop_assert_eq!(out.total, matching as u64);
        prop_assert!(out.items.len() <= 3);
        prop_assert!(out.items.iter().all(|r| r.basic.email.ends_with(DOMAINS[domain])));
    }
}
