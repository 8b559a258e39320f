//! Bounded fan-out of per-namespace aggregation.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use futures::stream::{self, StreamExt};
use tracing::debug;

use super::namespace::{NamespaceAggregator, NamespaceObjects, NamespaceSummary};
use crate::error::KhError;

/// Aggregate every namespace on at most `threads` blocking workers.
///
/// Each worker owns its summary until it publishes it under its namespace
/// key. Returns only after every worker has finished.
pub async fn aggregate_namespaces(
    aggregator: Arc<NamespaceAggregator>,
    namespaces: BTreeMap<String, NamespaceObjects>,
    threads: usize,
) -> Result<BTreeMap<String, NamespaceSummary>, KhError> {
    let threads = threads.max(1);
    let published: Arc<Mutex<BTreeMap<String, NamespaceSummary>>> =
        Arc::new(Mutex::new(BTreeMap::new()));

    debug!(
        "Aggregating {} namespaces with {} workers",
        namespaces.len(),
        threads
    );

    let tasks = namespaces.into_iter().map(|(name, objects)| {
        let aggregator = Arc::clone(&aggregator);
        let published = Arc::clone(&published);
        async move {
            let summary = tokio::task::spawn_blocking({
                let name = name.clone();
                move || aggregator.aggregate(&name, &objects)
            })
            .await
            .map_err(|e| KhError::Worker(format!("namespace {}: {}", name, e)))?;

            published
                .lock()
                .map_err(|_| KhError::Worker("summary map poisoned".to_string()))?
                .insert(name, summary);
            Ok::<(), KhError>(())
        }
    });

    let outcomes: Vec<Result<(), KhError>> = stream::iter(tasks)
        .buffer_unordered(threads)
        .collect()
        .await;
    for outcome in outcomes {
        outcome?;
    }

    Arc::try_unwrap(published)
        .map_err(|_| KhError::Worker("summary map still shared after join".to_string()))?
        .into_inner()
        .map_err(|_| KhError::Worker("summary map poisoned".to_string()))
}
