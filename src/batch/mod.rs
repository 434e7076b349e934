use crate::error::Result;
use futures::future::join_all;
use std::future::Future;
use tracing::warn;

/// How a multi-chunk fan-out reacts to a failed chunk.
///
/// Metadata lookups historically tolerate partial upstream failures, so they
/// run best-effort; price lookups must be complete or fail as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    FailFast,
    BestEffort,
}

/// Splits `ids` into chunks of at most `size`, preserving order. A zero size
/// degrades to single-id chunks rather than failing the whole request.
pub fn chunked(ids: &[String], size: usize) -> Vec<Vec<String>> {
    ids.chunks(size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Runs `op` concurrently for every chunk and flattens the results in chunk
/// order. Completion order of the underlying futures does not affect the
/// output ordering.
pub async fn run_batches<T, F, Fut>(
    chunks: Vec<Vec<String>>,
    policy: FailurePolicy,
    op: F,
) -> Result<Vec<T>>
where
    F: Fn(Vec<String>) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let outcomes = join_all(chunks.into_iter().map(op)).await;

    let mut flattened = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(items) => flattened.extend(items),
            Err(e) => match policy {
                FailurePolicy::FailFast => return Err(e),
                FailurePolicy::BestEffort => {
                    warn!("Dropping failed batch: {}", e);
                }
            },
        }
    }
    Ok(flattened)
}
