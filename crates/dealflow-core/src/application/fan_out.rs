use futures::stream::{self, StreamExt};
use std::future::Future;
use tracing::debug;

/// How the items of a fan-out are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOutMode {
    /// Items run concurrently, bounded by the aggregator's limit
    Concurrent,
    /// Items run one after another in input order
    Sequential,
}

/// Runs one step per input and collects every outcome
///
/// Results always come back in input order, one per input, whatever the
/// completion order. A failing item never stops the others.
#[derive(Debug, Clone, Copy)]
pub struct FanOutAggregator {
    concurrency: usize,
}

impl FanOutAggregator {
    /// Create an aggregator; a limit of 0 runs every item at once
    pub fn new(concurrency: usize) -> Self {
        Self { concurrency }
    }

    /// Run `step` over every input
    pub async fn run_all<I, T, F, Fut>(&self, inputs: Vec<I>, mode: FanOutMode, step: F) -> Vec<T>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T>,
    {
        let total = inputs.len();
        if total == 0 {
            return Vec::new();
        }
        debug!(items = total, ?mode, "Fan-out started");

        let results = match mode {
            FanOutMode::Concurrent => {
                let limit = if self.concurrency == 0 {
                    total
                } else {
                    self.concurrency.min(total)
                };
                stream::iter(inputs.into_iter().map(&step))
                    .buffered(limit)
                    .collect::<Vec<_>>()
                    .await
            }
            FanOutMode::Sequential => {
                let mut results = Vec::with_capacity(total);
                for input in inputs {
                    results.push(step(input).await);
                }
                results
            }
        };

        debug!(items = total, "Fan-out finished");
        results
    }

    /// Run `step` over every input in order, threading an accumulator through
    pub async fn fold_sequential<I, T, A, F, Fut>(
        &self,
        inputs: Vec<I>,
        init: A,
        mut step: F,
    ) -> (Vec<T>, A)
    where
        F: FnMut(A, I) -> Fut,
        Fut: Future<Output = (T, A)>,
    {
        let mut acc = init;
        let mut results = Vec::with_capacity(inputs.len());
        for input in inputs {
            let (result, next) = step(acc, input).await;
            results.push(result);
            acc = next;
        }
        (results, acc)
    }
}

impl Default for FanOutAggregator {
    fn default() -> Self {
        Self::new(8)
    }
}
