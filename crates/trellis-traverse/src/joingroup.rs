//! Fork-join dispatch for prerequisite sub-builds.
//!
//! The engine forks one task per prerequisite and blocks at a single
//! join point that aggregates every branch's breakers. There is no pool
//! and no cancellation: once dispatched, a sub-build runs to completion,
//! and a failure in one branch never preempts its siblings.

use crate::breaker::Breaker;
use std::future::Future;
use tokio::task::JoinSet;

/// A counted group of concurrent sub-builds.
#[derive(Default)]
pub struct JoinGroup {
    set: JoinSet<Vec<Breaker>>,
}

impl JoinGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fork<F>(&mut self, task: F)
    where
        F: Future<Output = Vec<Breaker>> + Send + 'static,
    {
        self.set.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Await every forked task and merge their breakers. A panicked or
    /// cancelled task becomes a breaker instead of being dropped.
    pub async fn join(mut self) -> Vec<Breaker> {
        let mut merged = Vec::new();
        while let Some(finished) = self.set.join_next().await {
            match finished {
                Ok(breakers) => merged.extend(breakers),
                Err(err) => merged.push(Breaker::new(
                    "<join>",
                    format!("sub-build task failed: {err}"),
                )),
            }
        }
        merged
    }
}
