//! Scheduled HTTP probing of external endpoints.
//!
//! The [`scheduler::ProbeScheduler`] fires each monitoring target on its
//! cron schedule (seconds precision) and the [`executor`] runs the actual
//! check: request build with auth, dispatch under the target's timeout,
//! capture, and assertion evaluation. One firing produces exactly one
//! [`ProbeResult`]; there are no retries at this layer.

pub mod assertions;
pub mod executor;
pub mod scheduler;


use apiwatch_common::types::ProbeResult;
use async_trait::async_trait;

/// Receives every probe result as it is produced; implemented by the alert
/// layer.
#[async_trait]
pub trait ProbeSink: Send + Sync {
    async fn publish(&self, result: &ProbeResult);
}
