//! Concurrent migration-status annotation.
//!
//! Resolver calls fan out over a [`JoinSet`], gated by a [`Semaphore`] so
//! that at most `concurrency` privileged connections are open at once.
//! Each task writes into the slot of its candidate index, so the output
//! order never depends on completion order.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::RosterResult;
use crate::migration::{MigrationStatus, UnavailableReason};

/// Default fan-out width for status introspection.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Resolves the migration status of one database by name.
pub type ResolveFn =
    Arc<dyn Fn(String) -> BoxFuture<'static, RosterResult<MigrationStatus>> + Send + Sync>;

/// One report row before assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedDatabase {
    pub name: String,
    pub is_current: bool,
    /// `None` when status reporting was off for the run.
    pub status: Option<MigrationStatus>,
}

/// Pair every candidate with its migration status.
///
/// Without a resolver no work is spawned and every status is `None`.
/// With one, `result[i]` always describes `candidates[i]`; a resolver
/// that errors or panics only turns its own row into
/// `Unavailable(Internal)`.
pub async fn annotate(
    candidates: &[String],
    current: &str,
    resolver: Option<ResolveFn>,
    concurrency: usize,
) -> Vec<AnnotatedDatabase> {
    let statuses: Vec<Option<MigrationStatus>> = match resolver {
        Some(resolver) => resolve_all(candidates, resolver, concurrency)
            .await
            .into_iter()
            .map(Some)
            .collect(),
        None => vec![None; candidates.len()],
    };

    candidates
        .iter()
        .zip(statuses)
        .map(|(name, status)| AnnotatedDatabase {
            name: name.clone(),
            is_current: name == current,
            status,
        })
        .collect()
}

async fn resolve_all(
    candidates: &[String],
    resolver: ResolveFn,
    concurrency: usize,
) -> Vec<MigrationStatus> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut set = JoinSet::new();

    for (idx, name) in candidates.iter().enumerate() {
        let semaphore = semaphore.clone();
        let resolver = resolver.clone();
        let name = name.clone();

        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let call = async { resolver(name.clone()).await };
            let outcome = AssertUnwindSafe(call).catch_unwind().await;
            (idx, settle(&name, outcome))
        });
    }

    let mut slots: Vec<Option<MigrationStatus>> = vec![None; candidates.len()];
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, status)) => slots[idx] = Some(status),
            Err(e) => tracing::warn!(%e, "migration status task did not finish"),
        }
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.unwrap_or_else(|| {
                MigrationStatus::Unavailable(UnavailableReason::Internal(
                    "status task did not finish".to_string(),
                ))
            })
        })
        .collect()
}

fn settle(
    name: &str,
    outcome: Result<RosterResult<MigrationStatus>, Box<dyn Any + Send>>,
) -> MigrationStatus {
    match outcome {
        Ok(Ok(status)) => {
            tracing::debug!(database = %name, ?status, "resolved migration status");
            status
        }
        Ok(Err(e)) => {
            tracing::warn!(database = %name, error = %e, "migration status resolver failed");
            MigrationStatus::Unavailable(UnavailableReason::Internal(e.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            tracing::warn!(database = %name, %message, "migration status resolver panicked");
            MigrationStatus::Unavailable(UnavailableReason::Internal(message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "resolver panicked".to_string()
    }
}
