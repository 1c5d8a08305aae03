//! Bounded-concurrency per-entity fetch executor.
//!
//! Each task runs on its own tokio task behind a shared semaphore, so at
//! most `max_concurrency` fetches are in flight for one call. A failure,
//! timeout or panic in one entity is recorded and never reaches siblings.
//! Successful sub-tables are concatenated in completion order. Dropping the
//! `run` future aborts every task it spawned.

use crate::checkpoint::{CheckpointKey, CheckpointStore};
use crate::error::{FailureKind, FetchError};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use statlayer_core::{Table, TableError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tracing::{debug, info, warn};

/// Identifier of one sub-entity (pitcher id, team/split pair, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Int(i64),
    Str(String),
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Int(v) => write!(f, "{}", v),
            EntityId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for EntityId {
    fn from(v: i64) -> Self {
        EntityId::Int(v)
    }
}

impl From<i32> for EntityId {
    fn from(v: i32) -> Self {
        EntityId::Int(v as i64)
    }
}

impl From<&str> for EntityId {
    fn from(v: &str) -> Self {
        EntityId::Str(v.to_string())
    }
}

impl From<String> for EntityId {
    fn from(v: String) -> Self {
        EntityId::Str(v)
    }
}

pub type EntityFetch =
    Arc<dyn Fn(EntityId) -> BoxFuture<'static, Result<Table, FetchError>> + Send + Sync>;

/// Wrap an async closure as an [`EntityFetch`].
pub fn entity_fetch<F, Fut>(f: F) -> EntityFetch
where
    F: Fn(EntityId) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Table, FetchError>> + Send + 'static,
{
    Arc::new(move |entity| Box::pin(f(entity)))
}

pub struct SubEntityTask {
    pub entity: EntityId,
    pub fetch: EntityFetch,
    pub cache_key: Option<CheckpointKey>,
}

impl SubEntityTask {
    pub fn new(entity: impl Into<EntityId>, fetch: EntityFetch) -> Self {
        Self {
            entity: entity.into(),
            fetch,
            cache_key: None,
        }
    }

    pub fn cached(mut self, key: CheckpointKey) -> Self {
        self.cache_key = Some(key);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityFailure {
    pub entity: EntityId,
    pub kind: FailureKind,
    pub message: String,
}

impl EntityFailure {
    fn new(entity: EntityId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            entity,
            kind,
            message: message.into(),
        }
    }

    fn from_fetch(entity: EntityId, error: &FetchError) -> Self {
        Self::new(entity, error.kind(), error.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct FanOutResult {
    /// Rows of every successful entity, in completion order
    pub table: Table,
    pub failures: Vec<EntityFailure>,
    pub succeeded: usize,
    pub cache_hits: usize,
}

impl FanOutResult {
    pub fn failed_entities(&self) -> Vec<&EntityId> {
        self.failures
            .iter()
            .filter(|f| f.kind != FailureKind::EmptyResult && f.kind != FailureKind::CacheIo)
            .map(|f| &f.entity)
            .collect()
    }
}

struct TaskReport {
    table: Option<Table>,
    cache_hit: bool,
    failures: Vec<EntityFailure>,
}

#[derive(Clone)]
pub struct FanOutExecutor {
    max_concurrency: usize,
    task_timeout: Duration,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl FanOutExecutor {
    pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            task_timeout: Self::DEFAULT_TASK_TIMEOUT,
            checkpoints: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Store used for tasks that carry a cache key.
    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every task and merge the successful sub-tables.
    ///
    /// Only a column type conflict between sub-tables fails the call; every
    /// per-entity problem ends up in [`FanOutResult::failures`].
    pub async fn run(&self, tasks: Vec<SubEntityTask>) -> Result<FanOutResult, TableError> {
        let start = Instant::now();
        let tasks = dedupe(tasks);
        let total = tasks.len();
        let limiter = Arc::new(Semaphore::new(self.max_concurrency));

        info!(
            "Fan-out: {} entities, concurrency {}, timeout {:?}",
            total, self.max_concurrency, self.task_timeout
        );

        // Dropping the set aborts whatever is still running
        let mut pending = JoinSet::new();
        let mut entities: HashMap<task::Id, EntityId> = HashMap::with_capacity(total);
        for task in tasks {
            let entity = task.entity.clone();
            let handle = pending.spawn(run_task(
                task,
                limiter.clone(),
                self.checkpoints.clone(),
                self.task_timeout,
            ));
            entities.insert(handle.id(), entity);
        }

        let mut result = FanOutResult::default();
        let mut tables = Vec::new();
        while let Some(joined) = pending.join_next_with_id().await {
            match joined {
                Ok((_, report)) => {
                    if report.cache_hit {
                        result.cache_hits += 1;
                    }
                    if let Some(table) = report.table {
                        result.succeeded += 1;
                        tables.push(table);
                    }
                    result.failures.extend(report.failures);
                }
                Err(join_err) => {
                    let Some(entity) = entities.remove(&join_err.id()) else {
                        continue;
                    };
                    warn!("Fan-out: entity {} panicked: {}", entity, join_err);
                    let error = FetchError::Panicked(join_err.to_string());
                    result.failures.push(EntityFailure::from_fetch(entity, &error));
                }
            }
        }

        result.table = Table::concat(&tables)?;
        info!(
            "Fan-out completed - {}/{} entities ({} cached), {} rows, {} failures in {}ms",
            result.succeeded,
            total,
            result.cache_hits,
            result.table.num_rows(),
            result.failures.len(),
            start.elapsed().as_millis()
        );
        Ok(result)
    }
}

fn dedupe(tasks: Vec<SubEntityTask>) -> Vec<SubEntityTask> {
    let mut seen = HashSet::new();
    let before = tasks.len();
    let unique: Vec<_> = tasks
        .into_iter()
        .filter(|t| seen.insert(t.entity.clone()))
        .collect();
    if unique.len() < before {
        debug!("Fan-out: dropped {} duplicate entities", before - unique.len());
    }
    unique
}

async fn run_task(
    task: SubEntityTask,
    limiter: Arc<Semaphore>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    timeout: Duration,
) -> TaskReport {
    let _permit = limiter.acquire_owned().await;
    let SubEntityTask {
        entity,
        fetch,
        cache_key,
    } = task;
    let mut report = TaskReport {
        table: None,
        cache_hit: false,
        failures: Vec::new(),
    };

    let cache = match (&checkpoints, cache_key) {
        (Some(store), Some(key)) => Some((store.clone(), key)),
        _ => None,
    };

    if let Some((store, key)) = &cache {
        match store.get(key).await {
            Ok(Some(table)) => {
                debug!("Fan-out: entity {} served from checkpoint {}", entity, key);
                report.cache_hit = true;
                report.table = Some(table);
                return report;
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Fan-out: entity {} checkpoint read failed: {}", entity, e);
                report
                    .failures
                    .push(EntityFailure::new(entity.clone(), FailureKind::CacheIo, e.to_string()));
            }
        }
    }

    let table = match tokio::time::timeout(timeout, fetch(entity.clone())).await {
        Ok(Ok(table)) => table,
        Ok(Err(e)) => {
            warn!("Fan-out: entity {} failed: {}", entity, e);
            report.failures.push(EntityFailure::from_fetch(entity, &e));
            return report;
        }
        Err(_) => {
            warn!("Fan-out: entity {} timed out after {:?}", entity, timeout);
            let e = FetchError::Timeout(timeout);
            report.failures.push(EntityFailure::from_fetch(entity, &e));
            return report;
        }
    };

    if table.is_empty() {
        report.failures.push(EntityFailure::new(
            entity.clone(),
            FailureKind::EmptyResult,
            "no rows",
        ));
    }

    // Persist before merging; a failed write only costs a refetch next run
    if let Some((store, key)) = &cache {
        if let Err(e) = store.put(key, &table).await {
            warn!("Fan-out: entity {} checkpoint write failed: {}", entity, e);
            report
                .failures
                .push(EntityFailure::new(entity, FailureKind::CacheIo, e.to_string()));
        }
    }

    report.table = Some(table);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use statlayer_core::ColumnType;

    fn one_row(id: i64) -> Table {
        Table::from_rows(&[("pitcher_id", ColumnType::Int)], vec![vec![id.into()]]).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_entities_fetched_once() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let fetch = entity_fetch(move |entity| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async move {
                match entity {
                    EntityId::Int(id) => Ok(one_row(id)),
                    EntityId::Str(s) => Err(FetchError::Unavailable(s)),
                }
            }
        });

        let tasks = vec![
            SubEntityTask::new(7, fetch.clone()),
            SubEntityTask::new(7, fetch.clone()),
            SubEntityTask::new(8, fetch),
        ];
        let result = FanOutExecutor::new(2).run(tasks).await.unwrap();

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(result.table.num_rows(), 2);
        assert!(result.failures.is_empty());
    }

    #[tokio::test]
    async fn test_empty_task_list() {
        let result = FanOutExecutor::new(4).run(Vec::new()).await.unwrap();
        assert!(result.table.is_empty());
        assert_eq!(result.succeeded, 0);
    }

    #[test]
    fn test_entity_id_display_and_serde() {
        assert_eq!(EntityId::from(42).to_string(), "42");
        assert_eq!(EntityId::from("Cubs/vsLHP").to_string(), "Cubs/vsLHP");
        assert_eq!(serde_json::to_string(&EntityId::Int(2)).unwrap(), "2");
    }
}
