//! In-memory supportability store.
//!
//! Thread-safe (`RwLock` over one table struct), suitable for tests and
//! single-instance local runs. The `save_run` bundle commits under one
//! write lock, mirroring the transactional guarantee of the SQL adapters.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::model::records::{
    AsyncOperation, DecisionFilter, IdempotencyRecord, LineageEdge, OperationFilter, Page,
    RunFilter, RunRecord, SupportabilitySummary, WorkflowDecision,
};
use crate::domain::ports::{StoreResult, SupportabilityStore};

use super::cursor;

#[derive(Default)]
struct Tables {
    runs: Vec<RunRecord>,
    artifacts: BTreeMap<String, serde_json::Value>,
    idempotency: BTreeMap<String, IdempotencyRecord>,
    idempotency_history: Vec<IdempotencyRecord>,
    operations: Vec<AsyncOperation>,
    decisions: Vec<WorkflowDecision>,
    lineage: Vec<LineageEdge>,
}

pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest-first page over (created_at, id) with an exclusive cursor.
fn paginate<T: Clone>(
    items: Vec<T>,
    cursor: Option<&str>,
    limit: usize,
    key: impl Fn(&T) -> (DateTime<Utc>, String),
) -> StoreResult<Page<T>> {
    let mut sorted = items;
    sorted.sort_by(|a, b| key(b).cmp(&key(a)));

    let start = match cursor {
        Some(raw) => {
            let decoded = cursor::decode(raw)?;
            sorted
                .iter()
                .position(|item| key(item) < decoded)
                .unwrap_or(sorted.len())
        }
        None => 0,
    };

    let page: Vec<T> = sorted.into_iter().skip(start).take(limit + 1).collect();
    let has_more = page.len() > limit;
    let items: Vec<T> = page.into_iter().take(limit).collect();
    let next_cursor = if has_more {
        items.last().map(|item| {
            let (created_at, id) = key(item);
            cursor::encode(created_at, &id)
        })
    } else {
        None
    };
    Ok(Page { items, next_cursor })
}

fn within(created_at: DateTime<Utc>, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
    from.map(|f| created_at >= f).unwrap_or(true) && to.map(|t| created_at <= t).unwrap_or(true)
}

#[async_trait]
impl SupportabilityStore for MemoryStore {
    async fn save_run(
        &self,
        run: &RunRecord,
        idempotency: Option<&IdempotencyRecord>,
        lineage: &[LineageEdge],
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.runs.push(run.clone());
        if let Some(record) = idempotency {
            tables
                .idempotency
                .insert(record.idempotency_key.clone(), record.clone());
            tables.idempotency_history.push(record.clone());
        }
        tables.lineage.extend(lineage.iter().cloned());
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<Option<RunRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .iter()
            .find(|r| r.rebalance_run_id == run_id)
            .cloned())
    }

    async fn get_run_by_correlation(&self, correlation_id: &str) -> StoreResult<Option<RunRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .iter()
            .rev()
            .find(|r| r.correlation_id == correlation_id)
            .cloned())
    }

    async fn get_run_by_request_hash(
        &self,
        request_hash: &str,
    ) -> StoreResult<Option<RunRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .runs
            .iter()
            .rev()
            .find(|r| r.request_hash == request_hash)
            .cloned())
    }

    async fn list_runs(
        &self,
        filter: &RunFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<RunRecord>> {
        let tables = self.tables.read().await;
        let filtered: Vec<RunRecord> = tables
            .runs
            .iter()
            .filter(|r| within(r.created_at, filter.from, filter.to))
            .filter(|r| filter.status.as_ref().map(|s| &r.status == s).unwrap_or(true))
            .filter(|r| {
                filter
                    .portfolio_id
                    .as_ref()
                    .map(|p| &r.portfolio_id == p)
                    .unwrap_or(true)
            })
            .filter(|r| {
                filter
                    .request_hash
                    .as_ref()
                    .map(|h| &r.request_hash == h)
                    .unwrap_or(true)
            })
            .filter(|r| {
                filter
                    .correlation_id
                    .as_ref()
                    .map(|c| &r.correlation_id == c)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        paginate(filtered, cursor, limit, |r| {
            (r.created_at, r.rebalance_run_id.clone())
        })
    }

    async fn save_run_artifact(
        &self,
        run_id: &str,
        artifact: &serde_json::Value,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.artifacts.insert(run_id.to_string(), artifact.clone());
        Ok(())
    }

    async fn get_run_artifact(&self, run_id: &str) -> StoreResult<Option<serde_json::Value>> {
        let tables = self.tables.read().await;
        Ok(tables.artifacts.get(run_id).cloned())
    }

    async fn get_idempotency_by_key(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.idempotency.get(key).cloned())
    }

    async fn list_idempotency_history(&self, key: &str) -> StoreResult<Vec<IdempotencyRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .idempotency_history
            .iter()
            .filter(|r| r.idempotency_key == key)
            .cloned()
            .collect())
    }

    async fn create_async_operation(&self, operation: &AsyncOperation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables
            .operations
            .iter()
            .any(|o| o.operation_id == operation.operation_id)
        {
            return Err(StoreError::backend("duplicate operation id"));
        }
        tables.operations.push(operation.clone());
        Ok(())
    }

    async fn update_async_operation(&self, operation: &AsyncOperation) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .operations
            .iter_mut()
            .find(|o| o.operation_id == operation.operation_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "operation",
                id: operation.operation_id.clone(),
            })?;
        *slot = operation.clone();
        Ok(())
    }

    async fn get_async_operation(
        &self,
        operation_id: &str,
    ) -> StoreResult<Option<AsyncOperation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .operations
            .iter()
            .find(|o| o.operation_id == operation_id)
            .cloned())
    }

    async fn get_async_operation_by_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Option<AsyncOperation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .operations
            .iter()
            .find(|o| o.correlation_id == correlation_id)
            .cloned())
    }

    async fn list_async_operations(
        &self,
        filter: &OperationFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<AsyncOperation>> {
        let tables = self.tables.read().await;
        let filtered: Vec<AsyncOperation> = tables
            .operations
            .iter()
            .filter(|o| within(o.created_at, filter.from, filter.to))
            .filter(|o| {
                filter
                    .status
                    .as_ref()
                    .map(|s| &o.status.to_string() == s)
                    .unwrap_or(true)
            })
            .filter(|o| {
                filter
                    .operation_type
                    .as_ref()
                    .map(|t| &o.operation_type == t)
                    .unwrap_or(true)
            })
            .filter(|o| {
                filter
                    .correlation_id
                    .as_ref()
                    .map(|c| &o.correlation_id == c)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        paginate(filtered, cursor, limit, |o| {
            (o.created_at, o.operation_id.clone())
        })
    }

    async fn purge_expired_async_operations(&self, ttl_seconds: i64) -> StoreResult<u64> {
        let cutoff = Utc::now() - Duration::seconds(ttl_seconds);
        let mut tables = self.tables.write().await;
        let before = tables.operations.len();
        tables.operations.retain(|o| {
            !(o.status.is_terminal()
                && o.completed_at.map(|t| t < cutoff).unwrap_or(false))
        });
        Ok((before - tables.operations.len()) as u64)
    }

    async fn append_workflow_decision(&self, decision: &WorkflowDecision) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.decisions.push(decision.clone());
        Ok(())
    }

    async fn list_workflow_decisions(
        &self,
        filter: &DecisionFilter,
        cursor: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowDecision>> {
        let tables = self.tables.read().await;
        let filtered: Vec<WorkflowDecision> = tables
            .decisions
            .iter()
            .filter(|d| within(d.decided_at, filter.from, filter.to))
            .filter(|d| {
                filter
                    .actor_id
                    .as_ref()
                    .map(|a| &d.actor_id == a)
                    .unwrap_or(true)
            })
            .filter(|d| {
                filter
                    .action
                    .as_ref()
                    .map(|a| &d.action.to_string() == a)
                    .unwrap_or(true)
            })
            .filter(|d| {
                filter
                    .reason_code
                    .as_ref()
                    .map(|r| &d.reason_code == r)
                    .unwrap_or(true)
            })
            .filter(|d| {
                filter
                    .correlation_id
                    .as_ref()
                    .map(|c| &d.correlation_id == c)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        paginate(filtered, cursor, limit, |d| {
            (d.decided_at, d.decision_id.clone())
        })
    }

    async fn list_workflow_decisions_by_run(
        &self,
        run_id: &str,
    ) -> StoreResult<Vec<WorkflowDecision>> {
        let tables = self.tables.read().await;
        Ok(tables
            .decisions
            .iter()
            .filter(|d| d.run_id == run_id)
            .cloned()
            .collect())
    }

    async fn append_lineage_edge(&self, edge: &LineageEdge) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.lineage.push(edge.clone());
        Ok(())
    }

    async fn list_lineage_edges(&self, entity_id: &str) -> StoreResult<Vec<LineageEdge>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lineage
            .iter()
            .filter(|e| e.source_entity_id == entity_id || e.target_entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn supportability_summary(&self) -> StoreResult<SupportabilitySummary> {
        let tables = self.tables.read().await;
        let mut summary = SupportabilitySummary {
            total_runs: tables.runs.len() as i64,
            total_operations: tables.operations.len() as i64,
            total_idempotency_keys: tables.idempotency.len() as i64,
            total_workflow_decisions: tables.decisions.len() as i64,
            total_lineage_edges: tables.lineage.len() as i64,
            ..SupportabilitySummary::default()
        };
        for run in &tables.runs {
            *summary.runs_by_status.entry(run.status.clone()).or_default() += 1;
        }
        for operation in &tables.operations {
            *summary
                .operations_by_status
                .entry(operation.status.to_string())
                .or_default() += 1;
        }
        Ok(summary)
    }

    async fn purge_expired_runs(&self, retention_days: i64) -> StoreResult<u64> {
        let cutoff = Utc::now() - Duration::days(retention_days);
        let mut tables = self.tables.write().await;

        let purged: Vec<RunRecord> = tables
            .runs
            .iter()
            .filter(|r| r.created_at < cutoff)
            .cloned()
            .collect();
        if purged.is_empty() {
            return Ok(0);
        }

        let run_ids: Vec<&str> = purged.iter().map(|r| r.rebalance_run_id.as_str()).collect();
        let correlations: Vec<&str> = purged.iter().map(|r| r.correlation_id.as_str()).collect();
        let keys: Vec<&str> = purged
            .iter()
            .filter_map(|r| r.idempotency_key.as_deref())
            .collect();

        tables.runs.retain(|r| r.created_at >= cutoff);
        tables
            .artifacts
            .retain(|run_id, _| !run_ids.contains(&run_id.as_str()));
        tables
            .idempotency
            .retain(|_, record| !run_ids.contains(&record.run_id.as_str()));
        tables
            .idempotency_history
            .retain(|record| !run_ids.contains(&record.run_id.as_str()));
        tables
            .operations
            .retain(|o| !correlations.contains(&o.correlation_id.as_str()));
        tables
            .decisions
            .retain(|d| !run_ids.contains(&d.run_id.as_str()));
        tables.lineage.retain(|e| {
            !run_ids.contains(&e.target_entity_id.as_str())
                && !run_ids.contains(&e.source_entity_id.as_str())
                && !keys.contains(&e.source_entity_id.as_str())
                && !correlations.contains(&e.source_entity_id.as_str())
        });

        Ok(purged.len() as u64)
    }

    async fn ready(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(id: &str, created_at: DateTime<Utc>) -> RunRecord {
        RunRecord {
            rebalance_run_id: id.to_string(),
            correlation_id: format!("c_{id}"),
            request_hash: format!("sha256:{id}"),
            idempotency_key: Some(format!("key_{id}")),
            portfolio_id: "p1".to_string(),
            status: "READY".to_string(),
            created_at,
            result_json: json!({"run_id": id}),
        }
    }

    #[tokio::test]
    async fn test_pagination_terminates() {
        let store = MemoryStore::new();
        let base = Utc::now();
        for i in 0..5 {
            store
                .save_run(
                    &run(&format!("run_{i}"), base - Duration::minutes(i)),
                    None,
                    &[],
                )
                .await
                .unwrap();
        }

        let mut cursor: Option<String> = None;
        let mut seen = Vec::new();
        let mut pages = 0;
        loop {
            let page = store
                .list_runs(&RunFilter::default(), cursor.as_deref(), 2)
                .await
                .unwrap();
            seen.extend(page.items.iter().map(|r| r.rebalance_run_id.clone()));
            pages += 1;
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
            assert!(pages < 10, "pagination must terminate");
        }
        assert_eq!(seen.len(), 5);
        // Newest first.
        assert_eq!(seen[0], "run_0");
        assert_eq!(seen[4], "run_4");
    }

    #[tokio::test]
    async fn test_purge_cascades() {
        let store = MemoryStore::new();
        let old = Utc::now() - Duration::days(100);
        let old_run = run("old", old);
        let idempotency = IdempotencyRecord {
            idempotency_key: "key_old".to_string(),
            request_hash: "sha256:old".to_string(),
            run_id: "old".to_string(),
            created_at: old,
        };
        let lineage = LineageEdge {
            source_entity_id: "c_old".to_string(),
            edge_type: crate::domain::model::records::LineageEdgeType::CorrelationToRun,
            target_entity_id: "old".to_string(),
            created_at: old,
            metadata: None,
        };
        store
            .save_run(&old_run, Some(&idempotency), &[lineage])
            .await
            .unwrap();
        store
            .save_run_artifact("old", &json!({"artifact": true}))
            .await
            .unwrap();
        store.save_run(&run("new", Utc::now()), None, &[]).await.unwrap();

        let purged = store.purge_expired_runs(30).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_run("old").await.unwrap().is_none());
        assert!(store.get_run("new").await.unwrap().is_some());
        assert!(store.get_run_artifact("old").await.unwrap().is_none());
        assert!(store.get_idempotency_by_key("key_old").await.unwrap().is_none());
        assert!(store.list_lineage_edges("old").await.unwrap().is_empty());

        // Idempotent across repeated invocations.
        assert_eq!(store.purge_expired_runs(30).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_filters() {
        let store = MemoryStore::new();
        let mut blocked = run("blocked", Utc::now());
        blocked.status = "BLOCKED".to_string();
        store.save_run(&blocked, None, &[]).await.unwrap();
        store.save_run(&run("ready", Utc::now()), None, &[]).await.unwrap();

        let filter = RunFilter {
            status: Some("BLOCKED".to_string()),
            ..RunFilter::default()
        };
        let page = store.list_runs(&filter, None, 10).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].rebalance_run_id, "blocked");
    }
}
