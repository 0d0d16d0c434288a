//! SQL supportability store (SQLite and Postgres via the shared dialect).
//!
//! All decimals live inside JSON documents; columns are text keys, text
//! timestamps, and text JSON. The run bundle (run + idempotency + lineage)
//! commits in one transaction.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::Any;

use crate::domain::errors::StoreError;
use crate::domain::model::records::{
    AsyncOperation, DecisionFilter, IdempotencyRecord, LineageEdge, LineageEdgeType,
    OperationFilter, Page, RunFilter, RunRecord, SupportabilitySummary, WorkflowDecision,
};
use crate::domain::ports::{StoreResult, SupportabilityStore};

use super::cursor;
use super::database::{Database, decode_json, decode_timestamp, encode_json, encode_timestamp};
use super::migrations::{self, dpm_migrations};

pub struct SqlStore {
    database: Database,
}

impl SqlStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        migrations::run_migrations(
            &self.database.pool,
            &dpm_migrations(),
            self.database.is_postgres(),
        )
        .await
    }
}

fn sql_error(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::backend(format!("{context}: {e}"))
}

type RunRow = (
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
);

fn run_from_row(row: RunRow) -> StoreResult<RunRecord> {
    Ok(RunRecord {
        rebalance_run_id: row.0,
        correlation_id: row.1,
        request_hash: row.2,
        idempotency_key: row.3,
        portfolio_id: row.4,
        status: row.5,
        created_at: decode_timestamp(&row.6)?,
        result_json: decode_json(&row.7)?,
    })
}

const RUN_COLUMNS: &str = "rebalance_run_id, correlation_id, request_hash, idempotency_key, \
                           portfolio_id, status, created_at, result_json";

type OperationRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn operation_from_row(row: OperationRow) -> StoreResult<AsyncOperation> {
    Ok(AsyncOperation {
        operation_id: row.0,
        operation_type: row.1,
        status: row
            .2
            .parse()
            .map_err(|e: String| StoreError::backend(e))?,
        correlation_id: row.3,
        created_at: decode_timestamp(&row.4)?,
        updated_at: decode_timestamp(&row.5)?,
        completed_at: row.6.as_deref().map(decode_timestamp).transpose()?,
        result_json: row.7.as_deref().map(decode_json).transpose()?,
        error_json: row.8.as_deref().map(decode_json).transpose()?,
        request_json: decode_json(&row.9)?,
    })
}

const OPERATION_COLUMNS: &str = "operation_id, operation_type, status, correlation_id, \
                                 created_at, updated_at, completed_at, result_json, \
                                 error_json, request_json";

type DecisionRow = (
    String,
    String,
    String,
    String,
    Option<String>,
    String,
    String,
    String,
);

fn decision_from_row(row: DecisionRow) -> StoreResult<WorkflowDecision> {
    let action = match row.2.as_str() {
        "APPROVE" => crate::domain::model::records::WorkflowAction::Approve,
        "REJECT" => crate::domain::model::records::WorkflowAction::Reject,
        "REQUEST_CHANGES" => crate::domain::model::records::WorkflowAction::RequestChanges,
        other => return Err(StoreError::backend(format!("unknown action: {other}"))),
    };
    Ok(WorkflowDecision {
        decision_id: row.0,
        run_id: row.1,
        action,
        reason_code: row.3,
        comment: row.4,
        actor_id: row.5,
        decided_at: decode_timestamp(&row.6)?,
        correlation_id: row.7,
    })
}

fn edge_type_from(raw: &str) -> StoreResult<LineageEdgeType> {
    match raw {
        "CORRELATION_TO_RUN" => Ok(LineageEdgeType::CorrelationToRun),
        "IDEMPOTENCY_TO_RUN" => Ok(LineageEdgeType::IdempotencyToRun),
        "OPERATION_TO_CORRELATION" => Ok(LineageEdgeType::OperationToCorrelation),
        other => Err(StoreError::backend(format!("unknown edge type: {other}"))),
    }
}

#[async_trait]
impl SupportabilityStore for SqlStore {
    async fn save_run(
        &self,
        run: &RunRecord,
        idempotency: Option<&IdempotencyRecord>,
        lineage: &[LineageEdge],
    ) -> StoreResult<()> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .map_err(sql_error("begin save_run"))?;

        sqlx::query(
            "INSERT INTO rebalance_runs (rebalance_run_id, correlation_id, request_hash, \
             idempotency_key, portfolio_id, status, created_at, result_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&run.rebalance_run_id)
        .bind(&run.correlation_id)
        .bind(&run.request_hash)
        .bind(run.idempotency_key.as_deref())
        .bind(&run.portfolio_id)
        .bind(&run.status)
        .bind(encode_timestamp(run.created_at))
        .bind(encode_json(&run.result_json))
        .execute(&mut *tx)
        .await
        .map_err(sql_error("insert run"))?;

        if let Some(record) = idempotency {
            sqlx::query(
                "INSERT INTO idempotency_keys (idempotency_key, request_hash, run_id, created_at) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (idempotency_key) DO UPDATE SET \
                 request_hash = excluded.request_hash, run_id = excluded.run_id, \
                 created_at = excluded.created_at",
            )
            .bind(&record.idempotency_key)
            .bind(&record.request_hash)
            .bind(&record.run_id)
            .bind(encode_timestamp(record.created_at))
            .execute(&mut *tx)
            .await
            .map_err(sql_error("upsert idempotency"))?;

            sqlx::query(
                "INSERT INTO idempotency_history (idempotency_key, request_hash, run_id, created_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(&record.idempotency_key)
            .bind(&record.request_hash)
            .bind(&record.run_id)
            .bind(encode_timestamp(record.created_at))
            .execute(&mut *tx)
            .await
            .map_err(sql_error("append idempotency history"))?;
        }

        for edge in lineage {
            sqlx::query(
                "INSERT INTO lineage_edges (source_entity_id, edge_type, target_entity_id, \
                 created_at, metadata) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&edge.source_entity_id)
            .bind(edge.edge_type.to_string())
            .bind(&edge.target_entity_id)
            .bind(encode_timestamp(edge.created_at))
            .bind(edge.metadata.as_ref().map(encode_json))
            .execute(&mut *tx)
            .await
            .map_err(sql_error("append lineage"))?;
        }

        tx.commit().await.map_err(sql_error("commit save_run"))?;
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> StoreResult<Option<RunRecord>> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM rebalance_runs WHERE rebalance_run_id = $1"
        ))
        .bind(run_id)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get run"))?;
        row.map(run_from_row).transpose()
    }

    async fn get_run_by_correlation(&self, correlation_id: &str) -> StoreResult<Option<RunRecord>> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM rebalance_runs WHERE correlation_id = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(correlation_id)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get run by correlation"))?;
        row.map(run_from_row).transpose()
    }

    async fn get_run_by_request_hash(
        &self,
        request_hash: &str,
    ) -> StoreResult<Option<RunRecord>> {
        let row: Option<RunRow> = sqlx::query_as(&format!(
            "SELECT {RUN_COLUMNS} FROM rebalance_runs WHERE request_hash = $1 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(request_hash)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get run by request hash"))?;
        row.map(run_from_row).transpose()
    }

    async fn list_runs(
        &self,
        filter: &RunFilter,
        cursor_raw: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<RunRecord>> {
        let mut sql = format!("SELECT {RUN_COLUMNS} FROM rebalance_runs WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        let add = |sql: &mut String, clause: &str, value: String, binds: &mut Vec<String>| {
            binds.push(value);
            sql.push_str(&clause.replace('?', &format!("${}", binds.len())));
        };

        if let Some(from) = filter.from {
            add(&mut sql, " AND created_at >= ?", encode_timestamp(from), &mut binds);
        }
        if let Some(to) = filter.to {
            add(&mut sql, " AND created_at <= ?", encode_timestamp(to), &mut binds);
        }
        if let Some(status) = &filter.status {
            add(&mut sql, " AND status = ?", status.clone(), &mut binds);
        }
        if let Some(portfolio_id) = &filter.portfolio_id {
            add(&mut sql, " AND portfolio_id = ?", portfolio_id.clone(), &mut binds);
        }
        if let Some(request_hash) = &filter.request_hash {
            add(&mut sql, " AND request_hash = ?", request_hash.clone(), &mut binds);
        }
        if let Some(correlation_id) = &filter.correlation_id {
            add(&mut sql, " AND correlation_id = ?", correlation_id.clone(), &mut binds);
        }
        if let Some(raw) = cursor_raw {
            let (created_at, id) = cursor::decode(raw)?;
            let ts = encode_timestamp(created_at);
            binds.push(ts.clone());
            binds.push(ts);
            binds.push(id);
            let n = binds.len();
            sql.push_str(&format!(
                " AND (created_at < ${} OR (created_at = ${} AND rebalance_run_id < ${}))",
                n - 2,
                n - 1,
                n
            ));
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC, rebalance_run_id DESC LIMIT {}",
            limit + 1
        ));

        let mut query = sqlx::query_as::<Any, RunRow>(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query
            .fetch_all(&self.database.pool)
            .await
            .map_err(sql_error("list runs"))?;

        let has_more = rows.len() > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit));
        for row in rows.into_iter().take(limit) {
            items.push(run_from_row(row)?);
        }
        let next_cursor = if has_more {
            items
                .last()
                .map(|r| cursor::encode(r.created_at, &r.rebalance_run_id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn save_run_artifact(
        &self,
        run_id: &str,
        artifact: &serde_json::Value,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO run_artifacts (run_id, artifact_json, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (run_id) DO UPDATE SET artifact_json = excluded.artifact_json",
        )
        .bind(run_id)
        .bind(encode_json(artifact))
        .bind(encode_timestamp(Utc::now()))
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("save artifact"))?;
        Ok(())
    }

    async fn get_run_artifact(&self, run_id: &str) -> StoreResult<Option<serde_json::Value>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT artifact_json FROM run_artifacts WHERE run_id = $1")
                .bind(run_id)
                .fetch_optional(&self.database.pool)
                .await
                .map_err(sql_error("get artifact"))?;
        row.map(|(raw,)| decode_json(&raw)).transpose()
    }

    async fn get_idempotency_by_key(&self, key: &str) -> StoreResult<Option<IdempotencyRecord>> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT idempotency_key, request_hash, run_id, created_at \
             FROM idempotency_keys WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get idempotency"))?;
        row.map(|(idempotency_key, request_hash, run_id, created_at)| {
            Ok(IdempotencyRecord {
                idempotency_key,
                request_hash,
                run_id,
                created_at: decode_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    async fn list_idempotency_history(&self, key: &str) -> StoreResult<Vec<IdempotencyRecord>> {
        let rows: Vec<(String, String, String, String)> = sqlx::query_as(
            "SELECT idempotency_key, request_hash, run_id, created_at \
             FROM idempotency_history WHERE idempotency_key = $1 ORDER BY created_at ASC",
        )
        .bind(key)
        .fetch_all(&self.database.pool)
        .await
        .map_err(sql_error("list idempotency history"))?;
        rows.into_iter()
            .map(|(idempotency_key, request_hash, run_id, created_at)| {
                Ok(IdempotencyRecord {
                    idempotency_key,
                    request_hash,
                    run_id,
                    created_at: decode_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    async fn create_async_operation(&self, operation: &AsyncOperation) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO async_operations (operation_id, operation_type, status, correlation_id, \
             created_at, updated_at, completed_at, result_json, error_json, request_json) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&operation.operation_id)
        .bind(&operation.operation_type)
        .bind(operation.status.to_string())
        .bind(&operation.correlation_id)
        .bind(encode_timestamp(operation.created_at))
        .bind(encode_timestamp(operation.updated_at))
        .bind(operation.completed_at.map(encode_timestamp))
        .bind(operation.result_json.as_ref().map(encode_json))
        .bind(operation.error_json.as_ref().map(encode_json))
        .bind(encode_json(&operation.request_json))
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("create operation"))?;
        Ok(())
    }

    async fn update_async_operation(&self, operation: &AsyncOperation) -> StoreResult<()> {
        let updated = sqlx::query(
            "UPDATE async_operations SET status = $1, updated_at = $2, completed_at = $3, \
             result_json = $4, error_json = $5 WHERE operation_id = $6",
        )
        .bind(operation.status.to_string())
        .bind(encode_timestamp(operation.updated_at))
        .bind(operation.completed_at.map(encode_timestamp))
        .bind(operation.result_json.as_ref().map(encode_json))
        .bind(operation.error_json.as_ref().map(encode_json))
        .bind(&operation.operation_id)
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("update operation"))?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "operation",
                id: operation.operation_id.clone(),
            });
        }
        Ok(())
    }

    async fn get_async_operation(
        &self,
        operation_id: &str,
    ) -> StoreResult<Option<AsyncOperation>> {
        let row: Option<OperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM async_operations WHERE operation_id = $1"
        ))
        .bind(operation_id)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get operation"))?;
        row.map(operation_from_row).transpose()
    }

    async fn get_async_operation_by_correlation(
        &self,
        correlation_id: &str,
    ) -> StoreResult<Option<AsyncOperation>> {
        let row: Option<OperationRow> = sqlx::query_as(&format!(
            "SELECT {OPERATION_COLUMNS} FROM async_operations WHERE correlation_id = $1"
        ))
        .bind(correlation_id)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get operation by correlation"))?;
        row.map(operation_from_row).transpose()
    }

    async fn list_async_operations(
        &self,
        filter: &OperationFilter,
        cursor_raw: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<AsyncOperation>> {
        let mut sql = format!("SELECT {OPERATION_COLUMNS} FROM async_operations WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(from) = filter.from {
            binds.push(encode_timestamp(from));
            sql.push_str(&format!(" AND created_at >= ${}", binds.len()));
        }
        if let Some(to) = filter.to {
            binds.push(encode_timestamp(to));
            sql.push_str(&format!(" AND created_at <= ${}", binds.len()));
        }
        if let Some(status) = &filter.status {
            binds.push(status.clone());
            sql.push_str(&format!(" AND status = ${}", binds.len()));
        }
        if let Some(operation_type) = &filter.operation_type {
            binds.push(operation_type.clone());
            sql.push_str(&format!(" AND operation_type = ${}", binds.len()));
        }
        if let Some(correlation_id) = &filter.correlation_id {
            binds.push(correlation_id.clone());
            sql.push_str(&format!(" AND correlation_id = ${}", binds.len()));
        }
        if let Some(raw) = cursor_raw {
            let (created_at, id) = cursor::decode(raw)?;
            let ts = encode_timestamp(created_at);
            binds.push(ts.clone());
            binds.push(ts);
            binds.push(id);
            let n = binds.len();
            sql.push_str(&format!(
                " AND (created_at < ${} OR (created_at = ${} AND operation_id < ${}))",
                n - 2,
                n - 1,
                n
            ));
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC, operation_id DESC LIMIT {}",
            limit + 1
        ));

        let mut query = sqlx::query_as::<Any, OperationRow>(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query
            .fetch_all(&self.database.pool)
            .await
            .map_err(sql_error("list operations"))?;

        let has_more = rows.len() > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit));
        for row in rows.into_iter().take(limit) {
            items.push(operation_from_row(row)?);
        }
        let next_cursor = if has_more {
            items
                .last()
                .map(|o| cursor::encode(o.created_at, &o.operation_id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn purge_expired_async_operations(&self, ttl_seconds: i64) -> StoreResult<u64> {
        let cutoff = encode_timestamp(Utc::now() - Duration::seconds(ttl_seconds));
        let purged = sqlx::query(
            "DELETE FROM async_operations WHERE status IN ('SUCCEEDED', 'FAILED') \
             AND completed_at IS NOT NULL AND completed_at < $1",
        )
        .bind(&cutoff)
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("purge operations"))?;
        Ok(purged.rows_affected())
    }

    async fn append_workflow_decision(&self, decision: &WorkflowDecision) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO workflow_decisions (decision_id, run_id, action, reason_code, comment, \
             actor_id, decided_at, correlation_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&decision.decision_id)
        .bind(&decision.run_id)
        .bind(decision.action.to_string())
        .bind(&decision.reason_code)
        .bind(decision.comment.as_deref())
        .bind(&decision.actor_id)
        .bind(encode_timestamp(decision.decided_at))
        .bind(&decision.correlation_id)
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("append decision"))?;
        Ok(())
    }

    async fn list_workflow_decisions(
        &self,
        filter: &DecisionFilter,
        cursor_raw: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<WorkflowDecision>> {
        let mut sql = String::from(
            "SELECT decision_id, run_id, action, reason_code, comment, actor_id, decided_at, \
             correlation_id FROM workflow_decisions WHERE 1=1",
        );
        let mut binds: Vec<String> = Vec::new();

        if let Some(from) = filter.from {
            binds.push(encode_timestamp(from));
            sql.push_str(&format!(" AND decided_at >= ${}", binds.len()));
        }
        if let Some(to) = filter.to {
            binds.push(encode_timestamp(to));
            sql.push_str(&format!(" AND decided_at <= ${}", binds.len()));
        }
        if let Some(actor_id) = &filter.actor_id {
            binds.push(actor_id.clone());
            sql.push_str(&format!(" AND actor_id = ${}", binds.len()));
        }
        if let Some(action) = &filter.action {
            binds.push(action.clone());
            sql.push_str(&format!(" AND action = ${}", binds.len()));
        }
        if let Some(reason_code) = &filter.reason_code {
            binds.push(reason_code.clone());
            sql.push_str(&format!(" AND reason_code = ${}", binds.len()));
        }
        if let Some(correlation_id) = &filter.correlation_id {
            binds.push(correlation_id.clone());
            sql.push_str(&format!(" AND correlation_id = ${}", binds.len()));
        }
        if let Some(raw) = cursor_raw {
            let (decided_at, id) = cursor::decode(raw)?;
            let ts = encode_timestamp(decided_at);
            binds.push(ts.clone());
            binds.push(ts);
            binds.push(id);
            let n = binds.len();
            sql.push_str(&format!(
                " AND (decided_at < ${} OR (decided_at = ${} AND decision_id < ${}))",
                n - 2,
                n - 1,
                n
            ));
        }
        sql.push_str(&format!(
            " ORDER BY decided_at DESC, decision_id DESC LIMIT {}",
            limit + 1
        ));

        let mut query = sqlx::query_as::<Any, DecisionRow>(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query
            .fetch_all(&self.database.pool)
            .await
            .map_err(sql_error("list decisions"))?;

        let has_more = rows.len() > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit));
        for row in rows.into_iter().take(limit) {
            items.push(decision_from_row(row)?);
        }
        let next_cursor = if has_more {
            items
                .last()
                .map(|d| cursor::encode(d.decided_at, &d.decision_id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn list_workflow_decisions_by_run(
        &self,
        run_id: &str,
    ) -> StoreResult<Vec<WorkflowDecision>> {
        let rows: Vec<DecisionRow> = sqlx::query_as(
            "SELECT decision_id, run_id, action, reason_code, comment, actor_id, decided_at, \
             correlation_id FROM workflow_decisions WHERE run_id = $1 ORDER BY decided_at ASC",
        )
        .bind(run_id)
        .fetch_all(&self.database.pool)
        .await
        .map_err(sql_error("list decisions by run"))?;
        rows.into_iter().map(decision_from_row).collect()
    }

    async fn append_lineage_edge(&self, edge: &LineageEdge) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO lineage_edges (source_entity_id, edge_type, target_entity_id, \
             created_at, metadata) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(&edge.source_entity_id)
        .bind(edge.edge_type.to_string())
        .bind(&edge.target_entity_id)
        .bind(encode_timestamp(edge.created_at))
        .bind(edge.metadata.as_ref().map(encode_json))
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("append lineage"))?;
        Ok(())
    }

    async fn list_lineage_edges(&self, entity_id: &str) -> StoreResult<Vec<LineageEdge>> {
        let rows: Vec<(String, String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT source_entity_id, edge_type, target_entity_id, created_at, metadata \
             FROM lineage_edges WHERE source_entity_id = $1 OR target_entity_id = $1 \
             ORDER BY created_at ASC",
        )
        .bind(entity_id)
        .fetch_all(&self.database.pool)
        .await
        .map_err(sql_error("list lineage"))?;
        rows.into_iter()
            .map(|(source, edge_type, target, created_at, metadata)| {
                Ok(LineageEdge {
                    source_entity_id: source,
                    edge_type: edge_type_from(&edge_type)?,
                    target_entity_id: target,
                    created_at: decode_timestamp(&created_at)?,
                    metadata: metadata.as_deref().map(decode_json).transpose()?,
                })
            })
            .collect()
    }

    async fn supportability_summary(&self) -> StoreResult<SupportabilitySummary> {
        let mut summary = SupportabilitySummary::default();

        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM rebalance_runs GROUP BY status")
                .fetch_all(&self.database.pool)
                .await
                .map_err(sql_error("summarize runs"))?;
        for (status, count) in counts {
            summary.total_runs += count;
            summary.runs_by_status.insert(status, count);
        }

        let counts: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM async_operations GROUP BY status")
                .fetch_all(&self.database.pool)
                .await
                .map_err(sql_error("summarize operations"))?;
        for (status, count) in counts {
            summary.total_operations += count;
            summary.operations_by_status.insert(status, count);
        }

        let (keys,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM idempotency_keys")
            .fetch_one(&self.database.pool)
            .await
            .map_err(sql_error("count idempotency"))?;
        summary.total_idempotency_keys = keys;

        let (decisions,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM workflow_decisions")
            .fetch_one(&self.database.pool)
            .await
            .map_err(sql_error("count decisions"))?;
        summary.total_workflow_decisions = decisions;

        let (edges,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lineage_edges")
            .fetch_one(&self.database.pool)
            .await
            .map_err(sql_error("count lineage"))?;
        summary.total_lineage_edges = edges;

        Ok(summary)
    }

    async fn purge_expired_runs(&self, retention_days: i64) -> StoreResult<u64> {
        let cutoff = encode_timestamp(Utc::now() - Duration::days(retention_days));
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .map_err(sql_error("begin purge"))?;

        // Dependent records first; the run subqueries must still see the
        // expired rows.
        let cascade_statements = [
            "DELETE FROM run_artifacts WHERE run_id IN \
             (SELECT rebalance_run_id FROM rebalance_runs WHERE created_at < $1)",
            "DELETE FROM idempotency_keys WHERE run_id IN \
             (SELECT rebalance_run_id FROM rebalance_runs WHERE created_at < $1)",
            "DELETE FROM idempotency_history WHERE run_id IN \
             (SELECT rebalance_run_id FROM rebalance_runs WHERE created_at < $1)",
            "DELETE FROM workflow_decisions WHERE run_id IN \
             (SELECT rebalance_run_id FROM rebalance_runs WHERE created_at < $1)",
            "DELETE FROM async_operations WHERE correlation_id IN \
             (SELECT correlation_id FROM rebalance_runs WHERE created_at < $1)",
            "DELETE FROM lineage_edges WHERE \
             target_entity_id IN (SELECT rebalance_run_id FROM rebalance_runs WHERE created_at < $1) \
             OR source_entity_id IN (SELECT rebalance_run_id FROM rebalance_runs WHERE created_at < $1) \
             OR source_entity_id IN (SELECT correlation_id FROM rebalance_runs WHERE created_at < $1) \
             OR source_entity_id IN (SELECT idempotency_key FROM rebalance_runs \
                WHERE created_at < $1 AND idempotency_key IS NOT NULL)",
        ];
        for statement in cascade_statements {
            sqlx::query(statement)
                .bind(&cutoff)
                .execute(&mut *tx)
                .await
                .map_err(sql_error("purge cascade"))?;
        }

        let purged = sqlx::query("DELETE FROM rebalance_runs WHERE created_at < $1")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await
            .map_err(sql_error("purge runs"))?;

        tx.commit().await.map_err(sql_error("commit purge"))?;
        Ok(purged.rows_affected())
    }

    async fn ready(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.database.pool)
            .await
            .map_err(sql_error("readiness probe"))?;
        Ok(())
    }
}
