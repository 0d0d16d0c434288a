//! Forward-only embedded SQL migrations, organized by namespace.
//!
//! Applied versions are recorded in `schema_migrations` with a SHA-256
//! checksum of the migration text. A checksum mismatch means history was
//! rewritten and aborts startup. Postgres deployers serialize through a
//! namespace-scoped advisory lock; SQLite relies on its writer lock.

use sqlx::AnyPool;
use tracing::info;

use crate::domain::canonical::sha256_hex;
use crate::domain::errors::StoreError;
use crate::domain::ports::StoreResult;

pub struct Migration {
    pub namespace: &'static str,
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub const NAMESPACE_DPM: &str = "dpm";
pub const NAMESPACE_PROPOSALS: &str = "proposals";

/// Timestamps are stored as fixed-width RFC 3339 text so the same SQL and
/// ordering semantics hold on SQLite and Postgres.
pub fn dpm_migrations() -> Vec<Migration> {
    vec![
        Migration {
            namespace: NAMESPACE_DPM,
            version: 1,
            description: "rebalance runs",
            sql: r#"
            CREATE TABLE rebalance_runs (
                rebalance_run_id TEXT PRIMARY KEY,
                correlation_id TEXT NOT NULL,
                request_hash TEXT NOT NULL,
                idempotency_key TEXT,
                portfolio_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                result_json TEXT NOT NULL
            );
            CREATE INDEX idx_runs_correlation ON rebalance_runs (correlation_id);
            CREATE INDEX idx_runs_request_hash ON rebalance_runs (request_hash);
            CREATE INDEX idx_runs_created_at ON rebalance_runs (created_at);
            "#,
        },
        Migration {
            namespace: NAMESPACE_DPM,
            version: 2,
            description: "run artifacts",
            sql: r#"
            CREATE TABLE run_artifacts (
                run_id TEXT PRIMARY KEY,
                artifact_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        },
        Migration {
            namespace: NAMESPACE_DPM,
            version: 3,
            description: "idempotency mapping and history",
            sql: r#"
            CREATE TABLE idempotency_keys (
                idempotency_key TEXT PRIMARY KEY,
                request_hash TEXT NOT NULL,
                run_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE idempotency_history (
                idempotency_key TEXT NOT NULL,
                request_hash TEXT NOT NULL,
                run_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_idem_history_key ON idempotency_history (idempotency_key);
            "#,
        },
        Migration {
            namespace: NAMESPACE_DPM,
            version: 4,
            description: "async operations",
            sql: r#"
            CREATE TABLE async_operations (
                operation_id TEXT PRIMARY KEY,
                operation_type TEXT NOT NULL,
                status TEXT NOT NULL,
                correlation_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                result_json TEXT,
                error_json TEXT,
                request_json TEXT NOT NULL
            );
            CREATE INDEX idx_ops_status ON async_operations (status, created_at);
            "#,
        },
        Migration {
            namespace: NAMESPACE_DPM,
            version: 5,
            description: "workflow decisions",
            sql: r#"
            CREATE TABLE workflow_decisions (
                decision_id TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                action TEXT NOT NULL,
                reason_code TEXT NOT NULL,
                comment TEXT,
                actor_id TEXT NOT NULL,
                decided_at TEXT NOT NULL,
                correlation_id TEXT NOT NULL
            );
            CREATE INDEX idx_decisions_run ON workflow_decisions (run_id, decided_at);
            "#,
        },
        Migration {
            namespace: NAMESPACE_DPM,
            version: 6,
            description: "lineage edges",
            sql: r#"
            CREATE TABLE lineage_edges (
                source_entity_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                target_entity_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                metadata TEXT
            );
            CREATE INDEX idx_lineage_source ON lineage_edges (source_entity_id);
            CREATE INDEX idx_lineage_target ON lineage_edges (target_entity_id);
            "#,
        },
        Migration {
            namespace: NAMESPACE_DPM,
            version: 7,
            description: "policy pack catalog",
            sql: r#"
            CREATE TABLE policy_packs (
                pack_id TEXT PRIMARY KEY,
                pack_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        },
    ]
}

pub fn proposal_migrations() -> Vec<Migration> {
    vec![
        Migration {
            namespace: NAMESPACE_PROPOSALS,
            version: 1,
            description: "proposal aggregate",
            sql: r#"
            CREATE TABLE proposals (
                proposal_id TEXT PRIMARY KEY,
                portfolio_id TEXT NOT NULL,
                state TEXT NOT NULL,
                version_no INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_event_at TEXT NOT NULL
            );
            CREATE INDEX idx_proposals_portfolio ON proposals (portfolio_id);
            "#,
        },
        Migration {
            namespace: NAMESPACE_PROPOSALS,
            version: 2,
            description: "immutable versions",
            sql: r#"
            CREATE TABLE proposal_versions (
                proposal_id TEXT NOT NULL,
                version_no INTEGER NOT NULL,
                request_hash TEXT NOT NULL,
                artifact_hash TEXT NOT NULL,
                artifact_json TEXT NOT NULL,
                evidence_bundle_json TEXT,
                gate_decision_json TEXT,
                status_at_creation TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (proposal_id, version_no)
            );
            "#,
        },
        Migration {
            namespace: NAMESPACE_PROPOSALS,
            version: 3,
            description: "workflow events and approvals",
            sql: r#"
            CREATE TABLE proposal_events (
                event_id TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                from_state TEXT,
                to_state TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                comment TEXT,
                occurred_at TEXT NOT NULL
            );
            CREATE INDEX idx_events_proposal ON proposal_events (proposal_id, occurred_at);
            CREATE TABLE proposal_approvals (
                approval_id TEXT PRIMARY KEY,
                proposal_id TEXT NOT NULL,
                version_no INTEGER NOT NULL,
                role TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                comment TEXT,
                approved_at TEXT NOT NULL
            );
            "#,
        },
    ]
}

pub fn checksum(sql: &str) -> String {
    sha256_hex(sql.as_bytes())
}

/// Stable advisory-lock key for a namespace (Postgres only).
fn advisory_lock_key(namespace: &str) -> i64 {
    let digest = sha256_hex(namespace.as_bytes());
    i64::from_str_radix(&digest[..15], 16).unwrap_or(0)
}

pub async fn run_migrations(
    pool: &AnyPool,
    migrations: &[Migration],
    postgres: bool,
) -> StoreResult<()> {
    // Advisory locks are session-scoped: everything, lock included, must
    // run on the same pinned connection.
    let mut conn = pool
        .acquire()
        .await
        .map_err(|e| StoreError::backend(format!("acquire migration connection: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_migrations (
            namespace TEXT NOT NULL,
            version INTEGER NOT NULL,
            checksum TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            PRIMARY KEY (namespace, version)
        );
        "#,
    )
    .execute(&mut *conn)
    .await
    .map_err(|e| StoreError::backend(format!("create schema_migrations: {e}")))?;

    let namespace = migrations.first().map(|m| m.namespace).unwrap_or_default();
    if postgres && !migrations.is_empty() {
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(advisory_lock_key(namespace))
            .execute(&mut *conn)
            .await
            .map_err(|e| StoreError::backend(format!("advisory lock: {e}")))?;
    }

    let result = apply_all(&mut conn, migrations).await;

    if postgres && !migrations.is_empty() {
        let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(advisory_lock_key(namespace))
            .execute(&mut *conn)
            .await;
    }

    result
}

async fn apply_all(
    conn: &mut sqlx::pool::PoolConnection<sqlx::Any>,
    migrations: &[Migration],
) -> StoreResult<()> {
    for migration in migrations {
        let expected = checksum(migration.sql);
        let applied: Option<(String,)> = sqlx::query_as(
            "SELECT checksum FROM schema_migrations WHERE namespace = $1 AND version = $2",
        )
        .bind(migration.namespace)
        .bind(migration.version)
        .fetch_optional(&mut **conn)
        .await
        .map_err(|e| StoreError::backend(format!("read schema_migrations: {e}")))?;

        match applied {
            Some((recorded,)) if recorded != expected => {
                return Err(StoreError::MigrationChecksumMismatch {
                    namespace: migration.namespace.to_string(),
                    version: migration.version,
                });
            }
            Some(_) => continue,
            None => {
                for statement in split_statements(migration.sql) {
                    sqlx::query(&statement)
                        .execute(&mut **conn)
                        .await
                        .map_err(|e| {
                            StoreError::backend(format!(
                                "migration {}:{} failed: {e}",
                                migration.namespace, migration.version
                            ))
                        })?;
                }
                sqlx::query(
                    "INSERT INTO schema_migrations (namespace, version, checksum, applied_at) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(migration.namespace)
                .bind(migration.version)
                .bind(&expected)
                .bind(chrono::Utc::now().to_rfc3339())
                .execute(&mut **conn)
                .await
                .map_err(|e| StoreError::backend(format!("record migration: {e}")))?;
                info!(
                    "Applied migration {}:{} ({})",
                    migration.namespace, migration.version, migration.description
                );
            }
        }
    }
    Ok(())
}

/// Drivers differ in multi-statement support; run one statement at a time.
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
