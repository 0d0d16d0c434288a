//! SQL proposal store over the shared dialect.

use async_trait::async_trait;
use sqlx::Any;

use crate::domain::errors::StoreError;
use crate::domain::model::proposal::{
    ApprovalRecord, Proposal, ProposalState, ProposalVersion, WorkflowEvent,
};
use crate::domain::model::records::Page;
use crate::domain::ports::{ProposalStore, StoreResult};

use super::cursor;
use super::database::{Database, decode_json, decode_timestamp, encode_json, encode_timestamp};
use super::migrations::{self, proposal_migrations};

pub struct SqlProposalStore {
    database: Database,
}

impl SqlProposalStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        migrations::run_migrations(
            &self.database.pool,
            &proposal_migrations(),
            self.database.is_postgres(),
        )
        .await
    }
}

fn sql_error(context: &str) -> impl FnOnce(sqlx::Error) -> StoreError + '_ {
    move |e| StoreError::backend(format!("{context}: {e}"))
}

fn state_from(raw: &str) -> StoreResult<ProposalState> {
    match raw {
        "DRAFT" => Ok(ProposalState::Draft),
        "RISK_REVIEW" => Ok(ProposalState::RiskReview),
        "COMPLIANCE_REVIEW" => Ok(ProposalState::ComplianceReview),
        "AWAITING_CLIENT_CONSENT" => Ok(ProposalState::AwaitingClientConsent),
        "EXECUTION_READY" => Ok(ProposalState::ExecutionReady),
        "EXECUTED" => Ok(ProposalState::Executed),
        "REJECTED" => Ok(ProposalState::Rejected),
        "CANCELLED" => Ok(ProposalState::Cancelled),
        "EXPIRED" => Ok(ProposalState::Expired),
        other => Err(StoreError::backend(format!("unknown proposal state: {other}"))),
    }
}

type ProposalRow = (String, String, String, i64, String, String);

fn proposal_from_row(row: ProposalRow) -> StoreResult<Proposal> {
    Ok(Proposal {
        proposal_id: row.0,
        portfolio_id: row.1,
        state: state_from(&row.2)?,
        version_no: row.3 as i32,
        created_at: decode_timestamp(&row.4)?,
        last_event_at: decode_timestamp(&row.5)?,
    })
}

const PROPOSAL_COLUMNS: &str =
    "proposal_id, portfolio_id, state, version_no, created_at, last_event_at";

#[async_trait]
impl ProposalStore for SqlProposalStore {
    async fn create_proposal(
        &self,
        proposal: &Proposal,
        version: &ProposalVersion,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .map_err(sql_error("begin create_proposal"))?;

        sqlx::query(&format!(
            "INSERT INTO proposals ({PROPOSAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
        ))
        .bind(&proposal.proposal_id)
        .bind(&proposal.portfolio_id)
        .bind(proposal.state.to_string())
        .bind(proposal.version_no as i64)
        .bind(encode_timestamp(proposal.created_at))
        .bind(encode_timestamp(proposal.last_event_at))
        .execute(&mut *tx)
        .await
        .map_err(sql_error("insert proposal"))?;

        insert_version(&mut tx, version).await?;
        insert_event(&mut tx, event).await?;

        tx.commit().await.map_err(sql_error("commit create_proposal"))?;
        Ok(())
    }

    async fn get_proposal(&self, proposal_id: &str) -> StoreResult<Option<Proposal>> {
        let row: Option<ProposalRow> = sqlx::query_as(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE proposal_id = $1"
        ))
        .bind(proposal_id)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get proposal"))?;
        row.map(proposal_from_row).transpose()
    }

    async fn list_proposals(
        &self,
        portfolio_id: Option<&str>,
        state: Option<ProposalState>,
        cursor_raw: Option<&str>,
        limit: usize,
    ) -> StoreResult<Page<Proposal>> {
        let mut sql = format!("SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(portfolio_id) = portfolio_id {
            binds.push(portfolio_id.to_string());
            sql.push_str(&format!(" AND portfolio_id = ${}", binds.len()));
        }
        if let Some(state) = state {
            binds.push(state.to_string());
            sql.push_str(&format!(" AND state = ${}", binds.len()));
        }
        if let Some(raw) = cursor_raw {
            let (created_at, id) = cursor::decode(raw)?;
            let ts = encode_timestamp(created_at);
            binds.push(ts.clone());
            binds.push(ts);
            binds.push(id);
            let n = binds.len();
            sql.push_str(&format!(
                " AND (created_at < ${} OR (created_at = ${} AND proposal_id < ${}))",
                n - 2,
                n - 1,
                n
            ));
        }
        sql.push_str(&format!(
            " ORDER BY created_at DESC, proposal_id DESC LIMIT {}",
            limit + 1
        ));

        let mut query = sqlx::query_as::<Any, ProposalRow>(&sql);
        for bind in &binds {
            query = query.bind(bind.as_str());
        }
        let rows = query
            .fetch_all(&self.database.pool)
            .await
            .map_err(sql_error("list proposals"))?;

        let has_more = rows.len() > limit;
        let mut items = Vec::with_capacity(rows.len().min(limit));
        for row in rows.into_iter().take(limit) {
            items.push(proposal_from_row(row)?);
        }
        let next_cursor = if has_more {
            items
                .last()
                .map(|p| cursor::encode(p.created_at, &p.proposal_id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
    }

    async fn get_version(
        &self,
        proposal_id: &str,
        version_no: i32,
    ) -> StoreResult<Option<ProposalVersion>> {
        type VersionRow = (
            String,
            i64,
            String,
            String,
            String,
            Option<String>,
            Option<String>,
            String,
            String,
        );
        let row: Option<VersionRow> = sqlx::query_as(
            "SELECT proposal_id, version_no, request_hash, artifact_hash, artifact_json, \
             evidence_bundle_json, gate_decision_json, status_at_creation, created_at \
             FROM proposal_versions WHERE proposal_id = $1 AND version_no = $2",
        )
        .bind(proposal_id)
        .bind(version_no as i64)
        .fetch_optional(&self.database.pool)
        .await
        .map_err(sql_error("get version"))?;
        row.map(|r| {
            Ok(ProposalVersion {
                proposal_id: r.0,
                version_no: r.1 as i32,
                request_hash: r.2,
                artifact_hash: r.3,
                artifact_json: decode_json(&r.4)?,
                evidence_bundle_json: r.5.as_deref().map(decode_json).transpose()?,
                gate_decision_json: r.6.as_deref().map(decode_json).transpose()?,
                status_at_creation: r.7,
                created_at: decode_timestamp(&r.8)?,
            })
        })
        .transpose()
    }

    async fn append_version(
        &self,
        proposal: &Proposal,
        version: &ProposalVersion,
        event: &WorkflowEvent,
    ) -> StoreResult<()> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .map_err(sql_error("begin append_version"))?;

        update_head(&mut tx, proposal).await?;
        insert_version(&mut tx, version).await?;
        insert_event(&mut tx, event).await?;

        tx.commit().await.map_err(sql_error("commit append_version"))?;
        Ok(())
    }

    async fn transition(&self, proposal: &Proposal, event: &WorkflowEvent) -> StoreResult<()> {
        let mut tx = self
            .database
            .pool
            .begin()
            .await
            .map_err(sql_error("begin transition"))?;

        update_head(&mut tx, proposal).await?;
        insert_event(&mut tx, event).await?;

        tx.commit().await.map_err(sql_error("commit transition"))?;
        Ok(())
    }

    async fn append_approval(&self, approval: &ApprovalRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO proposal_approvals (approval_id, proposal_id, version_no, role, \
             actor_id, comment, approved_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&approval.approval_id)
        .bind(&approval.proposal_id)
        .bind(approval.version_no as i64)
        .bind(&approval.role)
        .bind(&approval.actor_id)
        .bind(approval.comment.as_deref())
        .bind(encode_timestamp(approval.approved_at))
        .execute(&self.database.pool)
        .await
        .map_err(sql_error("append approval"))?;
        Ok(())
    }

    async fn list_events(&self, proposal_id: &str) -> StoreResult<Vec<WorkflowEvent>> {
        type EventRow = (
            String,
            String,
            String,
            Option<String>,
            String,
            String,
            Option<String>,
            String,
        );
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT event_id, proposal_id, event_type, from_state, to_state, actor_id, comment, \
             occurred_at FROM proposal_events WHERE proposal_id = $1 ORDER BY occurred_at ASC",
        )
        .bind(proposal_id)
        .fetch_all(&self.database.pool)
        .await
        .map_err(sql_error("list events"))?;
        rows.into_iter()
            .map(|r| {
                Ok(WorkflowEvent {
                    event_id: r.0,
                    proposal_id: r.1,
                    event_type: r.2,
                    from_state: r.3.as_deref().map(state_from).transpose()?,
                    to_state: state_from(&r.4)?,
                    actor_id: r.5,
                    comment: r.6,
                    occurred_at: decode_timestamp(&r.7)?,
                })
            })
            .collect()
    }

    async fn list_approvals(&self, proposal_id: &str) -> StoreResult<Vec<ApprovalRecord>> {
        type ApprovalRow = (String, String, i64, String, String, Option<String>, String);
        let rows: Vec<ApprovalRow> = sqlx::query_as(
            "SELECT approval_id, proposal_id, version_no, role, actor_id, comment, approved_at \
             FROM proposal_approvals WHERE proposal_id = $1 ORDER BY approved_at ASC",
        )
        .bind(proposal_id)
        .fetch_all(&self.database.pool)
        .await
        .map_err(sql_error("list approvals"))?;
        rows.into_iter()
            .map(|r| {
                Ok(ApprovalRecord {
                    approval_id: r.0,
                    proposal_id: r.1,
                    version_no: r.2 as i32,
                    role: r.3,
                    actor_id: r.4,
                    comment: r.5,
                    approved_at: decode_timestamp(&r.6)?,
                })
            })
            .collect()
    }

    async fn ready(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.database.pool)
            .await
            .map_err(sql_error("readiness probe"))?;
        Ok(())
    }
}

async fn update_head(
    tx: &mut sqlx::Transaction<'_, Any>,
    proposal: &Proposal,
) -> StoreResult<()> {
    let updated = sqlx::query(
        "UPDATE proposals SET state = $1, version_no = $2, last_event_at = $3 \
         WHERE proposal_id = $4",
    )
    .bind(proposal.state.to_string())
    .bind(proposal.version_no as i64)
    .bind(encode_timestamp(proposal.last_event_at))
    .bind(&proposal.proposal_id)
    .execute(&mut **tx)
    .await
    .map_err(sql_error("update proposal head"))?;
    if updated.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            entity: "proposal",
            id: proposal.proposal_id.clone(),
        });
    }
    Ok(())
}

async fn insert_version(
    tx: &mut sqlx::Transaction<'_, Any>,
    version: &ProposalVersion,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO proposal_versions (proposal_id, version_no, request_hash, artifact_hash, \
         artifact_json, evidence_bundle_json, gate_decision_json, status_at_creation, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(&version.proposal_id)
    .bind(version.version_no as i64)
    .bind(&version.request_hash)
    .bind(&version.artifact_hash)
    .bind(encode_json(&version.artifact_json))
    .bind(version.evidence_bundle_json.as_ref().map(encode_json))
    .bind(version.gate_decision_json.as_ref().map(encode_json))
    .bind(&version.status_at_creation)
    .bind(encode_timestamp(version.created_at))
    .execute(&mut **tx)
    .await
    .map_err(sql_error("insert version"))?;
    Ok(())
}

async fn insert_event(
    tx: &mut sqlx::Transaction<'_, Any>,
    event: &WorkflowEvent,
) -> StoreResult<()> {
    sqlx::query(
        "INSERT INTO proposal_events (event_id, proposal_id, event_type, from_state, to_state, \
         actor_id, comment, occurred_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&event.event_id)
    .bind(&event.proposal_id)
    .bind(&event.event_type)
    .bind(event.from_state.map(|s| s.to_string()))
    .bind(event.to_state.to_string())
    .bind(&event.actor_id)
    .bind(event.comment.as_deref())
    .bind(encode_timestamp(event.occurred_at))
    .execute(&mut **tx)
    .await
    .map_err(sql_error("insert event"))?;
    Ok(())
}
