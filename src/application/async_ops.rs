//! Async operation lifecycle.
//!
//! Operations are an explicit state machine (PENDING -> RUNNING ->
//! SUCCEEDED | FAILED) persisted through the supportability store. INLINE
//! mode drives the machine within the submitting request; ACCEPT_ONLY
//! stores PENDING and defers to a later execute call. Terminal rows expire
//! after a TTL.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::errors::StoreError;
use crate::domain::model::records::{AsyncOperation, OperationStatus};
use crate::domain::ports::{StoreResult, SupportabilityStore};

pub const DEFAULT_TTL_SECONDS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Inline,
    AcceptOnly,
}

impl FromStr for ExecutionMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "INLINE" => Ok(ExecutionMode::Inline),
            "ACCEPT_ONLY" => Ok(ExecutionMode::AcceptOnly),
            _ => Err(()),
        }
    }
}

impl ExecutionMode {
    /// Unrecognized configuration falls back to INLINE.
    pub fn parse_or_inline(s: &str) -> Self {
        match s.parse() {
            Ok(mode) => mode,
            Err(()) => {
                warn!("Unknown async execution mode '{s}', falling back to INLINE");
                ExecutionMode::Inline
            }
        }
    }
}

pub struct AsyncOperationManager {
    store: Arc<dyn SupportabilityStore>,
    mode: ExecutionMode,
    ttl_seconds: i64,
    manual_execution_enabled: bool,
}

impl AsyncOperationManager {
    pub fn new(
        store: Arc<dyn SupportabilityStore>,
        mode: ExecutionMode,
        ttl_seconds: i64,
        manual_execution_enabled: bool,
    ) -> Self {
        Self {
            store,
            mode,
            ttl_seconds,
            manual_execution_enabled,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn manual_execution_enabled(&self) -> bool {
        self.manual_execution_enabled
    }

    /// Create a PENDING operation. The correlation id must be unique per
    /// operation.
    pub async fn submit(
        &self,
        operation_type: &str,
        correlation_id: String,
        request_json: serde_json::Value,
    ) -> StoreResult<AsyncOperation> {
        if self
            .store
            .get_async_operation_by_correlation(&correlation_id)
            .await?
            .is_some()
        {
            return Err(StoreError::DuplicateCorrelation { correlation_id });
        }

        let now = Utc::now();
        let operation = AsyncOperation {
            operation_id: format!("op_{}", Uuid::new_v4().simple()),
            operation_type: operation_type.to_string(),
            status: OperationStatus::Pending,
            correlation_id,
            created_at: now,
            updated_at: now,
            completed_at: None,
            result_json: None,
            error_json: None,
            request_json,
        };
        self.store.create_async_operation(&operation).await?;
        info!(
            "Async operation {} accepted ({})",
            operation.operation_id, operation.operation_type
        );
        Ok(operation)
    }

    /// Advance PENDING -> RUNNING. Any other starting state is refused.
    pub async fn begin(&self, operation_id: &str) -> StoreResult<AsyncOperation> {
        let mut operation = self
            .store
            .get_async_operation(operation_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "operation",
                id: operation_id.to_string(),
            })?;
        if operation.status != OperationStatus::Pending {
            return Err(StoreError::OperationNotExecutable {
                operation_id: operation_id.to_string(),
                status: operation.status.to_string(),
            });
        }
        operation.status = OperationStatus::Running;
        operation.updated_at = Utc::now();
        self.store.update_async_operation(&operation).await?;
        Ok(operation)
    }

    pub async fn complete(
        &self,
        mut operation: AsyncOperation,
        result_json: serde_json::Value,
    ) -> StoreResult<AsyncOperation> {
        operation.status = OperationStatus::Succeeded;
        operation.result_json = Some(result_json);
        let now = Utc::now();
        operation.updated_at = now;
        operation.completed_at = Some(now);
        self.store.update_async_operation(&operation).await?;
        Ok(operation)
    }

    pub async fn fail(
        &self,
        mut operation: AsyncOperation,
        error_json: serde_json::Value,
    ) -> StoreResult<AsyncOperation> {
        operation.status = OperationStatus::Failed;
        operation.error_json = Some(error_json);
        let now = Utc::now();
        operation.updated_at = now;
        operation.completed_at = Some(now);
        self.store.update_async_operation(&operation).await?;
        Ok(operation)
    }

    /// Remove terminal rows older than the TTL. Returns the purge count.
    pub async fn purge_expired(&self) -> StoreResult<u64> {
        let purged = self
            .store
            .purge_expired_async_operations(self.ttl_seconds)
            .await?;
        if purged > 0 {
            info!("Purged {purged} expired async operation(s)");
        }
        Ok(purged)
    }

    /// Background sweep loop, spawned by the server.
    pub async fn run_sweeper(self: Arc<Self>, interval_seconds: u64) {
        let mut ticker =
            tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
        loop {
            ticker.tick().await;
            if let Err(err) = self.purge_expired().await {
                warn!("Async operation sweep failed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::persistence::memory_store::MemoryStore;
    use serde_json::json;

    fn manager(mode: ExecutionMode) -> AsyncOperationManager {
        AsyncOperationManager::new(Arc::new(MemoryStore::new()), mode, 86_400, true)
    }

    #[test]
    fn test_mode_parsing_falls_back_to_inline() {
        assert_eq!(ExecutionMode::parse_or_inline("INLINE"), ExecutionMode::Inline);
        assert_eq!(
            ExecutionMode::parse_or_inline("accept_only"),
            ExecutionMode::AcceptOnly
        );
        assert_eq!(ExecutionMode::parse_or_inline("bogus"), ExecutionMode::Inline);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let manager = manager(ExecutionMode::Inline);
        let operation = manager
            .submit("rebalance_analyze", "c_1".to_string(), json!({}))
            .await
            .unwrap();
        assert_eq!(operation.status, OperationStatus::Pending);

        let operation = manager.begin(&operation.operation_id).await.unwrap();
        assert_eq!(operation.status, OperationStatus::Running);

        let operation = manager.complete(operation, json!({"ok": true})).await.unwrap();
        assert_eq!(operation.status, OperationStatus::Succeeded);
        assert!(operation.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_duplicate_correlation_rejected() {
        let manager = manager(ExecutionMode::AcceptOnly);
        manager
            .submit("rebalance_analyze", "c_1".to_string(), json!({}))
            .await
            .unwrap();
        let err = manager
            .submit("rebalance_analyze", "c_1".to_string(), json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateCorrelation { .. }));
    }

    #[tokio::test]
    async fn test_begin_refuses_non_pending() {
        let manager = manager(ExecutionMode::AcceptOnly);
        let operation = manager
            .submit("rebalance_analyze", "c_1".to_string(), json!({}))
            .await
            .unwrap();
        let operation = manager.begin(&operation.operation_id).await.unwrap();
        let err = manager.begin(&operation.operation_id).await.unwrap_err();
        assert!(matches!(err, StoreError::OperationNotExecutable { .. }));
    }
}
