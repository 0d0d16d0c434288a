//! Policy pack catalog loaded from the `policy_packs` table.

use std::collections::BTreeMap;

use crate::domain::errors::StoreError;
use crate::domain::model::policy::PolicyPack;
use crate::domain::ports::StoreResult;

use super::database::Database;

pub async fn load_policy_catalog(
    database: &Database,
) -> StoreResult<BTreeMap<String, PolicyPack>> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT pack_id, pack_json FROM policy_packs ORDER BY pack_id")
            .fetch_all(&database.pool)
            .await
            .map_err(|e| StoreError::backend(format!("load policy catalog: {e}")))?;

    let mut catalog = BTreeMap::new();
    for (pack_id, pack_json) in rows {
        let mut pack: PolicyPack = serde_json::from_str(&pack_json)?;
        if pack.pack_id.is_empty() {
            pack.pack_id = pack_id.clone();
        }
        catalog.insert(pack_id, pack);
    }
    Ok(catalog)
}
