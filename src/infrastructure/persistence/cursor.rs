//! Opaque pagination cursors: base64url over `(created_at, id)`.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};

use crate::domain::errors::StoreError;

pub fn encode(created_at: DateTime<Utc>, id: &str) -> String {
    let raw = format!("{}|{id}", created_at.to_rfc3339());
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

pub fn decode(cursor: &str) -> Result<(DateTime<Utc>, String), StoreError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.as_bytes())
        .map_err(|_| StoreError::InvalidCursor)?;
    let raw = String::from_utf8(bytes).map_err(|_| StoreError::InvalidCursor)?;
    let (timestamp, id) = raw.split_once('|').ok_or(StoreError::InvalidCursor)?;
    let created_at = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|_| StoreError::InvalidCursor)?
        .with_timezone(&Utc);
    Ok((created_at, id.to_string()))
}
