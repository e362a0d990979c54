// Client identity and the joined latest view

use serde::{Deserialize, Serialize};

use super::Snapshot;

/// Registered reporting host. `id` never changes once assigned; `hostname` follows the
/// latest accepted report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub machine_id: String,
    pub hostname: String,
}

/// Latest snapshot of one client joined with its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LatestStatus {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub snapshot: Snapshot,
    pub machine_id: String,
    pub hostname: String,
}
