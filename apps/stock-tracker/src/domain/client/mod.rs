//! Client Records
//!
//! A connected client as seen by the assignment registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a connected client host.
pub type HostId = i64;

/// A registered client.
///
/// Immutable once created; re-registration with the same `host_id` replaces
/// the stored record wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRecord {
    /// Host identifier, the registry key.
    pub host_id: HostId,
    /// Reported host name.
    #[serde(default)]
    pub host_name: String,
    /// Remote address of the client.
    #[serde(default)]
    pub client_ip: String,
    /// Client software version.
    #[serde(default)]
    pub client_version: String,
    /// When the client was first admitted.
    pub added_at: DateTime<Utc>,
}

impl ClientRecord {
    /// Create a client record stamped with the current time.
    #[must_use]
    pub fn new(
        host_id: HostId,
        host_name: impl Into<String>,
        client_ip: impl Into<String>,
        client_version: impl Into<String>,
    ) -> Self {
        Self {
            host_id,
            host_name: host_name.into(),
            client_ip: client_ip.into(),
            client_version: client_version.into(),
            added_at: Utc::now(),
        }
    }
}
