//! Types for sync runs and their results.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One configured remote catalog provider instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable local identifier, used to scope rows in the store.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Provider endpoint.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Explicit EPG endpoint override.
    #[serde(default)]
    pub epg_url: Option<String>,
}

/// Result of one sync run for one entity kind.
#[derive(Debug, Clone, Serialize)]
pub struct KindOutcome {
    pub kind: &'static str,
    pub success: bool,
    /// True when persistence was skipped (empty remote result with local
    /// data present, or source deleted mid-run).
    pub skipped: bool,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl KindOutcome {
    pub(crate) fn applied(kind: &'static str, added: usize, updated: usize, deleted: usize) -> Self {
        Self {
            kind,
            success: true,
            skipped: false,
            added,
            updated,
            deleted,
            error: None,
        }
    }

    pub(crate) fn skipped(kind: &'static str) -> Self {
        Self {
            kind,
            success: true,
            skipped: true,
            added: 0,
            updated: 0,
            deleted: 0,
            error: None,
        }
    }

    pub(crate) fn failed(kind: &'static str, error: String) -> Self {
        Self {
            kind,
            success: false,
            skipped: false,
            added: 0,
            updated: 0,
            deleted: 0,
            error: Some(error),
        }
    }
}

/// Result of one sync run for one source.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub source_id: String,
    pub outcomes: Vec<KindOutcome>,
}

impl SyncReport {
    /// True when every kind either applied or skipped cleanly.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    /// Outcome for one entity kind, if present in this report.
    pub fn outcome(&self, kind: &str) -> Option<&KindOutcome> {
        self.outcomes.iter().find(|o| o.kind == kind)
    }
}
