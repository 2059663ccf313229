use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerwarden_core::{AppResult, RuleId};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Page size used when an audit query does not set `limit`.
pub const DEFAULT_AUDIT_PAGE_LIMIT: usize = 50;

/// Upper bound applied to audit query page sizes.
pub const MAX_AUDIT_PAGE_LIMIT: usize = 500;

/// Audit entry written once per matched peer per rule run.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRuleAuditEntry {
    /// Rule that produced the entry.
    pub rule_id: RuleId,
    /// Moment the action was attempted.
    pub triggered_at: DateTime<Utc>,
    /// Copy of the peer attributes at evaluation time.
    pub peer_snapshot: Value,
    /// Action type attempted.
    pub action_taken: String,
    /// Dispatcher message or `Error: <message>`.
    pub result: String,
}

/// Persisted, immutable audit entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleAuditEntry {
    /// Store-assigned identifier.
    pub entry_id: Uuid,
    /// Rule that produced the entry.
    pub rule_id: RuleId,
    /// Moment the action was attempted.
    pub triggered_at: DateTime<Utc>,
    /// Copy of the peer attributes at evaluation time.
    pub peer_snapshot: Value,
    /// Action type attempted.
    pub action_taken: String,
    /// Dispatcher message or `Error: <message>`.
    pub result: String,
}

impl RuleAuditEntry {
    /// Builds the persisted form of a new entry.
    #[must_use]
    pub fn from_new(entry_id: Uuid, entry: NewRuleAuditEntry) -> Self {
        Self {
            entry_id,
            rule_id: entry.rule_id,
            triggered_at: entry.triggered_at,
            peer_snapshot: entry.peer_snapshot,
            action_taken: entry.action_taken,
            result: entry.result,
        }
    }
}

/// Audit log listing filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleAuditQuery {
    /// Optional rule filter.
    pub rule_id: Option<RuleId>,
    /// Optional page size.
    pub limit: Option<usize>,
    /// Optional number of entries skipped.
    pub offset: Option<usize>,
}

impl RuleAuditQuery {
    /// Returns the page size clamped to `1..=MAX_AUDIT_PAGE_LIMIT`.
    #[must_use]
    pub fn effective_limit(&self) -> usize {
        self.limit
            .unwrap_or(DEFAULT_AUDIT_PAGE_LIMIT)
            .clamp(1, MAX_AUDIT_PAGE_LIMIT)
    }

    /// Returns the number of entries skipped.
    #[must_use]
    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// One page of audit entries, newest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleAuditPage {
    /// Entries in the requested window.
    pub entries: Vec<RuleAuditEntry>,
    /// Total entries matching the filter.
    pub total: u64,
}

/// Port for the append-only rule audit log.
#[async_trait]
pub trait RuleAuditRepository: Send + Sync {
    /// Appends one entry.
    async fn append_entry(&self, entry: NewRuleAuditEntry) -> AppResult<RuleAuditEntry>;

    /// Lists entries newest first.
    async fn list_entries(&self, query: RuleAuditQuery) -> AppResult<RuleAuditPage>;
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_AUDIT_PAGE_LIMIT, MAX_AUDIT_PAGE_LIMIT, RuleAuditQuery};

    #[test]
    fn query_limit_defaults_and_clamps() {
        assert_eq!(
            RuleAuditQuery::default().effective_limit(),
            DEFAULT_AUDIT_PAGE_LIMIT
        );

        let zero = RuleAuditQuery {
            limit: Some(0),
            ..RuleAuditQuery::default()
        };
        assert_eq!(zero.effective_limit(), 1);

        let huge = RuleAuditQuery {
            limit: Some(10_000),
            ..RuleAuditQuery::default()
        };
        assert_eq!(huge.effective_limit(), MAX_AUDIT_PAGE_LIMIT);
    }
}
