use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerwarden_application::{
    NewRuleAuditEntry, RuleAuditEntry, RuleAuditPage, RuleAuditQuery, RuleAuditRepository,
};
use peerwarden_core::{AppError, AppResult, RuleId};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed repository for the rule audit log.
#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    entry_id: uuid::Uuid,
    rule_id: uuid::Uuid,
    triggered_at: DateTime<Utc>,
    peer_snapshot: Value,
    action_taken: String,
    result: String,
}

#[async_trait]
impl RuleAuditRepository for PostgresAuditLogRepository {
    async fn append_entry(&self, entry: NewRuleAuditEntry) -> AppResult<RuleAuditEntry> {
        let entry_id = uuid::Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO peer_rule_audit_log (
                id,
                rule_id,
                triggered_at,
                peer_snapshot,
                action_taken,
                result
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry_id)
        .bind(entry.rule_id.as_uuid())
        .bind(entry.triggered_at)
        .bind(&entry.peer_snapshot)
        .bind(entry.action_taken.as_str())
        .bind(entry.result.as_str())
        .execute(&self.pool)
        .await;

        if let Err(error) = result {
            if let sqlx::Error::Database(database_error) = &error
                && database_error.code().as_deref() == Some("23503")
            {
                return Err(AppError::NotFound(format!(
                    "rule '{}' does not exist",
                    entry.rule_id
                )));
            }

            return Err(AppError::Internal(format!(
                "failed to append audit entry for rule '{}': {error}",
                entry.rule_id
            )));
        }

        Ok(RuleAuditEntry::from_new(entry_id, entry))
    }

    async fn list_entries(&self, query: RuleAuditQuery) -> AppResult<RuleAuditPage> {
        let rule_filter = query.rule_id.map(|rule_id| rule_id.as_uuid());
        let limit = i64::try_from(query.effective_limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.effective_offset()).unwrap_or(i64::MAX);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM peer_rule_audit_log
            WHERE ($1::UUID IS NULL OR rule_id = $1)
            "#,
        )
        .bind(rule_filter)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count audit entries: {error}")))?;

        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT
                id AS entry_id,
                rule_id,
                triggered_at,
                peer_snapshot,
                action_taken,
                result
            FROM peer_rule_audit_log
            WHERE ($1::UUID IS NULL OR rule_id = $1)
            ORDER BY triggered_at DESC, id DESC
            LIMIT $2
            OFFSET $3
            "#,
        )
        .bind(rule_filter)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list audit entries: {error}")))?;

        Ok(RuleAuditPage {
            entries: rows
                .into_iter()
                .map(|row| RuleAuditEntry {
                    entry_id: row.entry_id,
                    rule_id: RuleId::from_uuid(row.rule_id),
                    triggered_at: row.triggered_at,
                    peer_snapshot: row.peer_snapshot,
                    action_taken: row.action_taken,
                    result: row.result,
                })
                .collect(),
            total: u64::try_from(total).unwrap_or_default(),
        })
    }
}
