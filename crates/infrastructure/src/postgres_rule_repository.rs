use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerwarden_application::{RuleRepository, StoredRule};
use peerwarden_core::{AppError, AppResult, RuleId};
use peerwarden_domain::{ConditionSet, RuleAction, RuleDefinition, RuleDefinitionInput};
use serde_json::Value;
use sqlx::{FromRow, PgPool};

/// PostgreSQL-backed rule repository.
#[derive(Clone)]
pub struct PostgresRuleRepository {
    pool: PgPool,
}

impl PostgresRuleRepository {
    /// Creates a rule repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct RuleRow {
    id: uuid::Uuid,
    name: String,
    description: Option<String>,
    conditions: Value,
    actions: Value,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const RULE_COLUMNS: &str =
    "id, name, description, conditions, actions, is_active, created_at, updated_at";

#[async_trait]
impl RuleRepository for PostgresRuleRepository {
    async fn insert_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition> {
        let result = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            INSERT INTO peer_rules (id, name, description, conditions, actions, is_active)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(rule.id().as_uuid())
        .bind(rule.name().as_str())
        .bind(rule.description())
        .bind(rule.conditions().to_value())
        .bind(rule.action().to_value())
        .bind(rule.is_active())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => rule_from_row(row),
            Err(error) => {
                if let sqlx::Error::Database(database_error) = &error
                    && database_error.code().as_deref() == Some("23505")
                {
                    return Err(AppError::Conflict(format!(
                        "rule '{}' already exists",
                        rule.id()
                    )));
                }

                Err(AppError::Internal(format!(
                    "failed to insert rule '{}': {error}",
                    rule.id()
                )))
            }
        }
    }

    async fn update_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            UPDATE peer_rules
            SET
                name = $2,
                description = $3,
                conditions = $4,
                actions = $5,
                is_active = $6,
                updated_at = now()
            WHERE id = $1
            RETURNING {RULE_COLUMNS}
            "#
        ))
        .bind(rule.id().as_uuid())
        .bind(rule.name().as_str())
        .bind(rule.description())
        .bind(rule.conditions().to_value())
        .bind(rule.action().to_value())
        .bind(rule.is_active())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to update rule '{}': {error}", rule.id()))
        })?
        .ok_or_else(|| AppError::NotFound(format!("rule '{}' does not exist", rule.id())))?;

        rule_from_row(row)
    }

    async fn find_rule(&self, rule_id: RuleId) -> AppResult<Option<RuleDefinition>> {
        let row = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM peer_rules WHERE id = $1"
        ))
        .bind(rule_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find rule '{rule_id}': {error}")))?;

        row.map(rule_from_row).transpose()
    }

    async fn list_rules(&self) -> AppResult<Vec<RuleDefinition>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            "SELECT {RULE_COLUMNS} FROM peer_rules ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list rules: {error}")))?;

        rows.into_iter().map(rule_from_row).collect()
    }

    async fn list_active_rules(&self) -> AppResult<Vec<StoredRule>> {
        let rows = sqlx::query_as::<_, RuleRow>(&format!(
            r#"
            SELECT {RULE_COLUMNS}
            FROM peer_rules
            WHERE is_active
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list active rules: {error}")))?;

        Ok(rows.into_iter().map(stored_rule_from_row).collect())
    }

    async fn delete_rule(&self, rule_id: RuleId) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM peer_rules WHERE id = $1")
            .bind(rule_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete rule '{rule_id}': {error}"))
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "rule '{rule_id}' does not exist"
            )));
        }

        Ok(())
    }
}

fn stored_rule_from_row(row: RuleRow) -> StoredRule {
    let rule_id = RuleId::from_uuid(row.id);
    let rule_name = row.name.clone();

    StoredRule {
        rule_id,
        rule_name,
        decoded: rule_from_row(row),
    }
}

fn rule_from_row(row: RuleRow) -> AppResult<RuleDefinition> {
    let rule_id = RuleId::from_uuid(row.id);
    let conditions = ConditionSet::from_value(&row.conditions).map_err(|error| {
        AppError::Internal(format!(
            "stored conditions for rule '{rule_id}' are corrupt: {error}"
        ))
    })?;
    let action = RuleAction::from_value(&row.actions).map_err(|error| {
        AppError::Internal(format!(
            "stored actions for rule '{rule_id}' are corrupt: {error}"
        ))
    })?;

    RuleDefinition::restore(
        rule_id,
        RuleDefinitionInput {
            name: row.name,
            description: row.description,
            conditions,
            action,
            is_active: row.is_active,
        },
        row.created_at,
        row.updated_at,
    )
}
