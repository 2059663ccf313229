use std::sync::Arc;

use chrono::{DateTime, Utc};
use peerwarden_core::{AppError, AppResult, RuleId};
use peerwarden_domain::{
    ConditionSet, RuleAction, RuleDefinition, RuleDefinitionInput, RuleDefinitionUpdate,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use crate::rule_engine_ports::{RuleAuditPage, RuleAuditQuery, RuleAuditRepository, RuleRepository};

/// Payload for creating a rule from raw JSON conditions and actions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleInput {
    /// Human label.
    pub name: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Condition object keyed by attribute path.
    #[serde(default)]
    pub conditions: Value,
    /// Action object such as `{"action":"ban","banTime":3600}`.
    pub actions: Value,
    /// Whether the rule takes part in execution.
    #[serde(default = "default_active")]
    pub is_active: bool,
}

/// Partial rule update; absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleInput {
    /// Replacement name.
    #[serde(default)]
    pub name: Option<String>,
    /// Replacement description; an explicit `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    /// Replacement conditions.
    #[serde(default)]
    pub conditions: Option<Value>,
    /// Replacement actions.
    #[serde(default)]
    pub actions: Option<Value>,
    /// Replacement active flag.
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Serializable rule representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleView {
    /// Rule identifier.
    pub id: RuleId,
    /// Human label.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Serialized conditions.
    pub conditions: Value,
    /// Serialized action.
    pub actions: Value,
    /// Active flag.
    pub is_active: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl From<&RuleDefinition> for RuleView {
    fn from(rule: &RuleDefinition) -> Self {
        Self {
            id: rule.id(),
            name: rule.name().as_str().to_owned(),
            description: rule.description().map(ToOwned::to_owned),
            conditions: rule.conditions().to_value(),
            actions: rule.action().to_value(),
            is_active: rule.is_active(),
            created_at: rule.created_at(),
            updated_at: rule.updated_at(),
        }
    }
}

/// Rule management service.
#[derive(Clone)]
pub struct RuleService {
    repository: Arc<dyn RuleRepository>,
    audit_repository: Arc<dyn RuleAuditRepository>,
}

impl RuleService {
    /// Creates a rule service from its stores.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RuleRepository>,
        audit_repository: Arc<dyn RuleAuditRepository>,
    ) -> Self {
        Self {
            repository,
            audit_repository,
        }
    }

    /// Validates and stores a new rule.
    pub async fn create_rule(&self, input: CreateRuleInput) -> AppResult<RuleDefinition> {
        let rule = RuleDefinition::new(RuleDefinitionInput {
            name: input.name,
            description: input.description,
            conditions: ConditionSet::from_value(&input.conditions)?,
            action: RuleAction::from_value(&input.actions)?,
            is_active: input.is_active,
        })?;

        let stored = self.repository.insert_rule(rule).await?;
        info!(rule_id = %stored.id(), rule_name = stored.name().as_str(), "rule created");
        Ok(stored)
    }

    /// Applies a partial update to one rule.
    pub async fn update_rule(
        &self,
        rule_id: RuleId,
        input: UpdateRuleInput,
    ) -> AppResult<RuleDefinition> {
        let current = self.find_rule(rule_id).await?;

        let update = RuleDefinitionUpdate {
            name: input.name,
            description: input.description,
            conditions: input
                .conditions
                .as_ref()
                .map(ConditionSet::from_value)
                .transpose()?,
            action: input
                .actions
                .as_ref()
                .map(RuleAction::from_value)
                .transpose()?,
            is_active: input.is_active,
        };

        let updated = self
            .repository
            .update_rule(current.apply_update(update)?)
            .await?;
        info!(rule_id = %updated.id(), "rule updated");
        Ok(updated)
    }

    /// Toggles whether a rule takes part in execution.
    pub async fn set_rule_active(
        &self,
        rule_id: RuleId,
        is_active: bool,
    ) -> AppResult<RuleDefinition> {
        self.update_rule(
            rule_id,
            UpdateRuleInput {
                is_active: Some(is_active),
                ..UpdateRuleInput::default()
            },
        )
        .await
    }

    /// Deletes one rule and its audit entries.
    pub async fn delete_rule(&self, rule_id: RuleId) -> AppResult<()> {
        self.repository.delete_rule(rule_id).await?;
        info!(rule_id = %rule_id, "rule deleted");
        Ok(())
    }

    /// Returns one rule.
    pub async fn find_rule(&self, rule_id: RuleId) -> AppResult<RuleDefinition> {
        self.repository
            .find_rule(rule_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rule '{rule_id}' does not exist")))
    }

    /// Lists every rule, oldest first.
    pub async fn list_rules(&self) -> AppResult<Vec<RuleDefinition>> {
        self.repository.list_rules().await
    }

    /// Lists audit entries newest first.
    pub async fn list_audit_entries(&self, query: RuleAuditQuery) -> AppResult<RuleAuditPage> {
        self.audit_repository.list_entries(query).await
    }
}

fn default_active() -> bool {
    true
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}
