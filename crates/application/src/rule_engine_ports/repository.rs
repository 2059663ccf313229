use async_trait::async_trait;
use peerwarden_core::{AppResult, RuleId};
use peerwarden_domain::RuleDefinition;

/// One active rule loaded from storage and decoded on its own.
///
/// A row that fails to decode keeps its identifier and name so the failure
/// can be reported against that rule alone.
#[derive(Debug)]
pub struct StoredRule {
    /// Identifier of the stored row.
    pub rule_id: RuleId,
    /// Stored rule name.
    pub rule_name: String,
    /// Decoded rule, or the decode error for this row.
    pub decoded: AppResult<RuleDefinition>,
}

impl StoredRule {
    /// Wraps a rule that decoded cleanly.
    #[must_use]
    pub fn decoded(rule: RuleDefinition) -> Self {
        Self {
            rule_id: rule.id(),
            rule_name: rule.name().as_str().to_owned(),
            decoded: Ok(rule),
        }
    }
}

/// Repository port for rule definitions.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Inserts a new rule and returns it with store-assigned timestamps.
    async fn insert_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition>;

    /// Replaces an existing rule and returns it with a fresh `updated_at`.
    async fn update_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition>;

    /// Returns one rule by identifier.
    async fn find_rule(&self, rule_id: RuleId) -> AppResult<Option<RuleDefinition>>;

    /// Lists every rule, oldest first.
    async fn list_rules(&self) -> AppResult<Vec<RuleDefinition>>;

    /// Lists rules with `is_active = true`, oldest first.
    ///
    /// Fails only when the listing itself fails. Rows that do not decode are
    /// returned as records carrying their error.
    async fn list_active_rules(&self) -> AppResult<Vec<StoredRule>>;

    /// Deletes one rule together with its audit entries.
    async fn delete_rule(&self, rule_id: RuleId) -> AppResult<()>;
}
