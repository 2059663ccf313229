use async_trait::async_trait;
use chrono::Utc;
use peerwarden_application::{
    NewRuleAuditEntry, RuleAuditEntry, RuleAuditPage, RuleAuditQuery, RuleAuditRepository,
    RuleRepository, StoredRule,
};
use peerwarden_core::{AppError, AppResult, RuleId};
use peerwarden_domain::RuleDefinition;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct RuleStoreState {
    rules: Vec<RuleDefinition>,
    audit_entries: Vec<RuleAuditEntry>,
}

/// In-memory rule store and audit log.
///
/// Both live behind one lock so deleting a rule removes its audit entries
/// atomically.
#[derive(Debug, Default)]
pub struct InMemoryRuleRepository {
    state: RwLock<RuleStoreState>,
}

impl InMemoryRuleRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn insert_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition> {
        let mut state = self.state.write().await;
        if state.rules.iter().any(|stored| stored.id() == rule.id()) {
            return Err(AppError::Conflict(format!(
                "rule '{}' already exists",
                rule.id()
            )));
        }

        let now = Utc::now();
        let stored = rule.with_timestamps(now, now);
        state.rules.push(stored.clone());
        Ok(stored)
    }

    async fn update_rule(&self, rule: RuleDefinition) -> AppResult<RuleDefinition> {
        let mut state = self.state.write().await;
        let Some(stored) = state
            .rules
            .iter_mut()
            .find(|stored| stored.id() == rule.id())
        else {
            return Err(AppError::NotFound(format!(
                "rule '{}' does not exist",
                rule.id()
            )));
        };

        let updated = rule.with_timestamps(stored.created_at(), Utc::now());
        *stored = updated.clone();
        Ok(updated)
    }

    async fn find_rule(&self, rule_id: RuleId) -> AppResult<Option<RuleDefinition>> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .iter()
            .find(|rule| rule.id() == rule_id)
            .cloned())
    }

    async fn list_rules(&self) -> AppResult<Vec<RuleDefinition>> {
        Ok(self.state.read().await.rules.clone())
    }

    async fn list_active_rules(&self) -> AppResult<Vec<StoredRule>> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .iter()
            .filter(|rule| rule.is_active())
            .cloned()
            .map(StoredRule::decoded)
            .collect())
    }

    async fn delete_rule(&self, rule_id: RuleId) -> AppResult<()> {
        let mut state = self.state.write().await;
        let before = state.rules.len();
        state.rules.retain(|rule| rule.id() != rule_id);
        if state.rules.len() == before {
            return Err(AppError::NotFound(format!(
                "rule '{rule_id}' does not exist"
            )));
        }

        state.audit_entries.retain(|entry| entry.rule_id != rule_id);
        Ok(())
    }
}

#[async_trait]
impl RuleAuditRepository for InMemoryRuleRepository {
    async fn append_entry(&self, entry: NewRuleAuditEntry) -> AppResult<RuleAuditEntry> {
        let mut state = self.state.write().await;
        if !state.rules.iter().any(|rule| rule.id() == entry.rule_id) {
            return Err(AppError::NotFound(format!(
                "rule '{}' does not exist",
                entry.rule_id
            )));
        }

        let stored = RuleAuditEntry::from_new(Uuid::new_v4(), entry);
        state.audit_entries.push(stored.clone());
        Ok(stored)
    }

    async fn list_entries(&self, query: RuleAuditQuery) -> AppResult<RuleAuditPage> {
        let state = self.state.read().await;

        let mut matching: Vec<&RuleAuditEntry> = state
            .audit_entries
            .iter()
            .rev()
            .filter(|entry| query.rule_id.is_none_or(|rule_id| entry.rule_id == rule_id))
            .collect();
        matching.sort_by(|left, right| right.triggered_at.cmp(&left.triggered_at));

        Ok(RuleAuditPage {
            total: u64::try_from(matching.len()).unwrap_or(u64::MAX),
            entries: matching
                .into_iter()
                .skip(query.effective_offset())
                .take(query.effective_limit())
                .cloned()
                .collect(),
        })
    }
}
