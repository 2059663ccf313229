use chrono::{DateTime, Utc};
use peerwarden_core::{AppResult, NonEmptyString, RuleId};

use crate::{ConditionSet, RuleAction};

/// Peer automation rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinition {
    id: RuleId,
    name: NonEmptyString,
    description: Option<String>,
    conditions: ConditionSet,
    action: RuleAction,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Input payload used to construct a validated rule.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDefinitionInput {
    /// Human label.
    pub name: String,
    /// Optional free-text description.
    pub description: Option<String>,
    /// AND-combined field conditions.
    pub conditions: ConditionSet,
    /// Action applied to matched peers.
    pub action: RuleAction,
    /// Whether the rule takes part in execution.
    pub is_active: bool,
}

/// Partial rule update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleDefinitionUpdate {
    /// Replacement name.
    pub name: Option<String>,
    /// Replacement description; `Some(None)` clears it.
    pub description: Option<Option<String>>,
    /// Replacement conditions.
    pub conditions: Option<ConditionSet>,
    /// Replacement action.
    pub action: Option<RuleAction>,
    /// Replacement active flag.
    pub is_active: Option<bool>,
}

impl RuleDefinition {
    /// Creates a validated rule with a fresh identifier.
    pub fn new(input: RuleDefinitionInput) -> AppResult<Self> {
        input.conditions.validate()?;
        input.action.validate()?;

        let now = Utc::now();
        Self::restore(RuleId::new(), input, now, now)
    }

    /// Rebuilds a stored rule without write-time operator and action checks.
    pub fn restore(
        id: RuleId,
        input: RuleDefinitionInput,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> AppResult<Self> {
        let RuleDefinitionInput {
            name,
            description,
            conditions,
            action,
            is_active,
        } = input;

        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            description: normalize_description(description),
            conditions,
            action,
            is_active,
            created_at,
            updated_at,
        })
    }

    /// Returns a copy with the update applied and validated.
    pub fn apply_update(&self, update: RuleDefinitionUpdate) -> AppResult<Self> {
        let RuleDefinitionUpdate {
            name,
            description,
            conditions,
            action,
            is_active,
        } = update;

        if let Some(conditions) = &conditions {
            conditions.validate()?;
        }
        if let Some(action) = &action {
            action.validate()?;
        }

        let mut updated = self.clone();
        if let Some(name) = name {
            updated.name = NonEmptyString::new(name)?;
        }
        if let Some(description) = description {
            updated.description = normalize_description(description);
        }
        if let Some(conditions) = conditions {
            updated.conditions = conditions;
        }
        if let Some(action) = action {
            updated.action = action;
        }
        if let Some(is_active) = is_active {
            updated.is_active = is_active;
        }
        updated.updated_at = Utc::now();

        Ok(updated)
    }

    /// Returns a copy carrying store-assigned timestamps.
    #[must_use]
    pub fn with_timestamps(mut self, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = updated_at;
        self
    }

    /// Returns the rule identifier.
    #[must_use]
    pub fn id(&self) -> RuleId {
        self.id
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the AND-combined field conditions.
    #[must_use]
    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Returns the action applied to matched peers.
    #[must_use]
    pub fn action(&self) -> &RuleAction {
        &self.action
    }

    /// Returns whether the rule takes part in execution.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last update timestamp.
    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{RuleDefinition, RuleDefinitionInput, RuleDefinitionUpdate};
    use crate::{ConditionSet, RuleAction};

    fn input(conditions: serde_json::Value, action: RuleAction) -> RuleDefinitionInput {
        RuleDefinitionInput {
            name: "Slow peers".to_owned(),
            description: Some("  drop laggy peers  ".to_owned()),
            conditions: ConditionSet::from_value(&conditions).unwrap_or_default(),
            action,
            is_active: true,
        }
    }

    #[test]
    fn rule_requires_non_empty_name() {
        let mut rule_input = input(json!({"pingtime": {"gt": 1}}), RuleAction::Disconnect);
        rule_input.name = "  ".to_owned();

        assert!(RuleDefinition::new(rule_input).is_err());
    }

    #[test]
    fn rule_rejects_unknown_operators_and_actions() {
        let unknown_operator = input(json!({"pingtime": {"above": 1}}), RuleAction::Disconnect);
        assert!(RuleDefinition::new(unknown_operator).is_err());

        let unknown_action = input(
            json!({"pingtime": {"gt": 1}}),
            RuleAction::Unsupported {
                action: "quarantine".to_owned(),
            },
        );
        assert!(RuleDefinition::new(unknown_action).is_err());
    }

    #[test]
    fn restore_accepts_legacy_operators() {
        let legacy = input(json!({"pingtime": {"above": 1}}), RuleAction::Disconnect);
        let now = chrono::Utc::now();
        assert!(RuleDefinition::restore(peerwarden_core::RuleId::new(), legacy, now, now).is_ok());
    }

    #[test]
    fn description_is_trimmed_and_blank_dropped() {
        let rule = RuleDefinition::new(input(json!({}), RuleAction::Disconnect));
        assert!(rule.is_ok());
        let rule = rule.unwrap_or_else(|_| unreachable!());
        assert_eq!(rule.description(), Some("drop laggy peers"));

        let cleared = rule.apply_update(RuleDefinitionUpdate {
            description: Some(Some("   ".to_owned())),
            ..RuleDefinitionUpdate::default()
        });
        assert!(cleared.is_ok());
        assert_eq!(
            cleared.unwrap_or_else(|_| unreachable!()).description(),
            None
        );
    }

    #[test]
    fn update_changes_only_supplied_fields() {
        let rule = RuleDefinition::new(input(
            json!({"pingtime": {"gt": 1}}),
            RuleAction::Ban {
                ban_time_seconds: Some(60),
            },
        ))
        .unwrap_or_else(|_| unreachable!());

        let updated = rule
            .apply_update(RuleDefinitionUpdate {
                is_active: Some(false),
                ..RuleDefinitionUpdate::default()
            })
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(updated.id(), rule.id());
        assert!(!updated.is_active());
        assert_eq!(updated.name(), rule.name());
        assert_eq!(updated.conditions(), rule.conditions());
        assert_eq!(updated.action(), rule.action());
        assert_eq!(updated.created_at(), rule.created_at());
    }

    #[test]
    fn update_validates_replacement_conditions() {
        let rule = RuleDefinition::new(input(json!({}), RuleAction::Disconnect))
            .unwrap_or_else(|_| unreachable!());

        let result = rule.apply_update(RuleDefinitionUpdate {
            conditions: ConditionSet::from_value(&json!({"pingtime": {"gt": "slow"}})).ok(),
            ..RuleDefinitionUpdate::default()
        });
        assert!(result.is_err());
    }
}
