//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod action;
mod condition;
mod peer;
mod rule;

pub use action::{DEFAULT_BAN_TIME_SECONDS, RuleAction};
pub use condition::{Comparison, ConditionOperator, ConditionSet, ConditionSpec, FieldCondition};
pub use peer::Peer;
pub use rule::{RuleDefinition, RuleDefinitionInput, RuleDefinitionUpdate};
