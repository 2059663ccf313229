use std::cmp::Ordering;

use peerwarden_domain::{
    Comparison, ConditionOperator, ConditionSet, ConditionSpec, FieldCondition, Peer,
};
use serde_json::Value;
use tracing::warn;

/// Returns whether `peer` satisfies every field condition in `conditions`.
///
/// An empty set matches every peer. A missing attribute, a type mismatch or an
/// unknown operator fails the field condition instead of raising an error.
#[must_use]
pub fn matches_conditions(peer: &Peer, conditions: &ConditionSet) -> bool {
    conditions
        .fields()
        .iter()
        .all(|field| field_condition_matches(peer, field))
}

fn field_condition_matches(peer: &Peer, field: &FieldCondition) -> bool {
    let Some(value) = peer.attribute(field.path()) else {
        return false;
    };

    match field.spec() {
        ConditionSpec::Equals(expected) => values_equal(value, expected),
        ConditionSpec::Operators(comparisons) => comparisons
            .iter()
            .all(|comparison| comparison_holds(field.path(), value, comparison)),
    }
}

fn comparison_holds(field_path: &str, value: &Value, comparison: &Comparison) -> bool {
    match comparison {
        Comparison::Operator { operator, operand } => operator_holds(*operator, value, operand),
        Comparison::Unsupported { operator, .. } => {
            warn!(
                field_path = %field_path,
                operator = %operator,
                "unknown condition operator; condition fails closed"
            );
            false
        }
    }
}

fn operator_holds(operator: ConditionOperator, value: &Value, operand: &Value) -> bool {
    match operator {
        ConditionOperator::Eq => values_equal(value, operand),
        ConditionOperator::Neq => !values_equal(value, operand),
        ConditionOperator::Gt => compare_numbers(value, operand).is_some_and(Ordering::is_gt),
        ConditionOperator::Gte => compare_numbers(value, operand).is_some_and(Ordering::is_ge),
        ConditionOperator::Lt => compare_numbers(value, operand).is_some_and(Ordering::is_lt),
        ConditionOperator::Lte => compare_numbers(value, operand).is_some_and(Ordering::is_le),
        ConditionOperator::Contains => {
            compare_strings(value, operand, |text, needle| text.contains(needle))
        }
        ConditionOperator::StartsWith => {
            compare_strings(value, operand, |text, prefix| text.starts_with(prefix))
        }
        ConditionOperator::EndsWith => {
            compare_strings(value, operand, |text, suffix| text.ends_with(suffix))
        }
        ConditionOperator::In => operand
            .as_array()
            .is_some_and(|candidates| candidates.iter().any(|item| values_equal(value, item))),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(left_number), Value::Number(right_number)) => {
            match (left_number.as_f64(), right_number.as_f64()) {
                (Some(left_float), Some(right_float)) => {
                    left_float.partial_cmp(&right_float) == Some(Ordering::Equal)
                }
                _ => left_number == right_number,
            }
        }
        _ => left == right,
    }
}

fn compare_numbers(value: &Value, operand: &Value) -> Option<Ordering> {
    let (Value::Number(value), Value::Number(operand)) = (value, operand) else {
        return None;
    };

    value.as_f64()?.partial_cmp(&operand.as_f64()?)
}

fn compare_strings(value: &Value, operand: &Value, test: impl Fn(&str, &str) -> bool) -> bool {
    match (value.as_str(), operand.as_str()) {
        (Some(text), Some(pattern)) => test(text, pattern),
        _ => false,
    }
}
