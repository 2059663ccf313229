use peerwarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison operators usable inside an operator-object condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionOperator {
    /// Equality comparison.
    Eq,
    /// Inequality comparison.
    Neq,
    /// Numeric greater-than comparison.
    Gt,
    /// Numeric greater-than-or-equal comparison.
    Gte,
    /// Numeric less-than comparison.
    Lt,
    /// Numeric less-than-or-equal comparison.
    Lte,
    /// Substring test on string values.
    Contains,
    /// Prefix test on string values.
    StartsWith,
    /// Suffix test on string values.
    EndsWith,
    /// Membership test against an array operand.
    In,
}

impl ConditionOperator {
    /// Every supported operator.
    pub const ALL: [Self; 10] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::Contains,
        Self::StartsWith,
        Self::EndsWith,
        Self::In,
    ];

    /// Returns the serialized operator name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Contains => "contains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::In => "in",
        }
    }

    /// Resolves a serialized operator name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|operator| operator.as_str() == name)
    }

    fn operand_error(&self, operand: &Value) -> Option<String> {
        let accepted = match self {
            Self::Eq | Self::Neq => true,
            Self::Gt | Self::Gte | Self::Lt | Self::Lte => operand.is_number(),
            Self::Contains | Self::StartsWith | Self::EndsWith => operand.is_string(),
            Self::In => operand.is_array(),
        };

        (!accepted).then(|| {
            let expected = match self {
                Self::Gt | Self::Gte | Self::Lt | Self::Lte => "a number",
                Self::Contains | Self::StartsWith | Self::EndsWith => "a string",
                Self::In => "an array",
                Self::Eq | Self::Neq => "any value",
            };
            format!("operator '{}' requires {expected}", self.as_str())
        })
    }
}

/// One entry of an operator-object condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    /// Known operator with its operand.
    Operator {
        /// Operator applied to the resolved field value.
        operator: ConditionOperator,
        /// Operand compared against the resolved field value.
        operand: Value,
    },
    /// Operator name loaded from storage that this build does not know.
    Unsupported {
        /// Raw operator name.
        operator: String,
        /// Raw operand kept for lossless serialization.
        operand: Value,
    },
}

impl Comparison {
    fn name(&self) -> &str {
        match self {
            Self::Operator { operator, .. } => operator.as_str(),
            Self::Unsupported { operator, .. } => operator.as_str(),
        }
    }

    fn operand(&self) -> &Value {
        match self {
            Self::Operator { operand, .. } | Self::Unsupported { operand, .. } => operand,
        }
    }
}

/// Condition applied to one resolved field value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionSpec {
    /// Scalar spec compared by equality.
    Equals(Value),
    /// Operator object whose comparisons must all pass.
    Operators(Vec<Comparison>),
}

impl ConditionSpec {
    fn from_value(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::Equals(value.clone());
        };

        Self::Operators(
            object
                .iter()
                .map(|(name, operand)| match ConditionOperator::from_name(name) {
                    Some(operator) => Comparison::Operator {
                        operator,
                        operand: operand.clone(),
                    },
                    None => Comparison::Unsupported {
                        operator: name.clone(),
                        operand: operand.clone(),
                    },
                })
                .collect(),
        )
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Equals(value) => value.clone(),
            Self::Operators(comparisons) => Value::Object(
                comparisons
                    .iter()
                    .map(|comparison| (comparison.name().to_owned(), comparison.operand().clone()))
                    .collect(),
            ),
        }
    }
}

/// Condition bound to one dot-separated field path.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    path: String,
    spec: ConditionSpec,
}

impl FieldCondition {
    /// Creates a field condition.
    #[must_use]
    pub fn new(path: impl Into<String>, spec: ConditionSpec) -> Self {
        Self {
            path: path.into(),
            spec,
        }
    }

    /// Returns the dot-separated field path.
    #[must_use]
    pub fn path(&self) -> &str {
        self.path.as_str()
    }

    /// Returns the condition spec.
    #[must_use]
    pub fn spec(&self) -> &ConditionSpec {
        &self.spec
    }

    fn validate(&self) -> AppResult<()> {
        if self.path.split('.').any(|segment| segment.trim().is_empty()) {
            return Err(AppError::Validation(format!(
                "condition field path '{}' must not contain empty segments",
                self.path
            )));
        }

        let ConditionSpec::Operators(comparisons) = &self.spec else {
            return Ok(());
        };

        if comparisons.is_empty() {
            return Err(AppError::Validation(format!(
                "condition for '{}' must define at least one operator",
                self.path
            )));
        }

        for comparison in comparisons {
            match comparison {
                Comparison::Unsupported { operator, .. } => {
                    return Err(AppError::Validation(format!(
                        "condition for '{}' uses unknown operator '{operator}'",
                        self.path
                    )));
                }
                Comparison::Operator { operator, operand } => {
                    if let Some(message) = operator.operand_error(operand) {
                        return Err(AppError::Validation(format!(
                            "condition for '{}': {message}",
                            self.path
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// AND-combined set of field conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ConditionSet {
    fields: Vec<FieldCondition>,
}

impl ConditionSet {
    /// Parses serialized conditions.
    ///
    /// `null` is the absent tree. Unknown operator names are kept as
    /// [`Comparison::Unsupported`] so legacy rows still load; use
    /// [`ConditionSet::validate`] to reject them.
    pub fn from_value(value: &Value) -> AppResult<Self> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(object) => Ok(Self {
                fields: object
                    .iter()
                    .map(|(path, spec)| {
                        FieldCondition::new(path.clone(), ConditionSpec::from_value(spec))
                    })
                    .collect(),
            }),
            _ => Err(AppError::Validation(
                "rule conditions must be a JSON object".to_owned(),
            )),
        }
    }

    /// Applies write-time validation.
    pub fn validate(&self) -> AppResult<()> {
        self.fields.iter().try_for_each(FieldCondition::validate)
    }

    /// Serializes conditions to their stored JSON object form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Object(
            self.fields
                .iter()
                .map(|field| (field.path.clone(), field.spec.to_value()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// Returns the AND-combined field conditions.
    #[must_use]
    pub fn fields(&self) -> &[FieldCondition] {
        self.fields.as_slice()
    }

    /// Returns whether the set has no field conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl TryFrom<Value> for ConditionSet {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<ConditionSet> for Value {
    fn from(value: ConditionSet) -> Self {
        value.to_value()
    }
}
