use peerwarden_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Ban duration applied when a ban action omits `banTime`.
pub const DEFAULT_BAN_TIME_SECONDS: u64 = 86_400;

/// Action applied to every peer matched by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum RuleAction {
    /// Bans the peer address.
    Ban {
        /// Optional ban duration in seconds.
        ban_time_seconds: Option<u64>,
    },
    /// Disconnects the peer without banning it.
    Disconnect,
    /// Action name loaded from storage that this build does not know.
    Unsupported {
        /// Raw action name.
        action: String,
    },
}

impl RuleAction {
    /// Returns the stable action type value.
    #[must_use]
    pub fn action_type(&self) -> &str {
        match self {
            Self::Ban { .. } => "ban",
            Self::Disconnect => "disconnect",
            Self::Unsupported { action } => action.as_str(),
        }
    }

    /// Returns the ban duration, falling back to [`DEFAULT_BAN_TIME_SECONDS`].
    #[must_use]
    pub fn effective_ban_time_seconds(&self) -> Option<u64> {
        match self {
            Self::Ban { ban_time_seconds } => {
                Some(ban_time_seconds.unwrap_or(DEFAULT_BAN_TIME_SECONDS))
            }
            Self::Disconnect | Self::Unsupported { .. } => None,
        }
    }

    /// Parses a serialized action spec such as `{"action":"ban","banTime":3600}`.
    ///
    /// Unknown action names load as [`RuleAction::Unsupported`].
    pub fn from_value(value: &Value) -> AppResult<Self> {
        let object = value.as_object().ok_or_else(|| {
            AppError::Validation("rule actions must be a JSON object".to_owned())
        })?;

        let action = object
            .get("action")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::Validation("rule actions require string field 'action'".to_owned())
            })?;

        match action {
            "ban" => Ok(Self::Ban {
                ban_time_seconds: parse_ban_time(object.get("banTime"))?,
            }),
            "disconnect" => Ok(Self::Disconnect),
            other => Ok(Self::Unsupported {
                action: other.to_owned(),
            }),
        }
    }

    /// Applies write-time validation.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Ban { .. } | Self::Disconnect => Ok(()),
            Self::Unsupported { action } => Err(AppError::Validation(format!(
                "unknown rule action '{action}'; expected 'ban' or 'disconnect'"
            ))),
        }
    }

    /// Serializes the action to its stored JSON object form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "action".to_owned(),
            Value::String(self.action_type().to_owned()),
        );
        if let Self::Ban {
            ban_time_seconds: Some(seconds),
        } = self
        {
            object.insert("banTime".to_owned(), Value::from(*seconds));
        }

        Value::Object(object)
    }
}

fn parse_ban_time(value: Option<&Value>) -> AppResult<Option<u64>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(raw) => raw
            .as_u64()
            .filter(|seconds| *seconds > 0)
            .map(Some)
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "ban action banTime must be a positive integer number of seconds, got {raw}"
                ))
            }),
    }
}

impl TryFrom<Value> for RuleAction {
    type Error = AppError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(&value)
    }
}

impl From<RuleAction> for Value {
    fn from(value: RuleAction) -> Self {
        value.to_value()
    }
}
