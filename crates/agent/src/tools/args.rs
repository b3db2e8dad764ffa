use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use wagewiz_core::domain::normalize_identifier;
use wagewiz_core::domain::employee::LeaveType;
use wagewiz_core::errors::ToolError;

/// Typed access to a model-supplied argument object.
///
/// Every accessor fails with [`ToolError::Validation`] naming the offending
/// key, so the model can correct itself on the next turn.
pub(crate) struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    /// Parses the raw argument text. Blank text is treated as `{}`.
    pub(crate) fn parse(raw: &str) -> Result<Self, ToolError> {
        if raw.trim().is_empty() {
            return Ok(Self { values: Map::new() });
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(values)) => Ok(Self { values }),
            Ok(Value::Null) => Ok(Self { values: Map::new() }),
            Ok(_) => Err(ToolError::Validation("arguments must be a JSON object".to_string())),
            Err(error) => {
                Err(ToolError::Validation(format!("arguments are not valid JSON: {error}")))
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self { values: Map::new() },
        }
    }

    fn present(&self, key: &str) -> Option<&Value> {
        match self.values.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) if text.trim().is_empty() => None,
            Some(value) => Some(value),
        }
    }

    fn required(&self, key: &str) -> Result<&Value, ToolError> {
        self.present(key).ok_or_else(|| ToolError::Validation(format!("`{key}` is required")))
    }

    pub(crate) fn reject_unknown(&self, allowed: &[&str]) -> Result<(), ToolError> {
        let mut unknown = self
            .values
            .keys()
            .filter(|key| !allowed.contains(&key.as_str()))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if unknown.is_empty() {
            return Ok(());
        }
        unknown.sort_unstable();
        Err(ToolError::Validation(format!(
            "unsupported field(s): {} (allowed: {})",
            unknown.join(", "),
            allowed.join(", ")
        )))
    }

    /// An identifier given as a string or a number, normalized.
    pub(crate) fn id(&self, key: &str) -> Result<String, ToolError> {
        self.optional_id(key)?.ok_or_else(|| ToolError::Validation(format!("`{key}` is required")))
    }

    pub(crate) fn optional_id(&self, key: &str) -> Result<Option<String>, ToolError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(normalize_identifier(text))),
            Some(Value::Number(number)) => Ok(Some(number.to_string())),
            Some(_) => Err(ToolError::Validation(format!("`{key}` must be a string or number"))),
        }
    }

    pub(crate) fn text(&self, key: &str) -> Result<String, ToolError> {
        self.optional_text(key)?
            .ok_or_else(|| ToolError::Validation(format!("`{key}` is required")))
    }

    pub(crate) fn optional_text(&self, key: &str) -> Result<Option<String>, ToolError> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(text)) => Ok(Some(text.trim().to_string())),
            Some(_) => Err(ToolError::Validation(format!("`{key}` must be a string"))),
        }
    }

    /// A calendar date as `YYYY-MM-DD`.
    pub(crate) fn date(&self, key: &str) -> Result<NaiveDate, ToolError> {
        self.optional_date(key)?
            .ok_or_else(|| ToolError::Validation(format!("`{key}` is required")))
    }

    pub(crate) fn optional_date(&self, key: &str) -> Result<Option<NaiveDate>, ToolError> {
        let Some(value) = self.present(key) else {
            return Ok(None);
        };
        let Value::String(raw) = value else {
            return Err(ToolError::Validation(format!("`{key}` must be a date string")));
        };
        let raw = raw.trim();

        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(Some).map_err(|_| {
            ToolError::Validation(format!("`{key}` must be a date in YYYY-MM-DD form"))
        })
    }

    pub(crate) fn amount(&self, key: &str) -> Result<Decimal, ToolError> {
        self.optional_amount(key)?
            .ok_or_else(|| ToolError::Validation(format!("`{key}` is required")))
    }

    /// A non-negative monetary amount given as a JSON number.
    pub(crate) fn optional_amount(&self, key: &str) -> Result<Option<Decimal>, ToolError> {
        let raw = match self.present(key) {
            None => return Ok(None),
            Some(Value::Number(number)) => number.to_string(),
            Some(_) => return Err(ToolError::Validation(format!("`{key}` must be a number"))),
        };

        let amount = Decimal::from_str(&raw)
            .or_else(|_| Decimal::from_scientific(&raw))
            .map_err(|_| ToolError::Validation(format!("`{key}` must be a number")))?;
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(ToolError::Validation(format!("`{key}` must not be negative")));
        }
        Ok(Some(amount))
    }

    pub(crate) fn integer(&self, key: &str) -> Result<i64, ToolError> {
        let invalid = || ToolError::Validation(format!("`{key}` must be a whole number"));
        match self.required(key)? {
            Value::Number(number) => number.as_i64().ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }

    /// One of the lowercase leave types, matched exactly.
    pub(crate) fn leave_type(&self, key: &str) -> Result<LeaveType, ToolError> {
        match self.required(key)? {
            Value::String(raw) if raw == "sick" => Ok(LeaveType::Sick),
            Value::String(raw) if raw == "casual" => Ok(LeaveType::Casual),
            _ => Err(ToolError::Validation(format!("`{key}` must be one of: sick, casual"))),
        }
    }

    pub(crate) fn object(&self, key: &str) -> Result<Arguments, ToolError> {
        match self.required(key)? {
            Value::Object(values) => Ok(Arguments { values: values.clone() }),
            _ => Err(ToolError::Validation(format!("`{key}` must be an object"))),
        }
    }
}
