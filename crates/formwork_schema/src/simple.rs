//! Leaf value kinds and their parsing rules.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::arity::Arity;
use crate::error::{FieldPath, SchemaError, SchemaResult};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 3] = ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"];

/// The kind of a leaf field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimpleType {
    Text,
    Integer,
    Decimal,
    Boolean,
    /// Display-only text; answers are accepted and ignored.
    Message,
    Email,
    Date,
    Time,
    /// Reference to a previously uploaded file.
    Upload,
}

/// A parsed leaf answer.
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleValue {
    Text(String),
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    Message,
    Email(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Upload(String),
}

impl SimpleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimpleType::Text => "TEXT",
            SimpleType::Integer => "INTEGER",
            SimpleType::Decimal => "DECIMAL",
            SimpleType::Boolean => "BOOLEAN",
            SimpleType::Message => "MESSAGE",
            SimpleType::Email => "EMAIL",
            SimpleType::Date => "DATE",
            SimpleType::Time => "TIME",
            SimpleType::Upload => "UPLOAD",
        }
    }

    /// Whether form authors may change the arity declared for this kind.
    pub fn has_fixed_arity(&self) -> bool {
        matches!(self, SimpleType::Message | SimpleType::Upload)
    }

    /// Whether an occurrence of this kind needs a value at its own key.
    pub fn requires_value(&self) -> bool {
        !matches!(self, SimpleType::Message)
    }

    /// Parse a raw wire value. `None` means the key carried no value.
    pub fn validate(&self, raw: Option<&str>) -> Result<SimpleValue, String> {
        if *self == SimpleType::Message {
            return Ok(SimpleValue::Message);
        }

        let raw = raw.ok_or_else(|| "a value is required".to_string())?;

        match self {
            SimpleType::Text => Ok(SimpleValue::Text(raw.to_string())),
            SimpleType::Integer => raw
                .parse::<i64>()
                .map(SimpleValue::Integer)
                .map_err(|e| format!("'{raw}' is not an integer: {e}")),
            SimpleType::Decimal => match raw.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(SimpleValue::Decimal(v)),
                Ok(_) => Err(format!("'{raw}' is not a finite number")),
                Err(e) => Err(format!("'{raw}' is not a decimal number: {e}")),
            },
            SimpleType::Boolean => match raw {
                "true" => Ok(SimpleValue::Boolean(true)),
                "false" => Ok(SimpleValue::Boolean(false)),
                _ => Err(format!("'{raw}' is neither 'true' nor 'false'")),
            },
            SimpleType::Email => validate_email(raw).map(|()| SimpleValue::Email(raw.to_string())),
            SimpleType::Date => NaiveDate::parse_from_str(raw, DATE_FORMAT)
                .map(SimpleValue::Date)
                .map_err(|e| format!("'{raw}' is not a YYYY-MM-DD date: {e}")),
            SimpleType::Time => TIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
                .map(SimpleValue::Time)
                .ok_or_else(|| format!("'{raw}' is not a HH:MM time")),
            SimpleType::Upload => {
                if raw.trim().is_empty() {
                    Err("the upload id must not be blank".to_string())
                } else {
                    Ok(SimpleValue::Upload(raw.to_string()))
                }
            }
            SimpleType::Message => Ok(SimpleValue::Message),
        }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

fn validate_email(raw: &str) -> Result<(), String> {
    let (local, domain) = raw
        .split_once('@')
        .ok_or_else(|| format!("'{raw}' is not an email address"))?;
    let domain_ok = !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.');
    if local.is_empty() || !domain_ok || raw.chars().any(char::is_whitespace) {
        return Err(format!("'{raw}' is not an email address"));
    }
    Ok(())
}

impl SimpleValue {
    /// The kind this value belongs to.
    pub fn kind(&self) -> SimpleType {
        match self {
            SimpleValue::Text(_) => SimpleType::Text,
            SimpleValue::Integer(_) => SimpleType::Integer,
            SimpleValue::Decimal(_) => SimpleType::Decimal,
            SimpleValue::Boolean(_) => SimpleType::Boolean,
            SimpleValue::Message => SimpleType::Message,
            SimpleValue::Email(_) => SimpleType::Email,
            SimpleValue::Date(_) => SimpleType::Date,
            SimpleValue::Time(_) => SimpleType::Time,
            SimpleValue::Upload(_) => SimpleType::Upload,
        }
    }

    /// String form stored in a submission; messages carry nothing.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            SimpleValue::Text(v) | SimpleValue::Email(v) | SimpleValue::Upload(v) => Some(v.clone()),
            SimpleValue::Integer(v) => Some(v.to_string()),
            SimpleValue::Decimal(v) => Some(v.to_string()),
            SimpleValue::Boolean(v) => Some(v.to_string()),
            SimpleValue::Date(v) => Some(v.format(DATE_FORMAT).to_string()),
            SimpleValue::Time(v) => Some(v.format(TIME_FORMATS[0]).to_string()),
            SimpleValue::Message => None,
        }
    }
}

/// A leaf field payload: its kind and how many answers it takes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleField {
    pub kind: SimpleType,
    pub arity: Arity,
}

impl SimpleField {
    /// Messages are always optional whatever `arity` says.
    pub fn new(kind: SimpleType, arity: Arity) -> Self {
        let arity = if kind == SimpleType::Message {
            Arity::optional()
        } else {
            arity
        };
        Self { kind, arity }
    }

    pub fn message() -> Self {
        Self::new(SimpleType::Message, Arity::optional())
    }

    /// Copy with another arity. Kinds with a fixed arity are returned unchanged.
    pub fn request_arity(&self, arity: Arity) -> Self {
        if self.kind.has_fixed_arity() {
            self.clone()
        } else {
            Self {
                kind: self.kind,
                arity,
            }
        }
    }

    pub(crate) fn check(&self, path: &FieldPath) -> SchemaResult<()> {
        if self.kind == SimpleType::Message && self.arity != Arity::optional() {
            return Err(SchemaError::invalid(
                path,
                format!("a MESSAGE field is always optional, found arity {}", self.arity),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_decimal() {
        assert_eq!(SimpleType::Integer.validate(Some("-42")), Ok(SimpleValue::Integer(-42)));
        assert!(SimpleType::Integer.validate(Some("12.5")).is_err());
        assert_eq!(SimpleType::Decimal.validate(Some("12.5")), Ok(SimpleValue::Decimal(12.5)));
        assert!(SimpleType::Decimal.validate(Some("NaN")).is_err());
        assert!(SimpleType::Decimal.validate(Some("abc")).is_err());
    }

    #[test]
    fn test_boolean_is_literal() {
        assert_eq!(SimpleType::Boolean.validate(Some("true")), Ok(SimpleValue::Boolean(true)));
        assert!(SimpleType::Boolean.validate(Some("TRUE")).is_err());
        assert!(SimpleType::Boolean.validate(Some("1")).is_err());
    }

    #[test]
    fn test_message_requires_nothing() {
        assert_eq!(SimpleType::Message.validate(None), Ok(SimpleValue::Message));
        assert_eq!(SimpleType::Message.validate(Some("anything")), Ok(SimpleValue::Message));
        assert!(SimpleType::Text.validate(None).is_err());
    }

    #[test]
    fn test_email_date_time() {
        assert!(SimpleType::Email.validate(Some("jane.doe@example.org")).is_ok());
        assert!(SimpleType::Email.validate(Some("jane.doe@example")).is_err());
        assert!(SimpleType::Email.validate(Some("@example.org")).is_err());

        assert!(SimpleType::Date.validate(Some("2024-01-15")).is_ok());
        assert!(SimpleType::Date.validate(Some("15/01/2024")).is_err());

        assert!(SimpleType::Time.validate(Some("10:30")).is_ok());
        assert!(SimpleType::Time.validate(Some("10:30:15")).is_ok());
        assert!(SimpleType::Time.validate(Some("25:00")).is_err());
    }

    #[test]
    fn test_wire_form_parses_back() {
        let values = [
            SimpleValue::Integer(7),
            SimpleValue::Decimal(2.5),
            SimpleValue::Boolean(false),
            SimpleValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()),
            SimpleValue::Time(NaiveTime::from_hms_opt(8, 5, 0).unwrap()),
        ];
        for value in values {
            let wire = value.to_wire();
            assert_eq!(value.kind().validate(wire.as_deref()), Ok(value));
        }
    }

    #[test]
    fn test_time_keeps_fraction() {
        let time = NaiveTime::from_hms_milli_opt(8, 5, 0, 250).unwrap();
        let wire = SimpleValue::Time(time).to_wire().unwrap();
        assert!(wire.starts_with("08:05:00."), "{wire}");
        assert_eq!(SimpleType::Time.validate(Some(&wire)), Ok(SimpleValue::Time(time)));

        let whole = SimpleValue::Time(NaiveTime::from_hms_opt(8, 5, 0).unwrap());
        assert_eq!(whole.to_wire().as_deref(), Some("08:05:00"));
    }

    #[test]
    fn test_fixed_arity_kinds() {
        let message = SimpleField::new(SimpleType::Message, Arity::mandatory());
        assert_eq!(message.arity, Arity::optional());
        assert_eq!(message.request_arity(Arity::mandatory()), message);

        let upload = SimpleField::new(SimpleType::Upload, Arity::mandatory());
        assert_eq!(upload.request_arity(Arity::optional()).arity, Arity::mandatory());

        let text = SimpleField::new(SimpleType::Text, Arity::mandatory());
        assert_eq!(text.request_arity(Arity::optional()).arity, Arity::optional());
    }

    #[test]
    fn test_serialized_kind_names() {
        let json = serde_json::to_string(&SimpleType::Integer).unwrap();
        assert_eq!(json, "\"INTEGER\"");
    }
}
