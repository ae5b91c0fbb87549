use crate::types::Error;
use std::{convert::TryFrom, fmt};

/// Defines the fundamental types an exposed device attribute can
/// take. Cloud payloads are JSON, so every attribute a device reports
/// is reduced to one of these values before it reaches the host.

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// For attributes that report a simple true/false, on/off,
    /// detected/clear state.
    Bool(bool),

    /// For attributes that report an integer value, such as battery
    /// percentage or signal strength. It is stored as a signed,
    /// 32-bit value. Larger integers arriving from the cloud are
    /// widened into `Flt`, which losslessly handles integers up to 52
    /// bits.
    Int(i32),

    /// For attributes that report floating point numbers, such as
    /// temperature readings.
    Flt(f64),

    /// For attributes that report text: activity states, mode names,
    /// timestamps rendered for display, presigned URLs. Drivers of
    /// frequently-changing attributes should keep these short.
    Str(String),
}

impl Value {
    /// Reduces a JSON payload field to an attribute value. Scalar
    /// fields map directly; `null`, arrays, and objects have no
    /// attribute representation and yield `None`.

    pub fn from_json(v: &serde_json::Value) -> Option<Value> {
        match v {
            serde_json::Value::Bool(v) => Some(Value::Bool(*v)),
            serde_json::Value::Number(v) => {
                if let Some(v) = v.as_i64() {
                    if let Ok(v) = i32::try_from(v) {
                        Some(Value::Int(v))
                    } else {
                        Some(Value::Flt(v as f64))
                    }
                } else {
                    v.as_f64().map(Value::Flt)
                }
            }
            serde_json::Value::String(v) => Some(Value::Str(v.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Flt(v) => write!(f, "{}", v),
            Value::Str(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Bool(v) = value {
            Ok(v)
        } else {
            Err(Error::TypeError)
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl TryFrom<Value> for i32 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Int(v) = value {
            return Ok(v);
        }
        Err(Error::TypeError)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl TryFrom<Value> for f64 {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Flt(v) => Ok(v),
            Value::Int(v) => Ok(f64::from(v)),
            _ => Err(Error::TypeError),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Flt(value)
    }
}

impl TryFrom<Value> for String {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if let Value::Str(v) = value {
            return Ok(v);
        }
        Err(Error::TypeError)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(String::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversions() {
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(bool::try_from(Value::Bool(false)), Ok(false));
        assert_eq!(bool::try_from(Value::Int(0)), Err(Error::TypeError));

        assert_eq!(Value::from(95), Value::Int(95));
        assert_eq!(i32::try_from(Value::Int(-40)), Ok(-40));
        assert_eq!(i32::try_from(Value::Flt(1.0)), Err(Error::TypeError));

        // Integer attribute values widen into floats, but not the
        // reverse.

        assert_eq!(f64::try_from(Value::Int(72)), Ok(72.0));
        assert_eq!(f64::try_from(Value::Flt(72.5)), Ok(72.5));
        assert_eq!(f64::try_from(Value::Bool(true)), Err(Error::TypeError));

        assert_eq!(Value::from("armed"), Value::Str(String::from("armed")));
        assert_eq!(
            String::try_from(Value::Str(String::from("idle"))),
            Ok(String::from("idle"))
        );
    }

    #[test]
    fn test_from_json() {
        assert_eq!(Value::from_json(&json!(true)), Some(Value::Bool(true)));
        assert_eq!(Value::from_json(&json!(63)), Some(Value::Int(63)));
        assert_eq!(Value::from_json(&json!(-12.5)), Some(Value::Flt(-12.5)));
        assert_eq!(
            Value::from_json(&json!("charged")),
            Some(Value::Str(String::from("charged")))
        );

        // 52-bit media counters won't fit an i32 but are exact as
        // floats.

        assert_eq!(
            Value::from_json(&json!(5_000_000_000i64)),
            Some(Value::Flt(5_000_000_000.0))
        );

        // Structured fields have no scalar rendition.

        assert_eq!(Value::from_json(&json!(null)), None);
        assert_eq!(Value::from_json(&json!([1, 2])), None);
        assert_eq!(Value::from_json(&json!({ "on": true })), None);
    }
}
