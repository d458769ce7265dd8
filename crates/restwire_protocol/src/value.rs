//! Property and literal values.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scalar property value.
///
/// `Value` is the dynamic value type used for entity properties, key
/// values, and query literals. The engine never inspects application
/// payloads beyond these scalars; complex values are property maps on the
/// entity itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent / null value.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Renders the value as a raw URI literal.
    ///
    /// Text is single-quoted with internal quotes doubled. The result is
    /// not yet percent-escaped; callers apply the escaping table that
    /// matches the position the literal lands in (key segment, filter
    /// expression, query option value).
    pub fn to_literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => {
                if d.fract() == 0.0 && d.is_finite() {
                    format!("{d:.1}")
                } else {
                    d.to_string()
                }
            }
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    /// Returns the text content if this is a `Text` value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content if this is an `Int` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns true if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_literal())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_literals() {
        assert_eq!(Value::Null.to_literal(), "null");
        assert_eq!(Value::Bool(true).to_literal(), "true");
        assert_eq!(Value::Int(42).to_literal(), "42");
        assert_eq!(Value::Double(2.5).to_literal(), "2.5");
        assert_eq!(Value::Double(3.0).to_literal(), "3.0");
    }

    #[test]
    fn text_literal_is_quoted() {
        assert_eq!(Value::Text("ALFKI".into()).to_literal(), "'ALFKI'");
    }

    #[test]
    fn internal_quote_is_doubled() {
        let v = Value::Text("O'Brien".into());
        assert_eq!(v.to_literal(), "'O''Brien'");
    }

    #[test]
    fn conversions() {
        assert_eq!(Value::from(7i32), Value::Int(7));
        assert_eq!(Value::from("x"), Value::Text("x".into()));
        assert!(Value::Null.is_null());
        assert_eq!(Value::from("abc").as_text(), Some("abc"));
        assert_eq!(Value::from(9i64).as_int(), Some(9));
    }
}
