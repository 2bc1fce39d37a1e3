//! Scalar conversion between values and their text form
//!
//! Defaults, distance computation and external codecs all go through the
//! converter registered for a property's value type.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::value::{Value, ValueType};

/// Text could not be converted into a value
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert '{text}' to {target}: {reason}")]
pub struct ConversionError {
    pub text: String,
    pub target: String,
    pub reason: String,
}

/// Converts one scalar type to and from text
pub trait ScalarConverter: Send + Sync {
    /// Whether `value` is a legal value of this scalar type
    fn is_convertible(&self, value: &Value) -> bool;

    /// Text form of `value`; `None` when the value is not of this type
    fn to_text(&self, value: &Value) -> Option<String>;

    /// Parse text into a value
    ///
    /// # Errors
    ///
    /// Returns a `ConversionError` when the text is not a valid literal.
    fn from_text(&self, text: &str) -> Result<Value, ConversionError>;
}

fn conversion_error(text: &str, target: &str, reason: impl fmt::Display) -> ConversionError {
    ConversionError {
        text: text.to_string(),
        target: target.to_string(),
        reason: reason.to_string(),
    }
}

struct BoolConverter;

impl ScalarConverter for BoolConverter {
    fn is_convertible(&self, value: &Value) -> bool {
        matches!(value, Value::Bool(_))
    }

    fn to_text(&self, value: &Value) -> Option<String> {
        value.as_bool().map(|b| b.to_string())
    }

    fn from_text(&self, text: &str) -> Result<Value, ConversionError> {
        text.trim()
            .parse::<bool>()
            .map(Value::Bool)
            .map_err(|e| conversion_error(text, "bool", e))
    }
}

struct IntConverter;

impl ScalarConverter for IntConverter {
    fn is_convertible(&self, value: &Value) -> bool {
        matches!(value, Value::Int(_))
    }

    fn to_text(&self, value: &Value) -> Option<String> {
        value.as_int().map(|i| i.to_string())
    }

    fn from_text(&self, text: &str) -> Result<Value, ConversionError> {
        text.trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| conversion_error(text, "int", e))
    }
}

struct FloatConverter;

impl ScalarConverter for FloatConverter {
    fn is_convertible(&self, value: &Value) -> bool {
        matches!(value, Value::Float(_))
    }

    fn to_text(&self, value: &Value) -> Option<String> {
        match value {
            Value::Float(x) => Some(x.to_string()),
            _ => None,
        }
    }

    fn from_text(&self, text: &str) -> Result<Value, ConversionError> {
        text.trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| conversion_error(text, "float", e))
    }
}

struct TextConverter;

impl ScalarConverter for TextConverter {
    fn is_convertible(&self, value: &Value) -> bool {
        matches!(value, Value::Text(_))
    }

    fn to_text(&self, value: &Value) -> Option<String> {
        value.as_text().map(str::to_string)
    }

    fn from_text(&self, text: &str) -> Result<Value, ConversionError> {
        Ok(Value::Text(text.to_string()))
    }
}

/// RFC 3339 timestamps, normalized to UTC
struct DateConverter;

impl ScalarConverter for DateConverter {
    fn is_convertible(&self, value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }

    fn to_text(&self, value: &Value) -> Option<String> {
        match value {
            Value::Date(d) => Some(d.to_rfc3339()),
            _ => None,
        }
    }

    fn from_text(&self, text: &str) -> Result<Value, ConversionError> {
        DateTime::parse_from_rfc3339(text.trim())
            .map(|d| Value::Date(d.with_timezone(&Utc)))
            .map_err(|e| conversion_error(text, "date", e))
    }
}

/// Lookup table from scalar value type to its converter
#[derive(Clone, Default)]
pub struct ConverterTable {
    converters: HashMap<ValueType, Arc<dyn ScalarConverter>>,
}

impl ConverterTable {
    /// Empty table (no built-in scalars)
    pub fn new() -> Self {
        Self::default()
    }

    /// Table with converters for bool, int, float, text and date
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.insert(ValueType::Bool, Arc::new(BoolConverter));
        table.insert(ValueType::Int, Arc::new(IntConverter));
        table.insert(ValueType::Float, Arc::new(FloatConverter));
        table.insert(ValueType::Text, Arc::new(TextConverter));
        table.insert(ValueType::Date, Arc::new(DateConverter));
        table
    }

    /// Register a converter for a named custom scalar
    pub fn register(&mut self, name: impl Into<String>, converter: Arc<dyn ScalarConverter>) {
        self.insert(ValueType::Custom(name.into()), converter);
    }

    fn insert(&mut self, value_type: ValueType, converter: Arc<dyn ScalarConverter>) {
        self.converters.insert(value_type, converter);
    }

    pub fn get(&self, value_type: &ValueType) -> Option<&dyn ScalarConverter> {
        self.converters.get(value_type).map(|c| c.as_ref())
    }

    pub fn is_convertible(&self, value_type: &ValueType, value: &Value) -> bool {
        self.get(value_type)
            .map(|c| c.is_convertible(value))
            .unwrap_or(false)
    }

    /// Text form of a scalar value; Null renders as the empty string
    pub fn to_text(&self, value_type: &ValueType, value: &Value) -> String {
        if value.is_null() {
            return String::new();
        }
        self.get(value_type)
            .and_then(|c| c.to_text(value))
            .unwrap_or_else(|| value.to_string())
    }

    /// Parse text for the given scalar type
    ///
    /// # Errors
    ///
    /// Returns a `ConversionError` when no converter is registered for the
    /// type or the text is rejected by it.
    pub fn from_text(&self, value_type: &ValueType, text: &str) -> Result<Value, ConversionError> {
        let converter = self.get(value_type).ok_or_else(|| {
            conversion_error(text, &value_type.to_string(), "no converter registered")
        })?;
        converter.from_text(text)
    }
}

impl fmt::Debug for ConverterTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<String> = self.converters.keys().map(|t| t.to_string()).collect();
        types.sort();
        f.debug_struct("ConverterTable")
            .field("types", &types)
            .finish()
    }
}
