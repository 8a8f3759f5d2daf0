use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use crate::map::geometry::Geometry;

pub type FeatureId = u64;

/// Attribute value attached to a feature
#[derive(Clone, Debug, Default, PartialEq)]
pub enum AttributeValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Number(n) => Some(*n),
            AttributeValue::Text(s) => s.trim().parse().ok(),
            AttributeValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            AttributeValue::Null => None,
        }
    }

    /// Ordering used for label priority: numbers numerically, everything else as
    /// text; nulls sort lowest.
    pub fn priority_cmp(&self, other: &AttributeValue) -> Ordering {
        match (self, other) {
            (AttributeValue::Null, AttributeValue::Null) => Ordering::Equal,
            (AttributeValue::Null, _) => Ordering::Less,
            (_, AttributeValue::Null) => Ordering::Greater,
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => self.to_string().cmp(&other.to_string()),
            },
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Null => Ok(()),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            AttributeValue::Number(n) => write!(f, "{n}"),
            AttributeValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::Text(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        AttributeValue::Number(n)
    }
}

impl From<&serde_json::Value> for AttributeValue {
    fn from(v: &serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Number),
            serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
            other => AttributeValue::Text(other.to_string()),
        }
    }
}

/// A geometry with its attributes
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    pub geometry: Geometry,
    pub attributes: HashMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(id: FeatureId, geometry: Geometry) -> Self {
        Self {
            id,
            geometry,
            attributes: HashMap::new(),
        }
    }

    /// Builder-style attribute insert
    pub fn with(mut self, field: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(field.to_string(), value.into());
        self
    }

    /// Attribute lookup; field names match case-insensitively when no exact
    /// match exists
    pub fn attribute(&self, field: &str) -> Option<&AttributeValue> {
        self.attributes.get(field).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(field))
                .map(|(_, v)| v)
        })
    }
}
