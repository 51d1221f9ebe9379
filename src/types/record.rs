//! Raw input records and validated feature vectors

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

/// A single untyped input value, as received from JSON or a CSV cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// JSON number
    Number(f64),
    /// JSON string or CSV cell (parsed by the schema)
    Text(String),
    /// JSON null
    Null,
    /// Any other JSON value (bool, array, object), kept for error context
    Other(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(v) => RawValue::Number(v),
                None => RawValue::Other(n.to_string()),
            },
            serde_json::Value::String(s) => RawValue::Text(s),
            serde_json::Value::Null => RawValue::Null,
            other => RawValue::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawValue::Number(v) => write!(f, "{}", v),
            RawValue::Text(s) => write!(f, "{}", s),
            RawValue::Null => write!(f, "null"),
            RawValue::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Unvalidated name→value mapping for one company.
///
/// Extra keys are allowed and ignored by the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: HashMap<String, RawValue>,
    identifier: Option<String>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a field
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<RawValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Attach an external identifier (e.g. a company name column)
    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.fields.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<RawValue> {
        self.fields.remove(name)
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for RawRecord {
    fn from(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            fields: map.into_iter().map(|(k, v)| (k, RawValue::from(v))).collect(),
            identifier: None,
        }
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(k, v)| (k.into(), RawValue::Number(v)))
                .collect(),
            identifier: None,
        }
    }
}

/// Soft warning for a numeric value outside the feature's expected range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeWarning {
    pub feature: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

impl std::fmt::Display for RangeWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "'{}' = {} is outside the expected range [{}, {}]",
            self.feature, self.value, self.min, self.max
        )
    }
}

/// Validated, immutable feature vector in canonical schema order.
///
/// Only the feature schema constructs these, so every value is finite and
/// every required feature is present.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Arc<[String]>,
    values: Vec<f64>,
    warnings: Vec<RangeWarning>,
}

impl FeatureVector {
    pub(crate) fn new(names: Arc<[String]>, values: Vec<f64>, warnings: Vec<RangeWarning>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self {
            names,
            values,
            warnings,
        }
    }

    /// Values in canonical order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Feature names in canonical order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Look up a value by feature name
    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.values[i])
    }

    /// (name, value) pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Out-of-range warnings raised during validation
    pub fn warnings(&self) -> &[RangeWarning] {
        &self.warnings
    }
}

impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_from_json() {
        assert_eq!(RawValue::from(serde_json::json!(0.25)), RawValue::Number(0.25));
        assert_eq!(RawValue::from(serde_json::json!("0.3")), RawValue::Text("0.3".into()));
        assert_eq!(RawValue::from(serde_json::json!(null)), RawValue::Null);
        assert_eq!(RawValue::from(serde_json::json!(true)), RawValue::Other("true".into()));
    }

    #[test]
    fn test_raw_record_from_json_map() {
        let json = serde_json::json!({ "Net worth/Assets": 0.8, "Company": "Acme" });
        let map = json.as_object().cloned().unwrap();
        let record = RawRecord::from(map);

        assert_eq!(record.len(), 2);
        assert_eq!(record.get("Net worth/Assets"), Some(&RawValue::Number(0.8)));
        assert_eq!(record.get("Company"), Some(&RawValue::Text("Acme".into())));
    }

    #[test]
    fn test_feature_vector_serializes_in_canonical_order() {
        let names: Arc<[String]> = vec!["b".to_string(), "a".to_string()].into();
        let vector = FeatureVector::new(names, vec![0.5, 0.25], Vec::new());

        let json = serde_json::to_string(&vector).unwrap();
        assert_eq!(json, r#"{"b":0.5,"a":0.25}"#);
        assert_eq!(vector.get("a"), Some(0.25));
        assert_eq!(vector.get("missing"), None);
    }
}
