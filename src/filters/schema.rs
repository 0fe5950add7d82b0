//! Parameter schemas for filters
//!
//! A [`FilterSchema`] declares, in order, every parameter a filter accepts:
//! its type, default, inclusive range and whether it must be odd. Schemas
//! are static data built once with the registry. [`ValidatedParams`] is the
//! only parameter container a stage ever holds, and it can only be produced
//! by the validator.

use serde::{Deserialize, Serialize};

/// Declared type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Integer,
    Real,
}

/// A sanitized parameter value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Real(f64),
}

impl ParamValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParamValue::Integer(v) => v as f64,
            ParamValue::Real(v) => v,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match *self {
            ParamValue::Integer(v) => serde_json::Value::from(v),
            ParamValue::Real(v) => serde_json::Value::from(v),
        }
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Integer(v) => write!(f, "{}", v),
            ParamValue::Real(v) => write!(f, "{:.3}", v),
        }
    }
}

/// Declaration of one filter parameter
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub default: f64,
    /// Inclusive lower bound
    pub min: f64,
    /// Inclusive upper bound
    pub max: f64,
    pub must_be_odd: bool,
}

impl ParamSpec {
    /// Integer parameter
    pub fn integer(name: impl Into<String>, default: i64, min: i64, max: i64) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Integer,
            default: default as f64,
            min: min as f64,
            max: max as f64,
            must_be_odd: false,
        }
    }

    /// Real parameter
    pub fn real(name: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Real,
            default,
            min,
            max,
            must_be_odd: false,
        }
    }

    /// Require the sanitized value to be an odd integer (kernel sizes)
    pub fn odd(mut self) -> Self {
        self.must_be_odd = true;
        self
    }
}

/// Cross-parameter constraint applied after per-parameter validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ParamRule {
    /// At least one of `params` must be non-zero; otherwise `fallback` is set to 1
    AnyNonZero {
        params: Vec<String>,
        fallback: String,
    },
}

/// Static description of a filter and its parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSchema {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub rules: Vec<ParamRule>,
}

impl FilterSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            rules: Vec::new(),
        }
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn rule(mut self, rule: ParamRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn spec(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }
}

/// Parameter values that satisfy their schema
///
/// Values are kept in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedParams {
    values: Vec<(String, ParamValue)>,
}

impl ValidatedParams {
    /// Only the validator builds these
    pub(crate) fn from_values(values: Vec<(String, ParamValue)>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        self.values
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| *value)
    }

    pub(crate) fn set(&mut self, name: &str, value: ParamValue) {
        if let Some(slot) = self.values.iter_mut().find(|(key, _)| key == name) {
            slot.1 = value;
        }
    }

    /// Integer value of `name`, converting a real if needed
    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).map(|v| match v {
            ParamValue::Integer(i) => i,
            ParamValue::Real(r) => r.round() as i64,
        })
    }

    pub fn real(&self, name: &str) -> Option<f64> {
        self.get(name).map(|v| v.as_f64())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// JSON object form, as used in persisted stage records
    pub fn to_json_map(&self) -> serde_json::Map<String, serde_json::Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder() {
        let schema = FilterSchema::new("blur", "Blur")
            .param(ParamSpec::integer("ksize", 5, 1, 31).odd())
            .param(ParamSpec::real("amount", 1.0, 0.0, 2.0));

        assert_eq!(schema.params.len(), 2);
        assert!(schema.spec("ksize").unwrap().must_be_odd);
        assert_eq!(schema.spec("amount").unwrap().kind, ParamKind::Real);
        assert!(schema.spec("missing").is_none());
    }

    #[test]
    fn test_validated_params_accessors() {
        let params = ValidatedParams::from_values(vec![
            ("ksize".to_string(), ParamValue::Integer(9)),
            ("alpha".to_string(), ParamValue::Real(1.5)),
        ]);
        assert_eq!(params.int("ksize"), Some(9));
        assert_eq!(params.real("ksize"), Some(9.0));
        assert_eq!(params.real("alpha"), Some(1.5));
        assert_eq!(params.int("beta"), None);

        let json = params.to_json_map();
        assert_eq!(json["ksize"], serde_json::json!(9));
        assert_eq!(json["alpha"], serde_json::json!(1.5));
    }

    #[test]
    fn test_param_value_untagged_serde() {
        let v: ParamValue = serde_json::from_str("7").unwrap();
        assert_eq!(v, ParamValue::Integer(7));
        let v: ParamValue = serde_json::from_str("0.5").unwrap();
        assert_eq!(v, ParamValue::Real(0.5));
    }
}
