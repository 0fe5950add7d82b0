//! Parameter validation
//!
//! [`validate`] is the single boundary between loosely-typed parameter input
//! (presets, suggested chains, UI edits, hand-written JSON) and the trusted
//! [`ValidatedParams`] a stage holds. It is total: for a well-formed schema it
//! never fails and never panics, whatever the raw map contains.
//!
//! For each declared parameter, in schema order:
//!
//! 1. Coerce the raw value to the declared type, falling back to the default
//!    when the key is missing or the value is unconvertible
//! 2. Clamp to the inclusive range
//! 3. For odd-only parameters, round and bump even values to the next odd
//!    value (or the previous one when the next would leave the range)
//!
//! Keys the schema does not declare are dropped and reported. Cross-parameter
//! rules run last.

use super::schema::{FilterSchema, ParamKind, ParamRule, ParamSpec, ParamValue, ValidatedParams};
use serde_json::{Map, Value};

/// Why a value differs from what the caller supplied
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionKind {
    /// Key absent, default used
    Defaulted,
    /// Value could not be converted to the declared type, default used
    Unconvertible,
    /// Value was outside the declared range
    Clamped,
    /// Value was even and the parameter must be odd
    ForcedOdd,
    /// A cross-parameter rule changed the value
    Rule,
}

/// One adjustment made by the validator
#[derive(Debug, Clone, PartialEq)]
pub struct Correction {
    pub param: String,
    pub kind: CorrectionKind,
    pub raw: Option<Value>,
    pub value: ParamValue,
}

/// Everything the validator changed or discarded
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub filter: String,
    pub corrections: Vec<Correction>,
    pub unknown_keys: Vec<String>,
}

impl ValidationReport {
    /// True when the input needed no correction beyond filling defaults
    pub fn is_clean(&self) -> bool {
        self.unknown_keys.is_empty()
            && self
                .corrections
                .iter()
                .all(|c| c.kind == CorrectionKind::Defaulted)
    }

    /// Corrections of a given kind for a parameter
    pub fn has(&self, param: &str, kind: CorrectionKind) -> bool {
        self.corrections
            .iter()
            .any(|c| c.param == param && c.kind == kind)
    }
}

/// Sanitize `raw` against `schema`, logging every correction
pub fn validate(schema: &FilterSchema, raw: &Map<String, Value>) -> ValidatedParams {
    validate_with_report(schema, raw).0
}

/// Sanitize `raw` against `schema` and return what was changed
pub fn validate_with_report(
    schema: &FilterSchema,
    raw: &Map<String, Value>,
) -> (ValidatedParams, ValidationReport) {
    let mut report = ValidationReport {
        filter: schema.name.clone(),
        ..Default::default()
    };

    let values = schema
        .params
        .iter()
        .map(|spec| {
            let value = sanitize_param(spec, raw.get(&spec.name), &mut report);
            (spec.name.clone(), value)
        })
        .collect();
    let mut params = ValidatedParams::from_values(values);

    for key in raw.keys() {
        if schema.spec(key).is_none() {
            tracing::warn!(
                "Parameter '{}' is not recognized by filter '{}', discarding",
                key,
                schema.name
            );
            report.unknown_keys.push(key.clone());
        }
    }

    for rule in &schema.rules {
        apply_rule(schema, rule, &mut params, &mut report);
    }

    (params, report)
}

fn sanitize_param(spec: &ParamSpec, raw: Option<&Value>, report: &mut ValidationReport) -> ParamValue {
    let mut record = |kind: CorrectionKind, raw: Option<&Value>, value: f64| {
        let value = typed(spec, value);
        if kind == CorrectionKind::Defaulted {
            tracing::debug!("'{}.{}' missing, using default {}", report.filter, spec.name, value);
        } else {
            tracing::warn!(
                "Invalid parameter '{}' for '{}' ({:?}), corrected to {}",
                spec.name,
                report.filter,
                kind,
                value
            );
        }
        report.corrections.push(Correction {
            param: spec.name.clone(),
            kind,
            raw: raw.cloned(),
            value,
        });
    };

    let mut value = match raw {
        None => {
            record(CorrectionKind::Defaulted, None, spec.default);
            spec.default
        }
        Some(v) => match coerce(spec.kind, v) {
            Some(coerced) => coerced,
            None => {
                record(CorrectionKind::Unconvertible, Some(v), spec.default);
                spec.default
            }
        },
    };

    // Defaults go through the same steps, so a sloppy schema default still
    // yields a conforming value.
    let clamped = clamp(value, spec.min, spec.max);
    if clamped != value {
        value = clamped;
        record(CorrectionKind::Clamped, raw, value);
    }

    if spec.must_be_odd {
        let odd = force_odd(value, spec.max);
        if odd != value {
            value = odd;
            record(CorrectionKind::ForcedOdd, raw, value);
        }
    }

    typed(spec, value)
}

fn typed(spec: &ParamSpec, value: f64) -> ParamValue {
    match spec.kind {
        ParamKind::Integer => ParamValue::Integer(value.round() as i64),
        ParamKind::Real => ParamValue::Real(value),
    }
}

/// Convert a JSON value to the declared kind, `None` if unconvertible
fn coerce(kind: ParamKind, value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i as f64)
            } else if n.as_u64().is_some() {
                Some(i64::MAX as f64)
            } else {
                n.as_f64()
            }
        }
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }?;

    if !number.is_finite() {
        return None;
    }

    Some(match kind {
        ParamKind::Integer => round_half_away(number),
        ParamKind::Real => number,
    })
}

/// `f64::round` rounds half away from zero
fn round_half_away(value: f64) -> f64 {
    value.round()
}

fn clamp(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

fn force_odd(value: f64, max: f64) -> f64 {
    let rounded = round_half_away(value);
    if (rounded as i64).rem_euclid(2) == 1 {
        rounded
    } else if rounded + 1.0 <= max {
        rounded + 1.0
    } else {
        rounded - 1.0
    }
}

fn apply_rule(
    schema: &FilterSchema,
    rule: &ParamRule,
    params: &mut ValidatedParams,
    report: &mut ValidationReport,
) {
    match rule {
        ParamRule::AnyNonZero { params: names, fallback } => {
            let all_zero = names
                .iter()
                .all(|name| params.get(name).map(|v| v.as_f64() == 0.0).unwrap_or(true));
            if !all_zero {
                return;
            }
            let Some(spec) = schema.spec(fallback) else {
                return;
            };
            let value = typed(spec, 1.0);
            tracing::warn!(
                "'{}': {} cannot all be zero, setting '{}' to 1",
                schema.name,
                names.join(" and "),
                fallback
            );
            params.set(fallback, value);
            report.corrections.push(Correction {
                param: fallback.clone(),
                kind: CorrectionKind::Rule,
                raw: None,
                value,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn blur_schema() -> FilterSchema {
        FilterSchema::new("apply_gaussian_blur", "Gaussian blur")
            .param(ParamSpec::integer("ksize", 5, 1, 31).odd())
    }

    fn raw(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_even_kernel_forced_odd() {
        let params = validate(&blur_schema(), &raw(json!({ "ksize": 8 })));
        assert_eq!(params.int("ksize"), Some(9));
    }

    #[test]
    fn test_negative_kernel_clamped_then_odd() {
        let (params, report) = validate_with_report(&blur_schema(), &raw(json!({ "ksize": -3 })));
        assert_eq!(params.int("ksize"), Some(1));
        assert!(report.has("ksize", CorrectionKind::Clamped));
    }

    #[test]
    fn test_float_kernel_rounded() {
        let params = validate(&blur_schema(), &raw(json!({ "ksize": 6.4 })));
        assert_eq!(params.int("ksize"), Some(7));
        let params = validate(&blur_schema(), &raw(json!({ "ksize": 7.6 })));
        assert_eq!(params.int("ksize"), Some(9));
    }

    #[test]
    fn test_odd_at_even_max_stays_in_range() {
        let schema = FilterSchema::new("f", "").param(ParamSpec::integer("k", 3, 1, 30).odd());
        let params = validate(&schema, &raw(json!({ "k": 100 })));
        assert_eq!(params.int("k"), Some(29));
    }

    #[test]
    fn test_unconvertible_uses_default() {
        let schema = blur_schema();
        for bad in [json!("wide"), json!(null), json!([3]), json!({ "k": 3 })] {
            let (params, report) = validate_with_report(&schema, &raw(json!({ "ksize": bad })));
            assert_eq!(params.int("ksize"), Some(5));
            assert!(report.has("ksize", CorrectionKind::Unconvertible));
        }
    }

    #[test]
    fn test_numeric_string_and_bool_coerced() {
        let schema = FilterSchema::new("adjust_brightness_contrast", "")
            .param(ParamSpec::real("alpha", 1.0, 0.0, 3.0))
            .param(ParamSpec::integer("beta", 0, -100, 100));
        let params = validate(&schema, &raw(json!({ "alpha": " 1.5 ", "beta": true })));
        assert_eq!(params.real("alpha"), Some(1.5));
        assert_eq!(params.int("beta"), Some(1));
    }

    #[test]
    fn test_missing_key_uses_default_without_warning() {
        let (params, report) = validate_with_report(&blur_schema(), &Map::new());
        assert_eq!(params.int("ksize"), Some(5));
        assert!(report.is_clean());
    }

    #[test]
    fn test_unknown_keys_discarded_and_reported() {
        let (params, report) = validate_with_report(
            &blur_schema(),
            &raw(json!({ "ksize": 3, "enabled": false, "sigma": 2.0 })),
        );
        assert_eq!(params.len(), 1);
        assert!(params.get("sigma").is_none());
        assert_eq!(report.unknown_keys.len(), 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_any_non_zero_rule() {
        let schema = FilterSchema::new("apply_sobel_edge_detection", "")
            .param(ParamSpec::integer("dx", 1, 0, 1))
            .param(ParamSpec::integer("dy", 0, 0, 1))
            .rule(ParamRule::AnyNonZero {
                params: vec!["dx".to_string(), "dy".to_string()],
                fallback: "dx".to_string(),
            });

        let (params, report) = validate_with_report(&schema, &raw(json!({ "dx": 0, "dy": 0 })));
        assert_eq!(params.int("dx"), Some(1));
        assert!(report.has("dx", CorrectionKind::Rule));

        let params = validate(&schema, &raw(json!({ "dx": 0, "dy": 1 })));
        assert_eq!(params.int("dx"), Some(0));
        assert_eq!(params.int("dy"), Some(1));
    }

    #[test]
    fn test_non_finite_rejected() {
        let schema = FilterSchema::new("f", "").param(ParamSpec::real("r", 0.5, 0.0, 1.0));
        let params = validate(&schema, &raw(json!({ "r": "NaN" })));
        assert_eq!(params.real("r"), Some(0.5));
        let params = validate(&schema, &raw(json!({ "r": "inf" })));
        assert_eq!(params.real("r"), Some(0.5));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<f64>().prop_map(|f| serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null)),
            "[a-z0-9.\\- ]{0,8}".prop_map(Value::String),
        ];
        leaf.prop_recursive(2, 8, 3, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..3)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    fn arb_spec() -> impl Strategy<Value = ParamSpec> {
        (any::<bool>(), -1000i64..1000, 0i64..500, any::<bool>()).prop_map(
            |(integer, min, span, odd)| {
                // keep at least one odd integer inside the range
                let max = min + span + 2;
                let default = min + span / 2;
                let spec = if integer {
                    ParamSpec::integer("p", default, min, max)
                } else {
                    ParamSpec::real("p", default as f64 + 0.25, min as f64, max as f64)
                };
                if odd {
                    spec.odd()
                } else {
                    spec
                }
            },
        )
    }

    proptest! {
        #[test]
        fn validate_is_total_and_conforming(
            spec in arb_spec(),
            value in arb_json(),
            extra in prop::collection::btree_map("[a-z]{1,6}", arb_json(), 0..4),
        ) {
            let schema = FilterSchema::new("prop", "").param(spec.clone());
            let mut input: Map<String, Value> = extra.into_iter().collect();
            input.insert("p".to_string(), value);

            let params = validate(&schema, &input);
            prop_assert_eq!(params.len(), 1);

            let v = params.get("p").unwrap();
            let f = v.as_f64();
            prop_assert!(f.is_finite());
            prop_assert!(f >= spec.min && f <= spec.max, "{} not in [{}, {}]", f, spec.min, spec.max);
            match spec.kind {
                ParamKind::Integer => prop_assert!(matches!(v, ParamValue::Integer(_))),
                ParamKind::Real => prop_assert!(matches!(v, ParamValue::Real(_))),
            }
            if spec.must_be_odd {
                prop_assert_eq!(f.fract(), 0.0);
                prop_assert_eq!((f as i64).rem_euclid(2), 1);
            }
        }
    }
}
