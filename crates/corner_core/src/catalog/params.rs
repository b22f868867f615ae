//! Parameter schemas
//!
//! 정의마다 이름/타입/범위를 가진 파라미터 스키마를 갖고,
//! 실행 계획의 바인딩은 시작 시점에 이 스키마로 검증된다.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Value bound to a parameter in a run plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Text(_) => "text",
        }
    }

    /// Numeric view (ints widen to floats)
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "\"{}\"", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Caller-supplied bindings, keyed by parameter name
pub type ParamBindings = BTreeMap<String, ParamValue>;

/// Type and valid range of one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamKind {
    Float { min: f64, max: f64 },
    Int { min: i64, max: i64 },
    Bool,
    Choice(Vec<String>),
}

impl ParamKind {
    fn type_name(&self) -> &'static str {
        match self {
            ParamKind::Float { .. } => "float",
            ParamKind::Int { .. } => "int",
            ParamKind::Bool => "bool",
            ParamKind::Choice(_) => "choice",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ParamKind::Float { .. } | ParamKind::Int { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    /// `None` makes the parameter required
    pub default: Option<ParamValue>,
}

impl ParamSpec {
    pub fn float(name: &str, min: f64, max: f64, default: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Float { min, max },
            default: Some(ParamValue::Float(default)),
        }
    }

    pub fn int(name: &str, min: i64, max: i64, default: i64) -> Self {
        Self { name: name.to_string(), kind: ParamKind::Int { min, max }, default: Some(ParamValue::Int(default)) }
    }

    pub fn flag(name: &str, default: bool) -> Self {
        Self { name: name.to_string(), kind: ParamKind::Bool, default: Some(ParamValue::Bool(default)) }
    }

    /// Choice parameter; the first option is the default
    pub fn choice(name: &str, options: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind: ParamKind::Choice(options.iter().map(|o| o.to_string()).collect()),
            default: options.first().map(|o| ParamValue::Text(o.to_string())),
        }
    }

    pub fn required(mut self) -> Self {
        self.default = None;
        self
    }

    /// Check a single value against this spec, normalising ints bound to float fields
    pub fn check(&self, value: &ParamValue) -> Result<ParamValue, SchemaViolation> {
        let mismatch = || SchemaViolation::TypeMismatch {
            field: self.name.clone(),
            expected: self.kind.type_name(),
            found: value.type_name(),
        };

        match (&self.kind, value) {
            (ParamKind::Float { min, max }, v) => {
                let x = v.as_f64().ok_or_else(mismatch)?;
                if !x.is_finite() || x < *min || x > *max {
                    return Err(SchemaViolation::OutOfRange {
                        field: self.name.clone(),
                        value: x,
                        min: *min,
                        max: *max,
                    });
                }
                Ok(ParamValue::Float(x))
            }
            (ParamKind::Int { min, max }, ParamValue::Int(x)) => {
                if x < min || x > max {
                    return Err(SchemaViolation::OutOfRange {
                        field: self.name.clone(),
                        value: *x as f64,
                        min: *min as f64,
                        max: *max as f64,
                    });
                }
                Ok(ParamValue::Int(*x))
            }
            (ParamKind::Bool, ParamValue::Bool(b)) => Ok(ParamValue::Bool(*b)),
            (ParamKind::Choice(options), ParamValue::Text(s)) => {
                if options.iter().any(|o| o == s) {
                    Ok(ParamValue::Text(s.clone()))
                } else {
                    Err(SchemaViolation::InvalidChoice {
                        field: self.name.clone(),
                        value: s.clone(),
                        options: options.clone(),
                    })
                }
            }
            _ => Err(mismatch()),
        }
    }
}

/// Why a set of bindings does not fit a schema
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaViolation {
    #[error("unknown parameter '{0}'")]
    UnknownField(String),

    #[error("missing required parameter '{0}'")]
    Missing(String),

    #[error("parameter '{field}' expects {expected}, got {found}")]
    TypeMismatch { field: String, expected: &'static str, found: &'static str },

    #[error("parameter '{field}' = {value} outside [{min}, {max}]")]
    OutOfRange { field: String, value: f64, min: f64, max: f64 },

    #[error("parameter '{field}' = \"{value}\" not one of {options:?}")]
    InvalidChoice { field: String, value: String, options: Vec<String> },
}

/// Ordered list of parameter specs for one definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamSchema {
    pub fields: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, name: &str) -> Option<&ParamSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validate bindings and fill in defaults.
    ///
    /// Unknown names are rejected rather than ignored, so a typo in a run
    /// plan never silently falls back to the default.
    pub fn resolve(&self, bindings: &ParamBindings) -> Result<ResolvedParams, SchemaViolation> {
        if let Some(unknown) = bindings.keys().find(|k| self.field(k).is_none()) {
            return Err(SchemaViolation::UnknownField(unknown.clone()));
        }

        let mut values = BTreeMap::new();
        for spec in &self.fields {
            let value = match (bindings.get(&spec.name), &spec.default) {
                (Some(bound), _) => spec.check(bound)?,
                (None, Some(default)) => spec.check(default)?,
                (None, None) => return Err(SchemaViolation::Missing(spec.name.clone())),
            };
            values.insert(spec.name.clone(), value);
        }
        Ok(ResolvedParams { values })
    }
}

/// Bindings after validation, every schema field present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedParams {
    values: BTreeMap<String, ParamValue>,
}

impl ResolvedParams {
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.values.get(name).and_then(ParamValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ParamSchema {
        ParamSchema {
            fields: vec![
                ParamSpec::float("walk_speed_mps", 0.5, 6.0, 3.5),
                ParamSpec::int("count", 1, 4, 2),
                ParamSpec::choice("variant", &["walker.pedestrian.0010", "walker.pedestrian.0011"]),
                ParamSpec::flag("return_to_curb", true).required(),
            ],
        }
    }

    fn bind(pairs: &[(&str, ParamValue)]) -> ParamBindings {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_defaults_fill_missing_optional_fields() {
        let resolved = schema().resolve(&bind(&[("return_to_curb", false.into())])).unwrap();
        assert_eq!(resolved.number("walk_speed_mps"), Some(3.5));
        assert_eq!(resolved.number("count"), Some(2.0));
        assert_eq!(resolved.text("variant"), Some("walker.pedestrian.0010"));
        assert_eq!(resolved.flag("return_to_curb"), Some(false));
    }

    #[test]
    fn test_int_binding_widens_for_float_field() {
        let resolved = schema()
            .resolve(&bind(&[("walk_speed_mps", ParamValue::Int(2)), ("return_to_curb", true.into())]))
            .unwrap();
        assert_eq!(resolved.get("walk_speed_mps"), Some(&ParamValue::Float(2.0)));
    }

    #[test]
    fn test_violations() {
        let s = schema();
        assert_eq!(s.resolve(&ParamBindings::new()), Err(SchemaViolation::Missing("return_to_curb".into())));

        let err = s
            .resolve(&bind(&[("walk_speed_mps", 9.0.into()), ("return_to_curb", true.into())]))
            .unwrap_err();
        assert!(matches!(err, SchemaViolation::OutOfRange { ref field, .. } if field == "walk_speed_mps"));

        let err = s.resolve(&bind(&[("count", 1.5.into()), ("return_to_curb", true.into())])).unwrap_err();
        assert!(matches!(err, SchemaViolation::TypeMismatch { expected: "int", found: "float", .. }));

        let err = s.resolve(&bind(&[("variant", "walker.pedestrian.0099".into()), ("return_to_curb", true.into())]));
        assert!(matches!(err, Err(SchemaViolation::InvalidChoice { .. })));

        let err = s.resolve(&bind(&[("walk_sped", 1.0.into()), ("return_to_curb", true.into())]));
        assert_eq!(err, Err(SchemaViolation::UnknownField("walk_sped".into())));
    }

    #[test]
    fn test_untagged_values_from_json() {
        let bindings: ParamBindings =
            serde_json::from_str(r#"{"count": 3, "walk_speed_mps": 1.25, "variant": "walker.pedestrian.0011", "return_to_curb": true}"#)
                .unwrap();
        assert_eq!(bindings["count"], ParamValue::Int(3));
        assert_eq!(bindings["walk_speed_mps"], ParamValue::Float(1.25));
        assert!(schema().resolve(&bindings).is_ok());
    }
}
