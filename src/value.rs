use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Number, Value as Json};

use crate::eval::Callable;
use crate::parser::Pattern;

pub type Object = IndexMap<String, Value>;

/// Runtime value of a formula, modelled on JavaScript values.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Num(f64),
    Str(Rc<str>),
    Array(Rc<Vec<Value>>),
    Object(Rc<Object>),
    Re(Arc<Pattern>),
    Func(Callable),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Num(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(Rc::new(items))
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Self::Object(Rc::new(map))
    }
}

/// JavaScript number to string conversion, for the finite cases formulas
/// run into.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == n.trunc() && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
    }
    match s {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if s.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => s.parse::<f64>().unwrap_or(f64::NAN),
    }
}

impl Value {
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Num(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(s.as_str().into()),
            Json::Array(items) => items.iter().map(Value::from_json).collect::<Vec<_>>().into(),
            Json::Object(map) => map
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect::<Object>()
                .into(),
        }
    }

    /// JSON form of the value; `None` where JSON has no representation
    /// (undefined and functions).
    pub fn to_json(&self) -> Option<Json> {
        Some(match self {
            Value::Undefined | Value::Func(_) => return None,
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Num(n) => number_to_json(*n),
            Value::Str(s) => Json::String(s.to_string()),
            Value::Array(items) => Json::Array(
                items
                    .iter()
                    .map(|v| v.to_json().unwrap_or(Json::Null))
                    .collect(),
            ),
            Value::Object(map) => Json::Object(
                map.iter()
                    .filter_map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Map<_, _>>(),
            ),
            Value::Re(_) => Json::Object(Map::new()),
        })
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn type_of(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Bool(_) => "boolean",
            Value::Num(_) => "number",
            Value::Str(_) => "string",
            Value::Func(_) => "function",
            _ => "object",
        }
    }

    /// Short description used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Array(_) => "array",
            Value::Re(_) => "regexp",
            other => other.type_of(),
        }
    }

    /// JavaScript `ToNumber`.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Undefined => f64::NAN,
            Value::Null => 0.0,
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Num(n) => *n,
            Value::Str(s) => parse_number(s),
            Value::Array(items) => match items.len() {
                0 => 0.0,
                1 => items[0].to_number(),
                _ => f64::NAN,
            },
            _ => f64::NAN,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Key used when this value indexes into an object or array.
    pub fn to_property_key(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            other => other.to_string(),
        }
    }

    /// Members of a collection: array items, object values, or string
    /// characters. Anything else has no members.
    pub fn elements(&self) -> Vec<Value> {
        match self {
            Value::Array(items) => items.as_ref().clone(),
            Value::Object(map) => map.values().cloned().collect(),
            Value::Str(s) => s.chars().map(|c| Value::from(c.to_string())).collect(),
            _ => Vec::new(),
        }
    }

    /// Property lookup that never fails: missing keys and non-container
    /// targets yield `Undefined`.
    pub fn property(&self, key: &str) -> Value {
        match self {
            Value::Object(map) => map.get(key).cloned().unwrap_or(Value::Undefined),
            Value::Array(items) => match key {
                "length" => Value::Num(items.len() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| items.get(n).cloned())
                    .unwrap_or(Value::Undefined),
            },
            Value::Str(s) => match key {
                "length" => Value::Num(s.encode_utf16().count() as f64),
                _ => key
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| s.chars().nth(n))
                    .map_or(Value::Undefined, |c| Value::from(c.to_string())),
            },
            Value::Re(p) => match key {
                "source" => Value::from(p.source()),
                "flags" => Value::from(p.flags()),
                "global" => Value::Bool(p.is_global()),
                _ => Value::Undefined,
            },
            _ => Value::Undefined,
        }
    }

    pub fn get_path<S: AsRef<str>>(&self, path: &[S]) -> Value {
        let mut current = self.clone();
        for key in path {
            if current.is_nullish() {
                return Value::Undefined;
            }
            current = current.property(key.as_ref());
        }
        current
    }

    /// `===`
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Re(a), Value::Re(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `==`
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Num(a), Value::Str(_)) => *a == other.to_number(),
            (Value::Str(_), Value::Num(b)) => self.to_number() == *b,
            (Value::Bool(_), _) => Value::Num(self.to_number()).loose_eq(other),
            (_, Value::Bool(_)) => self.loose_eq(&Value::Num(other.to_number())),
            (Value::Array(_) | Value::Object(_), Value::Num(_) | Value::Str(_)) => {
                Value::from(self.to_string()).loose_eq(other)
            }
            (Value::Num(_) | Value::Str(_), Value::Array(_) | Value::Object(_)) => {
                self.loose_eq(&Value::from(other.to_string()))
            }
            _ => self.strict_eq(other),
        }
    }

    /// Structural equality with `NaN` equal to itself, as used for
    /// de-duplication and partial matching.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.same_value(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map_or(false, |w| v.same_value(w)))
            }
            (Value::Re(a), Value::Re(b)) => a == b,
            _ => self.strict_eq(other),
        }
    }

    /// Whether every property of `source` is present and matching in `self`.
    pub fn is_match(&self, source: &Value) -> bool {
        match (self, source) {
            (Value::Object(target), Value::Object(source)) => source
                .iter()
                .all(|(k, v)| target.get(k).map_or(false, |t| t.is_match(v))),
            (Value::Array(target), Value::Array(source)) => source
                .iter()
                .all(|v| target.iter().any(|t| t.is_match(v))),
            _ => self.same_value(source),
        }
    }

    /// Relational comparison for `<`, `<=`, `>` and `>=`. `None` when either
    /// side is `NaN` after conversion.
    pub fn js_cmp(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => self.to_number().partial_cmp(&other.to_number()),
        }
    }

    /// Total order used when sorting: numbers numerically, strings
    /// lexically, and missing values last.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        let missing = |v: &Value| v.is_nullish() || matches!(v, Value::Num(n) if n.is_nan());
        match (missing(self), missing(other)) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            _ => self
                .js_cmp(other)
                .unwrap_or_else(|| self.to_string().cmp(&other.to_string())),
        }
    }
}

fn number_to_json(n: f64) -> Json {
    if n.is_finite() && n == n.trunc() && n.abs() < 9_007_199_254_740_992.0 {
        Json::from(n as i64)
    } else {
        Number::from_f64(n).map_or(Json::Null, Json::Number)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Num(n) => write!(f, "{}", format_number(*n)),
            Value::Str(s) => write!(f, "{}", s),
            Value::Array(items) => {
                for (n, item) in items.iter().enumerate() {
                    if n > 0 {
                        write!(f, ",")?;
                    }
                    if !item.is_nullish() {
                        write!(f, "{}", item)?;
                    }
                }
                Ok(())
            }
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Re(p) => write!(f, "{}", p),
            Value::Func(c) => write!(f, "{:?}", c),
        }
    }
}
