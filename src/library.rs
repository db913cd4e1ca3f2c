//! Built-in formula functions.
//!
//! Spreadsheet-style helpers (`SUM`, `IF`, `UPPER`, ...) follow their
//! spreadsheet meaning; collection helpers follow lodash, including its
//! iteratee shorthands.

use std::rc::Rc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;

use crate::document::parse_path;
use crate::error::EvalError;
use crate::eval::{Callable, Interpreter};
use crate::parser::Pattern;
use crate::registry::FunctionRegistry;
use crate::value::{Object, Value};

pub const NEVER: &str = "never";
pub const PENDING: &str = "pending";
pub const MERGEABLE: &str = "mergeable";

type Outcome = Result<Value, EvalError>;

pub(crate) fn install(r: &mut FunctionRegistry) {
    r.register("ABS", abs)
        .register("ADD", add)
        .register("MINUS", minus)
        .register("MULTIPLY", multiply)
        .register("DIVIDE", divide)
        .register("POW", pow)
        .register("POWER", pow)
        .register("SQRT", sqrt)
        .register("ROUND", round)
        .register("FLOOR", floor)
        .register("CEILING", ceiling)
        .register("MOD", modulo)
        .register("SUM", sum)
        .register("PRODUCT", product)
        .register("MAX", max)
        .register("MIN", min)
        .register("AVERAGE", average)
        .register("MEDIAN", median)
        .register("COUNT", count)
        .register("COUNTA", counta);

    r.register("IF", if_)
        .register("AND", and)
        .register("OR", or)
        .register("NOT", not)
        .register("XOR", xor);

    r.register("UPPER", upper)
        .register("LOWER", lower)
        .register("TRIM", trim)
        .register("LEN", len)
        .register("CONCATENATE", concatenate)
        .register("LEFT", left)
        .register("RIGHT", right)
        .register("SPLIT", split)
        .register("JOIN", join)
        .register("REGEX_MATCH", regex_match);

    r.register("PROPERTY", property)
        .register("GET_PROPERTY", property)
        .register("PARTIAL", partial)
        .register("PARTIAL_RIGHT", partial_right)
        .register("FLIP", flip)
        .register("MAP", map)
        .register("FLATMAP", flatmap)
        .register("UNIQUE", unique)
        .register("EVERY", every)
        .register("SOME", some)
        .register("VALUES", values)
        .register("KEYS", keys)
        .register("FILTER", filter)
        .register("REJECT", reject)
        .register("FIND", find)
        .register("ORDER_BY", order_by)
        .register("GROUP_BY", group_by)
        .register("FIRST", first)
        .register("LAST", last)
        .register("SIZE", size);

    r.register("DATE_VALUE", date_value)
        .register("AGGREGATE", aggregate)
        .register("NEEDS", needs)
        .register("NEEDS_ALL", needs_all);
}

fn arg(args: &[Value], n: usize) -> Value {
    args.get(n).cloned().unwrap_or(Value::Undefined)
}

fn number(function: &str, v: &Value) -> Result<f64, EvalError> {
    match v {
        Value::Num(n) => Ok(*n),
        Value::Bool(b) => Ok(f64::from(u8::from(*b))),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| EvalError::invalid(function, format!("'{}' is not a number", s))),
        other => Err(EvalError::invalid(
            function,
            format!("expected a number, got {}", other.kind()),
        )),
    }
}

fn numeric_arg(function: &str, args: &[Value], n: usize) -> Result<f64, EvalError> {
    number(function, &arg(args, n))
}

fn optional_numeric_arg(function: &str, args: &[Value], n: usize, default: f64) -> Result<f64, EvalError> {
    match args.get(n) {
        None | Some(Value::Undefined) => Ok(default),
        Some(v) => number(function, v),
    }
}

fn finite(function: &str, n: f64) -> Outcome {
    if n.is_finite() {
        Ok(Value::Num(n))
    } else {
        Err(EvalError::invalid(function, "result is not a finite number"))
    }
}

fn flatten(args: &[Value]) -> Vec<Value> {
    let mut out = Vec::new();
    for v in args {
        match v {
            Value::Array(items) => out.extend(flatten(items)),
            other => out.push(other.clone()),
        }
    }
    out
}

// Spreadsheet aggregates only look at actual numbers.
fn numbers(args: &[Value]) -> Vec<f64> {
    flatten(args)
        .into_iter()
        .filter_map(|v| match v {
            Value::Num(n) => Some(n),
            _ => None,
        })
        .collect()
}

fn text(function: &str, v: &Value) -> Result<String, EvalError> {
    match v {
        Value::Undefined | Value::Null => Ok(String::new()),
        Value::Str(s) => Ok(s.to_string()),
        Value::Num(_) | Value::Bool(_) => Ok(v.to_string()),
        other => Err(EvalError::invalid(
            function,
            format!("expected text, got {}", other.kind()),
        )),
    }
}

fn text_arg(function: &str, args: &[Value], n: usize) -> Result<String, EvalError> {
    text(function, &arg(args, n))
}

fn abs(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Num(numeric_arg("ABS", args, 0)?.abs()))
}

fn add(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    finite("ADD", numeric_arg("ADD", args, 0)? + numeric_arg("ADD", args, 1)?)
}

fn minus(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    finite("MINUS", numeric_arg("MINUS", args, 0)? - numeric_arg("MINUS", args, 1)?)
}

fn multiply(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    finite(
        "MULTIPLY",
        numeric_arg("MULTIPLY", args, 0)? * numeric_arg("MULTIPLY", args, 1)?,
    )
}

fn divide(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let divisor = numeric_arg("DIVIDE", args, 1)?;
    if divisor == 0.0 {
        return Err(EvalError::invalid("DIVIDE", "division by zero"));
    }
    finite("DIVIDE", numeric_arg("DIVIDE", args, 0)? / divisor)
}

fn pow(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let base = numeric_arg("POW", args, 0)?;
    let exponent = numeric_arg("POW", args, 1)?;
    finite("POW", base.powf(exponent))
}

fn sqrt(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = numeric_arg("SQRT", args, 0)?;
    if n < 0.0 {
        return Err(EvalError::invalid("SQRT", "negative argument"));
    }
    Ok(Value::Num(n.sqrt()))
}

fn round(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = numeric_arg("ROUND", args, 0)?;
    let digits = optional_numeric_arg("ROUND", args, 1, 0.0)?;
    let factor = 10f64.powi(digits.trunc() as i32);
    finite("ROUND", (n * factor).round() / factor)
}

fn floor(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = numeric_arg("FLOOR", args, 0)?;
    let significance = optional_numeric_arg("FLOOR", args, 1, 1.0)?;
    if significance == 0.0 {
        return Ok(Value::Num(0.0));
    }
    finite("FLOOR", (n / significance).floor() * significance)
}

fn ceiling(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = numeric_arg("CEILING", args, 0)?;
    let significance = optional_numeric_arg("CEILING", args, 1, 1.0)?;
    if significance == 0.0 {
        return Ok(Value::Num(0.0));
    }
    finite("CEILING", (n / significance).ceil() * significance)
}

// Result takes the sign of the divisor.
fn modulo(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = numeric_arg("MOD", args, 0)?;
    let d = numeric_arg("MOD", args, 1)?;
    if d == 0.0 {
        return Err(EvalError::invalid("MOD", "division by zero"));
    }
    finite("MOD", n - d * (n / d).floor())
}

fn sum(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Num(numbers(args).iter().sum()))
}

fn product(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let ns = numbers(args);
    if ns.is_empty() {
        return Ok(Value::Num(0.0));
    }
    finite("PRODUCT", ns.iter().product())
}

fn max(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let ns = numbers(args);
    Ok(Value::Num(ns.iter().copied().reduce(f64::max).unwrap_or(0.0)))
}

fn min(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let ns = numbers(args);
    Ok(Value::Num(ns.iter().copied().reduce(f64::min).unwrap_or(0.0)))
}

fn average(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let ns = numbers(args);
    if ns.is_empty() {
        return Err(EvalError::invalid("AVERAGE", "no numbers to average"));
    }
    Ok(Value::Num(ns.iter().sum::<f64>() / ns.len() as f64))
}

fn median(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let mut ns = numbers(args);
    if ns.is_empty() {
        return Err(EvalError::invalid("MEDIAN", "no numbers"));
    }
    ns.sort_by(|a, b| a.total_cmp(b));
    let mid = ns.len() / 2;
    Ok(Value::Num(if ns.len() % 2 == 0 {
        (ns[mid - 1] + ns[mid]) / 2.0
    } else {
        ns[mid]
    }))
}

fn count(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Num(numbers(args).len() as f64))
}

fn counta(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = flatten(args).iter().filter(|v| !v.is_nullish()).count();
    Ok(Value::Num(n as f64))
}

fn if_(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(if arg(args, 0).truthy() {
        arg(args, 1)
    } else {
        arg(args, 2)
    })
}

fn and(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Bool(flatten(args).iter().all(Value::truthy)))
}

fn or(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Bool(flatten(args).iter().any(Value::truthy)))
}

fn not(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Bool(!arg(args, 0).truthy()))
}

fn xor(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = flatten(args).iter().filter(|v| v.truthy()).count();
    Ok(Value::Bool(n % 2 == 1))
}

fn upper(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::from(text_arg("UPPER", args, 0)?.to_uppercase()))
}

fn lower(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::from(text_arg("LOWER", args, 0)?.to_lowercase()))
}

// Spreadsheet TRIM also collapses inner runs of spaces.
fn trim(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let s = text_arg("TRIM", args, 0)?;
    let words: Vec<&str> = s.split(' ').filter(|w| !w.is_empty()).collect();
    Ok(Value::from(words.join(" ")))
}

fn len(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(Value::Num(text_arg("LEN", args, 0)?.chars().count() as f64))
}

fn concatenate(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let parts = flatten(args)
        .iter()
        .map(|v| text("CONCATENATE", v))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::from(parts.concat()))
}

fn left(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let s = text_arg("LEFT", args, 0)?;
    let n = optional_numeric_arg("LEFT", args, 1, 1.0)?.max(0.0) as usize;
    Ok(Value::from(s.chars().take(n).collect::<String>()))
}

fn right(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let s = text_arg("RIGHT", args, 0)?;
    let n = optional_numeric_arg("RIGHT", args, 1, 1.0)?.max(0.0) as usize;
    let skip = s.chars().count().saturating_sub(n);
    Ok(Value::from(s.chars().skip(skip).collect::<String>()))
}

fn split(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let s = text_arg("SPLIT", args, 0)?;
    let sep = text_arg("SPLIT", args, 1)?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::from(c.to_string())).collect()
    } else {
        s.split(sep.as_str()).map(Value::from).collect()
    };
    Ok(parts.into())
}

fn join(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let sep = match args.get(1) {
        None | Some(Value::Undefined) => ",".to_string(),
        Some(v) => text("JOIN", v)?,
    };
    let parts: Vec<String> = arg(args, 0)
        .elements()
        .iter()
        .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
        .collect();
    Ok(Value::from(parts.join(&sep)))
}

/// `REGEX_MATCH(regex, text)`: with the `g` flag, every full match (or
/// `null`); otherwise the first match followed by its capture groups.
fn regex_match(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let pattern = match arg(args, 0) {
        Value::Re(p) => p,
        Value::Str(s) => Pattern::new(&s, "")
            .map(std::sync::Arc::new)
            .map_err(|e| EvalError::invalid("REGEX_MATCH", e))?,
        other => {
            return Err(EvalError::invalid(
                "REGEX_MATCH",
                format!("expected a regular expression, got {}", other.kind()),
            ))
        }
    };
    let subject = match arg(args, 1) {
        v if v.is_nullish() => {
            return Err(EvalError::invalid("REGEX_MATCH", "cannot match against null"))
        }
        v => v.to_string(),
    };

    let re = pattern.regex();
    if pattern.is_global() {
        let found: Vec<Value> = re.find_iter(&subject).map(|m| Value::from(m.as_str())).collect();
        return Ok(if found.is_empty() { Value::Null } else { found.into() });
    }
    Ok(match re.captures(&subject) {
        Some(caps) => caps
            .iter()
            .map(|m| m.map_or(Value::Undefined, |m| Value::from(m.as_str())))
            .collect::<Vec<_>>()
            .into(),
        None => Value::Null,
    })
}

fn to_path(v: &Value) -> Vec<String> {
    match v {
        Value::Str(s) => parse_path(s),
        Value::Array(items) => items.iter().map(Value::to_property_key).collect(),
        other => vec![other.to_property_key()],
    }
}

/// The lodash iteratee shorthands.
enum Iteratee {
    Identity,
    Call(Value),
    Path(Vec<String>),
    Matches(Value),
    MatchesProperty(Vec<String>, Value),
}

impl Iteratee {
    fn new(v: &Value) -> Self {
        match v {
            Value::Undefined | Value::Null => Iteratee::Identity,
            Value::Func(_) => Iteratee::Call(v.clone()),
            Value::Object(_) => Iteratee::Matches(v.clone()),
            Value::Array(items) => Iteratee::MatchesProperty(
                items.first().map(to_path).unwrap_or_default(),
                items.get(1).cloned().unwrap_or(Value::Undefined),
            ),
            other => Iteratee::Path(to_path(other)),
        }
    }

    fn from_arg(args: &[Value], n: usize) -> Self {
        Self::new(&arg(args, n))
    }

    fn apply(&self, interp: &Interpreter<'_>, item: &Value) -> Outcome {
        match self {
            Iteratee::Identity => Ok(item.clone()),
            Iteratee::Call(f) => interp.invoke(f, std::slice::from_ref(item)),
            Iteratee::Path(path) => Ok(item.get_path(path)),
            Iteratee::Matches(source) => Ok(Value::Bool(item.is_match(source))),
            Iteratee::MatchesProperty(path, expected) => {
                Ok(Value::Bool(item.get_path(path).is_match(expected)))
            }
        }
    }

    fn holds(&self, interp: &Interpreter<'_>, item: &Value) -> Result<bool, EvalError> {
        Ok(self.apply(interp, item)?.truthy())
    }
}

fn property(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let found = arg(args, 0).get_path(&to_path(&arg(args, 1)));
    Ok(match found {
        Value::Undefined => arg(args, 2),
        found => found,
    })
}

fn callable(function: &str, v: &Value) -> Result<Callable, EvalError> {
    match v {
        Value::Func(c) => Ok(c.clone()),
        other => Err(EvalError::invalid(
            function,
            format!("expected a function, got {}", other.kind()),
        )),
    }
}

fn bind(function: &str, args: &[Value], from_right: bool) -> Outcome {
    let target = callable(function, &arg(args, 0))?;
    Ok(Value::Func(Callable::Partial {
        target: Rc::new(target),
        bound: Rc::new(args.iter().skip(1).cloned().collect()),
        from_right,
    }))
}

fn partial(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    bind("PARTIAL", args, false)
}

fn partial_right(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    bind("PARTIAL_RIGHT", args, true)
}

fn flip(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let target = callable("FLIP", &arg(args, 0))?;
    Ok(Value::Func(Callable::Flip(Rc::new(target))))
}

fn map(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    let mapped = arg(args, 0)
        .elements()
        .iter()
        .map(|item| it.apply(interp, item))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(mapped.into())
}

fn flatmap(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    let mut out = Vec::new();
    for item in arg(args, 0).elements() {
        match it.apply(interp, &item)? {
            Value::Array(items) => out.extend(items.iter().cloned()),
            other => out.push(other),
        }
    }
    Ok(out.into())
}

fn dedup(items: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for item in items {
        if !out.iter().any(|seen| seen.same_value(&item)) {
            out.push(item);
        }
    }
    out
}

fn unique(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(dedup(arg(args, 0).elements()).into())
}

fn every(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    for item in arg(args, 0).elements() {
        if !it.holds(interp, &item)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn some(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    for item in arg(args, 0).elements() {
        if it.holds(interp, &item)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn values(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(arg(args, 0).elements().into())
}

fn keys(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let keys: Vec<Value> = match arg(args, 0) {
        Value::Object(map) => map.keys().map(|k| Value::from(k.as_str())).collect(),
        Value::Array(items) => (0..items.len()).map(|n| Value::from(n.to_string())).collect(),
        _ => Vec::new(),
    };
    Ok(keys.into())
}

fn select(interp: &Interpreter<'_>, args: &[Value], keep: bool) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    let mut out = Vec::new();
    for item in arg(args, 0).elements() {
        if it.holds(interp, &item)? == keep {
            out.push(item);
        }
    }
    Ok(out.into())
}

fn filter(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    select(interp, args, true)
}

fn reject(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    select(interp, args, false)
}

fn find(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    for item in arg(args, 0).elements() {
        if it.holds(interp, &item)? {
            return Ok(item);
        }
    }
    Ok(Value::Undefined)
}

/// `ORDER_BY(collection, iteratees?, orders?)`, a stable multi-key sort.
fn order_by(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let iteratees: Vec<Iteratee> = match arg(args, 1) {
        Value::Array(items) => items.iter().map(Iteratee::new).collect(),
        other => vec![Iteratee::new(&other)],
    };
    let descending: Vec<bool> = match arg(args, 2) {
        Value::Array(items) => items
            .iter()
            .map(|o| o.as_str().map_or(false, |o| o.eq_ignore_ascii_case("desc")))
            .collect(),
        Value::Str(o) => vec![o.eq_ignore_ascii_case("desc")],
        _ => Vec::new(),
    };

    let mut keyed = Vec::new();
    for item in arg(args, 0).elements() {
        let keys = iteratees
            .iter()
            .map(|it| it.apply(interp, &item))
            .collect::<Result<Vec<_>, _>>()?;
        keyed.push((keys, item));
    }

    keyed.sort_by(|(a, _), (b, _)| {
        for (n, (x, y)) in a.iter().zip(b.iter()).enumerate() {
            let mut ord = x.sort_cmp(y);
            if descending.get(n).copied().unwrap_or(false) {
                ord = ord.reverse();
            }
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });

    Ok(keyed.into_iter().map(|(_, item)| item).collect::<Vec<_>>().into())
}

fn group_by(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let it = Iteratee::from_arg(args, 1);
    let mut groups: IndexMap<String, Vec<Value>> = IndexMap::new();
    for item in arg(args, 0).elements() {
        let key = it.apply(interp, &item)?.to_property_key();
        groups.entry(key).or_default().push(item);
    }
    Ok(groups
        .into_iter()
        .map(|(k, v)| (k, Value::from(v)))
        .collect::<Object>()
        .into())
}

fn first(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(match arg(args, 0) {
        Value::Array(items) => items.first().cloned().unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    })
}

fn last(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    Ok(match arg(args, 0) {
        Value::Array(items) => items.last().cloned().unwrap_or(Value::Undefined),
        _ => Value::Undefined,
    })
}

fn size(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let n = match arg(args, 0) {
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Str(s) => s.chars().count(),
        _ => 0,
    };
    Ok(Value::Num(n as f64))
}

fn epoch_millis(v: &Value) -> f64 {
    let Some(s) = v.as_str() else {
        return f64::NAN;
    };
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return date.timestamp_millis() as f64;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map_or(f64::NAN, |d| Utc.from_utc_datetime(&d).timestamp_millis() as f64)
}

/// `DATE_VALUE(list, iteratee)`: epoch milliseconds of each element's date.
/// A single date string yields a single number.
fn date_value(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let list = arg(args, 0);
    if let Value::Str(_) = list {
        return Ok(Value::Num(epoch_millis(&list)));
    }
    let it = Iteratee::from_arg(args, 1);
    let dates = list
        .elements()
        .iter()
        .map(|item| -> Outcome { Ok(Value::Num(epoch_millis(&it.apply(interp, item)?))) })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(dates.into())
}

/// `AGGREGATE(list, path, initial?)`: the de-duplicated union of whatever
/// `path` selects on every element, appended to `initial`.
fn aggregate(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let selector = match args.get(1) {
        Some(v) if !v.is_nullish() => Iteratee::new(v),
        _ => return Err(EvalError::missing("AGGREGATE", "path")),
    };
    let initial = arg(args, 2);

    let mut collected = match &initial {
        v if v.is_nullish() => Vec::new(),
        Value::Array(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    for element in arg(args, 0).elements() {
        match selector.apply(interp, &element)? {
            Value::Array(items) => collected.extend(items.iter().cloned()),
            other => collected.push(other),
        }
    }

    let aggregated = dedup(collected.into_iter().filter(|v| !matches!(v, Value::Undefined)));
    if aggregated.is_empty() {
        return Ok(initial);
    }
    Ok(aggregated.into())
}

fn base_type(v: &Value) -> &str {
    let t = v.as_str().unwrap_or_default();
    t.split_once('@').map_or(t, |(base, _)| base)
}

/// `NEEDS(contract, type, predicate?)`: whether the transformer backflow of
/// `contract` can still produce an output of `type`.
fn needs(interp: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let document = arg(args, 0);
    let expected_type = arg(args, 1);
    if expected_type.as_str().is_none() {
        return Err(EvalError::invalid("NEEDS", "expected a type name"));
    }
    let expected = base_type(&expected_type);
    let predicate = args.get(2).filter(|v| !v.is_nullish()).map(Iteratee::new);
    let holds = |entry: &Value| match &predicate {
        Some(p) => p.holds(interp, entry),
        None => Ok(true),
    };

    let backflow = document.get_path(&["data", "$transformer", "backflow"]).elements();

    for entry in &backflow {
        if base_type(&entry.property("type")) != "error" {
            continue;
        }
        let expects = entry
            .get_path(&["data", "expectedOutputTypes"])
            .elements()
            .iter()
            .any(|t| base_type(t) == expected);
        if expects && holds(entry)? {
            return Ok(Value::from(NEVER));
        }
    }

    for entry in &backflow {
        if base_type(&entry.property("type")) != expected || !holds(entry)? {
            continue;
        }
        let mergeable = entry.get_path(&["data", "$transformer", "mergeable"]);
        if mergeable.truthy() || mergeable.as_str() == Some(MERGEABLE) {
            return Ok(Value::from(MERGEABLE));
        }
    }

    Ok(Value::from(PENDING))
}

fn needs_all(_: &Interpreter<'_>, args: &[Value]) -> Outcome {
    let statuses = flatten(args);
    let any = |status: &str| statuses.iter().any(|s| s.as_str() == Some(status));
    Ok(Value::from(if any(NEVER) {
        NEVER
    } else if any(PENDING) {
        PENDING
    } else {
        MERGEABLE
    }))
}
