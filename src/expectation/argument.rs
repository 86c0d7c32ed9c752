use crate::error::ConversionError;
use crate::types::Value;
use std::fmt;
use std::sync::Arc;

/// Largest integer magnitude every f64 represents exactly.
const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

/// User-supplied predicate over one call argument.
pub trait ArgumentMatcher: Send + Sync {
    fn matches(&self, actual: &Value) -> Result<bool, ConversionError>;

    fn describe(&self) -> String {
        "<custom matcher>".to_string()
    }
}

/// One expected call argument.
#[derive(Clone)]
pub enum Argument {
    /// Matches any value, including NULL.
    Any,
    Value(Value),
    Custom(Arc<dyn ArgumentMatcher>),
}

impl Argument {
    pub fn any() -> Self {
        Argument::Any
    }

    pub fn value(value: impl Into<Value>) -> Self {
        Argument::Value(value.into())
    }

    pub fn custom(matcher: impl ArgumentMatcher + 'static) -> Self {
        Argument::Custom(Arc::new(matcher))
    }

    pub fn matches(&self, actual: &Value) -> Result<bool, ConversionError> {
        match self {
            Argument::Any => Ok(true),
            Argument::Value(expected) => compare_values(expected, actual),
            Argument::Custom(matcher) => matcher.matches(actual),
        }
    }
}

impl From<Value> for Argument {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Any => write!(f, "<any>"),
            Argument::Value(v) => write!(f, "{v}"),
            Argument::Custom(m) => write!(f, "{}", m.describe()),
        }
    }
}

impl fmt::Debug for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Argument::Any => write!(f, "Any"),
            Argument::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Argument::Custom(m) => f.debug_tuple("Custom").field(&m.describe()).finish(),
        }
    }
}

pub fn format_arguments(args: &[Argument]) -> String {
    let rendered: Vec<String> = args.iter().map(ToString::to_string).collect();
    format!("[{}]", rendered.join(", "))
}

/// Compares a declared value with a call value, coercing between
/// representations that describe the same datum. Returns `Err` when the two
/// representations cannot be compared at all.
pub fn compare_values(expected: &Value, actual: &Value) -> Result<bool, ConversionError> {
    match (expected, actual) {
        (Value::Null, Value::Null) => Ok(true),
        (Value::Null, _) | (_, Value::Null) => Ok(false),
        (Value::Json(a), Value::Json(b))
        | (Value::Json(a), Value::Text(b))
        | (Value::Text(b), Value::Json(a)) => json_eq(a, b, expected, actual),
        (Value::Integer(a), Value::Timestamp(b)) | (Value::Timestamp(a), Value::Integer(b)) => {
            Ok(a == b)
        }
        (Value::Integer(i), Value::Float(v)) | (Value::Float(v), Value::Integer(i)) => {
            if i.unsigned_abs() > MAX_EXACT_FLOAT_INT {
                return Err(mismatch(
                    expected,
                    actual,
                    format!("integer {i} has no exact float representation"),
                ));
            }
            Ok(*i as f64 == *v)
        }
        (Value::Boolean(b), Value::Integer(i)) | (Value::Integer(i), Value::Boolean(b)) => {
            Ok(match i {
                0 => !*b,
                1 => *b,
                _ => false,
            })
        }
        (Value::Text(t), Value::Blob(bytes)) | (Value::Blob(bytes), Value::Text(t)) => {
            match std::str::from_utf8(bytes) {
                Ok(s) => Ok(s == t.as_str()),
                Err(e) => Err(mismatch(expected, actual, format!("blob is not utf-8: {e}"))),
            }
        }
        // IEEE equality: signed zeros are equal and NaN matches nothing.
        (Value::Float(a), Value::Float(b)) => Ok(a == b),
        _ if std::mem::discriminant(expected) == std::mem::discriminant(actual) => {
            Ok(expected == actual)
        }
        _ => Ok(false),
    }
}

fn json_eq(a: &str, b: &str, expected: &Value, actual: &Value) -> Result<bool, ConversionError> {
    let parse = |text: &str| {
        serde_json::from_str::<serde_json::Value>(text)
            .map_err(|e| mismatch(expected, actual, format!("invalid json '{text}': {e}")))
    };
    Ok(parse(a)? == parse(b)?)
}

fn mismatch(expected: &Value, actual: &Value, reason: String) -> ConversionError {
    ConversionError {
        expected: expected.type_name(),
        actual: actual.type_name(),
        reason,
    }
}

/// `None` accepts any argument list. A declared list must have the same
/// length as the call's and match position by position.
pub(crate) fn match_arguments(
    expected: Option<&[Argument]>,
    actual: &[Value],
) -> Result<bool, ConversionError> {
    let Some(expected) = expected else {
        return Ok(true);
    };
    if expected.len() != actual.len() {
        return Ok(false);
    }
    for (matcher, value) in expected.iter().zip(actual) {
        if !matcher.matches(value)? {
            return Ok(false);
        }
    }
    Ok(true)
}
