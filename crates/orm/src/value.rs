use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use sea_query::Value;
use serde_json::Value as Json;

use crate::DataType;
use crate::condition::Operand;

// Outbound conversion (internal use only)
pub fn values_to_datatypes(values: impl IntoIterator<Item = Value>) -> Result<Vec<DataType>> {
    values.into_iter().map(value_to_datatype).collect()
}

pub fn value_to_datatype(value: Value) -> Result<DataType> {
    let data_type = match value {
        Value::Bool(v) => DataType::Boolean(v),
        Value::TinyInt(v) => DataType::Int32(v.map(i32::from)),
        Value::SmallInt(v) => DataType::Int32(v.map(i32::from)),
        Value::Int(v) => DataType::Int32(v),
        Value::BigInt(v) => DataType::Int64(v),
        Value::TinyUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::SmallUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::Unsigned(v) => DataType::Uint32(v),
        Value::BigUnsigned(v) => DataType::Uint64(v),
        Value::Float(v) => DataType::Float(v),
        Value::Double(v) => DataType::Double(v),
        Value::String(v) => DataType::Str(v.map(|value| *value)),
        Value::Char(v) => DataType::Str(v.map(|ch| ch.to_string())),
        Value::Bytes(v) => DataType::Binary(v.map(|bytes| *bytes)),
        Value::ChronoDate(v) => DataType::Date(v.map(|value| value.to_string())),
        Value::ChronoTime(v) => DataType::Time(v.map(|value| value.to_string())),
        Value::ChronoDateTime(v) => DataType::Timestamp(v.map(|value| value.to_string())),
        Value::ChronoDateTimeUtc(v) => DataType::Timestamp(v.map(|value| {
            let dt: DateTime<Utc> = *value;
            dt.to_rfc3339()
        })),
        _ => {
            bail!("unsupported values require explicit conversion before building the query")
        }
    };
    Ok(data_type)
}

// Inbound conversion. Cells missing from a row, or holding an unexpected
// type, read as the type's default.

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
pub fn cell_i64(cell: Option<&DataType>) -> i64 {
    match cell {
        Some(DataType::Boolean(Some(v))) => i64::from(*v),
        Some(DataType::Int32(Some(v))) => i64::from(*v),
        Some(DataType::Int64(Some(v))) => *v,
        Some(DataType::Uint32(Some(v))) => i64::from(*v),
        Some(DataType::Uint64(Some(v))) => *v as i64,
        Some(DataType::Float(Some(v))) => *v as i64,
        Some(DataType::Double(Some(v))) => *v as i64,
        Some(DataType::Str(Some(raw))) => {
            let raw = raw.trim();
            raw.parse::<i64>().or_else(|_| raw.parse::<f64>().map(|v| v as i64)).unwrap_or(0)
        }
        _ => 0,
    }
}

#[allow(clippy::cast_precision_loss)]
pub fn cell_f64(cell: Option<&DataType>) -> f64 {
    match cell {
        Some(DataType::Float(Some(v))) => f64::from(*v),
        Some(DataType::Double(Some(v))) => *v,
        Some(DataType::Str(Some(raw))) => raw.trim().parse::<f64>().unwrap_or(0.0),
        other => cell_i64(other) as f64,
    }
}

pub fn cell_string(cell: Option<&DataType>) -> String {
    match cell {
        Some(
            DataType::Str(Some(v))
            | DataType::Date(Some(v))
            | DataType::Time(Some(v))
            | DataType::Timestamp(Some(v)),
        ) => v.clone(),
        Some(DataType::Binary(Some(bytes))) => String::from_utf8_lossy(bytes).into_owned(),
        Some(cell) if !cell.is_null() => match cell.to_json() {
            Json::String(text) => text,
            Json::Null => String::new(),
            other => other.to_string(),
        },
        _ => String::new(),
    }
}

pub fn cell_bool(cell: Option<&DataType>) -> bool {
    match cell {
        Some(DataType::Boolean(Some(v))) => *v,
        Some(DataType::Str(Some(raw))) => {
            matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
        }
        other => cell_i64(other) != 0,
    }
}

/// Lenient integer reading of a JSON input or output value.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
pub fn json_i64(value: &Json) -> i64 {
    match value {
        Json::Bool(v) => i64::from(*v),
        Json::Number(n) => {
            n.as_i64().or_else(|| n.as_u64().map(|v| v as i64)).unwrap_or_else(|| {
                n.as_f64().map_or(0, |v| v as i64)
            })
        }
        Json::String(raw) => {
            let raw = raw.trim();
            raw.parse::<i64>().or_else(|_| raw.parse::<f64>().map(|v| v as i64)).unwrap_or(0)
        }
        _ => 0,
    }
}

/// Binds a JSON value as-is: scalars keep their type, structures are
/// serialised to text.
pub fn json_to_value(value: &Json) -> Value {
    match value {
        Json::Null => Value::String(None),
        Json::Bool(v) => Value::Bool(Some(*v)),
        Json::Number(n) => n.as_i64().map_or_else(
            || n.as_u64().map_or_else(|| Value::Double(n.as_f64()), |v| Value::BigUnsigned(Some(v))),
            |v| Value::BigInt(Some(v)),
        ),
        Json::String(text) => text.as_str().into(),
        Json::Array(_) | Json::Object(_) => value.to_string().into(),
    }
}

/// Like [`json_to_value`], but a JSON array becomes a list operand.
pub fn json_to_operand(value: &Json) -> Operand {
    match value {
        Json::Array(items) => Operand::List(items.iter().map(json_to_value).collect()),
        other => Operand::Scalar(json_to_value(other)),
    }
}

/// Text used to group records by a JSON value: strings as-is, everything
/// else in its JSON form.
pub fn json_key(value: &Json) -> String {
    match value {
        Json::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn value_to_numeric_types() {
        let val = value_to_datatype(Value::Bool(Some(true))).unwrap();
        assert!(matches!(val, DataType::Boolean(Some(true))));

        let val = value_to_datatype(Value::Int(Some(42))).unwrap();
        assert!(matches!(val, DataType::Int32(Some(42))));

        let val = value_to_datatype(Value::BigInt(Some(999))).unwrap();
        assert!(matches!(val, DataType::Int64(Some(999))));

        let val = value_to_datatype(Value::TinyUnsigned(Some(10))).unwrap();
        assert!(matches!(val, DataType::Uint32(Some(10))));

        let val = value_to_datatype(Value::BigUnsigned(Some(10_000))).unwrap();
        assert!(matches!(val, DataType::Uint64(Some(10_000))));

        let val = value_to_datatype(Value::Double(Some(std::f64::consts::E))).unwrap();
        assert!(
            matches!(val, DataType::Double(Some(v)) if (v - std::f64::consts::E).abs() < 0.001)
        );
    }

    #[test]
    fn value_to_text_and_null_types() {
        let val = value_to_datatype(Value::from("test")).unwrap();
        assert_eq!(val, DataType::Str(Some("test".to_string())));

        let val = value_to_datatype(Value::Char(Some('A'))).unwrap();
        assert_eq!(val, DataType::Str(Some("A".to_string())));

        let val = value_to_datatype(Value::String(None)).unwrap();
        assert!(val.is_null());

        let val = value_to_datatype(Value::Bytes(Some(Box::new(vec![1, 2, 3])))).unwrap();
        assert_eq!(val, DataType::Binary(Some(vec![1, 2, 3])));
    }

    #[test]
    fn cells_degrade_to_defaults() {
        assert_eq!(cell_i64(None), 0);
        assert_eq!(cell_i64(Some(&DataType::Str(Some(" 12 ".to_string())))), 12);
        assert_eq!(cell_i64(Some(&DataType::Str(Some("abc".to_string())))), 0);
        assert_eq!(cell_i64(Some(&DataType::Double(Some(7.9)))), 7);

        assert!((cell_f64(Some(&DataType::Str(Some("1.5".to_string())))) - 1.5).abs() < f64::EPSILON);
        assert!(cell_f64(Some(&DataType::Str(None))).abs() < f64::EPSILON);

        assert_eq!(cell_string(Some(&DataType::Int64(Some(5)))), "5");
        assert_eq!(cell_string(Some(&DataType::Str(None))), "");
        assert_eq!(cell_string(None), "");

        assert!(cell_bool(Some(&DataType::Int64(Some(1)))));
        assert!(cell_bool(Some(&DataType::Str(Some("true".to_string())))));
        assert!(!cell_bool(Some(&DataType::Str(Some("0".to_string())))));
        assert!(!cell_bool(None));
    }

    #[test]
    fn json_inputs_bind_with_their_type() {
        assert_eq!(json_to_value(&json!(3)), Value::BigInt(Some(3)));
        assert_eq!(json_to_value(&json!("x")), Value::from("x"));
        assert_eq!(json_to_value(&json!(true)), Value::Bool(Some(true)));
        assert_eq!(json_to_value(&json!(null)), Value::String(None));
        assert_eq!(json_to_value(&json!({"a": 1})), Value::from(r#"{"a":1}"#));

        assert_eq!(
            json_to_operand(&json!([1, 2])),
            Operand::List(vec![Value::BigInt(Some(1)), Value::BigInt(Some(2))])
        );
        assert_eq!(json_i64(&json!("42")), 42);
        assert_eq!(json_i64(&json!(2.7)), 2);
        assert_eq!(json_key(&json!("a")), "a");
        assert_eq!(json_key(&json!(1)), "1");
    }
}
