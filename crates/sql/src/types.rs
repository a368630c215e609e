//! Scalar cells and rows exchanged with a [`Connection`](crate::Connection).

use base64ct::{Base64, Encoding};
use serde_json::Value;

/// A single pre-decoded scalar, used both for bound parameters and for
/// values read back from the database.
///
/// Every variant carries an `Option` so that SQL `NULL` keeps its declared
/// type when bound.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// Boolean value.
    Boolean(Option<bool>),
    /// 32-bit signed integer.
    Int32(Option<i32>),
    /// 64-bit signed integer.
    Int64(Option<i64>),
    /// 32-bit unsigned integer.
    Uint32(Option<u32>),
    /// 64-bit unsigned integer.
    Uint64(Option<u64>),
    /// Single precision float.
    Float(Option<f32>),
    /// Double precision float.
    Double(Option<f64>),
    /// UTF-8 text.
    Str(Option<String>),
    /// Raw bytes.
    Binary(Option<Vec<u8>>),
    /// Date formatted as `%Y-%m-%d`.
    Date(Option<String>),
    /// Time formatted as `%H:%M:%S%.f`.
    Time(Option<String>),
    /// Timestamp, RFC 3339 or `%Y-%m-%d %H:%M:%S%.f`.
    Timestamp(Option<String>),
}

impl DataType {
    /// Whether the cell holds SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Boolean(None)
                | Self::Int32(None)
                | Self::Int64(None)
                | Self::Uint32(None)
                | Self::Uint64(None)
                | Self::Float(None)
                | Self::Double(None)
                | Self::Str(None)
                | Self::Binary(None)
                | Self::Date(None)
                | Self::Time(None)
                | Self::Timestamp(None)
        )
    }

    /// Converts the cell to JSON without any type-directed interpretation.
    ///
    /// Binary values are base64 encoded; non-finite floats become `null`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(Some(v)) => Value::Bool(*v),
            Self::Int32(Some(v)) => Value::Number((*v).into()),
            Self::Int64(Some(v)) => Value::Number((*v).into()),
            Self::Uint32(Some(v)) => Value::Number((*v).into()),
            Self::Uint64(Some(v)) => Value::Number((*v).into()),
            Self::Float(Some(v)) => {
                serde_json::Number::from_f64(f64::from(*v)).map_or(Value::Null, Value::Number)
            }
            Self::Double(Some(v)) => {
                serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number)
            }
            Self::Str(Some(v))
            | Self::Date(Some(v))
            | Self::Time(Some(v))
            | Self::Timestamp(Some(v)) => Value::String(v.clone()),
            Self::Binary(Some(v)) => Value::String(Base64::encode_string(v)),
            _ => Value::Null,
        }
    }
}

/// A named cell within a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column label as reported by the statement.
    pub name: String,
    /// Cell value.
    pub value: DataType,
}

/// A result row: the statement's columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Position of the row within its result set.
    pub index: String,
    /// Cells in select order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Looks up a cell by column label.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.value)
    }

    /// Whether the row has a column with the given label.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|field| field.name == name)
    }
}

/// Converts rows into a JSON array of objects keyed by column label.
#[must_use]
pub fn into_json(rows: Vec<Row>) -> Value {
    let json_rows = rows
        .into_iter()
        .map(|row| {
            let map = row
                .fields
                .into_iter()
                .map(|field| {
                    let value = field.value.to_json();
                    (field.name, value)
                })
                .collect::<serde_json::Map<_, _>>();
            Value::Object(map)
        })
        .collect();

    Value::Array(json_rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_detection() {
        assert!(DataType::Str(None).is_null());
        assert!(DataType::Int64(None).is_null());
        assert!(!DataType::Int64(Some(0)).is_null());
        assert!(!DataType::Str(Some(String::new())).is_null());
    }

    #[test]
    fn row_lookup_by_label() {
        let row = Row {
            index: "0".to_string(),
            fields: vec![
                Field {
                    name: "id".to_string(),
                    value: DataType::Int64(Some(7)),
                },
                Field {
                    name: "name".to_string(),
                    value: DataType::Str(Some("Widget".to_string())),
                },
            ],
        };

        assert_eq!(row.get("id"), Some(&DataType::Int64(Some(7))));
        assert!(row.contains("name"));
        assert!(row.get("missing").is_none());
    }

    #[test]
    fn json_conversion() {
        let rows = vec![Row {
            index: "0".to_string(),
            fields: vec![
                Field {
                    name: "blob".to_string(),
                    value: DataType::Binary(Some(vec![1, 2, 3])),
                },
                Field {
                    name: "ratio".to_string(),
                    value: DataType::Double(Some(f64::NAN)),
                },
                Field {
                    name: "gone".to_string(),
                    value: DataType::Str(None),
                },
            ],
        }];

        let json = into_json(rows);
        assert_eq!(json[0]["blob"], Value::String("AQID".to_string()));
        assert_eq!(json[0]["ratio"], Value::Null);
        assert_eq!(json[0]["gone"], Value::Null);
    }
}
