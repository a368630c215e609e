use chrono::DateTime;
use sea_query::Value;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::options::MappingOptions;
use crate::value::{cell_bool, cell_f64, cell_i64, cell_string, json_i64};
use crate::{Record, Row};

/// Storage type of a field, which decides how its stored value is read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Numeric primary identifier.
    Id,
    /// `0` / `1` flag.
    Boolean,
    /// Whole number.
    Integer,
    /// Fixed point number stored as an integer scaled by `10^decimals`.
    Decimal,
    /// Unix epoch seconds.
    Timestamp,
    /// Short text.
    String,
    /// JSON document stored as text.
    Json,
    /// HTML fragment.
    Html,
    /// Plain text.
    Text,
    /// Plain text without length limit.
    LongText,
    /// Text encrypted by the database.
    Encrypted,
    /// Path of a stored file.
    File,
}

/// Extra `{key}...` outputs of a timestamp on top of `Date` and `Full`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateMode {
    /// Adds `{key}Time`, the `%H:%M` time of day.
    Time,
    /// Adds `{key}Iso`, the RFC 3339 form.
    Iso,
}

const fn default_true() -> bool {
    true
}

/// Boolean flags of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct FieldFlags {
    /// The entity's identifier column.
    pub is_identifier: bool,
    /// Part of the primary key.
    pub is_primary: bool,
    /// Backed by an index.
    pub is_indexed: bool,
    /// Used to display the record.
    pub is_display_name: bool,
    /// Flag held by at most one row per scope.
    pub is_unique: bool,
    /// References the parent row; defines the scope of positions and flags.
    pub is_parent: bool,
    /// Produce no output when the row lacks the column.
    pub exclude_if_absent: bool,
    /// Produce no output when the stored value is empty.
    pub exclude_if_empty: bool,
    /// Negative values are kept when storing.
    pub signed: bool,
    /// Keep the bare key when consumed through a join.
    pub no_prefix: bool,
    /// Accepted from input on create and edit.
    #[serde(default = "default_true")]
    pub editable: bool,
}

impl Default for FieldFlags {
    fn default() -> Self {
        Self {
            is_identifier: false,
            is_primary: false,
            is_indexed: false,
            is_display_name: false,
            is_unique: false,
            is_parent: false,
            exclude_if_absent: false,
            exclude_if_empty: false,
            signed: false,
            no_prefix: false,
            editable: true,
        }
    }
}

/// One column of an entity and the rules mapping it to output values.
///
/// Compiled once per entity and shared read-only by every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSpec {
    /// Storage column.
    pub key: String,
    /// Human readable name; an empty name is replaced with the key when the
    /// entity is compiled.
    #[serde(default)]
    pub name: String,
    /// Storage type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Decimal places of a [`FieldType::Decimal`].
    #[serde(default)]
    pub decimals: u32,
    /// Extra timestamp outputs.
    #[serde(default)]
    pub date_mode: Option<DateMode>,
    /// Flags.
    #[serde(flatten)]
    pub flags: FieldFlags,
    /// Output key whose value is used when this field's value is empty.
    #[serde(default)]
    pub merge_to: Option<String>,
    /// Value stored on create when the input omits the field.
    #[serde(default)]
    pub default: Option<Json>,
    /// Sub-directory of file references below the files URL.
    #[serde(default)]
    pub file_path: Option<String>,
    /// Prefix of the output key when consumed through a join.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl FieldSpec {
    /// Creates a field with default flags.
    #[must_use]
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            field_type,
            decimals: 0,
            date_mode: None,
            flags: FieldFlags::default(),
            merge_to: None,
            default: None,
            file_path: None,
            prefix: None,
        }
    }

    /// The entity's identifier field.
    #[must_use]
    pub fn identifier(key: impl Into<String>) -> Self {
        let mut field = Self::new(key, FieldType::Id);
        field.flags.is_identifier = true;
        field.flags.is_primary = true;
        field.flags.editable = false;
        field
    }

    /// Sets the decimal places.
    #[must_use]
    pub const fn decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    /// Marks the field as a parent reference.
    #[must_use]
    pub const fn parent(mut self) -> Self {
        self.flags.is_parent = true;
        self
    }

    /// Marks the field as an exclusivity flag.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.flags.is_unique = true;
        self
    }

    /// Keeps negative values when storing.
    #[must_use]
    pub const fn signed(mut self) -> Self {
        self.flags.signed = true;
        self
    }

    /// Excludes the field from input.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.flags.editable = false;
        self
    }

    /// Sets the extra timestamp outputs.
    #[must_use]
    pub const fn date_mode(mut self, mode: DateMode) -> Self {
        self.date_mode = Some(mode);
        self
    }

    /// Sets the sub-directory of file references.
    #[must_use]
    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the fallback output key.
    #[must_use]
    pub fn merge_to(mut self, key: impl Into<String>) -> Self {
        self.merge_to = Some(key.into());
        self
    }

    /// Sets the value stored when the input omits the field.
    #[must_use]
    pub fn default_value(mut self, value: Json) -> Self {
        self.default = Some(value);
        self
    }

    /// Key of the field in output records and its label in `SELECT` lists.
    ///
    /// The identifier is always `id`; a prefixed field becomes
    /// `prefix + Key` unless flagged `no_prefix`.
    #[must_use]
    pub fn output_key(&self) -> String {
        if self.flags.is_identifier && self.prefix.is_none() {
            return "id".to_string();
        }
        match &self.prefix {
            Some(prefix) if !prefix.is_empty() && !self.flags.no_prefix => {
                format!("{prefix}{}", capitalise(&self.key))
            }
            _ => self.key.clone(),
        }
    }

    /// Whether the field accepts explicit input.
    #[must_use]
    pub const fn is_editable(&self) -> bool {
        self.flags.editable && !self.flags.is_identifier
    }

    /// Converts the field's cell(s) of a result row into output entries.
    ///
    /// Reads the column labelled [`output_key`](Self::output_key), plus
    /// `{label}Decrypt` for encrypted fields. Never fails: missing or
    /// malformed cells produce the type's default.
    #[must_use]
    pub fn to_output_values(&self, row: &Row, options: &MappingOptions) -> Record {
        let key = self.output_key();
        let mut output = Record::new();

        let cell = row.get(&key);
        if self.flags.exclude_if_absent && cell.is_none() {
            return output;
        }
        if self.flags.exclude_if_empty && cell_string(cell).is_empty() {
            return output;
        }

        match self.field_type {
            FieldType::Id | FieldType::Integer => {
                output.insert(key, Json::from(cell_i64(cell)));
            }
            FieldType::Boolean => {
                output.insert(key, Json::Bool(cell_bool(cell)));
            }
            FieldType::Decimal => {
                output.insert(key, scaled(cell_f64(cell), self.decimals));
            }
            FieldType::Timestamp => {
                let epoch = cell_i64(cell);
                let format = |pattern: &str| {
                    DateTime::from_timestamp(epoch, 0)
                        .filter(|_| epoch != 0)
                        .map(|dt| dt.format(pattern).to_string())
                        .unwrap_or_default()
                };
                output.insert(format!("{key}Date"), Json::from(format(&options.date_format)));
                output.insert(format!("{key}Full"), Json::from(format(&options.datetime_format)));
                match self.date_mode {
                    Some(DateMode::Time) => {
                        output.insert(format!("{key}Time"), Json::from(format("%H:%M")));
                    }
                    Some(DateMode::Iso) => {
                        output.insert(format!("{key}Iso"), Json::from(format("%+")));
                    }
                    None => {}
                }
                output.insert(key, Json::from(epoch));
            }
            FieldType::Json => {
                let raw = cell_string(cell);
                let decoded = serde_json::from_str::<Json>(&raw)
                    .ok()
                    .filter(|v| v.is_object() || v.is_array())
                    .unwrap_or_else(|| Json::Object(Record::new()));
                output.insert(key, decoded);
            }
            FieldType::Html => {
                let raw = cell_string(cell);
                output.insert(format!("{key}Html"), Json::from(nl2br(&raw)));
                output.insert(key, Json::from(raw));
            }
            FieldType::Encrypted => {
                let clear = cell_string(row.get(&format!("{key}Decrypt")));
                output.insert(key, Json::from(clear));
            }
            FieldType::File => {
                let path = cell_string(cell);
                let base = options.files_url.trim_end_matches('/');
                let url = match (&self.file_path, path.is_empty()) {
                    (_, true) => String::new(),
                    (Some(dir), false) => format!("{base}/{}/{path}", dir.trim_matches('/')),
                    (None, false) => format!("{base}/{path}"),
                };
                output.insert(format!("{key}Url"), Json::from(url));
                if self.file_path.is_none() {
                    let thumb =
                        if path.is_empty() { String::new() } else { format!("{base}/thumbs/{path}") };
                    output.insert(format!("{key}Thumb"), Json::from(thumb));
                }
                output.insert(key, Json::from(path));
            }
            FieldType::String | FieldType::Text | FieldType::LongText => {
                output.insert(key, Json::from(cell_string(cell)));
            }
        }

        output
    }

    /// Converts an input value into the value bound when writing the column.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_stored_value(&self, input: &Json) -> Value {
        if input.is_null() {
            return Value::String(None);
        }

        match self.field_type {
            FieldType::Boolean => {
                let flag = match input {
                    Json::Bool(v) => *v,
                    Json::String(raw) => {
                        matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
                    }
                    other => json_i64(other) != 0,
                };
                Value::BigInt(Some(i64::from(flag)))
            }
            FieldType::Id | FieldType::Timestamp => Value::BigInt(Some(json_i64(input))),
            FieldType::Integer => Value::BigInt(Some(self.clamp_sign(json_i64(input)))),
            FieldType::Decimal => {
                let number = match input {
                    Json::Number(n) => n.as_f64().unwrap_or_default(),
                    Json::String(raw) => raw.trim().parse::<f64>().unwrap_or_default(),
                    other => json_i64(other) as f64,
                };
                let stored = (number * 10f64.powi(self.decimals.cast_signed())).round() as i64;
                Value::BigInt(Some(self.clamp_sign(stored)))
            }
            FieldType::Json => match input {
                Json::String(raw) => raw.as_str().into(),
                other => other.to_string().into(),
            },
            FieldType::String
            | FieldType::Html
            | FieldType::Text
            | FieldType::LongText
            | FieldType::Encrypted
            | FieldType::File => match input {
                Json::String(raw) => raw.as_str().into(),
                other => other.to_string().into(),
            },
        }
    }

    /// Whether an output value counts as empty for `merge_to` fallbacks.
    pub(crate) fn is_empty_output(value: &Json) -> bool {
        match value {
            Json::Null => true,
            Json::String(text) => text.is_empty(),
            Json::Number(n) => n.as_f64().is_some_and(|v| v.abs() < f64::EPSILON),
            Json::Bool(v) => !v,
            Json::Array(items) => items.is_empty(),
            Json::Object(map) => map.is_empty(),
        }
    }

    const fn clamp_sign(&self, value: i64) -> i64 {
        if self.flags.signed || value >= 0 { value } else { 0 }
    }
}

/// Divides a stored fixed point number by `10^decimals`.
pub(crate) fn scaled(stored: f64, decimals: u32) -> Json {
    let value = stored / 10f64.powi(decimals.cast_signed());
    serde_json::Number::from_f64(value).map_or_else(|| Json::from(0.0), Json::Number)
}

/// Upper-cases the first character.
pub(crate) fn capitalise(key: &str) -> String {
    let mut chars = key.chars();
    chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
}

/// Inserts `<br />` before every line break.
fn nl2br(text: &str) -> String {
    let mut html = String::with_capacity(text.len());
    let mut after_cr = false;
    for ch in text.chars() {
        match ch {
            '\r' => {
                html.push_str("<br />");
                after_cr = true;
            }
            '\n' => {
                if !after_cr {
                    html.push_str("<br />");
                }
                after_cr = false;
            }
            _ => after_cr = false,
        }
        html.push(ch);
    }
    html
}
