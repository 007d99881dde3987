//! Mapping from video attributes to Bitable physical field types.
//!
//! Pure functions only: look up the physical type of a named field, coerce a
//! raw JSON value into the representation Bitable expects for it, check the
//! result, and provide a per-type fallback.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the platform post id. Used for duplicate detection.
pub const NATURAL_KEY_FIELD: &str = "aweme_id";

/// Allowed values for single-select fields.
pub const SELECT_OPTIONS: &[&str] = &["已同步", "待处理", "失败"];

/// Epoch values above this are already in milliseconds.
const MILLIS_THRESHOLD: i64 = 1_000_000_000_000;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Bitable column storage kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Text,
    Number,
    SingleSelect,
    MultiSelect,
    DateTime,
    Checkbox,
    Attachment,
    Phone,
    Email,
    Url,
}

impl FieldType {
    /// Numeric type code used by the Bitable API.
    pub fn code(&self) -> u32 {
        match self {
            FieldType::Text => 1,
            FieldType::Number => 2,
            FieldType::SingleSelect => 3,
            FieldType::MultiSelect => 4,
            FieldType::DateTime => 5,
            FieldType::Checkbox => 7,
            FieldType::Attachment => 11,
            FieldType::Phone => 13,
            FieldType::Email => 14,
            FieldType::Url => 15,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(FieldType::Text),
            2 => Some(FieldType::Number),
            3 => Some(FieldType::SingleSelect),
            4 => Some(FieldType::MultiSelect),
            5 => Some(FieldType::DateTime),
            7 => Some(FieldType::Checkbox),
            11 => Some(FieldType::Attachment),
            13 => Some(FieldType::Phone),
            14 => Some(FieldType::Email),
            15 => Some(FieldType::Url),
            _ => None,
        }
    }
}

/// Columns created when the sync has to bootstrap its own table.
///
/// URL columns are declared as Text: values are written as plain strings and
/// Bitable's Url type only accepts `{link, text}` objects.
pub const TABLE_SCHEMA: &[(&str, FieldType)] = &[
    ("aweme_id", FieldType::Text),
    ("desc", FieldType::Text),
    ("create_time", FieldType::DateTime),
    ("author_nickname", FieldType::Text),
    ("author_uid", FieldType::Text),
    ("digg_count", FieldType::Number),
    ("comment_count", FieldType::Number),
    ("collect_count", FieldType::Number),
    ("share_count", FieldType::Number),
    ("play_count", FieldType::Number),
    ("video_url", FieldType::Text),
    ("cover_url", FieldType::Text),
    ("duration", FieldType::Number),
    ("sync_time", FieldType::DateTime),
];

/// Physical type of a named field. Unknown names are Text.
pub fn field_type(field_name: &str) -> FieldType {
    match field_name {
        "digg_count" | "comment_count" | "share_count" | "play_count" | "collect_count"
        | "duration" => FieldType::Number,
        "create_time" | "sync_time" => FieldType::DateTime,
        "video_url" | "video_play_addr" | "cover_url" => FieldType::Url,
        "sync_status" => FieldType::SingleSelect,
        "is_top" => FieldType::Checkbox,
        _ => FieldType::Text,
    }
}

/// Convert a raw value into the representation expected for `field_name`.
///
/// Values that cannot be coerced are returned unchanged so that
/// [`validate`] rejects them.
pub fn convert_value(field_name: &str, value: &Value) -> Value {
    if value.is_null() {
        return Value::Null;
    }

    match field_type(field_name) {
        FieldType::DateTime => convert_datetime(value),
        FieldType::Number => convert_number(value),
        FieldType::Url => match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        },
        FieldType::Checkbox => Value::Bool(match value {
            Value::Bool(b) => *b,
            Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes" | "on"),
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        }),
        _ => match value {
            Value::String(s) => Value::String(s.clone()),
            other => Value::String(other.to_string()),
        },
    }
}

fn convert_datetime(value: &Value) -> Value {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(ts) => Value::from(epoch_to_millis(ts)),
            None => value.clone(),
        },
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                return s
                    .parse::<i64>()
                    .map(|ts| Value::from(epoch_to_millis(ts)))
                    .unwrap_or_else(|_| value.clone());
            }
            parse_datetime_millis(s)
                .map(Value::from)
                .unwrap_or_else(|| value.clone())
        }
        _ => value.clone(),
    }
}

fn convert_number(value: &Value) -> Value {
    match value {
        Value::Number(_) => value.clone(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<u64>() {
                Value::from(n)
            } else if let Ok(f) = s.parse::<f64>() {
                serde_json::Number::from_f64(f)
                    .map(Value::Number)
                    .unwrap_or_else(|| value.clone())
            } else {
                value.clone()
            }
        }
        _ => value.clone(),
    }
}

fn epoch_to_millis(ts: i64) -> i64 {
    if ts > MILLIS_THRESHOLD {
        ts
    } else {
        ts.saturating_mul(1000)
    }
}

/// Parse `%Y-%m-%d %H:%M:%S` (local time) or RFC 3339 into epoch millis.
fn parse_datetime_millis(s: &str) -> Option<i64> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, DATETIME_FORMAT) {
        return Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.timestamp_millis());
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

/// Check a converted value against the shape its field type requires.
pub fn validate(field_name: &str, value: &Value) -> bool {
    match field_type(field_name) {
        FieldType::Number => value.is_number(),
        FieldType::DateTime => value.as_f64().is_some_and(|v| v > 0.0),
        FieldType::Text | FieldType::Url => value.is_string(),
        FieldType::SingleSelect => value
            .as_str()
            .is_some_and(|s| SELECT_OPTIONS.contains(&s)),
        FieldType::Checkbox => value.is_boolean(),
        _ => true,
    }
}

/// Fallback written when a value fails validation.
pub fn default_value(field_name: &str) -> Value {
    match field_type(field_name) {
        FieldType::Number => Value::from(0),
        FieldType::DateTime => Value::from(Utc::now().timestamp_millis()),
        FieldType::SingleSelect => Value::from(SELECT_OPTIONS[0]),
        FieldType::Checkbox => Value::Bool(false),
        _ => Value::from(""),
    }
}

/// Format epoch seconds as local time, e.g. `2024-01-02 03:04:05`.
pub fn format_local(ts: i64) -> String {
    Local
        .timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format(DATETIME_FORMAT).to_string())
        .unwrap_or_default()
}

/// Current local time in the same format, used for `sync_time`.
pub fn now_local() -> String {
    Local::now().format(DATETIME_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_lookup() {
        assert_eq!(field_type("digg_count"), FieldType::Number);
        assert_eq!(field_type("sync_time"), FieldType::DateTime);
        assert_eq!(field_type("cover_url"), FieldType::Url);
        assert_eq!(field_type("anything_else"), FieldType::Text);
    }

    #[test]
    fn test_type_codes_round_trip() {
        for (_, ty) in TABLE_SCHEMA {
            assert_eq!(FieldType::from_code(ty.code()), Some(*ty));
        }
        assert_eq!(FieldType::from_code(99), None);
    }

    #[test]
    fn test_datetime_seconds_become_millis() {
        assert_eq!(
            convert_value("create_time", &json!(1_700_000_000)),
            json!(1_700_000_000_000i64)
        );
        assert_eq!(
            convert_value("create_time", &json!(1_700_000_000_123i64)),
            json!(1_700_000_000_123i64)
        );
        assert_eq!(
            convert_value("create_time", &json!("1700000000")),
            json!(1_700_000_000_000i64)
        );
    }

    #[test]
    fn test_datetime_string_parses() {
        let converted = convert_value("sync_time", &json!("2024-01-02 03:04:05"));
        assert!(validate("sync_time", &converted));
    }

    #[test]
    fn test_unparseable_datetime_fails_validation() {
        let converted = convert_value("create_time", &json!("yesterday"));
        assert_eq!(converted, json!("yesterday"));
        assert!(!validate("create_time", &converted));
    }

    #[test]
    fn test_zero_timestamp_fails_validation() {
        let converted = convert_value("create_time", &json!(0));
        assert!(!validate("create_time", &converted));
    }

    #[test]
    fn test_number_conversion() {
        assert_eq!(convert_value("play_count", &json!(42)), json!(42));
        assert_eq!(convert_value("play_count", &json!("42")), json!(42));
        let bad = convert_value("play_count", &json!("lots"));
        assert!(!validate("play_count", &bad));
        assert!(!validate("play_count", &json!(true)));
    }

    #[test]
    fn test_checkbox_conversion() {
        assert_eq!(convert_value("is_top", &json!("Yes")), json!(true));
        assert_eq!(convert_value("is_top", &json!("off")), json!(false));
        assert_eq!(convert_value("is_top", &json!(1)), json!(true));
        assert_eq!(convert_value("is_top", &json!(false)), json!(false));
        assert_eq!(default_value("is_top"), json!(false));
    }

    #[test]
    fn test_text_conversion_stringifies() {
        assert_eq!(convert_value("author_uid", &json!(12345)), json!("12345"));
        assert!(validate("author_uid", &json!("12345")));
    }

    #[test]
    fn test_null_fails_validation() {
        let converted = convert_value("desc", &Value::Null);
        assert!(!validate("desc", &converted));
        assert_eq!(default_value("desc"), json!(""));
    }

    #[test]
    fn test_defaults_per_type() {
        assert_eq!(default_value("digg_count"), json!(0));
        assert!(default_value("sync_time").as_i64().unwrap() > 0);
        assert_eq!(default_value("sync_status"), json!("已同步"));
        assert_eq!(default_value("video_url"), json!(""));
    }

    #[test]
    fn test_single_select_validation() {
        assert!(validate("sync_status", &json!("待处理")));
        assert!(!validate("sync_status", &json!("unknown")));
    }

    #[test]
    fn test_format_local_round_trips_through_parser() {
        let formatted = format_local(1_700_000_000);
        assert_eq!(
            convert_value("create_time", &json!(formatted)),
            json!(1_700_000_000_000i64)
        );
    }
}
