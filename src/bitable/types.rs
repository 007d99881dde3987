//! Wire types for the Bitable open API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mapper::FieldType;

/// Common response envelope: `{code, msg, data}`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize)]
pub struct Paged<T> {
    pub items: Option<Vec<T>>,
    #[serde(default)]
    pub has_more: bool,
    pub page_token: Option<String>,
}

impl<T> Paged<T> {
    pub fn into_items(self) -> Vec<T> {
        self.items.unwrap_or_default()
    }

    /// Token for the next page, if there is one.
    pub fn next_token(&self) -> Option<String> {
        if self.has_more {
            self.page_token.clone().filter(|t| !t.is_empty())
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TableInfo {
    pub table_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldInfo {
    pub field_name: String,
    #[serde(rename = "type", default)]
    pub type_code: u32,
}

impl FieldInfo {
    pub fn kind(&self) -> Option<FieldType> {
        FieldType::from_code(self.type_code)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecordInfo {
    #[serde(default)]
    pub record_id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct NewField<'a> {
    pub field_name: &'a str,
    #[serde(rename = "type")]
    pub type_code: u32,
}

impl<'a> NewField<'a> {
    pub fn new(field_name: &'a str, kind: FieldType) -> Self {
        Self {
            field_name,
            type_code: kind.code(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NewTable<'a> {
    pub name: &'a str,
    pub default_view_name: &'a str,
    pub fields: Vec<NewField<'a>>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateTableBody<'a> {
    pub table: NewTable<'a>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedTable {
    pub table_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FieldEnvelope {
    pub field: FieldInfo,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecordEnvelope {
    pub record: RecordInfo,
}

#[derive(Debug, Serialize)]
pub(crate) struct RecordBody<'a> {
    pub fields: &'a Map<String, Value>,
}

/// Plain text of a cell value.
///
/// Text cells come back either as a string or as rich-text segments
/// (`[{"type": "text", "text": "..."}]`).
pub fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(segments) => {
            let text: String = segments
                .iter()
                .filter_map(|seg| match seg {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect();
            Some(text)
        }
        Value::Object(obj) => obj.get("text").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}
