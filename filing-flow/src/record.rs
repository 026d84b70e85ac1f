//! Schema-flexible record of regulatory fields extracted from a filing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FlowError, Result};

pub const UNTITLED_LABEL: &str = "Untitled 510(k)";

pub mod fields {
    pub const DEVICE_NAME: &str = "device_name";
    pub const SUBMITTER_INFORMATION: &str = "submitter_information";
    pub const CLASSIFICATION: &str = "classification";
    pub const REGULATION_NUMBER: &str = "regulation_number";
    pub const PRODUCT_CODE: &str = "product_code";
    pub const PANEL: &str = "panel";
    pub const PREDICATES: &str = "predicates";
    pub const INDICATIONS_FOR_USE: &str = "indications_for_use";
    pub const TECHNOLOGICAL_CHARACTERISTICS: &str = "technological_characteristics";
    pub const PERFORMANCE_DATA: &str = "performance_data";
    pub const CLINICAL_PERFORMANCE: &str = "clinical_performance";
    pub const SUBSTANTIAL_EQUIVALENCE_DISCUSSION: &str = "substantial_equivalence_discussion";
}

/// Fields the completeness checklist reports on, with their display labels.
pub const CHECKLIST: [(&str, &str); 6] = [
    (fields::DEVICE_NAME, "Device Name"),
    (fields::PRODUCT_CODE, "Product Code"),
    (fields::INDICATIONS_FOR_USE, "Indications for Use"),
    (fields::PERFORMANCE_DATA, "Performance Data"),
    (fields::PREDICATES, "Predicates"),
    (fields::SUBSTANTIAL_EQUIVALENCE_DISCUSSION, "SE Discussion"),
];

/// Open mapping of field name to value. No key is guaranteed to be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredRecord(Map<String, Value>);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChecklistItem {
    pub key: &'static str,
    pub label: &'static str,
    pub present: bool,
}

impl StructuredRecord {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parses model output into a record.
    ///
    /// Surrounding whitespace and a Markdown code fence are tolerated. Anything
    /// that is not a JSON object is rejected with `MalformedOutput`.
    pub fn parse(text: &str) -> Result<Self> {
        let body = strip_code_fence(text.trim());
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Ok(Self(map)),
            Ok(other) => Err(FlowError::MalformedOutput(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
            Err(e) => Err(FlowError::MalformedOutput(e.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// String field, if present and non-empty after trimming.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn device_name(&self) -> Option<&str> {
        self.text(fields::DEVICE_NAME)
    }

    /// Label for a snapshot built from this record.
    pub fn label(&self) -> String {
        self.device_name().unwrap_or(UNTITLED_LABEL).to_string()
    }

    /// A field counts as present when it holds a non-empty value.
    pub fn has(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Object(m)) => !m.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(_)) => true,
        }
    }

    pub fn checklist(&self) -> Vec<ChecklistItem> {
        CHECKLIST
            .iter()
            .map(|&(key, label)| ChecklistItem {
                key,
                label,
                present: self.has(key),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
