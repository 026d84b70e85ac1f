use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::error::Result;

/// Well-known context keys written by the pipeline and its stages.
pub mod keys {
    pub const RAW_TEXT: &str = "raw_text";
    pub const STRUCTURED_RECORD: &str = "structured_record";
    pub const RECORD_DEGRADED: &str = "record_degraded";
    pub const SUMMARY: &str = "summary";
}

/// Scratch space shared by the stages of a single pipeline run.
///
/// A fresh context is created for every run, so nothing leaks from one
/// document into the next.
#[derive(Clone, Debug)]
pub struct Context {
    data: Arc<DashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: Arc::new(DashMap::new()),
        }
    }

    /// Context seeded with the document text every stage reads.
    pub fn for_document(raw_text: &str) -> Self {
        let context = Self::new();
        context
            .data
            .insert(keys::RAW_TEXT.to_string(), Value::String(raw_text.to_string()));
        context
    }

    pub fn set(&self, key: impl Into<String>, value: impl serde::Serialize) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
