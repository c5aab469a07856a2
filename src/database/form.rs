use std::collections::HashMap;

use serde_json::Value;

use super::error::TypeError;

pub type FormData = HashMap<String, Value>;

/// A loosely typed request body. Keys that are present but carry the wrong
/// JSON type are reported, absent keys come back as `None`.
pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn get_str(&self, key: &str) -> Result<Option<String>, TypeError> {
        match self.inner.get(key) {
            Some(Value::Null) | None => Ok(None),
            Some(value) => match value.as_str() {
                Some(v) => Ok(Some(v.to_string())),
                None => Err(TypeError::new("Expected a string")),
            },
        }
    }

    /// `Ok(None)` when the key is absent; a present key must hold an array.
    pub fn get_list(&self, key: &str) -> Result<Option<&Vec<Value>>, TypeError> {
        match self.inner.get(key) {
            None => Ok(None),
            Some(Value::Array(list)) => Ok(Some(list)),
            Some(_) => Err(TypeError::new("Expected a list")),
        }
    }
}
