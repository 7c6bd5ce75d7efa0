use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    value::Value,
};

/// Column type of a configured field. `Json` and `Serialized` hold structured
///  values that a relational backend can only store as encoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Text,
    Int,
    Float,
    Bool,
    Json,
    Serialized,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConf {
    #[serde(rename = "type")]
    pub data_type: DataType,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

impl FieldConf {
    pub fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            default: None,
            nullable: true,
        }
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// The field configuration of one model, e.g.
///
/// ```json
/// {
///     "title": { "type": "text", "default": "new record title" },
///     "tags":  { "type": "json" }
/// }
/// ```
///
/// Built once by the caller and passed to whatever needs it; nothing here is
///  global.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSchema {
    fields: BTreeMap<String, FieldConf>,
}

impl FieldSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, conf: FieldConf) -> Self {
        self.fields.insert(name.into(), conf);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn get(&self, field: &str) -> Result<&FieldConf> {
        self.fields
            .get(field)
            .ok_or_else(|| Error::MissingFieldConfiguration(field.to_string()))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldConf)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
