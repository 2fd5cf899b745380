//! Tool descriptors and the parameter-schema subset used for validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Supported JSON-Schema primitive types for parameter validation.
///
/// This is deliberately the small subset spec.md §1 calls out ("only the
/// subset needed for tool parameter checks"), not a general validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Integer,
    Null,
}

impl SchemaType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Integer => value.is_i64() || value.is_u64(),
            SchemaType::Null => value.is_null(),
        }
    }
}

/// A named parameter's declared type, as carried by an object schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
}

/// Parameter schema for a tool. Schemas may be absent entirely (no
/// validation happens) or declare `type: object` with named properties and
/// a required list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

/// Immutable description of a registered tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub schema: Option<ParamSchema>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: ParamSchema) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// Parameter map passed to a tool invocation.
pub type Params = HashMap<String, Value>;
