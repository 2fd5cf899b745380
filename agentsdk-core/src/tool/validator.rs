//! Parameter validation against a tool's declared `ParamSchema`.

use super::descriptor::{ParamSchema, Params};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    MissingRequired(String),
    #[error("parameter {name} has wrong type, expected {expected:?}")]
    WrongType {
        name: String,
        expected: super::descriptor::SchemaType,
    },
}

/// Validates a call's parameters against a tool's schema. Unknown keys are
/// tolerated — the schema only constrains declared properties, matching
/// the "tolerate unknown keys" note in spec.md §6 for settings parsing,
/// applied the same way here for forward-compatible tool params.
pub trait Validator: Send + Sync {
    fn validate(&self, schema: &ParamSchema, params: &Params) -> Result<(), ValidationError>;
}

#[derive(Default)]
pub struct SchemaValidator;

impl Validator for SchemaValidator {
    fn validate(&self, schema: &ParamSchema, params: &Params) -> Result<(), ValidationError> {
        for key in &schema.required {
            if !params.contains_key(key) {
                return Err(ValidationError::MissingRequired(key.clone()));
            }
        }
        for (name, prop) in &schema.properties {
            if let Some(value) = params.get(name) {
                if !prop.schema_type.matches(value) {
                    return Err(ValidationError::WrongType {
                        name: name.clone(),
                        expected: prop.schema_type,
                    });
                }
            }
        }
        Ok(())
    }
}
