// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service / agent registration and schema validation.

use crate::error::CoreError;
use crate::project::ProjectId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

crate::define_id! {
    /// Unique identifier for a registered service or agent.
    pub struct ServiceId("svc-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Service,
    Agent,
}

crate::simple_display! {
    ServiceType {
        Service => "service",
        Agent => "agent",
    }
}

/// `{input, output}` JSON-schema-shaped description of what a service accepts
/// and returns. Only the subset of JSON Schema the planner needs is enforced:
/// top level must be an object schema with at least one property, and any
/// `array` typed property must carry `items`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSchema {
    pub input: Value,
    pub output: Value,
}

fn name_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z0-9][a-z0-9.-]*[a-z0-9]$").expect("static regex is valid")
    })
}

/// Validate a single JSON-schema-shaped object: must be an object with a
/// non-empty `properties` map, and every `array`-typed property must declare
/// `items`.
fn validate_object_schema(which: &'static str, schema: &Value) -> Result<(), CoreError> {
    let obj = schema.as_object().ok_or_else(|| CoreError::Validation {
        field: which.to_string(),
        message: "schema must be a JSON object".to_string(),
    })?;

    let schema_type = obj.get("type").and_then(Value::as_str).unwrap_or("object");
    if schema_type != "object" {
        return Err(CoreError::Validation {
            field: which.to_string(),
            message: format!("top-level schema type must be \"object\", got {schema_type:?}"),
        });
    }

    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| CoreError::Validation {
            field: which.to_string(),
            message: "schema must declare at least one property".to_string(),
        })?;

    if properties.is_empty() {
        return Err(CoreError::Validation {
            field: which.to_string(),
            message: "schema must declare at least one property".to_string(),
        });
    }

    for (prop_name, prop_schema) in properties {
        let prop_type = prop_schema.get("type").and_then(Value::as_str);
        if prop_type == Some("array") && prop_schema.get("items").is_none() {
            return Err(CoreError::Validation {
                field: which.to_string(),
                message: format!("array property {prop_name:?} must declare items"),
            });
        }
    }

    Ok(())
}

impl ServiceSchema {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_object_schema("input", &self.input)?;
        validate_object_schema("output", &self.output)?;
        Ok(())
    }

    /// Keys declared in the input schema's `properties` map, used by the
    /// planner to validate a cache-miss plan's exact input key set.
    pub fn input_keys(&self) -> Vec<String> {
        self.input
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub schema: ServiceSchema,
    pub revertible: bool,
    pub version: u32,
}

impl Service {
    /// Validate the naming rule and schema shape. Does not touch versioning —
    /// that is the registry's job, since it depends on whether this is a
    /// fresh id or a re-registration.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !name_regex().is_match(&self.name) {
            return Err(CoreError::Validation {
                field: "name".to_string(),
                message: format!(
                    "service name {:?} must match ^[a-z0-9][a-z0-9.-]*[a-z0-9]$",
                    self.name
                ),
            });
        }
        self.schema.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_schema() -> ServiceSchema {
        ServiceSchema {
            input: json!({"type": "object", "properties": {"order": {"type": "string"}}}),
            output: json!({"type": "object", "properties": {"status": {"type": "string"}}}),
        }
    }

    fn service(name: &str, schema: ServiceSchema) -> Service {
        Service {
            id: ServiceId::new(),
            project_id: ProjectId::new(),
            name: name.to_string(),
            description: "test service".to_string(),
            service_type: ServiceType::Service,
            schema,
            revertible: false,
            version: 1,
        }
    }

    #[test]
    fn valid_service_passes() {
        assert!(service("refund-service", valid_schema()).validate().is_ok());
    }

    #[test]
    fn rejects_bad_name() {
        let err = service("Refund_Service!", valid_schema()).validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn rejects_empty_properties() {
        let schema = ServiceSchema {
            input: json!({"type": "object", "properties": {}}),
            output: json!({"type": "object", "properties": {"x": {"type": "string"}}}),
        };
        assert!(service("svc", schema).validate().is_err());
    }

    #[test]
    fn rejects_array_without_items() {
        let schema = ServiceSchema {
            input: json!({"type": "object", "properties": {"tags": {"type": "array"}}}),
            output: json!({"type": "object", "properties": {"x": {"type": "string"}}}),
        };
        assert!(service("svc", schema).validate().is_err());
    }

    #[test]
    fn input_keys_reads_properties() {
        let schema = valid_schema();
        assert_eq!(schema.input_keys(), vec!["order".to_string()]);
    }
}
