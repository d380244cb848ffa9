//! Attribute schema declared by each resource type
//!
//! The plan engine reads these declarations to decide between in-place
//! update and replacement, and resources use them to validate and
//! normalize user configuration before talking to the remote API.

use crate::error::{CloudError, Result};
use serde_json::{Map, Value};

/// Value type of an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    StringMap,
}

/// Declaration of a single attribute
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    pub name: String,
    pub value_type: ValueType,
    /// May be omitted by the user
    pub optional: bool,
    /// Assigned by the remote system, never written by the user
    pub computed: bool,
    /// Any change requires destroy and recreate
    pub force_new: bool,
    /// Maximum length for string values
    pub max_length: Option<usize>,
    /// Value used when the user omits the attribute
    pub default: Option<Value>,
}

impl AttributeSchema {
    fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            optional: false,
            computed: false,
            force_new: false,
            max_length: None,
            default: None,
        }
    }

    pub fn required_string(name: impl Into<String>) -> Self {
        Self::new(name, ValueType::String)
    }

    pub fn optional_string(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            ..Self::new(name, ValueType::String)
        }
    }

    pub fn optional_string_map(name: impl Into<String>) -> Self {
        Self {
            optional: true,
            default: Some(Value::Object(Map::new())),
            ..Self::new(name, ValueType::StringMap)
        }
    }

    pub fn computed_string(name: impl Into<String>) -> Self {
        Self {
            computed: true,
            ..Self::new(name, ValueType::String)
        }
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    fn validate_value(&self, value: &Value) -> Result<()> {
        match (self.value_type, value) {
            (ValueType::String, Value::String(s)) => {
                if let Some(max) = self.max_length {
                    let len = s.chars().count();
                    if len > max {
                        return Err(CloudError::Validation(format!(
                            "{} must be at most {} characters, got {}",
                            self.name, max, len
                        )));
                    }
                }
                Ok(())
            }
            (ValueType::StringMap, Value::Object(map)) => {
                match map.iter().find(|(_, v)| !v.is_string()) {
                    Some((k, _)) => Err(CloudError::Validation(format!(
                        "{}.{} must be a string",
                        self.name, k
                    ))),
                    None => Ok(()),
                }
            }
            (ValueType::String, _) => Err(CloudError::Validation(format!(
                "{} must be a string",
                self.name
            ))),
            (ValueType::StringMap, _) => Err(CloudError::Validation(format!(
                "{} must be a map of strings",
                self.name
            ))),
        }
    }
}

/// Schema of one resource type
#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: Vec<AttributeSchema>,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Attributes the user may configure
    pub fn configurable(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.iter().filter(|a| !a.computed)
    }

    pub fn computed_attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.iter().filter(|a| a.computed)
    }

    pub fn force_new_attributes(&self) -> impl Iterator<Item = &AttributeSchema> {
        self.attributes.iter().filter(|a| a.force_new)
    }

    /// Check user configuration against the declarations
    pub fn validate(&self, config: &Value) -> Result<()> {
        let object = match config {
            Value::Object(map) => map,
            Value::Null => return self.check_required(&Map::new()),
            _ => {
                return Err(CloudError::Validation(format!(
                    "{} configuration must be an object",
                    self.resource_type
                )));
            }
        };

        for (key, value) in object {
            let attribute = self.attribute(key).ok_or_else(|| {
                CloudError::Validation(format!(
                    "unsupported attribute {} for {}",
                    key, self.resource_type
                ))
            })?;
            if attribute.computed {
                return Err(CloudError::Validation(format!(
                    "{} is computed and cannot be set",
                    key
                )));
            }
            if !value.is_null() {
                attribute.validate_value(value)?;
            }
        }

        self.check_required(object)
    }

    fn check_required(&self, object: &Map<String, Value>) -> Result<()> {
        for attribute in self.configurable().filter(|a| !a.optional) {
            if object.get(&attribute.name).is_none_or(Value::is_null) {
                return Err(CloudError::Validation(format!(
                    "{} is required",
                    attribute.name
                )));
            }
        }
        Ok(())
    }

    /// Configurable attributes with defaults applied for omitted values
    ///
    /// Omitted attributes without a default are left out of the result.
    pub fn normalize(&self, config: &Value) -> Map<String, Value> {
        let mut normalized = Map::new();
        for attribute in self.configurable() {
            let value = config
                .get(&attribute.name)
                .filter(|v| !v.is_null())
                .cloned()
                .or_else(|| attribute.default.clone());
            if let Some(value) = value {
                normalized.insert(attribute.name.clone(), value);
            }
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("example")
            .with_attribute(
                AttributeSchema::optional_string("alias")
                    .with_max_length(5)
                    .with_default(json!("")),
            )
            .with_attribute(AttributeSchema::optional_string("key").force_new())
            .with_attribute(AttributeSchema::optional_string_map("tags"))
            .with_attribute(AttributeSchema::computed_string("arn"))
    }

    #[test]
    fn test_normalize_applies_defaults() {
        let normalized = schema().normalize(&json!({}));
        assert_eq!(normalized["alias"], json!(""));
        assert_eq!(normalized["tags"], json!({}));
        assert!(!normalized.contains_key("key"));
        assert!(!normalized.contains_key("arn"));
    }

    #[test]
    fn test_normalize_treats_null_as_omitted() {
        let normalized = schema().normalize(&json!({ "alias": null }));
        assert_eq!(normalized["alias"], json!(""));
    }

    #[test]
    fn test_validate_max_length_counts_chars() {
        assert!(schema().validate(&json!({ "alias": "ééééé" })).is_ok());
        let err = schema().validate(&json!({ "alias": "abcdef" })).unwrap_err();
        assert!(matches!(err, CloudError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_computed_and_unknown() {
        assert!(schema().validate(&json!({ "arn": "x" })).is_err());
        assert!(schema().validate(&json!({ "nope": "x" })).is_err());
    }

    #[test]
    fn test_validate_type_mismatch() {
        assert!(schema().validate(&json!({ "alias": 1 })).is_err());
        assert!(schema().validate(&json!({ "tags": { "a": 1 } })).is_err());
        assert!(schema().validate(&json!({ "tags": { "a": "b" } })).is_ok());
    }

    #[test]
    fn test_required_attribute() {
        let schema = ResourceSchema::new("example")
            .with_attribute(AttributeSchema::required_string("name"));
        assert!(schema.validate(&Value::Null).is_err());
        assert!(schema.validate(&json!({ "name": "a" })).is_ok());
    }

    #[test]
    fn test_attribute_classification() {
        let schema = schema();
        let force_new: Vec<_> = schema.force_new_attributes().map(|a| a.name.as_str()).collect();
        let computed: Vec<_> = schema.computed_attributes().map(|a| a.name.as_str()).collect();
        assert_eq!(force_new, vec!["key"]);
        assert_eq!(computed, vec!["arn"]);
    }
}
