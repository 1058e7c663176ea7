//! Parameter schemas for callable tools.
//!
//! Remote tool servers describe their arguments with JSON Schema. Locally every
//! tool carries a [`Schema`], which is what argument validation runs against.
//! Local tools also render it back to JSON Schema for the model; remote tools
//! show the server's original schema instead.
//!
//! Translation rules ([`Schema::from_json_schema`]):
//!
//! - `string` / `number` / `integer` / `boolean` map to the matching primitive
//! - `array` recurses into `items` (string elements when `items` is absent)
//! - `object` recurses property by property; a property is optional unless it
//!   appears in `required`
//! - anything else becomes [`Schema::Unconstrained`]

use serde_json::{json, Map, Value};

/// Local representation of a tool parameter schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    String,
    Number,
    Boolean,
    Array(Box<Schema>),
    Object(ObjectSchema),
    /// No constraints are known. Accepts every value.
    Unconstrained,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectSchema {
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("{path}: expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{path}: missing required field '{field}'")]
    MissingField { path: String, field: String },
}

impl Schema {
    /// An empty object schema, extended with [`Schema::required`] / [`Schema::optional`].
    pub fn object() -> Self {
        Schema::Object(ObjectSchema::default())
    }

    pub fn array_of(item: Schema) -> Self {
        Schema::Array(Box::new(item))
    }

    /// Add a required field. No-op on non-object schemas.
    pub fn required(self, name: &str, schema: Schema, description: &str) -> Self {
        self.with_field(name, schema, true, description)
    }

    /// Add an optional field. No-op on non-object schemas.
    pub fn optional(self, name: &str, schema: Schema, description: &str) -> Self {
        self.with_field(name, schema, false, description)
    }

    fn with_field(mut self, name: &str, schema: Schema, required: bool, description: &str) -> Self {
        if let Schema::Object(ref mut obj) = self {
            obj.fields.retain(|f| f.name != name);
            obj.fields.push(Field {
                name: name.to_string(),
                schema,
                required,
                description: (!description.is_empty()).then(|| description.to_string()),
            });
        }
        self
    }

    /// Translate an external JSON Schema into the local representation.
    pub fn from_json_schema(value: &Value) -> Schema {
        let kind = value.get("type").and_then(Value::as_str);
        match kind {
            Some("string") => Schema::String,
            Some("number") | Some("integer") => Schema::Number,
            Some("boolean") => Schema::Boolean,
            Some("array") => {
                let item = value
                    .get("items")
                    .map(Schema::from_json_schema)
                    .unwrap_or(Schema::String);
                Schema::Array(Box::new(item))
            }
            Some("object") => {
                let required: Vec<&str> = value
                    .get("required")
                    .and_then(Value::as_array)
                    .map(|r| r.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let fields = value
                    .get("properties")
                    .and_then(Value::as_object)
                    .map(|props| {
                        props
                            .iter()
                            .map(|(name, prop)| Field {
                                name: name.clone(),
                                schema: Schema::from_json_schema(prop),
                                required: required.contains(&name.as_str()),
                                description: prop
                                    .get("description")
                                    .and_then(Value::as_str)
                                    .map(str::to_string),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Schema::Object(ObjectSchema { fields })
            }
            _ => Schema::Unconstrained,
        }
    }

    /// Render as JSON Schema for the model.
    pub fn to_json_schema(&self) -> Value {
        match self {
            Schema::String => json!({"type": "string"}),
            Schema::Number => json!({"type": "number"}),
            Schema::Boolean => json!({"type": "boolean"}),
            Schema::Array(item) => json!({"type": "array", "items": item.to_json_schema()}),
            Schema::Object(obj) => {
                let mut properties = Map::new();
                for field in &obj.fields {
                    let mut prop = field.schema.to_json_schema();
                    if let (Some(desc), Some(map)) = (&field.description, prop.as_object_mut()) {
                        map.insert("description".into(), Value::String(desc.clone()));
                    }
                    properties.insert(field.name.clone(), prop);
                }
                let required: Vec<&str> = obj
                    .fields
                    .iter()
                    .filter(|f| f.required)
                    .map(|f| f.name.as_str())
                    .collect();
                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                })
            }
            Schema::Unconstrained => json!({}),
        }
    }

    /// Validate a value against this schema.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaError> {
        self.validate_at("$", value)
    }

    fn validate_at(&self, path: &str, value: &Value) -> Result<(), SchemaError> {
        let mismatch = |expected| SchemaError::TypeMismatch {
            path: path.to_string(),
            expected,
            actual: kind_of(value),
        };
        match self {
            Schema::Unconstrained => Ok(()),
            Schema::String => value.is_string().then_some(()).ok_or_else(|| mismatch("string")),
            Schema::Number => value.is_number().then_some(()).ok_or_else(|| mismatch("number")),
            Schema::Boolean => value
                .is_boolean()
                .then_some(())
                .ok_or_else(|| mismatch("boolean")),
            Schema::Array(item) => {
                let items = value.as_array().ok_or_else(|| mismatch("array"))?;
                for (i, v) in items.iter().enumerate() {
                    item.validate_at(&format!("{}[{}]", path, i), v)?;
                }
                Ok(())
            }
            Schema::Object(obj) => {
                let map = value.as_object().ok_or_else(|| mismatch("object"))?;
                for field in &obj.fields {
                    match map.get(&field.name) {
                        Some(Value::Null) | None if field.required => {
                            return Err(SchemaError::MissingField {
                                path: path.to_string(),
                                field: field.name.clone(),
                            });
                        }
                        Some(Value::Null) | None => {}
                        Some(v) => field
                            .schema
                            .validate_at(&format!("{}.{}", path, field.name), v)?,
                    }
                }
                Ok(())
            }
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
