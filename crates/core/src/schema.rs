//! Typed tool parameter schemas.
//!
//! A [`ToolSpec`] is the registry's description of a tool: a unique name,
//! a natural-language description, and a set of typed parameters. It
//! renders to the JSON function-calling format the reasoner consumes and
//! validates the arguments the reasoner sends back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON type of a single tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// The JSON Schema type name.
    pub fn json_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether `value` has this type. Integers satisfy `Number`, and
    /// floats with no fractional part satisfy `Integer`.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub ty: ParamType,

    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Enumerated allowed values (empty = unrestricted)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<Value>,

    /// Value applied when the parameter is omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Element type for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<ParamType>,

    /// Inclusive lower bound for numeric parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
}

impl ParamSpec {
    pub fn new(name: impl Into<String>, ty: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty,
            description: description.into(),
            required: false,
            allowed: Vec::new(),
            default: None,
            items: None,
            minimum: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Integer, description)
    }

    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Number, description)
    }

    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Boolean, description)
    }

    pub fn array(name: impl Into<String>, items: ParamType, description: impl Into<String>) -> Self {
        let mut spec = Self::new(name, ParamType::Array, description);
        spec.items = Some(items);
        spec
    }

    pub fn object(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::Object, description)
    }

    /// Mark the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Restrict the parameter to an enumerated set of values.
    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    /// Default applied when the parameter is omitted.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Reject numeric values below `min`.
    pub fn at_least(mut self, min: i64) -> Self {
        self.minimum = Some(min);
        self
    }

    /// Integers given as whole floats (`5.0`) are stored as integers.
    fn normalise(&self, value: &Value) -> Value {
        match value.as_f64() {
            Some(f) if self.ty == ParamType::Integer && !value.is_i64() && !value.is_u64() => {
                Value::from(f as i64)
            }
            _ => value.clone(),
        }
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), Value::from(self.ty.json_name()));
        schema.insert("description".into(), Value::from(self.description.clone()));
        if !self.allowed.is_empty() {
            schema.insert("enum".into(), Value::Array(self.allowed.clone()));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        if let Some(items) = self.items {
            schema.insert("items".into(), serde_json::json!({ "type": items.json_name() }));
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".into(), Value::from(minimum));
        }
        Value::Object(schema)
    }

    fn check(&self, value: &Value, problems: &mut Vec<String>) {
        if !self.ty.matches(value) {
            problems.push(format!(
                "'{}' must be of type {}, got {}",
                self.name,
                self.ty.json_name(),
                json_kind(value)
            ));
            return;
        }
        if let (Some(min), Some(n)) = (self.minimum, value.as_f64()) {
            if n < min as f64 {
                problems.push(format!("'{}' must be at least {min}, got {value}", self.name));
            }
        }
        if !self.allowed.is_empty() && !self.allowed.contains(value) {
            let allowed: Vec<String> = self.allowed.iter().map(Value::to_string).collect();
            problems.push(format!(
                "'{}' must be one of [{}], got {}",
                self.name,
                allowed.join(", "),
                value
            ));
        }
        if let (Some(items), Some(elements)) = (self.items, value.as_array()) {
            if let Some(pos) = elements.iter().position(|e| !items.matches(e)) {
                problems.push(format!(
                    "'{}[{}]' must be of type {}",
                    self.name,
                    pos,
                    items.json_name()
                ));
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Arguments that failed validation against a [`ToolSpec`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid arguments for '{tool}': {}", .problems.join("; "))]
pub struct ValidationFailure {
    pub tool: String,
    pub problems: Vec<String>,
}

/// Static description of a tool: the unique registry key, a description
/// for the reasoner, and its parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Look up a parameter by name.
    pub fn get_param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Render the `parameters` object in function-calling JSON Schema form.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .params
            .iter()
            .map(|p| (p.name.clone(), p.to_json_schema()))
            .collect();
        let required: Vec<Value> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| Value::from(p.name.clone()))
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Validate reasoner-supplied arguments.
    ///
    /// On success returns the normalised argument map: nulls dropped and
    /// defaults filled in. On failure every problem found is reported.
    pub fn validate(&self, arguments: &Value) -> Result<Map<String, Value>, ValidationFailure> {
        let Some(object) = arguments.as_object() else {
            return Err(ValidationFailure {
                tool: self.name.clone(),
                problems: vec![format!("arguments must be a JSON object, got {}", json_kind(arguments))],
            });
        };

        let mut problems = Vec::new();
        let mut normalised = Map::new();

        for (key, value) in object {
            match self.get_param(key) {
                None => problems.push(format!("unknown parameter '{key}'")),
                Some(_) if value.is_null() => {}
                Some(param) => {
                    param.check(value, &mut problems);
                    normalised.insert(key.clone(), param.normalise(value));
                }
            }
        }

        for param in &self.params {
            if normalised.contains_key(&param.name) {
                continue;
            }
            if param.required {
                problems.push(format!("missing required parameter '{}'", param.name));
            } else if let Some(default) = &param.default {
                normalised.insert(param.name.clone(), default.clone());
            }
        }

        if problems.is_empty() {
            Ok(normalised)
        } else {
            Err(ValidationFailure {
                tool: self.name.clone(),
                problems,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_spec() -> ToolSpec {
        ToolSpec::new("query_papers", "Query the curated corpus")
            .param(ParamSpec::string("query", "Question").required())
            .param(
                ParamSpec::string("corpus", "Corpus size")
                    .one_of(["small", "medium", "large"])
                    .default_value("medium"),
            )
            .param(ParamSpec::integer("limit", "Max results"))
    }

    #[test]
    fn json_schema_matches_function_calling_shape() {
        let schema = search_spec().to_json_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["query"]["type"], "string");
        assert_eq!(schema["properties"]["corpus"]["enum"], json!(["small", "medium", "large"]));
        assert_eq!(schema["required"], json!(["query"]));
    }

    #[test]
    fn valid_arguments_get_defaults() {
        let args = search_spec().validate(&json!({"query": "What is APOE4?"})).unwrap();
        assert_eq!(args["query"], "What is APOE4?");
        assert_eq!(args["corpus"], "medium");
        assert!(!args.contains_key("limit"));
    }

    #[test]
    fn null_optional_is_treated_as_absent() {
        let args = search_spec()
            .validate(&json!({"query": "tau", "limit": null}))
            .unwrap();
        assert!(!args.contains_key("limit"));
    }

    #[test]
    fn missing_required_is_reported() {
        let err = search_spec().validate(&json!({})).unwrap_err();
        assert_eq!(err.problems, vec!["missing required parameter 'query'".to_string()]);
    }

    #[test]
    fn every_problem_is_reported() {
        let err = search_spec()
            .validate(&json!({"query": 7, "corpus": "huge", "extra": true}))
            .unwrap_err();
        assert_eq!(err.problems.len(), 3);
        assert!(err.to_string().contains("unknown parameter 'extra'"));
        assert!(err.to_string().contains("must be one of"));
        assert!(err.to_string().contains("must be of type string"));
    }

    #[test]
    fn non_object_arguments_rejected() {
        let err = search_spec().validate(&json!("query=tau")).unwrap_err();
        assert!(err.problems[0].contains("JSON object"));
    }

    #[test]
    fn integer_accepts_whole_floats_only() {
        assert!(ParamType::Integer.matches(&json!(3)));
        assert!(ParamType::Integer.matches(&json!(3.0)));
        assert!(!ParamType::Integer.matches(&json!(3.5)));
        assert!(ParamType::Number.matches(&json!(3)));
    }

    #[test]
    fn array_items_are_checked() {
        let spec = ToolSpec::new("plot", "Plot")
            .param(ParamSpec::array("data", ParamType::Object, "Rows").required());
        assert!(spec.validate(&json!({"data": [{"a": 1}]})).is_ok());
        let err = spec.validate(&json!({"data": [{"a": 1}, 2]})).unwrap_err();
        assert!(err.problems[0].contains("data[1]"));
    }

    #[test]
    fn minimum_rejects_small_values() {
        let spec = ToolSpec::new("search", "Search")
            .param(ParamSpec::integer("limit", "Max results").at_least(1));
        assert_eq!(spec.to_json_schema()["properties"]["limit"]["minimum"], 1);
        assert!(spec.validate(&json!({"limit": 1})).is_ok());
        let err = spec.validate(&json!({"limit": -5})).unwrap_err();
        assert!(err.problems[0].contains("at least 1"));
        assert!(spec.validate(&json!({"limit": 0.0})).is_err());
    }

    #[test]
    fn whole_float_integers_are_normalised() {
        let spec = ToolSpec::new("search", "Search")
            .param(ParamSpec::integer("limit", "Max results").at_least(1));
        let args = spec.validate(&json!({"limit": 5.0})).unwrap();
        assert_eq!(args["limit"].as_u64(), Some(5));
    }
}
