//! Tool parameter declarations and argument validation

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::path_utils::resolve_in_root;
use super::ToolError;

/// Primitive parameter types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer,
    Boolean,
    /// String confined to the session root
    Path,
    /// Whitespace-separated paths, each confined to the session root
    PathList,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::Integer => "integer",
            ParamKind::Boolean => "boolean",
            ParamKind::String | ParamKind::Path | ParamKind::PathList => "string",
        }
    }
}

/// One named parameter
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
    /// Inclusive bounds for integers
    pub range: Option<(i64, i64)>,
}

impl Param {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
            range: None,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
            range: None,
        }
    }

    pub const fn with_range(self, min: i64, max: i64) -> Self {
        Self {
            range: Some((min, max)),
            ..self
        }
    }
}

/// JSON schema object for a parameter list
pub fn to_json_schema(params: &[Param]) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for param in params {
        let mut prop = json!({
            "type": param.kind.json_type(),
            "description": param.description,
        });
        if let Some((min, max)) = param.range {
            prop["minimum"] = json!(min);
            prop["maximum"] = json!(max);
        }
        properties.insert(param.name.to_string(), prop);
        if param.required {
            required.push(param.name);
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

/// Arguments that passed validation; path parameters come pre-resolved
#[derive(Debug, Clone, Default)]
pub struct ToolArgs {
    values: Map<String, Value>,
    paths: HashMap<&'static str, Vec<PathBuf>>,
}

impl ToolArgs {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(Value::as_str)
    }

    /// String the schema marks as required
    pub fn required_str(&self, name: &str) -> Result<&str, ToolError> {
        self.str(name)
            .ok_or_else(|| ToolError::Validation(format!("missing required parameter '{name}'")))
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.values.get(name).and_then(as_integer)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.values.get(name).and_then(Value::as_bool)
    }

    /// Resolved path for a `Path` parameter
    pub fn path(&self, name: &str) -> Option<&Path> {
        self.paths
            .get(name)
            .and_then(|p| p.first())
            .map(PathBuf::as_path)
    }

    /// Resolved paths for a `PathList` parameter; empty when absent
    pub fn paths(&self, name: &str) -> &[PathBuf] {
        self.paths.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn as_integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

/// Check `args` against `params`. Unknown keys are ignored.
pub fn validate(params: &[Param], args: &Value, root: &Path) -> Result<ToolArgs, ToolError> {
    let empty = Map::new();
    let object = match args {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            return Err(ToolError::Validation(
                "arguments must be a JSON object".to_string(),
            ))
        }
    };

    let mut validated = ToolArgs::default();

    for param in params {
        let value = match object.get(param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(ToolError::Validation(format!(
                        "missing required parameter '{}'",
                        param.name
                    )));
                }
                continue;
            }
            Some(value) => value,
        };

        match param.kind {
            ParamKind::String | ParamKind::Path | ParamKind::PathList => {
                let text = value.as_str().ok_or_else(|| type_error(param, value))?;
                if param.kind == ParamKind::Path {
                    validated
                        .paths
                        .insert(param.name, vec![resolve_in_root(text, root)?]);
                } else if param.kind == ParamKind::PathList {
                    let resolved = text
                        .split_whitespace()
                        .map(|p| resolve_in_root(p, root))
                        .collect::<Result<Vec<_>, _>>()?;
                    validated.paths.insert(param.name, resolved);
                }
            }
            ParamKind::Integer => {
                let n = as_integer(value).ok_or_else(|| type_error(param, value))?;
                if let Some((min, max)) = param.range {
                    if n < min || n > max {
                        return Err(ToolError::Validation(format!(
                            "parameter '{}' must be between {} and {}, got {}",
                            param.name, min, max, n
                        )));
                    }
                }
            }
            ParamKind::Boolean => {
                value.as_bool().ok_or_else(|| type_error(param, value))?;
            }
        }

        validated.values.insert(param.name.to_string(), value.clone());
    }

    Ok(validated)
}

fn type_error(param: &Param, value: &Value) -> ToolError {
    let got = match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    };
    ToolError::Validation(format!(
        "parameter '{}' must be {}, got {}",
        param.name,
        param.kind.json_type(),
        got
    ))
}
