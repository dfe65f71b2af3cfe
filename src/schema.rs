//! Declarative description of web service parameters and return values.
//!
//! Every exposed function declares its parameters and its result as a
//! [`Schema`]. Incoming parameters are validated against it before the
//! function runs, and outgoing results are cleaned against it before they are
//! serialized, so the wire format never depends on how a Rust type happens to
//! serialize.

use serde_json::{Map, Value};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Int,
    Bool,
    /// Plain text; markup is not allowed.
    Text,
    /// Any string, passed through untouched.
    Raw,
    Alphanum,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Presence {
    Required,
    Optional,
    Default(Value),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub desc: &'static str,
    pub schema: Schema,
    pub presence: Presence,
    pub nullable: bool,
}

impl Field {
    pub fn required(name: &'static str, desc: &'static str, schema: Schema) -> Self {
        Self {
            name,
            desc,
            schema,
            presence: Presence::Required,
            nullable: false,
        }
    }

    pub fn optional(name: &'static str, desc: &'static str, schema: Schema) -> Self {
        Self {
            presence: Presence::Optional,
            ..Self::required(name, desc, schema)
        }
    }

    pub fn default(name: &'static str, desc: &'static str, schema: Schema, value: Value) -> Self {
        Self {
            presence: Presence::Default(value),
            ..Self::required(name, desc, schema)
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

#[derive(Debug, Clone)]
pub enum Schema {
    Value(ParamType),
    Object(Vec<Field>),
    List(Box<Schema>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Parameters,
    Returns,
}

impl Mode {
    fn fail(self, path: &str, msg: impl std::fmt::Display) -> Error {
        let msg = if path.is_empty() {
            msg.to_string()
        } else {
            format!("{path}: {msg}")
        };
        match self {
            Mode::Parameters => Error::InvalidParameter(msg),
            Mode::Returns => Error::InvalidResponse(msg),
        }
    }
}

impl Schema {
    pub fn int() -> Self {
        Schema::Value(ParamType::Int)
    }

    pub fn bool() -> Self {
        Schema::Value(ParamType::Bool)
    }

    pub fn text() -> Self {
        Schema::Value(ParamType::Text)
    }

    pub fn raw() -> Self {
        Schema::Value(ParamType::Raw)
    }

    pub fn alphanum() -> Self {
        Schema::Value(ParamType::Alphanum)
    }

    pub fn object(fields: Vec<Field>) -> Self {
        Schema::Object(fields)
    }

    pub fn list(item: Schema) -> Self {
        Schema::List(Box::new(item))
    }

    /// Checks caller supplied parameters, filling in defaults.
    ///
    /// Unknown keys, missing required keys and type mismatches are rejected.
    pub fn validate_parameters(&self, value: Value) -> Result<Value> {
        self.clean(value, Mode::Parameters, "")
    }

    /// Shapes a function result for the wire. Unknown keys are dropped and
    /// absent optional fields are omitted.
    pub fn clean_returnvalue(&self, value: Value) -> Result<Value> {
        self.clean(value, Mode::Returns, "")
    }

    fn clean(&self, value: Value, mode: Mode, path: &str) -> Result<Value> {
        match self {
            Schema::Value(ty) => clean_value(*ty, value, mode, path),
            Schema::List(item) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, v)| item.clean(v, mode, &format!("{path}[{i}]")))
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Err(mode.fail(
                    path,
                    format!("only arrays accepted, got {}", kind(&other)),
                )),
            },
            Schema::Object(fields) => match value {
                Value::Object(map) => clean_object(fields, map, mode, path),
                other => Err(mode.fail(
                    path,
                    format!("only objects accepted, got {}", kind(&other)),
                )),
            },
        }
    }
}

fn clean_object(
    fields: &[Field],
    mut map: Map<String, Value>,
    mode: Mode,
    path: &str,
) -> Result<Value> {
    let mut out = Map::new();
    for field in fields {
        let sub = if path.is_empty() {
            field.name.to_string()
        } else {
            format!("{path}.{}", field.name)
        };
        match map.remove(field.name) {
            Some(Value::Null) if field.nullable => {
                out.insert(field.name.into(), Value::Null);
            }
            Some(Value::Null) if mode == Mode::Returns && field.presence == Presence::Optional => {}
            Some(Value::Null) => return Err(mode.fail(&sub, "null is not allowed")),
            Some(v) => {
                out.insert(field.name.into(), field.schema.clean(v, mode, &sub)?);
            }
            None => match &field.presence {
                Presence::Required => {
                    return Err(mode.fail(path, format!("missing required key \"{}\"", field.name)))
                }
                Presence::Optional => {}
                Presence::Default(Value::Null) => {
                    out.insert(field.name.into(), Value::Null);
                }
                Presence::Default(d) => {
                    out.insert(field.name.into(), field.schema.clean(d.clone(), mode, &sub)?);
                }
            },
        }
    }
    if mode == Mode::Parameters && !map.is_empty() {
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        return Err(mode.fail(path, format!("unexpected keys ({}) detected", keys.join(", "))));
    }
    Ok(Value::Object(out))
}

fn clean_value(ty: ParamType, value: Value, mode: Mode, path: &str) -> Result<Value> {
    let expected = |v: &Value| {
        mode.fail(
            path,
            format!("the value is {v}, the server was expecting \"{}\" type", type_name(ty)),
        )
    };
    match ty {
        ParamType::Int => match &value {
            Value::Number(n) if n.is_i64() => Ok(value.clone()),
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| expected(&value)),
            _ => Err(expected(&value)),
        },
        ParamType::Bool => match &value {
            Value::Bool(_) => Ok(value.clone()),
            Value::Number(n) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(expected(&value)),
            },
            Value::String(s) => match s.as_str() {
                "1" | "true" => Ok(Value::Bool(true)),
                "0" | "false" | "" => Ok(Value::Bool(false)),
                _ => Err(expected(&value)),
            },
            _ => Err(expected(&value)),
        },
        ParamType::Raw => scalar_string(&value)
            .map(Value::String)
            .ok_or_else(|| expected(&value)),
        ParamType::Text => {
            let s = scalar_string(&value).ok_or_else(|| expected(&value))?;
            let stripped = strip_tags(&s);
            if mode == Mode::Parameters && stripped != s {
                return Err(mode.fail(path, "markup is not allowed in text parameters"));
            }
            Ok(Value::String(stripped))
        }
        ParamType::Alphanum => {
            let s = scalar_string(&value).ok_or_else(|| expected(&value))?;
            if s.chars().all(|c| c.is_ascii_alphanumeric()) {
                Ok(Value::String(s))
            } else {
                Err(expected(&value))
            }
        }
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("1".into()),
        Value::Bool(false) => Some(String::new()),
        _ => None,
    }
}

/// Removes `<tag ...>` sequences. A `<` that does not open a tag is kept.
pub fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || matches!(c, '/' | '!' | '?'));
        match after.find('>') {
            Some(end) if opens_tag => rest = &after[end + 1..],
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn type_name(ty: ParamType) -> &'static str {
    match ty {
        ParamType::Int => "int",
        ParamType::Bool => "bool",
        ParamType::Text => "text",
        ParamType::Raw => "raw",
        ParamType::Alphanum => "alphanum",
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
