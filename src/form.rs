//! Request body decoding for the REST endpoint.
//!
//! Mobile clients post either JSON or `application/x-www-form-urlencoded`
//! bodies. Form keys use the LMS bracket notation (`events[eventids][0]=4`,
//! `answers[][id]=7`), which is folded back into nested objects and lists.
//! Form values stay strings; parameter validation coerces them.

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
    Form, Json,
};
use http::header::CONTENT_TYPE;
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Function arguments plus the request keys a form body may carry in place
/// of the query string.
#[derive(Debug, Default)]
pub struct RestArgs {
    pub args: Map<String, Value>,
    pub wsfunction: Option<String>,
    pub wstoken: Option<String>,
}

#[async_trait]
impl<S> FromRequest<S> for RestArgs
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        match content_type.as_str() {
            ct if ct == "application/json" || ct.ends_with("+json") => {
                let Json(body) = Json::<Value>::from_request(req, state)
                    .await
                    .map_err(|e| Error::InvalidParameter(e.body_text()))?;
                match body {
                    Value::Null => Ok(Self::default()),
                    Value::Object(args) => Ok(Self {
                        args,
                        ..Self::default()
                    }),
                    other => Err(Error::InvalidParameter(format!(
                        "request body must be an object, got {other}"
                    ))),
                }
            }
            "application/x-www-form-urlencoded" => {
                let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                    .await
                    .map_err(|e| Error::InvalidParameter(e.body_text()))?;
                let mut args = decode_pairs(pairs)?;
                let mut take = |key: &str| match args.remove(key) {
                    Some(Value::String(s)) => Some(s),
                    _ => None,
                };
                let wsfunction = take("wsfunction");
                let wstoken = take("wstoken");
                take("moodlewsrestformat");
                Ok(Self {
                    args,
                    wsfunction,
                    wstoken,
                })
            }
            _ => {
                let body = Bytes::from_request(req, state)
                    .await
                    .map_err(|e| Error::InvalidParameter(e.body_text()))?;
                if body.iter().all(u8::is_ascii_whitespace) {
                    Ok(Self::default())
                } else {
                    Err(Error::InvalidParameter(format!(
                        "unsupported content type \"{content_type}\""
                    )))
                }
            }
        }
    }
}

/// Folds bracketed form keys into a JSON object. Later duplicates of a
/// scalar key replace earlier ones.
pub fn decode_pairs(pairs: Vec<(String, String)>) -> Result<Map<String, Value>> {
    let mut root = Map::new();
    for (key, value) in pairs {
        let path = parse_key(&key);
        insert(&mut root, &path, value)
            .map_err(|_| Error::InvalidParameter(format!("conflicting form key {key}")))?;
    }
    Ok(root
        .into_iter()
        .map(|(k, v)| (k, into_lists(v)))
        .collect())
}

/// Splits `a[b][]` into `["a", "b", ""]`. Keys with unbalanced brackets are
/// taken literally.
fn parse_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_owned()];
    };
    let mut path = vec![key[..open].to_owned()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            return vec![key.to_owned()];
        };
        path.push(inner[..close].to_owned());
        rest = &inner[close + 1..];
    }
    if !rest.is_empty() {
        return vec![key.to_owned()];
    }
    path
}

fn insert(node: &mut Map<String, Value>, path: &[String], value: String) -> Result<(), ()> {
    let Some((first, rest)) = path.split_first() else {
        return Ok(());
    };
    // empty brackets append
    let key = if first.is_empty() {
        node.len().to_string()
    } else {
        first.clone()
    };
    if rest.is_empty() {
        node.insert(key, Value::String(value));
        return Ok(());
    }
    match node
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()))
    {
        Value::Object(child) => insert(child, rest, value),
        _ => Err(()),
    }
}

/// Objects keyed only by indices become lists ordered by index.
fn into_lists(value: Value) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    if !map.is_empty() && map.keys().all(|k| k.parse::<u64>().is_ok()) {
        let mut items: Vec<(u64, Value)> = map
            .into_iter()
            .filter_map(|(k, v)| k.parse::<u64>().ok().map(|i| (i, into_lists(v))))
            .collect();
        items.sort_by_key(|(i, _)| *i);
        Value::Array(items.into_iter().map(|(_, v)| v).collect())
    } else {
        Value::Object(map.into_iter().map(|(k, v)| (k, into_lists(v))).collect())
    }
}
