//! Typed extraction of fetch arguments.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::command::{Arguments, CommandError, CommandResult};

/// Validated parameters of one `fetch` call.
#[derive(Debug, Clone)]
pub struct FetchParams {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Serialized request body; present whenever the `body` key was given.
    pub body: Option<Vec<u8>>,
    /// Stream the response as events instead of one envelope.
    pub stream: bool,
}

impl FetchParams {
    pub fn from_args(args: &Arguments) -> CommandResult<Self> {
        let method = required_str(args, "method")?;
        let method = Method::from_bytes(method.as_bytes()).map_err(|_| {
            CommandError::InvalidArgument(format!("method '{method}' is not a valid HTTP method"))
        })?;

        let url = required_str(args, "url")?;
        let url = Url::parse(url)
            .map_err(|e| CommandError::InvalidArgument(format!("url '{url}' is invalid: {e}")))?;

        let body = match args.get("body") {
            Some(value) => Some(serde_json::to_vec(value).map_err(|e| {
                CommandError::InvalidArgument(format!("failed to marshal body: {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            method,
            url,
            headers: headers(args)?,
            body,
            stream: args.get("stream").and_then(Value::as_bool).unwrap_or(false),
        })
    }
}

fn required_str<'a>(args: &'a Arguments, key: &str) -> CommandResult<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CommandError::InvalidArgument(format!("{key} must be a string")))
}

/// String-valued entries of `headers`; everything else is skipped.
fn headers(args: &Arguments) -> CommandResult<HeaderMap> {
    let mut map = HeaderMap::new();
    let Some(Value::Object(entries)) = args.get("headers") else {
        return Ok(map);
    };

    for (key, value) in entries {
        let Some(value) = value.as_str() else {
            continue;
        };
        let name = HeaderName::from_bytes(key.as_bytes()).map_err(|_| {
            CommandError::InvalidArgument(format!("header name '{key}' is invalid"))
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            CommandError::InvalidArgument(format!("header '{key}' has an invalid value"))
        })?;
        map.insert(name, value);
    }
    Ok(map)
}
