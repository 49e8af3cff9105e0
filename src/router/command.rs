//! Command and response envelopes.

use std::io::Read;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RouterError;

/// Inbound call: `{"m": "<method>", "p": <params>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "m")]
    pub method: String,
    #[serde(rename = "p", default)]
    pub params: Value,
}

impl Command {
    pub fn parse(payload: &[u8]) -> Result<Self, RouterError> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RouterError> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Deserialize the params into a typed value.
    pub fn params_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, RouterError> {
        Ok(T::deserialize(&self.params)?)
    }
}

/// Outbound reply: `{"e": <error or null>, "p": <params>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "e")]
    pub error: Option<String>,
    #[serde(rename = "p")]
    pub params: Value,
}

impl Response {
    pub fn success(params: Value) -> Self {
        Self {
            error: None,
            params,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            params: Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_command() {
        let cmd = Command::parse(br#"{"m":"echo","p":{"text":"hi"}}"#).unwrap();
        assert_eq!(cmd.method, "echo");
        assert_eq!(cmd.params, json!({"text": "hi"}));
    }

    #[test]
    fn test_params_default_to_null() {
        let cmd = Command::parse(br#"{"m":"ping"}"#).unwrap();
        assert_eq!(cmd.params, Value::Null);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            Command::parse(b"not json"),
            Err(RouterError::InvalidCommand(_))
        ));
        assert!(Command::parse(br#"{"p":{}}"#).is_err());
    }

    #[test]
    fn test_typed_params() {
        #[derive(Deserialize)]
        struct Echo {
            text: String,
        }

        let cmd = Command::from_reader(&br#"{"m":"echo","p":{"text":"hi"}}"#[..]).unwrap();
        let echo: Echo = cmd.params_as().unwrap();
        assert_eq!(echo.text, "hi");
    }

    #[test]
    fn test_response_shape() {
        let ok = serde_json::to_value(Response::success(json!({"n": 1}))).unwrap();
        assert_eq!(ok, json!({"e": null, "p": {"n": 1}}));

        let err = serde_json::to_value(Response::error("method not found")).unwrap();
        assert_eq!(err, json!({"e": "method not found", "p": null}));
    }
}
