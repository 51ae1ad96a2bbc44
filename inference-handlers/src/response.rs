//! Response Formatter
//!
//! The transport envelope every handler returns: a status code, a JSON
//! content-type header and the payload encoded as a string.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LambdaResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded payload, never a raw object.
    pub body: String,
}

impl LambdaResponse {
    /// Serialize `payload` into an envelope with `status_code`.
    pub fn json<T: Serialize>(status_code: u16, payload: &T) -> Self {
        let body = serde_json::to_string(payload).unwrap_or_else(|e| {
            json!({"ok": false, "error": format!("response serialization failed: {e}")}).to_string()
        });
        let headers = BTreeMap::from([("Content-Type".to_string(), CONTENT_TYPE.to_string())]);
        Self {
            status_code,
            headers,
            body,
        }
    }

    pub fn ok<T: Serialize>(payload: &T) -> Self {
        Self::json(200, payload)
    }

    /// `{"error": message}` with `status_code`.
    pub fn error_message(status_code: u16, message: impl Into<String>) -> Self {
        Self::json(status_code, &json!({"error": message.into()}))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Decode the body back into JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}
