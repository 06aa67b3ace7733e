//! # Request and Callback Payloads
//!
//! The request carries four decimal integers and a callback URL. Presence
//! checks follow JSON truthiness: `null`, `false`, `0`, `""`, `[]` and `{}`
//! all count as missing.

use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::RequestError;

/// Raw body of `POST /`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcdRequest {
    #[serde(default)]
    pub s1: Value,
    #[serde(default)]
    pub s2: Value,
    #[serde(default)]
    pub em1: Value,
    #[serde(default)]
    pub em2: Value,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub task_id: Value,
    #[serde(default = "empty_object")]
    pub metadata: Value,
    #[serde(default)]
    pub timestamp: Value,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Signatures and encoded messages of the two inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operands {
    pub s1: BigInt,
    pub s2: BigInt,
    pub em1: BigInt,
    pub em2: BigInt,
}

impl Operands {
    pub fn named(&self) -> [(&'static str, &BigInt); 4] {
        [
            ("s1", &self.s1),
            ("s2", &self.s2),
            ("em1", &self.em1),
            ("em2", &self.em2),
        ]
    }
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct GcdTask {
    pub operands: Operands,
    pub callback_url: String,
    pub task_id: Value,
    pub metadata: Value,
    pub timestamp: Value,
}

impl GcdRequest {
    /// Parse a raw body. Unparseable, `null` and empty-object bodies are all
    /// a missing payload.
    pub fn from_body(body: &[u8]) -> Result<Self, RequestError> {
        let value: Value =
            serde_json::from_slice(body).map_err(|_| RequestError::MissingPayload)?;
        if !is_truthy(&value) {
            return Err(RequestError::MissingPayload);
        }
        serde_json::from_value(value).map_err(|_| RequestError::MissingPayload)
    }

    /// Callback URL, if one was given.
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Checks run in order: operand presence, callback URL, integer syntax.
    pub fn validate(&self) -> Result<GcdTask, RequestError> {
        let raw = [&self.s1, &self.s2, &self.em1, &self.em2];
        if !raw.iter().all(|v| is_truthy(v)) {
            return Err(RequestError::MissingParameters);
        }
        let callback_url = self
            .callback_url()
            .ok_or(RequestError::MissingCallbackUrl)?
            .to_string();

        let operands = Operands {
            s1: parse_integer(&self.s1)?,
            s2: parse_integer(&self.s2)?,
            em1: parse_integer(&self.em1)?,
            em2: parse_integer(&self.em2)?,
        };

        Ok(GcdTask {
            operands,
            callback_url,
            task_id: self.task_id.clone(),
            metadata: self.metadata.clone(),
            timestamp: self.timestamp.clone(),
        })
    }

    /// Error payload for a rejected request.
    pub fn rejection(&self, error: &RequestError) -> CallbackPayload {
        CallbackPayload::failure(self.task_id.clone(), self.metadata.clone(), error.to_string())
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Decimal string (surrounding whitespace allowed) or JSON integer.
fn parse_integer(value: &Value) -> Result<BigInt, RequestError> {
    match value {
        Value::String(s) => s
            .trim()
            .parse::<BigInt>()
            .map_err(|e| RequestError::InvalidInteger(format!("{s:?}: {e}"))),
        Value::Number(n) => n
            .as_i64()
            .map(BigInt::from)
            .or_else(|| n.as_u64().map(BigInt::from))
            .ok_or_else(|| RequestError::InvalidInteger(format!("{n} is not an integer"))),
        other => Err(RequestError::InvalidInteger(format!(
            "unsupported value {other}"
        ))),
    }
}

/// Body posted to the callback URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub task_id: Value,
    pub metadata: Value,
    /// Echoed from the request on success, `null` otherwise.
    pub timestamp: Value,
}

impl CallbackPayload {
    pub fn success(task: &GcdTask, result: String) -> Self {
        let timestamp = if is_truthy(&task.timestamp) {
            task.timestamp.clone()
        } else {
            Value::Null
        };
        Self {
            success: true,
            result: Some(result),
            error: None,
            task_id: task.task_id.clone(),
            metadata: task.metadata.clone(),
            timestamp,
        }
    }

    pub fn failure(task_id: Value, metadata: Value, error: String) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            task_id,
            metadata,
            timestamp: Value::Null,
        }
    }
}
