//! The `{code, msg, result}` wrapper every response uses

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{codes, EngineError};

/// Message the vendor sends with successful responses
pub const SUCCESS_MSG: &str = "request success";

/// Response envelope; `code == 0` if and only if the request succeeded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub code: i64,
    pub msg: Option<String>,
    pub result: Option<Value>,
}

impl ResponseEnvelope {
    /// Successful envelope carrying a result payload
    pub fn success(result: Value) -> Self {
        Self {
            code: codes::SUCCESS,
            msg: Some(SUCCESS_MSG.to_string()),
            result: Some(result),
        }
    }

    /// Error envelope; `result` is always null
    pub fn from_error(err: &EngineError) -> Self {
        Self {
            code: err.code(),
            msg: Some(err.to_string()),
            result: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == codes::SUCCESS
    }
}

impl From<EngineError> for ResponseEnvelope {
    fn from(err: EngineError) -> Self {
        Self::from_error(&err)
    }
}
