//! Login session issued by the mock

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The single active login session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub account_id: String,
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Issue a session for an account with a fresh token
    pub fn issue(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            token: generate_token(),
            issued_at: Utc::now(),
        }
    }

    /// Create a session with a known token
    pub fn with_token(account_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            token: token.into(),
            issued_at: Utc::now(),
        }
    }
}

fn generate_token() -> String {
    // The client treats the token as opaque; it only has to differ between logins
    format!("mock_{}", Ulid::new().to_string().to_lowercase())
}
