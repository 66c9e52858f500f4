//! Cross-checking auth fields against the active session

use http::HeaderMap;
use serde_json::Value;
use tracing::debug;
use vs_core::{EngineError, Location, Session};
use vs_spec::{AuthField, AuthKind, EndpointSpec};

use crate::field::header_value;

/// Checks the auth fields an endpoint declares
///
/// Each field is looked up under its declared name and location only: a body
/// declaring `accountID` is not satisfied by `accountId`.
pub struct AuthResolver;

impl AuthResolver {
    pub fn resolve_auth(
        spec: &EndpointSpec,
        headers: &HeaderMap,
        body: &Value,
        session: Option<&Session>,
    ) -> Result<(), EngineError> {
        if spec.auth.is_empty() {
            return Ok(());
        }

        let mut presented = Vec::with_capacity(spec.auth.len());
        for field in &spec.auth {
            let value = extract(field, headers, body).ok_or_else(|| EngineError::AuthMissing {
                field: field.name.clone(),
            })?;
            presented.push((field, value));
        }

        let Some(session) = session else {
            return Err(EngineError::AuthMismatch {
                field: spec.auth[0].name.clone(),
                reason: "no active session".to_string(),
            });
        };

        for (field, value) in presented {
            let expected = match field.kind {
                AuthKind::Token => &session.token,
                AuthKind::AccountId => &session.account_id,
            };
            if value != *expected {
                debug!(endpoint = %spec.name, field = %field.name, "Auth field does not match session");
                return Err(EngineError::AuthMismatch {
                    field: field.name.clone(),
                    reason: "does not match the active session".to_string(),
                });
            }
        }

        Ok(())
    }
}

fn extract(field: &AuthField, headers: &HeaderMap, body: &Value) -> Option<String> {
    match field.location {
        Location::Header => header_value(headers, &field.name).map(str::to_string),
        Location::Body => match body.get(&field.name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        },
    }
}
