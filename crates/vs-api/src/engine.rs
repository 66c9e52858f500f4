//! The request pipeline
//!
//! resolve spec -> validate fields -> check auth -> locate device ->
//! parse mutation -> apply -> synthesize. Every failure becomes an error
//! envelope; nothing on this path is fatal.

use http::HeaderMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use vs_config::{AccountConfig, ConfigError, MockConfig};
use vs_core::{Action, DeviceRecord, EngineError, Mismatch, ResponseEnvelope, Session, ANY, MISSING};
use vs_spec::{EndpointSpec, Operation, SpecError, SpecRegistry};
use vs_state_store::{DeviceStateStore, Mutation, SessionStore};
use vs_validator::{AuthResolver, FieldValidator};

use crate::synthesizer::{ResponseSynthesizer, ShapeRules};

/// Startup failures; the server cannot run without a valid config and spec set
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Spec(#[from] SpecError),
}

/// Owns the spec set and the stores, and answers requests
pub struct Engine {
    registry: Arc<SpecRegistry>,
    store: Arc<DeviceStateStore>,
    sessions: Arc<SessionStore>,
    synthesizer: ResponseSynthesizer,
    account: AccountConfig,
    inventory: Vec<DeviceRecord>,
}

impl Engine {
    pub fn new(registry: SpecRegistry, account: AccountConfig, inventory: Vec<DeviceRecord>) -> Self {
        Self {
            registry: Arc::new(registry),
            store: Arc::new(DeviceStateStore::new()),
            sessions: Arc::new(SessionStore::new()),
            synthesizer: ResponseSynthesizer::default(),
            account,
            inventory,
        }
    }

    /// Build the engine from a loaded config
    pub fn from_config(config: &MockConfig) -> Result<Self, SetupError> {
        let registry = SpecRegistry::from_yaml(&config.endpoints)?;
        let inventory = config.device_records()?;
        info!(
            endpoints = registry.len(),
            devices = inventory.len(),
            "Engine ready"
        );
        Ok(Self::new(registry, config.account.clone(), inventory))
    }

    /// Use caller-owned stores, e.g. to inspect state from tests
    pub fn with_stores(mut self, store: Arc<DeviceStateStore>, sessions: Arc<SessionStore>) -> Self {
        self.store = store;
        self.sessions = sessions;
        self
    }

    pub fn with_shape_rules(mut self, rules: Arc<dyn ShapeRules>) -> Self {
        self.synthesizer = ResponseSynthesizer::new(rules);
        self
    }

    pub fn registry(&self) -> &SpecRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<DeviceStateStore> {
        &self.store
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn inventory(&self) -> &[DeviceRecord] {
        &self.inventory
    }

    /// Answer one request
    #[instrument(skip(self, headers, body))]
    pub fn handle(&self, method: &str, path: &str, headers: &HeaderMap, body: &Value) -> ResponseEnvelope {
        match self.process(method, path, headers, body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(code = err.code(), "{}", err);
                ResponseEnvelope::from_error(&err)
            }
        }
    }

    fn process(
        &self,
        method: &str,
        path: &str,
        headers: &HeaderMap,
        body: &Value,
    ) -> Result<ResponseEnvelope, EngineError> {
        let spec = self.registry.resolve(method, path)?;
        debug!(endpoint = %spec.name, "Resolved endpoint");

        if let Some(err) = FieldValidator::validate(spec, headers, body).into_error() {
            return Err(err);
        }

        let operation = spec
            .select_operation(body)
            .map_err(|m| EngineError::BodyFieldMismatch(vec![m]))?;

        let session = self.sessions.current();
        AuthResolver::resolve_auth(spec, headers, body, session.as_deref())?;

        match operation.action {
            Action::Login => self.login(operation, body),
            Action::Devices => Ok(self.device_list(operation)),
            _ => self.device_operation(spec, operation, method, path, body),
        }
    }

    /// Check credentials and open a session
    fn login(&self, operation: &Operation, body: &Value) -> Result<ResponseEnvelope, EngineError> {
        let email = credential(body, "email")?;
        let password = credential(body, "password")?;

        if email != self.account.email || password != self.account.password_hash {
            debug!(email = %email, "Rejected login");
            return Err(EngineError::InvalidCredentials);
        }

        let session = self.sessions.login(Session::issue(self.account.account_id.clone()));

        let mut extra = Map::new();
        extra.insert("accountID".to_string(), json!(session.account_id));
        extra.insert("token".to_string(), json!(session.token));
        extra.insert("nickName".to_string(), json!(self.account.nickname));
        extra.insert("email".to_string(), json!(self.account.email));
        extra.insert("countryCode".to_string(), json!(self.account.country_code));
        Ok(self.synthesizer.build_static(operation, &extra))
    }

    /// Register the inventory (keeping existing state) and list it
    fn device_list(&self, operation: &Operation) -> ResponseEnvelope {
        let devices: Vec<DeviceRecord> = self
            .inventory
            .iter()
            .map(|record| self.store.register(record.clone()))
            .collect();
        debug!(count = devices.len(), "Listing devices");
        self.synthesizer.build_device_list(operation, &devices)
    }

    fn device_operation(
        &self,
        spec: &EndpointSpec,
        operation: &Operation,
        method: &str,
        path: &str,
        body: &Value,
    ) -> Result<ResponseEnvelope, EngineError> {
        let Some(locator) = &spec.device_locator else {
            if operation.action.is_mutation() {
                return Err(EngineError::InvalidStateTransition(format!(
                    "{} has no target device",
                    operation.action
                )));
            }
            return Ok(self.synthesizer.build_static(operation, &Map::new()));
        };

        let id = locator
            .extract(path, body)
            .ok_or_else(|| EngineError::UnknownDevice("(no identifier)".to_string()))?;
        let device = self
            .store
            .find(&id)
            .ok_or_else(|| EngineError::UnknownDevice(id.clone()))?;

        if !spec.allows_model(&device.model) || !operation.allows_model(&device.model) {
            debug!(model = %device.model, operation = %operation.name, "Model not served by endpoint");
            return Err(EngineError::SpecNotFound {
                method: method.to_ascii_uppercase(),
                path: path.to_string(),
            });
        }

        let attributes = if operation.action.is_mutation() {
            let mutation = Mutation::parse(operation.action, &operation.resolve_args(body))?;
            self.store.apply(&device.uuid, &mutation)?
        } else {
            device.attributes.clone()
        };

        Ok(self.synthesizer.build(operation, &device, &attributes))
    }
}

/// A non-empty string credential from the login body
fn credential<'a>(body: &'a Value, name: &str) -> Result<&'a str, EngineError> {
    match body.get(name) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.as_str()),
        Some(other) => Err(EngineError::BodyFieldMismatch(vec![Mismatch::body(
            name,
            ANY,
            other.to_string(),
        )])),
        None => Err(EngineError::BodyFieldMismatch(vec![Mismatch::body(
            name, ANY, MISSING,
        )])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;
    use vs_core::{codes, Category};

    fn account() -> AccountConfig {
        AccountConfig {
            email: "test@example.com".to_string(),
            password_hash: "cc03e747a6afbbcbf8be7668acfebee5".to_string(),
            account_id: "mock_account_id".to_string(),
            nickname: "Mock User".to_string(),
            country_code: "US".to_string(),
        }
    }

    fn outlet() -> DeviceRecord {
        DeviceRecord {
            uuid: "outlet-uuid".to_string(),
            cid: "outlet-uuid".to_string(),
            model: "ESW15-USA".to_string(),
            config_module: "VeSyncOutlet15A".to_string(),
            name: "Mock ESW15-USA".to_string(),
            category: Category::Outlet,
            attributes: Default::default(),
        }
    }

    fn engine() -> Engine {
        let registry = SpecRegistry::from_json(&json!({
            "login": {
                "method": "POST",
                "url": "/cloud/v1/user/login",
                "json_object": {"email": "{email}", "password": "{password}", "method": "login"},
                "action": "login",
                "response": {"accountID": "{accountID}", "token": "{token}"}
            },
            "devices": {
                "method": "POST",
                "url": "/cloud/v1/deviceManaged/devices",
                "headers": {"tk": "{tk}"},
                "json_object": {"accountID": "{accountID}", "token": "{token}", "method": "devices"},
                "action": "devices",
                "response": {"total": "{total}", "list": [{"uuid": "{uuid}"}]}
            },
            "toggle": {
                "method": "PUT",
                "url": "/15a/v1/device/devicestatus",
                "headers": {"tk": "{tk}"},
                "json_object": {"uuid": "{uuid}", "status": "{status}"},
                "models": ["ESW15-USA"],
                "action": "set_switch",
                "args": {"enabled": "{status}"},
                "response": {}
            },
            "detail": {
                "method": "POST",
                "url": "/15a/v1/device/devicedetail",
                "headers": {"tk": "{tk}"},
                "json_object": {"uuid": "{uuid}"},
                "response": {"deviceStatus": "{enabled:onoff}"}
            },
            "humidity": {
                "method": "PUT",
                "url": "/15a/v1/device/humidity",
                "headers": {"tk": "{tk}"},
                "json_object": {"uuid": "{uuid}", "target": "{target}"},
                "action": "set_humidity",
                "args": {"humidity": "{target}"}
            }
        }))
        .unwrap();
        Engine::new(registry, account(), vec![outlet()])
    }

    fn tk(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("tk", HeaderValue::from_str(token).unwrap());
        headers
    }

    fn login(engine: &Engine) -> String {
        let envelope = engine.handle(
            "POST",
            "/cloud/v1/user/login",
            &HeaderMap::new(),
            &json!({"email": "test@example.com", "password": "cc03e747a6afbbcbf8be7668acfebee5", "method": "login"}),
        );
        assert!(envelope.is_success(), "{:?}", envelope);
        envelope.result.unwrap()["token"].as_str().unwrap().to_string()
    }

    fn list_devices(engine: &Engine, token: &str) -> ResponseEnvelope {
        engine.handle(
            "POST",
            "/cloud/v1/deviceManaged/devices",
            &tk(token),
            &json!({"accountID": "mock_account_id", "token": token, "method": "devices"}),
        )
    }

    #[test]
    fn test_login_then_list() {
        let engine = engine();
        let token = login(&engine);
        let envelope = list_devices(&engine, &token);
        let result = envelope.result.unwrap();
        assert_eq!(result["total"], json!(1));
        assert_eq!(result["list"][0]["uuid"], json!("outlet-uuid"));
        assert_eq!(engine.store().len(), 1);
    }

    #[test]
    fn test_wrong_password() {
        let engine = engine();
        let envelope = engine.handle(
            "POST",
            "/cloud/v1/user/login",
            &HeaderMap::new(),
            &json!({"email": "test@example.com", "password": "nope", "method": "login"}),
        );
        assert_eq!(envelope.code, codes::ACCOUNT_NOT_FOUND);
        assert!(engine.sessions().current().is_none());
    }

    #[test]
    fn test_empty_email_is_body_mismatch() {
        let engine = engine();
        let envelope = engine.handle(
            "POST",
            "/cloud/v1/user/login",
            &HeaderMap::new(),
            &json!({"email": "", "password": "x", "method": "login"}),
        );
        assert_eq!(envelope.code, codes::ILLEGAL_ARGUMENT);
        assert!(envelope.msg.unwrap().contains("email"));
    }

    #[test]
    fn test_toggle_round_trip() {
        let engine = engine();
        let token = login(&engine);
        list_devices(&engine, &token);

        let toggle = engine.handle(
            "PUT",
            "/15a/v1/device/devicestatus",
            &tk(&token),
            &json!({"uuid": "outlet-uuid", "status": "on"}),
        );
        assert!(toggle.is_success(), "{:?}", toggle);

        let detail = engine.handle(
            "POST",
            "/15a/v1/device/devicedetail",
            &tk(&token),
            &json!({"uuid": "outlet-uuid"}),
        );
        assert_eq!(detail.result.unwrap()["deviceStatus"], json!("on"));
    }

    #[test]
    fn test_unlisted_device_is_unknown() {
        let engine = engine();
        let token = login(&engine);
        let envelope = engine.handle(
            "POST",
            "/15a/v1/device/devicedetail",
            &tk(&token),
            &json!({"uuid": "outlet-uuid"}),
        );
        assert_eq!(envelope.code, codes::DEVICE_NOT_FOUND);
    }

    #[test]
    fn test_stale_token_after_relogin() {
        let engine = engine();
        let old = login(&engine);
        let _new = login(&engine);
        let envelope = list_devices(&engine, &old);
        assert_eq!(envelope.code, codes::INVALID_TOKEN);
    }

    #[test]
    fn test_inapplicable_mutation() {
        let engine = engine();
        let token = login(&engine);
        list_devices(&engine, &token);
        let envelope = engine.handle(
            "PUT",
            "/15a/v1/device/humidity",
            &tk(&token),
            &json!({"uuid": "outlet-uuid", "target": 50}),
        );
        assert_eq!(envelope.code, codes::INVALID_STATE);
        assert!(envelope.result.is_none());
    }

    #[test]
    fn test_unknown_path() {
        let engine = engine();
        let envelope = engine.handle("GET", "/nope", &HeaderMap::new(), &Value::Null);
        assert_eq!(envelope.code, codes::SPEC_NOT_FOUND);
    }
}
