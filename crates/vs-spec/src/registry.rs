//! Lookup of endpoint specs by (method, path)

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, instrument};
use vs_core::EngineError;

use crate::endpoint::{segments, EndpointSpec};
use crate::error::{SpecError, SpecResult};
use crate::schema::wildcard_name;

/// Stands in for a variable segment in normalized patterns
const VARIABLE: &str = "*";

/// Segment positions fit in a `u64` mask
const MAX_SEGMENTS: usize = 64;

/// Which positions of an n-segment path are variable
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Mask {
    /// Number of variable positions; fewer are tried first
    variables: u32,
    len: usize,
    bits: u64,
}

impl Mask {
    fn apply(&self, parts: &[&str]) -> String {
        let mut out = String::new();
        for (i, part) in parts.iter().enumerate() {
            out.push('/');
            if self.bits & (1 << i) != 0 {
                out.push_str(VARIABLE);
            } else {
                out.push_str(part);
            }
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

/// The closed set of endpoint specs, immutable after load
#[derive(Debug, Default)]
pub struct SpecRegistry {
    specs: Vec<EndpointSpec>,
    /// (method, normalized pattern) -> index into `specs`
    index: HashMap<(String, String), usize>,
    /// Distinct variable-segment masks seen at load, most literal first
    masks: BTreeSet<Mask>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `endpoints` mapping of the config file
    pub fn from_yaml(endpoints: &serde_yaml::Value) -> SpecResult<Self> {
        let json = serde_json::to_value(endpoints).map_err(|e| SpecError::InvalidEntry {
            name: "endpoints".to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&json)
    }

    pub fn from_json(endpoints: &serde_json::Value) -> SpecResult<Self> {
        let map = match endpoints {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Ok(Self::new()),
            _ => return Err(SpecError::NotMapping),
        };

        let mut registry = Self::new();
        for (name, entry) in map {
            registry.insert(EndpointSpec::from_entry(name, entry)?)?;
        }

        info!("Loaded {} endpoint specs", registry.len());
        Ok(registry)
    }

    /// Add a spec; a second spec for the same (method, pattern) is an error
    pub fn insert(&mut self, spec: EndpointSpec) -> SpecResult<()> {
        let parts: Vec<&str> = segments(&spec.url_pattern).collect();
        if parts.len() > MAX_SEGMENTS {
            return Err(SpecError::invalid(&spec.name, "url has too many segments"));
        }

        let mut bits = 0u64;
        for (i, part) in parts.iter().enumerate() {
            if wildcard_name(part).is_some() {
                bits |= 1 << i;
            }
        }
        let mask = Mask {
            variables: bits.count_ones(),
            len: parts.len(),
            bits,
        };

        let key = (spec.method.clone(), mask.apply(&parts));
        if let Some(&existing) = self.index.get(&key) {
            return Err(SpecError::Duplicate {
                method: key.0,
                url: spec.url_pattern.clone(),
                first: self.specs[existing].name.clone(),
                second: spec.name.clone(),
            });
        }

        debug!(name = %spec.name, method = %key.0, pattern = %key.1, "Registering endpoint");
        if bits != 0 {
            self.masks.insert(mask);
        }
        self.index.insert(key, self.specs.len());
        self.specs.push(spec);
        Ok(())
    }

    /// Find the spec for a request; literal patterns win over variable ones
    #[instrument(skip(self))]
    pub fn resolve(&self, method: &str, path: &str) -> Result<&EndpointSpec, EngineError> {
        let method = method.to_ascii_uppercase();
        let parts: Vec<&str> = segments(path).collect();
        let not_found = || EngineError::SpecNotFound {
            method: method.clone(),
            path: path.to_string(),
        };
        if parts.len() > MAX_SEGMENTS {
            return Err(not_found());
        }

        let literal = Mask {
            variables: 0,
            len: parts.len(),
            bits: 0,
        };
        std::iter::once(&literal)
            .chain(self.masks.iter().filter(|m| m.len == parts.len()))
            .find_map(|mask| self.index.get(&(method.clone(), mask.apply(&parts))))
            .map(|&i| &self.specs[i])
            .ok_or_else(not_found)
    }

    /// Spec by its declared name
    pub fn get(&self, name: &str) -> Option<&EndpointSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EndpointSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}
