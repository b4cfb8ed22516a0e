//! Suite definitions.
//!
//! A [`Suite`] is one independently runnable test configuration. Suites are
//! fully resolved by the configuration layer before a run starts; the
//! orchestrator only ever reads them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Where a suite executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Local container sandbox.
    Local,
    /// Remote SaaS grid.
    #[default]
    Remote,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Local => write!(f, "local"),
            ExecutionMode::Remote => write!(f, "remote"),
        }
    }
}

/// Reference to a secure tunnel a suite needs to reach its target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TunnelRef {
    /// Tunnel identifier as registered with the grid.
    pub name: String,

    /// Account that owns the tunnel, when it is shared from another user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl TunnelRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

impl fmt::Display for TunnelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.owner {
            Some(owner) => write!(f, "{} (owner: {})", self.name, owner),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Job metadata shown on the grid dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A declared, fully resolved test suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    /// Unique name within a run.
    pub name: String,

    /// Test framework this suite belongs to (e.g. `cypress`).
    pub framework: String,

    /// Framework-specific settings, passed through to the job starter untouched.
    #[serde(default)]
    pub payload: serde_json::Value,

    /// Per-suite time limit for the remote job. `None` means unlimited.
    #[serde(default, with = "duration_secs_opt")]
    pub timeout: Option<Duration>,

    /// Tunnel that must be up before the job starts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelRef>,

    /// Environment variables exported to the test run.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Execution partition this suite belongs to.
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Container image used by the local partition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default)]
    pub metadata: JobMetadata,
}

impl Suite {
    /// Creates a remote suite with no timeout, tunnel or payload.
    pub fn new(name: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            framework: framework.into(),
            payload: serde_json::Value::Null,
            timeout: None,
            tunnel: None,
            env: BTreeMap::new(),
            mode: ExecutionMode::Remote,
            image: None,
            metadata: JobMetadata::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_tunnel(mut self, tunnel: TunnelRef) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn is_local(&self) -> bool {
        self.mode == ExecutionMode::Local
    }
}

mod duration_secs_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.as_secs_f64()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<f64> = Option::deserialize(de)?;
        Ok(secs
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_remote() {
        let suite = Suite::new("chrome", "cypress");
        assert_eq!(suite.mode, ExecutionMode::Remote);
        assert!(!suite.is_local());
        assert!(suite.timeout.is_none());
    }

    #[test]
    fn test_tunnel_display_includes_owner() {
        let tunnel = TunnelRef::new("corp").with_owner("admin");
        assert_eq!(tunnel.to_string(), "corp (owner: admin)");
        assert_eq!(TunnelRef::new("corp").to_string(), "corp");
    }

    #[test]
    fn test_timeout_serializes_as_seconds() {
        let suite = Suite::new("a", "cypress").with_timeout(Duration::from_secs(90));
        let json = serde_json::to_value(&suite).unwrap();
        assert_eq!(json["timeout"], serde_json::json!(90.0));

        let back: Suite = serde_json::from_value(json).unwrap();
        assert_eq!(back.timeout, Some(Duration::from_secs(90)));
    }
}
