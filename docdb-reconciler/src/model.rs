//! Observed state and shared value types.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceStatus {
    Creating,
    Available,
    Modifying,
    BackingUp,
    ResettingMasterCredentials,
    Starting,
    Stopping,
    Stopped,
    Deleting,
    Failed,
    Other(String),
}

impl ResourceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceStatus::Creating => "creating",
            ResourceStatus::Available => "available",
            ResourceStatus::Modifying => "modifying",
            ResourceStatus::BackingUp => "backing-up",
            ResourceStatus::ResettingMasterCredentials => "resetting-master-credentials",
            ResourceStatus::Starting => "starting",
            ResourceStatus::Stopping => "stopping",
            ResourceStatus::Stopped => "stopped",
            ResourceStatus::Deleting => "deleting",
            ResourceStatus::Failed => "failed",
            ResourceStatus::Other(s) => s,
        }
    }

    pub fn is_available(&self) -> bool {
        *self == ResourceStatus::Available
    }
}

impl FromStr for ResourceStatus {
    type Err = std::convert::Infallible;

    /// Status strings are matched case-insensitively; unknown values are kept verbatim.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "creating" => ResourceStatus::Creating,
            "available" => ResourceStatus::Available,
            "modifying" => ResourceStatus::Modifying,
            "backing-up" => ResourceStatus::BackingUp,
            "resetting-master-credentials" => ResourceStatus::ResettingMasterCredentials,
            "starting" => ResourceStatus::Starting,
            "stopping" => ResourceStatus::Stopping,
            "stopped" => ResourceStatus::Stopped,
            "deleting" => ResourceStatus::Deleting,
            "failed" => ResourceStatus::Failed,
            _ => ResourceStatus::Other(s.to_string()),
        })
    }
}

impl TryFrom<String> for ResourceStatus {
    type Error = std::convert::Infallible;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceStatus> for String {
    fn from(status: ResourceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource tags. Keys are unique by construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Tags(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Write-only credential. Never printed or serialized in clear text.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

pub const REDACTED: &str = "********";

impl Password {
    pub fn new(value: impl Into<String>) -> Self {
        Password(value.into())
    }

    /// Clear-text value, for the transport only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(REDACTED)
    }
}

impl Serialize for Password {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

/// Whether to block until the resource settles, and for how long.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitPolicy {
    pub enabled: bool,
    /// `None` means the branch default applies.
    timeout: Option<Duration>,
}

impl WaitPolicy {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn enabled() -> Self {
        Self {
            enabled: true,
            timeout: None,
        }
    }

    /// A zero timeout selects the default rather than waiting zero seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn from_secs(enabled: bool, secs: u64) -> Self {
        Self {
            enabled,
            timeout: None,
        }
        .with_timeout(Duration::from_secs(secs))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Caller-supplied timeout, else `default`.
    pub fn timeout_or(&self, default: Duration) -> Duration {
        self.timeout.unwrap_or(default)
    }
}

/// Result of describing a resource by identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    Absent,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(t) => Some(t),
            Lookup::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Lookup::Absent)
    }
}

/// Control-plane description of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterDescription {
    pub cluster_id: String,
    pub arn: String,
    pub status: ResourceStatus,
    pub engine: String,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub availability_zones: Vec<String>,
    #[serde(default)]
    pub subnet_group: Option<String>,
    #[serde(default)]
    pub vpc_security_group_ids: Vec<String>,
    #[serde(default)]
    pub parameter_group: Option<String>,
    #[serde(default)]
    pub master_username: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Control-plane description of a cluster member instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDescription {
    pub instance_id: String,
    pub arn: String,
    pub status: ResourceStatus,
    pub engine: String,
    #[serde(default)]
    pub instance_class: Option<String>,
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default)]
    pub preferred_maintenance_window: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Last observed state of either resource kind.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Observed {
    Cluster(ClusterDescription),
    Instance(InstanceDescription),
}

impl Observed {
    pub fn status(&self) -> &ResourceStatus {
        match self {
            Observed::Cluster(c) => &c.status,
            Observed::Instance(i) => &i.status,
        }
    }
}

impl From<ClusterDescription> for Observed {
    fn from(c: ClusterDescription) -> Self {
        Observed::Cluster(c)
    }
}

impl From<InstanceDescription> for Observed {
    fn from(i: InstanceDescription) -> Self {
        Observed::Instance(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse_is_case_insensitive() {
        assert_eq!("AVAILABLE".parse::<ResourceStatus>(), Ok(ResourceStatus::Available));
        assert_eq!("Backing-Up".parse::<ResourceStatus>(), Ok(ResourceStatus::BackingUp));
        assert_eq!(
            "inaccessible-encryption-credentials".parse::<ResourceStatus>(),
            Ok(ResourceStatus::Other("inaccessible-encryption-credentials".into()))
        );
    }

    #[test]
    fn test_status_serde_uses_wire_strings() {
        let json = serde_json::to_string(&ResourceStatus::ResettingMasterCredentials).unwrap();
        assert_eq!(json, "\"resetting-master-credentials\"");
        let back: ResourceStatus = serde_json::from_str("\"Stopped\"").unwrap();
        assert_eq!(back, ResourceStatus::Stopped);
    }

    #[test]
    fn test_zero_wait_timeout_means_default() {
        let policy = WaitPolicy::from_secs(true, 0);
        assert_eq!(policy.timeout(), None);
        assert_eq!(
            policy.timeout_or(Duration::from_secs(600)),
            Duration::from_secs(600)
        );

        let policy = WaitPolicy::from_secs(true, 30);
        assert_eq!(
            policy.timeout_or(Duration::from_secs(600)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_password_never_leaks() {
        let password = Password::new("hunter22");
        assert_eq!(format!("{:?}", password), REDACTED);
        assert_eq!(
            serde_json::to_value(&password).unwrap(),
            serde_json::json!(REDACTED)
        );
        assert_eq!(password.expose(), "hunter22");
    }

    #[test]
    fn test_tags_keep_last_value_per_key() {
        let tags: Tags = [("Env", "dev"), ("Env", "prod"), ("Name", "c1")]
            .into_iter()
            .collect();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.get("Env"), Some("prod"));
        assert_eq!(tags.keys(), vec!["Env".to_string(), "Name".to_string()]);
    }
}
