//! Payloads exchanged with the remote API.
//!
//! Only the fields the mirror reads are modelled. Everything else in a response is
//! ignored during deserialization.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeploymentState {
    Initializing,
    Building,
    Error,
    Queued,
    Ready,
    Canceled,
}

impl DeploymentState {
    pub const ALL: [DeploymentState; 6] = [
        DeploymentState::Initializing,
        DeploymentState::Building,
        DeploymentState::Error,
        DeploymentState::Queued,
        DeploymentState::Ready,
        DeploymentState::Canceled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Building => "BUILDING",
            Self::Error => "ERROR",
            Self::Queued => "QUEUED",
            Self::Ready => "READY",
            Self::Canceled => "CANCELED",
        }
    }

    /// Human label, e.g. `Ready`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Building => "Building",
            Self::Error => "Error",
            Self::Queued => "Queued",
            Self::Ready => "Ready",
            Self::Canceled => "Canceled",
        }
    }

    /// No further transition happens from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Error | Self::Canceled)
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown deployment state '{s}'"))
    }
}

/// Environment a deployment targets. The API reports preview deployments with a null target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTarget {
    Production,
    Preview,
}

impl DeploymentTarget {
    pub const ALL: [DeploymentTarget; 2] = [DeploymentTarget::Production, DeploymentTarget::Preview];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Production => "production",
            Self::Preview => "preview",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Production => "Production",
            Self::Preview => "Preview",
        }
    }
}

impl fmt::Display for DeploymentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown deployment target '{s}'"))
    }
}

/// Environment whose variables can be pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Preview,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Preview => "preview",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown enum values become `None` instead of failing the whole item.
fn lenient_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| value.parse().ok()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub default_team_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectAlias {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub deployment: Option<serde_json::Value>,
}

/// Repository link of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLink {
    #[serde(rename = "type", default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default)]
    pub project_name_with_namespace: Option<String>,
    #[serde(default)]
    pub production_branch: Option<String>,
}

/// A project as returned by `/v4/projects/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainProject {
    pub id: String,
    pub name: String,
    pub created_at: i64,
    pub account_id: String,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub link: Option<ProjectLink>,
    #[serde(default)]
    pub alias: Vec<ProjectAlias>,
    #[serde(default)]
    pub latest_deployments: Vec<LatestDeployment>,
}

/// Partial deployment embedded in a project payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestDeployment {
    #[serde(default)]
    pub meta: DeploymentMeta,
}

/// Free-form deployment metadata, mostly VCS details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentMeta(pub BTreeMap<String, serde_json::Value>);

impl DeploymentMeta {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<serde_json::Value>> FromIterator<(K, V)> for DeploymentMeta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A deployment as listed by `/v6/deployments` (`uid`) or fetched by `/v13/deployments/{id}` (`id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainDeployment {
    #[serde(alias = "id")]
    pub uid: String,
    pub name: String,
    pub created_at: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub state: Option<DeploymentState>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub meta: DeploymentMeta,
    #[serde(default)]
    pub ready: Option<i64>,
    #[serde(default, deserialize_with = "lenient_enum")]
    pub target: Option<DeploymentTarget>,
    #[serde(default)]
    pub booted_at: Option<i64>,
}

/// One build event. Events carrying `text` make up the build log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub created: i64,
    #[serde(default)]
    pub text: Option<String>,
}

/// Entry of a deployment's output file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FileNode {
    Directory { name: String },
    File { name: String, link: String },
    Lambda { name: String, link: String },
}

impl FileNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name } | Self::File { name, .. } | Self::Lambda { name, .. } => name,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    /// Files served by the legacy v6 endpoint are linked under `/api/v6`.
    pub fn uses_v6(&self) -> bool {
        match self {
            Self::File { link, .. } | Self::Lambda { link, .. } => link.starts_with("/api/v6"),
            Self::Directory { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Registered,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckConclusion {
    Canceled,
    Failed,
    Neutral,
    Skipped,
    Succeeded,
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: String,
    pub integration_id: String,
    pub name: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub status: CheckStatus,
    #[serde(default)]
    pub conclusion: Option<CheckConclusion>,
}
