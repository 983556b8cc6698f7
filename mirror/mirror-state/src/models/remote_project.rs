//! Remote projects as held by the caches.

use crate::models::vcs::{VcsInfo, parse_deployment_meta};
use mirror_api::PlainProject;
use mirror_core::Result;
use mirror_core::id::encode_id;
use std::sync::Arc;

/// Dashboard host used for project links.
pub const DASHBOARD_URL: &str = "https://vercel.com";

/// Immutable snapshot of a remote project. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    pub team_id: String,
    /// `<team>/<project>`, the prefix of every content cache key below this project.
    pub hash_path: String,
    data: Arc<PlainProject>,
    latest_deployment: Option<VcsInfo>,
}

impl RemoteProject {
    pub fn new(data: PlainProject) -> Self {
        let latest_deployment = data
            .latest_deployments
            .first()
            .and_then(|deployment| parse_deployment_meta(&deployment.meta));

        Self {
            id: data.id.clone(),
            name: data.name.clone(),
            team_id: data.account_id.clone(),
            hash_path: format!("{}/{}", data.account_id, data.id),
            data: Arc::new(data),
            latest_deployment,
        }
    }

    pub fn data(&self) -> &PlainProject {
        &self.data
    }

    /// Dashboard page of the project.
    pub fn url(&self) -> String {
        format!("{DASHBOARD_URL}/{}/{}", self.team_id, self.name)
    }

    /// Host-safe authority, `<encoded project>.<encoded team>`.
    pub fn authority(&self) -> Result<String> {
        Ok(format!("{}.{}", encode_id(&self.id)?, encode_id(&self.team_id)?))
    }

    /// First alias that points at a deployment, else the first alias.
    pub fn production_alias(&self) -> Option<&str> {
        let aliases = &self.data.alias;
        aliases
            .iter()
            .find(|alias| alias.deployment.is_some())
            .and_then(|alias| alias.domain.as_deref())
            .or_else(|| aliases.first().and_then(|alias| alias.domain.as_deref()))
    }

    pub fn latest_deployment_meta(&self) -> Option<&VcsInfo> {
        self.latest_deployment.as_ref()
    }

    /// Milliseconds since the project was last updated.
    pub fn last_updated_ms_ago(&self, now_ms: i64) -> i64 {
        now_ms - self.data.updated_at.unwrap_or(self.data.created_at)
    }
}
