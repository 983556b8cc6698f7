//! Deployments as held by the caches.

use crate::models::remote_project::RemoteProject;
use crate::models::vcs::{GitBranch, GitCommit, GitProvider, GitRepo, VcsInfo, parse_deployment_meta};
use mirror_api::{DeploymentState, DeploymentTarget, PlainDeployment};
use mirror_core::Result;
use mirror_core::id::encode_id;
use std::sync::Arc;

/// Immutable snapshot of one deployment together with its project. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Deployment {
    pub id: String,
    pub project: RemoteProject,
    /// `<team>/<project>/<deployment>`
    pub hash_path: String,
    data: Arc<PlainDeployment>,
    vcs: Option<VcsInfo>,
}

impl Deployment {
    pub fn new(data: PlainDeployment, project: RemoteProject) -> Self {
        let vcs = parse_deployment_meta(&data.meta);
        Self {
            id: data.uid.clone(),
            hash_path: format!("{}/{}", project.hash_path, data.uid),
            project,
            data: Arc::new(data),
            vcs,
        }
    }

    pub fn data(&self) -> &PlainDeployment {
        &self.data
    }

    pub fn name(&self) -> &str {
        &self.data.name
    }

    pub fn state(&self) -> Option<DeploymentState> {
        self.data.state
    }

    pub fn target(&self) -> Option<DeploymentTarget> {
        self.data.target
    }

    pub fn url(&self) -> Option<&str> {
        self.data.url.as_deref()
    }

    pub fn created_at(&self) -> i64 {
        self.data.created_at
    }

    /// Whether the deployment reached a state it never leaves.
    pub fn is_terminal(&self) -> bool {
        self.data.state.is_some_and(|state| state.is_terminal())
    }

    /// Host-safe authority, `<encoded deployment>.<project authority>`.
    pub fn authority(&self) -> Result<String> {
        Ok(format!("{}.{}", encode_id(&self.id)?, self.project.authority()?))
    }

    pub fn source_provider(&self) -> Option<GitProvider> {
        self.vcs.as_ref().and_then(|vcs| vcs.provider)
    }

    pub fn repo(&self) -> Option<&GitRepo> {
        self.vcs.as_ref().and_then(|vcs| vcs.repo.as_ref())
    }

    pub fn branch(&self) -> Option<&GitBranch> {
        self.vcs.as_ref().and_then(|vcs| vcs.branch.as_ref())
    }

    pub fn commit(&self) -> Option<&GitCommit> {
        self.vcs.as_ref().and_then(|vcs| vcs.commit.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mirror_api::PlainProject;
    use serde_json::json;

    fn project() -> RemoteProject {
        let data: PlainProject = serde_json::from_value(json!({
            "id": "prj_1", "name": "web", "createdAt": 1, "accountId": "team_1"
        }))
        .unwrap();
        RemoteProject::new(data)
    }

    #[test]
    fn test_deployment_fields() {
        let data: PlainDeployment = serde_json::from_value(json!({
            "uid": "dpl_1",
            "name": "web",
            "createdAt": 10,
            "state": "BUILDING",
            "target": "production",
            "meta": {"githubDeployment": "1", "githubCommitSha": "abc", "githubCommitAuthorName": "Kai"},
        }))
        .unwrap();

        let deployment = Deployment::new(data, project());
        assert_eq!(deployment.hash_path, "team_1/prj_1/dpl_1");
        assert!(!deployment.is_terminal());
        assert_eq!(deployment.target(), Some(DeploymentTarget::Production));
        assert_eq!(deployment.source_provider(), Some(GitProvider::Github));
        assert_eq!(deployment.commit().map(|c| c.author_name.as_str()), Some("Kai"));
        assert_eq!(deployment.authority().unwrap().split('.').count(), 3);
    }

    #[test]
    fn test_unknown_state_is_not_terminal() {
        let data: PlainDeployment = serde_json::from_value(json!({
            "uid": "dpl_2", "name": "web", "createdAt": 10, "state": "SOMETHING_NEW"
        }))
        .unwrap();
        let deployment = Deployment::new(data, project());
        assert_eq!(deployment.state(), None);
        assert!(!deployment.is_terminal());
    }
}