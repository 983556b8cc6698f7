//! Entry points bound to user actions.
//!
//! Failures of these foreground actions are shown through the [`Notifier`] and also
//! returned to the caller. Background refreshes never come through here.

use crate::caches::content::DeploymentContentState;
use crate::caches::deployments::DeploymentsState;
use crate::caches::filters::DeploymentFiltersState;
use crate::caches::linked_projects::LinkedProjectsState;
use crate::caches::projects::RemoteProjectsState;
use crate::host::{AuthenticationState, ContextId, ContextKeys, Notifier, Session, tokens};
use crate::models::{Deployment, DeploymentFilters, ENV_FILE, ProjectDescriptor};
use mirror_api::{Environment, RemoteApi};
use mirror_core::container::{Dependencies, Injectable, Token};
use mirror_core::logger::Logger;
use mirror_core::{MirrorError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct Commands {
    logger: Logger,
    notifier: Arc<dyn Notifier>,
    api: Arc<dyn RemoteApi>,
    auth: Arc<AuthenticationState>,
    context_keys: Arc<ContextKeys>,
    linked_projects: Arc<LinkedProjectsState>,
    projects: Arc<RemoteProjectsState>,
    filters: Arc<DeploymentFiltersState>,
    deployments: Arc<DeploymentsState>,
    content: Arc<DeploymentContentState>,
}

impl Commands {
    /// Rediscover and relink every local project. Waits for a load in flight instead of
    /// being dropped by it.
    pub async fn reload_projects(&self) -> Result<()> {
        self.logger.info("Reloading projects");
        let result = self.linked_projects.reload_after_current().await;
        self.report("reload projects", result)
    }

    /// Focus a remote project, or clear the focus with `None`.
    pub async fn switch_focused_project(&self, project_id: Option<&str>) -> Result<()> {
        let result = match project_id {
            Some(id) if self.projects.get(id).is_none() => Err(MirrorError::not_found("project", id)),
            Some(id) => self.context_keys.set(ContextId::FocusedProjectId, id).await,
            None => self.context_keys.delete(ContextId::FocusedProjectId).await,
        };
        self.report("switch focused project", result)
    }

    pub async fn update_filters(&self, filters: DeploymentFilters) -> Result<bool> {
        let result = self.filters.update_filters(filters).await;
        self.report("update filters", result)
    }

    pub async fn reset_filters(&self) -> Result<bool> {
        let result = self.filters.reset_filters().await;
        self.report("reset filters", result)
    }

    /// Show a cached deployment in the detail view, or close it with `None`.
    pub async fn select_deployment(&self, deployment_id: Option<&str>) -> Result<Option<Deployment>> {
        let deployment = match deployment_id {
            Some(id) => match self.deployments.get(id) {
                Some(deployment) => Some(deployment),
                None => {
                    return self.report("select deployment", Err(MirrorError::not_found("deployment", id)));
                }
            },
            None => None,
        };
        let result = self.content.set_selected_deployment(deployment.clone()).await;
        self.report("select deployment", result.map(|()| deployment))
    }

    pub async fn refresh_deployments(&self) -> Result<()> {
        let result = self.deployments.load_deployments().await;
        self.report("refresh deployments", result)
    }

    pub async fn refresh_deployment(&self, deployment_id: &str) -> Result<Option<Deployment>> {
        let result = self.deployments.refresh_deployment(deployment_id).await;
        self.report("refresh deployment", result)
    }

    /// Write the descriptor linking `folder` to a remote project. Returns `false` when the
    /// folder is already linked. The file watcher picks the new descriptor up.
    pub async fn link_folder_to_project(
        &self,
        folder: &Path,
        project_id_or_name: &str,
        team_id: Option<&str>,
    ) -> Result<bool> {
        let session = self.require_session("link a folder")?;

        if ProjectDescriptor::exists(folder).await {
            self.notifier
                .show_info(&format!("{} is already linked to a project", folder.display()));
            return Ok(false);
        }

        let auth = session.auth_for_team(team_id);
        let project = match self.api.get_project_by_name_or_id(project_id_or_name, &auth).await {
            Ok(project) => project,
            Err(e) if e.is_not_found() => {
                let err = MirrorError::not_found("project", project_id_or_name);
                return self.report("link folder", Err(err));
            }
            Err(e) => return self.report("link folder", Err(e.into())),
        };

        let descriptor = ProjectDescriptor::new(&project.id, &project.account_id);
        self.report("link folder", descriptor.write(folder).await)?;

        self.logger
            .info(format!("Linked {} to project {}", folder.display(), project.id));
        self.notifier
            .show_info(&format!("Linked {} to {}", folder.display(), project.name));
        Ok(true)
    }

    /// Download the environment variables of the project linked at `project_root` into
    /// `.env.local`. An existing file is only replaced with `overwrite`. Returns the
    /// written path.
    pub async fn pull_envs(
        &self,
        project_root: &Path,
        environment: Environment,
        overwrite: bool,
    ) -> Result<Option<PathBuf>> {
        let session = self.require_session("pull environment variables")?;

        let descriptor = match ProjectDescriptor::read(project_root).await {
            Ok(Some(descriptor)) => descriptor,
            Ok(None) => {
                let err = MirrorError::invalid_input(format!(
                    "{} is not linked to a project",
                    project_root.display()
                ));
                return self.report("pull envs", Err(err));
            }
            Err(e) => return self.report("pull envs", Err(e)),
        };

        let path = project_root.join(ENV_FILE);
        if !overwrite && tokio::fs::try_exists(&path).await.unwrap_or(false) {
            self.notifier
                .show_info(&format!("{} already exists", path.display()));
            return Ok(None);
        }

        let auth = session.auth_for_team(Some(descriptor.org_id.as_str()));
        let envs = match self
            .api
            .pull_project_envs(&descriptor.project_id, environment, &auth)
            .await
        {
            Ok(envs) => envs,
            Err(e) => return self.report("pull envs", Err(e.into())),
        };

        let written = tokio::fs::write(&path, render_env_file(&envs)).await;
        self.report("pull envs", written.map_err(MirrorError::from))?;

        info!(
            component = self.logger.component(),
            count = envs.len(),
            %environment,
            path = %path.display(),
            "Pulled environment variables"
        );
        Ok(Some(path))
    }

    fn require_session(&self, action: &str) -> Result<Session> {
        self.auth.current_session().ok_or_else(|| {
            let message = format!("Sign in to {action}");
            self.notifier.show_error(&message);
            MirrorError::unauthenticated(message)
        })
    }

    fn report<T>(&self, action: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.logger.error(format!("Failed to {action}: {e}"));
            self.notifier.show_error(&format!("Failed to {action}: {e}"));
        }
        result
    }
}

/// `KEY="value"` lines. Quotes, backslashes and newlines in values are escaped.
pub fn render_env_file(envs: &BTreeMap<String, String>) -> String {
    envs.iter()
        .map(|(key, value)| {
            let escaped = value
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n");
            format!("{key}=\"{escaped}\"")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl Injectable for Commands {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::named(tokens::NOTIFIER),
            Token::named(tokens::REMOTE_API),
            Token::of::<AuthenticationState>(),
            Token::of::<ContextKeys>(),
            Token::of::<LinkedProjectsState>(),
            Token::of::<RemoteProjectsState>(),
            Token::of::<DeploymentFiltersState>(),
            Token::of::<DeploymentsState>(),
            Token::of::<DeploymentContentState>(),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            logger: Logger::new("Commands"),
            notifier: deps.next_value()?,
            api: deps.next_value()?,
            auth: deps.next()?,
            context_keys: deps.next()?,
            linked_projects: deps.next()?,
            projects: deps.next()?,
            filters: deps.next()?,
            deployments: deps.next()?,
            content: deps.next()?,
        }))
    }
}
