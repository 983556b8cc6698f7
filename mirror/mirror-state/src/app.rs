//! Composition root.
//!
//! [`MirrorApp`] binds the host values, registers every component with the container
//! and resolves them eagerly so that all event listeners are in place before the first
//! load. Wiring errors surface from [`MirrorApp::new`].

use crate::caches::{
    DeploymentContentState, DeploymentFiltersState, DeploymentsState, FileWatchers, FoldersState,
    LinkedProjectsState, LocalProjectsState, RemoteProjectsState,
};
use crate::commands::Commands;
use crate::host::{
    AuthenticationState, ContextId, ContextKeys, HostWorkspace, LogNotifier, Notifier, Session,
    SettingsState, WorkspaceState, tokens,
};
use crate::projections::{FileDecorations, StatusBar};
use mirror_api::RemoteApi;
use mirror_core::Result;
use mirror_core::config::MirrorConfig;
use mirror_core::container::{Container, Disposable};
use mirror_core::logger::Logger;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Host values the graph is built from.
pub struct MirrorAppOptions {
    pub config: MirrorConfig,
    pub folders: Vec<PathBuf>,
    pub api: Arc<dyn RemoteApi>,
    pub notifier: Arc<dyn Notifier>,
    pub workspace_state: Arc<WorkspaceState>,
    pub session: Option<Session>,
}

impl MirrorAppOptions {
    pub fn new(config: MirrorConfig, api: Arc<dyn RemoteApi>) -> Self {
        Self {
            config,
            folders: Vec::new(),
            api,
            notifier: Arc::new(LogNotifier),
            workspace_state: Arc::new(WorkspaceState::in_memory()),
            session: None,
        }
    }

    pub fn with_folders(mut self, folders: impl IntoIterator<Item = PathBuf>) -> Self {
        self.folders = folders.into_iter().collect();
        self
    }

    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_workspace_state(mut self, workspace_state: Arc<WorkspaceState>) -> Self {
        self.workspace_state = workspace_state;
        self
    }
}

pub struct MirrorApp {
    logger: Logger,
    container: Container,
    settings: Arc<SettingsState>,
    context_keys: Arc<ContextKeys>,
    auth: Arc<AuthenticationState>,
    workspace: Arc<HostWorkspace>,
    folders: Arc<FoldersState>,
    local_projects: Arc<LocalProjectsState>,
    linked_projects: Arc<LinkedProjectsState>,
    projects: Arc<RemoteProjectsState>,
    filters: Arc<DeploymentFiltersState>,
    deployments: Arc<DeploymentsState>,
    content: Arc<DeploymentContentState>,
    status_bar: Arc<StatusBar>,
    decorations: Arc<FileDecorations>,
    commands: Arc<Commands>,
}

impl MirrorApp {
    /// Build and resolve the whole graph. Must run inside a Tokio runtime: components
    /// spawn their listeners while being constructed.
    pub fn new(options: MirrorAppOptions) -> Result<Self> {
        let container = Container::new();
        container.register_value(tokens::CONFIG, options.config)?;
        container.register_value(tokens::WORKSPACE_FOLDERS, options.folders)?;
        container.register_value(tokens::WORKSPACE_STATE, options.workspace_state)?;
        container.register_value(tokens::REMOTE_API, options.api)?;
        container.register_value(tokens::NOTIFIER, options.notifier)?;
        container.register_value(tokens::STORED_SESSION, options.session)?;

        container.register::<SettingsState>()?;
        container.register::<ContextKeys>()?;
        container.register::<AuthenticationState>()?;
        container.register::<HostWorkspace>()?;
        container.register::<FoldersState>()?;
        container.register::<FileWatchers>()?;
        container.register::<LocalProjectsState>()?;
        container.register::<LinkedProjectsState>()?;
        container.register::<RemoteProjectsState>()?;
        container.register::<DeploymentFiltersState>()?;
        container.register::<DeploymentsState>()?;
        container.register::<DeploymentContentState>()?;
        container.register::<StatusBar>()?;
        container.register::<FileDecorations>()?;
        container.register::<Commands>()?;

        Ok(Self {
            logger: Logger::new("MirrorApp"),
            settings: container.resolve()?,
            context_keys: container.resolve()?,
            auth: container.resolve()?,
            workspace: container.resolve()?,
            folders: container.resolve()?,
            local_projects: container.resolve()?,
            linked_projects: container.resolve()?,
            projects: container.resolve()?,
            filters: container.resolve()?,
            deployments: container.resolve()?,
            content: container.resolve()?,
            status_bar: container.resolve()?,
            decorations: container.resolve()?,
            commands: container.resolve()?,
            container,
        })
    }

    /// Initial load. The session and the local projects load in parallel without events,
    /// then projects are linked and deduplicated and deployments fetched.
    pub async fn bootstrap(&self) -> Result<()> {
        self.logger.info("Bootstrapping");

        let (session, local) = tokio::join!(
            self.auth.load_session_on_bootstrap(),
            self.local_projects.load_local_projects_without_events(),
        );
        session?;
        if let Err(e) = local {
            self.logger.error(format!("Failed to load local projects: {e}"));
        }

        self.linked_projects.link_local_projects_on_bootstrap().await?;
        self.projects.load_projects_on_bootstrap();
        self.status_bar.set_initial_display_state();

        if let Err(e) = self.deployments.load_deployments().await {
            self.logger.warn(format!("Initial deployments load failed: {e}"));
        }
        self.status_bar.refresh().await;

        self.context_keys.set(ContextId::IsReady, true).await?;
        info!(
            component = self.logger.component(),
            local = self.local_projects.projects().len(),
            linked = self.linked_projects.projects().len(),
            deployments = self.deployments.deployments().len(),
            "Ready"
        );

        self.auth.check_still_valid().await?;
        Ok(())
    }

    /// Tear down every component: listeners, watchers and timers stop. Requests in flight
    /// are left to finish.
    pub fn shutdown(&self) {
        self.logger.info("Shutting down");
        self.container.dispose();
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn settings(&self) -> &Arc<SettingsState> {
        &self.settings
    }

    pub fn context_keys(&self) -> &Arc<ContextKeys> {
        &self.context_keys
    }

    pub fn auth(&self) -> &Arc<AuthenticationState> {
        &self.auth
    }

    pub fn workspace(&self) -> &Arc<HostWorkspace> {
        &self.workspace
    }

    pub fn folders(&self) -> &Arc<FoldersState> {
        &self.folders
    }

    pub fn local_projects(&self) -> &Arc<LocalProjectsState> {
        &self.local_projects
    }

    pub fn linked_projects(&self) -> &Arc<LinkedProjectsState> {
        &self.linked_projects
    }

    pub fn projects(&self) -> &Arc<RemoteProjectsState> {
        &self.projects
    }

    pub fn filters(&self) -> &Arc<DeploymentFiltersState> {
        &self.filters
    }

    pub fn deployments(&self) -> &Arc<DeploymentsState> {
        &self.deployments
    }

    pub fn content(&self) -> &Arc<DeploymentContentState> {
        &self.content
    }

    pub fn status_bar(&self) -> &Arc<StatusBar> {
        &self.status_bar
    }

    pub fn decorations(&self) -> &Arc<FileDecorations> {
        &self.decorations
    }

    pub fn commands(&self) -> &Arc<Commands> {
        &self.commands
    }
}
