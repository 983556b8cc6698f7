//! Deployments of the workspace projects, filtered by the current filters.
//!
//! Every mutation runs on the "deployments" [`TaskQueue`]: project changes, filter
//! changes, explicit loads, single refreshes and the auto-refresh tick can all arrive
//! while a previous cycle is still fetching.

use crate::caches::filters::DeploymentFiltersState;
use crate::caches::projects::{RemoteProjectsDelta, RemoteProjectsState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{AuthenticationState, SettingsEvent, SettingsState, tokens};
use crate::models::{Deployment, RemoteProject};
use mirror_api::{DeploymentState, DeploymentTarget, RemoteApi};
use mirror_core::Result;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::loading::LoadingState;
use mirror_core::logger::Logger;
use mirror_core::queue::TaskQueue;
use mirror_core::settle::settle_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentsEvent {
    WillChange,
    DidChange,
}

pub struct DeploymentsState {
    logger: Logger,
    projects: Arc<RemoteProjectsState>,
    filters: Arc<DeploymentFiltersState>,
    auth: Arc<AuthenticationState>,
    api: Arc<dyn RemoteApi>,
    settings: Arc<SettingsState>,
    deployments: RwLock<Vec<Deployment>>,
    queue: TaskQueue,
    loading: LoadingState,
    changes: EventChannel<DeploymentsEvent>,
    subscriptions: Subscriptions,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl DeploymentsState {
    /// All deployments, newest first.
    pub fn deployments(&self) -> Vec<Deployment> {
        let mut deployments = self.deployments.read().clone();
        deployments.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        deployments
    }

    /// Deployments of one project, newest first.
    pub fn deployments_for_project(&self, project_id: &str) -> Vec<Deployment> {
        self.deployments()
            .into_iter()
            .filter(|deployment| deployment.project.id == project_id)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Deployment> {
        self.deployments
            .read()
            .iter()
            .find(|deployment| deployment.id == id)
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentsEvent> {
        self.changes.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    pub async fn loading_finished(&self) {
        self.loading.idle().await;
    }

    pub fn pending_tasks(&self) -> usize {
        self.queue.pending()
    }

    /// Per project, its newest production deployment that is ready.
    pub fn get_current_deployments(&self) -> Vec<Deployment> {
        self.per_project(|deployment| {
            deployment.target() == Some(DeploymentTarget::Production)
                && deployment.state() == Some(DeploymentState::Ready)
        })
    }

    /// Per project, its newest deployment, in project order.
    pub fn get_latest_deployments(&self) -> Vec<Deployment> {
        self.per_project(|_| true)
    }

    fn per_project(&self, predicate: impl Fn(&Deployment) -> bool) -> Vec<Deployment> {
        let deployments = self.deployments();
        self.projects
            .projects()
            .iter()
            .filter_map(|project| {
                deployments
                    .iter()
                    .find(|deployment| deployment.project.id == project.id && predicate(deployment))
                    .cloned()
            })
            .collect()
    }

    /// Fetch the deployments of every project.
    pub fn load_deployments(self: &Arc<Self>) -> impl Future<Output = Result<()>> + Send + 'static {
        self.enqueue_load(true)
    }

    /// Same as [`Self::load_deployments`] without the will-change event, for polling.
    pub fn load_deployments_in_background(
        self: &Arc<Self>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        self.enqueue_load(false)
    }

    fn enqueue_load(
        self: &Arc<Self>,
        announce: bool,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let this = self.clone();
        self.queue.enqueue(async move {
            let _guard = this.loading.begin().await;
            if announce {
                this.changes.emit(DeploymentsEvent::WillChange);
            }
            let deployments = this.fetch(this.projects.projects()).await;
            debug!(
                component = this.logger.component(),
                count = deployments.len(),
                "Loaded deployments"
            );
            *this.deployments.write() = deployments;
            this.retain_tracked_projects();
            this.changes.emit(DeploymentsEvent::DidChange);
            Ok(())
        })
    }

    /// Fetch one deployment again and replace it where it is. A deployment gone remotely
    /// is dropped. Resolves to the fresh deployment.
    pub fn refresh_deployment(
        self: &Arc<Self>,
        id: &str,
    ) -> impl Future<Output = Result<Option<Deployment>>> + Send + 'static {
        let this = self.clone();
        let id = id.to_string();
        self.queue.enqueue(async move {
            let Some(existing) = this.get(&id) else {
                return Ok(None);
            };
            let Some(session) = this.auth.current_session() else {
                return Ok(None);
            };

            let auth = session.auth_for_team(Some(existing.project.team_id.as_str()));
            let refreshed = match this.api.get_deployment_by_id(&id, &auth).await {
                Ok(data) => Some(Deployment::new(data, existing.project.clone())),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e.into()),
            };

            {
                let mut deployments = this.deployments.write();
                if let Some(index) = deployments.iter().position(|deployment| deployment.id == id) {
                    match &refreshed {
                        Some(deployment) => deployments[index] = deployment.clone(),
                        None => {
                            deployments.remove(index);
                        }
                    }
                }
            }
            this.changes.emit(DeploymentsEvent::DidChange);
            Ok(refreshed)
        })
    }

    /// The cached deployment, or a lookup of a deployment outside the tracked projects.
    /// `Ok(None)` when signed out or when the project or the deployment does not exist.
    pub async fn get_deployment_or_fetch(
        &self,
        id: &str,
        project_id: &str,
        team_id: Option<&str>,
    ) -> Result<Option<Deployment>> {
        if let Some(deployment) = self.get(id) {
            return Ok(Some(deployment));
        }
        let Some(session) = self.auth.current_session() else {
            return Ok(None);
        };
        let Some(project) = self.projects.get_project_or_fetch(project_id, team_id).await? else {
            return Ok(None);
        };

        let auth = session.auth_for_team(team_id.or(Some(project.team_id.as_str())));
        match self.api.get_deployment_by_id(id, &auth).await {
            Ok(data) => Ok(Some(Deployment::new(data, project))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn handle_projects_changed(
        self: &Arc<Self>,
        delta: RemoteProjectsDelta,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        // Removed projects lose their deployments before anything else runs.
        self.retain_tracked_projects();

        let this = self.clone();
        self.queue.enqueue(async move {
            let _guard = this.loading.begin().await;
            this.changes.emit(DeploymentsEvent::WillChange);
            let added = this.fetch(delta.added).await;
            {
                let mut deployments = this.deployments.write();
                deployments.retain(|deployment| !added.iter().any(|new| new.id == deployment.id));
                deployments.extend(added);
            }
            this.retain_tracked_projects();
            this.changes.emit(DeploymentsEvent::DidChange);
            Ok(())
        })
    }

    fn retain_tracked_projects(&self) {
        let tracked: HashSet<String> = self
            .projects
            .projects()
            .into_iter()
            .map(|project| project.id)
            .collect();
        self.deployments
            .write()
            .retain(|deployment| tracked.contains(&deployment.project.id));
    }

    /// Fetch the deployment lists of `projects` with the current filters. A failing
    /// project is logged and contributes nothing.
    async fn fetch(&self, projects: Vec<RemoteProject>) -> Vec<Deployment> {
        let Some(session) = self.auth.current_session() else {
            return Vec::new();
        };
        let params = self.filters.search_params();

        let (lists, failed) = settle_all(projects.into_iter().map(|project| {
            let session = &session;
            let params = &params;
            async move {
                let auth = session.auth_for_team(Some(project.team_id.as_str()));
                let listed = self
                    .api
                    .list_deployments_by_project_id(&project.id, params, &auth)
                    .await;
                match listed {
                    Ok(list) => Ok(list
                        .into_iter()
                        .map(|data| Deployment::new(data, project.clone()))
                        .collect::<Vec<_>>()),
                    Err(e) => Err((project.id, e)),
                }
            }
        }))
        .await;

        for (project_id, error) in failed {
            self.logger.batch_error("project", &project_id, error);
        }
        lists.into_iter().flatten().collect()
    }

    /// Restart the polling task from the current settings.
    pub fn restart_auto_refresh(self: &Arc<Self>) {
        let mut slot = self.auto_refresh.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let config = self.settings.deployments();
        if !config.auto_refresh {
            return;
        }

        let period = Duration::from_secs(config.auto_refresh_period_secs);
        let weak = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(state) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = state.load_deployments_in_background().await {
                    state.logger.debug(format!("Background refresh failed: {e}"));
                }
            }
        }));
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.auto_refresh.lock().is_some()
    }
}

impl Injectable for DeploymentsState {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<RemoteProjectsState>(),
            Token::of::<DeploymentFiltersState>(),
            Token::of::<AuthenticationState>(),
            Token::named(tokens::REMOTE_API),
            Token::of::<SettingsState>(),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let projects: Arc<RemoteProjectsState> = deps.next()?;
        let filters: Arc<DeploymentFiltersState> = deps.next()?;
        let project_changes = projects.subscribe();
        let filter_changes = filters.subscribe();

        let state = Arc::new(Self {
            logger: Logger::new("Deployments"),
            projects,
            filters,
            auth: deps.next()?,
            api: deps.next_value()?,
            settings: deps.next()?,
            deployments: RwLock::new(Vec::new()),
            queue: TaskQueue::new("deployments"),
            loading: LoadingState::new(),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
            auto_refresh: Mutex::new(None),
        });
        let settings_changes = state.settings.subscribe();

        state.subscriptions.push(spawn_listener(
            &state,
            project_changes,
            "Deployments",
            |state, delta| async move {
                if let Err(e) = state.handle_projects_changed(delta).await {
                    state.logger.error(format!("Failed to apply project change: {e}"));
                }
            },
        ));
        state.subscriptions.push(spawn_listener(
            &state,
            filter_changes,
            "Deployments",
            |state, _filters| async move {
                if let Err(e) = state.load_deployments().await {
                    state.logger.error(format!("Failed to reload after filter change: {e}"));
                }
            },
        ));
        state.subscriptions.push(spawn_listener(
            &state,
            settings_changes,
            "Deployments",
            |state, event| async move {
                if event == SettingsEvent::DeploymentsAutoRefreshChanged {
                    state.restart_auto_refresh();
                }
            },
        ));
        state.restart_auto_refresh();
        Ok(state)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for DeploymentsState {
    fn dispose(&self) {
        self.subscriptions.abort_all();
        if let Some(handle) = self.auto_refresh.lock().take() {
            handle.abort();
        }
        self.queue.close();
    }
}
