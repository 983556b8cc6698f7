//! Build logs, output files and checks of the selected deployment.
//!
//! Only one deployment is selected at a time. Selecting another one drops everything
//! memoized for the previous one.

use crate::caches::deployments::{DeploymentsEvent, DeploymentsState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{AuthenticationState, ContextId, ContextKeys, SettingsEvent, SettingsState, tokens};
use crate::models::Deployment;
use chrono::{DateTime, Local};
use mirror_api::{Check, DeploymentEvent, FileNode, RemoteApi};
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::logger::Logger;
use mirror_core::{MirrorError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Version hint selecting the legacy binary file endpoint.
pub const API_VERSION_V6: &str = "v6";

#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    SelectedDeploymentChanged(Option<Deployment>),
    ChecksChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetFileOptions {
    pub team_id: String,
    pub project_id: String,
    pub deployment_id: String,
    pub file_path: String,
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadDirectoryOptions {
    pub team_id: String,
    pub project_id: String,
    pub deployment_id: String,
    pub path: String,
}

/// Rendered file bytes with their timestamps in epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub bytes: Vec<u8>,
    pub size: usize,
    pub ctime: i64,
    pub mtime: i64,
}

impl FileContent {
    pub fn new(bytes: Vec<u8>, ctime: i64, mtime: i64) -> Self {
        Self {
            size: bytes.len(),
            bytes,
            ctime,
            mtime,
        }
    }
}

pub struct DeploymentContentState {
    logger: Logger,
    deployments: Arc<DeploymentsState>,
    auth: Arc<AuthenticationState>,
    api: Arc<dyn RemoteApi>,
    settings: Arc<SettingsState>,
    context_keys: Arc<ContextKeys>,
    selected: RwLock<Option<Deployment>>,
    files: RwLock<HashMap<String, FileContent>>,
    directories: RwLock<HashMap<String, Vec<FileNode>>>,
    checks: RwLock<Option<Vec<Check>>>,
    changes: EventChannel<ContentEvent>,
    subscriptions: Subscriptions,
    checks_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl DeploymentContentState {
    pub fn selected_deployment(&self) -> Option<Deployment> {
        self.selected.read().clone()
    }

    /// Checks of the selected deployment, `None` until loaded.
    pub fn checks(&self) -> Option<Vec<Check>> {
        self.checks.read().clone()
    }

    pub fn cached_file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContentEvent> {
        self.changes.subscribe()
    }

    /// Select the deployment shown in detail. Switching to another deployment drops the
    /// memoized files and checks and loads checks in the background.
    pub async fn set_selected_deployment(self: &Arc<Self>, deployment: Option<Deployment>) -> Result<()> {
        let switched = {
            let mut selected = self.selected.write();
            let switched = selected.as_ref().map(|d| &d.id) != deployment.as_ref().map(|d| &d.id);
            *selected = deployment.clone();
            switched
        };

        if switched {
            self.files.write().clear();
            self.directories.write().clear();
            *self.checks.write() = None;
            self.changes
                .emit(ContentEvent::SelectedDeploymentChanged(deployment.clone()));
            self.spawn_checks_load();
        }

        match &deployment {
            Some(deployment) => {
                self.context_keys
                    .set(ContextId::SelectedDeploymentForFiles, deployment.hash_path.as_str())
                    .await
            }
            None => {
                self.context_keys
                    .delete(ContextId::SelectedDeploymentForFiles)
                    .await
            }
        }
    }

    /// Contents of a deployment file. `<name>.log` at the root is the build log.
    /// `Ok(None)` when signed out.
    pub async fn get_file(&self, options: GetFileOptions) -> Result<Option<FileContent>> {
        let Some(session) = self.auth.current_session() else {
            return Ok(None);
        };
        let deployment = self.resolve_deployment(&options.deployment_id, &options.project_id, &options.team_id).await?;

        let key = cache_key(&deployment, &options.file_path);
        if let Some(content) = self.files.read().get(&key) {
            return Ok(Some(content.clone()));
        }

        let auth = session.auth_for_team(Some(options.team_id.as_str()));
        let (content, cacheable) = if is_log_file(&options.file_path) {
            let events = self.api.get_deployment_events(&deployment.id, &auth).await?;
            (render_log(&events, &deployment), deployment.is_terminal())
        } else {
            let path = options.file_path.trim_start_matches('/');
            let bytes = if options.api_version.as_deref() == Some(API_VERSION_V6) {
                self.api
                    .get_deployment_file_content_v6(&deployment.id, path, &auth)
                    .await?
            } else {
                self.api
                    .get_deployment_file_content(&deployment.id, path, &auth)
                    .await?
            };
            let (ctime, mtime) = default_times(&deployment);
            (FileContent::new(bytes, ctime, mtime), true)
        };

        if cacheable {
            self.files.write().insert(key, content.clone());
        }
        Ok(Some(content))
    }

    /// Output file tree of a deployment below `path`. Empty when signed out or when the
    /// deployment has no URL.
    pub async fn read_directory(&self, options: ReadDirectoryOptions) -> Result<Vec<FileNode>> {
        let Some(session) = self.auth.current_session() else {
            return Ok(Vec::new());
        };
        let deployment = self.resolve_deployment(&options.deployment_id, &options.project_id, &options.team_id).await?;

        let key = cache_key(&deployment, &options.path);
        if let Some(nodes) = self.directories.read().get(&key) {
            return Ok(nodes.clone());
        }
        let Some(url) = deployment.url() else {
            return Ok(Vec::new());
        };

        let auth = session.auth_for_team(Some(options.team_id.as_str()));
        let nodes = self
            .api
            .get_deployment_file_tree(url, &options.path, &auth)
            .await?;
        self.directories.write().insert(key, nodes.clone());
        Ok(nodes)
    }

    /// Fetch the checks of the selected deployment, unless they are known and can no
    /// longer change.
    pub async fn load_checks(&self) -> Result<()> {
        let Some(deployment) = self.selected_deployment() else {
            return Ok(());
        };
        if self.checks.read().is_some() && deployment.is_terminal() {
            return Ok(());
        }
        let Some(session) = self.auth.current_session() else {
            return Ok(());
        };

        let auth = session.auth_for_team(Some(deployment.project.team_id.as_str()));
        let checks = self.api.list_deployment_checks(&deployment.id, &auth).await?;

        // The selection may have moved on while fetching.
        if self.selected.read().as_ref().map(|d| &d.id) != Some(&deployment.id) {
            return Ok(());
        }
        *self.checks.write() = Some(checks);
        self.changes.emit(ContentEvent::ChecksChanged);
        Ok(())
    }

    fn spawn_checks_load(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if let Err(e) = state.load_checks().await {
                state.logger.debug(format!("Failed to load checks: {e}"));
            }
        });
    }

    async fn resolve_deployment(&self, id: &str, project_id: &str, team_id: &str) -> Result<Deployment> {
        self.deployments
            .get_deployment_or_fetch(id, project_id, Some(team_id))
            .await?
            .ok_or_else(|| MirrorError::not_found("deployment", id))
    }

    /// Take the fresh snapshot of the selected deployment after a deployments reload.
    async fn refresh_selected(&self) {
        let Some(selected) = self.selected_deployment() else {
            return;
        };
        match self
            .deployments
            .get_deployment_or_fetch(&selected.id, &selected.project.id, Some(selected.project.team_id.as_str()))
            .await
        {
            Ok(Some(fresh)) => {
                let mut current = self.selected.write();
                if current.as_ref().map(|d| &d.id) == Some(&fresh.id) {
                    *current = Some(fresh);
                }
            }
            Ok(None) => self.logger.debug(format!("Selected deployment {} is gone", selected.id)),
            Err(e) => self.logger.debug(format!("Failed to refresh selected deployment: {e}")),
        }

        if let Err(e) = self.load_checks().await {
            self.logger.debug(format!("Failed to load checks: {e}"));
        }
    }

    /// Restart the checks polling task from the current settings.
    pub fn restart_checks_refresh(self: &Arc<Self>) {
        let mut slot = self.checks_refresh.lock();
        if let Some(handle) = slot.take() {
            handle.abort();
        }

        let config = self.settings.checks();
        if !config.auto_refresh {
            return;
        }

        let period = Duration::from_secs(config.interval_secs);
        let weak = Arc::downgrade(self);
        *slot = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(state) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = state.load_checks().await {
                    state.logger.debug(format!("Background checks refresh failed: {e}"));
                }
            }
        }));
    }
}

fn cache_key(deployment: &Deployment, path: &str) -> String {
    format!("{}/{}", deployment.hash_path, path.trim_start_matches('/'))
}

/// Whether `path` names the build log: a `.log` file directly at the root.
pub fn is_log_file(path: &str) -> bool {
    let path = Path::new(path);
    let at_root = match path.parent() {
        None => true,
        Some(parent) => parent.as_os_str().is_empty() || parent == Path::new("/") || parent == Path::new("."),
    };
    at_root && path.extension().is_some_and(|ext| ext == "log")
}

/// ctime and mtime of a file whose fetch carried no timestamps.
fn default_times(deployment: &Deployment) -> (i64, i64) {
    let ctime = deployment.created_at();
    let mtime = deployment.data().booted_at.unwrap_or(ctime);
    (ctime, mtime)
}

/// Render build events as `HH:MM:SS.mmm text` lines with ANSI escapes removed. Events
/// without text get no line but still count for the timestamps.
pub fn render_log(events: &[DeploymentEvent], deployment: &Deployment) -> FileContent {
    let text = events
        .iter()
        .filter_map(|event| {
            let text = event.text.as_deref()?;
            Some(format!(
                "{} {}",
                format_timestamp(event.created),
                strip_ansi_escapes::strip_str(text)
            ))
        })
        .collect::<Vec<_>>()
        .join("\n");

    let (default_ctime, default_mtime) = default_times(deployment);
    let ctime = events.first().map_or(default_ctime, |event| event.created);
    let mtime = events.last().map_or(default_mtime, |event| event.created);
    FileContent::new(text.into_bytes(), ctime, mtime)
}

/// Local wall-clock time of an epoch-millisecond timestamp.
pub fn format_timestamp(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|time| time.with_timezone(&Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_default()
}

impl Injectable for DeploymentContentState {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<DeploymentsState>(),
            Token::of::<AuthenticationState>(),
            Token::named(tokens::REMOTE_API),
            Token::of::<SettingsState>(),
            Token::of::<ContextKeys>(),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let deployments: Arc<DeploymentsState> = deps.next()?;
        let deployment_changes = deployments.subscribe();

        let state = Arc::new(Self {
            logger: Logger::new("DeploymentContent"),
            deployments,
            auth: deps.next()?,
            api: deps.next_value()?,
            settings: deps.next()?,
            context_keys: deps.next()?,
            selected: RwLock::new(None),
            files: RwLock::new(HashMap::new()),
            directories: RwLock::new(HashMap::new()),
            checks: RwLock::new(None),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
            checks_refresh: Mutex::new(None),
        });
        let settings_changes = state.settings.subscribe();

        state.subscriptions.push(spawn_listener(
            &state,
            deployment_changes,
            "DeploymentContent",
            |state, event| async move {
                if event == DeploymentsEvent::DidChange {
                    state.refresh_selected().await;
                }
            },
        ));
        state.subscriptions.push(spawn_listener(
            &state,
            settings_changes,
            "DeploymentContent",
            |state, event| async move {
                if event == SettingsEvent::ChecksAutoRefreshChanged {
                    state.restart_checks_refresh();
                }
            },
        ));
        state.restart_checks_refresh();
        Ok(state)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for DeploymentContentState {
    fn dispose(&self) {
        self.subscriptions.abort_all();
        if let Some(handle) = self.checks_refresh.lock().take() {
            handle.abort();
        }
    }
}
