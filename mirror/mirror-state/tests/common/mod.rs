//! Shared fixtures: a scriptable in-memory API, a recording notifier and project trees
//! on disk.

#![allow(dead_code)]

use async_trait::async_trait;
use mirror_api::{
    ApiAuth, ApiError, Check, DeploymentEvent, Environment, FileNode, PlainDeployment,
    PlainProject, QueryParams, RemoteApi, Team, User,
};
use mirror_core::config::MirrorConfig;
use mirror_state::host::{Notifier, Session};
use mirror_state::models::ProjectDescriptor;
use mirror_state::{MirrorApp, MirrorAppOptions};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

type ApiResult<T> = mirror_api::Result<T>;

pub const TEAM: &str = "team_1";

/// In-memory [`RemoteApi`]. Every call is counted by method name.
#[derive(Default)]
pub struct FakeApi {
    projects: Mutex<HashMap<String, PlainProject>>,
    deployments: Mutex<Vec<(String, PlainDeployment)>>,
    events: Mutex<HashMap<String, Vec<DeploymentEvent>>>,
    files: Mutex<HashMap<(String, String), Vec<u8>>>,
    envs: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<(&'static str, String)>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_project(&self, id: &str, name: &str) {
        self.projects.lock().insert(id.to_string(), project(id, name));
    }

    /// Later lookups of the project answer 404.
    pub fn remove_project(&self, id: &str) {
        self.projects.lock().remove(id);
    }

    pub fn add_deployment(&self, project_id: &str, uid: &str, state: &str, created_at: i64) {
        self.deployments
            .lock()
            .push((project_id.to_string(), deployment(uid, state, created_at)));
    }

    pub fn set_deployment_state(&self, uid: &str, state: &str) {
        for (_, deployment) in self.deployments.lock().iter_mut() {
            if deployment.uid == uid {
                deployment.state = state.parse().ok();
            }
        }
    }

    pub fn set_events(&self, uid: &str, lines: &[(i64, &str)]) {
        let events = lines
            .iter()
            .map(|(created, text)| DeploymentEvent {
                kind: "stdout".to_string(),
                created: *created,
                text: Some(text.to_string()),
            })
            .collect();
        self.events.lock().insert(uid.to_string(), events);
    }

    pub fn set_file(&self, uid: &str, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .insert((uid.to_string(), path.to_string()), bytes.to_vec());
    }

    pub fn set_env(&self, key: &str, value: &str) {
        self.envs.lock().insert(key.to_string(), value.to_string());
    }

    /// Calls of `method` about `id` fail with a server error.
    pub fn fail(&self, method: &'static str, id: &str) {
        self.failing.lock().insert((method, id.to_string()));
    }

    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }

    fn record(&self, method: &'static str, id: &str) -> ApiResult<()> {
        *self.calls.lock().entry(method).or_default() += 1;
        if self.failing.lock().contains(&(method, id.to_string())) {
            return Err(ApiError::http(500, format!("{method} failed for {id}")));
        }
        Ok(())
    }

    fn find_deployment(&self, uid: &str) -> ApiResult<PlainDeployment> {
        self.deployments
            .lock()
            .iter()
            .find(|(_, deployment)| deployment.uid == uid)
            .map(|(_, deployment)| deployment.clone())
            .ok_or_else(|| ApiError::http(404, format!("Deployment {uid} not found")))
    }

    fn find_file(&self, uid: &str, path: &str) -> ApiResult<Vec<u8>> {
        self.files
            .lock()
            .get(&(uid.to_string(), path.to_string()))
            .cloned()
            .ok_or_else(|| ApiError::http(404, format!("File {path} not found")))
    }
}

#[async_trait]
impl RemoteApi for FakeApi {
    async fn get_user(&self, _auth: &ApiAuth) -> ApiResult<User> {
        self.record("get_user", "")?;
        Ok(User {
            id: "user_1".to_string(),
            username: "ada".to_string(),
            default_team_id: Some(TEAM.to_string()),
        })
    }

    async fn list_teams(&self, _auth: &ApiAuth) -> ApiResult<Vec<Team>> {
        self.record("list_teams", "")?;
        Ok(vec![Team {
            id: TEAM.to_string(),
            name: "Team".to_string(),
        }])
    }

    async fn list_projects(&self, _auth: &ApiAuth) -> ApiResult<Vec<PlainProject>> {
        self.record("list_projects", "")?;
        Ok(self.projects.lock().values().cloned().collect())
    }

    async fn get_project_by_name_or_id(&self, id_or_name: &str, _auth: &ApiAuth) -> ApiResult<PlainProject> {
        self.record("get_project_by_name_or_id", id_or_name)?;
        self.projects
            .lock()
            .values()
            .find(|project| project.id == id_or_name || project.name == id_or_name)
            .cloned()
            .ok_or_else(|| ApiError::http(404, format!("Project {id_or_name} not found")))
    }

    async fn list_deployments_by_project_id(
        &self,
        project_id: &str,
        _query: &QueryParams,
        _auth: &ApiAuth,
    ) -> ApiResult<Vec<PlainDeployment>> {
        self.record("list_deployments_by_project_id", project_id)?;
        Ok(self
            .deployments
            .lock()
            .iter()
            .filter(|(owner, _)| owner == project_id)
            .map(|(_, deployment)| deployment.clone())
            .collect())
    }

    async fn get_deployment_by_id(&self, deployment_id: &str, _auth: &ApiAuth) -> ApiResult<PlainDeployment> {
        self.record("get_deployment_by_id", deployment_id)?;
        self.find_deployment(deployment_id)
    }

    async fn get_deployment_events(&self, deployment_id: &str, _auth: &ApiAuth) -> ApiResult<Vec<DeploymentEvent>> {
        self.record("get_deployment_events", deployment_id)?;
        Ok(self
            .events
            .lock()
            .get(deployment_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_deployment_file_tree(
        &self,
        deployment_url: &str,
        _base: &str,
        _auth: &ApiAuth,
    ) -> ApiResult<Vec<FileNode>> {
        self.record("get_deployment_file_tree", deployment_url)?;
        Ok(vec![FileNode::Directory {
            name: "static".to_string(),
        }])
    }

    async fn get_deployment_file_content(&self, deployment_id: &str, path: &str, _auth: &ApiAuth) -> ApiResult<Vec<u8>> {
        self.record("get_deployment_file_content", deployment_id)?;
        self.find_file(deployment_id, path)
    }

    async fn get_deployment_file_content_v6(
        &self,
        deployment_id: &str,
        path: &str,
        _auth: &ApiAuth,
    ) -> ApiResult<Vec<u8>> {
        self.record("get_deployment_file_content_v6", deployment_id)?;
        self.find_file(deployment_id, path)
    }

    async fn list_deployment_checks(&self, deployment_id: &str, _auth: &ApiAuth) -> ApiResult<Vec<Check>> {
        self.record("list_deployment_checks", deployment_id)?;
        Ok(Vec::new())
    }

    async fn pull_project_envs(
        &self,
        project_id: &str,
        _environment: Environment,
        _auth: &ApiAuth,
    ) -> ApiResult<BTreeMap<String, String>> {
        self.record("pull_project_envs", project_id)?;
        Ok(self.envs.lock().clone())
    }
}

pub fn project(id: &str, name: &str) -> PlainProject {
    serde_json::from_value(json!({
        "id": id,
        "name": name,
        "createdAt": 0,
        "accountId": TEAM,
    }))
    .unwrap()
}

pub fn deployment(uid: &str, state: &str, created_at: i64) -> PlainDeployment {
    serde_json::from_value(json!({
        "uid": uid,
        "name": uid,
        "createdAt": created_at,
        "url": format!("{uid}.example.app"),
        "state": state,
        "target": "production",
    }))
    .unwrap()
}

/// Notifier that keeps every message.
#[derive(Default)]
pub struct RecordingNotifier {
    pub errors: Mutex<Vec<String>>,
    pub infos: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn show_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }

    fn show_info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }
}

/// Write `.vercel/project.json` below `root`.
pub fn write_descriptor(root: &Path, project_id: &str) {
    std::fs::create_dir_all(root).unwrap();
    let descriptor = ProjectDescriptor::new(project_id, TEAM);
    std::fs::create_dir_all(root.join(".vercel")).unwrap();
    std::fs::write(
        ProjectDescriptor::path_in(root),
        serde_json::to_vec(&descriptor).unwrap(),
    )
    .unwrap();
}

pub fn descriptor_path(root: &Path) -> PathBuf {
    ProjectDescriptor::path_in(root)
}

/// Configuration without background polling.
pub fn quiet_config() -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.deployments.auto_refresh = false;
    config.checks.auto_refresh = false;
    config.logs.auto_refresh = false;
    config
}

pub fn session() -> Session {
    Session::new("token").with_team(TEAM)
}

pub struct Fixture {
    pub app: MirrorApp,
    pub api: Arc<FakeApi>,
    pub notifier: Arc<RecordingNotifier>,
}

/// App over `folders`, signed in unless `session` is `None`. Not bootstrapped.
pub fn app(folders: &[&Path], api: Arc<FakeApi>, session: Option<Session>) -> Fixture {
    let notifier = Arc::new(RecordingNotifier::default());
    let options = MirrorAppOptions::new(quiet_config(), api.clone())
        .with_folders(folders.iter().map(|folder| folder.to_path_buf()))
        .with_session(session)
        .with_notifier(notifier.clone());
    Fixture {
        app: MirrorApp::new(options).unwrap(),
        api,
        notifier,
    }
}

/// Wait for the first event matching `predicate`.
pub async fn wait_for<E: Clone>(receiver: &mut broadcast::Receiver<E>, predicate: impl Fn(&E) -> bool) -> E {
    within(async {
        loop {
            match receiver.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("channel closed"),
            }
        }
    })
    .await
}

pub async fn within<T>(future: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}
