//! Remote projects of the workspace, one entry per remote id.

use crate::caches::linked_projects::{LinkedProjectsEvent, LinkedProjectsState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{AuthenticationState, tokens};
use crate::models::{LinkedProject, RemoteProject};
use mirror_api::RemoteApi;
use mirror_core::Result;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::diff::{Diff, diff_by_key, unique_by_key};
use mirror_core::logger::Logger;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Remote projects that appeared or disappeared.
pub type RemoteProjectsDelta = Diff<RemoteProject>;

pub struct RemoteProjectsState {
    logger: Logger,
    linked: Arc<LinkedProjectsState>,
    auth: Arc<AuthenticationState>,
    api: Arc<dyn RemoteApi>,
    projects: RwLock<Vec<RemoteProject>>,
    changes: EventChannel<RemoteProjectsDelta>,
    subscriptions: Subscriptions,
}

impl RemoteProjectsState {
    pub fn projects(&self) -> Vec<RemoteProject> {
        self.projects.read().clone()
    }

    pub fn get(&self, id: &str) -> Option<RemoteProject> {
        self.projects.read().iter().find(|project| project.id == id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RemoteProjectsDelta> {
        self.changes.subscribe()
    }

    /// Take the linked projects as they are, without emitting.
    pub fn load_projects_on_bootstrap(&self) {
        let projects = dedup_remote_projects(&self.linked.projects());
        debug!(component = self.logger.component(), count = projects.len(), "Loaded remote projects");
        *self.projects.write() = projects;
    }

    /// The cached project, or a fresh lookup for a project outside the workspace.
    /// `Ok(None)` when signed out or when the project does not exist.
    pub async fn get_project_or_fetch(
        &self,
        id: &str,
        team_id: Option<&str>,
    ) -> Result<Option<RemoteProject>> {
        if let Some(project) = self.get(id) {
            return Ok(Some(project));
        }
        let Some(session) = self.auth.current_session() else {
            return Ok(None);
        };

        match self
            .api
            .get_project_by_name_or_id(id, &session.auth_for_team(team_id))
            .await
        {
            Ok(project) => Ok(Some(RemoteProject::new(project))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn refresh(&self) {
        let new = dedup_remote_projects(&self.linked.projects());
        let diff = {
            let mut projects = self.projects.write();
            let diff = diff_by_key(&projects, &new, |project| project.id.clone());
            *projects = new;
            diff
        };

        if let Some(diff) = diff {
            debug!(
                component = self.logger.component(),
                added = diff.added.len(),
                removed = diff.removed.len(),
                "Remote projects changed"
            );
            self.changes.emit(diff);
        }
    }
}

/// Distinct remote projects of `linked`, in first-seen order.
pub fn dedup_remote_projects(linked: &[LinkedProject]) -> Vec<RemoteProject> {
    unique_by_key(
        linked.iter().map(|link| link.remote.clone()),
        |project| project.id.clone(),
    )
}

impl Injectable for RemoteProjectsState {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<LinkedProjectsState>(),
            Token::of::<AuthenticationState>(),
            Token::named(tokens::REMOTE_API),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let linked: Arc<LinkedProjectsState> = deps.next()?;
        let linked_changes = linked.subscribe();

        let state = Arc::new(Self {
            logger: Logger::new("RemoteProjects"),
            linked,
            auth: deps.next()?,
            api: deps.next_value()?,
            projects: RwLock::new(Vec::new()),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        state.subscriptions.push(spawn_listener(
            &state,
            linked_changes,
            "RemoteProjects",
            |state, event| async move {
                if event == LinkedProjectsEvent::DidChange {
                    state.refresh();
                }
            },
        ));
        Ok(state)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for RemoteProjectsState {
    fn dispose(&self) {
        self.subscriptions.abort_all();
    }
}
