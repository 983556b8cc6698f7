//! Local projects joined with their remote projects.

use crate::caches::local_projects::{LocalProjectsDelta, LocalProjectsEvent, LocalProjectsState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{AuthenticationState, ContextId, ContextKeys, Session, tokens};
use crate::models::{LinkedProject, LocalProject, RemoteProject};
use mirror_api::RemoteApi;
use mirror_core::Result;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::diff::unique_by_key;
use mirror_core::loading::LoadingState;
use mirror_core::logger::Logger;
use mirror_core::settle::settle_all;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// `(projectId, orgId)` of a descriptor.
pub type ProjectKey = (String, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedProjectsEvent {
    WillChange,
    DidChange,
}

pub struct LinkedProjectsState {
    logger: Logger,
    local: Arc<LocalProjectsState>,
    auth: Arc<AuthenticationState>,
    api: Arc<dyn RemoteApi>,
    context_keys: Arc<ContextKeys>,
    projects: RwLock<Vec<LinkedProject>>,
    loading: LoadingState,
    changes: EventChannel<LinkedProjectsEvent>,
    subscriptions: Subscriptions,
}

impl LinkedProjectsState {
    /// The linked projects. Empty as soon as the session is gone, before the listener
    /// clears the list.
    pub fn projects(&self) -> Vec<LinkedProject> {
        if !self.auth.is_authenticated() {
            return Vec::new();
        }
        self.projects.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LinkedProjectsEvent> {
        self.changes.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.loading.is_loading()
    }

    /// Resolves once no load is in flight.
    pub async fn loading_finished(&self) {
        self.loading.idle().await;
    }

    /// Link the already loaded local projects. Emits nothing; a load already in flight
    /// makes this a no-op.
    pub async fn link_local_projects_on_bootstrap(&self) -> Result<()> {
        let Some(_guard) = self.loading.try_begin() else {
            self.logger.debug("Load in flight, skipping bootstrap link");
            return Ok(());
        };
        self.link_all().await;
        Ok(())
    }

    /// Rediscover local projects and link all of them. A load already in flight makes
    /// this a no-op; use [`Self::reload_after_current`] to force a fresh cycle.
    pub async fn reload_local_projects_and_link_them(&self) -> Result<()> {
        let Some(_guard) = self.loading.try_begin() else {
            self.logger.debug("Load in flight, skipping reload");
            return Ok(());
        };
        self.reload().await
    }

    /// Wait for the load in flight, then run a fresh reload.
    pub async fn reload_after_current(&self) -> Result<()> {
        let _guard = self.loading.begin().await;
        self.reload().await
    }

    async fn reload(&self) -> Result<()> {
        self.changes.emit(LinkedProjectsEvent::WillChange);
        let loaded = self.local.load_local_projects_without_events().await;
        if let Err(e) = &loaded {
            self.logger.error(format!("Failed to load local projects: {e}"));
        }
        self.link_all().await;
        self.did_change().await;
        loaded
    }

    async fn link_all(&self) {
        let locals = self.local.projects();
        let linked = match self.auth.current_session() {
            Some(session) => {
                let resolved = self.resolve(&session, &locals).await;
                link_projects(&locals, &resolved)
            }
            None => Vec::new(),
        };
        // Signed out while the lookups ran.
        let linked = if self.auth.is_authenticated() { linked } else { Vec::new() };
        debug!(
            component = self.logger.component(),
            linked = linked.len(),
            local = locals.len(),
            "Linked local projects"
        );
        *self.projects.write() = linked;
    }

    async fn apply_delta(&self, delta: LocalProjectsDelta) {
        let _guard = self.loading.begin().await;

        let Some(session) = self.auth.current_session() else {
            self.did_change().await;
            return;
        };

        let lookups: Vec<LocalProject> = delta
            .added
            .iter()
            .chain(delta.changed.iter())
            .cloned()
            .collect();
        let resolved = self.resolve(&session, &lookups).await;
        if self.auth.is_authenticated() {
            apply_local_delta(&mut self.projects.write(), &delta, &resolved);
        }
        self.did_change().await;
    }

    async fn handle_session_changed(&self, session: Option<Session>) {
        if session.is_none() {
            self.projects.write().clear();
            self.did_change().await;
            return;
        }

        let _guard = self.loading.begin().await;
        self.changes.emit(LinkedProjectsEvent::WillChange);
        self.link_all().await;
        self.did_change().await;
    }

    /// Look up every distinct descriptor once. Failed lookups are logged and left out.
    async fn resolve(
        &self,
        session: &Session,
        locals: &[LocalProject],
    ) -> HashMap<ProjectKey, RemoteProject> {
        let keys = unique_by_key(locals.iter().map(project_key), |key| key.clone());

        let (found, failed) = settle_all(keys.into_iter().map(|key| async move {
            let auth = session.auth_for_team(Some(key.1.as_str()));
            let found = self.api.get_project_by_name_or_id(&key.0, &auth).await;
            match found {
                Ok(project) => Ok((key, RemoteProject::new(project))),
                Err(e) => Err((key, e)),
            }
        }))
        .await;

        for ((project_id, _), error) in failed {
            self.logger.batch_error("project", &project_id, error);
        }
        found.into_iter().collect()
    }

    async fn did_change(&self) {
        self.changes.emit(LinkedProjectsEvent::DidChange);
        let not_linked = self.projects.read().len() < self.local.projects().len();
        if let Err(e) = self
            .context_keys
            .set(ContextId::SomeProjectsNotLinked, not_linked)
            .await
        {
            self.logger.warn(format!("Failed to update context key: {e}"));
        }
    }
}

pub fn project_key(project: &LocalProject) -> ProjectKey {
    (
        project.descriptor.project_id.clone(),
        project.descriptor.org_id.clone(),
    )
}

/// Link each local project whose descriptor was resolved, in local order.
pub fn link_projects(
    locals: &[LocalProject],
    resolved: &HashMap<ProjectKey, RemoteProject>,
) -> Vec<LinkedProject> {
    locals
        .iter()
        .filter_map(|local| {
            resolved
                .get(&project_key(local))
                .map(|remote| LinkedProject::new(local.clone(), remote.clone()))
        })
        .collect()
}

/// Apply a local projects delta to `linked`. Added and changed projects are upserted
/// by local id when resolved; a changed project that no longer resolves is removed.
pub fn apply_local_delta(
    linked: &mut Vec<LinkedProject>,
    delta: &LocalProjectsDelta,
    resolved: &HashMap<ProjectKey, RemoteProject>,
) {
    linked.retain(|link| !delta.removed.iter().any(|removed| removed.id == link.local.id));

    for local in delta.added.iter().chain(delta.changed.iter()) {
        let position = linked.iter().position(|link| link.local.id == local.id);
        match (resolved.get(&project_key(local)), position) {
            (Some(remote), Some(index)) => {
                linked[index] = LinkedProject::new(local.clone(), remote.clone());
            }
            (Some(remote), None) => linked.push(LinkedProject::new(local.clone(), remote.clone())),
            (None, Some(index)) => {
                linked.remove(index);
            }
            (None, None) => {}
        }
    }
}

impl Injectable for LinkedProjectsState {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<LocalProjectsState>(),
            Token::of::<AuthenticationState>(),
            Token::named(tokens::REMOTE_API),
            Token::of::<ContextKeys>(),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let local: Arc<LocalProjectsState> = deps.next()?;
        let auth: Arc<AuthenticationState> = deps.next()?;
        let local_changes = local.subscribe();
        let session_changes = auth.subscribe();

        let state = Arc::new(Self {
            logger: Logger::new("LinkedProjects"),
            local,
            auth,
            api: deps.next_value()?,
            context_keys: deps.next()?,
            projects: RwLock::new(Vec::new()),
            loading: LoadingState::new(),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        state.subscriptions.push(spawn_listener(
            &state,
            local_changes,
            "LinkedProjects",
            |state, event| async move {
                match event {
                    LocalProjectsEvent::WillChange => {
                        state.changes.emit(LinkedProjectsEvent::WillChange)
                    }
                    LocalProjectsEvent::DidChange(delta) => state.apply_delta(delta).await,
                }
            },
        ));
        state.subscriptions.push(spawn_listener(
            &state,
            session_changes,
            "LinkedProjects",
            |state, session| async move { state.handle_session_changed(session).await },
        ));
        Ok(state)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for LinkedProjectsState {
    fn dispose(&self) {
        self.subscriptions.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::WorkspaceFolder;
    use crate::models::ProjectDescriptor;
    use mirror_api::PlainProject;
    use proptest::prelude::*;

    fn local(root: &str, project_id: &str) -> LocalProject {
        LocalProject::new(
            root,
            WorkspaceFolder::new("/work"),
            ProjectDescriptor::new(project_id, "team_1"),
        )
    }

    fn remote(id: &str) -> RemoteProject {
        RemoteProject::new(PlainProject {
            id: id.to_string(),
            name: id.to_string(),
            account_id: "team_1".to_string(),
            created_at: 0,
            updated_at: None,
            link: None,
            alias: Vec::new(),
            latest_deployments: Vec::new(),
        })
    }

    fn resolved(ids: &[&str]) -> HashMap<ProjectKey, RemoteProject> {
        ids.iter()
            .map(|id| ((id.to_string(), "team_1".to_string()), remote(id)))
            .collect()
    }

    #[test]
    fn test_changed_project_that_no_longer_resolves_is_removed() {
        let l1 = local("/work/a", "r1");
        let mut linked = vec![LinkedProject::new(l1.clone(), remote("r1"))];
        let delta = LocalProjectsDelta {
            changed: vec![l1],
            ..Default::default()
        };
        apply_local_delta(&mut linked, &delta, &HashMap::new());
        assert!(linked.is_empty());
    }

    #[test]
    fn test_changed_project_updates_in_place() {
        let l1 = local("/work/a", "r1");
        let l2 = local("/work/b", "r2");
        let mut linked = vec![
            LinkedProject::new(l1.clone(), remote("r1")),
            LinkedProject::new(l2, remote("r2")),
        ];
        let moved = local("/work/a", "r3");
        let delta = LocalProjectsDelta {
            changed: vec![moved],
            ..Default::default()
        };
        apply_local_delta(&mut linked, &delta, &resolved(&["r3"]));
        assert_eq!(linked[0].local.id, l1.id);
        assert_eq!(linked[0].remote.id, "r3");
        assert_eq!(linked.len(), 2);
    }

    #[test]
    fn test_link_projects_shares_remote() {
        let locals = vec![local("/work/a", "r1"), local("/work/b", "r1"), local("/work/c", "gone")];
        let linked = link_projects(&locals, &resolved(&["r1"]));
        assert_eq!(linked.len(), 2);
        assert!(linked.iter().all(|link| link.remote.id == "r1"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, usize),
        Change(usize, usize),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..5usize, 0..3usize).prop_map(|(root, remote)| Op::Add(root, remote)),
            (0..5usize, 0..3usize).prop_map(|(root, remote)| Op::Change(root, remote)),
            (0..5usize).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_never_duplicates_local_ids(ops in proptest::collection::vec(op(), 1..40)) {
            // Remote "r2" never resolves.
            let resolved = resolved(&["r0", "r1"]);
            let mut linked = Vec::new();

            for op in ops {
                let delta = match op {
                    Op::Add(root, r) => LocalProjectsDelta {
                        added: vec![local(&format!("/work/{root}"), &format!("r{r}"))],
                        ..Default::default()
                    },
                    Op::Change(root, r) => LocalProjectsDelta {
                        changed: vec![local(&format!("/work/{root}"), &format!("r{r}"))],
                        ..Default::default()
                    },
                    Op::Remove(root) => LocalProjectsDelta {
                        removed: vec![local(&format!("/work/{root}"), "r0")],
                        ..Default::default()
                    },
                };
                apply_local_delta(&mut linked, &delta, &resolved);

                let mut ids: Vec<_> = linked.iter().map(|link: &LinkedProject| link.local.id.clone()).collect();
                let before = ids.len();
                ids.sort();
                ids.dedup();
                prop_assert_eq!(ids.len(), before);
                prop_assert!(linked.iter().all(|link| link.remote.id != "r2"));
            }
        }
    }
}
