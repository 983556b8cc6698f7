//! Local projects discovered below the workspace folders.
//!
//! Every mutation of the project list runs on the "local-projects" [`TaskQueue`], so
//! folder changes, watcher events and exclude reloads apply one at a time in arrival
//! order.

use crate::caches::file_watchers::{
    FileChangeType, FileWatchers, WatchedFileEvent, WatchedPattern,
};
use crate::caches::folders::{FoldersDelta, FoldersState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{ContextId, ContextKeys, SettingsEvent, SettingsState, WorkspaceFolder};
use crate::models::local_project::{LocalProject, ProjectDescriptor, project_root_of_descriptor_dir};
use globset::GlobSet;
use ignore::WalkBuilder;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::diff::{diff_by_key, unique_by_key};
use mirror_core::logger::Logger;
use mirror_core::paths::{normalize_path, stable_path_hash, to_slash};
use mirror_core::queue::TaskQueue;
use mirror_core::settle::settle_all;
use mirror_core::{MirrorError, Result};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, trace, warn};

/// Projects added, removed or replaced by one mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalProjectsDelta {
    pub added: Vec<LocalProject>,
    pub removed: Vec<LocalProject>,
    pub changed: Vec<LocalProject>,
}

impl LocalProjectsDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocalProjectsEvent {
    WillChange,
    DidChange(LocalProjectsDelta),
}

pub struct LocalProjectsState {
    logger: Logger,
    folders: Arc<FoldersState>,
    settings: Arc<SettingsState>,
    context_keys: Arc<ContextKeys>,
    projects: RwLock<Vec<LocalProject>>,
    queue: TaskQueue,
    changes: EventChannel<LocalProjectsEvent>,
    subscriptions: Subscriptions,
}

impl LocalProjectsState {
    pub fn projects(&self) -> Vec<LocalProject> {
        self.projects.read().clone()
    }

    /// The project rooted exactly at `root`.
    pub fn project_at(&self, root: &Path) -> Option<LocalProject> {
        let id = stable_path_hash(root);
        self.projects.read().iter().find(|project| project.id == id).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LocalProjectsEvent> {
        self.changes.subscribe()
    }

    /// Tasks waiting on the mutation queue, the running one included.
    pub fn pending_tasks(&self) -> usize {
        self.queue.pending()
    }

    /// Discover every project below the current folders and replace the list without
    /// emitting events.
    pub fn load_local_projects_without_events(
        self: &Arc<Self>,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let this = self.clone();
        self.queue.enqueue(async move {
            let projects = this.discover(this.folders.folders()).await;
            debug!(
                component = this.logger.component(),
                count = projects.len(),
                "Loaded local projects"
            );
            *this.projects.write() = projects;
            this.update_context_key().await;
            Ok(())
        })
    }

    /// Rediscover every project and report the difference by id.
    pub fn reload(self: &Arc<Self>) -> impl Future<Output = Result<LocalProjectsDelta>> + Send + 'static {
        let this = self.clone();
        self.queue.enqueue(async move {
            let new = this.discover(this.folders.folders()).await;
            let diff = {
                let mut projects = this.projects.write();
                let diff = diff_by_key(&projects, &new, |project| project.id.clone());
                *projects = new;
                diff
            };

            let delta = diff
                .map(|diff| LocalProjectsDelta {
                    added: diff.added,
                    removed: diff.removed,
                    changed: Vec::new(),
                })
                .unwrap_or_default();
            this.did_change(delta.clone()).await;
            Ok(delta)
        })
    }

    /// Queue a watcher event. Resolves to whether the event changed the list; a create
    /// for a known or excluded root, a create without a readable descriptor and a change
    /// or delete for an unknown root are ignored.
    pub fn enqueue_watched_file_event(
        self: &Arc<Self>,
        event: WatchedFileEvent,
    ) -> impl Future<Output = Result<bool>> + Send + 'static {
        let this = self.clone();
        self.queue
            .enqueue(async move { this.apply_watched_file_event(event).await })
    }

    fn enqueue_folders_changed(
        self: &Arc<Self>,
        delta: FoldersDelta,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let this = self.clone();
        self.queue.enqueue(async move {
            let discovered = this.discover(delta.added).await;
            let removed_folders: HashSet<PathBuf> =
                delta.removed.into_iter().map(|folder| folder.path).collect();

            let delta = {
                let mut projects = this.projects.write();
                let (removed, kept): (Vec<_>, Vec<_>) = projects
                    .drain(..)
                    .partition(|project| removed_folders.contains(&project.folder.path));
                *projects = kept;

                let added: Vec<LocalProject> = discovered
                    .into_iter()
                    .filter(|project| !projects.iter().any(|known| known.id == project.id))
                    .collect();
                projects.extend(added.iter().cloned());

                LocalProjectsDelta {
                    added,
                    removed,
                    changed: Vec::new(),
                }
            };
            this.did_change(delta).await;
            Ok(())
        })
    }

    async fn apply_watched_file_event(&self, event: WatchedFileEvent) -> Result<bool> {
        let descriptor_dir = match event.pattern {
            WatchedPattern::ProjectDescriptor => event.path.parent(),
            WatchedPattern::DescriptorDirectory => Some(event.path.as_path()),
        };
        let Some(root) = descriptor_dir.and_then(project_root_of_descriptor_dir) else {
            return Ok(false);
        };
        let Some(folder) = self.folders.get_parent_folder(&root) else {
            return Ok(false);
        };

        let id = stable_path_hash(&root);
        let known = self.projects.read().iter().any(|project| project.id == id);
        let accepted = match event.kind {
            FileChangeType::Created => !known,
            FileChangeType::Changed | FileChangeType::Deleted => known,
        };
        if !accepted {
            trace!(
                component = self.logger.component(),
                kind = ?event.kind,
                root = %root.display(),
                "Ignoring watcher event"
            );
            return Ok(false);
        }
        if event.kind == FileChangeType::Created
            && is_excluded(&self.settings.exclude_set(), &folder.path, &root)
        {
            debug!(
                component = self.logger.component(),
                root = %root.display(),
                "Root is excluded, not adding it"
            );
            return Ok(false);
        }

        let descriptor = match ProjectDescriptor::read(&root).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.logger.warn(format!("Skipping project: {e}"));
                None
            }
        };

        let mut delta = LocalProjectsDelta::default();
        match (event.kind, descriptor) {
            (FileChangeType::Created, Some(descriptor)) => {
                let project = LocalProject::new(&root, folder, descriptor);
                self.projects.write().push(project.clone());
                delta.added.push(project);
            }
            (FileChangeType::Created, None) => {}
            (FileChangeType::Changed | FileChangeType::Deleted, Some(descriptor)) => {
                let project = LocalProject::new(&root, folder, descriptor);
                let mut projects = self.projects.write();
                if let Some(existing) = projects.iter_mut().find(|existing| existing.id == id) {
                    *existing = project.clone();
                }
                delta.changed.push(project);
            }
            (FileChangeType::Changed | FileChangeType::Deleted, None) => {
                let mut projects = self.projects.write();
                if let Some(index) = projects.iter().position(|existing| existing.id == id) {
                    delta.removed.push(projects.remove(index));
                }
            }
        }

        let changed = !delta.is_empty();
        self.did_change(delta).await;
        Ok(changed)
    }

    /// Announce a mutation. Empty deltas are not announced.
    async fn did_change(&self, delta: LocalProjectsDelta) {
        if delta.is_empty() {
            return;
        }
        debug!(
            component = self.logger.component(),
            added = delta.added.len(),
            removed = delta.removed.len(),
            changed = delta.changed.len(),
            "Local projects changed"
        );
        self.changes.emit(LocalProjectsEvent::WillChange);
        self.changes.emit(LocalProjectsEvent::DidChange(delta));
        self.update_context_key().await;
    }

    async fn update_context_key(&self) {
        let empty = self.projects.read().is_empty();
        if let Err(e) = self.context_keys.set(ContextId::NoProjectsFound, empty).await {
            self.logger.warn(format!("Failed to update context key: {e}"));
        }
    }

    /// Read the descriptors below `folders`. Unreadable or invalid descriptors are
    /// logged and skipped.
    async fn discover(&self, folders: Vec<WorkspaceFolder>) -> Vec<LocalProject> {
        let exclude = self.settings.exclude_set();
        let max_projects = self.settings.max_projects_per_folder();
        let mut projects = Vec::new();

        for folder in folders {
            let search_path = folder.path.clone();
            let search_exclude = exclude.clone();
            let roots = match tokio::task::spawn_blocking(move || {
                find_project_roots(&search_path, &search_exclude, max_projects)
            })
            .await
            {
                Ok(roots) => roots,
                Err(e) => {
                    error!(
                        component = self.logger.component(),
                        folder = %folder.path.display(),
                        "Failed to search folder: {e}"
                    );
                    continue;
                }
            };

            if roots.len() >= max_projects {
                warn!(
                    component = self.logger.component(),
                    folder = %folder.path.display(),
                    max_projects,
                    "Stopped searching after the project limit"
                );
            }

            let (loaded, errors) = settle_all(roots.into_iter().map(|root| {
                let folder = folder.clone();
                async move {
                    let descriptor = ProjectDescriptor::read(&root).await?;
                    Ok::<_, MirrorError>(
                        descriptor.map(|descriptor| LocalProject::new(&root, folder, descriptor)),
                    )
                }
            }))
            .await;

            for error in errors {
                self.logger.warn(format!("Skipping project: {error}"));
            }
            projects.extend(loaded.into_iter().flatten());
        }

        unique_by_key(projects, |project| project.id.clone())
    }
}

/// Whether `path` or one of its ancestors below `folder` matches an exclude pattern.
pub fn is_excluded(exclude: &GlobSet, folder: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(folder) else {
        return false;
    };
    relative
        .ancestors()
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .any(|ancestor| exclude.is_match(to_slash(ancestor)))
}

/// Roots of the projects below `folder`, sorted, at most `max_projects` of them.
/// Blocking; run it off the async workers.
pub fn find_project_roots(folder: &Path, exclude: &GlobSet, max_projects: usize) -> Vec<PathBuf> {
    let filter_folder = folder.to_path_buf();
    let filter_exclude = exclude.clone();

    let walker = WalkBuilder::new(folder)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .filter_entry(move |entry| !is_excluded(&filter_exclude, &filter_folder, entry.path()))
        .build();

    let mut roots = Vec::new();
    for entry in walker.flatten() {
        let is_file = entry.file_type().is_some_and(|file_type| file_type.is_file());
        if !is_file || WatchedPattern::classify(entry.path()) != Some(WatchedPattern::ProjectDescriptor) {
            continue;
        }
        if let Some(root) = entry.path().parent().and_then(project_root_of_descriptor_dir) {
            roots.push(normalize_path(root));
        }
        if roots.len() >= max_projects {
            break;
        }
    }

    roots.sort();
    roots
}

impl Injectable for LocalProjectsState {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<FoldersState>(),
            Token::of::<FileWatchers>(),
            Token::of::<SettingsState>(),
            Token::of::<ContextKeys>(),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let folders: Arc<FoldersState> = deps.next()?;
        let watchers: Arc<FileWatchers> = deps.next()?;
        let settings: Arc<SettingsState> = deps.next()?;
        let context_keys: Arc<ContextKeys> = deps.next()?;

        let folder_changes = folders.subscribe();
        let settings_changes = settings.subscribe();

        let state = Arc::new(Self {
            logger: Logger::new("LocalProjects"),
            folders,
            settings,
            context_keys,
            projects: RwLock::new(Vec::new()),
            queue: TaskQueue::new("local-projects"),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        state.subscriptions.push(spawn_listener(
            &state,
            folder_changes,
            "LocalProjects",
            |state, delta| async move {
                if let Err(e) = state.enqueue_folders_changed(delta).await {
                    state.logger.error(format!("Failed to apply folder change: {e}"));
                }
            },
        ));
        state.subscriptions.push(spawn_listener(
            &state,
            watchers.subscribe(),
            "LocalProjects",
            |state, event| async move {
                if let Err(e) = state.enqueue_watched_file_event(event).await {
                    state.logger.error(format!("Failed to apply file event: {e}"));
                }
            },
        ));
        state.subscriptions.push(spawn_listener(
            &state,
            settings_changes,
            "LocalProjects",
            |state, event| async move {
                if event != SettingsEvent::FilesExcludeChanged {
                    return;
                }
                if let Err(e) = state.reload().await {
                    state.logger.error(format!("Failed to reload after exclude change: {e}"));
                }
            },
        ));
        Ok(state)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for LocalProjectsState {
    fn dispose(&self) {
        self.subscriptions.abort_all();
        self.queue.close();
    }
}
