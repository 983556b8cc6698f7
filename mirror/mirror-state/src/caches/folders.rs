//! Workspace folders without overlaps.
//!
//! The host may open both `A` and `A/B` as separate folders. Only `A` is kept so that
//! every project is discovered and watched exactly once.

use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{HostWorkspace, WorkspaceFolder};
use mirror_core::Result;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::diff::{Diff, diff_by_key};
use mirror_core::logger::Logger;
use mirror_core::paths::is_within;
use parking_lot::RwLock;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Folders added to or removed from the workspace.
pub type FoldersDelta = Diff<WorkspaceFolder>;

pub struct FoldersState {
    logger: Logger,
    host: Arc<HostWorkspace>,
    folders: RwLock<Vec<WorkspaceFolder>>,
    changes: EventChannel<FoldersDelta>,
    subscriptions: Subscriptions,
}

impl FoldersState {
    pub fn folders(&self) -> Vec<WorkspaceFolder> {
        self.folders.read().clone()
    }

    /// The folder containing `path`, preferring the most specific one.
    pub fn get_parent_folder(&self, path: &Path) -> Option<WorkspaceFolder> {
        self.folders
            .read()
            .iter()
            .filter(|folder| is_within(path, &folder.path))
            .max_by_key(|folder| folder.path.components().count())
            .cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FoldersDelta> {
        self.changes.subscribe()
    }

    fn refresh(&self) {
        let new = without_overlaps(self.host.folders());
        let diff = {
            let mut folders = self.folders.write();
            let diff = diff_by_key(&folders, &new, |folder| folder.path.clone());
            *folders = new;
            diff
        };

        if let Some(diff) = diff {
            debug!(
                component = self.logger.component(),
                added = diff.added.len(),
                removed = diff.removed.len(),
                "Folders changed"
            );
            self.changes.emit(diff);
        }
    }
}

/// Drop duplicates and every folder lying inside another one, keeping host order.
pub fn without_overlaps(folders: Vec<WorkspaceFolder>) -> Vec<WorkspaceFolder> {
    let mut result: Vec<WorkspaceFolder> = Vec::with_capacity(folders.len());
    for folder in &folders {
        let nested = folders
            .iter()
            .any(|other| other.path != folder.path && is_within(&folder.path, &other.path));
        let duplicate = result.iter().any(|kept| kept.path == folder.path);
        if !nested && !duplicate {
            result.push(folder.clone());
        }
    }
    result
}

impl Injectable for FoldersState {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<HostWorkspace>()]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let host: Arc<HostWorkspace> = deps.next()?;
        let host_changes = host.subscribe();

        let state = Arc::new(Self {
            logger: Logger::new("Folders"),
            folders: RwLock::new(without_overlaps(host.folders())),
            host,
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        state.subscriptions.push(spawn_listener(
            &state,
            host_changes,
            "Folders",
            |state, ()| async move { state.refresh() },
        ));
        Ok(state)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for FoldersState {
    fn dispose(&self) {
        self.subscriptions.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folders(paths: &[&str]) -> Vec<WorkspaceFolder> {
        paths.iter().map(WorkspaceFolder::new).collect()
    }

    #[test]
    fn test_outermost_folder_wins() {
        let result = without_overlaps(folders(&["/work/a/b", "/work/a", "/work/c", "/work/a/"]));
        let paths: Vec<_> = result.iter().map(|f| f.path.to_string_lossy().into_owned()).collect();
        assert_eq!(paths, vec!["/work/a", "/work/c"]);
    }

    #[test]
    fn test_prefix_is_not_nesting() {
        let result = without_overlaps(folders(&["/work/app", "/work/app2"]));
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn test_folder_changes_emit_delta() {
        let host = Arc::new(HostWorkspace::new(vec!["/work/a".into()]));
        let container = mirror_core::container::Container::new();
        container
            .register_value(crate::host::tokens::WORKSPACE_FOLDERS, Vec::<std::path::PathBuf>::new())
            .unwrap();
        container.register::<HostWorkspace>().unwrap();
        container.register::<FoldersState>().unwrap();
        container.override_instance(host.clone()).unwrap();

        let state = container.resolve::<FoldersState>().unwrap();
        let mut changes = state.subscribe();
        assert!(state.get_parent_folder(Path::new("/work/a/app")).is_some());
        assert!(state.get_parent_folder(Path::new("/elsewhere")).is_none());

        host.set_folders(vec!["/work/a".into(), "/work/a/nested".into(), "/work/b".into()]);
        let delta = changes.recv().await.unwrap();
        assert_eq!(delta.added, folders(&["/work/b"]));
        assert!(delta.removed.is_empty());

        host.set_folders(vec!["/work/b".into()]);
        let delta = changes.recv().await.unwrap();
        assert_eq!(delta.removed, folders(&["/work/a"]));
    }
}