//! Workspace root folders as reported by the host.

use crate::events::EventChannel;
use crate::host::tokens;
use mirror_core::Result;
use mirror_core::container::{Dependencies, Injectable, Token};
use mirror_core::paths::normalize_path;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;

/// A root folder opened in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkspaceFolder {
    pub path: PathBuf,
    pub name: String,
}

impl WorkspaceFolder {
    /// Folder at `path`, normalized. The name is the last path component.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = normalize_path(path);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }
}

/// Raw folder list of the host, overlaps included.
pub struct HostWorkspace {
    folders: RwLock<Vec<WorkspaceFolder>>,
    changes: EventChannel<()>,
}

impl HostWorkspace {
    pub fn new(folders: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            folders: RwLock::new(folders.into_iter().map(WorkspaceFolder::new).collect()),
            changes: EventChannel::new(),
        }
    }

    pub fn folders(&self) -> Vec<WorkspaceFolder> {
        self.folders.read().clone()
    }

    /// Replace the folder list and notify subscribers.
    pub fn set_folders(&self, folders: impl IntoIterator<Item = PathBuf>) {
        *self.folders.write() = folders.into_iter().map(WorkspaceFolder::new).collect();
        self.changes.emit(());
    }

    pub fn add_folder(&self, folder: impl AsRef<Path>) {
        self.folders.write().push(WorkspaceFolder::new(folder));
        self.changes.emit(());
    }

    pub fn remove_folder(&self, folder: impl AsRef<Path>) {
        let folder = normalize_path(folder);
        self.folders.write().retain(|f| f.path != folder);
        self.changes.emit(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }
}

impl Injectable for HostWorkspace {
    fn dependencies() -> Vec<Token> {
        vec![Token::named(tokens::WORKSPACE_FOLDERS)]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let folders: Vec<PathBuf> = deps.next_value()?;
        Ok(Arc::new(Self::new(folders)))
    }
}

