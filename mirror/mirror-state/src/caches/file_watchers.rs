//! Filesystem watchers for project descriptors.
//!
//! One recursive watcher per workspace folder reports changes to `.vercel/project.json`
//! files and `.vercel` directories as [`WatchedFileEvent`]s on a single channel.

use crate::caches::folders::{FoldersDelta, FoldersState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::WorkspaceFolder;
use crate::models::local_project::{DESCRIPTOR_DIR, DESCRIPTOR_FILE};
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::logger::Logger;
use mirror_core::{MirrorError, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileChangeType {
    Created,
    Changed,
    Deleted,
}

/// Which of the watched patterns a path matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchedPattern {
    /// `**/.vercel/project.json`
    ProjectDescriptor,
    /// `**/.vercel`
    DescriptorDirectory,
}

impl WatchedPattern {
    pub fn classify(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?;
        if file_name == DESCRIPTOR_FILE
            && path
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|dir| dir == DESCRIPTOR_DIR)
        {
            Some(Self::ProjectDescriptor)
        } else if file_name == DESCRIPTOR_DIR {
            Some(Self::DescriptorDirectory)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedFileEvent {
    pub kind: FileChangeType,
    pub pattern: WatchedPattern,
    pub path: PathBuf,
}

impl WatchedFileEvent {
    /// Event for `path`, or `None` when it matches no watched pattern.
    pub fn new(kind: FileChangeType, path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let pattern = WatchedPattern::classify(&path)?;
        Some(Self { kind, pattern, path })
    }
}

/// Translate a raw notify event into watched-file events.
pub fn convert_event(event: &Event) -> Vec<WatchedFileEvent> {
    let kinds: Vec<(FileChangeType, &PathBuf)> = match event.kind {
        EventKind::Create(_) => event.paths.iter().map(|p| (FileChangeType::Created, p)).collect(),
        EventKind::Remove(_) => event.paths.iter().map(|p| (FileChangeType::Deleted, p)).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().map(|p| (FileChangeType::Deleted, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().map(|p| (FileChangeType::Created, p)).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.iter();
            paths
                .next()
                .map(|from| (FileChangeType::Deleted, from))
                .into_iter()
                .chain(paths.map(|to| (FileChangeType::Created, to)))
                .collect()
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => event.paths.iter().map(|p| (FileChangeType::Changed, p)).collect(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    };

    kinds
        .into_iter()
        .filter_map(|(kind, path)| WatchedFileEvent::new(kind, path.clone()))
        .collect()
}

pub struct FileWatchers {
    logger: Logger,
    watchers: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
    changes: EventChannel<WatchedFileEvent>,
    subscriptions: Subscriptions,
}

impl FileWatchers {
    pub fn subscribe(&self) -> broadcast::Receiver<WatchedFileEvent> {
        self.changes.subscribe()
    }

    /// Publish an event as if a watcher had reported it.
    pub fn publish(&self, event: WatchedFileEvent) {
        self.changes.emit(event);
    }

    pub fn watched_folders(&self) -> Vec<PathBuf> {
        let mut folders: Vec<PathBuf> = self.watchers.lock().keys().cloned().collect();
        folders.sort();
        folders
    }

    fn watch_folder(&self, folder: &WorkspaceFolder) {
        let mut watchers = self.watchers.lock();
        if watchers.contains_key(&folder.path) {
            return;
        }

        match self.create_watcher(&folder.path) {
            Ok(watcher) => {
                debug!(component = self.logger.component(), folder = %folder.path.display(), "Watching");
                watchers.insert(folder.path.clone(), watcher);
            }
            Err(e) => self.logger.warn(format!("{e}")),
        }
    }

    fn create_watcher(&self, path: &Path) -> Result<RecommendedWatcher> {
        let changes = self.changes.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                for file_event in convert_event(&event) {
                    changes.emit(file_event);
                }
            }
        })
        .map_err(|e| MirrorError::watcher(format!("Failed to create watcher: {e}")))?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| MirrorError::watcher(format!("Failed to watch {}: {e}", path.display())))?;

        Ok(watcher)
    }

    fn update_when_folders_changed(&self, delta: FoldersDelta) {
        {
            let mut watchers = self.watchers.lock();
            for folder in &delta.removed {
                if watchers.remove(&folder.path).is_some() {
                    debug!(
                        component = self.logger.component(),
                        folder = %folder.path.display(),
                        "Stopped watching"
                    );
                }
            }
        }
        for folder in &delta.added {
            self.watch_folder(folder);
        }
    }
}

impl Injectable for FileWatchers {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<FoldersState>()]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let folders: Arc<FoldersState> = deps.next()?;

        let watchers = Arc::new(Self {
            logger: Logger::new("FileWatchers"),
            watchers: Mutex::new(HashMap::new()),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        for folder in folders.folders() {
            watchers.watch_folder(&folder);
        }

        watchers.subscriptions.push(spawn_listener(
            &watchers,
            folders.subscribe(),
            "FileWatchers",
            |watchers, delta| async move { watchers.update_when_folders_changed(delta) },
        ));
        Ok(watchers)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for FileWatchers {
    fn dispose(&self) {
        self.subscriptions.abort_all();
        self.watchers.lock().clear();
    }
}
