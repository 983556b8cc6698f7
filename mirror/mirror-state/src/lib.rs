//! Mirror State - reactive caches mirroring the remote project/deployment API.
//!
//! This crate provides:
//! - Domain models: local, linked and remote projects, deployments, filters
//! - The host boundary: workspace folders, session, persisted state, context keys
//! - The cache graph, from workspace folders down to the selected deployment's files
//! - Projections for the status bar and file decorations
//! - Command entry points and the [`MirrorApp`] composition root

pub mod app;
pub mod caches;
pub mod commands;
pub mod events;
pub mod host;
pub mod models;
pub mod projections;

pub use app::{MirrorApp, MirrorAppOptions};
pub use commands::Commands;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::{MirrorApp, MirrorAppOptions};
    pub use crate::caches::{
        ContentEvent, DeploymentContentState, DeploymentFiltersState, DeploymentsEvent,
        DeploymentsState, FileWatchers, FoldersState, GetFileOptions, LinkedProjectsEvent,
        LinkedProjectsState, LocalProjectsEvent, LocalProjectsState, ReadDirectoryOptions,
        RemoteProjectsState,
    };
    pub use crate::commands::Commands;
    pub use crate::events::EventChannel;
    pub use crate::host::{
        AuthenticationState, ContextId, ContextKeys, HostWorkspace, LogNotifier, Notifier,
        Session, SettingsState, WorkspaceState,
    };
    pub use crate::models::{
        Deployment, DeploymentFilters, LinkedProject, LocalProject, ProjectDescriptor,
        RemoteProject,
    };
    pub use crate::projections::{FileDecorations, StatusBar, StatusBarView};
    pub use mirror_core::{MirrorError, Result};
}
