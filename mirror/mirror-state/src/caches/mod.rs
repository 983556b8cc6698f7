//! Caches of local and remote state, in dependency order.
//!
//! ```text
//! HostWorkspace -> Folders -> FileWatchers -> LocalProjects -> LinkedProjects
//!     -> RemoteProjects -> Deployments (+ DeploymentFilters) -> DeploymentContent
//! ```
//!
//! Each cache owns its collection and only changes it in reaction to the events of the
//! caches upstream of it or to direct calls from commands.

pub mod content;
pub mod deployments;
pub mod file_watchers;
pub mod filters;
pub mod folders;
pub mod linked_projects;
pub mod local_projects;
pub mod projects;

pub use content::{ContentEvent, DeploymentContentState, FileContent, GetFileOptions, ReadDirectoryOptions};
pub use deployments::{DeploymentsEvent, DeploymentsState};
pub use file_watchers::{FileChangeType, FileWatchers, WatchedFileEvent, WatchedPattern};
pub use filters::DeploymentFiltersState;
pub use folders::{FoldersDelta, FoldersState};
pub use linked_projects::{LinkedProjectsEvent, LinkedProjectsState};
pub use local_projects::{LocalProjectsDelta, LocalProjectsEvent, LocalProjectsState};
pub use projects::{RemoteProjectsDelta, RemoteProjectsState};
