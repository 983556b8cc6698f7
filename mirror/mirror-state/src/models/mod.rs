//! Domain entities held by the caches.

pub mod deployment;
pub mod filters;
pub mod linked_project;
pub mod local_project;
pub mod remote_project;
pub mod vcs;

pub use deployment::Deployment;
pub use filters::{DeploymentFilters, FILTERABLE_STATES};
pub use linked_project::LinkedProject;
pub use local_project::{DESCRIPTOR_DIR, DESCRIPTOR_FILE, ENV_FILE, LocalProject, ProjectDescriptor};
pub use remote_project::RemoteProject;
pub use vcs::{GitBranch, GitCommit, GitProvider, GitRepo, VcsInfo};