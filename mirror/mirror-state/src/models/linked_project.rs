use crate::models::local_project::LocalProject;
use crate::models::remote_project::RemoteProject;

/// A local project joined with the remote project its descriptor points at.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedProject {
    pub local: LocalProject,
    pub remote: RemoteProject,
}

impl LinkedProject {
    pub fn new(local: LocalProject, remote: RemoteProject) -> Self {
        Self { local, remote }
    }
}