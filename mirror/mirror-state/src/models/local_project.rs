//! Local projects: workspace directories linked to a remote project through a
//! descriptor file at `.vercel/project.json`.

use crate::host::WorkspaceFolder;
use mirror_core::paths::{normalize_path, stable_path_hash};
use mirror_core::{MirrorError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the descriptor, relative to a project root.
pub const DESCRIPTOR_DIR: &str = ".vercel";
/// Descriptor file name inside [`DESCRIPTOR_DIR`].
pub const DESCRIPTOR_FILE: &str = "project.json";
/// File written by the pull-envs command, relative to a project root.
pub const ENV_FILE: &str = ".env.local";

/// Contents of `.vercel/project.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDescriptor {
    pub project_id: String,
    pub org_id: String,
}

impl ProjectDescriptor {
    pub fn new(project_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            org_id: org_id.into(),
        }
    }

    /// Location of the descriptor for the project rooted at `root`.
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(DESCRIPTOR_DIR).join(DESCRIPTOR_FILE)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let descriptor: Self = serde_json::from_slice(bytes)
            .map_err(|e| MirrorError::invalid_input(format!("Invalid project descriptor: {e}")))?;
        if descriptor.project_id.is_empty() {
            return Err(MirrorError::invalid_input(
                "Invalid project descriptor: empty projectId",
            ));
        }
        Ok(descriptor)
    }

    /// Read the descriptor of the project at `root`. A missing file is `Ok(None)`.
    pub async fn read(root: &Path) -> Result<Option<Self>> {
        let path = Self::path_in(root);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Self::parse(&bytes)
                .map(Some)
                .map_err(|e| MirrorError::invalid_input(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(root: &Path) -> bool {
        tokio::fs::try_exists(Self::path_in(root))
            .await
            .unwrap_or(false)
    }

    /// Write the descriptor below `root`, creating `.vercel` when needed.
    pub async fn write(&self, root: &Path) -> Result<()> {
        let path = Self::path_in(root);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, serde_json::to_vec(self)?).await?;
        Ok(())
    }
}

/// A directory in the workspace recognized as a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalProject {
    /// Stable hash of the normalized root path.
    pub id: String,
    pub root: PathBuf,
    pub folder: WorkspaceFolder,
    pub descriptor: ProjectDescriptor,
}

impl LocalProject {
    pub fn new(root: impl AsRef<Path>, folder: WorkspaceFolder, descriptor: ProjectDescriptor) -> Self {
        let root = normalize_path(root);
        Self {
            id: stable_path_hash(&root),
            root,
            folder,
            descriptor,
        }
    }

    /// Root path relative to its workspace folder.
    pub fn relative_root(&self) -> &Path {
        self.root.strip_prefix(&self.folder.path).unwrap_or(&self.root)
    }
}

/// Project root owning a watched descriptor path: the parent of the `.vercel` directory.
pub fn project_root_of_descriptor_dir(descriptor_dir: &Path) -> Option<PathBuf> {
    descriptor_dir.parent().map(normalize_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_id_is_stable_across_spellings() {
        let folder = WorkspaceFolder::new("/work");
        let descriptor = ProjectDescriptor::new("prj_1", "team_1");
        let a = LocalProject::new("/work/app", folder.clone(), descriptor.clone());
        let b = LocalProject::new("/work/./app/", folder, descriptor);
        assert_eq!(a.id, b.id);
        assert_eq!(a.relative_root(), Path::new("app"));
    }

    #[test]
    fn test_parse_rejects_incomplete_descriptors() {
        assert!(ProjectDescriptor::parse(br#"{"projectId":"prj_1","orgId":"team_1"}"#).is_ok());
        assert!(ProjectDescriptor::parse(br#"{"projectId":"prj_1"}"#).is_err());
        assert!(ProjectDescriptor::parse(br#"{"projectId":1,"orgId":"team_1"}"#).is_err());
        assert!(ProjectDescriptor::parse(br#"{"projectId":"","orgId":"team_1"}"#).is_err());
        assert!(ProjectDescriptor::parse(b"not json").is_err());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectDescriptor::read(dir.path()).await.unwrap().is_none());

        let descriptor = ProjectDescriptor::new("prj_1", "team_1");
        descriptor.write(dir.path()).await.unwrap();
        assert!(ProjectDescriptor::exists(dir.path()).await);
        assert_eq!(
            ProjectDescriptor::read(dir.path()).await.unwrap(),
            Some(descriptor)
        );
    }
}