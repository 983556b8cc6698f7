//! Source-control details parsed from deployment metadata.

use mirror_api::DeploymentMeta;
use std::fmt;

const NO_COMMIT_MESSAGE: &str = "No commit message";
const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitProvider {
    Github,
    Gitlab,
    Bitbucket,
}

impl GitProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Bitbucket => "bitbucket",
        }
    }
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepo {
    pub org: String,
    pub repo: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitBranch {
    pub name: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCommit {
    pub sha: String,
    pub message: String,
    pub author_name: String,
    pub url: Option<String>,
}

/// Everything known about the commit a deployment was built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsInfo {
    pub provider: Option<GitProvider>,
    pub repo: Option<GitRepo>,
    pub branch: Option<GitBranch>,
    pub commit: Option<GitCommit>,
}

struct ProviderKeys {
    provider: GitProvider,
    marker: &'static str,
    commit_ref: &'static str,
    commit_sha: &'static str,
    commit_message: &'static str,
    commit_author: &'static str,
    tree_segment: &'static str,
    commit_segment: &'static str,
}

const GITHUB: ProviderKeys = ProviderKeys {
    provider: GitProvider::Github,
    marker: "githubDeployment",
    commit_ref: "githubCommitRef",
    commit_sha: "githubCommitSha",
    commit_message: "githubCommitMessage",
    commit_author: "githubCommitAuthorName",
    tree_segment: "tree",
    commit_segment: "commit",
};

const GITLAB: ProviderKeys = ProviderKeys {
    provider: GitProvider::Gitlab,
    marker: "gitlabDeployment",
    commit_ref: "gitlabCommitRef",
    commit_sha: "gitlabCommitSha",
    commit_message: "gitlabCommitMessage",
    commit_author: "gitlabCommitAuthorName",
    tree_segment: "-/tree",
    commit_segment: "-/commit",
};

/// Parse VCS details. Returns `None` for empty metadata.
pub fn parse_deployment_meta(meta: &DeploymentMeta) -> Option<VcsInfo> {
    if meta.is_empty() {
        return None;
    }

    let mut info = VcsInfo::default();

    if meta.contains(GITHUB.marker) {
        let repo = match (meta.get_str("githubOrg"), meta.get_str("githubRepo")) {
            (Some(org), Some(repo)) => Some(GitRepo {
                org: org.to_string(),
                repo: repo.to_string(),
                url: format!("https://github.com/{org}/{repo}"),
            }),
            _ => None,
        };
        info = parse_commit(meta, &GITHUB, repo);
    }

    if meta.contains(GITLAB.marker) {
        let repo = match (
            meta.get_str("gitlabProjectNamespace"),
            meta.get_str("gitlabProjectRepo"),
        ) {
            (Some(org), Some(repo)) => Some(GitRepo {
                org: org.to_string(),
                repo: repo.to_string(),
                url: format!(
                    "https://gitlab.com/{}",
                    meta.get_str("gitlabProjectPath").unwrap_or_default()
                ),
            }),
            _ => None,
        };
        info = parse_commit(meta, &GITLAB, repo);
    }

    if meta.contains("bitbucketDeployment") {
        info.provider = Some(GitProvider::Bitbucket);
    }

    Some(info)
}

fn parse_commit(meta: &DeploymentMeta, keys: &ProviderKeys, repo: Option<GitRepo>) -> VcsInfo {
    let link = |segment: &str, target: &str| {
        repo.as_ref()
            .map(|repo| format!("{}/{segment}/{target}", repo.url))
    };

    let branch = meta.get_str(keys.commit_ref).map(|name| GitBranch {
        name: name.to_string(),
        url: link(keys.tree_segment, name),
    });

    let commit = meta.get_str(keys.commit_sha).map(|sha| GitCommit {
        sha: sha.to_string(),
        message: meta
            .get_str(keys.commit_message)
            .unwrap_or(NO_COMMIT_MESSAGE)
            .to_string(),
        author_name: meta
            .get_str(keys.commit_author)
            .unwrap_or(UNKNOWN_AUTHOR)
            .to_string(),
        url: link(keys.commit_segment, sha),
    });

    VcsInfo {
        provider: Some(keys.provider),
        repo,
        branch,
        commit,
    }
}
