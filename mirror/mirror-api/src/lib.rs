//! Mirror API - client for the remote project/deployment API.
//!
//! The state layer only depends on the [`RemoteApi`] trait; [`HttpApiClient`] is the
//! production implementation.

pub mod client;
pub mod error;
pub mod models;
pub mod validation;

pub use client::{ApiAuth, ApiClientConfig, HttpApiClient, QueryParams, RemoteApi};
pub use error::{ApiError, Result};
pub use models::{
    Check, CheckConclusion, CheckStatus, DeploymentEvent, DeploymentMeta, DeploymentState,
    DeploymentTarget, Environment, FileNode, LatestDeployment, PlainDeployment, PlainProject,
    ProjectAlias, ProjectLink, Team, User,
};
