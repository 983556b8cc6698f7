//! Boundary with the host: workspace folders, session, persisted state, context flags,
//! user messages and live settings.

pub mod auth;
pub mod context_keys;
pub mod notifier;
pub mod settings;
pub mod workspace;
pub mod workspace_state;

pub use auth::{AuthenticationState, Session};
pub use context_keys::{ContextId, ContextKeys};
pub use notifier::{LogNotifier, Notifier};
pub use settings::{SettingsEvent, SettingsState};
pub use workspace::{HostWorkspace, WorkspaceFolder};
pub use workspace_state::WorkspaceState;

/// Names of the value bindings the composition root provides.
pub mod tokens {
    /// `MirrorConfig`
    pub const CONFIG: &str = "config";
    /// `Vec<PathBuf>` of workspace root folders
    pub const WORKSPACE_FOLDERS: &str = "workspace_folders";
    /// `Arc<WorkspaceState>`
    pub const WORKSPACE_STATE: &str = "workspace_state";
    /// `Arc<dyn RemoteApi>`
    pub const REMOTE_API: &str = "remote_api";
    /// `Arc<dyn Notifier>`
    pub const NOTIFIER: &str = "notifier";
    /// `Option<Session>` restored at bootstrap
    pub const STORED_SESSION: &str = "stored_session";
}