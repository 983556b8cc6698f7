//! Error types for the mirror system.

/// Result type alias for mirror operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Main error type shared by the mirror crates.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// A token was resolved that was never registered with the container
    #[error("Attempted to resolve unregistered dependency token \"{0}\"")]
    UnregisteredDependency(String),

    /// A token was resolved while it was still being constructed
    #[error("Attempted to construct a circular dependency \"{0}\"")]
    CircularDependency(String),

    /// A binding was resolved as a type it does not hold
    #[error("Dependency \"{token}\" is not of type {expected}")]
    TypeMismatch { token: String, expected: String },

    /// A token was registered twice
    #[error("Dependency \"{0}\" is already registered")]
    AlreadyRegistered(String),

    /// Remote API errors
    #[error("API error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// An operation needed a signed-in session
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// The task queue worker is gone
    #[error("Task queue \"{0}\" is closed")]
    QueueClosed(String),

    /// File watcher errors
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MirrorError {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a new unauthenticated error
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    /// Create a new watcher error
    pub fn watcher(msg: impl Into<String>) -> Self {
        Self::Watcher(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a not found error, including a 404 from the remote API
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Api { status: Some(404), .. })
    }

    /// Check if the remote API refused the credentials (403)
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Api { status: Some(403), .. })
    }

    /// Check if this error comes from wiring the dependency graph
    pub fn is_wiring(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredDependency(_)
                | Self::CircularDependency(_)
                | Self::TypeMismatch { .. }
                | Self::AlreadyRegistered(_)
        )
    }
}
