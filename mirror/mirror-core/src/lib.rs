//! Mirror Core - building blocks shared by the mirror crates.
//!
//! This crate provides:
//! - The error type and result alias
//! - Configuration loading and validation
//! - The dependency container that wires long-lived components
//! - Concurrency primitives: the FIFO task queue, the loading-state guard and settle-all
//! - Collection diffing, path normalization and id encoding

pub mod config;
pub mod container;
pub mod diff;
pub mod error;
pub mod id;
pub mod loading;
pub mod logger;
pub mod paths;
pub mod queue;
pub mod settle;

pub use error::{MirrorError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::MirrorConfig;
    pub use crate::container::{Container, Dependencies, Disposable, Injectable, Token};
    pub use crate::diff::{Diff, diff_by_key, same_members, unique_by_key};
    pub use crate::error::{MirrorError, Result};
    pub use crate::loading::{LoadingGuard, LoadingState};
    pub use crate::logger::Logger;
    pub use crate::paths::{normalize_path, stable_path_hash};
    pub use crate::queue::TaskQueue;
    pub use crate::settle::settle_all;
}
