//! UI context flags that drive what the host shows (welcome views, badges, menus).

use crate::events::EventChannel;
use crate::host::tokens;
use crate::host::workspace_state::WorkspaceState;
use mirror_core::Result;
use mirror_core::container::{Dependencies, Injectable, Token};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextId {
    IsReady,
    IsAuthenticated,
    NoProjectsFound,
    SomeProjectsNotLinked,
    DeploymentsFiltered,
    FocusedProjectId,
    SelectedDeploymentForFiles,
}

impl ContextId {
    pub const ALL: [ContextId; 7] = [
        ContextId::IsReady,
        ContextId::IsAuthenticated,
        ContextId::NoProjectsFound,
        ContextId::SomeProjectsNotLinked,
        ContextId::DeploymentsFiltered,
        ContextId::FocusedProjectId,
        ContextId::SelectedDeploymentForFiles,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IsReady => "mirror:isReady",
            Self::IsAuthenticated => "mirror:isAuthenticated",
            Self::NoProjectsFound => "mirror:noProjectsFound",
            Self::SomeProjectsNotLinked => "mirror:someProjectsNotLinked",
            Self::DeploymentsFiltered => "mirror:deploymentsFiltered",
            Self::FocusedProjectId => "mirror:focusedProjectId",
            Self::SelectedDeploymentForFiles => "mirror:selectedDeploymentForFiles",
        }
    }

    /// Keys restored from the workspace state on the next run.
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::FocusedProjectId)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ContextKeys {
    values: RwLock<HashMap<ContextId, Value>>,
    changes: EventChannel<ContextId>,
    workspace_state: Arc<WorkspaceState>,
}

impl ContextKeys {
    pub fn new(workspace_state: Arc<WorkspaceState>) -> Self {
        let values = ContextId::ALL
            .into_iter()
            .filter(ContextId::is_persisted)
            .filter_map(|id| Some((id, workspace_state.get::<Value>(id.as_str())?)))
            .collect();

        Self {
            values: RwLock::new(values),
            changes: EventChannel::new(),
            workspace_state,
        }
    }

    pub fn get(&self, id: ContextId) -> Option<Value> {
        self.values.read().get(&id).cloned()
    }

    pub fn get_str(&self, id: ContextId) -> Option<String> {
        self.get(id).and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn get_bool(&self, id: ContextId) -> bool {
        self.get(id).and_then(|value| value.as_bool()).unwrap_or(false)
    }

    /// Set a key and notify subscribers. Persisted keys are written through.
    pub async fn set(&self, id: ContextId, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        self.values.write().insert(id, value.clone());
        if id.is_persisted() {
            self.workspace_state.update(id.as_str(), Some(value)).await?;
        }
        self.changes.emit(id);
        Ok(())
    }

    pub async fn delete(&self, id: ContextId) -> Result<()> {
        self.values.write().remove(&id);
        if id.is_persisted() {
            self.workspace_state.update::<Value>(id.as_str(), None).await?;
        }
        self.changes.emit(id);
        Ok(())
    }

    /// Ids of the keys that were set or deleted.
    pub fn subscribe(&self) -> broadcast::Receiver<ContextId> {
        self.changes.subscribe()
    }
}

impl Injectable for ContextKeys {
    fn dependencies() -> Vec<Token> {
        vec![Token::named(tokens::WORKSPACE_STATE)]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let workspace_state: Arc<WorkspaceState> = deps.next_value()?;
        Ok(Arc::new(Self::new(workspace_state)))
    }
}
