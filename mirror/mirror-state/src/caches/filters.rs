use crate::events::EventChannel;
use crate::host::{ContextId, ContextKeys};
use crate::models::DeploymentFilters;
use mirror_api::QueryParams;
use mirror_core::Result;
use mirror_core::container::{Dependencies, Injectable, Token};
use mirror_core::logger::Logger;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Current deployment filters. Subscribers receive the new filters on every change.
pub struct DeploymentFiltersState {
    logger: Logger,
    context_keys: Arc<ContextKeys>,
    filters: RwLock<DeploymentFilters>,
    changes: EventChannel<DeploymentFilters>,
}

impl DeploymentFiltersState {
    pub fn filters(&self) -> DeploymentFilters {
        self.filters.read().clone()
    }

    pub fn search_params(&self) -> QueryParams {
        self.filters.read().search_params()
    }

    /// Whether the filters differ from the defaults.
    pub fn is_dirty(&self) -> bool {
        !self.filters.read().is_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeploymentFilters> {
        self.changes.subscribe()
    }

    /// Replace the filters. Returns `false`, emitting nothing, when they hold the same
    /// members as before.
    pub async fn update_filters(&self, filters: DeploymentFilters) -> Result<bool> {
        {
            let mut current = self.filters.write();
            if current.same_as(&filters) {
                return Ok(false);
            }
            *current = filters.clone();
        }

        debug!(
            component = self.logger.component(),
            targets = filters.target.len(),
            states = filters.status.len(),
            "Filters changed"
        );
        let dirty = !filters.is_default();
        self.changes.emit(filters);
        self.context_keys
            .set(ContextId::DeploymentsFiltered, dirty)
            .await?;
        Ok(true)
    }

    pub async fn reset_filters(&self) -> Result<bool> {
        self.update_filters(DeploymentFilters::default()).await
    }
}

impl Injectable for DeploymentFiltersState {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<ContextKeys>()]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            logger: Logger::new("DeploymentFilters"),
            context_keys: deps.next()?,
            filters: RwLock::new(DeploymentFilters::default()),
            changes: EventChannel::new(),
        }))
    }
}
