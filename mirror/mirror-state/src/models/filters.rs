//! Deployment list filters and their query-string rendering.

use mirror_api::{DeploymentState, DeploymentTarget, QueryParams};
use mirror_core::diff::same_members;
use serde::{Deserialize, Serialize};

/// States offered as filter options. Selecting all of them means no filter.
pub const FILTERABLE_STATES: [DeploymentState; 4] = [
    DeploymentState::Queued,
    DeploymentState::Building,
    DeploymentState::Ready,
    DeploymentState::Error,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFilters {
    pub target: Vec<DeploymentTarget>,
    pub status: Vec<DeploymentState>,
}

impl Default for DeploymentFilters {
    fn default() -> Self {
        Self {
            target: DeploymentTarget::ALL.to_vec(),
            status: FILTERABLE_STATES.to_vec(),
        }
    }
}

impl DeploymentFilters {
    /// Query parameters for the deployment list endpoint. A dimension with every option
    /// selected is left out.
    pub fn search_params(&self) -> QueryParams {
        let mut params = QueryParams::new();

        if !same_members(&self.target, &DeploymentTarget::ALL) {
            let targets = DeploymentTarget::ALL
                .iter()
                .filter(|target| self.target.contains(*target))
                .map(|target| target.as_str())
                .collect::<Vec<_>>();
            params.append("target", targets.join(","));
        }

        if !same_members(&self.status, &FILTERABLE_STATES) {
            let states = DeploymentState::ALL
                .iter()
                .filter(|state| self.status.contains(*state))
                .map(|state| state.as_str())
                .collect::<Vec<_>>();
            params.append("state", states.join(","));
        }

        params
    }

    /// Order-insensitive comparison of both dimensions.
    pub fn same_as(&self, other: &DeploymentFilters) -> bool {
        same_members(&self.target, &other.target) && same_members(&self.status, &other.status)
    }

    pub fn is_default(&self) -> bool {
        self.same_as(&Self::default())
    }
}
