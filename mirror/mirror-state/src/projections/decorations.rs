use crate::caches::deployments::{DeploymentsEvent, DeploymentsState};
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::models::Deployment;
use crate::projections::{humanize_age, now_ms};
use mirror_api::DeploymentTarget;
use mirror_core::Result;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use std::sync::Arc;
use tokio::sync::broadcast;

pub const PROMOTED_BADGE: &str = "⏶";
pub const PRODUCTION_BADGE: &str = "P";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDecoration {
    pub badge: &'static str,
    pub tooltip: Option<String>,
}

/// Badges for deployment entries in tree views. Subscribers are told to redraw every
/// time the deployments change.
pub struct FileDecorations {
    deployments: Arc<DeploymentsState>,
    changes: EventChannel<()>,
    subscriptions: Subscriptions,
}

impl FileDecorations {
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    pub fn decoration_for(&self, deployment_id: &str) -> Option<FileDecoration> {
        let deployment = self.deployments.get(deployment_id)?;
        let current = self.deployments.get_current_deployments();
        decorate(&deployment, &current, now_ms())
    }
}

/// The current production deployment of a project is "promoted"; any other production
/// deployment gets the plain production badge.
pub fn decorate(deployment: &Deployment, current: &[Deployment], now: i64) -> Option<FileDecoration> {
    if deployment.target() != Some(DeploymentTarget::Production) {
        return None;
    }

    if current.iter().any(|c| c.id == deployment.id) {
        let data = deployment.data();
        let promoted_at = data.booted_at.unwrap_or(data.created_at);
        return Some(FileDecoration {
            badge: PROMOTED_BADGE,
            tooltip: Some(format!("Promoted {}", humanize_age(promoted_at, now))),
        });
    }

    Some(FileDecoration {
        badge: PRODUCTION_BADGE,
        tooltip: None,
    })
}

impl Injectable for FileDecorations {
    fn dependencies() -> Vec<Token> {
        vec![Token::of::<DeploymentsState>()]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let deployments: Arc<DeploymentsState> = deps.next()?;
        let deployment_changes = deployments.subscribe();
        let decorations = Arc::new(Self {
            deployments,
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        decorations.subscriptions.push(spawn_listener(
            &decorations,
            deployment_changes,
            "FileDecorations",
            |decorations, event| async move {
                if event == DeploymentsEvent::DidChange {
                    decorations.changes.emit(());
                }
            },
        ));
        Ok(decorations)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for FileDecorations {
    fn dispose(&self) {
        self.subscriptions.abort_all();
    }
}
