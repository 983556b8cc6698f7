//! Status bar summary of the latest deployments.

use crate::caches::deployments::{DeploymentsEvent, DeploymentsState};
use crate::caches::projects::RemoteProjectsState;
use crate::events::{EventChannel, Subscriptions, spawn_listener};
use crate::host::{ContextId, ContextKeys};
use crate::models::Deployment;
use crate::projections::{humanize_age, humanize_duration, now_ms};
use mirror_core::Result;
use mirror_core::container::{Dependencies, Disposable, Injectable, Token};
use mirror_core::logger::Logger;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

const TOOLTIP_SEPARATOR: &str = "\n\n---\n";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBarView {
    pub visible: bool,
    pub text: String,
    /// Markdown.
    pub tooltip: String,
}

pub struct StatusBar {
    logger: Logger,
    projects: Arc<RemoteProjectsState>,
    deployments: Arc<DeploymentsState>,
    context_keys: Arc<ContextKeys>,
    view: RwLock<StatusBarView>,
    changes: EventChannel<StatusBarView>,
    subscriptions: Subscriptions,
}

impl StatusBar {
    pub fn view(&self) -> StatusBarView {
        self.view.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusBarView> {
        self.changes.subscribe()
    }

    /// Show the item only when there is at least one project.
    pub fn set_initial_display_state(&self) {
        let visible = !self.projects.projects().is_empty();
        self.update_view(|view| view.visible = visible);
    }

    fn set_loading(&self) {
        self.update_view(|view| {
            view.text = "···".to_string();
            view.tooltip = "Loading".to_string();
        });
    }

    /// Render the focused project's latest deployment, falling back to the newest one.
    /// A focused project without deployments is unfocused.
    pub async fn refresh(&self) {
        let latest = self.deployments.get_latest_deployments();

        let mut shown: Option<&Deployment> = None;
        if let Some(focused) = self.context_keys.get_str(ContextId::FocusedProjectId) {
            shown = latest.iter().find(|deployment| deployment.project.id == focused);
            if shown.is_none() {
                debug!(
                    component = self.logger.component(),
                    project = %focused,
                    "Focused project has no deployment"
                );
                if let Err(e) = self.context_keys.delete(ContextId::FocusedProjectId).await {
                    self.logger.warn(format!("Failed to clear focused project: {e}"));
                }
            }
        }
        let shown = shown.or_else(|| latest.iter().max_by_key(|deployment| deployment.created_at()));

        let (text, tooltip) = match shown {
            Some(deployment) => {
                let now = now_ms();
                let tooltip = latest
                    .iter()
                    .map(|deployment| deployment_summary(deployment, now))
                    .collect::<Vec<_>>()
                    .join(TOOLTIP_SEPARATOR);
                (state_label(deployment).to_string(), tooltip)
            }
            None => ("N/A".to_string(), "No deployments found".to_string()),
        };

        self.update_view(|view| {
            view.text = text;
            view.tooltip = tooltip;
        });
    }

    fn update_view(&self, update: impl FnOnce(&mut StatusBarView)) {
        let changed = {
            let mut view = self.view.write();
            let before = view.clone();
            update(&mut view);
            (*view != before).then(|| view.clone())
        };
        if let Some(view) = changed {
            self.changes.emit(view);
        }
    }
}

fn state_label(deployment: &Deployment) -> &'static str {
    deployment.state().map_or("Unknown", |state| state.label())
}

/// One tooltip line, e.g. `**web:** Ready on Production (took 2 minutes) 3 hours ago by Ada`.
pub fn deployment_summary(deployment: &Deployment, now: i64) -> String {
    let data = deployment.data();
    let mut parts = Vec::new();
    if let Some(state) = deployment.state() {
        parts.push(state.label().to_string());
    }
    if let Some(target) = deployment.target() {
        parts.push(format!("on {}", target.label()));
    }
    if let Some(ready) = data.ready {
        parts.push(format!("(took {})", humanize_duration(ready - data.created_at)));
    }
    parts.push(humanize_age(data.created_at, now));
    if let Some(commit) = deployment.commit() {
        parts.push(format!("by {}", commit.author_name));
    }
    format!("**{}:** {}", deployment.name(), parts.join(" "))
}

impl Injectable for StatusBar {
    fn dependencies() -> Vec<Token> {
        vec![
            Token::of::<RemoteProjectsState>(),
            Token::of::<DeploymentsState>(),
            Token::of::<ContextKeys>(),
        ]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let projects: Arc<RemoteProjectsState> = deps.next()?;
        let deployments: Arc<DeploymentsState> = deps.next()?;
        let context_keys: Arc<ContextKeys> = deps.next()?;
        let project_changes = projects.subscribe();
        let deployment_changes = deployments.subscribe();
        let context_changes = context_keys.subscribe();

        let status_bar = Arc::new(Self {
            logger: Logger::new("StatusBar"),
            projects,
            deployments,
            context_keys,
            view: RwLock::new(StatusBarView::default()),
            changes: EventChannel::new(),
            subscriptions: Subscriptions::new(),
        });

        status_bar.subscriptions.push(spawn_listener(
            &status_bar,
            project_changes,
            "StatusBar",
            |status_bar, _delta| async move { status_bar.set_initial_display_state() },
        ));
        status_bar.subscriptions.push(spawn_listener(
            &status_bar,
            deployment_changes,
            "StatusBar",
            |status_bar, event| async move {
                match event {
                    DeploymentsEvent::WillChange => status_bar.set_loading(),
                    DeploymentsEvent::DidChange => status_bar.refresh().await,
                }
            },
        ));
        status_bar.subscriptions.push(spawn_listener(
            &status_bar,
            context_changes,
            "StatusBar",
            |status_bar, id| async move {
                if id == ContextId::FocusedProjectId {
                    status_bar.refresh().await;
                }
            },
        ));
        Ok(status_bar)
    }

    fn as_disposable(this: &Arc<Self>) -> Option<Arc<dyn Disposable>> {
        Some(this.clone())
    }
}

impl Disposable for StatusBar {
    fn dispose(&self) {
        self.subscriptions.abort_all();
    }
}
