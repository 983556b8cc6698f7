//! Live configuration with change notifications per setting group.

use crate::events::EventChannel;
use crate::host::tokens;
use globset::GlobSet;
use mirror_core::Result;
use mirror_core::config::{DeploymentsConfig, MirrorConfig, RefreshConfig};
use mirror_core::container::{Dependencies, Injectable, Token};
use mirror_core::diff::same_members;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsEvent {
    FilesExcludeChanged,
    DeploymentsAutoRefreshChanged,
    ChecksAutoRefreshChanged,
    LogsAutoRefreshChanged,
}

pub struct SettingsState {
    config: RwLock<MirrorConfig>,
    exclude: RwLock<GlobSet>,
    changes: EventChannel<SettingsEvent>,
}

impl SettingsState {
    pub fn new(config: MirrorConfig) -> Result<Self> {
        config.validate()?;
        let exclude = config.files.exclude_set()?;
        Ok(Self {
            config: RwLock::new(config),
            exclude: RwLock::new(exclude),
            changes: EventChannel::new(),
        })
    }

    pub fn config(&self) -> MirrorConfig {
        self.config.read().clone()
    }

    pub fn files_exclude(&self) -> Vec<String> {
        self.config.read().files.exclude.clone()
    }

    /// Compiled exclude patterns.
    pub fn exclude_set(&self) -> GlobSet {
        self.exclude.read().clone()
    }

    pub fn max_projects_per_folder(&self) -> usize {
        self.config.read().files.max_projects_per_folder
    }

    pub fn deployments(&self) -> DeploymentsConfig {
        self.config.read().deployments.clone()
    }

    pub fn checks(&self) -> RefreshConfig {
        self.config.read().checks.clone()
    }

    pub fn logs(&self) -> RefreshConfig {
        self.config.read().logs.clone()
    }

    /// Replace the configuration. One event is emitted per setting group that changed.
    pub fn update(&self, new: MirrorConfig) -> Result<Vec<SettingsEvent>> {
        new.validate()?;
        let exclude = new.files.exclude_set()?;

        let events = {
            let mut config = self.config.write();
            let events = Self::changed_groups(&config, &new);
            *config = new;
            events
        };
        if events.contains(&SettingsEvent::FilesExcludeChanged) {
            *self.exclude.write() = exclude;
        }

        for event in &events {
            debug!(?event, "Settings changed");
            self.changes.emit(*event);
        }
        Ok(events)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SettingsEvent> {
        self.changes.subscribe()
    }

    fn changed_groups(old: &MirrorConfig, new: &MirrorConfig) -> Vec<SettingsEvent> {
        let mut events = Vec::new();
        if !same_members(&old.files.exclude, &new.files.exclude)
            || old.files.max_projects_per_folder != new.files.max_projects_per_folder
        {
            events.push(SettingsEvent::FilesExcludeChanged);
        }
        if old.deployments != new.deployments {
            events.push(SettingsEvent::DeploymentsAutoRefreshChanged);
        }
        if old.checks != new.checks {
            events.push(SettingsEvent::ChecksAutoRefreshChanged);
        }
        if old.logs != new.logs {
            events.push(SettingsEvent::LogsAutoRefreshChanged);
        }
        events
    }
}

impl Injectable for SettingsState {
    fn dependencies() -> Vec<Token> {
        vec![Token::named(tokens::CONFIG)]
    }

    fn construct(deps: &mut Dependencies) -> Result<Arc<Self>> {
        let config: MirrorConfig = deps.next_value()?;
        Ok(Arc::new(Self::new(config)?))
    }
}
