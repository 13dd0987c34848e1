use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TariffError;

/// Refresh lifecycle of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshState {
    /// Nothing attempted yet for the current configuration
    Idle,
    Refreshing,
    Succeeded,
    Failed,
}

/// Health of an entity as seen by diagnostics and the web surface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshStatus {
    pub entity_id: String,
    pub state: RefreshState,
    /// Bumped on every reconfiguration
    pub generation: u64,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_kind: Option<String>,
    pub consecutive_failures: u32,
    /// A result is cached for the current configuration
    pub available: bool,
}

impl RefreshStatus {
    pub fn new(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            state: RefreshState::Idle,
            generation: 0,
            last_attempt: None,
            last_success: None,
            last_error: None,
            last_error_kind: None,
            consecutive_failures: 0,
            available: false,
        }
    }

    pub(crate) fn begin(&mut self, at: DateTime<Utc>) {
        self.state = RefreshState::Refreshing;
        self.last_attempt = Some(at);
    }

    pub(crate) fn succeed(&mut self, at: DateTime<Utc>) {
        self.state = RefreshState::Succeeded;
        self.last_success = Some(at);
        self.last_error = None;
        self.last_error_kind = None;
        self.consecutive_failures = 0;
        self.available = true;
    }

    /// Record a failed cycle; `available` keeps reflecting the stale cache
    pub(crate) fn fail(&mut self, error: &TariffError) {
        self.state = RefreshState::Failed;
        self.last_error = Some(error.to_string());
        self.last_error_kind = Some(error.kind().to_string());
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Forget everything tied to the previous configuration
    pub(crate) fn reset(&mut self, generation: u64) {
        let entity_id = std::mem::take(&mut self.entity_id);
        *self = Self::new(&entity_id);
        self.generation = generation;
    }

    pub fn is_refreshing(&self) -> bool {
        self.state == RefreshState::Refreshing
    }
}
