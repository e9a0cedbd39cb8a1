//! Host collaborators.
//!
//! The recommender never talks to an editor directly. Everything it needs
//! from the host (installed state, session identity, prompts, installs,
//! telemetry) comes through the traits here, handed in at construction.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::storage::UserChoice;

/// Point-in-time queries about the host. Never cached by the recommender.
pub trait Environment: Send + Sync {
    /// Whether the extension is currently installed.
    fn is_installed(&self, id: &str) -> bool;

    /// Display name of an installed extension.
    fn installed_display_name(&self, id: &str) -> Option<String>;

    /// Identity of the running host session. Changes across restarts.
    fn current_session_id(&self) -> String;
}

/// Handler behind an interactive command. Returns text for the host to show.
pub type CommandHandler = Arc<dyn Fn() -> String + Send + Sync>;

/// User-facing side of the host.
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Shows `message` with the given choices. `None` when dismissed.
    async fn prompt_user(
        &self,
        message: &str,
        choices: &[UserChoice],
    ) -> anyhow::Result<Option<UserChoice>>;

    /// Installs an extension, resolving once it is installed.
    async fn request_install(
        &self,
        id: &str,
        label: &str,
        timeout: Duration,
    ) -> Result<(), InstallError>;

    /// Registers a command the user can invoke. Duplicate ids may fail.
    fn register_command(&self, id: &str, handler: CommandHandler) -> anyhow::Result<()>;
}

/// Receives telemetry events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

/// One resolved recommendation prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub name: String,
    pub target_id: String,
    pub recommender_count: usize,
    pub choice: UserChoice,
}

/// Why an install request did not complete.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// The extension was not installed within the bound.
    #[error("'{label}' installation is taking a while, cancelling after {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    /// The host or the user refused the install.
    #[error("Installation of {id} was refused: {reason}")]
    Refused { id: String, reason: String },
}

/// Bundle of collaborators. Cheap to clone.
#[derive(Clone)]
pub struct Host {
    pub environment: Arc<dyn Environment>,
    pub interaction: Arc<dyn Interaction>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

impl Host {
    pub fn new(
        environment: Arc<dyn Environment>,
        interaction: Arc<dyn Interaction>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            environment,
            interaction,
            telemetry,
        }
    }
}

/// Telemetry sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// In-memory environment snapshot.
///
/// Installed state can be changed after construction, which makes it usable
/// both as a fixed snapshot and as a test double.
#[derive(Debug, Default)]
pub struct StaticEnvironment {
    session_id: RwLock<String>,
    installed: RwLock<HashMap<String, String>>,
}

impl StaticEnvironment {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: RwLock::new(session_id.into()),
            installed: RwLock::new(HashMap::new()),
        }
    }

    /// Marks an extension installed under the given display name.
    pub fn install(&self, id: impl Into<String>, display_name: impl Into<String>) {
        let mut installed = self.installed.write().unwrap_or_else(|e| e.into_inner());
        installed.insert(id.into(), display_name.into());
    }

    pub fn uninstall(&self, id: &str) {
        let mut installed = self.installed.write().unwrap_or_else(|e| e.into_inner());
        installed.remove(id);
    }

    /// Simulates a host restart.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        let mut current = self.session_id.write().unwrap_or_else(|e| e.into_inner());
        *current = session_id.into();
    }
}

impl Environment for StaticEnvironment {
    fn is_installed(&self, id: &str) -> bool {
        let installed = self.installed.read().unwrap_or_else(|e| e.into_inner());
        installed.contains_key(id)
    }

    fn installed_display_name(&self, id: &str) -> Option<String> {
        let installed = self.installed.read().unwrap_or_else(|e| e.into_inner());
        installed.get(id).cloned()
    }

    fn current_session_id(&self) -> String {
        self.session_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
