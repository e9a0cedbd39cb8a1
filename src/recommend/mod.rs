//! Recommendation engine.
//!
//! Registers recommendations into the shared model, picks what is due for
//! display, prompts the user through the host, and records the answer.
//!
//! # Flow
//!
//! 1. A source calls [`RecommendationService::register`]. The batch is
//!    merged into the model under the lock.
//! 2. If that write was the first of a new host session, a startup pass is
//!    scheduled after a fixed delay so other sources can register first.
//!    Anything registered after the delay misses that pass.
//! 3. The startup pass prompts once per due target. "Never" suppresses the
//!    target for every source recommending it.

pub mod merge;
pub mod select;

use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::Config;
use crate::host::{Host, InstallError, TelemetryEvent};
use crate::storage::{Recommendation, Store, StoreError, UserChoice};

pub use merge::merge_recommendations;
pub use select::{Candidate, Recommender};

/// Telemetry event name for a resolved prompt.
pub const TELEMETRY_EVENT: &str = "recommendation.resolved";

/// Prefix of the per-target details command offered with multi-source prompts.
pub const DETAILS_COMMAND_PREFIX: &str = "extension-recommender.details.";

/// Errors surfaced by the recommendation engine.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Install(#[from] InstallError),

    /// A host collaborator failed. Passed through unchanged.
    #[error("Host request failed: {0}")]
    Host(#[source] anyhow::Error),
}

/// What happened to one prompted target.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayOutcome {
    pub target_id: String,
    pub recommender_count: usize,
    /// `None` when the prompt was dismissed without a choice.
    pub choice: Option<UserChoice>,
}

/// Entry point used by every recommending extension. Cheap to clone.
#[derive(Clone)]
pub struct RecommendationService {
    store: Store,
    host: Host,
    config: Arc<Config>,
}

impl RecommendationService {
    /// Creates a service over the backing directory in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing directory cannot be created.
    pub fn new(config: Config, host: Host) -> Result<Self, RecommendError> {
        let store = Store::open(&config, host.environment.clone())?;
        Ok(Self {
            store,
            host,
            config: Arc::new(config),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Builds a recommendation value. Nothing is persisted until it is
    /// passed to [`register`](Self::register).
    pub fn create(
        &self,
        source_id: &str,
        extension_id: &str,
        extension_display_name: &str,
        description: &str,
        should_show_on_startup: bool,
    ) -> Recommendation {
        Recommendation::new(
            source_id,
            extension_id,
            extension_display_name,
            description,
            should_show_on_startup,
        )
    }

    /// Merges `recommendations` into the model. On a new host session,
    /// schedules a detached startup pass and returns without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be locked, read, or written.
    pub async fn register(&self, recommendations: Vec<Recommendation>) -> Result<(), RecommendError> {
        let new_session = self.add_to_model(&recommendations).await?;
        if new_session {
            self.schedule_startup_pass();
        }
        Ok(())
    }

    /// Merges `recommendations` into the model and reports whether this
    /// write started a new host session.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be locked, read, or written.
    pub async fn add_to_model(&self, recommendations: &[Recommendation]) -> Result<bool, RecommendError> {
        let new_session = self
            .store
            .run_with_lock(|mut model| {
                let current = std::mem::take(&mut model.recommendations);
                model.recommendations = merge_recommendations(current, recommendations);
                Ok(Some(model))
            })
            .await?;

        tracing::info!(
            count = recommendations.len(),
            new_session,
            "Registered recommendations"
        );
        Ok(new_session)
    }

    /// Runs the startup pass after the configured delay on a detached task.
    ///
    /// Failures are logged by the task itself.
    pub fn schedule_startup_pass(&self) -> JoinHandle<()> {
        let service = self.clone();
        let delay = self.config.startup_delay();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match service.show_startup().await {
                Ok(outcomes) => {
                    tracing::debug!(prompted = outcomes.len(), "Startup recommendation pass finished");
                }
                Err(e) => {
                    tracing::warn!("Startup recommendation pass failed: {}", e);
                }
            }
        })
    }

    /// Prompts for every target due at startup, concurrently.
    ///
    /// Returns one outcome per prompted target, in model order. If any
    /// prompt fails, the remaining prompts still finish and the first
    /// failure is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be read, a host collaborator
    /// fails, or an install does not complete.
    pub async fn show_startup(&self) -> Result<Vec<DisplayOutcome>, RecommendError> {
        let Some(model) = self.store.read().await? else {
            return Ok(Vec::new());
        };

        let candidates = select::startup_candidates(&model, self.host.environment.as_ref());
        let mut tasks = JoinSet::new();
        for (idx, candidate) in candidates.into_iter().enumerate() {
            let service = self.clone();
            tasks.spawn(async move { (idx, service.present(candidate).await) });
        }

        let mut outcomes = Vec::new();
        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(outcome))) => outcomes.push((idx, outcome)),
                Ok((_, Err(e))) => {
                    tracing::warn!("Recommendation prompt failed: {}", e);
                    first_error.get_or_insert(e);
                }
                Err(e) => {
                    first_error.get_or_insert(RecommendError::Host(anyhow::anyhow!(
                        "Recommendation prompt task failed: {e}"
                    )));
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        outcomes.sort_by_key(|(idx, _)| *idx);
        Ok(outcomes.into_iter().map(|(_, outcome)| outcome).collect())
    }

    /// Shows the `from -> to` recommendation immediately.
    ///
    /// Returns `None` without prompting when `from` is not installed, `to`
    /// already is, or no such recommendation is registered.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be read, a host collaborator
    /// fails, or an install does not complete.
    pub async fn show(
        &self,
        from: &str,
        to: &str,
        description: Option<&str>,
    ) -> Result<Option<DisplayOutcome>, RecommendError> {
        let Some(model) = self.store.read().await? else {
            return Ok(None);
        };

        match select::on_demand_candidate(&model, self.host.environment.as_ref(), from, to, description) {
            Some(candidate) => Ok(Some(self.present(candidate).await?)),
            None => {
                tracing::debug!(from, to, "Nothing to show on demand");
                Ok(None)
            }
        }
    }

    /// Records the user's answer for a target.
    ///
    /// "Never" marks every stored recommendation of the target as ignored,
    /// whichever source made it. Other choices leave the model unchanged.
    ///
    /// Returns how many stored recommendations were newly suppressed.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be locked, read, or written.
    pub async fn record_decision(&self, target_id: &str, choice: UserChoice) -> Result<usize, RecommendError> {
        if choice != UserChoice::Never {
            return Ok(0);
        }

        let mut suppressed = 0;
        self.store
            .run_with_lock(|mut model| {
                for rec in model
                    .recommendations
                    .iter_mut()
                    .filter(|r| r.extension_id == target_id && !r.user_ignored)
                {
                    rec.user_ignored = true;
                    suppressed += 1;
                }
                Ok((suppressed > 0).then_some(model))
            })
            .await?;

        if suppressed > 0 {
            tracing::info!(target_id, suppressed, "Recommendation suppressed by user");
        } else {
            tracing::debug!(target_id, "Nothing left to suppress");
        }
        Ok(suppressed)
    }

    async fn present(&self, candidate: Candidate) -> Result<DisplayOutcome, RecommendError> {
        if candidate.recommender_count() > 1 {
            self.register_details_command(&candidate);
        }

        let choice = self
            .host
            .interaction
            .prompt_user(&candidate.message(), &UserChoice::ALL)
            .await
            .map_err(RecommendError::Host)?;

        if let Some(choice) = choice {
            self.resolve(&candidate, choice).await?;
        }

        Ok(DisplayOutcome {
            target_id: candidate.target_id,
            recommender_count: candidate.recommenders.len(),
            choice,
        })
    }

    async fn resolve(&self, candidate: &Candidate, choice: UserChoice) -> Result<(), RecommendError> {
        match choice {
            UserChoice::Install => {
                self.install(&candidate.target_id, &candidate.display_name)
                    .await?;
            }
            UserChoice::Never => {
                self.record_decision(&candidate.target_id, choice).await?;
            }
            UserChoice::Later => {}
        }

        self.host.telemetry.emit(TelemetryEvent {
            name: TELEMETRY_EVENT.to_string(),
            target_id: candidate.target_id.clone(),
            recommender_count: candidate.recommender_count(),
            choice,
        });
        Ok(())
    }

    /// Delegates the install to the host, bounded by the install timeout.
    async fn install(&self, id: &str, label: &str) -> Result<(), RecommendError> {
        let timeout = self.config.install_timeout();
        let request = self.host.interaction.request_install(id, label, timeout);

        match tokio::time::timeout(timeout, request).await {
            Ok(Ok(())) => {
                tracing::info!(id, "Installed recommended extension");
                Ok(())
            }
            Ok(Err(e)) => {
                tracing::warn!(id, "Install failed: {}", e);
                Err(e.into())
            }
            Err(_) => {
                let e = InstallError::Timeout {
                    label: label.to_string(),
                    timeout,
                };
                tracing::warn!(id, "Install failed: {}", e);
                Err(e.into())
            }
        }
    }

    fn register_details_command(&self, candidate: &Candidate) {
        let id = format!("{DETAILS_COMMAND_PREFIX}{}", candidate.target_id);
        let details = candidate.details();
        let handler = Arc::new(move || details.clone());

        if let Err(e) = self.host.interaction.register_command(&id, handler) {
            tracing::debug!(command = %id, "Details command not registered: {}", e);
        }
    }
}
