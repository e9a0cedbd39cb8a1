//! Load, update, and save the recommendation model.
//!
//! Reads are unlocked and may observe a slightly stale model. Every write
//! goes through [`Store::run_with_lock`], which holds the marker lock for
//! the whole load-mutate-save sequence.
//!
//! Saves overwrite the model file in place. A crash mid-write can leave a
//! truncated file behind, which the next read reports as a decode error.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::lock::LockManager;
use super::models::RecommendationModel;
use super::StoreError;
use crate::config::Config;
use crate::host::Environment;

/// File-backed store for one backing directory.
#[derive(Clone)]
pub struct Store {
    model_path: PathBuf,
    lock: LockManager,
    environment: Arc<dyn Environment>,
}

impl Store {
    /// Opens the store described by `config`, creating the backing
    /// directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(config: &Config, environment: Arc<dyn Environment>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&config.storage_dir)
            .map_err(|e| StoreError::io(&config.storage_dir, e))?;

        Ok(Self::at(config, environment))
    }

    /// Points a store at the directory in `config` without touching the
    /// filesystem. Reads of a missing directory see no model and no lock.
    pub fn at(config: &Config, environment: Arc<dyn Environment>) -> Self {
        Self {
            model_path: config.model_path(),
            lock: LockManager::from_config(config),
            environment,
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock
    }

    /// Reads the persisted model. `None` if it has never been written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the file exists but is not a
    /// valid model.
    pub async fn read(&self) -> Result<Option<RecommendationModel>, StoreError> {
        let json = match tokio::fs::read_to_string(&self.model_path).await {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.model_path, e)),
        };

        let model = serde_json::from_str(&json).map_err(|source| StoreError::Decode {
            path: self.model_path.clone(),
            source,
        })?;
        Ok(Some(model))
    }

    /// Runs `mutator` against the model while holding the lock.
    ///
    /// Loads the model (or an empty one), rolls the session over if the
    /// host session changed, then hands the model to `mutator`. If the
    /// mutator returns a model it is saved; `None` skips the save. The
    /// lock is released on every exit path.
    ///
    /// Returns whether this call detected a new host session.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::LockTimeout`] if the lock cannot be taken,
    /// [`StoreError::Decode`] if the stored model is unreadable, and
    /// [`StoreError::Mutator`] if the mutator fails.
    pub async fn run_with_lock<F>(&self, mutator: F) -> Result<bool, StoreError>
    where
        F: FnOnce(RecommendationModel) -> anyhow::Result<Option<RecommendationModel>>,
    {
        let guard = self.lock.acquire().await?;

        let mut model = self.read().await?.unwrap_or_else(Self::default_model);
        let new_session = self.roll_session(&mut model);
        model.last_updated = Utc::now();

        if let Some(mut updated) = mutator(model).map_err(StoreError::Mutator)? {
            updated.last_updated = Utc::now();
            self.save(&updated).await?;
        } else {
            tracing::debug!("Mutator declined to change the model, skipping save");
        }

        guard.release()?;
        Ok(new_session)
    }

    /// An empty model with no owning session, so the first write always
    /// counts as a new session.
    fn default_model() -> RecommendationModel {
        RecommendationModel::new(String::new())
    }

    fn roll_session(&self, model: &mut RecommendationModel) -> bool {
        let current = self.environment.current_session_id();
        if model.session_id == current {
            return false;
        }

        tracing::info!(
            previous = %model.session_id,
            current = %current,
            "New host session detected"
        );
        model.session_id = current;
        model.session_timestamp = Utc::now();
        model.timelocked.clear();
        true
    }

    async fn save(&self, model: &RecommendationModel) -> Result<(), StoreError> {
        let json = serde_json::to_vec(model).map_err(StoreError::Encode)?;
        tokio::fs::write(&self.model_path, json)
            .await
            .map_err(|e| StoreError::io(&self.model_path, e))?;
        tracing::debug!(
            path = ?self.model_path,
            recommendations = model.recommendations.len(),
            "Saved recommendation model"
        );
        Ok(())
    }
}
