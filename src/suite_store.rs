//! Durable, ordered collection of test suites

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::PwgenError;
use crate::storage::KeyValueStore;
use crate::types::{Suite, SuiteConfig, SuiteId, Test, TestPatch};

/// Storage key of the suite collection
pub const SUITES_KEY: &str = "testSuites";

/// Single source of truth for suites. Every mutation writes the whole
/// collection back through the persistence collaborator.
pub struct SuiteStore {
    suites: Vec<Suite>,
    backend: Arc<dyn KeyValueStore>,
}

impl SuiteStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            suites: Vec::new(),
            backend,
        }
    }

    /// Read the collection from storage. Failures are logged and leave the
    /// in-memory state as it was.
    pub async fn load(&mut self) -> &[Suite] {
        match self.backend.get(SUITES_KEY).await {
            Ok(Some(value)) => match serde_json::from_value::<Vec<Suite>>(value) {
                Ok(suites) => {
                    debug!("Loaded {} suite(s)", suites.len());
                    self.suites = suites;
                }
                Err(e) => warn!("Ignoring malformed suite record: {}", e),
            },
            Ok(None) => {
                debug!("No stored suites, starting empty");
                self.suites.clear();
            }
            Err(e) => warn!("Failed to load suites: {}", e),
        }
        &self.suites
    }

    /// Write the whole collection. Fatal failures come back as
    /// `ContextInvalidated`, everything else as a retryable `Storage` error.
    pub async fn save(&self) -> Result<(), PwgenError> {
        let value = serde_json::to_value(&self.suites)
            .map_err(|e| PwgenError::Storage(e.to_string()))?;
        self.backend.set(SUITES_KEY, value).await?;
        Ok(())
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    pub fn suite(&self, id: &SuiteId) -> Option<&Suite> {
        self.suites.iter().find(|s| &s.id == id)
    }

    pub fn test(&self, suite_id: &SuiteId, index: usize) -> Option<&Test> {
        self.suite(suite_id).and_then(|s| s.tests.get(index))
    }

    fn suite_mut(&mut self, id: &SuiteId) -> Result<&mut Suite, PwgenError> {
        self.suites
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| PwgenError::InvalidInput(format!("Suite '{}' does not exist", id)))
    }

    fn mint_id(&self, mut now: DateTime<Utc>) -> SuiteId {
        loop {
            let candidate = SuiteId::from_time(now);
            if self.suite(&candidate).is_none() {
                return candidate;
            }
            now += Duration::milliseconds(1);
        }
    }

    /// Persist the collection. On failure the in-memory state is restored to
    /// `previous`, so memory never runs ahead of storage.
    async fn commit(&mut self, previous: Vec<Suite>) -> Result<(), PwgenError> {
        if let Err(e) = self.save().await {
            warn!("Save failed, rolling back in-memory change: {}", e);
            self.suites = previous;
            return Err(e);
        }
        Ok(())
    }

    pub async fn create_suite(&mut self, name: &str) -> Result<SuiteId, PwgenError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PwgenError::InvalidInput(
                "Suite name cannot be empty".to_string(),
            ));
        }

        let previous = self.suites.clone();
        let id = self.mint_id(Utc::now());
        self.suites.push(Suite::new(id.clone(), name));
        self.commit(previous).await?;
        info!("Created suite '{}' ({})", name, id);
        Ok(id)
    }

    /// Remove a suite and every test it owns
    pub async fn delete_suite(&mut self, id: &SuiteId) -> Result<Suite, PwgenError> {
        let position = self
            .suites
            .iter()
            .position(|s| &s.id == id)
            .ok_or_else(|| PwgenError::InvalidInput(format!("Suite '{}' does not exist", id)))?;
        let previous = self.suites.clone();
        let removed = self.suites.remove(position);
        self.commit(previous).await?;
        info!(
            "Deleted suite '{}' with {} test(s)",
            removed.name,
            removed.tests.len()
        );
        Ok(removed)
    }

    /// Returns `false` without touching anything when the trimmed name is empty
    pub async fn rename_suite(&mut self, id: &SuiteId, new_name: &str) -> Result<bool, PwgenError> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Ok(false);
        }
        let previous = self.suites.clone();
        self.suite_mut(id)?.name = new_name.to_string();
        self.commit(previous).await?;
        Ok(true)
    }

    /// Flip the presentation-only collapse flag, returning the new value
    pub async fn toggle_collapsed(&mut self, id: &SuiteId) -> Result<bool, PwgenError> {
        let previous = self.suites.clone();
        let suite = self.suite_mut(id)?;
        suite.collapsed = !suite.collapsed;
        let collapsed = suite.collapsed;
        self.commit(previous).await?;
        Ok(collapsed)
    }

    pub async fn set_config(&mut self, id: &SuiteId, config: SuiteConfig) -> Result<(), PwgenError> {
        let previous = self.suites.clone();
        self.suite_mut(id)?.config = config;
        self.commit(previous).await
    }

    /// Insert at the head of the suite's tests (most recent first)
    pub async fn add_test(&mut self, suite_id: &SuiteId, test: Test) -> Result<(), PwgenError> {
        let previous = self.suites.clone();
        let suite = self.suite_mut(suite_id)?;
        debug!("Adding test '{}' to suite '{}'", test.filename, suite.name);
        suite.tests.insert(0, test);
        self.commit(previous).await
    }

    pub async fn update_test(
        &mut self,
        suite_id: &SuiteId,
        index: usize,
        patch: TestPatch,
    ) -> Result<(), PwgenError> {
        let previous = self.suites.clone();
        let suite = self.suite_mut(suite_id)?;
        let test = suite.tests.get_mut(index).ok_or_else(|| {
            PwgenError::InvalidInput(format!("Suite '{}' has no test at index {}", suite_id, index))
        })?;
        test.apply(patch);
        self.commit(previous).await
    }

    pub async fn delete_test(&mut self, suite_id: &SuiteId, index: usize) -> Result<Test, PwgenError> {
        let previous = self.suites.clone();
        let suite = self.suite_mut(suite_id)?;
        if index >= suite.tests.len() {
            return Err(PwgenError::InvalidInput(format!(
                "Suite '{}' has no test at index {}",
                suite_id, index
            )));
        }
        let removed = suite.tests.remove(index);
        self.commit(previous).await?;
        Ok(removed)
    }

    /// Drop one snapshot from a stored test. `Ok(false)` when the test has
    /// no snapshot with that id.
    pub async fn remove_test_snapshot(
        &mut self,
        suite_id: &SuiteId,
        index: usize,
        snapshot_id: &str,
    ) -> Result<bool, PwgenError> {
        let previous = self.suites.clone();
        let suite = self.suite_mut(suite_id)?;
        let test = suite.tests.get_mut(index).ok_or_else(|| {
            PwgenError::InvalidInput(format!("Suite '{}' has no test at index {}", suite_id, index))
        })?;
        let before = test.snapshots.len();
        test.snapshots.retain(|s| s.id != snapshot_id);
        if test.snapshots.len() == before {
            return Ok(false);
        }
        self.commit(previous).await?;
        Ok(true)
    }
}

#[cfg(test)]
#[path = "suite_store_test.rs"]
mod suite_store_test;
