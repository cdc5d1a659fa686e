//! Generation cycles and the working session

use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::bridge::{self, RequestBridge, TabContext};
use crate::completion::CompletionClient;
use crate::errors::PwgenError;
use crate::prompt::{PromptBuilder, fallback_filename, finalize_suite, parse_filename, sanitize};
use crate::suite_store::SuiteStore;
use crate::types::{Snapshot, Suite, SuiteConfig, SuiteId, Test, TestPatch};

/// Where the current generation cycle is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingPageData,
    AwaitingCompletion,
    Done,
    Failed(String),
}

impl Phase {
    pub fn in_flight(&self) -> bool {
        matches!(self, Phase::AwaitingPageData | Phase::AwaitingCompletion)
    }
}

/// Working copy of whatever the user is editing. Nothing here is persisted
/// until `save()` hands it to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub current_suite: Option<SuiteId>,
    /// Index into the current suite's tests when editing an existing test
    pub current_test: Option<usize>,
    pub instructions: String,
    pub description: String,
    /// Last sanitized script, the body `save()` will store
    pub script: String,
    pub snapshots: Vec<Snapshot>,
    /// Relative URL of the page the script was generated against
    pub page_url: Option<String>,
}

impl Session {
    /// Drop the edit target and its buffers, keeping the suite selection
    fn clear_edit(&mut self) {
        *self = Session {
            current_suite: self.current_suite.take(),
            ..Session::default()
        };
    }
}

/// Marks a cycle in flight. Dropping it before `finish` means the cycle
/// future was cancelled.
struct CycleGuard<'a> {
    phase: &'a StdMutex<Phase>,
    finished: bool,
}

impl<'a> CycleGuard<'a> {
    fn begin(phase: &'a StdMutex<Phase>, first: Phase) -> Result<Self, PwgenError> {
        let mut current = lock_phase(phase);
        if current.in_flight() {
            return Err(PwgenError::Busy);
        }
        *current = first;
        Ok(Self {
            phase,
            finished: false,
        })
    }

    fn advance(&self, next: Phase) {
        *lock_phase(self.phase) = next;
    }

    fn finish<T>(mut self, result: &Result<T, PwgenError>) {
        let next = match result {
            Ok(_) => Phase::Done,
            Err(e) => Phase::Failed(e.to_string()),
        };
        *lock_phase(self.phase) = next;
        self.finished = true;
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Generation cycle dropped before completing");
            *lock_phase(self.phase) = Phase::Failed("generation cancelled".to_string());
        }
    }
}

fn lock_phase(phase: &StdMutex<Phase>) -> std::sync::MutexGuard<'_, Phase> {
    phase.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs generation cycles and keeps the working session consistent with
/// the suite store
pub struct GenerationOrchestrator {
    bridge: Arc<dyn RequestBridge>,
    completion: Arc<dyn CompletionClient>,
    prompts: PromptBuilder,
    store: Mutex<SuiteStore>,
    session: Mutex<Session>,
    phase: StdMutex<Phase>,
}

impl GenerationOrchestrator {
    pub fn new(
        bridge: Arc<dyn RequestBridge>,
        completion: Arc<dyn CompletionClient>,
        store: SuiteStore,
    ) -> Self {
        Self {
            bridge,
            completion,
            prompts: PromptBuilder::new(),
            store: Mutex::new(store),
            session: Mutex::new(Session::default()),
            phase: StdMutex::new(Phase::Idle),
        }
    }

    pub fn with_prompt_builder(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn phase(&self) -> Phase {
        lock_phase(&self.phase).clone()
    }

    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Reload suites from storage
    pub async fn load(&self) -> Vec<Suite> {
        self.store.lock().await.load().await.to_vec()
    }

    pub async fn suites(&self) -> Vec<Suite> {
        self.store.lock().await.suites().to_vec()
    }

    pub async fn suite(&self, id: &SuiteId) -> Option<Suite> {
        self.store.lock().await.suite(id).cloned()
    }

    /// Surface a failure, wiping the session when the host context is gone
    async fn observe<T>(&self, result: Result<T, PwgenError>) -> Result<T, PwgenError> {
        if let Err(e) = &result
            && e.requires_reload()
        {
            error!("{}", e);
            *self.session.lock().await = Session::default();
        }
        result
    }

    pub async fn select_suite(&self, id: &SuiteId) -> Result<(), PwgenError> {
        if self.store.lock().await.suite(id).is_none() {
            return Err(PwgenError::InvalidInput(format!("Suite '{}' does not exist", id)));
        }
        let mut session = self.session.lock().await;
        if session.current_suite.as_ref() != Some(id) {
            session.clear_edit();
            session.current_suite = Some(id.clone());
        }
        Ok(())
    }

    /// Load an existing test into the working copy for editing
    pub async fn select_test(&self, suite_id: &SuiteId, index: usize) -> Result<(), PwgenError> {
        let test = self
            .store
            .lock()
            .await
            .test(suite_id, index)
            .cloned()
            .ok_or_else(|| {
                PwgenError::InvalidInput(format!("Suite '{}' has no test at index {}", suite_id, index))
            })?;

        let mut session = self.session.lock().await;
        *session = Session {
            current_suite: Some(suite_id.clone()),
            current_test: Some(index),
            instructions: test.instructions,
            description: test.description,
            script: test.body,
            snapshots: test.snapshots,
            page_url: Some(test.url),
        };
        debug!("Editing test {} of suite {}", index, suite_id);
        Ok(())
    }

    /// Start a fresh test in the current suite
    pub async fn clear_session(&self) {
        self.session.lock().await.clear_edit();
    }

    pub async fn set_instructions(&self, instructions: &str) {
        self.session.lock().await.instructions = instructions.to_string();
    }

    pub async fn set_description(&self, description: &str) {
        self.session.lock().await.description = description.to_string();
    }

    /// A suite is selected and there is a script to store
    pub async fn can_save(&self) -> bool {
        let session = self.session.lock().await;
        session.current_suite.is_some() && !session.script.trim().is_empty()
    }

    /// Capture the page's visible elements into the working snapshot list
    pub async fn capture_snapshot(
        &self,
        tab: &TabContext,
        label: Option<&str>,
    ) -> Result<Snapshot, PwgenError> {
        let result = bridge::visible_elements(self.bridge.as_ref(), tab).await;
        let elements = self.observe(result).await?;

        let mut session = self.session.lock().await;
        let name = label
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Snapshot::default_label(session.snapshots.len()));

        let mut now = Utc::now();
        let mut snapshot = Snapshot::new(name, elements, now);
        while session.snapshots.iter().any(|s| s.id == snapshot.id) {
            now += Duration::milliseconds(1);
            snapshot = Snapshot::new(snapshot.name, snapshot.elements, now);
        }

        info!(
            "Captured snapshot '{}' with {} element(s)",
            snapshot.name,
            snapshot.elements.len()
        );
        session.snapshots.push(snapshot.clone());
        Ok(snapshot)
    }

    /// Remove a snapshot from the working copy only
    pub async fn remove_snapshot(&self, id: &str) -> bool {
        let mut session = self.session.lock().await;
        let before = session.snapshots.len();
        session.snapshots.retain(|s| s.id != id);
        session.snapshots.len() != before
    }

    /// Remove a snapshot from a stored test
    pub async fn remove_test_snapshot(
        &self,
        suite_id: &SuiteId,
        index: usize,
        snapshot_id: &str,
    ) -> Result<bool, PwgenError> {
        let result = self
            .store
            .lock()
            .await
            .remove_test_snapshot(suite_id, index, snapshot_id)
            .await;
        let removed = self.observe(result).await?;

        if removed {
            let mut session = self.session.lock().await;
            if session.current_suite.as_ref() == Some(suite_id) && session.current_test == Some(index) {
                session.snapshots.retain(|s| s.id != snapshot_id);
            }
        }
        Ok(removed)
    }

    /// Run one generation cycle against the page behind `tab`. The
    /// sanitized script lands in the session's script buffer.
    pub async fn generate(&self, instructions: &str, tab: &TabContext) -> Result<String, PwgenError> {
        let instructions = instructions.trim();
        if instructions.is_empty() {
            return Err(PwgenError::InvalidInput(
                "Please enter test instructions".to_string(),
            ));
        }

        let guard = CycleGuard::begin(&self.phase, Phase::AwaitingPageData)?;
        let result = self.run_generate(instructions, tab, &guard).await;
        guard.finish(&result);
        self.observe(result).await
    }

    async fn run_generate(
        &self,
        instructions: &str,
        tab: &TabContext,
        guard: &CycleGuard<'_>,
    ) -> Result<String, PwgenError> {
        let bridge = self.bridge.as_ref();
        let (page, elements) = tokio::try_join!(
            bridge::page_details(bridge, tab),
            bridge::visible_elements(bridge, tab)
        )?;
        debug!("Page '{}' has {} visible element(s)", page.title, elements.len());

        let snapshots = self.session.lock().await.snapshots.clone();
        let prompt = self
            .prompts
            .build_test_prompt(instructions, &page, &elements, &snapshots);

        guard.advance(Phase::AwaitingCompletion);
        let raw = self.completion.complete(&prompt).await?;
        let script = sanitize(&raw);
        if script.is_empty() {
            warn!("Completion sanitized to nothing: {}", raw);
            return Err(PwgenError::content("completion produced an empty script", raw));
        }

        let mut session = self.session.lock().await;
        session.instructions = instructions.to_string();
        session.script = script.clone();
        session.page_url = Some(page.relative_url());
        info!("Generated {} line(s) of script", script.lines().count());
        Ok(script)
    }

    /// Ask the model for a filename; any failure falls back to a timestamp name
    async fn mint_filename(&self, instructions: &str) -> String {
        let prompt = self.prompts.build_filename_prompt(instructions);
        match self.completion.complete(&prompt).await {
            Ok(raw) => parse_filename(&raw).unwrap_or_else(|| {
                debug!("Unusable filename suggestion {:?}", raw);
                fallback_filename(Utc::now())
            }),
            Err(e) => {
                warn!("Filename request failed, using timestamp name: {}", e);
                fallback_filename(Utc::now())
            }
        }
    }

    /// Store the script buffer: a new test at the head of the current suite,
    /// or an update of the test being edited. Returns the stored test.
    pub async fn save(&self) -> Result<Test, PwgenError> {
        let working = self.session.lock().await.clone();
        let Some(suite_id) = working.current_suite.clone() else {
            return Err(PwgenError::InvalidInput("Select a suite first".to_string()));
        };
        if working.script.trim().is_empty() {
            return Err(PwgenError::InvalidInput("Nothing to save".to_string()));
        }

        let result = match working.current_test {
            None => self.save_new(&suite_id, &working).await,
            Some(index) => self.save_existing(&suite_id, index, &working).await,
        };
        let test = self.observe(result).await?;

        self.session.lock().await.script.clear();
        Ok(test)
    }

    async fn save_new(&self, suite_id: &SuiteId, working: &Session) -> Result<Test, PwgenError> {
        let filename = self.mint_filename(&working.instructions).await;
        let test = Test {
            instructions: working.instructions.clone(),
            body: working.script.clone(),
            filename,
            description: working.description.clone(),
            url: working.page_url.clone().unwrap_or_default(),
            timestamp: Utc::now(),
            snapshots: working.snapshots.clone(),
        };
        self.store.lock().await.add_test(suite_id, test.clone()).await?;
        info!("Saved new test '{}'", test.filename);
        Ok(test)
    }

    async fn save_existing(
        &self,
        suite_id: &SuiteId,
        index: usize,
        working: &Session,
    ) -> Result<Test, PwgenError> {
        let patch = TestPatch {
            instructions: Some(working.instructions.clone()),
            body: Some(working.script.clone()),
            description: Some(working.description.clone()),
            url: working.page_url.clone(),
            snapshots: Some(working.snapshots.clone()),
        };
        let mut store = self.store.lock().await;
        store.update_test(suite_id, index, patch).await?;
        let test = store.test(suite_id, index).cloned().ok_or_else(|| {
            PwgenError::InvalidInput(format!("Suite '{}' has no test at index {}", suite_id, index))
        })?;
        info!("Updated test '{}'", test.filename);
        Ok(test)
    }

    /// Consolidate every test of a suite into one file
    pub async fn generate_suite(&self, suite_id: &SuiteId) -> Result<String, PwgenError> {
        let suite = self.suite(suite_id).await.ok_or_else(|| {
            PwgenError::InvalidInput(format!("Suite '{}' does not exist", suite_id))
        })?;
        if suite.tests.is_empty() {
            return Err(PwgenError::InvalidInput(format!(
                "Suite '{}' has no tests",
                suite.name
            )));
        }

        let guard = CycleGuard::begin(&self.phase, Phase::AwaitingCompletion)?;
        let prompt = self.prompts.build_suite_prompt(&suite);
        let result = match self.completion.complete(&prompt).await {
            Ok(raw) => finalize_suite(&raw, &suite),
            Err(e) => Err(e),
        };
        guard.finish(&result);
        if result.is_ok() {
            info!("Consolidated {} test(s) of '{}'", suite.tests.len(), suite.name);
        }
        self.observe(result).await
    }

    pub async fn create_suite(&self, name: &str) -> Result<SuiteId, PwgenError> {
        let result = self.store.lock().await.create_suite(name).await;
        self.observe(result).await
    }

    pub async fn rename_suite(&self, id: &SuiteId, new_name: &str) -> Result<bool, PwgenError> {
        let result = self.store.lock().await.rename_suite(id, new_name).await;
        self.observe(result).await
    }

    pub async fn toggle_collapsed(&self, id: &SuiteId) -> Result<bool, PwgenError> {
        let result = self.store.lock().await.toggle_collapsed(id).await;
        self.observe(result).await
    }

    pub async fn set_config(&self, id: &SuiteId, config: SuiteConfig) -> Result<(), PwgenError> {
        let result = self.store.lock().await.set_config(id, config).await;
        self.observe(result).await
    }

    pub async fn delete_suite(&self, id: &SuiteId) -> Result<Suite, PwgenError> {
        let result = self.store.lock().await.delete_suite(id).await;
        let removed = self.observe(result).await?;

        let mut session = self.session.lock().await;
        if session.current_suite.as_ref() == Some(id) {
            *session = Session::default();
        }
        Ok(removed)
    }

    /// Delete a stored test. If it was the edit target the working copy is
    /// cleared; later selections shift down by one.
    pub async fn delete_test(&self, suite_id: &SuiteId, index: usize) -> Result<Test, PwgenError> {
        let result = self.store.lock().await.delete_test(suite_id, index).await;
        let removed = self.observe(result).await?;

        let mut session = self.session.lock().await;
        if session.current_suite.as_ref() == Some(suite_id)
            && let Some(current) = session.current_test
        {
            if current == index {
                session.clear_edit();
            } else if current > index {
                session.current_test = Some(current - 1);
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod orchestrator_test;
