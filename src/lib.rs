//! # pwgen
#![allow(clippy::uninlined_format_args)]
//!
//! Generates Playwright test scripts from live web pages with an LLM.
//!
//! A page is inspected through WebDriver (URL, title, visible elements),
//! combined with a natural-language test case into a completion prompt,
//! and the model's answer is cleaned into a directly usable `test(...)`
//! block. Tests are grouped into suites, persisted as JSON, and exported
//! as script files, zip archives or one consolidated suite file.
//!
//! ## CLI Usage
//!
//! ```bash
//! # Create a suite and generate a test into it
//! pwgen suite create "Login flow"
//! pwgen generate "https://example.com/login" "click the login button" --suite suite-1718000000000
//!
//! # Give the model extra grounding from another page
//! pwgen generate "https://example.com/login" "log in and open settings" \
//!     --suite suite-1718000000000 --snapshot "https://example.com/settings"
//!
//! # Consolidate a suite into one file, or archive its tests
//! pwgen export suite suite-1718000000000 --out ./e2e
//! pwgen export archive suite-1718000000000 --out playwright-tests.zip --metadata
//!
//! # Use OpenRouter instead of the Azure deployment from PWGEN_AZURE_*
//! pwgen settings set --api-key sk-or-... --model openai/gpt-4o
//! ```
//!
//! All commands print JSON to stdout; logs go to stderr (`RUST_LOG=pwgen=debug`).
//!
//! ## Library Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use pwgen::{
//!     Browser, BrowserType, FileStore, GenerationOrchestrator, HttpCompletionClient,
//!     OpenRouterSettings, Provider, SuiteStore, TabContext,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let backend = Arc::new(FileStore::open("/tmp/pwgen")?);
//! let settings = OpenRouterSettings::load(backend.as_ref()).await?;
//! let provider = Provider::select(&settings, pwgen::AzureConfig::from_env().as_ref())?;
//!
//! let browser = Browser::connect(BrowserType::Firefox, None, None, true).await?;
//! let mut store = SuiteStore::new(backend);
//! store.load().await;
//!
//! let orchestrator = GenerationOrchestrator::new(
//!     Arc::new(browser),
//!     Arc::new(HttpCompletionClient::new(provider)),
//!     store,
//! );
//! let suite = orchestrator.create_suite("Login flow").await?;
//! orchestrator.select_suite(&suite).await?;
//! orchestrator
//!     .generate("click the login button", &TabContext::at("https://example.com/login"))
//!     .await?;
//! orchestrator.save().await?;
//! # Ok(())
//! # }
//! ```

/// Typed page requests and the relay seam
pub mod bridge;

/// LLM chat-completion clients
pub mod completion;

/// Crate error type and exit codes
pub mod errors;

/// Script files, archives and suite files
pub mod export;

/// Generation cycles and the working session
pub mod orchestrator;

/// Prompt construction and response sanitization
pub mod prompt;

/// Provider settings and selection
pub mod settings;

/// Key-value persistence backends
pub mod storage;

/// Suite collection
pub mod suite_store;

/// Data model
pub mod types;

/// WebDriver-backed page inspector
pub mod webdriver;

pub use bridge::{InspectorRequest, InspectorResponse, RequestBridge, TabContext};
pub use completion::{CompletionClient, HttpCompletionClient, OpenRouterCatalog};
pub use errors::PwgenError;
pub use export::ExportPackager;
pub use orchestrator::{GenerationOrchestrator, Phase, Session};
pub use prompt::{Prompt, PromptBuilder};
pub use settings::{AzureConfig, OpenRouterSettings, Provider};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use suite_store::SuiteStore;
pub use types::{Element, PageDetails, Snapshot, Suite, SuiteConfig, SuiteId, Test, TestPatch};
pub use webdriver::{Browser, BrowserType};
