use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use pwgen::errors::PwgenError;
use pwgen::settings::{AzureConfig, OpenRouterSettings, Provider};
use pwgen::storage::{self, FileStore, KeyValueStore};
use pwgen::suite_store::SuiteStore;
use pwgen::types::{SuiteId, ViewportSize};
use pwgen::webdriver::{Browser, BrowserType};
use pwgen::{HttpCompletionClient, Suite};

/// Flags shared by every command
pub struct GlobalOpts {
    pub data_dir: Option<PathBuf>,
    pub browser: String,
    pub webdriver_url: Option<String>,
    pub headless: bool,
    pub viewport: Option<String>,
    pub timeout: Option<u64>,
}

/// Open the file store under the configured data directory
pub fn open_backend(opts: &GlobalOpts) -> Result<Arc<FileStore>> {
    let dir = storage::data_dir(opts.data_dir.as_deref()).map_err(PwgenError::from)?;
    debug!("Using data directory {}", dir.display());
    Ok(Arc::new(FileStore::open(dir).map_err(PwgenError::from)?))
}

/// Suite store loaded from disk
pub async fn load_store(backend: Arc<FileStore>) -> SuiteStore {
    let mut store = SuiteStore::new(backend);
    store.load().await;
    store
}

/// Completion client for whichever provider is configured
pub async fn completion_client(
    opts: &GlobalOpts,
    backend: &dyn KeyValueStore,
) -> Result<HttpCompletionClient> {
    let settings = OpenRouterSettings::load(backend).await?;
    let provider = Provider::select(&settings, AzureConfig::from_env().as_ref())?;
    debug!("Using {} completion provider", provider.name());
    Ok(match opts.timeout {
        Some(secs) => HttpCompletionClient::with_timeout(provider, Duration::from_secs(secs))?,
        None => HttpCompletionClient::new(provider),
    })
}

pub async fn connect_browser(opts: &GlobalOpts) -> Result<Browser> {
    let browser_type: BrowserType = opts.browser.parse()?;
    let viewport = opts.viewport.as_deref().map(ViewportSize::parse).transpose()?;
    Browser::connect(
        browser_type,
        opts.webdriver_url.as_deref(),
        viewport,
        opts.headless,
    )
    .await
}

/// Look up a suite or fail with an input error
pub fn find_suite<'a>(store: &'a SuiteStore, id: &str) -> Result<&'a Suite> {
    store
        .suite(&SuiteId::from(id))
        .ok_or_else(|| PwgenError::InvalidInput(format!("Suite '{}' does not exist", id)).into())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
