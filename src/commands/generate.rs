use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::utils::{self, GlobalOpts};
use pwgen::bridge::TabContext;
use pwgen::orchestrator::GenerationOrchestrator;
use pwgen::types::SuiteId;

pub async fn handle_generate(
    opts: &GlobalOpts,
    url: String,
    instructions: String,
    suite: Option<String>,
    test: Option<usize>,
    description: Option<String>,
    snapshots: Vec<String>,
) -> Result<()> {
    info!("Generating test for {}", url);

    let backend = utils::open_backend(opts)?;
    let completion = utils::completion_client(opts, backend.as_ref()).await?;
    let store = utils::load_store(backend).await;
    let browser = Arc::new(utils::connect_browser(opts).await?);

    let orchestrator =
        GenerationOrchestrator::new(browser.clone(), Arc::new(completion), store);
    let result = run_cycle(
        &orchestrator,
        &url,
        &instructions,
        suite,
        test,
        description,
        &snapshots,
    )
    .await;

    // Release the orchestrator's handle so the WebDriver session can be closed
    drop(orchestrator);
    match Arc::try_unwrap(browser) {
        Ok(browser) => {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser session: {}", e);
            }
        }
        Err(_) => warn!("Browser session still shared, leaving it open"),
    }

    utils::print_json(&result?)
}

async fn run_cycle(
    orchestrator: &GenerationOrchestrator,
    url: &str,
    instructions: &str,
    suite: Option<String>,
    test: Option<usize>,
    description: Option<String>,
    snapshots: &[String],
) -> Result<serde_json::Value> {
    let suite_id = suite.map(SuiteId::from);
    if let Some(suite_id) = &suite_id {
        match test {
            Some(index) => orchestrator.select_test(suite_id, index).await?,
            None => orchestrator.select_suite(suite_id).await?,
        }
    }
    if let Some(description) = description {
        orchestrator.set_description(&description).await;
    }

    for snapshot_url in snapshots {
        orchestrator
            .capture_snapshot(&TabContext::at(snapshot_url.as_str()), None)
            .await?;
    }

    let script = orchestrator
        .generate(instructions, &TabContext::at(url))
        .await?;

    if suite_id.is_none() {
        return Ok(json!({ "script": script }));
    }

    let saved = orchestrator.save().await?;
    Ok(json!({
        "script": script,
        "saved": {
            "suite": suite_id,
            "filename": saved.filename,
            "snapshots": saved.snapshots.len(),
        },
    }))
}
