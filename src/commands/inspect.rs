use anyhow::Result;
use tracing::{info, warn};

use crate::commands::utils::{self, GlobalOpts};
use pwgen::bridge::{InspectorRequest, InspectorResponse, RequestBridge, TabContext};
use pwgen::errors::PwgenError;

pub async fn handle_inspect(opts: &GlobalOpts, url: String, action: String) -> Result<()> {
    let request: InspectorRequest = action.parse()?;
    info!("Running {} on {}", request.action(), url);

    let browser = utils::connect_browser(opts).await?;
    let result = browser.request(&TabContext::at(url), request).await;
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser session: {}", e);
    }

    match result? {
        InspectorResponse::Error { error } => Err(PwgenError::Transport(error).into()),
        response => utils::print_json(&response),
    }
}
