use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::{Client, ClientBuilder};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bridge::{InspectorRequest, InspectorResponse, RequestBridge, TabContext};
use crate::errors::PwgenError;
use crate::types::{ELEMENT_TEXT_LIMIT, ViewportSize};

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver URL for this browser type
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "http://localhost:4444",
            BrowserType::Chrome => "http://localhost:9515",
        }
    }

    fn driver_name(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "geckodriver",
            BrowserType::Chrome => "chromedriver",
        }
    }
}

/// A WebDriver session acting as the page inspector
pub struct Browser {
    client: Client,
    // Last URL navigated to, used to skip redundant navigation
    current_url: Mutex<Option<String>>,
}

impl Browser {
    /// Connect to a running WebDriver
    ///
    /// # Arguments
    /// * `browser_type` - Firefox or Chrome
    /// * `webdriver_url` - WebDriver endpoint, defaults per browser type
    /// * `viewport` - Optional viewport dimensions
    /// * `headless` - Whether to run in headless mode
    pub async fn connect(
        browser_type: BrowserType,
        webdriver_url: Option<&str>,
        viewport: Option<ViewportSize>,
        headless: bool,
    ) -> Result<Self> {
        let webdriver_url = webdriver_url.unwrap_or(browser_type.default_webdriver_url());
        info!("Connecting to {:?} WebDriver at {}", browser_type, webdriver_url);

        if !Self::is_webdriver_running(webdriver_url).await {
            let driver_name = browser_type.driver_name();
            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver_name,
                webdriver_url,
                driver_name
            );
        }

        let mut caps = serde_json::Map::new();

        match &browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let mut args = vec!["--no-sandbox".to_string()];
                if headless {
                    args.push("--headless=new".to_string());
                    args.push("--disable-gpu".to_string());
                    args.push("--disable-dev-shm-usage".to_string());
                }
                if let Some(vp) = &viewport {
                    args.push(format!("--window-size={},{}", vp.width, vp.height));
                }
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
        }

        debug!("Connecting to WebDriver at {}", webdriver_url);
        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        if let Some(vp) = viewport {
            debug!("Setting viewport to {}x{}", vp.width, vp.height);
            if let Err(e) = client.set_window_size(vp.width, vp.height).await {
                debug!("Note: Could not set window size: {}", e);
            }
        }

        Ok(Browser {
            client,
            current_url: Mutex::new(None),
        })
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url);
        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Navigate and wait for the document to finish loading
    pub async fn goto(&self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        self.client.goto(url).await?;

        let wait_script = "return document.readyState === 'complete';";
        for _ in 0..20 {
            match self.client.execute(wait_script, vec![]).await {
                Ok(val) if val.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(tokio::time::Duration::from_millis(100)).await,
            }
        }

        *self.current_url.lock().await = Some(url.to_string());
        Ok(())
    }

    /// Navigate only when the base URL (query and fragment ignored) differs
    async fn ensure_at(&self, tab: &TabContext) -> Result<()> {
        let Some(target) = tab.url.as_deref() else {
            return Ok(());
        };
        let current = self.current_url.lock().await.clone();
        if current.as_deref().is_some_and(|c| same_page(c, target)) {
            return Ok(());
        }
        self.goto(target).await
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

fn base_url(url: &str) -> &str {
    let url = url.split('#').next().unwrap_or(url);
    url.split('?').next().unwrap_or(url)
}

fn same_page(current: &str, target: &str) -> bool {
    base_url(current) == base_url(target)
}

/// Page-side extraction script for a request kind
pub fn inspector_script(request: InspectorRequest) -> String {
    match request {
        InspectorRequest::PageDetails => r#"
            return {
                url: window.location.href,
                title: document.title,
                timestamp: new Date().toISOString()
            };
        "#
        .to_string(),
        InspectorRequest::VisibleElements => format!(
            r#"
            const elements = Array.from(document.querySelectorAll('body *'))
                .filter((el) => {{
                    const rect = el.getBoundingClientRect();
                    return rect.width > 0 && rect.height > 0;
                }})
                .map((el) => ({{
                    tag: el.tagName.toLowerCase(),
                    id: el.id || undefined,
                    classes: el.classList.length ? Array.from(el.classList) : undefined,
                    text: (el.textContent || '').trim().slice(0, {limit}),
                    visible: true
                }}));
            return {{ elements: JSON.parse(JSON.stringify(elements)) }};
        "#,
            limit = ELEMENT_TEXT_LIMIT
        ),
        InspectorRequest::FullHtml => r#"
            return { html: document.documentElement.innerHTML };
        "#
        .to_string(),
        InspectorRequest::Scripts => r#"
            const scripts = Array.from(document.scripts)
                .filter((script) => script.src || script.textContent.trim())
                .map((script) => ({
                    src: script.src || undefined,
                    type: script.type || undefined,
                    content: script.textContent.trim().slice(0, 200) || undefined
                }));
            return { scripts: JSON.parse(JSON.stringify(scripts)) };
        "#
        .to_string(),
        InspectorRequest::Styles => r#"
            const readRules = (sheet) => {
                try {
                    return sheet.cssRules
                        ? Array.from(sheet.cssRules)
                            .map((rule) => rule.cssText.slice(0, 200))
                            .filter((rule) => rule.length > 0)
                        : undefined;
                } catch (e) {
                    return undefined;
                }
            };
            const styles = Array.from(document.styleSheets)
                .map((sheet) => ({ href: sheet.href || undefined, rules: readRules(sheet) }))
                .filter((sheet) => sheet.href || (sheet.rules && sheet.rules.length));
            return { styles: JSON.parse(JSON.stringify(styles)) };
        "#
        .to_string(),
        InspectorRequest::MetaData => r#"
            const content = (name) => {
                const el = document.querySelector(`meta[name="${name}"]`);
                return el ? el.content : undefined;
            };
            const meta = {
                viewport: content('viewport'),
                description: content('description'),
                keywords: content('keywords'),
                robots: content('robots')
            };
            return { meta: JSON.parse(JSON.stringify(meta)) };
        "#
        .to_string(),
    }
}

/// Session loss means the inspected surface is gone, not a transient failure
fn classify(err: anyhow::Error) -> PwgenError {
    let msg = format!("{:#}", err);
    if msg.contains("invalid session id") || msg.contains("no such window") {
        PwgenError::ContextInvalidated(msg)
    } else {
        PwgenError::Transport(msg)
    }
}

#[async_trait]
impl RequestBridge for Browser {
    async fn request(
        &self,
        tab: &TabContext,
        request: InspectorRequest,
    ) -> Result<InspectorResponse, PwgenError> {
        self.ensure_at(tab).await.map_err(classify)?;

        debug!("Running inspector script for {}", request.action());
        let value = self
            .client
            .execute(&inspector_script(request), vec![])
            .await
            .context(format!("Failed to execute {}", request.action()))
            .map_err(classify)?;

        match serde_json::from_value::<InspectorResponse>(value) {
            Ok(response) => Ok(response),
            Err(e) => Ok(InspectorResponse::error(format!(
                "Malformed {} response: {}",
                request.action(),
                e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_type_parse() {
        assert_eq!("Firefox".parse::<BrowserType>().unwrap(), BrowserType::Firefox);
        assert_eq!("chromium".parse::<BrowserType>().unwrap(), BrowserType::Chrome);
        assert!("safari".parse::<BrowserType>().is_err());
    }

    #[test]
    fn test_same_page_ignores_query_and_fragment() {
        assert!(same_page("https://a.com/x?y=1", "https://a.com/x#top"));
        assert!(!same_page("https://a.com/x", "https://a.com/y"));
    }

    #[test]
    fn test_every_request_has_a_script() {
        for request in InspectorRequest::ALL {
            let script = inspector_script(request);
            assert!(script.contains("return"), "{} has no return", request.action());
        }
        assert!(inspector_script(InspectorRequest::VisibleElements).contains(".slice(0, 100)"));
    }

    #[test]
    fn test_session_loss_is_invalidation() {
        let err = classify(anyhow::anyhow!("invalid session id"));
        assert!(err.requires_reload());
        let err = classify(anyhow::anyhow!("javascript error: boom"));
        assert!(matches!(err, PwgenError::Transport(_)));
    }
}
