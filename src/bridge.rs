//! Typed request/response relay between the orchestrator and the page

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::PwgenError;
use crate::types::{Element, PageDetails, PageMeta, PageScript, PageStyle};

/// Request kinds understood by the page inspector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum InspectorRequest {
    #[serde(rename = "getPageDetails")]
    PageDetails,
    #[serde(rename = "getVisibleElements")]
    VisibleElements,
    #[serde(rename = "getFullHTML")]
    FullHtml,
    #[serde(rename = "getScripts")]
    Scripts,
    #[serde(rename = "getStyles")]
    Styles,
    #[serde(rename = "getMetaData")]
    MetaData,
}

impl InspectorRequest {
    pub const ALL: [InspectorRequest; 6] = [
        InspectorRequest::PageDetails,
        InspectorRequest::VisibleElements,
        InspectorRequest::FullHtml,
        InspectorRequest::Scripts,
        InspectorRequest::Styles,
        InspectorRequest::MetaData,
    ];

    /// Wire name of the request kind
    pub fn action(&self) -> &'static str {
        match self {
            InspectorRequest::PageDetails => "getPageDetails",
            InspectorRequest::VisibleElements => "getVisibleElements",
            InspectorRequest::FullHtml => "getFullHTML",
            InspectorRequest::Scripts => "getScripts",
            InspectorRequest::Styles => "getStyles",
            InspectorRequest::MetaData => "getMetaData",
        }
    }
}

impl FromStr for InspectorRequest {
    type Err = PwgenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InspectorRequest::ALL
            .into_iter()
            .find(|r| r.action() == s)
            .ok_or_else(|| PwgenError::InvalidInput("Unknown action".to_string()))
    }
}

/// Response shapes, one per request kind, plus the page-side error shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InspectorResponse {
    Error { error: String },
    PageDetails(PageDetails),
    Elements { elements: Vec<Element> },
    Html { html: String },
    Scripts { scripts: Vec<PageScript> },
    Styles { styles: Vec<PageStyle> },
    Meta { meta: PageMeta },
}

impl InspectorResponse {
    pub fn error(message: impl Into<String>) -> Self {
        InspectorResponse::Error {
            error: message.into(),
        }
    }
}

/// Where page data should come from for one generation cycle
#[derive(Debug, Clone, Default)]
pub struct TabContext {
    /// Navigate here before inspecting, unless already on it
    pub url: Option<String>,
}

impl TabContext {
    pub fn current() -> Self {
        Self::default()
    }

    pub fn at(url: impl Into<String>) -> Self {
        TabContext {
            url: Some(url.into()),
        }
    }
}

/// Relays one request to the page and returns exactly one response.
/// Transport failures come back as `Err`; page-side failures may come back
/// either as `Err` or as `InspectorResponse::Error`.
#[async_trait]
pub trait RequestBridge: Send + Sync {
    async fn request(
        &self,
        tab: &TabContext,
        request: InspectorRequest,
    ) -> Result<InspectorResponse, PwgenError>;
}

/// Bridge for commands that run without a browser. Every request fails.
pub struct Detached;

#[async_trait]
impl RequestBridge for Detached {
    async fn request(
        &self,
        _tab: &TabContext,
        request: InspectorRequest,
    ) -> Result<InspectorResponse, PwgenError> {
        Err(PwgenError::Transport(format!(
            "No page attached for {}",
            request.action()
        )))
    }
}

fn unexpected(request: InspectorRequest, response: &InspectorResponse) -> PwgenError {
    PwgenError::Transport(format!(
        "Unexpected response to {}: {:?}",
        request.action(),
        response
    ))
}

/// Request page metadata and unwrap it
pub async fn page_details(
    bridge: &dyn RequestBridge,
    tab: &TabContext,
) -> Result<PageDetails, PwgenError> {
    let request = InspectorRequest::PageDetails;
    match bridge.request(tab, request).await? {
        InspectorResponse::PageDetails(details) => Ok(details),
        InspectorResponse::Error { error } => Err(PwgenError::Transport(error)),
        other => Err(unexpected(request, &other)),
    }
}

/// Request the visible element snapshot and unwrap it
pub async fn visible_elements(
    bridge: &dyn RequestBridge,
    tab: &TabContext,
) -> Result<Vec<Element>, PwgenError> {
    let request = InspectorRequest::VisibleElements;
    match bridge.request(tab, request).await? {
        InspectorResponse::Elements { elements } => Ok(elements),
        InspectorResponse::Error { error } => Err(PwgenError::Transport(error)),
        other => Err(unexpected(request, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct CannedBridge(InspectorResponse);

    #[async_trait]
    impl RequestBridge for CannedBridge {
        async fn request(
            &self,
            _tab: &TabContext,
            _request: InspectorRequest,
        ) -> Result<InspectorResponse, PwgenError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_request_wire_names() {
        let json = serde_json::to_value(InspectorRequest::FullHtml).unwrap();
        assert_eq!(json, json!({"action": "getFullHTML"}));

        let parsed: InspectorRequest =
            serde_json::from_value(json!({"action": "getMetaData"})).unwrap();
        assert_eq!(parsed, InspectorRequest::MetaData);
    }

    #[test]
    fn test_unknown_action() {
        let err = "getCookies".parse::<InspectorRequest>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown action");
        assert_eq!(
            "getStyles".parse::<InspectorRequest>().unwrap(),
            InspectorRequest::Styles
        );
    }

    #[test]
    fn test_response_shapes_deserialize() {
        let details: InspectorResponse = serde_json::from_value(json!({
            "url": "https://example.com/login",
            "title": "Login",
            "timestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(details, InspectorResponse::PageDetails(_)));

        let elements: InspectorResponse = serde_json::from_value(json!({
            "elements": [{"tag": "button", "id": "login-btn", "text": "Log in"}]
        }))
        .unwrap();
        assert!(matches!(elements, InspectorResponse::Elements { ref elements } if elements.len() == 1));

        let error: InspectorResponse =
            serde_json::from_value(json!({"error": "Unknown action"})).unwrap();
        assert_eq!(error, InspectorResponse::error("Unknown action"));

        let meta: InspectorResponse =
            serde_json::from_value(json!({"meta": {"robots": "noindex"}})).unwrap();
        assert!(matches!(meta, InspectorResponse::Meta { ref meta } if meta.robots.as_deref() == Some("noindex")));
    }

    #[tokio::test]
    async fn test_page_side_error_becomes_transport() {
        let bridge = CannedBridge(InspectorResponse::error("Receiving end does not exist."));
        let err = page_details(&bridge, &TabContext::current()).await.unwrap_err();
        assert!(matches!(err, PwgenError::Transport(ref m) if m == "Receiving end does not exist."));
    }

    #[tokio::test]
    async fn test_mismatched_response_is_rejected() {
        let bridge = CannedBridge(InspectorResponse::Html {
            html: "<p></p>".into(),
        });
        assert!(visible_elements(&bridge, &TabContext::current()).await.is_err());
    }
}
