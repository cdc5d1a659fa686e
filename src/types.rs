use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format for CLI results
#[derive(Clone, Copy, Debug, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format for programmatic consumption
    Json,
    /// Human-readable simple format
    Simple,
}

/// Browser viewport dimensions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl ViewportSize {
    /// Parse viewport size from "WIDTHxHEIGHT" format (e.g., "1920x1080")
    pub fn parse(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid viewport format. Use WIDTHxHEIGHT (e.g., 1920x1080)");
        }

        let width = parts[0]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid width in viewport size"))?;
        let height = parts[1]
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid height in viewport size"))?;

        Ok(ViewportSize { width, height })
    }
}

/// Maximum number of characters of text content kept per element
pub const ELEMENT_TEXT_LIMIT: usize = 100;

/// A visible element captured from the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Lowercase tag name
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classes: Option<Vec<String>>,
    /// Trimmed text content, truncated to `ELEMENT_TEXT_LIMIT` characters
    #[serde(default)]
    pub text: String,
    /// Whether the element has a non-empty bounding box
    #[serde(default = "default_visible")]
    pub visible: bool,
}

fn default_visible() -> bool {
    true
}

impl Element {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        let text: String = text.into();
        Element {
            tag: tag.into(),
            id: None,
            classes: None,
            text: text.chars().take(ELEMENT_TEXT_LIMIT).collect(),
            visible: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let classes: Vec<String> = classes.into_iter().map(Into::into).collect();
        self.classes = if classes.is_empty() { None } else { Some(classes) };
        self
    }
}

/// Metadata describing the inspected page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDetails {
    pub url: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

impl PageDetails {
    /// The page URL with scheme and host stripped (path, query and fragment kept)
    pub fn relative_url(&self) -> String {
        relative_url(&self.url)
    }
}

/// Strip scheme and host from a URL. Values that do not parse as absolute
/// URLs are returned unchanged.
pub fn relative_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(parsed) if parsed.has_host() => {
            let mut relative = parsed.path().to_string();
            if let Some(query) = parsed.query() {
                relative.push('?');
                relative.push_str(query);
            }
            if let Some(fragment) = parsed.fragment() {
                relative.push('#');
                relative.push_str(fragment);
            }
            relative
        }
        _ => raw.to_string(),
    }
}

/// A script tag found on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub script_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// A stylesheet found on the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageStyle {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
}

/// Well-known meta tags of the page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keywords: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robots: Option<String>,
}

/// A captured list of page elements attached to a test for extra grounding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: String,
    /// Human label, "Snapshot N" unless given explicitly
    pub name: String,
    pub elements: Vec<Element>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot whose id is derived from its creation time
    pub fn new(name: impl Into<String>, elements: Vec<Element>, now: DateTime<Utc>) -> Self {
        Snapshot {
            id: format!("snap-{}", now.timestamp_millis()),
            name: name.into(),
            elements,
            timestamp: now,
        }
    }

    /// Default label for the snapshot at `position` (0-based) in a list
    pub fn default_label(position: usize) -> String {
        format!("Snapshot {}", position + 1)
    }
}

/// One generated script plus the context that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    /// The natural-language prompt given by the user
    pub instructions: String,
    /// Generated script body
    pub body: String,
    pub filename: String,
    #[serde(default)]
    pub description: String,
    /// Originating page URL in relative form
    #[serde(default)]
    pub url: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub snapshots: Vec<Snapshot>,
}

/// Fields to merge into an existing test. `None` leaves the field untouched.
#[derive(Debug, Clone, Default)]
pub struct TestPatch {
    pub instructions: Option<String>,
    pub body: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub snapshots: Option<Vec<Snapshot>>,
}

impl Test {
    /// Merge a patch in place; filename and timestamp are never touched
    pub fn apply(&mut self, patch: TestPatch) {
        if let Some(instructions) = patch.instructions {
            self.instructions = instructions;
        }
        if let Some(body) = patch.body {
            self.body = body;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(url) = patch.url {
            self.url = url;
        }
        if let Some(snapshots) = patch.snapshots {
            self.snapshots = snapshots;
        }
    }
}

/// Opaque suite identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuiteId(String);

impl SuiteId {
    /// Identifier derived from a creation time
    pub fn from_time(now: DateTime<Utc>) -> Self {
        SuiteId(format!("suite-{}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SuiteId {
    fn from(s: &str) -> Self {
        SuiteId(s.to_string())
    }
}

impl From<String> for SuiteId {
    fn from(s: String) -> Self {
        SuiteId(s)
    }
}

impl fmt::Display for SuiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Suite-level code shared by every test of a suite
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_code: Option<String>,
    /// Newline-delimited import statements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imports: Option<String>,
}

impl SuiteConfig {
    /// Non-blank import lines declared by the user
    pub fn import_lines(&self) -> Vec<String> {
        self.imports
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A named, persisted group of generated tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub id: SuiteId,
    pub name: String,
    /// Newest first
    #[serde(default)]
    pub tests: Vec<Test>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub config: SuiteConfig,
}

impl Suite {
    pub fn new(id: SuiteId, name: impl Into<String>) -> Self {
        Suite {
            id,
            name: name.into(),
            tests: Vec::new(),
            collapsed: false,
            config: SuiteConfig::default(),
        }
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;
