//! Prompt construction and response sanitization for Playwright generation
//!
//! Everything here is pure: identical inputs produce identical prompts, and
//! [`sanitize`] is idempotent.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;

use crate::errors::PwgenError;
use crate::types::{Element, PageDetails, Snapshot, Suite};

/// Import every assembled suite file starts with
pub const PLAYWRIGHT_IMPORT: &str = "import { test, expect } from '@playwright/test';";

/// Default cap on the number of elements embedded in one prompt
pub const DEFAULT_MAX_ELEMENTS: usize = 300;

const SELECTOR_RULES_TEXT: &str = "\
Selector rules:
1. Only use selectors derived from the elements listed in the prompt. Never invent ids, classes, test ids or text that are not present.
2. Prefer page.getByRole(), page.getByText(), page.getByLabel(), page.getByPlaceholder() and page.getByTestId().
3. Use page.locator() only with attribute selectors such as '#id', '.class' or '[name=\"value\"]' taken from the listed elements.
4. Never use the :has-text(), :contains() or text= selector syntax. To filter by text use page.locator('selector', { hasText: 'text' }).";

const OUTPUT_RULES_TEXT: &str = "\
Output rules:
1. Return only JavaScript code. No Markdown code fences, no explanations.
2. Do not include import or require statements.
3. The only fixture allowed in a test function signature is { page }.
4. Use async/await and Playwright's expect() assertions.";

/// Fixed system instruction shared by single-test generation
pub fn system_prompt() -> String {
    format!(
        "You are a Playwright test automation expert. Generate clear, well-structured test scripts that follow best practices.\n\n{}\n\n{}",
        SELECTOR_RULES_TEXT, OUTPUT_RULES_TEXT
    )
}

/// System plus user instruction for one completion call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Builds completion prompts from page data and suites
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_elements: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            max_elements: DEFAULT_MAX_ELEMENTS,
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_elements(max_elements: usize) -> Self {
        Self { max_elements }
    }

    fn element_block(&self, elements: &[Element]) -> String {
        let kept = &elements[..elements.len().min(self.max_elements)];
        // Serializing plain structs of strings cannot fail
        let mut block = serde_json::to_string_pretty(kept).unwrap_or_else(|_| "[]".to_string());
        if elements.len() > kept.len() {
            block.push_str(&format!(
                "\n(showing {} of {} elements)",
                kept.len(),
                elements.len()
            ));
        }
        block
    }

    /// Prompt for a single test from the live page plus any snapshots
    pub fn build_test_prompt(
        &self,
        instructions: &str,
        page: &PageDetails,
        elements: &[Element],
        snapshots: &[Snapshot],
    ) -> Prompt {
        let mut user = format!(
            "Generate a Playwright test for the following test case.\n\n\
             Test Case: {}\n\n\
             Page Details:\n\
             URL: {}\n\
             Title: {}\n\n\
             Visible Elements:\n{}\n",
            instructions.trim(),
            page.url,
            page.title,
            self.element_block(elements)
        );

        for snapshot in snapshots {
            user.push_str(&format!(
                "\nSnapshot \"{}\" elements:\n{}\n",
                snapshot.name,
                self.element_block(&snapshot.elements)
            ));
        }

        user.push_str(
            "\nWrite a single test(...) block that navigates to the page URL with page.goto() \
             and performs the test case. Follow the selector and output rules exactly.",
        );

        Prompt {
            system: system_prompt(),
            user,
        }
    }

    /// Prompt for one consolidated file holding every test of a suite
    pub fn build_suite_prompt(&self, suite: &Suite) -> Prompt {
        let mut user = format!(
            "Combine the following {} Playwright test(s) into a single test file for the suite \"{}\".\n",
            suite.tests.len(),
            suite.name
        );

        // Oldest first, so the file reads in the order tests were written
        for (i, test) in suite.tests.iter().rev().enumerate() {
            user.push_str(&format!(
                "\nTest {}:\nInstructions: {}\nURL: {}\nCode:\n{}\n",
                i + 1,
                test.instructions.trim(),
                test.url,
                test.body.trim()
            ));
        }

        if let Some(setup) = non_blank(&suite.config.setup_code) {
            user.push_str(&format!("\nRun this in test.beforeEach:\n{}\n", setup));
        }
        if let Some(teardown) = non_blank(&suite.config.teardown_code) {
            user.push_str(&format!("\nRun this in test.afterEach:\n{}\n", teardown));
        }
        let imports = suite.config.import_lines();
        if !imports.is_empty() {
            user.push_str(&format!(
                "\nThese modules are imported at the top of the file and may be used:\n{}\n",
                imports.join("\n")
            ));
        }

        user.push_str(&format!(
            "\nWrap everything in one test.describe('{}', ...) block containing exactly one test(...) \
             block per input test ({} in total). Keep each test's steps and selectors unchanged.",
            suite.name.replace('\'', "\\'"),
            suite.tests.len()
        ));

        Prompt {
            system: format!(
                "You are a Playwright test automation expert. You merge individual tests into one well-organized suite file.\n\n{}",
                OUTPUT_RULES_TEXT
            ),
            user,
        }
    }

    /// Prompt asking for a short descriptive filename
    pub fn build_filename_prompt(&self, instructions: &str) -> Prompt {
        Prompt {
            system: "You name test files. Reply with a single kebab-case name of at most five words, \
                     without extension, quotes or explanation."
                .to_string(),
            user: format!("Test case: {}", instructions.trim()),
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Normalize a model-suggested name into `<kebab-name>.spec.js`
pub fn parse_filename(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let line = line.trim_matches(|c| c == '`' || c == '"' || c == '\'');
    let stem = line
        .trim_end_matches(".js")
        .trim_end_matches(".ts")
        .trim_end_matches(".spec");

    let mut name = String::new();
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_lowercase());
        } else if !name.ends_with('-') && !name.is_empty() {
            name.push('-');
        }
    }
    let name = name.trim_end_matches('-');
    if name.is_empty() {
        return None;
    }
    let name: String = name.chars().take(60).collect();
    Some(format!("{}.spec.js", name.trim_end_matches('-')))
}

/// Timestamp-based filename used when the model cannot name the test
pub fn fallback_filename(now: DateTime<Utc>) -> String {
    format!("test-{}.spec.js", now.timestamp_millis())
}

/// Kebab-case file name for a consolidated suite
pub fn suite_filename(suite_name: &str) -> String {
    parse_filename(suite_name).unwrap_or_else(|| "suite.spec.js".to_string())
}

/// One rewrite of a known-invalid selector pattern
pub struct SelectorRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub replacement: &'static str,
}

impl SelectorRule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        SelectorRule {
            name,
            pattern: Regex::new(pattern).expect("selector rule pattern"),
            replacement,
        }
    }

    pub fn apply(&self, script: &str) -> String {
        self.pattern.replace_all(script, self.replacement).into_owned()
    }
}

lazy_static::lazy_static! {
    /// Legacy selector patterns and their modern replacements, applied in order
    pub static ref SELECTOR_RULES: Vec<SelectorRule> = vec![
        SelectorRule::new(
            "has-text-single-quoted",
            r#"locator\('([^':]+):has-text\("([^"]*)"\)'\)"#,
            r#"locator('${1}', { hasText: "${2}" })"#,
        ),
        SelectorRule::new(
            "has-text-double-quoted",
            r#"locator\("([^":]+):has-text\('([^']*)'\)"\)"#,
            r#"locator("${1}", { hasText: '${2}' })"#,
        ),
        SelectorRule::new(
            "contains-single-quoted",
            r#"locator\('([^':]+):contains\("([^"]*)"\)'\)"#,
            r#"locator('${1}', { hasText: "${2}" })"#,
        ),
        SelectorRule::new(
            "contains-double-quoted",
            r#"locator\("([^":]+):contains\('([^']*)'\)"\)"#,
            r#"locator("${1}", { hasText: '${2}' })"#,
        ),
        SelectorRule::new(
            "text-engine",
            r#"locator\('text=([^'"]+)'\)"#,
            r#"getByText('${1}')"#,
        ),
    ];

    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[^\n]*\n(.*?)```").expect("static regex");
    static ref FENCE_LINE: Regex = Regex::new(r"^\s*```[A-Za-z0-9_+-]*\s*$").expect("static regex");
    static ref TEST_BLOCK: Regex = Regex::new(r"(?m)^\s*test(?:\.(?:only|skip|fixme|fail))?\s*\(").expect("static regex");
    static ref IMPORT_LINE: Regex = Regex::new(r"^\s*(?:import\s|import\{|(?:const|let|var)\s+[^=]+=\s*require\()").expect("static regex");
    static ref IMPORT_SOURCE: Regex = Regex::new(r#"(?:^|[\s}])from\s*['"`]"#).expect("static regex");
}

const LANGUAGE_ECHOES: [&str; 6] = ["javascript", "typescript", "js", "ts", "jsx", "tsx"];

fn is_language_echo(line: &str) -> bool {
    let trimmed = line.trim().trim_end_matches(':');
    LANGUAGE_ECHOES
        .iter()
        .any(|lang| trimmed.eq_ignore_ascii_case(lang))
}

/// Whether a line starts an import or require statement
pub fn is_import_line(line: &str) -> bool {
    IMPORT_LINE.is_match(line)
}

/// Number of lines a statement starting at `lines[0]` spans. Handles
/// multi-line `import { a,\n b } from 'x';` forms.
fn import_span(lines: &[&str]) -> usize {
    let first = lines[0].trim();
    // A statement ends at its module source, not at identifiers like `fromEvent`
    let complete = |l: &str| {
        let l = l.trim();
        IMPORT_SOURCE.is_match(l) || l.ends_with(';') || l.ends_with('\'') || l.ends_with('"') || l.ends_with(')')
    };
    if complete(first) {
        return 1;
    }
    for (i, line) in lines.iter().enumerate().skip(1) {
        if complete(line) {
            return i + 1;
        }
    }
    lines.len()
}

fn strip_fences(raw: &str) -> String {
    if let Some(captures) = FENCED_BLOCK.captures(raw)
        && let Some(body) = captures.get(1)
    {
        return body.as_str().to_string();
    }
    raw.lines()
        .filter(|line| !FENCE_LINE.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split leading import/require statements off a script. Returns the
/// statements and the remaining lines.
fn split_leading_imports(script: &str) -> (Vec<String>, Vec<&str>) {
    let lines: Vec<&str> = script.lines().collect();
    let mut imports = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || is_language_echo(line) {
            i += 1;
        } else if is_import_line(line) {
            let span = import_span(&lines[i..]);
            imports.push(
                lines[i..i + span]
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
            i += span;
        } else {
            break;
        }
    }
    (imports, lines[i..].to_vec())
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// Apply every selector rule in table order
pub fn repair_selectors(script: &str) -> String {
    SELECTOR_RULES
        .iter()
        .fold(script.to_string(), |acc, rule| rule.apply(&acc))
}

/// Turn raw completion text into a directly usable script body
pub fn sanitize(raw: &str) -> String {
    let unfenced = strip_fences(raw);
    let (_, rest) = split_leading_imports(&unfenced);
    let body = trim_blank_lines(&rest);
    repair_selectors(&body)
}

/// Import statements found anywhere in a script body
pub fn imports_in(script: &str) -> Vec<String> {
    let lines: Vec<&str> = script.lines().collect();
    let mut imports = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if is_import_line(lines[i]) {
            let span = import_span(&lines[i..]);
            imports.push(
                lines[i..i + span]
                    .iter()
                    .map(|l| l.trim())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
            i += span;
        } else {
            i += 1;
        }
    }
    imports
}

/// Script with every import statement removed
fn without_imports(script: &str) -> String {
    let lines: Vec<&str> = script.lines().collect();
    let mut kept = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if is_import_line(lines[i]) {
            i += import_span(&lines[i..]);
        } else {
            kept.push(lines[i]);
            i += 1;
        }
    }
    trim_blank_lines(&kept)
}

fn import_key(import: &str) -> String {
    import
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('"', "'")
        .trim_end_matches(';')
        .to_string()
}

/// Deduplicated import list for a suite file: the Playwright import, then
/// user-declared imports, then imports found in test bodies. First seen wins.
pub fn collect_imports(suite: &Suite) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut imports = Vec::new();

    let candidates = std::iter::once(PLAYWRIGHT_IMPORT.to_string())
        .chain(suite.config.import_lines())
        .chain(suite.tests.iter().rev().flat_map(|t| imports_in(&t.body)));

    for import in candidates {
        if seen.insert(import_key(&import)) {
            imports.push(import);
        }
    }
    imports
}

/// Count recognizable `test(...)` invocations
pub fn count_test_blocks(script: &str) -> usize {
    TEST_BLOCK.find_iter(script).count()
}

/// Sanitize a consolidated suite response, check it holds at least
/// `expected_tests` test blocks, and prepend the import list
pub fn finalize_suite(raw: &str, suite: &Suite) -> Result<String, PwgenError> {
    let body = without_imports(&sanitize(raw));
    let expected = suite.tests.len();
    let found = count_test_blocks(&body);
    if found < expected {
        return Err(PwgenError::content(
            format!(
                "expected at least {} test block(s) in the suite file, found {}",
                expected, found
            ),
            raw,
        ));
    }
    Ok(assemble_suite_file(&collect_imports(suite), &body))
}

/// Join imports and body into one file
pub fn assemble_suite_file(imports: &[String], body: &str) -> String {
    let mut file = imports.join("\n");
    if !file.is_empty() {
        file.push_str("\n\n");
    }
    file.push_str(body.trim_matches('\n'));
    file.push('\n');
    file
}

#[cfg(test)]
#[path = "prompt_test.rs"]
mod prompt_test;
